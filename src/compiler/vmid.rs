//! Assignment of translation units to VM instances.

use std::collections::BTreeMap;

use crate::{
    translator::{TranslationUnit, UnitId},
    utils::EntropyProvider,
    Error, Result,
};

/// Picks a VM instance id in `0..vm_count` for every unit.
///
/// With a single VM every unit gets id 0 and `entropy` is not drawn from. Otherwise the
/// ids are drawn from `entropy`, so a seeded provider reproduces the same assignment.
///
/// # Errors
///
/// Returns [`Error::Error`] if `vm_count` is zero.
pub fn assign_vm_ids(
    units: &[TranslationUnit],
    vm_count: u32,
    entropy: &mut EntropyProvider,
) -> Result<BTreeMap<UnitId, u32>> {
    if vm_count == 0 {
        return Err(Error::Error("at least one VM instance is required".to_string()));
    }
    if vm_count == 1 {
        return Ok(units.iter().map(|unit| (unit.id(), 0)).collect());
    }

    Ok(units
        .iter()
        .map(|unit| (unit.id(), entropy.gen_range(vm_count)))
        .collect())
}
