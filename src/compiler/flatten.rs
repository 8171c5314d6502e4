//! Flattening of translation units into ordered block groups.

use std::collections::{BTreeMap, HashMap};

use crate::{
    ir::BlockId,
    translator::{TranslatedFunction, UnitId},
    Error, Result,
};

/// The blocks of one unit in layout order, tagged with the VM instance that runs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatBlockGroup {
    /// Unit the blocks belong to
    pub unit: UnitId,
    /// VM instance id
    pub vm_id: u32,
    /// Head (if kept), body and tail (if any), in order
    pub blocks: Vec<BlockId>,
}

/// Units whose inbound references must stay resolvable, and the block each one
/// resolves to after optimization.
///
/// A tracked unit resolves to its head, or to its first body block once the head was
/// elided. Representatives are filled in by [`flatten`].
#[derive(Debug, Default, Clone)]
pub struct BlockTracker {
    entries: HashMap<UnitId, Option<BlockId>>,
}

impl BlockTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker for `units`.
    #[must_use]
    pub fn with_units(units: impl IntoIterator<Item = UnitId>) -> Self {
        BlockTracker {
            entries: units.into_iter().map(|unit| (unit, None)).collect(),
        }
    }

    /// Starts tracking `unit`.
    pub fn track(&mut self, unit: UnitId) {
        self.entries.entry(unit).or_insert(None);
    }

    /// Returns true if `unit` is tracked.
    #[must_use]
    pub fn is_tracked(&self, unit: UnitId) -> bool {
        self.entries.contains_key(&unit)
    }

    /// Returns the representative recorded for `unit`, if it is tracked and was flattened.
    #[must_use]
    pub fn representative(&self, unit: UnitId) -> Option<BlockId> {
        self.entries.get(&unit).copied().flatten()
    }

    /// Iterates over tracked units and their representatives.
    pub fn iter(&self) -> impl Iterator<Item = (UnitId, Option<BlockId>)> + '_ {
        self.entries.iter().map(|(unit, block)| (*unit, *block))
    }

    /// Returns the number of tracked units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no unit is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, unit: UnitId, block: BlockId) {
        if let Some(slot) = self.entries.get_mut(&unit) {
            *slot = Some(block);
        }
    }
}

/// Concatenates every unit's head, body and tail into one group per unit.
///
/// Units without an entry in `vm_ids` run on VM instance 0. Tracked units get their
/// representative recorded in `tracker`.
///
/// # Errors
///
/// Returns [`Error::UnknownBlock`] if a unit references a block that is no longer in the
/// arena, or [`Error::Invariant`] for a tracked unit with neither head nor body.
pub fn flatten(
    function: &TranslatedFunction,
    vm_ids: &BTreeMap<UnitId, u32>,
    tracker: &mut BlockTracker,
) -> Result<Vec<FlatBlockGroup>> {
    let mut groups = Vec::with_capacity(function.units().len());

    for unit in function.units() {
        let blocks = unit.blocks();
        if let Some(missing) = blocks.iter().find(|id| !function.arena().contains(**id)) {
            return Err(Error::UnknownBlock(*missing));
        }

        if tracker.is_tracked(unit.id()) {
            let Some(representative) = unit.representative() else {
                return Err(invariant_error!(
                    "tracked {} has neither head nor body",
                    unit.id()
                ));
            };
            tracker.record(unit.id(), representative);
        }

        groups.push(FlatBlockGroup {
            unit: unit.id(),
            vm_id: vm_ids.get(&unit.id()).copied().unwrap_or(0),
            blocks,
        });
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        analysis::{Mnemonic, X86Register},
        compiler::{pass::UnitPass, HeadElisionPass},
        test::{arith, call, jmp, ret, translate},
    };

    #[test]
    fn test_group_layout() {
        // add ; jmp 0x5 | ret
        let function = translate(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            jmp(0x3, 0x5),
            ret(0x5),
        ]);
        let vm_ids: BTreeMap<UnitId, u32> = [(UnitId::new(1), 3)].into_iter().collect();
        let mut tracker = BlockTracker::new();

        let groups = flatten(&function, &vm_ids, &mut tracker).unwrap();
        assert_eq!(groups.len(), 2);

        let first = &function.units()[0];
        assert_eq!(groups[0].unit, UnitId::new(0));
        assert_eq!(groups[0].vm_id, 0);
        assert_eq!(
            groups[0].blocks,
            vec![first.head.unwrap(), first.body[0], first.tail.unwrap()]
        );

        // returning unit: head and body only
        assert_eq!(groups[1].vm_id, 3);
        assert_eq!(groups[1].blocks.len(), 2);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_tracked_representatives() {
        // unit 0: add ; jmp 0x5 (virtual body) | unit 1: call ; ret (native body)
        let mut function = translate(vec![
            arith(0x0, Mnemonic::Add, X86Register::Eax, 1),
            jmp(0x3, 0x5),
            call(0x5, 0x100),
            ret(0xa),
        ]);
        HeadElisionPass::new()
            .run(&mut function, &HashSet::new())
            .unwrap();

        let mut tracker = BlockTracker::with_units([UnitId::new(0)]);
        tracker.track(UnitId::new(1));
        tracker.track(UnitId::new(1));
        assert_eq!(tracker.len(), 2);
        flatten(&function, &BTreeMap::new(), &mut tracker).unwrap();

        let units = function.units();
        assert_eq!(tracker.representative(UnitId::new(0)), units[0].head);
        assert_eq!(tracker.representative(UnitId::new(1)), Some(units[1].body[0]));
        assert_eq!(tracker.representative(UnitId::new(7)), None);
        assert_eq!(tracker.iter().filter(|(_, b)| b.is_some()).count(), 2);
    }
}
