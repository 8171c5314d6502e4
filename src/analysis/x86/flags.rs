//! x86 status flag modeling.
//!
//! This module provides the flag set type used by liveness analysis and by the lifter to
//! decide which flags a virtualized handler has to materialize, together with per-mnemonic
//! tables describing how each instruction interacts with the flags register.
//!
//! # Overview
//!
//! Three questions are answered for each instruction:
//!
//! - [`affected_flags`] - which flags the instruction *may* write
//! - [`defined_flags`] - which flags the instruction *always* overwrites (kills liveness)
//! - [`read_flags`] - which flags the instruction observes
//!
//! `affected` is a superset of `defined`. Shifts and rotates are the typical difference:
//! a zero count leaves every flag untouched, so they affect flags without defining any.
//!
//! # Flag Dependencies
//!
//! | Condition | Flags |
//! |-----------|-------|
//! | E/NE | ZF |
//! | L/GE | SF, OF |
//! | LE/G | ZF, SF, OF |
//! | B/AE | CF |
//! | BE/A | CF, ZF |
//! | S/NS | SF |
//! | O/NO | OF |
//! | P/NP | PF |

use std::fmt;

use bitflags::bitflags;

use crate::analysis::x86::types::{DecodedInstruction, Mnemonic, X86Condition};

bitflags! {
    /// A set of x86 status flags, using the architectural RFLAGS bit positions.
    ///
    /// The values are the RFLAGS bits themselves, so a set can be used directly as the
    /// mask of a flags store.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CpuFlags: u32 {
        /// Carry flag
        const CF = 1 << 0;
        /// Parity flag
        const PF = 1 << 2;
        /// Auxiliary carry flag
        const AF = 1 << 4;
        /// Zero flag
        const ZF = 1 << 6;
        /// Sign flag
        const SF = 1 << 7;
        /// Direction flag
        const DF = 1 << 10;
        /// Overflow flag
        const OF = 1 << 11;

        /// The six arithmetic status flags
        const STATUS = Self::CF.bits()
            | Self::PF.bits()
            | Self::AF.bits()
            | Self::ZF.bits()
            | Self::SF.bits()
            | Self::OF.bits();
    }
}

impl CpuFlags {
    /// Returns the flags a conditional jump condition tests.
    #[must_use]
    pub fn for_condition(condition: X86Condition) -> Self {
        match condition {
            X86Condition::E | X86Condition::Ne => CpuFlags::ZF,
            X86Condition::L | X86Condition::Ge => CpuFlags::SF | CpuFlags::OF,
            X86Condition::Le | X86Condition::G => CpuFlags::ZF | CpuFlags::SF | CpuFlags::OF,
            X86Condition::B | X86Condition::Ae => CpuFlags::CF,
            X86Condition::Be | X86Condition::A => CpuFlags::CF | CpuFlags::ZF,
            X86Condition::S | X86Condition::Ns => CpuFlags::SF,
            X86Condition::O | X86Condition::No => CpuFlags::OF,
            X86Condition::P | X86Condition::Np => CpuFlags::PF,
        }
    }
}

impl fmt::Display for CpuFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }

        let mut first = true;
        for (name, _) in self.iter_names() {
            if name == "STATUS" {
                continue;
            }
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", name.to_ascii_lowercase())?;
            first = false;
        }
        Ok(())
    }
}

/// Returns the flags an instruction with this mnemonic can write.
///
/// This is the upper bound a handler would have to compute if nothing were known about
/// which flags are read afterwards.
#[must_use]
pub fn affected_flags(mnemonic: Mnemonic) -> CpuFlags {
    match mnemonic {
        Mnemonic::Add
        | Mnemonic::Sub
        | Mnemonic::Cmp
        | Mnemonic::Neg
        | Mnemonic::And
        | Mnemonic::Or
        | Mnemonic::Xor
        | Mnemonic::Test
        | Mnemonic::Imul
        | Mnemonic::Mul
        | Mnemonic::Shl
        | Mnemonic::Shr
        | Mnemonic::Sar => CpuFlags::STATUS,
        Mnemonic::Inc | Mnemonic::Dec => CpuFlags::STATUS - CpuFlags::CF,
        Mnemonic::Rol | Mnemonic::Ror => CpuFlags::CF | CpuFlags::OF,
        _ => CpuFlags::empty(),
    }
}

/// Returns the flags an instruction with this mnemonic always overwrites.
///
/// Flags that are left undefined by the architecture (AF after logic ops, most flags
/// after multiplication) are not counted as defined; their old value is not guaranteed
/// to be destroyed, so liveness must not be killed for them.
#[must_use]
pub fn defined_flags(mnemonic: Mnemonic) -> CpuFlags {
    match mnemonic {
        Mnemonic::Add | Mnemonic::Sub | Mnemonic::Cmp | Mnemonic::Neg => CpuFlags::STATUS,
        Mnemonic::Inc | Mnemonic::Dec => CpuFlags::STATUS - CpuFlags::CF,
        Mnemonic::And | Mnemonic::Or | Mnemonic::Xor | Mnemonic::Test => {
            CpuFlags::STATUS - CpuFlags::AF
        }
        Mnemonic::Imul | Mnemonic::Mul => CpuFlags::CF | CpuFlags::OF,
        _ => CpuFlags::empty(),
    }
}

/// Returns the flags an instruction observes.
#[must_use]
pub fn read_flags(mnemonic: Mnemonic) -> CpuFlags {
    mnemonic
        .condition()
        .map_or(CpuFlags::empty(), CpuFlags::for_condition)
}

/// Returns the flags a concrete instruction can write.
///
/// Identical to [`affected_flags`] except for shifts and rotates by an immediate zero,
/// which are architectural no-ops for the flags register.
#[must_use]
pub fn instruction_flags(instruction: &DecodedInstruction) -> CpuFlags {
    let by_count = matches!(
        instruction.mnemonic,
        Mnemonic::Shl | Mnemonic::Shr | Mnemonic::Sar | Mnemonic::Rol | Mnemonic::Ror
    );
    if by_count {
        if let Some(crate::analysis::X86Operand::Immediate { value: 0, .. }) =
            instruction.operands.get(1)
        {
            return CpuFlags::empty();
        }
    }
    affected_flags(instruction.mnemonic)
}
