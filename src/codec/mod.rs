//! Encoder-side instruction requests.
//!
//! The decoder produces [`DecodedInstruction`]s; code emission consumes
//! [`EncodeRequest`]s. This module converts between the two and computes the absolute
//! targets of instruction-pointer-relative operands, so that an instruction can be moved
//! to a new address without changing what it refers to.
//!
//! # Relocatable Operands
//!
//! An operand whose meaning depends on the instruction's own address (`[rip + disp]`, or a
//! relative branch displacement) is stored as an *absolute* target rva instead:
//!
//! - [`EncodeOperand::RelativeMemory`] - a RIP-relative memory access to `target`
//! - [`EncodeOperand::RelativeImmediate`] - a relative branch to `target`
//!
//! The emitter re-relativizes these once the final address of the instruction is known.
//!
//! # Example
//!
//! ```rust
//! use vmir::analysis::{DecodedInstruction, Mnemonic, X86Memory, X86Operand, X86Register};
//! use vmir::codec::{calc_relative_rva, contains_rip_relative_operand};
//!
//! // mov rax, [rip + 0x100] at 0x1000, 7 bytes long
//! let inst = DecodedInstruction::new(0x1000, 7, Mnemonic::Mov, vec![
//!     X86Operand::Register(X86Register::Rax),
//!     X86Operand::Memory(X86Memory::base_disp(X86Register::Rip, 0x100, 8)),
//! ]);
//!
//! assert!(contains_rip_relative_operand(&inst));
//! assert_eq!(calc_relative_rva(&inst, inst.rva), Some((0x1107, 1)));
//! ```

use std::fmt;

use bitflags::bitflags;

use crate::analysis::{DecodedInstruction, Mnemonic, X86Memory, X86Operand, X86Register, X86Segment};

bitflags! {
    /// Instruction prefixes carried through re-encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Prefixes: u8 {
        /// FS segment override
        const SEGMENT_FS = 0x01;
        /// GS segment override
        const SEGMENT_GS = 0x02;
    }
}

impl Prefixes {
    /// The prefix that reproduces a segment override.
    #[must_use]
    pub fn for_segment(segment: X86Segment) -> Self {
        match segment {
            X86Segment::Fs => Prefixes::SEGMENT_FS,
            X86Segment::Gs => Prefixes::SEGMENT_GS,
        }
    }
}

/// An operand of an [`EncodeRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EncodeOperand {
    /// Register operand
    Register(X86Register),
    /// Immediate operand
    Immediate {
        /// Immediate value
        value: i64,
        /// Encoded size in bytes
        size: u8,
    },
    /// Memory operand with its segment override moved into the request prefixes
    Memory {
        /// Base register
        base: Option<X86Register>,
        /// Index register
        index: Option<X86Register>,
        /// Index scale
        scale: u8,
        /// Displacement
        displacement: i64,
        /// Access size in bytes
        size: u8,
    },
    /// RIP-relative memory access, stored as the absolute rva it refers to
    RelativeMemory {
        /// Absolute rva of the accessed memory
        target: u64,
        /// Access size in bytes
        size: u8,
    },
    /// Relative branch operand, stored as the absolute rva it transfers to
    RelativeImmediate {
        /// Absolute rva of the branch target
        target: u64,
    },
}

impl EncodeOperand {
    /// Returns true if the operand carries an absolute target that must be re-relativized.
    #[must_use]
    pub fn is_relocatable(&self) -> bool {
        matches!(
            self,
            EncodeOperand::RelativeMemory { .. } | EncodeOperand::RelativeImmediate { .. }
        )
    }

    fn from_memory(mem: &X86Memory) -> Self {
        EncodeOperand::Memory {
            base: mem.base,
            index: mem.index,
            scale: mem.scale,
            displacement: mem.displacement,
            size: mem.size,
        }
    }
}

impl fmt::Display for EncodeOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeOperand::Register(reg) => write!(f, "{reg}"),
            EncodeOperand::Immediate { value, .. } => write!(f, "0x{value:x}"),
            EncodeOperand::Memory {
                base,
                index,
                scale,
                displacement,
                ..
            } => {
                write!(f, "[")?;
                if let Some(base) = base {
                    write!(f, "{base}+")?;
                }
                if let Some(index) = index {
                    write!(f, "{index}*{scale}+")?;
                }
                write!(f, "0x{displacement:x}]")
            }
            EncodeOperand::RelativeMemory { target, .. } => write!(f, "[abs 0x{target:x}]"),
            EncodeOperand::RelativeImmediate { target } => write!(f, "abs 0x{target:x}"),
        }
    }
}

/// A request to encode one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodeRequest {
    /// Instruction mnemonic
    pub mnemonic: Mnemonic,
    /// Visible operands in encoding order
    pub operands: Vec<EncodeOperand>,
    /// Prefixes to emit
    pub prefixes: Prefixes,
}

impl EncodeRequest {
    /// Creates a request without operands.
    #[must_use]
    pub fn new(mnemonic: Mnemonic) -> Self {
        EncodeRequest {
            mnemonic,
            operands: Vec::new(),
            prefixes: Prefixes::empty(),
        }
    }

    /// Returns true if any operand needs re-relativizing at emission.
    #[must_use]
    pub fn is_relocatable(&self) -> bool {
        self.operands.iter().any(EncodeOperand::is_relocatable)
    }
}

impl fmt::Display for EncodeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefixes.contains(Prefixes::SEGMENT_GS) {
            write!(f, "gs ")?;
        }
        if self.prefixes.contains(Prefixes::SEGMENT_FS) {
            write!(f, "fs ")?;
        }
        write!(f, "{}", self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{op}")?;
        }
        Ok(())
    }
}

/// Converts a decoded instruction into an encode request, keeping operands as decoded.
///
/// Segment overrides on memory operands become request prefixes. Relative branch
/// displacements are resolved against the instruction's own rva, since a bare
/// displacement cannot be re-encoded anywhere else.
#[must_use]
pub fn decode_to_encode(instruction: &DecodedInstruction) -> EncodeRequest {
    let mut request = EncodeRequest::new(instruction.mnemonic);
    for operand in &instruction.operands {
        let encoded = match operand {
            X86Operand::Register(reg) => EncodeOperand::Register(*reg),
            X86Operand::Immediate { value, size } => EncodeOperand::Immediate {
                value: *value,
                size: *size,
            },
            X86Operand::Memory(mem) => {
                if let Some(segment) = mem.segment {
                    request.prefixes |= Prefixes::for_segment(segment);
                }
                EncodeOperand::from_memory(mem)
            }
            X86Operand::Relative { displacement, .. } => EncodeOperand::RelativeImmediate {
                target: instruction.end_rva().wrapping_add_signed(*displacement),
            },
        };
        request.operands.push(encoded);
    }
    request
}

/// Returns true if any visible operand is addressed relative to the instruction pointer.
#[must_use]
pub fn contains_rip_relative_operand(instruction: &DecodedInstruction) -> bool {
    instruction.operands.iter().any(X86Operand::is_ip_relative)
}

/// Computes the absolute target of the first instruction-pointer-relative operand.
///
/// `rva` is the address the instruction was decoded at. The target is
/// `rva + length + displacement`, the way the processor resolves it.
///
/// # Returns
///
/// The absolute target rva and the index of the operand it belongs to, or `None` if the
/// instruction has no such operand.
#[must_use]
pub fn calc_relative_rva(instruction: &DecodedInstruction, rva: u64) -> Option<(u64, usize)> {
    let next = rva.wrapping_add(instruction.length as u64);
    instruction
        .operands
        .iter()
        .enumerate()
        .find_map(|(index, operand)| match operand {
            X86Operand::Memory(mem) if mem.is_rip_relative() => {
                Some((next.wrapping_add_signed(mem.displacement), index))
            }
            X86Operand::Relative { displacement, .. } => {
                Some((next.wrapping_add_signed(*displacement), index))
            }
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_rva_wraps_at_address_space_end() {
        let jmp = DecodedInstruction::new(
            u64::MAX - 1,
            2,
            Mnemonic::Jmp,
            vec![X86Operand::Relative {
                displacement: 0x10,
                size: 1,
            }],
        );
        assert_eq!(calc_relative_rva(&jmp, u64::MAX - 1), Some((0x10, 0)));
        assert_eq!(jmp.end_rva(), 0);
        assert_eq!(jmp.branch_target(), Some(0x10));
    }

    #[test]
    fn test_decode_to_encode_plain() {
        let inst = DecodedInstruction::new(
            0x40,
            4,
            Mnemonic::Mov,
            vec![
                X86Operand::Register(X86Register::Ecx),
                X86Operand::Memory(X86Memory::base_disp(X86Register::Rsp, 0x10, 4)),
            ],
        );
        let request = decode_to_encode(&inst);

        assert_eq!(request.mnemonic, Mnemonic::Mov);
        assert_eq!(request.prefixes, Prefixes::empty());
        assert_eq!(request.operands[0], EncodeOperand::Register(X86Register::Ecx));
        assert!(!request.is_relocatable());
        assert_eq!(request.to_string(), "mov ecx, [rsp+0x10]");
    }

    #[test]
    fn test_segment_becomes_prefix() {
        let inst = DecodedInstruction::new(
            0,
            9,
            Mnemonic::Mov,
            vec![
                X86Operand::Register(X86Register::Rax),
                X86Operand::Memory(X86Memory::absolute(0x60, 8).with_segment(X86Segment::Gs)),
            ],
        );
        let request = decode_to_encode(&inst);
        assert_eq!(request.prefixes, Prefixes::SEGMENT_GS);
        assert!(request.to_string().starts_with("gs mov"));
    }

    #[test]
    fn test_calc_relative_rva() {
        let lea = DecodedInstruction::new(
            0x2000,
            7,
            Mnemonic::Lea,
            vec![
                X86Operand::Register(X86Register::Rcx),
                X86Operand::Memory(X86Memory::base_disp(X86Register::Rip, -0x20, 8)),
            ],
        );
        assert!(contains_rip_relative_operand(&lea));
        assert_eq!(calc_relative_rva(&lea, 0x2000), Some((0x2007 - 0x20, 1)));

        let call = DecodedInstruction::new(
            0x3000,
            5,
            Mnemonic::Call,
            vec![X86Operand::Relative {
                displacement: 0x100,
                size: 4,
            }],
        );
        assert_eq!(calc_relative_rva(&call, 0x3000), Some((0x3105, 0)));

        let add = DecodedInstruction::new(
            0,
            3,
            Mnemonic::Add,
            vec![X86Operand::Register(X86Register::Eax), X86Operand::imm(1, 1)],
        );
        assert!(!contains_rip_relative_operand(&add));
        assert_eq!(calc_relative_rva(&add, 0), None);
    }
}
