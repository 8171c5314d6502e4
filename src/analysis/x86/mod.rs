//! x86/x64 instruction model.
//!
//! This module provides the structured instruction representation the translator works
//! on, and the flag tables that drive flag-liveness analysis.
//!
//! # Components
//!
//! - [`types`] - Instruction types ([`DecodedInstruction`], [`X86Operand`], [`X86Register`], etc.)
//! - [`flags`] - The [`CpuFlags`] set and per-mnemonic flag tables
//!
//! # Supported Instructions
//!
//! The model names the instructions commonly found in compiler output and in the
//! handful of system instructions that virtualized code must leave native:
//!
//! | Category | Instructions |
//! |----------|--------------|
//! | Data Movement | MOV, MOVZX, MOVSX, MOVSXD, LEA, PUSH, POP, XCHG |
//! | Arithmetic | ADD, SUB, IMUL, MUL, NEG, INC, DEC |
//! | Bitwise | AND, OR, XOR, NOT, SHL, SHR, SAR, ROL, ROR |
//! | Comparison | CMP, TEST |
//! | Control Flow | JMP, Jcc (all conditions), CALL, RET |
//! | Miscellaneous | NOP, CDQ, CWDE, CPUID, RDTSC, SYSCALL, INT3, HLT |

mod flags;
mod types;

pub use flags::{affected_flags, defined_flags, instruction_flags, read_flags, CpuFlags};
pub use types::{
    DecodedInstruction, HandlerOperand, Mnemonic, OperandKind, X86Condition, X86Memory,
    X86Operand, X86Register, X86Segment,
};

#[cfg(test)]
mod tests {
    use crate::analysis::x86::{
        affected_flags, CpuFlags, DecodedInstruction, Mnemonic, X86Memory, X86Operand,
        X86Register,
    };

    /// A compare followed by the jump that consumes it
    #[test]
    fn test_compare_feeds_jump() {
        let cmp = DecodedInstruction::new(
            0x100,
            3,
            Mnemonic::Cmp,
            vec![X86Operand::Register(X86Register::Eax), X86Operand::imm(10, 1)],
        );
        let jl = DecodedInstruction::new(
            0x103,
            2,
            Mnemonic::Jl,
            vec![X86Operand::Relative {
                displacement: 4,
                size: 1,
            }],
        );

        let written = affected_flags(cmp.mnemonic);
        let read = crate::analysis::x86::read_flags(jl.mnemonic);
        assert!(written.contains(read));
        assert_eq!(read, CpuFlags::SF | CpuFlags::OF);
        assert_eq!(jl.branch_target(), Some(0x109));
    }

    /// Memory operand addressing helpers
    #[test]
    fn test_memory_operand() {
        let mem = X86Memory::base_index_scale_disp(X86Register::Ebx, X86Register::Ecx, 4, 8, 4);
        assert_eq!(mem.base, Some(X86Register::Ebx));
        assert_eq!(mem.index, Some(X86Register::Ecx));
        assert_eq!(mem.scale, 4);
        assert_eq!(mem.displacement, 8);
        assert!(!mem.is_rip_relative());
        assert!(X86Operand::Memory(X86Memory::base_disp(X86Register::Rip, 0x40, 8)).is_ip_relative());
    }
}
