//! x86/x64 instruction type definitions.
//!
//! This module provides the structured instruction representation that the external
//! codec produces and the translator consumes. It mirrors the shape of a decoder output:
//! a mnemonic plus a list of visible operands, each typed and sized.
//!
//! # Overview
//!
//! The type hierarchy is:
//!
//! - [`X86Register`] - General-purpose registers (8/16/32/64-bit) and `RIP`
//! - [`X86Memory`] - Memory operands with base, index, scale, displacement, segment
//! - [`X86Operand`] - Register, immediate, memory or relative branch displacement
//! - [`Mnemonic`] - Instruction mnemonic, named the way disassemblers print it
//! - [`DecodedInstruction`] - Mnemonic and operands with rva and length metadata
//!
//! # Operand Shapes
//!
//! Handler selection does not look at operand values, only at their shape. The
//! [`HandlerOperand`] pair (kind + size) is that shape; see
//! [`DecodedInstruction::operand_shapes`].

use std::fmt;

use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// x86/x64 general-purpose register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum X86Register {
    /// 32-bit accumulator register (EAX)
    Eax,
    /// 32-bit counter register (ECX)
    Ecx,
    /// 32-bit data register (EDX)
    Edx,
    /// 32-bit base register (EBX)
    Ebx,
    /// 32-bit stack pointer (ESP)
    Esp,
    /// 32-bit base pointer (EBP)
    Ebp,
    /// 32-bit source index (ESI)
    Esi,
    /// 32-bit destination index (EDI)
    Edi,

    /// 64-bit accumulator register (RAX)
    Rax,
    /// 64-bit counter register (RCX)
    Rcx,
    /// 64-bit data register (RDX)
    Rdx,
    /// 64-bit base register (RBX)
    Rbx,
    /// 64-bit stack pointer (RSP)
    Rsp,
    /// 64-bit base pointer (RBP)
    Rbp,
    /// 64-bit source index (RSI)
    Rsi,
    /// 64-bit destination index (RDI)
    Rdi,
    /// 64-bit extended register R8
    R8,
    /// 64-bit extended register R9
    R9,
    /// 64-bit extended register R10
    R10,
    /// 64-bit extended register R11
    R11,
    /// 64-bit extended register R12
    R12,
    /// 64-bit extended register R13
    R13,
    /// 64-bit extended register R14
    R14,
    /// 64-bit extended register R15
    R15,
    /// 64-bit instruction pointer, only valid as a memory base
    Rip,

    /// 8-bit low accumulator (AL)
    Al,
    /// 8-bit low counter (CL)
    Cl,
    /// 8-bit low data (DL)
    Dl,
    /// 8-bit low base (BL)
    Bl,
    /// 8-bit high accumulator (AH)
    Ah,
    /// 8-bit high counter (CH)
    Ch,
    /// 8-bit high data (DH)
    Dh,
    /// 8-bit high base (BH)
    Bh,

    /// 16-bit accumulator register (AX)
    Ax,
    /// 16-bit counter register (CX)
    Cx,
    /// 16-bit data register (DX)
    Dx,
    /// 16-bit base register (BX)
    Bx,
    /// 16-bit stack pointer (SP)
    Sp,
    /// 16-bit base pointer (BP)
    Bp,
    /// 16-bit source index (SI)
    Si,
    /// 16-bit destination index (DI)
    Di,
}

impl X86Register {
    /// Returns the size of this register in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u8 {
        match self {
            X86Register::Al
            | X86Register::Cl
            | X86Register::Dl
            | X86Register::Bl
            | X86Register::Ah
            | X86Register::Ch
            | X86Register::Dh
            | X86Register::Bh => 1,
            X86Register::Ax
            | X86Register::Cx
            | X86Register::Dx
            | X86Register::Bx
            | X86Register::Sp
            | X86Register::Bp
            | X86Register::Si
            | X86Register::Di => 2,
            X86Register::Eax
            | X86Register::Ecx
            | X86Register::Edx
            | X86Register::Ebx
            | X86Register::Esp
            | X86Register::Ebp
            | X86Register::Esi
            | X86Register::Edi => 4,
            X86Register::Rax
            | X86Register::Rcx
            | X86Register::Rdx
            | X86Register::Rbx
            | X86Register::Rsp
            | X86Register::Rbp
            | X86Register::Rsi
            | X86Register::Rdi
            | X86Register::R8
            | X86Register::R9
            | X86Register::R10
            | X86Register::R11
            | X86Register::R12
            | X86Register::R13
            | X86Register::R14
            | X86Register::R15
            | X86Register::Rip => 8,
        }
    }

    /// Returns the full 64-bit register this register is part of.
    ///
    /// AL/AH/AX/EAX/RAX all map to RAX. The VM context stores full-width registers,
    /// so partial registers are addressed through their parent.
    #[must_use]
    pub fn full(&self) -> X86Register {
        match self {
            X86Register::Al
            | X86Register::Ah
            | X86Register::Ax
            | X86Register::Eax
            | X86Register::Rax => X86Register::Rax,
            X86Register::Cl
            | X86Register::Ch
            | X86Register::Cx
            | X86Register::Ecx
            | X86Register::Rcx => X86Register::Rcx,
            X86Register::Dl
            | X86Register::Dh
            | X86Register::Dx
            | X86Register::Edx
            | X86Register::Rdx => X86Register::Rdx,
            X86Register::Bl
            | X86Register::Bh
            | X86Register::Bx
            | X86Register::Ebx
            | X86Register::Rbx => X86Register::Rbx,
            X86Register::Sp | X86Register::Esp | X86Register::Rsp => X86Register::Rsp,
            X86Register::Bp | X86Register::Ebp | X86Register::Rbp => X86Register::Rbp,
            X86Register::Si | X86Register::Esi | X86Register::Rsi => X86Register::Rsi,
            X86Register::Di | X86Register::Edi | X86Register::Rdi => X86Register::Rdi,
            other => *other,
        }
    }

    /// Returns true if this is one of the high-byte registers (AH, CH, DH, BH).
    #[inline]
    #[must_use]
    pub fn is_high_byte(&self) -> bool {
        matches!(
            self,
            X86Register::Ah | X86Register::Ch | X86Register::Dh | X86Register::Bh
        )
    }

    /// Returns true if this is the instruction pointer.
    #[inline]
    #[must_use]
    pub fn is_instruction_pointer(&self) -> bool {
        matches!(self, X86Register::Rip)
    }
}

/// Segment override on a memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum X86Segment {
    /// FS segment (thread block on Linux, rarely used on Windows x64)
    Fs,
    /// GS segment (TEB/PEB access on Windows x64)
    Gs,
}

/// Memory operand representing x86 addressing modes.
///
/// x86 memory operands use the formula: `[base + index*scale + displacement]`
///
/// # Addressing Modes
///
/// - `[disp]` - Absolute address (base=None, index=None)
/// - `[base + disp]` - Base plus displacement
/// - `[base + index*scale + disp]` - Full SIB addressing
/// - `[rip + disp]` - RIP-relative, displacement counted from the next instruction
///
/// # Examples
///
/// ```rust
/// use vmir::analysis::{X86Memory, X86Register};
///
/// // qword ptr [rsp + 16]
/// let stack_arg = X86Memory::base_disp(X86Register::Rsp, 16, 8);
/// assert!(!stack_arg.is_rip_relative());
///
/// // dword ptr [rip + 0x200]
/// let global = X86Memory::base_disp(X86Register::Rip, 0x200, 4);
/// assert!(global.is_rip_relative());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct X86Memory {
    /// Base register (optional). When `None`, uses absolute addressing.
    pub base: Option<X86Register>,
    /// Index register (optional, for SIB addressing).
    pub index: Option<X86Register>,
    /// Scale factor for index register. Valid values: 1, 2, 4, or 8.
    pub scale: u8,
    /// Signed displacement added to the effective address.
    pub displacement: i64,
    /// Size of the memory access in bytes (1, 2, 4, or 8).
    pub size: u8,
    /// Segment override, if any.
    pub segment: Option<X86Segment>,
}

impl X86Memory {
    /// Creates a simple [base + disp] memory operand.
    #[must_use]
    pub fn base_disp(base: X86Register, displacement: i64, size: u8) -> Self {
        Self {
            base: Some(base),
            index: None,
            scale: 1,
            displacement,
            size,
            segment: None,
        }
    }

    /// Creates a [base + index*scale + disp] memory operand.
    #[must_use]
    pub fn base_index_scale_disp(
        base: X86Register,
        index: X86Register,
        scale: u8,
        displacement: i64,
        size: u8,
    ) -> Self {
        Self {
            base: Some(base),
            index: Some(index),
            scale,
            displacement,
            size,
            segment: None,
        }
    }

    /// Creates a [disp] memory operand (absolute address).
    #[must_use]
    pub fn absolute(displacement: i64, size: u8) -> Self {
        Self {
            base: None,
            index: None,
            scale: 1,
            displacement,
            size,
            segment: None,
        }
    }

    /// Returns the same operand with a segment override applied.
    #[must_use]
    pub fn with_segment(mut self, segment: X86Segment) -> Self {
        self.segment = Some(segment);
        self
    }

    /// Returns true if the effective address is computed relative to RIP.
    #[must_use]
    pub fn is_rip_relative(&self) -> bool {
        self.base.is_some_and(|base| base.is_instruction_pointer())
    }
}

/// Operand for an x86 instruction.
///
/// An operand can be a register, immediate value, memory location, or a relative
/// branch displacement (the operand of `jmp rel32`, `jcc rel8`, `call rel32`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum X86Operand {
    /// Register operand (e.g., `eax`, `rcx`)
    Register(X86Register),
    /// Immediate constant value with its encoded size in bytes
    Immediate {
        /// The (sign-extended) immediate value
        value: i64,
        /// Encoded size of the immediate in bytes
        size: u8,
    },
    /// Memory operand (e.g., `[rsp+8]`, `[rax+rcx*4]`)
    Memory(X86Memory),
    /// Branch displacement relative to the end of the instruction
    Relative {
        /// Signed displacement from the next instruction
        displacement: i64,
        /// Encoded size of the displacement in bytes
        size: u8,
    },
}

impl X86Operand {
    /// Shorthand for an immediate operand.
    #[must_use]
    pub fn imm(value: i64, size: u8) -> Self {
        X86Operand::Immediate { value, size }
    }

    /// Returns the size of this operand in bytes.
    #[must_use]
    pub fn size(&self) -> u8 {
        match self {
            X86Operand::Register(reg) => reg.size(),
            X86Operand::Immediate { size, .. } | X86Operand::Relative { size, .. } => *size,
            X86Operand::Memory(mem) => mem.size,
        }
    }

    /// Returns the shape kind of this operand.
    #[must_use]
    pub fn kind(&self) -> OperandKind {
        match self {
            X86Operand::Register(_) => OperandKind::Register,
            X86Operand::Immediate { .. } => OperandKind::Immediate,
            X86Operand::Memory(_) => OperandKind::Memory,
            X86Operand::Relative { .. } => OperandKind::Relative,
        }
    }

    /// Returns true if this is a register operand.
    #[must_use]
    pub fn is_register(&self) -> bool {
        matches!(self, X86Operand::Register(_))
    }

    /// Returns true if the operand's value depends on the instruction's own address.
    #[must_use]
    pub fn is_ip_relative(&self) -> bool {
        match self {
            X86Operand::Memory(mem) => mem.is_rip_relative(),
            X86Operand::Relative { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for X86Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X86Operand::Register(reg) => write!(f, "{reg}"),
            X86Operand::Immediate { value, .. } => write!(f, "0x{value:x}"),
            X86Operand::Relative { displacement, .. } => write!(f, "$+0x{displacement:x}"),
            X86Operand::Memory(mem) => {
                if let Some(segment) = mem.segment {
                    write!(f, "{segment}:")?;
                }
                write!(f, "[")?;
                let mut first = true;
                if let Some(base) = mem.base {
                    write!(f, "{base}")?;
                    first = false;
                }
                if let Some(index) = mem.index {
                    if !first {
                        write!(f, "+")?;
                    }
                    write!(f, "{index}*{}", mem.scale)?;
                    first = false;
                }
                if mem.displacement != 0 || first {
                    if !first {
                        write!(f, "+")?;
                    }
                    write!(f, "0x{:x}", mem.displacement)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Shape kind of an operand, as seen by handler selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OperandKind {
    /// Register operand
    Register,
    /// Memory operand
    Memory,
    /// Immediate operand
    Immediate,
    /// Relative branch displacement
    Relative,
}

/// The shape of one visible operand: its kind and its size in bytes.
///
/// A list of these is the signature a handler generator matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerOperand {
    /// Operand kind
    pub kind: OperandKind,
    /// Operand size in bytes
    pub size: u8,
}

impl HandlerOperand {
    /// Creates a new operand shape.
    #[must_use]
    pub const fn new(kind: OperandKind, size: u8) -> Self {
        Self { kind, size }
    }
}

/// Instruction mnemonic.
///
/// Names follow the Intel forms disassemblers print (`jnbe` rather than `ja`), which is
/// also the form the exit-condition table is keyed on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
    EnumCount,
)]
#[strum(serialize_all = "lowercase")]
pub enum Mnemonic {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Increment
    Inc,
    /// Decrement
    Dec,
    /// Two's complement negation
    Neg,
    /// Signed multiplication
    Imul,
    /// Unsigned multiplication
    Mul,
    /// Bitwise AND
    And,
    /// Bitwise OR
    Or,
    /// Bitwise XOR
    Xor,
    /// Bitwise NOT
    Not,
    /// Shift left
    Shl,
    /// Logical shift right
    Shr,
    /// Arithmetic shift right
    Sar,
    /// Rotate left
    Rol,
    /// Rotate right
    Ror,
    /// Compare
    Cmp,
    /// Logical compare
    Test,
    /// Move
    Mov,
    /// Move with zero extension
    Movzx,
    /// Move with sign extension
    Movsx,
    /// Move with sign extension (dword to qword)
    Movsxd,
    /// Load effective address
    Lea,
    /// Push onto stack
    Push,
    /// Pop from stack
    Pop,
    /// Exchange
    Xchg,
    /// Unconditional jump
    Jmp,
    /// Jump if overflow
    Jo,
    /// Jump if not overflow
    Jno,
    /// Jump if sign
    Js,
    /// Jump if not sign
    Jns,
    /// Jump if zero
    Jz,
    /// Jump if not zero
    Jnz,
    /// Jump if below
    Jb,
    /// Jump if not below
    Jnb,
    /// Jump if below or equal
    Jbe,
    /// Jump if not below or equal
    Jnbe,
    /// Jump if less
    Jl,
    /// Jump if not less
    Jnl,
    /// Jump if less or equal
    Jle,
    /// Jump if not less or equal
    Jnle,
    /// Jump if parity
    Jp,
    /// Jump if not parity
    Jnp,
    /// Jump if CX is zero
    Jcxz,
    /// Jump if ECX is zero
    Jecxz,
    /// Jump if RCX is zero
    Jrcxz,
    /// Jump if mask register is not zero (AVX-512 KNC)
    Jknzd,
    /// Jump if mask register is zero (AVX-512 KNC)
    Jkzd,
    /// Call procedure
    Call,
    /// Return from procedure
    Ret,
    /// No operation
    Nop,
    /// Sign-extend EAX into EDX:EAX
    Cdq,
    /// Sign-extend AX into EAX
    Cwde,
    /// Processor identification
    Cpuid,
    /// Read time-stamp counter
    Rdtsc,
    /// Fast system call
    Syscall,
    /// Breakpoint
    Int3,
    /// Halt
    Hlt,
}

impl Mnemonic {
    /// Returns true for `jmp` and every conditional jump form.
    #[must_use]
    pub fn is_jmp_or_jcc(&self) -> bool {
        *self == Mnemonic::Jmp || self.is_conditional_jump()
    }

    /// Returns true for conditional jump forms only.
    #[must_use]
    pub fn is_conditional_jump(&self) -> bool {
        matches!(
            self,
            Mnemonic::Jo
                | Mnemonic::Jno
                | Mnemonic::Js
                | Mnemonic::Jns
                | Mnemonic::Jz
                | Mnemonic::Jnz
                | Mnemonic::Jb
                | Mnemonic::Jnb
                | Mnemonic::Jbe
                | Mnemonic::Jnbe
                | Mnemonic::Jl
                | Mnemonic::Jnl
                | Mnemonic::Jle
                | Mnemonic::Jnle
                | Mnemonic::Jp
                | Mnemonic::Jnp
                | Mnemonic::Jcxz
                | Mnemonic::Jecxz
                | Mnemonic::Jrcxz
                | Mnemonic::Jknzd
                | Mnemonic::Jkzd
        )
    }

    /// Returns true if the instruction ends a basic block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.is_jmp_or_jcc() || matches!(self, Mnemonic::Ret | Mnemonic::Hlt)
    }

    /// Returns the flag condition a conditional jump tests, if it is a flag test.
    ///
    /// Register-test jumps (`jcxz` family) and mask-register jumps return `None`.
    #[must_use]
    pub fn condition(&self) -> Option<X86Condition> {
        Some(match self {
            Mnemonic::Jo => X86Condition::O,
            Mnemonic::Jno => X86Condition::No,
            Mnemonic::Js => X86Condition::S,
            Mnemonic::Jns => X86Condition::Ns,
            Mnemonic::Jz => X86Condition::E,
            Mnemonic::Jnz => X86Condition::Ne,
            Mnemonic::Jb => X86Condition::B,
            Mnemonic::Jnb => X86Condition::Ae,
            Mnemonic::Jbe => X86Condition::Be,
            Mnemonic::Jnbe => X86Condition::A,
            Mnemonic::Jl => X86Condition::L,
            Mnemonic::Jnl => X86Condition::Ge,
            Mnemonic::Jle => X86Condition::Le,
            Mnemonic::Jnle => X86Condition::G,
            Mnemonic::Jp => X86Condition::P,
            Mnemonic::Jnp => X86Condition::Np,
            _ => return None,
        })
    }
}

/// Condition codes for conditional jumps (Jcc instructions).
///
/// Complementary jumps map to complementary conditions (`jz` to `E`, `jnz` to `Ne`).
/// Liveness reads a jump's flag inputs from its condition.
///
/// # Flag Dependencies
///
/// | Condition | Flags Checked | Common Use |
/// |-----------|---------------|------------|
/// | `E`/`Ne` | ZF | Equality comparison |
/// | `L`/`Ge`/`Le`/`G` | SF, OF, ZF | Signed comparison |
/// | `B`/`Ae`/`Be`/`A` | CF, ZF | Unsigned comparison |
/// | `S`/`Ns` | SF | Sign check |
/// | `O`/`No` | OF | Overflow check |
/// | `P`/`Np` | PF | Parity check |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum X86Condition {
    /// Equal (ZF=1)
    E,
    /// Not equal (ZF=0)
    Ne,
    /// Less than (SF!=OF)
    L,
    /// Greater than or equal (SF=OF)
    Ge,
    /// Less than or equal (ZF=1 or SF!=OF)
    Le,
    /// Greater than (ZF=0 and SF=OF)
    G,
    /// Below (CF=1)
    B,
    /// Above or equal (CF=0)
    Ae,
    /// Below or equal (CF=1 or ZF=1)
    Be,
    /// Above (CF=0 and ZF=0)
    A,
    /// Sign (SF=1)
    S,
    /// Not sign (SF=0)
    Ns,
    /// Overflow (OF=1)
    O,
    /// Not overflow (OF=0)
    No,
    /// Parity even (PF=1)
    P,
    /// Parity odd (PF=0)
    Np,
}

/// A decoded x86 instruction with its location metadata.
///
/// Immutable once produced by the codec. Only the visible operands are kept; implicit
/// operands (the stack pointer of `push`, the flags register) are not listed.
///
/// # Example
///
/// ```rust
/// use vmir::analysis::{DecodedInstruction, Mnemonic, X86Operand, X86Register};
///
/// let add = DecodedInstruction::new(
///     0x1000,
///     4,
///     Mnemonic::Add,
///     vec![X86Operand::Register(X86Register::Rax), X86Operand::imm(1, 1)],
/// );
/// assert_eq!(add.end_rva(), 0x1004);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Relative virtual address of the instruction.
    pub rva: u64,
    /// Length of the encoded instruction in bytes (1-15 for x86).
    pub length: usize,
    /// The instruction mnemonic.
    pub mnemonic: Mnemonic,
    /// Visible operands, in encoding order.
    pub operands: Vec<X86Operand>,
}

impl DecodedInstruction {
    /// Creates a new decoded instruction.
    #[must_use]
    pub fn new(rva: u64, length: usize, mnemonic: Mnemonic, operands: Vec<X86Operand>) -> Self {
        Self {
            rva,
            length,
            mnemonic,
            operands,
        }
    }

    /// Returns the rva immediately after this instruction.
    #[inline]
    #[must_use]
    pub fn end_rva(&self) -> u64 {
        self.rva.wrapping_add(self.length as u64)
    }

    /// Returns the operand-shape signature used for handler lookup.
    #[must_use]
    pub fn operand_shapes(&self) -> Vec<HandlerOperand> {
        self.operands
            .iter()
            .map(|op| HandlerOperand::new(op.kind(), op.size()))
            .collect()
    }

    /// Returns the absolute target of a relative branch operand, if present.
    ///
    /// The target is computed from the instruction's original rva.
    #[must_use]
    pub fn branch_target(&self) -> Option<u64> {
        self.operands.iter().find_map(|op| match op {
            X86Operand::Relative { displacement, .. } => {
                Some(self.end_rva().wrapping_add_signed(*displacement))
            }
            _ => None,
        })
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{op}")?;
        }
        Ok(())
    }
}
