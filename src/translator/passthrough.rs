//! Native passthrough of instructions that are not virtualized.

use crate::{
    analysis::{DecodedInstruction, X86Operand},
    codec::{calc_relative_rva, contains_rip_relative_operand, decode_to_encode, EncodeOperand, EncodeRequest},
};

/// Builds the encode request that reproduces `instruction` at a new address.
///
/// The instruction-pointer-relative operand, if any, is replaced by the absolute rva it
/// referred to at `rva`, so emission can re-relativize it wherever the block ends up.
/// Segment overrides are carried over as prefixes.
#[must_use]
pub fn encode_passthrough(instruction: &DecodedInstruction, rva: u64) -> EncodeRequest {
    let mut request = decode_to_encode(instruction);
    if !contains_rip_relative_operand(instruction) {
        return request;
    }

    if let Some((target, index)) = calc_relative_rva(instruction, rva) {
        let replacement = match &instruction.operands[index] {
            X86Operand::Memory(mem) => EncodeOperand::RelativeMemory {
                target,
                size: mem.size,
            },
            _ => EncodeOperand::RelativeImmediate { target },
        };
        request.operands[index] = replacement;
    }
    request
}
