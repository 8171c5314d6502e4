//! Block splitting: lifting one basic block into head, body and tail commands.
//!
//! The splitter keeps one *current* block that accumulates consecutive output of the same
//! kind. When the kind changes, the current block is closed and linked to a fresh block:
//!
//! ```text
//! native  -> virtual : branch (non-virtual) to a new virtual block starting with vm_enter
//! virtual -> native  : vm_exit to a new native block
//! ```
//!
//! The head always starts with `vm_enter`. It then either branches (virtually) into the
//! first body block, or leaves the VM again with `vm_exit` when the first body block is
//! native; the optimizer elides heads of the latter kind.

use tracing::trace;

use crate::{
    analysis::{instruction_flags, CpuFlags, DecodedInstruction, FlagLiveness, LivenessAnalyzer, Mnemonic},
    disassembler::{BasicBlock, BlockEndReason},
    ir::{BlockId, BlockState, Branch, BranchTarget, Command, CommandKind, IdAllocator, IrBlock},
    translator::{
        encode_passthrough, BranchResolver, HandlerRegistry, LiftContext, TranslatorConfig,
        UnitId,
    },
    Result,
};

/// Commands produced for one unit, not yet stored in the arena.
#[derive(Debug)]
pub(crate) struct SplitBlock {
    /// Commands of the preallocated head block
    pub head: Vec<Command>,
    /// Body blocks, in order
    pub body: Vec<IrBlock>,
    /// The exit branch of the preallocated tail block; `None` for returning blocks
    pub tail: Option<Command>,
}

/// Lifts basic blocks. Shared by all units of a function and safe to use from several
/// threads at once.
pub(crate) struct BlockSplitter<'a> {
    pub registry: &'a dyn HandlerRegistry,
    pub liveness: Option<&'a dyn LivenessAnalyzer>,
    pub config: &'a TranslatorConfig,
    pub ids: &'a IdAllocator,
    pub resolver: &'a BranchResolver<'a>,
}

impl BlockSplitter<'_> {
    /// Lifts `block`, the source of unit `unit`, whose exit block is `tail`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] if the block's exit cannot be reconstructed, or
    /// [`crate::Error::IllegalCommand`] if a lifter emits a command its block cannot hold.
    pub(crate) fn split(&self, block: &BasicBlock, unit: UnitId, tail: BlockId) -> Result<SplitBlock> {
        let ctx = LiftContext::new(self.ids, self.resolver);
        let mut head = vec![self.ids.command(CommandKind::VmEnter)];
        let mut body = Vec::new();
        let mut current: Option<IrBlock> = None;

        let liveness = match self.liveness {
            Some(analyzer) if self.config.use_liveness => Some(analyzer.analyze_block(block)),
            _ => None,
        };

        for (index, inst) in block.instructions.iter().enumerate() {
            if self.config.is_ignored(inst.mnemonic) {
                continue;
            }

            let rva = block.index_rva(index).unwrap_or(inst.rva);
            let live = liveness.as_ref().and_then(|l| l.get(index));

            if let Some(commands) = self.lift(&ctx, inst, rva, live)? {
                let target = self.switch_to(&mut current, BlockState::Virtual, &mut head, &mut body)?;
                target.extend(commands)?;
            } else {
                trace!(unit = %unit, rva, mnemonic = %inst.mnemonic, "instruction kept native");
                let target = self.switch_to(&mut current, BlockState::Native, &mut head, &mut body)?;
                target.push(self.ids.command(CommandKind::Native(encode_passthrough(inst, rva))))?;
            }
        }

        // nothing was emitted (empty block, or only ignored instructions)
        if current.is_none() {
            self.switch_to(&mut current, BlockState::Native, &mut head, &mut body)?;
        }
        let Some(mut last) = current else {
            return Err(invariant_error!("{}: no current block after lifting", unit));
        };

        let mut exit = match block.end_reason {
            BlockEndReason::Fallthrough => self
                .ids
                .command(CommandKind::Branch(Branch::jump(self.resolver.resolve(block.end_rva()), false))),
            BlockEndReason::UnconditionalJump | BlockEndReason::ConditionalJump => {
                self.detach_exit(&mut last, block, unit)?
            }
            BlockEndReason::Return => {
                body.push(last);
                return Ok(SplitBlock {
                    head,
                    body,
                    tail: None,
                });
            }
        };

        let leave = if last.is_virtual() {
            CommandKind::VmExit(BranchTarget::Block(tail))
        } else {
            CommandKind::Branch(Branch::jump(tail, false))
        };
        last.push(self.ids.command(leave))?;
        body.push(last);

        if let Some(branch) = exit.as_branch_mut() {
            branch.virtual_branch = false;
        }

        Ok(SplitBlock {
            head,
            body,
            tail: Some(exit),
        })
    }

    /// Lifts one instruction, or returns `None` if it has to stay native.
    fn lift(
        &self,
        ctx: &LiftContext<'_>,
        inst: &DecodedInstruction,
        rva: u64,
        live: Option<&FlagLiveness>,
    ) -> Result<Option<Vec<Command>>> {
        // conditional jumps share the jmp handler; the condition travels in the branch
        let mnemonic = if inst.mnemonic.is_jmp_or_jcc() {
            Mnemonic::Jmp
        } else {
            inst.mnemonic
        };

        let Some(generator) = self.registry.handler_for(mnemonic) else {
            return Ok(None);
        };
        if generator.get_handler_id(&inst.operand_shapes()).is_none() {
            return Ok(None);
        }
        let Some(mut lifter) = self.registry.lifter_for(mnemonic, ctx, inst, rva) else {
            return Ok(None);
        };

        if !lifter.translate_to_il(rva, self.relevant_flags(inst, live))? {
            return Ok(None);
        }
        Ok(Some(lifter.take_block()))
    }

    /// Flags a lifter must materialize for `inst`.
    ///
    /// Without liveness every flag the instruction can affect is relevant.
    pub(crate) fn relevant_flags(&self, inst: &DecodedInstruction, live: Option<&FlagLiveness>) -> CpuFlags {
        let affected = self
            .liveness
            .map_or_else(|| instruction_flags(inst), |l| l.compute_inst_flags(inst));
        match live {
            Some(live) => affected & live.live_out,
            None => affected,
        }
    }

    /// Makes sure the current block has `state`, closing and linking the previous one if
    /// it does not.
    fn switch_to<'b>(
        &self,
        current: &'b mut Option<IrBlock>,
        state: BlockState,
        head: &mut Vec<Command>,
        body: &mut Vec<IrBlock>,
    ) -> Result<&'b mut IrBlock> {
        let next_id = match current.as_ref() {
            Some(block) if block.state() == state => None,
            _ => Some(self.ids.block_id()),
        };

        if let Some(next_id) = next_id {
            let mut next = IrBlock::new(next_id, state);
            match (current.take(), state) {
                (None, BlockState::Virtual) => {
                    head.push(self.ids.command(CommandKind::Branch(Branch::jump(next_id, true))));
                }
                (None, BlockState::Native) => {
                    head.push(self.ids.command(CommandKind::VmExit(BranchTarget::Block(next_id))));
                }
                (Some(mut previous), BlockState::Virtual) => {
                    next.push(self.ids.command(CommandKind::VmEnter))?;
                    previous.push(self.ids.command(CommandKind::Branch(Branch::jump(next_id, false))))?;
                    body.push(previous);
                }
                (Some(mut previous), BlockState::Native) => {
                    previous.push(self.ids.command(CommandKind::VmExit(BranchTarget::Block(next_id))))?;
                    body.push(previous);
                }
            }
            *current = Some(next);
        }

        current
            .as_mut()
            .ok_or_else(|| invariant_error!("current block missing after switching to {}", state))
    }

    /// Removes the branch the terminating jump produced from `last`.
    ///
    /// The terminator must have been lifted: its branch carries the resolved targets of
    /// every successor, which a native jump cannot.
    fn detach_exit(&self, last: &mut IrBlock, block: &BasicBlock, unit: UnitId) -> Result<Command> {
        match last.exit().map(Command::kind) {
            Some(CommandKind::Branch(_)) => last
                .pop()
                .ok_or_else(|| invariant_error!("{}: exit vanished from {}", unit, last.id())),
            Some(CommandKind::Native(request)) if request.mnemonic.is_jmp_or_jcc() => Err(invariant_error!(
                "{}: terminating {} of {} was not lifted to a branch",
                unit,
                request.mnemonic,
                block
            )),
            _ => Err(invariant_error!(
                "{}: final command of {} must be a branch",
                unit,
                block
            )),
        }
    }
}
