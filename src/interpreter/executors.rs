use super::Interpreter;
use crate::belt::{BeltNum, Width};
use crate::error::TrapReason;
use crate::instruction::{Break, Instruction};

use tracing::trace;

impl Interpreter {
    /// Execute one instruction, returning the break it raised, if any.
    pub(crate) fn execute(&mut self, instruction: &Instruction) -> Result<Option<Break>, TrapReason> {
        self.ic += 1;
        trace!(ic = self.ic, "execute {instruction:?}");

        match instruction {
            Instruction::Nop => Ok(None),
            Instruction::Unreachable => Err(TrapReason::UnreachableCode),
            Instruction::Const(num) => {
                self.belt.push(*num);
                Ok(None)
            }
            Instruction::LocalGet(index) => self.local_get(*index),
            Instruction::LocalSet(index) => self.local_set(*index),
            Instruction::IsErr(index) => self.is_err(*index),
            Instruction::Verify(index) => self.verify(*index),
            Instruction::VerifyOk(index) => self.verify_ok(*index),
            Instruction::Ram => self.push_ram(),
            Instruction::Data { index } => self.push_data(*index),
            Instruction::SliceLen(index) => self.slice_len(*index),
            Instruction::SliceOp { slice, count, op } => self.slice_op(*slice, *count, *op),
            Instruction::SubSlice {
                slice,
                start,
                length,
            } => self.subslice(*slice, *start, *length),
            Instruction::Load {
                width,
                slice,
                offset,
            } => self.load(*width, *slice, *offset),
            Instruction::Store {
                value,
                slice,
                offset,
            } => self.store(*value, *slice, *offset),
            Instruction::Arith {
                a,
                b,
                is_signed,
                mode,
                op,
            } => self.arith(*a, *b, *is_signed, *mode, *op),
            Instruction::DivMod { a, b, is_signed } => self.divmod(*a, *b, *is_signed),
            Instruction::Rel {
                a,
                b,
                is_signed,
                op,
            } => self.rel(*a, *b, *is_signed, *op),
            Instruction::RelVerify {
                a,
                b,
                is_signed,
                op,
            } => self.rel_verify(*a, *b, *is_signed, *op),
            Instruction::Convert {
                value,
                width,
                is_signed,
                kind,
            } => self.convert(*value, *width, *is_signed, *kind),
            Instruction::Br(depth) => Ok(Some(Break {
                depth: *depth,
                is_continue: false,
            })),
            Instruction::BrIf { condition, depth } => self.br_if(*condition, *depth),
            Instruction::BrContinue(depth) => Ok(Some(Break {
                depth: *depth,
                is_continue: true,
            })),
            Instruction::Loop(body) => self.exec_loop(body),
            Instruction::If {
                condition,
                then_block,
                else_block,
            } => self.exec_if(*condition, then_block, else_block),
            Instruction::AlignBlock { alignment, block } => self.align_block(*alignment, block),
        }
    }

    fn local_get(&mut self, index: usize) -> Result<Option<Break>, TrapReason> {
        let item = *self
            .locals
            .get(index)
            .ok_or(TrapReason::LocalIndexOutOfRange)?;
        self.belt.push(item);
        Ok(None)
    }

    fn local_set(&mut self, index: usize) -> Result<Option<Break>, TrapReason> {
        let item = self.belt.get(0)?;
        *self
            .locals
            .get_mut(index)
            .ok_or(TrapReason::LocalIndexOutOfRange)? = item;
        Ok(None)
    }

    fn is_err(&mut self, index: usize) -> Result<Option<Break>, TrapReason> {
        let num = self.belt.get_num(index)?;
        self.belt.push(BeltNum::new(Width::W8, num.is_err() as u64));
        Ok(None)
    }

    fn verify(&mut self, index: usize) -> Result<Option<Break>, TrapReason> {
        match self.belt.get_num(index)?.value() {
            None | Some(0) => Err(TrapReason::VerifyFailed),
            Some(_) => Ok(None),
        }
    }

    fn verify_ok(&mut self, index: usize) -> Result<Option<Break>, TrapReason> {
        match self.belt.get_num(index)?.value() {
            None => Err(TrapReason::VerifyFailed),
            Some(_) => Ok(None),
        }
    }
}
