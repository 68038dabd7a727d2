use super::Interpreter;
use crate::error::TrapReason;
use crate::instruction::{Block, Break};

impl Interpreter {
    /// Run a block in order. A break raised by an instruction ends the
    /// block: depth is decremented across this boundary, and a break
    /// that already reached depth zero is absorbed here.
    pub(crate) fn run_block(&mut self, block: &Block) -> Result<Option<Break>, TrapReason> {
        for instruction in block.instructions() {
            if let Some(br) = self.execute(instruction)? {
                if br.depth > 0 {
                    return Ok(Some(Break {
                        depth: br.depth - 1,
                        is_continue: br.is_continue,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// The witness decides the iteration count: advance the loop stack
    /// before every iteration and exit when it reports completion.
    pub(crate) fn exec_loop(&mut self, body: &Block) -> Result<Option<Break>, TrapReason> {
        self.loop_stack.start_loop()?;
        loop {
            if self.loop_stack.next()? {
                return Ok(None);
            }
            if let Some(br) = self.run_block(body)? {
                if br.depth == 0 && br.is_continue {
                    self.loop_stack.continue_loop()?;
                    continue;
                }
                self.loop_stack.break_loop()?;
                return Ok(Some(br));
            }
        }
    }

    pub(crate) fn exec_if(
        &mut self,
        condition: usize,
        then_block: &Block,
        else_block: &Block,
    ) -> Result<Option<Break>, TrapReason> {
        let condition = self.belt.get_num(condition)?.expect_value()?;
        let block = if condition != 0 { then_block } else { else_block };
        let br = self.run_block(block)?;
        if let Some(br) = br {
            if br.depth == 0 && br.is_continue {
                return Err(TrapReason::ContinueOutsideLoop);
            }
        }
        Ok(br)
    }

    pub(crate) fn br_if(&mut self, condition: usize, depth: usize) -> Result<Option<Break>, TrapReason> {
        if self.belt.get_num(condition)?.expect_value()? != 0 {
            Ok(Some(Break {
                depth,
                is_continue: false,
            }))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn align_block(
        &mut self,
        alignment: u64,
        block: &Block,
    ) -> Result<Option<Break>, TrapReason> {
        let previous = self.alignment;
        self.alignment = alignment;
        let br = self.run_block(block);
        self.alignment = previous;
        br
    }
}
