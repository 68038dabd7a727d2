//! Transaction validation driver.
//!
//! Dispatches every input script and preamble of a transaction through
//! its own compiler pass and VM. The first failure of any kind
//! invalidates the transaction; there is no recovery.

use tracing::debug;

use crate::compiler::Compiler;
use crate::error::ValidationError;
use crate::interpreter::Interpreter;
use crate::loop_stack::LoopStack;
use crate::loop_tree::decode_loop_trees;
use crate::tx::{Tx, UnlockData};

/// Validate a transaction.
///
/// Checks that the outputs do not spend more than the inputs provide,
/// then runs every input script and preamble against its unlock data.
pub fn verify_tx(tx: &Tx) -> Result<(), ValidationError> {
    let input_sum = tx
        .inputs
        .iter()
        .flat_map(|input| input.outpoints.iter())
        .try_fold(0u64, |sum, outpoint| sum.checked_add(outpoint.amount))
        .ok_or(ValidationError::AmountOverflow)?;
    let output_sum = tx
        .outputs
        .iter()
        .try_fold(0u64, |sum, output| sum.checked_add(output.amount))
        .ok_or(ValidationError::AmountOverflow)?;
    if output_sum > input_sum {
        return Err(ValidationError::OutputExceedsInput {
            inputs: input_sum,
            outputs: output_sum,
        });
    }

    let scripts = tx
        .inputs
        .iter()
        .map(|input| input.bytecode.as_slice())
        .chain(tx.preambles.iter().map(Vec::as_slice));
    for (index, script) in scripts.enumerate() {
        let unlock = tx
            .unlock_data
            .get(index)
            .ok_or(ValidationError::MissingUnlockData(index))?;
        verify_script(index, script, unlock)?;
    }
    Ok(())
}

fn verify_script(index: usize, script: &[u8], unlock: &UnlockData) -> Result<(), ValidationError> {
    let source = std::str::from_utf8(script)
        .ok()
        .filter(|s| s.is_ascii())
        .ok_or(ValidationError::InvalidSource(index))?;

    let trees = decode_loop_trees(&unlock.loop_trees)?;
    let result = Compiler::new().compile(source)?;

    debug!(script = index, ram_size = unlock.ram_size, "running validation script");
    let mut vm = Interpreter::new(LoopStack::new(trees), result.num_locals, unlock.ram_size)
        .with_data(unlock.data.clone());
    vm.run(&result.block)?;
    Ok(())
}
