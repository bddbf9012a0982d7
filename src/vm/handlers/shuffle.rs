//! `STACK` shapes. They move raw slots, so a wide value and its
//! continuation travel together exactly as the JVM's category-2 rules say.

use crate::vm::error::{InterpreterFault, VmError};
use crate::vm::vm::Interpreter;
use crate::vm::{Instruction, StackShape, Value};

#[inline(never)]
pub(crate) fn apply(vm: &mut Interpreter<'_>, insn: &Instruction) -> Result<(), VmError> {
    let raw = insn.int_operand(0)?;
    let shape = StackShape::from_i32(raw).ok_or(InterpreterFault::BadOperand {
        opcode: "STACK",
        index: 0,
        reason: "unknown stack shape",
    })?;
    let stack = &mut vm.stack;

    let mut pop = |n: usize| -> Result<Vec<Value>, InterpreterFault> {
        // Index 0 is the top of the stack.
        (0..n).map(|_| stack.pop_slot()).collect()
    };
    let order: &[usize] = match shape {
        StackShape::Pop => {
            pop(1)?;
            return Ok(());
        }
        StackShape::Pop2 => {
            pop(2)?;
            return Ok(());
        }
        // Push orders below list popped indices, bottom to top.
        StackShape::Dup => &[0, 0],
        StackShape::DupX1 => &[0, 1, 0],
        StackShape::DupX2 => &[0, 2, 1, 0],
        StackShape::Dup2 => &[1, 0, 1, 0],
        StackShape::Dup2X1 => &[1, 0, 2, 1, 0],
        StackShape::Dup2X2 => &[1, 0, 3, 2, 1, 0],
        StackShape::Swap => &[0, 1],
    };
    let popped_count = order.iter().max().map_or(0, |m| m + 1);
    let popped = pop(popped_count)?;
    for &index in order {
        vm.stack.push_slot(popped[index].clone())?;
    }
    Ok(())
}
