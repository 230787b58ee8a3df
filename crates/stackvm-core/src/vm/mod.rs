//! Virtual machine execution

mod interpreter;
mod registers;

pub use interpreter::{StepOutcome, Trap, Vm, VmOptions};
pub use registers::Registers;
