//! Virtual machine interpreter

use super::Registers;
use crate::{
    stack::{DumpSink, ErrorCode, GuardedStack, StackOptions},
    VmError, VmResult,
};
use stackvm_bytecode::{BytecodeReader, JumpCondition, Opcode, Operand, Program, Register};
use std::io::{self, BufRead, Stdout, StdinLock, Write};

/// VM configuration
#[derive(Debug)]
pub struct VmOptions {
    /// Poison value of the operand stack; random when `None`
    pub poison: Option<i32>,
    /// Operand stack name printed in dumps
    pub stack_name: String,
    /// Where stack dumps go
    pub dump_sink: DumpSink,
    /// Dump the operand stack when execution traps
    pub dump_on_trap: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            poison: None,
            stack_name: "operand stack".to_string(),
            dump_sink: DumpSink::Stderr,
            dump_on_trap: true,
        }
    }
}

/// Result of executing one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More instructions to run
    Continue,
    /// `end` reached or program counter at the end of the program
    Halted,
}

/// A runtime error together with the program counter of the failing instruction
#[derive(Debug, thiserror::Error)]
#[error("Trap at pc {pc}: {error}")]
pub struct Trap {
    /// Offset of the failing instruction
    pub pc: usize,
    /// Underlying error
    #[source]
    pub error: VmError,
}

/// StackVM virtual machine
///
/// Owns the program, the operand stack, the register file and the I/O
/// streams used by `in` and `out`.
pub struct Vm<R = StdinLock<'static>, W = Stdout> {
    program: Program,
    /// Operand stack
    stack: GuardedStack<i32>,
    registers: Registers,
    /// Program counter
    pc: usize,
    halted: bool,
    steps: u64,
    dump_on_trap: bool,
    input: R,
    output: W,
}

impl Vm {
    /// Create a VM reading from stdin and printing to stdout
    pub fn new(program: Program, options: VmOptions) -> Self {
        Self::with_io(program, options, io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Vm<R, W> {
    /// Create a VM with explicit input and output streams
    pub fn with_io(program: Program, options: VmOptions, input: R, output: W) -> Self {
        let stack = GuardedStack::new(StackOptions {
            name: options.stack_name,
            poison: options.poison,
            initial_capacity: 1,
            sink: options.dump_sink,
        });

        Self {
            program,
            stack,
            registers: Registers::new(),
            pc: 0,
            halted: false,
            steps: 0,
            dump_on_trap: options.dump_on_trap,
            input,
            output,
        }
    }

    /// Run until the program halts or traps
    pub fn run(&mut self) -> Result<(), Trap> {
        crate::debug!("running {} bytes of bytecode", self.program.len());
        while self.step()? == StepOutcome::Continue {}
        crate::debug!("halted at pc {} after {} steps", self.pc, self.steps);
        Ok(())
    }

    /// Execute a single instruction
    ///
    /// After a trap the VM stays halted.
    pub fn step(&mut self) -> Result<StepOutcome, Trap> {
        if self.halted {
            return Ok(StepOutcome::Halted);
        }

        let pc = self.pc;
        match self.execute_instruction() {
            Ok(outcome) => {
                self.halted = outcome == StepOutcome::Halted;
                Ok(outcome)
            }
            Err(error) => {
                self.halted = true;
                crate::error!("trap at pc {}: {}", pc, error);
                // Stack failures have already dumped the stack
                if self.dump_on_trap && !matches!(error, VmError::Stack(_)) {
                    self.stack
                        .dump(ErrorCode::NoErrorRunOfDump, &format!("trap at pc {}", pc));
                }
                Err(Trap { pc, error })
            }
        }
    }

    fn execute_instruction(&mut self) -> VmResult<StepOutcome> {
        let len = self.program.len();
        if self.pc >= len {
            return Ok(StepOutcome::Halted);
        }

        let instr = {
            let mut reader = BytecodeReader::new(self.program.code());
            reader.seek(self.pc);
            reader.read_instruction()?
        };
        let mut next = instr.next_offset();
        crate::debug!("{:>5}: {} {:?}", instr.offset, instr.opcode, instr.operand);

        match (instr.opcode, instr.operand) {
            (Opcode::End, _) => return Ok(StepOutcome::Halted),
            (Opcode::Push, Operand::Const(value)) => self.stack.push(value)?,
            (Opcode::Pop, _) => {
                self.stack.pop()?;
            }
            (Opcode::In, _) => self.op_in()?,
            (Opcode::Out, _) => self.op_out()?,
            (Opcode::Add, _) => self.op_add()?,
            (Opcode::Sub, _) => self.op_sub()?,
            (Opcode::Mul, _) => self.op_mul()?,
            (Opcode::Div, _) => self.op_div()?,
            (Opcode::Sqrt, _) => self.op_sqrt()?,
            (Opcode::Pow, _) => self.op_pow()?,
            (Opcode::PushReg, Operand::Register(register)) => self.op_push_reg(register)?,
            (Opcode::PopReg, Operand::Register(register)) => self.op_pop_reg(register)?,
            (Opcode::InRegConst, Operand::RegisterConst(register, value)) => {
                self.registers.set(register, value)
            }
            (Opcode::Jump(condition), Operand::Target(target)) => {
                if self.op_jump(condition)? {
                    let target = target as usize;
                    if target > len {
                        return Err(VmError::JumpOutOfBounds { target, len });
                    }
                    next = target;
                }
            }
            (opcode, _) => return Err(VmError::InvalidOpcode(opcode.to_u8())),
        }

        self.pc = next;
        self.steps += 1;
        Ok(StepOutcome::Continue)
    }

    // ===== Accessors =====

    /// Program counter
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Whether the VM has halted or trapped
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of instructions executed
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Program being executed
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Operand stack
    pub fn stack(&self) -> &GuardedStack<i32> {
        &self.stack
    }

    /// Register file
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Output stream
    pub fn output(&self) -> &W {
        &self.output
    }

    /// Write an informational dump of the operand stack
    pub fn dump_stack(&mut self, context: &str) {
        self.stack.dump(ErrorCode::NoErrorRunOfDump, context);
    }

    /// Consume the VM and return its output stream
    pub fn into_output(self) -> W {
        self.output
    }

    // ===== Instructions =====

    /// Pop `b`, then `a`
    #[inline]
    fn pop_operands(&mut self) -> VmResult<(i32, i32)> {
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        Ok((a, b))
    }

    /// IN - Read an integer from the input stream
    fn op_in(&mut self) -> VmResult<()> {
        let value = read_integer(&mut self.input)?;
        self.stack.push(value)?;
        Ok(())
    }

    /// OUT - Print the top of the stack, leaving it in place
    fn op_out(&mut self) -> VmResult<()> {
        let value = self.stack.pop()?;
        write!(self.output, "{} ", value)?;
        self.output.flush()?;
        self.stack.push(value)?;
        Ok(())
    }

    /// ADD - Add two integers
    #[inline]
    fn op_add(&mut self) -> VmResult<()> {
        let (a, b) = self.pop_operands()?;
        Ok(self.stack.push(a.wrapping_add(b))?)
    }

    /// SUB - Subtract two integers
    #[inline]
    fn op_sub(&mut self) -> VmResult<()> {
        let (a, b) = self.pop_operands()?;
        Ok(self.stack.push(a.wrapping_sub(b))?)
    }

    /// MUL - Multiply two integers
    #[inline]
    fn op_mul(&mut self) -> VmResult<()> {
        let (a, b) = self.pop_operands()?;
        Ok(self.stack.push(a.wrapping_mul(b))?)
    }

    /// DIV - Divide two integers, truncating toward zero
    #[inline]
    fn op_div(&mut self) -> VmResult<()> {
        let (a, b) = self.pop_operands()?;
        if b == 0 {
            return Err(VmError::DivisionByZero);
        }
        Ok(self.stack.push(a.wrapping_div(b))?)
    }

    /// SQRT - Truncated square root
    fn op_sqrt(&mut self) -> VmResult<()> {
        let a = self.stack.pop()?;
        if a < 0 {
            return Err(VmError::Domain {
                op: "sqrt",
                operands: a.to_string(),
            });
        }
        Ok(self.stack.push(f64::from(a).sqrt() as i32)?)
    }

    /// POW - Truncated power
    fn op_pow(&mut self) -> VmResult<()> {
        let (a, b) = self.pop_operands()?;
        let value = f64::from(a).powf(f64::from(b));
        if !value.is_finite() {
            return Err(VmError::Domain {
                op: "pow",
                operands: format!("{}^{}", a, b),
            });
        }

        let truncated = value.trunc();
        if truncated < f64::from(i32::MIN) || truncated > f64::from(i32::MAX) {
            return Err(VmError::Overflow { op: "pow", value });
        }
        Ok(self.stack.push(truncated as i32)?)
    }

    /// PUSH_REG - Push a register's value
    fn op_push_reg(&mut self, register: Register) -> VmResult<()> {
        Ok(self.stack.push(self.registers.get(register))?)
    }

    /// POP_REG - Pop into a register
    fn op_pop_reg(&mut self, register: Register) -> VmResult<()> {
        let value = self.stack.pop()?;
        self.registers.set(register, value);
        Ok(())
    }

    /// Jump family - decide whether the branch is taken
    fn op_jump(&mut self, condition: JumpCondition) -> VmResult<bool> {
        if !condition.pops_operands() {
            return Ok(true);
        }
        let (a, b) = self.pop_operands()?;
        Ok(condition.evaluate(a, b))
    }
}

/// Read the next whitespace-delimited i32 from `input`
fn read_integer<R: BufRead>(input: &mut R) -> VmResult<i32> {
    let mut token = Vec::new();

    loop {
        let buffer = input.fill_buf()?;
        if buffer.is_empty() {
            break;
        }

        let mut consumed = 0;
        let mut complete = false;
        for &byte in buffer {
            consumed += 1;
            if byte.is_ascii_whitespace() {
                if token.is_empty() {
                    continue;
                }
                complete = true;
                break;
            }
            token.push(byte);
        }
        input.consume(consumed);

        if complete {
            break;
        }
    }

    if token.is_empty() {
        return Err(VmError::InputExhausted);
    }
    let text = String::from_utf8_lossy(&token);
    text.trim()
        .parse::<i32>()
        .map_err(|_| VmError::InvalidInput(text.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StackError;
    use stackvm_bytecode::BytecodeWriter;
    use std::io::Cursor;

    fn quiet_options() -> VmOptions {
        VmOptions {
            poison: Some(i32::MIN + 7),
            dump_sink: DumpSink::Memory(Vec::new()),
            ..VmOptions::default()
        }
    }

    fn build_vm_with_input(
        build: impl FnOnce(&mut BytecodeWriter),
        input: &str,
    ) -> Vm<Cursor<Vec<u8>>, Vec<u8>> {
        let mut writer = BytecodeWriter::new();
        build(&mut writer);
        Vm::with_io(
            Program::from(writer),
            quiet_options(),
            Cursor::new(input.as_bytes().to_vec()),
            Vec::new(),
        )
    }

    fn build_vm(build: impl FnOnce(&mut BytecodeWriter)) -> Vm<Cursor<Vec<u8>>, Vec<u8>> {
        build_vm_with_input(build, "")
    }

    fn output(vm: &Vm<Cursor<Vec<u8>>, Vec<u8>>) -> &str {
        std::str::from_utf8(vm.output()).unwrap()
    }

    #[test]
    fn test_add_and_out() {
        let mut vm = build_vm(|w| {
            w.emit_push(10);
            w.emit_push(20);
            w.emit_opcode(Opcode::Add);
            w.emit_opcode(Opcode::Out);
            w.emit_opcode(Opcode::End);
        });
        vm.run().unwrap();

        assert_eq!(output(&vm), "30 ");
        assert_eq!(vm.stack().peek(), Some(30));
        assert!(vm.is_halted());
        assert_eq!(vm.pc(), 12);
    }

    #[test]
    fn test_operand_order() {
        let mut vm = build_vm(|w| {
            w.emit_push(7);
            w.emit_push(2);
            w.emit_opcode(Opcode::Sub);
            w.emit_push(3);
            w.emit_opcode(Opcode::Mul);
            w.emit_push(4);
            w.emit_opcode(Opcode::Div);
        });
        vm.run().unwrap();
        // ((7 - 2) * 3) / 4
        assert_eq!(vm.stack().peek(), Some(3));
    }

    #[test]
    fn test_wrapping_arithmetic() {
        let mut vm = build_vm(|w| {
            w.emit_push(i32::MAX);
            w.emit_push(1);
            w.emit_opcode(Opcode::Add);
        });
        vm.run().unwrap();
        assert_eq!(vm.stack().peek(), Some(i32::MIN));
    }

    #[test]
    fn test_division_by_zero() {
        let mut vm = build_vm(|w| {
            w.emit_push(1);
            w.emit_push(0);
            w.emit_opcode(Opcode::Div);
        });
        let trap = vm.run().unwrap_err();
        assert_eq!(trap.pc, 10);
        assert!(matches!(trap.error, VmError::DivisionByZero));
        assert!(vm.is_halted());
        assert!(vm
            .stack()
            .dump_output()
            .unwrap()
            .contains("Dump requested from trap at pc 10"));
    }

    #[test]
    fn test_sqrt_and_pow() {
        let mut vm = build_vm(|w| {
            w.emit_push(17);
            w.emit_opcode(Opcode::Sqrt);
            w.emit_push(3);
            w.emit_opcode(Opcode::Pow);
        });
        vm.run().unwrap();
        assert_eq!(vm.stack().peek(), Some(64));
    }

    #[test]
    fn test_sqrt_negative_is_domain_error() {
        let mut vm = build_vm(|w| {
            w.emit_push(-4);
            w.emit_opcode(Opcode::Sqrt);
        });
        let trap = vm.run().unwrap_err();
        assert!(matches!(trap.error, VmError::Domain { op: "sqrt", .. }));
    }

    #[test]
    fn test_pow_results() {
        let mut vm = build_vm(|w| {
            w.emit_push(2);
            w.emit_push(-1);
            w.emit_opcode(Opcode::Pow);
        });
        vm.run().unwrap();
        assert_eq!(vm.stack().peek(), Some(0));

        let mut vm = build_vm(|w| {
            w.emit_push(0);
            w.emit_push(-1);
            w.emit_opcode(Opcode::Pow);
        });
        assert!(matches!(
            vm.run().unwrap_err().error,
            VmError::Domain { op: "pow", .. }
        ));

        let mut vm = build_vm(|w| {
            w.emit_push(10);
            w.emit_push(10);
            w.emit_opcode(Opcode::Pow);
        });
        assert!(matches!(
            vm.run().unwrap_err().error,
            VmError::Overflow { op: "pow", .. }
        ));
    }

    #[test]
    fn test_registers() {
        let mut vm = build_vm(|w| {
            w.emit_in_reg_const(Register::Ax, 10);
            w.emit_push_reg(Register::Ax);
            w.emit_push(5);
            w.emit_opcode(Opcode::Add);
            w.emit_pop_reg(Register::Dx);
        });
        vm.run().unwrap();
        assert_eq!(vm.registers().get(Register::Ax), 10);
        assert_eq!(vm.registers().get(Register::Dx), 15);
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn test_conditional_jump_taken() {
        // push 5; push 5; je 19; push 0; out; end; push 1; out; end
        let mut vm = build_vm(|w| {
            w.emit_push(5);
            w.emit_push(5);
            w.emit_jump(JumpCondition::Equal, 19);
            w.emit_push(0);
            w.emit_opcode(Opcode::Out);
            w.emit_opcode(Opcode::End);
            w.emit_push(1);
            w.emit_opcode(Opcode::Out);
            w.emit_opcode(Opcode::End);
        });
        vm.run().unwrap();
        assert_eq!(output(&vm), "1 ");
    }

    #[test]
    fn test_conditional_jump_not_taken() {
        let mut vm = build_vm(|w| {
            w.emit_push(1);
            w.emit_push(2);
            w.emit_jump(JumpCondition::GreaterThan, 0);
            w.emit_push(9);
        });
        vm.run().unwrap();
        assert_eq!(vm.stack().iter().collect::<Vec<_>>(), vec![9]);
    }

    #[test]
    fn test_jump_to_end_halts() {
        let mut vm = build_vm(|w| {
            w.emit_jump(JumpCondition::Unconditional, 7);
            w.emit_push(1);
        });
        vm.run().unwrap();
        assert!(vm.stack().is_empty());
        assert_eq!(vm.pc(), 7);
    }

    #[test]
    fn test_jump_out_of_bounds() {
        let mut vm = build_vm(|w| {
            w.emit_jump(JumpCondition::Unconditional, 200);
        });
        let trap = vm.run().unwrap_err();
        assert!(matches!(
            trap.error,
            VmError::JumpOutOfBounds { target: 200, len: 2 }
        ));
    }

    #[test]
    fn test_pop_empty_is_fatal() {
        let mut vm = build_vm(|w| w.emit_opcode(Opcode::Add));
        let trap = vm.run().unwrap_err();
        assert_eq!(trap.pc, 0);
        assert!(matches!(
            trap.error,
            VmError::Stack(StackError::Fatal {
                code: ErrorCode::PopFromEmptyStack
            })
        ));
    }

    #[test]
    fn test_invalid_opcode() {
        let mut vm = Vm::with_io(
            Program::new(vec![Opcode::Add.to_u8(), 0x99]),
            quiet_options(),
            Cursor::new(Vec::new()),
            Vec::new(),
        );
        // ADD on an empty stack fails first, so start past it
        vm.pc = 1;
        let trap = vm.run().unwrap_err();
        assert_eq!(trap.pc, 1);
        assert!(matches!(trap.error, VmError::InvalidOpcode(0x99)));
    }

    #[test]
    fn test_truncated_operand() {
        let mut vm = Vm::with_io(
            Program::new(vec![Opcode::Push.to_u8(), 1, 2]),
            quiet_options(),
            Cursor::new(Vec::new()),
            Vec::new(),
        );
        let trap = vm.run().unwrap_err();
        assert!(matches!(trap.error, VmError::TruncatedOperand(1)));
    }

    #[test]
    fn test_input() {
        let mut vm = build_vm_with_input(
            |w| {
                w.emit_opcode(Opcode::In);
                w.emit_opcode(Opcode::In);
                w.emit_opcode(Opcode::Sub);
                w.emit_opcode(Opcode::Out);
            },
            "  12\n-30 ",
        );
        vm.run().unwrap();
        assert_eq!(output(&vm), "42 ");
    }

    #[test]
    fn test_input_errors() {
        let mut vm = build_vm_with_input(|w| w.emit_opcode(Opcode::In), "  \n");
        assert!(matches!(
            vm.run().unwrap_err().error,
            VmError::InputExhausted
        ));

        let mut vm = build_vm_with_input(|w| w.emit_opcode(Opcode::In), "ten");
        assert!(matches!(
            vm.run().unwrap_err().error,
            VmError::InvalidInput(ref text) if text == "ten"
        ));
    }

    #[test]
    fn test_step_by_step() {
        let mut vm = build_vm(|w| {
            w.emit_push(1);
            w.emit_opcode(Opcode::End);
            w.emit_push(2);
        });
        assert_eq!(vm.step().unwrap(), StepOutcome::Continue);
        assert_eq!(vm.pc(), 5);
        assert_eq!(vm.step().unwrap(), StepOutcome::Halted);
        assert_eq!(vm.step().unwrap(), StepOutcome::Halted);
        assert_eq!(vm.steps(), 1);
        assert_eq!(vm.stack().len(), 1);
    }

    #[test]
    fn test_empty_program_halts() {
        let mut vm = build_vm(|_| {});
        vm.run().unwrap();
        assert!(vm.is_halted());
        assert_eq!(vm.steps(), 0);
    }

    #[test]
    fn test_read_integer_across_buffers() {
        let data = b"123 456".to_vec();
        let mut reader = io::BufReader::with_capacity(2, Cursor::new(data));
        assert_eq!(read_integer(&mut reader).unwrap(), 123);
        assert_eq!(read_integer(&mut reader).unwrap(), 456);
        assert!(matches!(
            read_integer(&mut reader),
            Err(VmError::InputExhausted)
        ));
    }
}
