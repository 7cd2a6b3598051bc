//! Core virtual machine implementation.
//!
//! A stack machine over tagged [`Value`]s. Each opcode is charged its gas
//! before it runs; arithmetic uses wrapping semantics so overflow never
//! panics. Execution is single-threaded and deterministic: the same bytecode,
//! context and initial storage always give the same storage, events and gas.

pub mod context;
pub mod gas;

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::{Bytecode, BytecodeReader};
use crate::virtual_machine::state::{OverlayState, State};
use crate::virtual_machine::value::Value;
use context::{CallFrame, ExecutionContext};
use gas::{GasMeter, GasProfile};

/// Maximum number of values on the operand stack.
pub const STACK_LIMIT: usize = 1000;
/// Maximum number of nested `CALL`s.
pub const CALL_DEPTH_LIMIT: usize = 1024;
/// Prefix of every entry `EMIT` appends to the event log.
pub const EVENT_PREFIX: &str = "Event:";

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        state = $state:ident,
        ctx = $ctx:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => exec_vm!(@call $vm, $state, $ctx, $handler, $args),
            )*
        }
    }};

    // Handler touching storage
    (@call $vm:ident, $state:ident, $ctx:ident, $handler:ident, (state)) => {{
        $vm.$handler($state)
    }};

    // Handler reading the execution context
    (@call $vm:ident, $state:ident, $ctx:ident, $handler:ident, (ctx)) => {{
        $vm.$handler($ctx)
    }};

    // Handler with decoded operands
    (@call $vm:ident, $state:ident, $ctx:ident, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $vm, $kind)?; )*
        $vm.$handler($( $field ),*)
    }};

    (@read $vm:ident, Literal) => {{
        $vm.code.read_literal($vm.instr_offset)
    }};

    (@read $vm:ident, Target) => {{
        $vm.code.read_target()
    }};
}

/// Result of a run that reached `HALT` or the end of the bytecode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub gas_used: u64,
    /// `"Event:<text>"` entries in emission order.
    pub events: Vec<String>,
    pub gas_profile: GasProfile,
}

/// A run that trapped. Its storage writes were discarded.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason} (gas used: {gas_used})")]
pub struct Trap {
    pub reason: VMError,
    pub gas_used: u64,
}

/// Runs `bytecode` against `state`, committing its writes only on success.
///
/// Writes go to an [`OverlayState`] during the run, so a trap leaves `state`
/// exactly as it was before the call.
pub fn execute<S: State>(
    bytecode: &Bytecode,
    ctx: &ExecutionContext,
    gas_limit: u64,
    state: &mut S,
) -> Result<ExecutionOutcome, Trap> {
    let mut vm = VM::new(bytecode, gas_limit);
    let writes = {
        let mut overlay = OverlayState::new(&*state);
        if let Err(reason) = vm.run(&mut overlay, ctx) {
            return Err(Trap {
                reason,
                gas_used: vm.gas_used(),
            });
        }
        overlay.into_writes()
    };
    for (key, value) in writes {
        state.set(&key, value);
    }
    Ok(vm.into_outcome())
}

/// Bytecode virtual machine.
pub struct VM<'a> {
    /// Bytecode cursor; its position is the program counter.
    code: BytecodeReader<'a>,
    stack: Vec<Value>,
    call_stack: Vec<CallFrame>,
    gas: GasMeter,
    events: Vec<String>,
    /// Instruction being executed and its offset, for error reports.
    instr: Instruction,
    instr_offset: usize,
    halted: bool,
}

impl<'a> VM<'a> {
    pub fn new(bytecode: &'a Bytecode, gas_limit: u64) -> Self {
        Self {
            code: BytecodeReader::new(bytecode.as_bytes()),
            stack: Vec::new(),
            call_stack: Vec::new(),
            gas: GasMeter::new(gas_limit),
            events: Vec::new(),
            instr: Instruction::Halt,
            instr_offset: 0,
            halted: false,
        }
    }

    /// Executes until `HALT`, the end of the bytecode, or a trap.
    pub fn run<S: State>(&mut self, state: &mut S, ctx: &ExecutionContext) -> Result<(), VMError> {
        while !self.halted && !self.code.is_at_end() {
            let offset = self.code.pos();
            let opcode = self.code.read_u8()?;
            let instr = Instruction::try_from(opcode)
                .map_err(|_| VMError::InvalidInstruction { opcode, offset })?;
            self.instr = instr;
            self.instr_offset = offset;
            self.gas.charge(instr, offset)?;
            self.exec(instr, state, ctx)?;
        }
        Ok(())
    }

    pub fn gas_used(&self) -> u64 {
        self.gas.used()
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn into_outcome(self) -> ExecutionOutcome {
        ExecutionOutcome {
            gas_used: self.gas.used(),
            events: self.events,
            gas_profile: self.gas.into_profile(),
        }
    }

    /// Executes a single instruction whose gas is already paid.
    fn exec<S: State>(
        &mut self,
        instruction: Instruction,
        state: &mut S,
        ctx: &ExecutionContext,
    ) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            state = state,
            ctx = ctx,
            instr = instruction,
            {
                Halt => op_halt(),
                Push => op_push(value: Literal),
                Pop => op_pop(),
                Add => op_add(),
                Sub => op_sub(),
                Mul => op_mul(),
                Div => op_div(),
                Eq => op_eq(),
                Jump => op_jump(target: Target),
                Jz => op_jz(),
                Jnz => op_jnz(),
                Sload => op_sload(state),
                Sstore => op_sstore(state),
                Call => op_call(target: Target),
                Ret => op_ret(),
                Dup => op_dup(),
                Swap => op_swap(),
                Gt => op_gt(),
                Lt => op_lt(),
                Gte => op_gte(),
                Lte => op_lte(),
                Emit => op_emit(),
                Time => op_time(ctx),
                Blocknum => op_blocknum(ctx),
                Balance => op_balance(ctx),
                Sender => op_sender(ctx),
                Txvalue => op_txvalue(ctx),
                Assert => op_assert(),
                Label => op_label(),
            }
        }
    }

    // ---------- stack helpers ----------

    fn push(&mut self, value: Value) -> Result<(), VMError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(VMError::StackOverflow {
                instruction: self.instr.mnemonic(),
                offset: self.instr_offset,
                limit: STACK_LIMIT,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    /// Fails unless the stack holds at least `needed` values.
    fn require(&self, needed: usize) -> Result<(), VMError> {
        if self.stack.len() < needed {
            return Err(VMError::StackUnderflow {
                instruction: self.instr.mnemonic(),
                offset: self.instr_offset,
                needed,
                available: self.stack.len(),
            });
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, VMError> {
        self.require(1)?;
        self.stack.pop().ok_or(VMError::StackUnderflow {
            instruction: self.instr.mnemonic(),
            offset: self.instr_offset,
            needed: 1,
            available: 0,
        })
    }

    fn type_mismatch(&self, expected: &'static str, actual: &Value) -> VMError {
        VMError::TypeMismatch {
            instruction: self.instr.mnemonic(),
            offset: self.instr_offset,
            expected,
            actual: actual.type_name(),
        }
    }

    fn pop_int(&mut self) -> Result<i64, VMError> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            other => Err(self.type_mismatch("Int", &other)),
        }
    }

    fn pop_text(&mut self) -> Result<String, VMError> {
        match self.pop()? {
            Value::Text(s) => Ok(s),
            other => Err(self.type_mismatch("Text", &other)),
        }
    }

    /// Pops `b` then `a` for a binary integer op, returning `(a, b)`.
    fn pop_int_pair(&mut self) -> Result<(i64, i64), VMError> {
        self.require(2)?;
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        Ok((a, b))
    }

    fn binary_int(&mut self, f: impl FnOnce(i64, i64) -> i64) -> Result<(), VMError> {
        let (a, b) = self.pop_int_pair()?;
        self.push(Value::Int(f(a, b)))
    }

    fn compare(&mut self, f: impl FnOnce(i64, i64) -> bool) -> Result<(), VMError> {
        let (a, b) = self.pop_int_pair()?;
        self.push(Value::Int(f(a, b) as i64))
    }

    /// Moves the program counter to `target`, which may equal the length.
    fn jump_to(&mut self, target: u64) -> Result<(), VMError> {
        let len = self.code.len();
        match usize::try_from(target) {
            Ok(t) if t <= len => {
                self.code.set_pos(t);
                Ok(())
            }
            _ => Err(VMError::InvalidJump {
                instruction: self.instr.mnemonic(),
                offset: self.instr_offset,
                target,
                len,
            }),
        }
    }

    // ---------- handlers ----------

    fn op_halt(&mut self) -> Result<(), VMError> {
        self.halted = true;
        Ok(())
    }

    fn op_push(&mut self, value: Value) -> Result<(), VMError> {
        self.push(value)
    }

    fn op_pop(&mut self) -> Result<(), VMError> {
        self.pop().map(|_| ())
    }

    fn op_add(&mut self) -> Result<(), VMError> {
        self.binary_int(i64::wrapping_add)
    }

    fn op_sub(&mut self) -> Result<(), VMError> {
        self.binary_int(i64::wrapping_sub)
    }

    fn op_mul(&mut self) -> Result<(), VMError> {
        self.binary_int(i64::wrapping_mul)
    }

    fn op_div(&mut self) -> Result<(), VMError> {
        let (a, b) = self.pop_int_pair()?;
        if b == 0 {
            return Err(VMError::DivisionByZero {
                offset: self.instr_offset,
            });
        }
        self.push(Value::Int(a.wrapping_div(b)))
    }

    fn op_eq(&mut self) -> Result<(), VMError> {
        self.require(2)?;
        let b = self.pop()?;
        let a = self.pop()?;
        let equal = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Text(x), Value::Text(y)) => x == y,
            (expected, actual) => return Err(self.type_mismatch(expected.type_name(), actual)),
        };
        self.push(Value::Int(equal as i64))
    }

    fn op_gt(&mut self) -> Result<(), VMError> {
        self.compare(|a, b| a > b)
    }

    fn op_lt(&mut self) -> Result<(), VMError> {
        self.compare(|a, b| a < b)
    }

    fn op_gte(&mut self) -> Result<(), VMError> {
        self.compare(|a, b| a >= b)
    }

    fn op_lte(&mut self) -> Result<(), VMError> {
        self.compare(|a, b| a <= b)
    }

    fn op_jump(&mut self, target: u64) -> Result<(), VMError> {
        self.jump_to(target)
    }

    // The condition is popped before the target operand is read.
    fn op_jz(&mut self) -> Result<(), VMError> {
        let cond = self.pop_int()?;
        let target = self.code.read_target()?;
        if cond == 0 {
            self.jump_to(target)?;
        }
        Ok(())
    }

    fn op_jnz(&mut self) -> Result<(), VMError> {
        let cond = self.pop_int()?;
        let target = self.code.read_target()?;
        if cond != 0 {
            self.jump_to(target)?;
        }
        Ok(())
    }

    fn op_sload<S: State>(&mut self, state: &mut S) -> Result<(), VMError> {
        let key = self.pop_text()?;
        self.push(Value::Int(state.get(&key).unwrap_or(0)))
    }

    fn op_sstore<S: State>(&mut self, state: &mut S) -> Result<(), VMError> {
        self.require(2)?;
        let value = self.pop_int()?;
        let key = self.pop_text()?;
        state.set(&key, value);
        Ok(())
    }

    fn op_call(&mut self, target: u64) -> Result<(), VMError> {
        if self.call_stack.len() >= CALL_DEPTH_LIMIT {
            return Err(VMError::CallStackOverflow {
                offset: self.instr_offset,
                limit: CALL_DEPTH_LIMIT,
            });
        }
        let return_addr = self.code.pos();
        self.jump_to(target)?;
        self.call_stack.push(CallFrame { return_addr });
        Ok(())
    }

    fn op_ret(&mut self) -> Result<(), VMError> {
        let frame = self.call_stack.pop().ok_or(VMError::ReturnWithoutCall {
            offset: self.instr_offset,
        })?;
        self.code.set_pos(frame.return_addr);
        Ok(())
    }

    fn op_dup(&mut self) -> Result<(), VMError> {
        self.require(1)?;
        let top = self.stack[self.stack.len() - 1].clone();
        self.push(top)
    }

    fn op_swap(&mut self) -> Result<(), VMError> {
        self.require(2)?;
        let len = self.stack.len();
        self.stack.swap(len - 1, len - 2);
        Ok(())
    }

    fn op_emit(&mut self) -> Result<(), VMError> {
        let text = self.pop_text()?;
        self.events.push(format!("{EVENT_PREFIX}{text}"));
        Ok(())
    }

    fn op_time(&mut self, ctx: &ExecutionContext) -> Result<(), VMError> {
        self.push(Value::Int(ctx.timestamp))
    }

    fn op_blocknum(&mut self, ctx: &ExecutionContext) -> Result<(), VMError> {
        self.push(Value::Int(ctx.block_height))
    }

    fn op_balance(&mut self, ctx: &ExecutionContext) -> Result<(), VMError> {
        self.push(Value::Int(ctx.balance))
    }

    fn op_sender(&mut self, ctx: &ExecutionContext) -> Result<(), VMError> {
        self.push(Value::Text(ctx.sender.clone()))
    }

    fn op_txvalue(&mut self, ctx: &ExecutionContext) -> Result<(), VMError> {
        self.push(Value::Int(ctx.tx_value))
    }

    fn op_assert(&mut self) -> Result<(), VMError> {
        if self.pop()? == Value::Int(0) {
            return Err(VMError::AssertionFailed {
                offset: self.instr_offset,
            });
        }
        Ok(())
    }

    fn op_label(&mut self) -> Result<(), VMError> {
        Ok(())
    }
}
