use tracing::{debug, trace};

use crate::vm::context::{RegisterFile, TryCatch, VmContext};
use crate::vm::error::{InterpreterFault, VmError};
use crate::vm::handlers::{arith, member, object, shuffle};
use crate::vm::{Instruction, ObjRef, Opcode, Runtime, Stack, Value};

/// What the loop does after an instruction.
#[derive(Debug)]
pub(crate) enum ControlFlow {
    Continue,
    Jump(usize),
    Return(Value),
}

/// Executes one instruction list against one [`VmContext`].
pub struct Interpreter<'a> {
    pub(crate) runtime: &'a Runtime,
    code: &'a [Instruction],
    pub(crate) stack: Stack,
    pub(crate) registers: RegisterFile,
    try_catches: Vec<TryCatch>,
    pc: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(runtime: &'a Runtime, code: &'a [Instruction], ctx: VmContext) -> Self {
        Self {
            runtime,
            code,
            stack: ctx.stack,
            registers: ctx.registers,
            try_catches: ctx.try_catches,
            pc: 0,
        }
    }

    /// Run until `RETURN`. Throwables that no handler range catches and
    /// every fault end the run as an error.
    pub fn run(mut self) -> Result<Value, VmError> {
        let code = self.code;
        loop {
            let pc = self.pc;
            let insn = code.get(pc).ok_or(InterpreterFault::PcOutOfRange {
                pc,
                len: code.len(),
            })?;
            trace!(pc, insn = %insn, depth = self.stack.len(), "execute");

            match self.execute_op(insn) {
                Ok(ControlFlow::Continue) => self.pc = pc + 1,
                Ok(ControlFlow::Jump(target)) => self.pc = target,
                Ok(ControlFlow::Return(value)) => return Ok(value),
                Err(VmError::Thrown(thrown)) => self.pc = self.route(pc, thrown)?,
                Err(fault) => return Err(fault),
            }
        }
    }

    /// Find the first handler range covering `pc` that accepts `thrown`.
    /// On a match the stack is reset to just the throwable.
    fn route(&mut self, pc: usize, thrown: ObjRef) -> Result<usize, VmError> {
        let classes = self.runtime.classes();
        let handler = self.try_catches.iter().find(|tc| {
            tc.covers(pc)
                && tc
                    .catch_type
                    .as_deref()
                    .is_none_or(|ty| classes.is_assignable(thrown.class_name(), ty))
        });
        let Some(handler) = handler else {
            debug!(pc, exception = thrown.class_name(), "no handler, propagating");
            return Err(VmError::Thrown(thrown));
        };
        debug!(
            pc,
            handler = handler.handler_pc,
            exception = thrown.class_name(),
            "exception routed"
        );
        let target = handler.handler_pc;
        self.stack.clear();
        self.stack.push(Value::object(thrown))?;
        Ok(target)
    }

    pub(crate) fn throw(&self, class: &str, message: Option<&str>) -> VmError {
        self.runtime.throw(class, message)
    }

    pub(crate) fn pop_non_null(&mut self) -> Result<ObjRef, VmError> {
        match self.stack.pop_object()? {
            Some(obj) => Ok(obj),
            None => Err(self.throw("java.lang.NullPointerException", None)),
        }
    }

    fn execute_op(&mut self, insn: &Instruction) -> Result<ControlFlow, VmError> {
        let op = insn
            .op()
            .ok_or(InterpreterFault::UnknownOpcode(insn.opcode))?;
        match op {
            Opcode::Nop => {}
            Opcode::PushNull
            | Opcode::PushInt
            | Opcode::PushLong
            | Opcode::PushFloat
            | Opcode::PushDouble
            | Opcode::PushString
            | Opcode::PushClass => self.push_constant(op, insn)?,

            Opcode::Load => {
                let value = self.registers.load(insn.index_operand(0)?)?;
                self.stack.push(value)?;
            }
            Opcode::Store => {
                let value = self.stack.pop()?;
                self.registers.store(insn.index_operand(0)?, value)?;
            }

            Opcode::Add
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor => arith::binary(self, op)?,
            Opcode::Sub if insn.flag_operand(0)? => arith::compare_ints(self)?,
            Opcode::Sub => arith::binary(self, op)?,
            Opcode::Neg => arith::negate(self)?,
            Opcode::Shl | Opcode::Shr | Opcode::Ushr => arith::shift(self, op)?,
            Opcode::Cmp => arith::compare_long(self)?,
            Opcode::Cmpl => arith::compare_float(self, -1)?,
            Opcode::Cmpg => arith::compare_float(self, 1)?,
            Opcode::PrimCast => arith::prim_cast(self, insn)?,

            Opcode::Stack => shuffle::apply(self, insn)?,

            Opcode::Jmp
            | Opcode::Jz
            | Opcode::Jnz
            | Opcode::Jlt
            | Opcode::Jge
            | Opcode::Jgt
            | Opcode::Jle
            | Opcode::JeqRef
            | Opcode::JneRef
            | Opcode::Jnull
            | Opcode::Jnonnull
            | Opcode::Jsr
            | Opcode::Ret => return self.jump(op, insn),
            Opcode::Return => return Ok(ControlFlow::Return(self.stack.pop()?)),

            Opcode::VirtGet | Opcode::StaticGet => member::get_field(self, insn, op == Opcode::StaticGet)?,
            Opcode::VirtSet | Opcode::StaticSet => member::set_field(self, insn, op == Opcode::StaticSet)?,
            Opcode::VirtCall => member::invoke(self, insn, false)?,
            Opcode::StaticCall => member::invoke(self, insn, true)?,
            Opcode::New => member::allocate(self, insn)?,
            Opcode::Init => member::construct(self, insn)?,

            Opcode::NewArray => object::new_array(self, insn)?,
            Opcode::ArrayLength => object::array_length(self)?,
            Opcode::ArrayLoad => object::array_load(self)?,
            Opcode::ArrayStore => object::array_store(self)?,
            Opcode::CheckCast => object::check_cast(self, insn)?,
            Opcode::InstanceOf => object::instance_of(self, insn)?,
            // Monitors only enforce the null check; stubs run on one thread.
            Opcode::MonitorEnter | Opcode::MonitorExit => {
                self.pop_non_null()?;
            }
            Opcode::Throw => return Err(VmError::Thrown(self.pop_non_null()?)),
        }
        Ok(ControlFlow::Continue)
    }

    #[inline(never)]
    fn push_constant(&mut self, op: Opcode, insn: &Instruction) -> Result<(), VmError> {
        let value = match op {
            Opcode::PushInt => Value::Int(insn.int_operand(0)?),
            Opcode::PushLong => Value::Long(insn.long_operand(0)?),
            Opcode::PushFloat => Value::Float(insn.float_operand(0)?),
            Opcode::PushDouble => Value::Double(insn.double_operand(0)?),
            Opcode::PushString => Value::object(self.runtime.classes().intern(insn.str_operand(0)?)),
            Opcode::PushClass => Value::object(self.runtime.classes().class_literal(insn.class_operand(0)?)),
            _ => Value::null(),
        };
        self.stack.push(value)?;
        Ok(())
    }

    #[inline(never)]
    fn jump(&mut self, op: Opcode, insn: &Instruction) -> Result<ControlFlow, VmError> {
        let taken = match op {
            Opcode::Jz => self.stack.pop_int()? == 0,
            Opcode::Jnz => self.stack.pop_int()? != 0,
            Opcode::Jlt => self.stack.pop_int()? < 0,
            Opcode::Jge => self.stack.pop_int()? >= 0,
            Opcode::Jgt => self.stack.pop_int()? > 0,
            Opcode::Jle => self.stack.pop_int()? <= 0,
            Opcode::JeqRef | Opcode::JneRef => {
                let b = self.stack.pop_object()?;
                let a = self.stack.pop_object()?;
                let same = match (&a, &b) {
                    (None, None) => true,
                    (Some(a), Some(b)) => ObjRef::ptr_eq(a, b),
                    _ => false,
                };
                same == (op == Opcode::JeqRef)
            }
            Opcode::Jnull => self.stack.pop_object()?.is_none(),
            Opcode::Jnonnull => self.stack.pop_object()?.is_some(),
            Opcode::Jsr => {
                self.stack.push(Value::Int(self.pc as i32 + 1))?;
                true
            }
            Opcode::Ret => {
                let address = self.registers.load(insn.index_operand(0)?)?.as_int()?;
                let target = usize::try_from(address).map_err(|_| InterpreterFault::PcOutOfRange {
                    pc: self.pc,
                    len: self.code.len(),
                })?;
                return Ok(ControlFlow::Jump(target));
            }
            _ => true,
        };
        if taken {
            Ok(ControlFlow::Jump(insn.index_operand(0)?))
        } else {
            Ok(ControlFlow::Continue)
        }
    }
}
