//! Replacement bodies for virtualized methods.
//!
//! A bootstrap keeps the method's descriptor and does four things: build a
//! `VMContext` sized for the method, copy the arguments into registers,
//! execute the stub at the method's offset and convert the result back to
//! the declared return type.

use crate::model::descriptor::{self, DescriptorError};
use crate::model::opcodes::*;
use crate::model::{Constant, Insn, MethodNode};
use crate::vm::{InterpreterFault, JValue, JavaType, ObjRef, Runtime, TryCatch, Value, VmContext, VmError};

pub const CONTEXT_CLASS: &str = "jvirt/rt/VMContext";
pub const VALUE_CLASS: &str = "jvirt/rt/Value";
pub const TRY_CATCH_CLASS: &str = "jvirt/rt/TryCatch";

/// Deepest operand stack the generated body reaches (while filling one
/// try/catch array element).
const BOOTSTRAP_MAX_STACK: u16 = 13;

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapPlan {
    pub stub_offset: usize,
    pub stack_size: usize,
    pub register_count: usize,
    pub try_catches: Vec<TryCatch>,
    pub params: Vec<JavaType>,
    pub return_type: JavaType,
    pub is_static: bool,
}

impl BootstrapPlan {
    pub fn new(
        method: &MethodNode,
        stub_offset: usize,
        try_catches: Vec<TryCatch>,
        stack_margin: usize,
        locals_margin: usize,
    ) -> Result<Self, DescriptorError> {
        let (params, return_type) = descriptor::parse_method(&method.desc)?;
        Ok(Self {
            stub_offset,
            stack_size: method.max_stack as usize + stack_margin,
            register_count: method.max_locals as usize + locals_margin,
            try_catches,
            params,
            return_type,
            is_static: method.is_static(),
        })
    }

    /// Local slots taken by the receiver and the arguments.
    pub fn argument_slots(&self) -> usize {
        let receiver = if self.is_static { 0 } else { 1 };
        receiver + self.params.iter().map(JavaType::slot_size).sum::<usize>()
    }

    /// The JVM instruction sequence of the replacement body.
    pub fn instructions(&self) -> Vec<Insn> {
        let mut out = Vec::new();
        let context_slot = self.argument_slots() as u16;

        out.push(Insn::type_insn(NEW, CONTEXT_CLASS));
        out.push(Insn::simple(DUP));
        push_int(&mut out, self.stack_size as i32);
        push_int(&mut out, self.register_count as i32);
        push_int(&mut out, self.try_catches.len() as i32);
        out.push(Insn::type_insn(ANEWARRAY, TRY_CATCH_CLASS));
        for (i, tc) in self.try_catches.iter().enumerate() {
            out.push(Insn::simple(DUP));
            push_int(&mut out, i as i32);
            out.push(Insn::type_insn(NEW, TRY_CATCH_CLASS));
            out.push(Insn::simple(DUP));
            push_int(&mut out, tc.start_pc as i32);
            push_int(&mut out, tc.end_pc as i32);
            push_int(&mut out, tc.handler_pc as i32);
            match &tc.catch_type {
                Some(name) => out.push(Insn::ldc(Constant::String(name.clone()))),
                None => out.push(Insn::simple(ACONST_NULL)),
            }
            out.push(Insn::method(
                INVOKESPECIAL,
                TRY_CATCH_CLASS,
                "<init>",
                "(IIILjava/lang/String;)V",
            ));
            out.push(Insn::simple(AASTORE));
        }
        push_int(&mut out, self.stub_offset as i32);
        out.push(Insn::method(
            INVOKESPECIAL,
            CONTEXT_CLASS,
            "<init>",
            "(II[Ljvirt/rt/TryCatch;I)V",
        ));
        out.push(Insn::var(ASTORE, context_slot));

        let mut slot = 0u16;
        if !self.is_static {
            self.store_register(&mut out, context_slot, slot, &JavaType::Reference(String::new()));
            slot += 1;
        }
        for param in &self.params {
            self.store_register(&mut out, context_slot, slot, param);
            slot += param.slot_size() as u16;
        }

        out.push(Insn::var(ALOAD, context_slot));
        out.push(Insn::method(INVOKEVIRTUAL, CONTEXT_CLASS, "execute", "()Ljvirt/rt/Value;"));
        self.convert_result(&mut out);
        out
    }

    fn store_register(&self, out: &mut Vec<Insn>, context_slot: u16, slot: u16, ty: &JavaType) {
        let (load, boxer, desc) = match ty {
            JavaType::Long => (LLOAD, "ofLong", "(J)Ljvirt/rt/Value;"),
            JavaType::Float => (FLOAD, "ofFloat", "(F)Ljvirt/rt/Value;"),
            JavaType::Double => (DLOAD, "ofDouble", "(D)Ljvirt/rt/Value;"),
            JavaType::Reference(_) => (ALOAD, "ofObject", "(Ljava/lang/Object;)Ljvirt/rt/Value;"),
            _ => (ILOAD, "ofInt", "(I)Ljvirt/rt/Value;"),
        };
        out.push(Insn::var(ALOAD, context_slot));
        push_int(out, slot as i32);
        out.push(Insn::var(load, slot));
        out.push(Insn::method(INVOKESTATIC, VALUE_CLASS, boxer, desc));
        out.push(Insn::method(
            INVOKEVIRTUAL,
            CONTEXT_CLASS,
            "setRegister",
            "(ILjvirt/rt/Value;)V",
        ));
    }

    fn convert_result(&self, out: &mut Vec<Insn>) {
        let unbox = |name: &str, desc: &str| Insn::method(INVOKEVIRTUAL, VALUE_CLASS, name, desc);
        match &self.return_type {
            JavaType::Void => {
                out.push(Insn::simple(POP));
                out.push(Insn::simple(RETURN));
            }
            JavaType::Long => {
                out.push(unbox("asLong", "()J"));
                out.push(Insn::simple(LRETURN));
            }
            JavaType::Float => {
                out.push(unbox("asFloat", "()F"));
                out.push(Insn::simple(FRETURN));
            }
            JavaType::Double => {
                out.push(unbox("asDouble", "()D"));
                out.push(Insn::simple(DRETURN));
            }
            JavaType::Reference(_) => {
                out.push(unbox("asObject", "()Ljava/lang/Object;"));
                if let Some(target) = descriptor::cast_target(&self.return_type) {
                    out.push(Insn::type_insn(CHECKCAST, &target));
                }
                out.push(Insn::simple(ARETURN));
            }
            narrow => {
                out.push(unbox("asInt", "()I"));
                match narrow {
                    JavaType::Byte => out.push(Insn::simple(I2B)),
                    JavaType::Char => out.push(Insn::simple(I2C)),
                    JavaType::Short => out.push(Insn::simple(I2S)),
                    _ => {}
                }
                out.push(Insn::simple(IRETURN));
            }
        }
    }

    /// Replace the body of `method` with this bootstrap.
    pub fn apply(&self, method: &mut MethodNode) {
        method.instructions = self.instructions();
        method.try_catch_blocks.clear();
        method.max_stack = BOOTSTRAP_MAX_STACK;
        method.max_locals = self.argument_slots() as u16 + 1;
    }

    /// Run the bootstrap in-process: what the replacement body does when
    /// the virtualized method is called.
    pub fn invoke(&self, runtime: &Runtime, this: Option<ObjRef>, args: &[JValue]) -> Result<JValue, VmError> {
        if args.len() != self.params.len() {
            return Err(InterpreterFault::ArgumentCount {
                expected: self.params.len(),
                found: args.len(),
            }
            .into());
        }

        let mut ctx = VmContext::new(
            self.stack_size,
            self.register_count,
            self.try_catches.clone(),
            self.stub_offset,
        );
        let mut slot = 0;
        if !self.is_static {
            let Some(this) = this else {
                return Err(runtime.throw("java.lang.NullPointerException", None));
            };
            ctx.set_register(slot, Value::object(this))?;
            slot += 1;
        }
        for (param, arg) in self.params.iter().zip(args) {
            let value = Value::from_host(arg.clone());
            value.to_host(param)?;
            ctx.set_register(slot, value)?;
            slot += param.slot_size();
        }

        let result = ctx.execute(runtime)?;
        if let (JavaType::Reference(target), Value::Object(Some(obj))) = (&self.return_type, &result) {
            if !runtime.classes().is_assignable(obj.class_name(), target) {
                let msg = format!("class {} cannot be cast to class {}", obj.class_name(), target);
                return Err(runtime.throw("java.lang.ClassCastException", Some(&msg)));
            }
        }
        Ok(result.to_host(&self.return_type)?)
    }
}

/// Shortest constant push for `value`.
fn push_int(out: &mut Vec<Insn>, value: i32) {
    let insn = match value {
        -1..=5 => Insn::simple((ICONST_0 as i32 + value) as u8),
        v if i8::try_from(v).is_ok() => Insn::int(BIPUSH, v),
        v if i16::try_from(v).is_ok() => Insn::int(SIPUSH, v),
        v => Insn::ldc(Constant::Int(v)),
    };
    out.push(insn);
}
