//! The interpreter side: instruction set, stub codec, runtime values and
//! the reflective class world virtualized code runs against.

mod builtins;
pub mod bytecode;
pub mod classes;
mod context;
mod error;
mod handlers;
mod instruction;
mod loader;
mod object;
mod opcode_table;
mod ops;
pub mod reflect;
mod runtime;
mod stack;
mod types;
mod value;
mod vm;

pub use classes::{ClassDef, ClassRegistry, Invocation, NativeFn};
pub use context::{RegisterFile, TryCatch, VmContext};
pub use error::{InterpreterFault, THROWABLE, VmError, describe_throwable};
pub use instruction::{Instruction, MAX_OPERANDS, Operand, StubTable};
pub use loader::StubLoader;
pub use object::{ArrayData, InstanceFields, JValue, MAX_ARRAY_BYTES, ObjRef, Object, ObjectBody};
pub use opcode_table::OpcodeTable;
pub use ops::{Opcode, StackShape};
pub use reflect::{ReflectCache, ReflectError};
pub use runtime::{CallGuard, DEFAULT_MAX_CALL_DEPTH, Runtime};
pub use stack::Stack;
pub use types::{JavaType, PARAM_DELIMITER, join_params, split_params};
pub use value::Value;
pub use vm::Interpreter;
