//! Opcode implementations grouped by concern. Control transfer and the
//! register opcodes live in the interpreter loop itself.

pub(crate) mod arith;
pub(crate) mod member;
pub(crate) mod object;
pub(crate) mod shuffle;
