use super::object::ObjRef;

/// Root throwable class; declares `detailMessage`.
pub const THROWABLE: &str = "java.lang.Throwable";

/// An unrecoverable interpreter condition. Never routed through try/catch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InterpreterFault {
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("stack overflow: capacity {capacity} exceeded")]
    StackOverflow { capacity: usize },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("continuation slot without a wide value beneath it")]
    BrokenContinuation,

    #[error("register {index} out of range (register count {count})")]
    RegisterOutOfRange { index: usize, count: usize },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("operand {index} of {opcode}: {reason}")]
    BadOperand {
        opcode: &'static str,
        index: usize,
        reason: &'static str,
    },

    #[error("program counter {pc} outside instruction list of length {len}")]
    PcOutOfRange { pc: usize, len: usize },

    #[error("no stub at offset {0}")]
    NoSuchStub(usize),

    #[error("failed to load stub table: {0}")]
    StubLoad(String),

    #[error("member resolution failed: {0}")]
    Resolution(String),

    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },
}

/// Outcome of a failed call into the interpreter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmError {
    /// An application throwable. Subject to try/catch routing.
    #[error("uncaught exception {}", describe_throwable(.0))]
    Thrown(ObjRef),

    #[error(transparent)]
    Fault(#[from] InterpreterFault),
}

impl VmError {
    /// The thrown object, if this is an application throwable.
    pub fn throwable(&self) -> Option<&ObjRef> {
        match self {
            VmError::Thrown(obj) => Some(obj),
            VmError::Fault(_) => None,
        }
    }
}

/// `ClassName: message`, the way a stack trace headline reads.
pub fn describe_throwable(obj: &ObjRef) -> String {
    let message = obj
        .get_field(THROWABLE, "detailMessage", super::JValue::Ref(None))
        .and_then(|m| m.as_str().map(str::to_string));
    match message {
        Some(m) => format!("{}: {}", obj.class_name(), m),
        None => obj.class_name().to_string(),
    }
}
