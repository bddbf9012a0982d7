//! The class model the translator consumes and rewrites.
//!
//! This mirrors a tree-style bytecode API: a method is an ordered list of
//! instruction nodes, jump targets are label nodes inside that list, and
//! handler ranges refer to labels. Names are in internal form
//! (`java/lang/String`).

pub mod descriptor;
pub mod opcodes;

use serde::{Deserialize, Serialize};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;

/// Identity of a label node within one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub u32);

/// An `ldc` constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A class literal, by internal name.
    Class(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Insn {
    Label {
        id: LabelId,
    },
    LineNumber {
        line: u32,
        start: LabelId,
    },
    Frame,
    /// Zero-operand instructions.
    Simple {
        opcode: u8,
    },
    /// `bipush`, `sipush` and `newarray` (whose operand is the element type code).
    Int {
        opcode: u8,
        operand: i32,
    },
    /// Local variable loads and stores, and `ret`.
    Var {
        opcode: u8,
        var: u16,
    },
    /// `new`, `anewarray`, `checkcast`, `instanceof`.
    Type {
        opcode: u8,
        desc: String,
    },
    Field {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
    },
    Method {
        opcode: u8,
        owner: String,
        name: String,
        desc: String,
        #[serde(default)]
        interface: bool,
    },
    InvokeDynamic {
        name: String,
        desc: String,
    },
    Jump {
        opcode: u8,
        label: LabelId,
    },
    Ldc {
        value: Constant,
    },
    Iinc {
        var: u16,
        incr: i32,
    },
    TableSwitch {
        min: i32,
        max: i32,
        default: LabelId,
        labels: Vec<LabelId>,
    },
    LookupSwitch {
        default: LabelId,
        keys: Vec<i32>,
        labels: Vec<LabelId>,
    },
    MultiANewArray {
        desc: String,
        dims: u8,
    },
}

impl Insn {
    pub fn label(id: u32) -> Self {
        Insn::Label { id: LabelId(id) }
    }

    pub fn simple(opcode: u8) -> Self {
        Insn::Simple { opcode }
    }

    pub fn int(opcode: u8, operand: i32) -> Self {
        Insn::Int { opcode, operand }
    }

    pub fn var(opcode: u8, var: u16) -> Self {
        Insn::Var { opcode, var }
    }

    pub fn type_insn(opcode: u8, desc: &str) -> Self {
        Insn::Type {
            opcode,
            desc: desc.to_string(),
        }
    }

    pub fn field(opcode: u8, owner: &str, name: &str, desc: &str) -> Self {
        Insn::Field {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
        }
    }

    pub fn method(opcode: u8, owner: &str, name: &str, desc: &str) -> Self {
        Insn::Method {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            interface: opcode == opcodes::INVOKEINTERFACE,
        }
    }

    pub fn jump(opcode: u8, label: u32) -> Self {
        Insn::Jump {
            opcode,
            label: LabelId(label),
        }
    }

    pub fn ldc(value: Constant) -> Self {
        Insn::Ldc { value }
    }

    /// The opcode byte, when the node is a real instruction.
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Insn::Label { .. } | Insn::LineNumber { .. } | Insn::Frame => None,
            Insn::Simple { opcode }
            | Insn::Int { opcode, .. }
            | Insn::Var { opcode, .. }
            | Insn::Type { opcode, .. }
            | Insn::Field { opcode, .. }
            | Insn::Method { opcode, .. }
            | Insn::Jump { opcode, .. } => Some(*opcode),
            Insn::InvokeDynamic { .. } => Some(opcodes::INVOKEDYNAMIC),
            Insn::Ldc { .. } => Some(opcodes::LDC),
            Insn::Iinc { .. } => Some(opcodes::IINC),
            Insn::TableSwitch { .. } => Some(opcodes::TABLESWITCH),
            Insn::LookupSwitch { .. } => Some(opcodes::LOOKUPSWITCH),
            Insn::MultiANewArray { .. } => Some(opcodes::MULTIANEWARRAY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryCatchBlock {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    /// Internal name of the caught class; `None` catches everything.
    #[serde(default)]
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
    pub max_stack: u16,
    pub max_locals: u16,
    #[serde(default)]
    pub instructions: Vec<Insn>,
    #[serde(default)]
    pub try_catch_blocks: Vec<TryCatchBlock>,
}

impl MethodNode {
    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access & ACC_ABSTRACT != 0
    }

    pub fn is_native(&self) -> bool {
        self.access & ACC_NATIVE != 0
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_class_initializer(&self) -> bool {
        self.name == "<clinit>"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNode {
    pub access: u16,
    pub name: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassNode {
    pub access: u16,
    pub name: String,
    #[serde(default)]
    pub super_name: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FieldNode>,
    #[serde(default)]
    pub methods: Vec<MethodNode>,
}
