/// Opcodes of the virtualized instruction set.
///
/// These are the logical numbers. Serialized stubs pass them through the
/// build's [`super::OpcodeTable`], so the bytes on disk differ per build.
///
/// Arithmetic and comparison opcodes are untyped: the handler picks the
/// concrete operation from the runtime tag of its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // ========================================
    // Constants
    // ========================================
    Nop = 0,
    PushNull = 1,
    PushInt = 2,    // [Int(v)]
    PushLong = 3,   // [Long(v)]
    PushFloat = 4,  // [Float(v)]
    PushDouble = 5, // [Double(v)]
    PushString = 6, // [Str(s)]
    PushClass = 7,  // [Class(name)]

    // ========================================
    // Registers
    // ========================================
    Load = 10,  // [Int(slot)]
    Store = 11, // [Int(slot)]

    // ========================================
    // Arithmetic
    // ========================================
    Add = 20,
    Sub = 21, // [] or [Int(1)] for the overflow-free compare form
    Mul = 22,
    Div = 23,
    Rem = 24,
    Neg = 25,
    Shl = 26,
    Shr = 27,
    Ushr = 28,
    And = 29,
    Or = 30,
    Xor = 31,
    Cmp = 32,
    Cmpl = 33,
    Cmpg = 34,
    PrimCast = 35, // [Int(target descriptor char)]

    // ========================================
    // Stack shuffles
    // ========================================
    Stack = 40, // [Int(StackShape)]

    // ========================================
    // Control transfer
    // ========================================
    Jmp = 50,      // [Int(target)]
    Jz = 51,       // [Int(target)]
    Jnz = 52,      // [Int(target)]
    Jlt = 53,      // [Int(target)]
    Jge = 54,      // [Int(target)]
    Jgt = 55,      // [Int(target)]
    Jle = 56,      // [Int(target)]
    JeqRef = 57,   // [Int(target)]
    JneRef = 58,   // [Int(target)]
    Jnull = 59,    // [Int(target)]
    Jnonnull = 60, // [Int(target)]
    Jsr = 61,      // [Int(target)]
    Ret = 62,      // [Int(slot)]
    Return = 63,

    // ========================================
    // Reflective member access
    // ========================================
    VirtGet = 70,    // [Class(owner), Str(name), Str(type)]
    StaticGet = 71,  // [Class(owner), Str(name), Str(type)]
    VirtSet = 72,    // [Class(owner), Str(name), Str(type)]
    StaticSet = 73,  // [Class(owner), Str(name), Str(type)]
    VirtCall = 74,   // [Class(owner), Str(name), Str(params)] + optional [Int(exact)]
    StaticCall = 75, // [Class(owner), Str(name), Str(params)]
    New = 76,        // [Class(owner)]
    Init = 77,       // [Class(owner), Str(params)]

    // ========================================
    // Objects and arrays
    // ========================================
    NewArray = 80,    // [Class(element type)]
    ArrayLength = 81,
    ArrayLoad = 82,
    ArrayStore = 83,
    CheckCast = 84,   // [Class(type)]
    InstanceOf = 85,  // [Class(type)]
    MonitorEnter = 86,
    MonitorExit = 87,
    Throw = 88,
}

impl Opcode {
    pub const ALL: &'static [Opcode] = &[
        Opcode::Nop,
        Opcode::PushNull,
        Opcode::PushInt,
        Opcode::PushLong,
        Opcode::PushFloat,
        Opcode::PushDouble,
        Opcode::PushString,
        Opcode::PushClass,
        Opcode::Load,
        Opcode::Store,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Rem,
        Opcode::Neg,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Ushr,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Cmp,
        Opcode::Cmpl,
        Opcode::Cmpg,
        Opcode::PrimCast,
        Opcode::Stack,
        Opcode::Jmp,
        Opcode::Jz,
        Opcode::Jnz,
        Opcode::Jlt,
        Opcode::Jge,
        Opcode::Jgt,
        Opcode::Jle,
        Opcode::JeqRef,
        Opcode::JneRef,
        Opcode::Jnull,
        Opcode::Jnonnull,
        Opcode::Jsr,
        Opcode::Ret,
        Opcode::Return,
        Opcode::VirtGet,
        Opcode::StaticGet,
        Opcode::VirtSet,
        Opcode::StaticSet,
        Opcode::VirtCall,
        Opcode::StaticCall,
        Opcode::New,
        Opcode::Init,
        Opcode::NewArray,
        Opcode::ArrayLength,
        Opcode::ArrayLoad,
        Opcode::ArrayStore,
        Opcode::CheckCast,
        Opcode::InstanceOf,
        Opcode::MonitorEnter,
        Opcode::MonitorExit,
        Opcode::Throw,
    ];

    pub fn from_u8(byte: u8) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| *op as u8 == byte)
    }

    /// Whether the first operand is a jump target that gets label fixups.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
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
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PushNull => "PUSH_NULL",
            Opcode::PushInt => "PUSH_INT",
            Opcode::PushLong => "PUSH_LONG",
            Opcode::PushFloat => "PUSH_FLOAT",
            Opcode::PushDouble => "PUSH_DOUBLE",
            Opcode::PushString => "PUSH_STRING",
            Opcode::PushClass => "PUSH_CLASS",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Rem => "REM",
            Opcode::Neg => "NEG",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::Ushr => "USHR",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Cmp => "CMP",
            Opcode::Cmpl => "CMPL",
            Opcode::Cmpg => "CMPG",
            Opcode::PrimCast => "PRIM_CAST",
            Opcode::Stack => "STACK",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Jlt => "JLT",
            Opcode::Jge => "JGE",
            Opcode::Jgt => "JGT",
            Opcode::Jle => "JLE",
            Opcode::JeqRef => "JEQ_REF",
            Opcode::JneRef => "JNE_REF",
            Opcode::Jnull => "JNULL",
            Opcode::Jnonnull => "JNONNULL",
            Opcode::Jsr => "JSR",
            Opcode::Ret => "RET",
            Opcode::Return => "RETURN",
            Opcode::VirtGet => "VIRT_GET",
            Opcode::StaticGet => "STATIC_GET",
            Opcode::VirtSet => "VIRT_SET",
            Opcode::StaticSet => "STATIC_SET",
            Opcode::VirtCall => "VIRT_CALL",
            Opcode::StaticCall => "STATIC_CALL",
            Opcode::New => "NEW",
            Opcode::Init => "INIT",
            Opcode::NewArray => "NEW_ARRAY",
            Opcode::ArrayLength => "ARRAY_LENGTH",
            Opcode::ArrayLoad => "ARRAY_LOAD",
            Opcode::ArrayStore => "ARRAY_STORE",
            Opcode::CheckCast => "CHECKCAST",
            Opcode::InstanceOf => "INSTANCE_OF",
            Opcode::MonitorEnter => "MONITOR_ENTER",
            Opcode::MonitorExit => "MONITOR_EXIT",
            Opcode::Throw => "THROW",
        }
    }
}

/// Shape operand of [`Opcode::Stack`]. Shapes act on slots, so a wide value
/// and its continuation count as two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StackShape {
    Pop = 0,
    Pop2 = 1,
    Dup = 2,
    DupX1 = 3,
    DupX2 = 4,
    Dup2 = 5,
    Dup2X1 = 6,
    Dup2X2 = 7,
    Swap = 8,
}

impl StackShape {
    pub fn from_i32(v: i32) -> Option<StackShape> {
        Some(match v {
            0 => StackShape::Pop,
            1 => StackShape::Pop2,
            2 => StackShape::Dup,
            3 => StackShape::DupX1,
            4 => StackShape::DupX2,
            5 => StackShape::Dup2,
            6 => StackShape::Dup2X1,
            7 => StackShape::Dup2X2,
            8 => StackShape::Swap,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_covers_all() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_u8(*op as u8), Some(*op));
        }
        assert_eq!(Opcode::from_u8(0xff), None);
    }

    #[test]
    fn test_opcode_numbers_unique() {
        let mut seen = std::collections::HashSet::new();
        for op in Opcode::ALL {
            assert!(seen.insert(*op as u8), "duplicate opcode {:?}", op);
        }
    }

    #[test]
    fn test_shapes() {
        for v in 0..=8 {
            assert_eq!(StackShape::from_i32(v).map(|s| s as i32), Some(v));
        }
        assert_eq!(StackShape::from_i32(9), None);
    }
}
