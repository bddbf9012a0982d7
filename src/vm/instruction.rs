use std::fmt;

use super::error::InterpreterFault;
use super::ops::Opcode;

/// Upper bound on operands per instruction (the count is serialized as a byte).
pub const MAX_OPERANDS: usize = u8::MAX as usize;

/// A typed instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    /// A class name, in `Class.getName()` form.
    Class(String),
}

impl Operand {
    pub fn kind(&self) -> &'static str {
        match self {
            Operand::Int(_) => "int",
            Operand::Long(_) => "long",
            Operand::Float(_) => "float",
            Operand::Double(_) => "double",
            Operand::Str(_) => "string",
            Operand::Class(_) => "class",
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(v) => write!(f, "{}", v),
            Operand::Long(v) => write!(f, "{}L", v),
            Operand::Float(v) => write!(f, "{}F", v),
            Operand::Double(v) => write!(f, "{}D", v),
            Operand::Str(s) => write!(f, "{:?}", s.replace(super::PARAM_DELIMITER, ", ")),
            Operand::Class(c) => write!(f, "{}", c),
        }
    }
}

/// One instruction. Its index in the owning list is its address.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: u8,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self {
            opcode: opcode as u8,
            operands,
        }
    }

    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new())
    }

    pub fn with_int(opcode: Opcode, value: i32) -> Self {
        Self::new(opcode, vec![Operand::Int(value)])
    }

    pub fn op(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    fn name(&self) -> &'static str {
        self.op().map(Opcode::mnemonic).unwrap_or("?")
    }

    fn operand(&self, index: usize) -> Result<&Operand, InterpreterFault> {
        self.operands.get(index).ok_or(InterpreterFault::BadOperand {
            opcode: self.name(),
            index,
            reason: "missing",
        })
    }

    fn wrong_kind(&self, index: usize) -> InterpreterFault {
        InterpreterFault::BadOperand {
            opcode: self.name(),
            index,
            reason: "wrong operand kind",
        }
    }

    pub fn int_operand(&self, index: usize) -> Result<i32, InterpreterFault> {
        match self.operand(index)? {
            Operand::Int(v) => Ok(*v),
            _ => Err(self.wrong_kind(index)),
        }
    }

    pub fn long_operand(&self, index: usize) -> Result<i64, InterpreterFault> {
        match self.operand(index)? {
            Operand::Long(v) => Ok(*v),
            _ => Err(self.wrong_kind(index)),
        }
    }

    pub fn float_operand(&self, index: usize) -> Result<f32, InterpreterFault> {
        match self.operand(index)? {
            Operand::Float(v) => Ok(*v),
            _ => Err(self.wrong_kind(index)),
        }
    }

    pub fn double_operand(&self, index: usize) -> Result<f64, InterpreterFault> {
        match self.operand(index)? {
            Operand::Double(v) => Ok(*v),
            _ => Err(self.wrong_kind(index)),
        }
    }

    /// An `Int` operand used as an index (slot or jump target).
    pub fn index_operand(&self, index: usize) -> Result<usize, InterpreterFault> {
        let v = self.int_operand(index)?;
        usize::try_from(v).map_err(|_| InterpreterFault::BadOperand {
            opcode: self.name(),
            index,
            reason: "negative index",
        })
    }

    pub fn str_operand(&self, index: usize) -> Result<&str, InterpreterFault> {
        match self.operand(index)? {
            Operand::Str(s) => Ok(s),
            _ => Err(self.wrong_kind(index)),
        }
    }

    pub fn class_operand(&self, index: usize) -> Result<&str, InterpreterFault> {
        match self.operand(index)? {
            Operand::Class(s) => Ok(s),
            _ => Err(self.wrong_kind(index)),
        }
    }

    /// Optional trailing `Int` flag; absent means 0.
    pub fn flag_operand(&self, index: usize) -> Result<bool, InterpreterFault> {
        match self.operands.get(index) {
            None => Ok(false),
            Some(Operand::Int(v)) => Ok(*v != 0),
            Some(_) => Err(self.wrong_kind(index)),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Some(op) => write!(f, "{}", op.mnemonic())?,
            None => write!(f, "<0x{:02x}>", self.opcode)?,
        }
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, operand)?;
        }
        Ok(())
    }
}

/// Per-build table of instruction lists, indexed by stub offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StubTable {
    stubs: Vec<Vec<Instruction>>,
}

impl StubTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stubs(stubs: Vec<Vec<Instruction>>) -> Self {
        Self { stubs }
    }

    /// Append a list and return the offset that selects it.
    pub fn push(&mut self, code: Vec<Instruction>) -> usize {
        self.stubs.push(code);
        self.stubs.len() - 1
    }

    pub fn get(&self, offset: usize) -> Option<&[Instruction]> {
        self.stubs.get(offset).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Instruction]> {
        self.stubs.iter().map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let insn = Instruction::new(
            Opcode::StaticCall,
            vec![
                Operand::Class("java.lang.Math".to_string()),
                Operand::Str("max".to_string()),
                Operand::Str("int\u{1}\u{2}int".to_string()),
            ],
        );
        assert_eq!(
            insn.to_string(),
            "STATIC_CALL java.lang.Math, \"max\", \"int, int\""
        );
        assert_eq!(Instruction { opcode: 0xfe, operands: vec![] }.to_string(), "<0xfe>");
    }

    #[test]
    fn test_operand_accessors() {
        let insn = Instruction::with_int(Opcode::Load, -1);
        assert_eq!(insn.int_operand(0).unwrap(), -1);
        assert!(insn.index_operand(0).is_err());
        assert!(insn.str_operand(0).is_err());
        assert!(insn.int_operand(1).is_err());
        assert!(!insn.flag_operand(1).unwrap());
    }

    #[test]
    fn test_stub_offsets() {
        let mut table = StubTable::new();
        assert_eq!(table.push(vec![Instruction::simple(Opcode::Return)]), 0);
        assert_eq!(table.push(vec![]), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().len(), 1);
        assert!(table.get(2).is_none());
    }
}
