//! Human-readable listings of stub tables and JVM instruction nodes.

use std::collections::BTreeSet;

use crate::model::opcodes;
use crate::model::{Constant, Insn, MethodNode};
use crate::vm::{Instruction, StubTable};

/// Disassembler for a stub table.
pub struct Disassembler<'a> {
    table: &'a StubTable,
    names: &'a [String],
    output: String,
}

impl<'a> Disassembler<'a> {
    pub fn new(table: &'a StubTable) -> Self {
        Self {
            table,
            names: &[],
            output: String::new(),
        }
    }

    /// Label each stub with the method it was translated from, by offset.
    pub fn with_names(mut self, names: &'a [String]) -> Self {
        self.names = names;
        self
    }

    pub fn disassemble(&mut self) -> &str {
        for (i, code) in self.table.iter().enumerate() {
            match self.names.get(i) {
                Some(name) => self
                    .output
                    .push_str(&format!("== Stub[{}]: {} ({} instructions) ==\n", i, name, code.len())),
                None => self
                    .output
                    .push_str(&format!("== Stub[{}] ({} instructions) ==\n", i, code.len())),
            }
            self.disassemble_code(code);
            self.output.push('\n');
        }
        &self.output
    }

    fn disassemble_code(&mut self, code: &[Instruction]) {
        let targets: BTreeSet<usize> = code
            .iter()
            .filter(|insn| insn.op().is_some_and(|op| op.is_jump()))
            .filter_map(|insn| insn.index_operand(0).ok())
            .collect();

        for (pc, insn) in code.iter().enumerate() {
            let marker = if targets.contains(&pc) { '>' } else { ' ' };
            self.output.push_str(&format!("{}{:04}: {}\n", marker, pc, insn));
        }
    }
}

/// Format a stub table as a string.
pub fn format_table(table: &StubTable) -> String {
    let mut disassembler = Disassembler::new(table);
    disassembler.disassemble().to_string()
}

/// Format the JVM instruction nodes of a method, one per line.
pub fn format_method(method: &MethodNode) -> String {
    let mut output = format!(
        "== {}{} (stack: {}, locals: {}) ==\n",
        method.name, method.desc, method.max_stack, method.max_locals
    );
    for insn in &method.instructions {
        output.push_str(&format_insn(insn));
        output.push('\n');
    }
    output
}

fn format_insn(insn: &Insn) -> String {
    match insn {
        Insn::Label { id } => format!("L{}:", id.0),
        Insn::LineNumber { line, .. } => format!("  // line {}", line),
        Insn::Frame => "  // frame".to_string(),
        Insn::Simple { opcode } => format!("    {}", opcodes::name(*opcode)),
        Insn::Int { opcode, operand } => format!("    {} {}", opcodes::name(*opcode), operand),
        Insn::Var { opcode, var } => format!("    {} {}", opcodes::name(*opcode), var),
        Insn::Type { opcode, desc } => format!("    {} {}", opcodes::name(*opcode), desc),
        Insn::Field {
            opcode,
            owner,
            name,
            desc,
        }
        | Insn::Method {
            opcode,
            owner,
            name,
            desc,
            ..
        } => format!("    {} {}.{} {}", opcodes::name(*opcode), owner, name, desc),
        Insn::InvokeDynamic { name, desc } => format!("    invokedynamic {} {}", name, desc),
        Insn::Jump { opcode, label } => format!("    {} L{}", opcodes::name(*opcode), label.0),
        Insn::Ldc { value } => match value {
            Constant::Int(v) => format!("    ldc {}", v),
            Constant::Long(v) => format!("    ldc {}L", v),
            Constant::Float(v) => format!("    ldc {}F", v),
            Constant::Double(v) => format!("    ldc {}D", v),
            Constant::String(s) => format!("    ldc {:?}", s),
            Constant::Class(c) => format!("    ldc {}.class", c),
        },
        Insn::Iinc { var, incr } => format!("    iinc {} {}", var, incr),
        Insn::TableSwitch { min, max, .. } => format!("    tableswitch {}..{}", min, max),
        Insn::LookupSwitch { keys, .. } => format!("    lookupswitch ({} keys)", keys.len()),
        Insn::MultiANewArray { desc, dims } => format!("    multianewarray {} {}", desc, dims),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ACC_STATIC;
    use crate::vm::{Opcode, Operand};

    fn table() -> StubTable {
        StubTable::from_stubs(vec![
            vec![
                Instruction::simple(Opcode::Nop),
                Instruction::with_int(Opcode::Load, 0),
                Instruction::with_int(Opcode::Jnz, 0),
                Instruction::simple(Opcode::Return),
            ],
            vec![
                Instruction::new(Opcode::PushString, vec![Operand::Str("hi".to_string())]),
                Instruction::simple(Opcode::Return),
            ],
        ])
    }

    #[test]
    fn test_format_table() {
        let output = format_table(&table());
        assert!(output.contains("== Stub[0] (4 instructions) =="));
        assert!(output.contains(">0000: NOP"));
        assert!(output.contains(" 0002: JNZ 0"));
        assert!(output.contains("== Stub[1] (2 instructions) =="));
        assert!(output.contains(" 0000: PUSH_STRING \"hi\""));
    }

    #[test]
    fn test_named_stubs() {
        let table = table();
        let names = vec!["demo/Calc.add(II)I".to_string()];
        let mut disassembler = Disassembler::new(&table).with_names(&names);
        let output = disassembler.disassemble();
        assert!(output.contains("== Stub[0]: demo/Calc.add(II)I (4 instructions) =="));
        assert!(output.contains("== Stub[1] (2 instructions) =="));
    }

    #[test]
    fn test_format_method() {
        let method = MethodNode {
            access: ACC_STATIC,
            name: "loop".to_string(),
            desc: "()V".to_string(),
            max_stack: 1,
            max_locals: 0,
            instructions: vec![
                Insn::label(0),
                Insn::ldc(Constant::String("x".to_string())),
                Insn::simple(opcodes::POP),
                Insn::jump(opcodes::GOTO, 0),
            ],
            try_catch_blocks: vec![],
        };
        let output = format_method(&method);
        assert!(output.starts_with("== loop()V (stack: 1, locals: 0) =="));
        assert!(output.contains("L0:\n    ldc \"x\"\n    pop\n    goto L0\n"));
    }
}
