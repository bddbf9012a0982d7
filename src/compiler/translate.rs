//! JVM instruction nodes to the virtual instruction set.
//!
//! Translation is two passes. The first walks the node list, emitting a
//! `NOP` for every label (recording its index) and recording each jump
//! operand against its label. The second rewrites those operands to the
//! recorded indices. Handler ranges resolve through the same label map.

use std::collections::HashMap;

use crate::model::descriptor::{self, DescriptorError, binary_name};
use crate::model::opcodes::*;
use crate::model::{Constant, Insn, LabelId, MethodNode};
use crate::vm::{Instruction, JavaType, Opcode, Operand, StackShape, TryCatch, join_params};

/// Why a method could not be virtualized. Either way the method is left
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("unsupported instruction: {0}")]
    Unsupported(String),

    #[error("malformed method: {0}")]
    Structural(String),
}

impl From<DescriptorError> for TranslateError {
    fn from(err: DescriptorError) -> Self {
        TranslateError::Structural(err.to_string())
    }
}

/// The virtualized form of one method body.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub code: Vec<Instruction>,
    pub try_catches: Vec<TryCatch>,
}

pub struct Translator<'m> {
    method: &'m MethodNode,
    code: Vec<Instruction>,
    labels: HashMap<LabelId, usize>,
    fixups: Vec<(usize, LabelId)>,
}

impl<'m> Translator<'m> {
    pub fn new(method: &'m MethodNode) -> Self {
        Self {
            method,
            code: Vec::with_capacity(method.instructions.len()),
            labels: HashMap::new(),
            fixups: Vec::new(),
        }
    }

    pub fn translate(mut self) -> Result<Translation, TranslateError> {
        for insn in &self.method.instructions {
            self.translate_insn(insn)?;
        }
        self.resolve_jumps()?;
        let try_catches = self.try_catches()?;
        Ok(Translation {
            code: self.code,
            try_catches,
        })
    }

    fn emit(&mut self, opcode: Opcode, operands: Vec<Operand>) {
        self.code.push(Instruction::new(opcode, operands));
    }

    fn emit_simple(&mut self, opcode: Opcode) {
        self.emit(opcode, Vec::new());
    }

    fn emit_jump(&mut self, opcode: Opcode, label: LabelId) {
        self.fixups.push((self.code.len(), label));
        self.emit(opcode, vec![Operand::Int(-1)]);
    }

    fn translate_insn(&mut self, insn: &Insn) -> Result<(), TranslateError> {
        match insn {
            Insn::Label { id } => {
                if self.labels.insert(*id, self.code.len()).is_some() {
                    return Err(TranslateError::Structural(format!("label {} defined twice", id.0)));
                }
                self.emit_simple(Opcode::Nop);
            }
            Insn::LineNumber { .. } | Insn::Frame => {}
            Insn::Simple { opcode } => self.translate_simple(*opcode)?,
            Insn::Int { opcode, operand } => self.translate_int(*opcode, *operand)?,
            Insn::Var { opcode, var } => {
                let slot = vec![Operand::Int(*var as i32)];
                match *opcode {
                    ILOAD..=ALOAD => self.emit(Opcode::Load, slot),
                    ISTORE..=ASTORE => self.emit(Opcode::Store, slot),
                    RET => self.emit(Opcode::Ret, slot),
                    other => return Err(wrong_kind(other, "variable")),
                }
            }
            Insn::Type { opcode, desc } => {
                let class = vec![Operand::Class(binary_name(desc))];
                match *opcode {
                    NEW => self.emit(Opcode::New, class),
                    ANEWARRAY => self.emit(Opcode::NewArray, class),
                    CHECKCAST => self.emit(Opcode::CheckCast, class),
                    INSTANCEOF => self.emit(Opcode::InstanceOf, class),
                    other => return Err(wrong_kind(other, "type")),
                }
            }
            Insn::Field {
                opcode,
                owner,
                name,
                desc,
            } => {
                let ty = descriptor::parse_field(desc)?;
                let operands = vec![
                    Operand::Class(binary_name(owner)),
                    Operand::Str(name.clone()),
                    Operand::Str(ty.name().to_string()),
                ];
                match *opcode {
                    GETFIELD => self.emit(Opcode::VirtGet, operands),
                    GETSTATIC => self.emit(Opcode::StaticGet, operands),
                    PUTFIELD => self.emit(Opcode::VirtSet, operands),
                    PUTSTATIC => self.emit(Opcode::StaticSet, operands),
                    other => return Err(wrong_kind(other, "field")),
                }
            }
            Insn::Method {
                opcode,
                owner,
                name,
                desc,
                ..
            } => self.translate_invoke(*opcode, owner, name, desc)?,
            Insn::InvokeDynamic { name, .. } => {
                return Err(TranslateError::Unsupported(format!("invokedynamic ({})", name)));
            }
            Insn::Jump { opcode, label } => self.translate_jump(*opcode, *label)?,
            Insn::Ldc { value } => match value {
                Constant::Int(v) => self.emit(Opcode::PushInt, vec![Operand::Int(*v)]),
                Constant::Long(v) => self.emit(Opcode::PushLong, vec![Operand::Long(*v)]),
                Constant::Float(v) => self.emit(Opcode::PushFloat, vec![Operand::Float(*v)]),
                Constant::Double(v) => self.emit(Opcode::PushDouble, vec![Operand::Double(*v)]),
                Constant::String(s) => self.emit(Opcode::PushString, vec![Operand::Str(s.clone())]),
                Constant::Class(c) => self.emit(Opcode::PushClass, vec![Operand::Class(binary_name(c))]),
            },
            Insn::Iinc { var, incr } => {
                let slot = *var as i32;
                self.emit(Opcode::Load, vec![Operand::Int(slot)]);
                self.emit(Opcode::PushInt, vec![Operand::Int(*incr)]);
                self.emit_simple(Opcode::Add);
                self.emit(Opcode::Store, vec![Operand::Int(slot)]);
            }
            Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } | Insn::MultiANewArray { .. } => {
                let opcode = insn.opcode().unwrap_or(NOP);
                return Err(TranslateError::Unsupported(name(opcode).to_string()));
            }
        }
        Ok(())
    }

    fn translate_simple(&mut self, opcode: u8) -> Result<(), TranslateError> {
        let (op, operands) = match opcode {
            NOP => (Opcode::Nop, vec![]),
            ACONST_NULL => (Opcode::PushNull, vec![]),
            ICONST_M1..=ICONST_5 => (Opcode::PushInt, vec![Operand::Int(opcode as i32 - ICONST_0 as i32)]),
            LCONST_0 | LCONST_1 => (Opcode::PushLong, vec![Operand::Long((opcode - LCONST_0) as i64)]),
            FCONST_0..=FCONST_2 => (Opcode::PushFloat, vec![Operand::Float((opcode - FCONST_0) as f32)]),
            DCONST_0 | DCONST_1 => (Opcode::PushDouble, vec![Operand::Double((opcode - DCONST_0) as f64)]),

            IALOAD..=SALOAD => (Opcode::ArrayLoad, vec![]),
            IASTORE..=SASTORE => (Opcode::ArrayStore, vec![]),

            POP..=SWAP => {
                let shape = match opcode {
                    POP => StackShape::Pop,
                    POP2 => StackShape::Pop2,
                    DUP => StackShape::Dup,
                    DUP_X1 => StackShape::DupX1,
                    DUP_X2 => StackShape::DupX2,
                    DUP2 => StackShape::Dup2,
                    DUP2_X1 => StackShape::Dup2X1,
                    DUP2_X2 => StackShape::Dup2X2,
                    _ => StackShape::Swap,
                };
                (Opcode::Stack, vec![Operand::Int(shape as i32)])
            }

            IADD..=DADD => (Opcode::Add, vec![]),
            ISUB..=DSUB => (Opcode::Sub, vec![]),
            IMUL..=DMUL => (Opcode::Mul, vec![]),
            IDIV..=DDIV => (Opcode::Div, vec![]),
            IREM..=DREM => (Opcode::Rem, vec![]),
            INEG..=DNEG => (Opcode::Neg, vec![]),
            ISHL | LSHL => (Opcode::Shl, vec![]),
            ISHR | LSHR => (Opcode::Shr, vec![]),
            IUSHR | LUSHR => (Opcode::Ushr, vec![]),
            IAND | LAND => (Opcode::And, vec![]),
            IOR | LOR => (Opcode::Or, vec![]),
            IXOR | LXOR => (Opcode::Xor, vec![]),

            I2L..=I2S => {
                let target = match opcode {
                    I2L | F2L | D2L => 'J',
                    I2F | L2F | D2F => 'F',
                    I2D | L2D | F2D => 'D',
                    L2I | F2I | D2I => 'I',
                    I2B => 'B',
                    I2C => 'C',
                    _ => 'S',
                };
                (Opcode::PrimCast, vec![Operand::Int(target as i32)])
            }

            LCMP => (Opcode::Cmp, vec![]),
            FCMPL | DCMPL => (Opcode::Cmpl, vec![]),
            FCMPG | DCMPG => (Opcode::Cmpg, vec![]),

            IRETURN..=ARETURN => (Opcode::Return, vec![]),
            RETURN => {
                self.emit_simple(Opcode::PushNull);
                (Opcode::Return, vec![])
            }

            ARRAYLENGTH => (Opcode::ArrayLength, vec![]),
            ATHROW => (Opcode::Throw, vec![]),
            MONITORENTER => (Opcode::MonitorEnter, vec![]),
            MONITOREXIT => (Opcode::MonitorExit, vec![]),
            other => return Err(wrong_kind(other, "zero-operand")),
        };
        self.emit(op, operands);
        Ok(())
    }

    fn translate_int(&mut self, opcode: u8, operand: i32) -> Result<(), TranslateError> {
        match opcode {
            BIPUSH | SIPUSH => self.emit(Opcode::PushInt, vec![Operand::Int(operand)]),
            NEWARRAY => {
                let element = match operand {
                    T_BOOLEAN => JavaType::Boolean,
                    T_CHAR => JavaType::Char,
                    T_FLOAT => JavaType::Float,
                    T_DOUBLE => JavaType::Double,
                    T_BYTE => JavaType::Byte,
                    T_SHORT => JavaType::Short,
                    T_INT => JavaType::Int,
                    T_LONG => JavaType::Long,
                    other => {
                        return Err(TranslateError::Structural(format!(
                            "newarray with element type code {}",
                            other
                        )));
                    }
                };
                self.emit(Opcode::NewArray, vec![Operand::Class(element.name().to_string())]);
            }
            other => return Err(wrong_kind(other, "int-operand")),
        }
        Ok(())
    }

    fn translate_invoke(&mut self, opcode: u8, owner: &str, name: &str, desc: &str) -> Result<(), TranslateError> {
        let (params, _) = descriptor::parse_method(desc)?;
        let owner = Operand::Class(binary_name(owner));
        let params = Operand::Str(join_params(&params));
        match opcode {
            INVOKESPECIAL if name == "<init>" => self.emit(Opcode::Init, vec![owner, params]),
            INVOKESPECIAL => self.emit(
                Opcode::VirtCall,
                vec![owner, Operand::Str(name.to_string()), params, Operand::Int(1)],
            ),
            INVOKEVIRTUAL | INVOKEINTERFACE => {
                self.emit(Opcode::VirtCall, vec![owner, Operand::Str(name.to_string()), params])
            }
            INVOKESTATIC => self.emit(Opcode::StaticCall, vec![owner, Operand::Str(name.to_string()), params]),
            other => return Err(wrong_kind(other, "method")),
        }
        Ok(())
    }

    fn translate_jump(&mut self, opcode: u8, label: LabelId) -> Result<(), TranslateError> {
        let zero_test = |op: u8| match op {
            IFEQ | IF_ICMPEQ => Opcode::Jz,
            IFNE | IF_ICMPNE => Opcode::Jnz,
            IFLT | IF_ICMPLT => Opcode::Jlt,
            IFGE | IF_ICMPGE => Opcode::Jge,
            IFGT | IF_ICMPGT => Opcode::Jgt,
            _ => Opcode::Jle,
        };
        match opcode {
            IFEQ..=IFLE => self.emit_jump(zero_test(opcode), label),
            IF_ICMPEQ..=IF_ICMPLE => {
                // Compare as the sign of the difference so the jump can test
                // against zero; the marker keeps the subtraction overflow-free.
                self.emit(Opcode::Sub, vec![Operand::Int(1)]);
                self.emit_jump(zero_test(opcode), label);
            }
            IF_ACMPEQ => self.emit_jump(Opcode::JeqRef, label),
            IF_ACMPNE => self.emit_jump(Opcode::JneRef, label),
            IFNULL => self.emit_jump(Opcode::Jnull, label),
            IFNONNULL => self.emit_jump(Opcode::Jnonnull, label),
            GOTO | GOTO_W => self.emit_jump(Opcode::Jmp, label),
            JSR | JSR_W => self.emit_jump(Opcode::Jsr, label),
            other => return Err(wrong_kind(other, "jump")),
        }
        Ok(())
    }

    fn label_index(&self, label: LabelId) -> Result<usize, TranslateError> {
        self.labels
            .get(&label)
            .copied()
            .ok_or_else(|| TranslateError::Structural(format!("unknown label {}", label.0)))
    }

    fn resolve_jumps(&mut self) -> Result<(), TranslateError> {
        for (index, label) in std::mem::take(&mut self.fixups) {
            let target = self.label_index(label)?;
            self.code[index].operands[0] = Operand::Int(target as i32);
        }
        Ok(())
    }

    fn try_catches(&self) -> Result<Vec<TryCatch>, TranslateError> {
        self.method
            .try_catch_blocks
            .iter()
            .map(|block| {
                let start = self.label_index(block.start)?;
                let end = self.label_index(block.end)?;
                if start > end {
                    return Err(TranslateError::Structural(format!(
                        "handler range {}..{} is inverted",
                        start, end
                    )));
                }
                Ok(TryCatch {
                    start_pc: start,
                    end_pc: end,
                    handler_pc: self.label_index(block.handler)?,
                    catch_type: block.catch_type.as_deref().map(binary_name),
                })
            })
            .collect()
    }
}

fn wrong_kind(opcode: u8, kind: &str) -> TranslateError {
    TranslateError::Structural(format!("{} is not a {} instruction", name(opcode), kind))
}

/// Translate one method body.
pub fn translate(method: &MethodNode) -> Result<Translation, TranslateError> {
    Translator::new(method).translate()
}
