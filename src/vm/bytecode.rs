//! Stub table serialization.
//!
//! Binary format (little-endian), compressed as a single zstd block:
//! - Method count: u32
//! - Per method: instruction count u32
//! - Per instruction: opcode u8 (through the build's opcode table),
//!   operand count u8, then per operand a tag u8 and its value
//!
//! Fixed-width values: INT i32, LONG i64, FLOAT f32, DOUBLE f64.
//! STRING and CLASS are a u32 byte length followed by UTF-8.

use std::io::{self, Read, Write};

use tracing::debug;

use super::instruction::{Instruction, MAX_OPERANDS, Operand, StubTable};
use super::opcode_table::OpcodeTable;

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// Operand tags
const TAG_INT: u8 = 0;
const TAG_LONG: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_CLASS: u8 = 5;

/// Error type for stub table encoding and decoding
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of stub data")]
    UnexpectedEof,

    #[error("invalid operand tag: {0}")]
    InvalidOperandTag(u8),

    #[error("instruction has {0} operands, at most 255 can be encoded")]
    TooManyOperands(usize),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("{0} trailing bytes after stub table")]
    TrailingBytes(usize),

    #[error("compression failed: {0}")]
    Compression(io::Error),

    #[error("decompression failed: {0}")]
    Decompression(io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Serialize and compress a stub table.
pub fn encode(table: &StubTable, opcodes: &OpcodeTable, level: i32) -> Result<Vec<u8>, CodecError> {
    let mut raw = Vec::new();
    write_table(&mut raw, table, opcodes)?;
    let compressed = zstd::encode_all(&raw[..], level).map_err(CodecError::Compression)?;
    debug!(
        methods = table.len(),
        raw_bytes = raw.len(),
        compressed_bytes = compressed.len(),
        "stub table encoded"
    );
    Ok(compressed)
}

/// Decompress and deserialize a stub table.
pub fn decode(data: &[u8], opcodes: &OpcodeTable) -> Result<StubTable, CodecError> {
    let raw = zstd::decode_all(data).map_err(CodecError::Decompression)?;
    let mut cursor = io::Cursor::new(&raw[..]);
    let table = read_table(&mut cursor, opcodes)?;
    let consumed = cursor.position() as usize;
    if consumed != raw.len() {
        return Err(CodecError::TrailingBytes(raw.len() - consumed));
    }
    Ok(table)
}

/// Write the uncompressed table body.
pub fn write_table<W: Write>(
    w: &mut W,
    table: &StubTable,
    opcodes: &OpcodeTable,
) -> Result<(), CodecError> {
    write_u32(w, table.len() as u32)?;
    for code in table.iter() {
        write_u32(w, code.len() as u32)?;
        for insn in code {
            write_instruction(w, insn, opcodes)?;
        }
    }
    Ok(())
}

/// Read an uncompressed table body.
pub fn read_table<R: Read>(r: &mut R, opcodes: &OpcodeTable) -> Result<StubTable, CodecError> {
    let method_count = read_u32(r)? as usize;
    let mut stubs = Vec::with_capacity(method_count.min(1024));
    for _ in 0..method_count {
        let len = read_u32(r)? as usize;
        let mut code = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            code.push(read_instruction(r, opcodes)?);
        }
        stubs.push(code);
    }
    Ok(StubTable::from_stubs(stubs))
}

fn write_instruction<W: Write>(
    w: &mut W,
    insn: &Instruction,
    opcodes: &OpcodeTable,
) -> Result<(), CodecError> {
    if insn.operands.len() > MAX_OPERANDS {
        return Err(CodecError::TooManyOperands(insn.operands.len()));
    }
    write_u8(w, opcodes.encode(insn.opcode))?;
    write_u8(w, insn.operands.len() as u8)?;
    for operand in &insn.operands {
        write_operand(w, operand)?;
    }
    Ok(())
}

fn read_instruction<R: Read>(r: &mut R, opcodes: &OpcodeTable) -> Result<Instruction, CodecError> {
    let opcode = opcodes.decode(read_u8(r)?);
    let count = read_u8(r)? as usize;
    let mut operands = Vec::with_capacity(count);
    for _ in 0..count {
        operands.push(read_operand(r)?);
    }
    Ok(Instruction { opcode, operands })
}

fn write_operand<W: Write>(w: &mut W, operand: &Operand) -> io::Result<()> {
    match operand {
        Operand::Int(v) => {
            write_u8(w, TAG_INT)?;
            w.write_all(&v.to_le_bytes())
        }
        Operand::Long(v) => {
            write_u8(w, TAG_LONG)?;
            w.write_all(&v.to_le_bytes())
        }
        Operand::Float(v) => {
            write_u8(w, TAG_FLOAT)?;
            w.write_all(&v.to_bits().to_le_bytes())
        }
        Operand::Double(v) => {
            write_u8(w, TAG_DOUBLE)?;
            w.write_all(&v.to_bits().to_le_bytes())
        }
        Operand::Str(s) => {
            write_u8(w, TAG_STRING)?;
            write_string(w, s)
        }
        Operand::Class(s) => {
            write_u8(w, TAG_CLASS)?;
            write_string(w, s)
        }
    }
}

fn read_operand<R: Read>(r: &mut R) -> Result<Operand, CodecError> {
    let tag = read_u8(r)?;
    let operand = match tag {
        TAG_INT => Operand::Int(i32::from_le_bytes(read_array(r)?)),
        TAG_LONG => Operand::Long(i64::from_le_bytes(read_array(r)?)),
        TAG_FLOAT => Operand::Float(f32::from_bits(u32::from_le_bytes(read_array(r)?))),
        TAG_DOUBLE => Operand::Double(f64::from_bits(u64::from_le_bytes(read_array(r)?))),
        TAG_STRING => Operand::Str(read_string(r)?),
        TAG_CLASS => Operand::Class(read_string(r)?),
        _ => return Err(CodecError::InvalidOperandTag(tag)),
    };
    Ok(operand)
}

// Helper functions for reading/writing primitives

fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, CodecError> {
    let [b] = read_array::<R, 1>(r)?;
    Ok(b)
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, CodecError> {
    Ok(u32::from_le_bytes(read_array(r)?))
}

fn read_array<R: Read, const N: usize>(r: &mut R) -> Result<[u8; N], CodecError> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)
        .map_err(|_| CodecError::UnexpectedEof)?;
    Ok(buf)
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_string<R: Read>(r: &mut R) -> Result<String, CodecError> {
    let len = read_u32(r)? as usize;
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(CodecError::UnexpectedEof);
    }
    String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Opcode;

    fn sample_table() -> StubTable {
        StubTable::from_stubs(vec![
            vec![
                Instruction::with_int(Opcode::Load, 1),
                Instruction::with_int(Opcode::Load, 2),
                Instruction::simple(Opcode::Add),
                Instruction::simple(Opcode::Return),
            ],
            vec![
                Instruction::new(Opcode::PushLong, vec![Operand::Long(i64::MIN)]),
                Instruction::new(Opcode::PushFloat, vec![Operand::Float(-0.5)]),
                Instruction::new(Opcode::PushDouble, vec![Operand::Double(std::f64::consts::PI)]),
                Instruction::new(Opcode::PushString, vec![Operand::Str("héllo".to_string())]),
                Instruction::new(Opcode::PushClass, vec![Operand::Class("[I".to_string())]),
            ],
            vec![],
        ])
    }

    #[test]
    fn test_roundtrip_all_operand_kinds() {
        let table = sample_table();
        let bytes = encode(&table, &OpcodeTable::identity(), DEFAULT_COMPRESSION_LEVEL).unwrap();
        let restored = decode(&bytes, &OpcodeTable::identity()).unwrap();
        assert_eq!(restored, table);
    }

    #[test]
    fn test_roundtrip_with_shuffled_opcodes() {
        let table = sample_table();
        let opcodes = OpcodeTable::from_seed(42);
        let bytes = encode(&table, &opcodes, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_eq!(decode(&bytes, &opcodes).unwrap(), table);
    }

    #[test]
    fn test_max_operand_count() {
        let operands = (0..MAX_OPERANDS as i32).map(Operand::Int).collect::<Vec<_>>();
        let table = StubTable::from_stubs(vec![vec![Instruction::new(Opcode::Nop, operands)]]);
        let bytes = encode(&table, &OpcodeTable::identity(), 1).unwrap();
        assert_eq!(decode(&bytes, &OpcodeTable::identity()).unwrap(), table);

        let too_many = (0..=MAX_OPERANDS as i32).map(Operand::Int).collect::<Vec<_>>();
        let table = StubTable::from_stubs(vec![vec![Instruction::new(Opcode::Nop, too_many)]]);
        assert!(matches!(
            encode(&table, &OpcodeTable::identity(), 1),
            Err(CodecError::TooManyOperands(256))
        ));
    }

    #[test]
    fn test_raw_layout() {
        let table = StubTable::from_stubs(vec![vec![Instruction::with_int(Opcode::PushInt, 7)]]);
        let mut raw = Vec::new();
        write_table(&mut raw, &table, &OpcodeTable::identity()).unwrap();
        assert_eq!(
            raw,
            vec![
                1, 0, 0, 0, // method count
                1, 0, 0, 0, // instruction count
                Opcode::PushInt as u8,
                1, // operand count
                TAG_INT, 7, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let raw = vec![1, 0, 0, 0, 1, 0, 0, 0, Opcode::PushInt as u8, 1, 6, 0, 0, 0, 0];
        let result = read_table(&mut io::Cursor::new(&raw[..]), &OpcodeTable::identity());
        assert!(matches!(result, Err(CodecError::InvalidOperandTag(6))));
    }

    #[test]
    fn test_truncated_rejected() {
        let raw = vec![1, 0, 0, 0, 2, 0, 0, 0, Opcode::Nop as u8, 0];
        let result = read_table(&mut io::Cursor::new(&raw[..]), &OpcodeTable::identity());
        assert!(matches!(result, Err(CodecError::UnexpectedEof)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let raw = vec![0, 0, 0, 0, 0xaa];
        let compressed = zstd::encode_all(&raw[..], 1).unwrap();
        assert!(matches!(
            decode(&compressed, &OpcodeTable::identity()),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_not_compressed_rejected() {
        assert!(matches!(
            decode(b"garbage", &OpcodeTable::identity()),
            Err(CodecError::Decompression(_))
        ));
    }
}
