//! Lazy, once-only loading of the packaged stub table.

use std::fs;
use std::io;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing::info;

use super::bytecode;
use super::error::InterpreterFault;
use super::instruction::{Instruction, StubTable};
use super::opcode_table::OpcodeTable;

type Source = Box<dyn Fn() -> io::Result<Vec<u8>> + Send + Sync>;

/// Supplies the stub table to every interpreter on a runtime.
///
/// The resource is read and decoded on first use. Concurrent first uses
/// block on one another and all observe the same table; later uses are a
/// plain read.
pub struct StubLoader {
    name: String,
    source: Source,
    opcodes: OpcodeTable,
    table: OnceCell<StubTable>,
}

impl StubLoader {
    /// A loader over an already-decoded table.
    pub fn from_table(table: StubTable) -> Self {
        Self {
            name: "<memory>".to_string(),
            source: Box::new(|| Err(io::Error::other("stub table supplied in memory"))),
            opcodes: OpcodeTable::identity(),
            table: OnceCell::with_value(table),
        }
    }

    /// A loader with no stubs at all.
    pub fn empty() -> Self {
        Self::from_table(StubTable::new())
    }

    /// A loader over encoded resource bytes.
    pub fn from_bytes(bytes: Vec<u8>, opcodes: OpcodeTable) -> Self {
        Self::from_source("<bytes>", opcodes, move || Ok(bytes.clone()))
    }

    /// A loader reading the resource from disk on first use.
    pub fn from_file(path: impl Into<PathBuf>, opcodes: OpcodeTable) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self::from_source(name, opcodes, move || fs::read(&path))
    }

    pub fn from_source<F>(name: impl Into<String>, opcodes: OpcodeTable, source: F) -> Self
    where
        F: Fn() -> io::Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            source: Box::new(source),
            opcodes,
            table: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.table.get().is_some()
    }

    /// The decoded table, loading it on first call.
    pub fn table(&self) -> Result<&StubTable, InterpreterFault> {
        self.table.get_or_try_init(|| {
            let bytes = (self.source)()
                .map_err(|e| InterpreterFault::StubLoad(format!("{}: {}", self.name, e)))?;
            let table = bytecode::decode(&bytes, &self.opcodes)
                .map_err(|e| InterpreterFault::StubLoad(format!("{}: {}", self.name, e)))?;
            info!(resource = %self.name, methods = table.len(), "stub table loaded");
            Ok(table)
        })
    }

    /// The instruction list at `offset`.
    pub fn stub(&self, offset: usize) -> Result<&[Instruction], InterpreterFault> {
        self.table()?
            .get(offset)
            .ok_or(InterpreterFault::NoSuchStub(offset))
    }
}
