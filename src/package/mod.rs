//! Artifact layout: the encoded stub resource, a copy of the interpreter
//! sources, the generated build key and a manifest tying them together.
//!
//! ```text
//! <out>/
//!   artifact.toml
//!   jvirt/stubs.bin          (configurable resource name)
//!   runtime/*.rs             (interpreter sources, verbatim)
//!   runtime/handlers/*.rs
//!   runtime/build_key.rs
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{VirtualizerConfig, opcode_table};
use crate::vm::bytecode::{self, CodecError};
use crate::vm::{DEFAULT_MAX_CALL_DEPTH, Runtime, StubLoader, StubTable};

pub const MANIFEST_FILE: &str = "artifact.toml";
pub const RUNTIME_DIR: &str = "runtime";
pub const BUILD_KEY_FILE: &str = "build_key.rs";

/// Interpreter sources shipped with every artifact, by path under `runtime/`.
pub const RUNTIME_SOURCES: &[(&str, &str)] = &[
    ("mod.rs", include_str!("../vm/mod.rs")),
    ("builtins.rs", include_str!("../vm/builtins.rs")),
    ("bytecode.rs", include_str!("../vm/bytecode.rs")),
    ("classes.rs", include_str!("../vm/classes.rs")),
    ("context.rs", include_str!("../vm/context.rs")),
    ("error.rs", include_str!("../vm/error.rs")),
    ("instruction.rs", include_str!("../vm/instruction.rs")),
    ("loader.rs", include_str!("../vm/loader.rs")),
    ("object.rs", include_str!("../vm/object.rs")),
    ("opcode_table.rs", include_str!("../vm/opcode_table.rs")),
    ("ops.rs", include_str!("../vm/ops.rs")),
    ("reflect.rs", include_str!("../vm/reflect.rs")),
    ("runtime.rs", include_str!("../vm/runtime.rs")),
    ("stack.rs", include_str!("../vm/stack.rs")),
    ("types.rs", include_str!("../vm/types.rs")),
    ("value.rs", include_str!("../vm/value.rs")),
    ("vm.rs", include_str!("../vm/vm.rs")),
    ("handlers/mod.rs", include_str!("../vm/handlers/mod.rs")),
    ("handlers/arith.rs", include_str!("../vm/handlers/arith.rs")),
    ("handlers/member.rs", include_str!("../vm/handlers/member.rs")),
    ("handlers/object.rs", include_str!("../vm/handlers/object.rs")),
    ("handlers/shuffle.rs", include_str!("../vm/handlers/shuffle.rs")),
];

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("failed to parse artifact.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize artifact.toml: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PackageError + '_ {
    move |source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn default_max_call_depth() -> usize {
    DEFAULT_MAX_CALL_DEPTH
}

/// Artifact manifest (artifact.toml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub generator: String,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opcode_seed: Option<u64>,
    pub stub_count: usize,
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Method keys by stub offset.
    #[serde(default)]
    pub methods: Vec<String>,
}

impl ArtifactManifest {
    pub fn load(dir: &Path) -> Result<Self, PackageError> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(io_error(&path))?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, dir: &Path) -> Result<(), PackageError> {
        let path = dir.join(MANIFEST_FILE);
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).map_err(io_error(&path))
    }

    /// A loader for the stub resource of the artifact in `dir`.
    pub fn stub_loader(&self, dir: &Path) -> StubLoader {
        StubLoader::from_file(dir.join(&self.resource), opcode_table(self.opcode_seed))
    }

    /// A runtime over the artifact in `dir`, with the builtin classes and
    /// the build's call depth limit.
    pub fn runtime(&self, dir: &Path) -> Runtime {
        Runtime::new(self.stub_loader(dir)).with_max_call_depth(self.max_call_depth)
    }
}

/// Everything one build ships, ready to be written out.
#[derive(Debug, Clone)]
pub struct RuntimePackage {
    pub manifest: ArtifactManifest,
    pub resource: Vec<u8>,
}

impl RuntimePackage {
    /// Encode `table` with the permutation for `seed`.
    pub fn build(
        table: &StubTable,
        methods: &[String],
        config: &VirtualizerConfig,
        seed: Option<u64>,
    ) -> Result<Self, PackageError> {
        let resource = bytecode::encode(table, &opcode_table(seed), config.compression_level)?;
        Ok(Self {
            manifest: ArtifactManifest {
                generator: format!("jvirt {}", env!("CARGO_PKG_VERSION")),
                resource: config.resource_name.clone(),
                opcode_seed: seed,
                stub_count: table.len(),
                max_call_depth: config.max_call_depth,
                methods: methods.to_vec(),
            },
            resource,
        })
    }

    /// Source of `runtime/build_key.rs`.
    pub fn build_key(&self) -> String {
        let seed = match self.manifest.opcode_seed {
            Some(seed) => format!("Some({})", seed),
            None => "None".to_string(),
        };
        format!(
            "// Generated by jvirt. Do not edit.\n\n\
             pub const OPCODE_SEED: Option<u64> = {};\n\
             pub const STUB_RESOURCE: &str = {:?};\n\
             pub const MAX_CALL_DEPTH: usize = {};\n",
            seed, self.manifest.resource, self.manifest.max_call_depth
        )
    }

    pub fn write_to_dir(&self, dir: &Path) -> Result<(), PackageError> {
        let resource_path = dir.join(&self.manifest.resource);
        write_file(&resource_path, &self.resource)?;

        let runtime_dir = dir.join(RUNTIME_DIR);
        for (name, source) in RUNTIME_SOURCES {
            write_file(&runtime_dir.join(name), source.as_bytes())?;
        }
        write_file(&runtime_dir.join(BUILD_KEY_FILE), self.build_key().as_bytes())?;

        self.manifest.save(dir)?;
        info!(
            dir = %dir.display(),
            stubs = self.manifest.stub_count,
            resource_bytes = self.resource.len(),
            "artifact written"
        );
        Ok(())
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), PackageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(path, content).map_err(io_error(path))
}
