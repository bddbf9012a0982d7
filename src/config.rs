//! Virtualizer configuration, read from `jvirt.toml`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::vm::{DEFAULT_MAX_CALL_DEPTH, OpcodeTable};
use crate::vm::bytecode::DEFAULT_COMPRESSION_LEVEL;

/// Default name of the stub resource inside the artifact.
pub const DEFAULT_RESOURCE_NAME: &str = "jvirt/stubs.bin";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualizerConfig {
    /// Extra operand stack slots on top of the method's `max_stack`.
    pub stack_margin: usize,
    /// Extra registers on top of the method's `max_locals`.
    pub locals_margin: usize,
    /// Path of the stub resource inside the artifact.
    pub resource_name: String,
    /// Fixed opcode permutation seed; a fresh one is drawn per build when unset.
    pub opcode_seed: Option<u64>,
    pub compression_level: i32,
    pub shuffle_opcodes: bool,
    /// Nested virtualized calls per thread before `StackOverflowError`.
    pub max_call_depth: usize,
}

impl Default for VirtualizerConfig {
    fn default() -> Self {
        Self {
            stack_margin: 16,
            locals_margin: 16,
            resource_name: DEFAULT_RESOURCE_NAME.to_string(),
            opcode_seed: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            shuffle_opcodes: true,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl VirtualizerConfig {
    pub const FILE_NAME: &'static str = "jvirt.toml";

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load `jvirt.toml` from `dir` if present, defaults otherwise.
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(Self::FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let resource = Path::new(&self.resource_name);
        let escapes = resource
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if self.resource_name.is_empty() || escapes {
            return Err(ConfigError::Invalid(format!(
                "resource_name {:?} must be a relative path inside the artifact",
                self.resource_name
            )));
        }
        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(ConfigError::Invalid(format!(
                "compression_level {} is outside {:?}",
                self.compression_level,
                zstd::compression_level_range()
            )));
        }
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The seed this build uses, or `None` when opcodes stay unshuffled.
    /// Drawn seeds are kept to 63 bits so they survive a TOML round trip.
    pub fn resolve_seed(&self) -> Option<u64> {
        if !self.shuffle_opcodes {
            return None;
        }
        Some(
            self.opcode_seed
                .unwrap_or_else(|| rand::random::<u64>() & i64::MAX as u64),
        )
    }
}

/// The opcode table for a resolved seed.
pub fn opcode_table(seed: Option<u64>) -> OpcodeTable {
    seed.map_or_else(OpcodeTable::identity, OpcodeTable::from_seed)
}
