//! jvirt - JVM instruction virtualization
//!
//! Translates JVM method bodies into a private, per-build instruction set,
//! packs the result into a compressed stub table and runs it on an embedded
//! stack-machine interpreter.

pub mod compiler;
pub mod config;
pub mod model;
pub mod package;
pub mod vm;

// Re-export commonly used types
pub use compiler::{BootstrapPlan, TranslateError, VirtualizeReport, VirtualizedMethod, Virtualizer};
pub use config::{ConfigError, VirtualizerConfig};
pub use model::{ClassNode, Insn, MethodNode};
pub use package::{ArtifactManifest, PackageError, RuntimePackage};
pub use vm::{Instruction, Runtime, StubLoader, StubTable, Value, VmContext, VmError};
