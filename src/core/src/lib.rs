//! ocibake core - foundational types
//!
//! Platforms and the platform algebra, content digests, errors, cancellation
//! and configuration shared by the resolver, the assembler and the CLI.

pub mod cancel;
pub mod config;
pub mod digest;
pub mod error;
pub mod platform;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::{BakeConfig, LogLevel, OutputKind};
pub use digest::{Digest, DigestAlgorithm};
pub use error::{BakeError, Result, SelectionFailure};
pub use platform::{FieldFilter, Platform, PlatformFilter, PlatformSelector, PlatformSet};

/// ocibake version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
