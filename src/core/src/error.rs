use thiserror::Error;

/// One root whose platform selection produced no concrete platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionFailure {
    /// Display form of the requested root variant
    pub root: String,
    /// Display form of the root's supported platform set
    pub supported: String,
    /// Display form of the selector that was applied ("<none>" if absent)
    pub selector: String,
}

impl std::fmt::Display for SelectionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (supported platforms: {}, selector: {})",
            self.root, self.supported, self.selector
        )
    }
}

/// ocibake error types
#[derive(Error, Debug)]
pub enum BakeError {
    /// A variant depends, directly or transitively, on itself
    #[error("Dependency cycle detected: {chain}")]
    Cycle { chain: String },

    /// A dependency edge names a platform its declaring variant does not declare
    #[error(
        "Dependency {dependency} of {component} is declared for platform {platform}, \
         but a dependency can not be declared for more platforms than its declaring component"
    )]
    ScopeMismatch {
        component: String,
        dependency: String,
        platform: String,
    },

    /// A requested variant is not present in the variant catalog
    #[error("Unknown variant: {0}")]
    UnknownVariant(String),

    /// One or more roots select no concrete platform
    #[error("Platform selection failed for {}", format_failures(.0))]
    PlatformSelection(Vec<SelectionFailure>),

    /// Two distinct images claim the same platform and reference
    #[error("Duplicate image claim: {reference} for platform {platform} is provided by both {existing} and {requested}")]
    DuplicateImageClaim {
        reference: String,
        platform: String,
        existing: String,
        requested: String,
    },

    /// Two distinct contents share a digest
    #[error("Hash collision: {digest} already stored with different content ({path})")]
    HashCollision { digest: String, path: String },

    /// A tag is written pointing at a different digest than previously stored
    #[error("Tag conflict: {repository}:{tag} already points to {existing}, refusing to point it to {requested}")]
    TagConflict {
        repository: String,
        tag: String,
        existing: String,
        requested: String,
    },

    /// A link or layout file already exists with different content
    #[error("Link conflict at {path}: existing content differs")]
    LinkConflict { path: String },

    /// A layer file does not match its declared descriptor
    #[error("Layer mismatch for {path}: {message}")]
    LayerMismatch { path: String, message: String },

    /// Invalid platform string
    #[error("Invalid platform: {0}")]
    InvalidPlatform(String),

    /// Invalid platform filter string
    #[error("Invalid platform filter: {0}")]
    InvalidFilter(String),

    /// Invalid platform selector string
    #[error("Invalid platform selector: {0}")]
    InvalidSelector(String),

    /// Invalid digest string
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Invalid image reference
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    /// Invalid variant metadata
    #[error("Invalid variant metadata: {0}")]
    InvalidMetadata(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The caller aborted the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

fn format_failures(failures: &[SelectionFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for BakeError {
    fn from(err: serde_json::Error) -> Self {
        BakeError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for BakeError {
    fn from(err: serde_yaml::Error) -> Self {
        BakeError::SerializationError(err.to_string())
    }
}

/// Result type alias for ocibake operations
pub type Result<T> = std::result::Result<T, BakeError>;
