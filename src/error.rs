use std::path::PathBuf;

use thiserror::Error;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema load error: {path} - {details}")]
    SchemaLoad { path: String, details: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {details}")]
    SchemaParseFailed { details: String },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("{details}")]
    Malformed { details: String },

    #[error("XPath error: {details}")]
    XPath { details: String },

    #[error("Input of {size} bytes exceeds the libxml2 buffer limit")]
    InputTooLarge { size: usize },

    #[error("Value contains an interior NUL byte: {value}")]
    InteriorNul { value: String },
}

/// Failures reported by a [`crate::store::Store`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Item with ID {id} already exists.")]
    Conflict { id: i64 },

    #[error("Item with ID {id} not found.")]
    NotFound { id: i64 },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Mismatch between the internal document and the external record shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Document namespace mismatch: expected '{expected}', found '{found}'")]
    NamespaceMismatch { expected: String, found: String },
}

/// A well-formed document that does not map onto the typed model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeserializeError {
    #[error("{details}")]
    Malformed { details: String },

    #[error("Unexpected root element <{found}>, expected <{expected}>")]
    UnexpectedRoot { expected: String, found: String },

    #[error("Element <{element}> on line {line}: '{value}' is not a valid {expected}")]
    InvalidValue {
        element: String,
        value: String,
        expected: &'static str,
        line: u16,
    },
}

/// Reasons an import submission is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("Document rejected with {} violation(s)", errors.len())]
    Invalid { errors: Vec<String> },

    #[error("deserialization error: {message}")]
    Deserialization { message: String },

    #[error("Item with ID {id} already exists.")]
    Conflict { id: i64 },

    #[error(transparent)]
    Store(StoreError),
}

impl ImportError {
    /// Every message a caller should show for this rejection
    pub fn messages(&self) -> Vec<String> {
        match self {
            ImportError::Invalid { errors } => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { id } => ImportError::Conflict { id },
            other => ImportError::Store(other),
        }
    }
}

/// Internal faults while searching a snapshot
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Snapshot query failed: {0}")]
    Query(#[from] LibXml2Error),

    #[error("Snapshot entry could not be read back: {details}")]
    Snapshot { details: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LibXml2Error> for VerifyError {
    fn from(err: LibXml2Error) -> Self {
        VerifyError::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, VerifyError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;
