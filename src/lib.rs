//! # metadata-verify Library
//!
//! Validates video metadata `<item>` documents against an XML Schema and a
//! RelaxNG grammar, converts accepted records into the namespaced `<video>`
//! document, and searches collections through an XPath query over a
//! snapshot document.

pub mod cli;
pub mod config;
pub mod content_model;
pub mod document;
pub mod error;
pub mod file_discovery;
pub mod grammar;
pub mod import;
pub mod libxml2;
pub mod model;
pub mod output;
pub mod schema_loader;
pub mod search;
pub mod store;
pub mod validator;
pub mod xml_codec;

pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigManager};
pub use document::{DocumentConverter, VIDEO_NAMESPACE, VideoDocument, VideoMedia};
pub use error::{
    ConversionError, DeserializeError, ImportError, SearchError, StoreError, VerifyError,
};
pub use file_discovery::FileDiscovery;
pub use grammar::{
    DocumentValidator, Grammar, GrammarSet, PatternValidator, SchemaValidator, ValidationResult,
};
pub use import::{FileImportResult, ImportReceipt, ImportResults, ImportStatus, Importer};
pub use libxml2::LibXml2Wrapper;
pub use model::{Media, Record};
pub use output::Output;
pub use schema_loader::{SchemaLoader, SchemaSource};
pub use search::{SearchEngine, fold_case};
pub use store::{InMemoryStore, Store};
pub use validator::{
    EngineConfig, FileValidationResult, PerformanceMetrics, ValidationEngine, ValidationResults,
    ValidationStatus,
};
