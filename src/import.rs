//! Validate-then-store entry point for submitted `<item>` documents

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::ImportError;
use crate::grammar::{Grammar, GrammarSet, ValidationResult};
use crate::libxml2::LibXml2Wrapper;
use crate::model::Record;
use crate::store::Store;
use crate::xml_codec::read_record;

/// Acknowledgement of a stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReceipt {
    pub id: i64,
    pub grammar: Grammar,
}

/// What happened to one file of a batch import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImportStatus {
    Imported { id: i64 },
    /// Refused by validation, deserialization or the store
    Rejected { errors: Vec<String> },
    /// Not attempted because an earlier file was rejected under `fail_fast`
    Skipped,
    /// The file could not be read
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileImportResult {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: ImportStatus,
}

/// Per-file outcomes of a batch import, in file order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResults {
    pub total_files: usize,
    pub imported: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub failed: usize,
    pub file_results: Vec<FileImportResult>,
}

impl ImportResults {
    pub fn aggregate(file_results: Vec<FileImportResult>) -> Self {
        let mut results = Self {
            total_files: file_results.len(),
            ..Self::default()
        };
        for result in &file_results {
            match result.status {
                ImportStatus::Imported { .. } => results.imported += 1,
                ImportStatus::Rejected { .. } => results.rejected += 1,
                ImportStatus::Skipped => results.skipped += 1,
                ImportStatus::Failed { .. } => results.failed += 1,
            }
        }
        results.file_results = file_results;
        results
    }

    pub fn has_errors(&self) -> bool {
        self.rejected > 0 || self.failed > 0
    }
}

/// Validates submissions against the selected grammar(s) and appends accepted ones
#[derive(Clone)]
pub struct Importer {
    grammars: GrammarSet,
    store: Arc<dyn Store>,
}

impl Importer {
    pub fn new(grammars: GrammarSet, store: Arc<dyn Store>) -> Self {
        Self { grammars, store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn grammars(&self) -> &GrammarSet {
        &self.grammars
    }

    /// Validate `xml`, read it as a record and append it to the store
    ///
    /// # Errors
    ///
    /// - `ImportError::Invalid` with every violation when validation fails
    /// - `ImportError::Deserialization` when a valid document does not map onto [`Record`]
    /// - `ImportError::Conflict` when the id is already stored
    pub fn import(&self, xml: &str, grammar: Grammar) -> Result<ImportReceipt, ImportError> {
        let record = self.accept(xml, grammar)?;
        let id = record.id;

        self.store.append(record).inspect_err(|e| {
            warn!(id, error = %e, "Import rejected by store");
        })?;

        info!(id, %grammar, "Imported record");
        Ok(ImportReceipt { id, grammar })
    }

    /// Validation and deserialization without touching the store
    pub fn accept(&self, xml: &str, grammar: Grammar) -> Result<Record, ImportError> {
        let libxml2 = LibXml2Wrapper::new();
        let document = match libxml2.parse_document(xml) {
            Ok(document) => document,
            Err(e) => {
                return Err(ImportError::Invalid {
                    errors: ValidationResult::malformed(e).into_errors(),
                });
            }
        };

        let result = self.grammars.validate_document(&document, grammar);
        if !result.is_valid() {
            info!(%grammar, violations = result.errors().len(), "Import rejected by validation");
            return Err(ImportError::Invalid {
                errors: result.into_errors(),
            });
        }

        let root = document.root().ok_or_else(|| ImportError::Deserialization {
            message: "document has no root element".to_string(),
        })?;
        read_record(root).map_err(|e| {
            error!(error = %e, "Valid document could not be deserialized");
            ImportError::Deserialization {
                message: e.to_string(),
            }
        })
    }

    /// Import `files` one after another, so ids conflict in file order
    pub async fn import_files(
        &self,
        files: &[PathBuf],
        grammar: Grammar,
        fail_fast: bool,
    ) -> ImportResults {
        let mut file_results = Vec::with_capacity(files.len());
        let mut stop = false;

        for path in files {
            let status = if stop {
                ImportStatus::Skipped
            } else {
                self.import_file(path, grammar).await
            };
            if fail_fast && !matches!(status, ImportStatus::Imported { .. } | ImportStatus::Skipped)
            {
                stop = true;
            }
            file_results.push(FileImportResult {
                path: path.clone(),
                status,
            });
        }

        let results = ImportResults::aggregate(file_results);
        info!(
            imported = results.imported,
            rejected = results.rejected,
            failed = results.failed,
            "Import finished"
        );
        results
    }

    async fn import_file(&self, path: &Path, grammar: Grammar) -> ImportStatus {
        let xml = match tokio::fs::read_to_string(path).await {
            Ok(xml) => xml,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read document");
                return ImportStatus::Failed {
                    message: e.to_string(),
                };
            }
        };

        let importer = self.clone();
        match tokio::task::spawn_blocking(move || importer.import(&xml, grammar)).await {
            Ok(Ok(receipt)) => ImportStatus::Imported { id: receipt.id },
            Ok(Err(e)) => {
                debug!(path = %path.display(), error = %e, "Document not imported");
                ImportStatus::Rejected {
                    errors: e.messages(),
                }
            }
            Err(e) => ImportStatus::Failed {
                message: format!("Join error: {}", e),
            },
        }
    }
}
