//! Batch validation engine
//!
//! Async I/O and orchestration around the synchronous grammar checks:
//! - **Async**: file discovery and reads
//! - **Blocking**: libxml2 parsing and validation, offloaded with `spawn_blocking`
//! - **Bounded concurrency**: a `Semaphore` limits in-flight files
//! - **Per-file timeout**: a stuck file becomes an `Error` result, not a hang
//!
//! With `fail_fast`, files not yet started after the first rejection are
//! reported as `Skipped`.

use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigManager};
use crate::error::{Result, VerifyError};
use crate::file_discovery::FileDiscovery;
use crate::grammar::{Grammar, GrammarSet};

/// Engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_concurrent_validations: usize,
    pub validation_timeout: Duration,
    pub fail_fast: bool,
    pub grammar: Grammar,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_validations: num_cpus::get(),
            validation_timeout: Duration::from_secs(30),
            fail_fast: false,
            grammar: Grammar::Schema,
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_validations: ConfigManager::get_thread_count(config),
            validation_timeout: ConfigManager::get_timeout_duration(config),
            fail_fast: config.validation.fail_fast,
            grammar: config.validation.grammar,
        }
    }
}

/// Status of a single file validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    /// Rejected by the grammar(s) or not well-formed
    Invalid { error_count: usize },
    /// The file could not be checked at all
    Error { message: String },
    /// Not checked because an earlier file was rejected under `fail_fast`
    Skipped { reason: String },
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationStatus::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationStatus::Error { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ValidationStatus::Skipped { .. })
    }
}

/// Result of validating a single file
#[derive(Debug, Clone, Serialize)]
pub struct FileValidationResult {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: ValidationStatus,
    pub grammar: Grammar,
    pub duration: Duration,
    /// Every violation, in the order the grammar(s) reported them
    pub error_details: Vec<String>,
}

impl FileValidationResult {
    pub fn valid(path: PathBuf, grammar: Grammar, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Valid,
            grammar,
            duration,
            error_details: Vec::new(),
        }
    }

    pub fn invalid(
        path: PathBuf,
        grammar: Grammar,
        duration: Duration,
        error_details: Vec<String>,
    ) -> Self {
        Self {
            path,
            status: ValidationStatus::Invalid {
                error_count: error_details.len(),
            },
            grammar,
            duration,
            error_details,
        }
    }

    pub fn error(path: PathBuf, grammar: Grammar, error: VerifyError, duration: Duration) -> Self {
        Self {
            path,
            status: ValidationStatus::Error {
                message: error.to_string(),
            },
            grammar,
            duration,
            error_details: vec![error.to_string()],
        }
    }

    pub fn skipped(path: PathBuf, grammar: Grammar, reason: String) -> Self {
        Self {
            path,
            status: ValidationStatus::Skipped {
                reason: reason.clone(),
            },
            grammar,
            duration: Duration::ZERO,
            error_details: vec![reason],
        }
    }
}

/// Timing figures for a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceMetrics {
    pub total_duration: Duration,
    pub discovery_duration: Duration,
    pub validation_duration: Duration,
    pub average_time_per_file: Duration,
    pub throughput_files_per_second: f64,
    pub concurrent_validations: usize,
}

/// Aggregated results of validating multiple files
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResults {
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub error_files: usize,
    pub skipped_files: usize,
    pub total_errors: usize,
    pub file_results: Vec<FileValidationResult>,
    pub performance_metrics: PerformanceMetrics,
}

impl ValidationResults {
    /// Aggregate individual file results into summary
    pub fn aggregate(file_results: Vec<FileValidationResult>) -> Self {
        let mut valid_files = 0;
        let mut invalid_files = 0;
        let mut error_files = 0;
        let mut skipped_files = 0;
        let mut total_errors = 0;
        let mut file_time = Duration::ZERO;

        for result in &file_results {
            match &result.status {
                ValidationStatus::Valid => valid_files += 1,
                ValidationStatus::Invalid { error_count } => {
                    invalid_files += 1;
                    total_errors += error_count;
                }
                ValidationStatus::Error { .. } => error_files += 1,
                ValidationStatus::Skipped { .. } => skipped_files += 1,
            }
            file_time += result.duration;
        }

        let total_files = file_results.len();
        let performance_metrics = PerformanceMetrics {
            total_duration: file_time,
            validation_duration: file_time,
            average_time_per_file: average(file_time, total_files),
            throughput_files_per_second: throughput(total_files, file_time),
            concurrent_validations: 1,
            ..PerformanceMetrics::default()
        };

        Self {
            total_files,
            valid_files,
            invalid_files,
            error_files,
            skipped_files,
            total_errors,
            file_results,
            performance_metrics,
        }
    }

    pub fn with_metrics(
        file_results: Vec<FileValidationResult>,
        performance_metrics: PerformanceMetrics,
    ) -> Self {
        let mut results = Self::aggregate(file_results);
        results.performance_metrics = performance_metrics;
        results
    }

    pub fn all_valid(&self) -> bool {
        self.valid_files == self.total_files && self.total_files > 0
    }

    pub fn has_errors(&self) -> bool {
        self.error_files > 0 || self.invalid_files > 0
    }

    /// Percentage of files that validated
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.valid_files as f64 / self.total_files as f64) * 100.0
        }
    }
}

fn average(total: Duration, count: usize) -> Duration {
    u32::try_from(count)
        .ok()
        .filter(|&n| n > 0)
        .map_or(Duration::ZERO, |n| total / n)
}

fn throughput(count: usize, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Validates many files concurrently against shared compiled grammars
pub struct ValidationEngine {
    grammars: GrammarSet,
    config: EngineConfig,
}

impl ValidationEngine {
    pub fn new(grammars: GrammarSet, config: EngineConfig) -> Self {
        Self { grammars, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grammars(&self) -> &GrammarSet {
        &self.grammars
    }

    /// Discover and validate every matching file under `path`
    pub async fn validate_path(
        &self,
        path: &Path,
        file_discovery: &FileDiscovery,
    ) -> Result<ValidationResults> {
        let workflow_start = Instant::now();

        let discovery_start = Instant::now();
        let files = file_discovery.discover_files(path).await?;
        let discovery_duration = discovery_start.elapsed();
        info!(path = %path.display(), files = files.len(), "Discovered documents");

        let validation_start = Instant::now();
        let results = self.validate_files(files).await?;
        let validation_duration = validation_start.elapsed();

        let total_duration = workflow_start.elapsed();
        let metrics = PerformanceMetrics {
            total_duration,
            discovery_duration,
            validation_duration,
            average_time_per_file: average(validation_duration, results.len()),
            throughput_files_per_second: throughput(results.len(), total_duration),
            concurrent_validations: self.config.max_concurrent_validations,
        };

        let results = ValidationResults::with_metrics(results, metrics);
        info!(
            total = results.total_files,
            valid = results.valid_files,
            invalid = results.invalid_files,
            errors = results.error_files,
            skipped = results.skipped_files,
            "Validation finished"
        );
        Ok(results)
    }

    /// Validate a list of files; results keep the input order
    pub async fn validate_files(&self, files: Vec<PathBuf>) -> Result<Vec<FileValidationResult>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.max_concurrent_validations.max(1),
        ));
        let stop = Arc::new(AtomicBool::new(false));

        let tasks: Vec<_> = files
            .into_iter()
            .map(|file_path| {
                let grammars = self.grammars.clone();
                let semaphore = Arc::clone(&semaphore);
                let stop = Arc::clone(&stop);
                let config = self.config.clone();

                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.map_err(|_| {
                        VerifyError::Concurrency {
                            details: "Failed to acquire validation semaphore".to_string(),
                        }
                    })?;

                    if config.fail_fast && stop.load(Ordering::SeqCst) {
                        return Ok::<_, VerifyError>(FileValidationResult::skipped(
                            file_path,
                            config.grammar,
                            "An earlier document was rejected (fail-fast)".to_string(),
                        ));
                    }

                    let result = match tokio::time::timeout(
                        config.validation_timeout,
                        Self::validate_single_file_internal(
                            file_path.clone(),
                            grammars,
                            config.grammar,
                        ),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(path = %file_path.display(), "Validation timed out");
                            FileValidationResult::error(
                                file_path,
                                config.grammar,
                                VerifyError::Concurrency {
                                    details: format!(
                                        "Validation timeout after {:?}",
                                        config.validation_timeout
                                    ),
                                },
                                config.validation_timeout,
                            )
                        }
                    };

                    if !result.status.is_valid() {
                        stop.store(true, Ordering::SeqCst);
                    }
                    Ok(result)
                })
            })
            .collect();

        let task_results = try_join_all(tasks)
            .await
            .map_err(|e| VerifyError::Concurrency {
                details: format!("Task join error: {}", e),
            })?;

        task_results.into_iter().collect()
    }

    /// Validate one file against the configured grammar(s)
    pub async fn validate_single_file(&self, file_path: &Path) -> FileValidationResult {
        Self::validate_single_file_internal(
            file_path.to_path_buf(),
            self.grammars.clone(),
            self.config.grammar,
        )
        .await
    }

    async fn validate_single_file_internal(
        file_path: PathBuf,
        grammars: GrammarSet,
        grammar: Grammar,
    ) -> FileValidationResult {
        let start_time = Instant::now();

        let text = match tokio::fs::read_to_string(&file_path).await {
            Ok(text) => text,
            Err(e) => {
                return FileValidationResult::error(
                    file_path,
                    grammar,
                    VerifyError::Io(e),
                    start_time.elapsed(),
                );
            }
        };

        // libxml2 work is CPU-bound; keep it off the async workers.
        let outcome =
            tokio::task::spawn_blocking(move || grammars.validate(&text, grammar)).await;
        let duration = start_time.elapsed();

        match outcome {
            Ok(result) if result.is_valid() => {
                debug!(path = %file_path.display(), "Document valid");
                FileValidationResult::valid(file_path, grammar, duration)
            }
            Ok(result) => {
                debug!(
                    path = %file_path.display(),
                    violations = result.errors().len(),
                    "Document rejected"
                );
                FileValidationResult::invalid(file_path, grammar, duration, result.into_errors())
            }
            Err(e) => FileValidationResult::error(
                file_path,
                grammar,
                VerifyError::Concurrency {
                    details: format!("Join error: {}", e),
                },
                duration,
            ),
        }
    }
}
