//! Integration tests for the batch validation workflow
//!
//! Discovery, concurrent validation and result aggregation over a real
//! directory tree, using the built-in grammars.

mod common;

use std::time::Duration;

use common::test_helpers::*;
use metadata_verify::config::{Config, ConfigManager};
use metadata_verify::file_discovery::FileDiscovery;
use metadata_verify::grammar::Grammar;
use metadata_verify::schema_loader::SchemaLoader;
use metadata_verify::validator::{EngineConfig, ValidationEngine, ValidationStatus};

fn engine(grammar: Grammar) -> ValidationEngine {
    ValidationEngine::new(
        SchemaLoader::builtin().unwrap(),
        EngineConfig {
            max_concurrent_validations: 4,
            validation_timeout: Duration::from_secs(30),
            fail_fast: false,
            grammar,
        },
    )
}

#[tokio::test]
async fn test_directory_validation_aggregates_every_file() {
    let temp_dir = create_document_tree().await.unwrap();

    let results = engine(Grammar::Schema)
        .validate_path(temp_dir.path(), &FileDiscovery::new())
        .await
        .unwrap();

    assert_eq!(results.total_files, 4);
    assert_eq!(results.valid_files, 2);
    assert_eq!(results.invalid_files, 2);
    assert_eq!(results.error_files, 0);
    assert_eq!(results.total_errors, 4);
    assert!(results.has_errors());
    assert_eq!(results.success_rate(), 50.0);

    assert_eq!(
        file_names(
            &results
                .file_results
                .iter()
                .map(|r| r.path.clone())
                .collect::<Vec<_>>()
        ),
        vec!["a_valid.xml", "b_invalid.xml", "c_valid.xml", "d_bad.xml"]
    );

    let invalid = &results.file_results[1];
    assert_eq!(invalid.status, ValidationStatus::Invalid { error_count: 3 });
    assert_eq!(invalid.grammar, Grammar::Schema);

    let malformed = &results.file_results[3];
    assert_eq!(malformed.status, ValidationStatus::Invalid { error_count: 1 });
    assert!(malformed.error_details[0].starts_with("well-formedness error: "));
}

#[tokio::test]
async fn test_grammar_selection_changes_the_verdict() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    create_test_file(
        &temp_dir.path().join("upper.xml"),
        &uppercase_extension_xml(),
    )
    .await
    .unwrap();

    let schema = engine(Grammar::Schema)
        .validate_path(temp_dir.path(), &FileDiscovery::new())
        .await
        .unwrap();
    assert!(schema.all_valid());

    let both = engine(Grammar::Both)
        .validate_path(temp_dir.path(), &FileDiscovery::new())
        .await
        .unwrap();
    assert_eq!(both.invalid_files, 1);
    assert!(
        both.file_results[0]
            .error_details
            .iter()
            .all(|e| e.starts_with("pattern: "))
    );
}

#[tokio::test]
async fn test_configured_discovery_and_engine() {
    let temp_dir = create_document_tree().await.unwrap();

    let mut config = Config::default();
    config.files.exclude_patterns = vec!["**/nested/**".to_string()];
    config.validation.threads = Some(2);
    ConfigManager::validate_config(&config).unwrap();

    let discovery = FileDiscovery::from_config(&config.files).unwrap();
    let engine = ValidationEngine::new(
        SchemaLoader::builtin().unwrap(),
        EngineConfig::from_config(&config),
    );

    let results = engine
        .validate_path(temp_dir.path(), &discovery)
        .await
        .unwrap();

    assert_eq!(results.total_files, 2);
    assert_eq!(results.performance_metrics.concurrent_validations, 2);
}

#[tokio::test]
async fn test_empty_directory() {
    let temp_dir = tempfile::TempDir::new().unwrap();

    let results = engine(Grammar::Both)
        .validate_path(temp_dir.path(), &FileDiscovery::new())
        .await
        .unwrap();

    assert_eq!(results.total_files, 0);
    assert!(!results.has_errors());
}

#[tokio::test]
async fn test_many_files_concurrently() {
    let records: Vec<_> = (0..40).map(sample_record).collect();
    let temp_dir = create_collection(&records).await.unwrap();

    let results = engine(Grammar::Both)
        .validate_path(temp_dir.path(), &FileDiscovery::new())
        .await
        .unwrap();

    assert_eq!(results.total_files, 40);
    assert!(results.all_valid());
    assert!(results.performance_metrics.throughput_files_per_second > 0.0);
}
