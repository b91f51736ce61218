//! Startup loading of the two grammars
//!
//! Each grammar comes either from a configured file or from the copy built
//! into the binary. Both must read and compile, otherwise startup fails.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::config::SchemasConfig;
use crate::error::{Result, VerifyError};
use crate::grammar::{DocumentValidator, GrammarSet, PatternValidator, SchemaValidator};

/// XML Schema for the `item` document, shipped with the binary
pub const BUILTIN_XSD: &str = include_str!("../schemas/metadata.xsd");

/// RelaxNG grammar for the `item` document, shipped with the binary
pub const BUILTIN_RNG: &str = include_str!("../schemas/metadata.rng");

/// Where a grammar's source text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    Builtin,
    File(PathBuf),
}

impl SchemaSource {
    fn from_config(path: Option<&Path>) -> Self {
        match path {
            Some(path) => SchemaSource::File(path.to_path_buf()),
            None => SchemaSource::Builtin,
        }
    }

    fn describe(&self, builtin_name: &str) -> String {
        match self {
            SchemaSource::Builtin => format!("<builtin {}>", builtin_name),
            SchemaSource::File(path) => path.display().to_string(),
        }
    }

    async fn read(&self, builtin: &'static str) -> std::io::Result<Vec<u8>> {
        match self {
            SchemaSource::Builtin => Ok(builtin.as_bytes().to_vec()),
            SchemaSource::File(path) => tokio::fs::read(path).await,
        }
    }
}

/// Reads and compiles both grammars
pub struct SchemaLoader {
    xsd: SchemaSource,
    rng: SchemaSource,
}

impl SchemaLoader {
    pub fn new(config: &SchemasConfig) -> Self {
        Self {
            xsd: SchemaSource::from_config(config.xsd.as_deref()),
            rng: SchemaSource::from_config(config.rng.as_deref()),
        }
    }

    pub fn xsd_source(&self) -> &SchemaSource {
        &self.xsd
    }

    pub fn rng_source(&self) -> &SchemaSource {
        &self.rng
    }

    /// Load and compile both grammars
    ///
    /// # Errors
    ///
    /// `VerifyError::SchemaLoad` naming the offending source when a file
    /// cannot be read or a grammar does not compile.
    pub async fn load(&self) -> Result<GrammarSet> {
        let start = Instant::now();
        let xsd_name = self.xsd.describe("metadata.xsd");
        let rng_name = self.rng.describe("metadata.rng");

        let xsd = self
            .xsd
            .read(BUILTIN_XSD)
            .await
            .map_err(|e| schema_load(&xsd_name, e))?;
        let rng = self
            .rng
            .read(BUILTIN_RNG)
            .await
            .map_err(|e| schema_load(&rng_name, e))?;

        // Compilation is CPU-bound and takes libxml2's global compile lock.
        let (schema, pattern) = tokio::task::spawn_blocking(move || {
            let schema = SchemaValidator::compile(&xsd).map_err(|e| schema_load(&xsd_name, e));
            let pattern = PatternValidator::compile(&rng).map_err(|e| schema_load(&rng_name, e));
            (schema, pattern)
        })
        .await
        .map_err(|e| VerifyError::Concurrency {
            details: format!("Grammar compilation task failed: {}", e),
        })?;

        let grammars = GrammarSet::new(schema?, pattern?);
        info!(
            xsd = %self.xsd.describe("metadata.xsd"),
            rng = %self.rng.describe("metadata.rng"),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Grammars compiled"
        );
        Ok(grammars)
    }

    /// Compile the built-in grammars without touching the filesystem
    pub fn builtin() -> Result<GrammarSet> {
        debug!("Compiling built-in grammars");
        let schema = SchemaValidator::compile(BUILTIN_XSD.as_bytes())
            .map_err(|e| schema_load("<builtin metadata.xsd>", e))?;
        let pattern = PatternValidator::compile(BUILTIN_RNG.as_bytes())
            .map_err(|e| schema_load("<builtin metadata.rng>", e))?;
        Ok(GrammarSet::new(schema, pattern))
    }
}

fn schema_load(path: &str, err: impl std::fmt::Display) -> VerifyError {
    VerifyError::SchemaLoad {
        path: path.to_string(),
        details: err.to_string(),
    }
}
