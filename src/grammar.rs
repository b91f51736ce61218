//! Document validators over the two independent grammars
//!
//! [`SchemaValidator`] checks a document against the XSD, [`PatternValidator`]
//! against the RelaxNG grammar. Both compile once, are shared read-only, and
//! never fail: every violation becomes one message in a [`ValidationResult`].
//!
//! libxml2 alone under-reports: it abandons a parent at its first content
//! violation. When it rejects a document, each validator asks its
//! [`ContentModel`] to list the violations child by child instead.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content_model::{ContentModel, Diagnostics, Violation};
use crate::error::{LibXml2Error, LibXml2Result};
use crate::libxml2::{
    LibXml2Wrapper, RelaxNgPtr, ValidationOutcome, XmlDocument, XmlMessage, XmlSchemaPtr,
};

/// Which grammar(s) a submission is checked against
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Grammar {
    /// The XML Schema (XSD)
    #[default]
    Schema,
    /// The RelaxNG pattern grammar
    Pattern,
    /// Both grammars; schema violations first, then pattern violations
    Both,
}

impl std::fmt::Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Grammar::Schema => "schema",
            Grammar::Pattern => "pattern",
            Grammar::Both => "both",
        };
        f.write_str(name)
    }
}

/// Outcome of validating one document
///
/// `valid` is true exactly when `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    valid: bool,
    errors: Vec<String>,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// The single-entry result for input that is not well-formed XML
    pub fn malformed(details: impl std::fmt::Display) -> Self {
        Self::from_errors(vec![format!("well-formedness error: {}", details)])
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

/// A compiled grammar that can check documents
pub trait DocumentValidator: Send + Sync {
    /// Compile the grammar from its source text
    fn compile(source: &[u8]) -> LibXml2Result<Self>
    where
        Self: Sized;

    /// Structural and datatype violations of an already parsed document
    fn check(&self, document: &XmlDocument) -> Vec<String>;

    /// Parse `text` and check it; malformed input yields exactly one error
    fn validate(&self, text: &str) -> ValidationResult {
        match LibXml2Wrapper::new().parse_document(text) {
            Ok(document) => ValidationResult::from_errors(self.check(&document)),
            Err(e) => ValidationResult::malformed(e),
        }
    }
}

/// Validator backed by the XML Schema (XSD)
///
/// Messages read `"Error: <text>"` or `"Warning: <text>"`.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: XmlSchemaPtr,
    model: Option<Arc<ContentModel<XmlSchemaPtr>>>,
}

impl DocumentValidator for SchemaValidator {
    fn compile(source: &[u8]) -> LibXml2Result<Self> {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper.parse_schema_from_memory(source)?;
        let model = std::str::from_utf8(source).ok().and_then(|text| {
            ContentModel::from_schema(text, |standalone| {
                wrapper.parse_schema_from_memory(standalone.as_bytes())
            })
        });
        if model.is_none() {
            debug!("Schema has no content model; reporting libxml2 messages as is");
        }

        Ok(Self {
            schema,
            model: model.map(Arc::new),
        })
    }

    fn check(&self, document: &XmlDocument) -> Vec<String> {
        let outcome = LibXml2Wrapper::new().validate_schema(&self.schema, document);
        explain_or(outcome, self.model.as_deref(), self, document, render_schema)
    }
}

impl Diagnostics<XmlSchemaPtr> for SchemaValidator {
    fn violation(&self, violation: &Violation) -> String {
        format!("Error: {}", violation)
    }

    fn isolated(&self, schema: &XmlSchemaPtr, document: &XmlDocument) -> Option<Vec<String>> {
        isolated_messages(
            LibXml2Wrapper::new().validate_schema(schema, document),
            render_schema,
        )
    }
}

fn render_schema(message: &XmlMessage) -> String {
    format!("{}: {}", message.level.label(), message.message)
}

/// Validator backed by the RelaxNG grammar
///
/// Messages read `"pattern: <text>"`.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    grammar: RelaxNgPtr,
    model: Option<Arc<ContentModel<RelaxNgPtr>>>,
}

impl DocumentValidator for PatternValidator {
    fn compile(source: &[u8]) -> LibXml2Result<Self> {
        let wrapper = LibXml2Wrapper::new();
        let grammar = wrapper.parse_relaxng_from_memory(source)?;
        let model = std::str::from_utf8(source).ok().and_then(|text| {
            ContentModel::from_pattern(text, |standalone| {
                wrapper.parse_relaxng_from_memory(standalone.as_bytes())
            })
        });
        if model.is_none() {
            debug!("Pattern grammar has no content model; reporting libxml2 messages as is");
        }

        Ok(Self {
            grammar,
            model: model.map(Arc::new),
        })
    }

    fn check(&self, document: &XmlDocument) -> Vec<String> {
        let outcome = LibXml2Wrapper::new().validate_relaxng(&self.grammar, document);
        let messages = explain_or(outcome, self.model.as_deref(), self, document, render_pattern);
        collapse_cascade(messages)
    }
}

impl Diagnostics<RelaxNgPtr> for PatternValidator {
    fn violation(&self, violation: &Violation) -> String {
        format!("pattern: {}", violation)
    }

    fn isolated(&self, grammar: &RelaxNgPtr, document: &XmlDocument) -> Option<Vec<String>> {
        isolated_messages(
            LibXml2Wrapper::new().validate_relaxng(grammar, document),
            render_pattern,
        )
        .map(collapse_cascade)
    }
}

fn render_pattern(message: &XmlMessage) -> String {
    format!("pattern: {}", message.message)
}

/// Messages libxml2's RelaxNG engine repeats for a violation it already reported
const CASCADE_PREFIXES: [&str; 3] = [
    "pattern: Error validating datatype",
    "pattern: Error validating value",
    "pattern: Invalid sequence in interleave",
];

/// Keep one message per violation; a list made only of follow-ups is kept whole
fn collapse_cascade(messages: Vec<String>) -> Vec<String> {
    let collapsed: Vec<String> = messages
        .iter()
        .filter(|message| {
            !CASCADE_PREFIXES
                .iter()
                .any(|prefix| message.starts_with(prefix))
                && !message.ends_with("failed to validate content")
        })
        .cloned()
        .collect();
    if collapsed.is_empty() {
        messages
    } else {
        collapsed
    }
}

/// libxml2's verdict when it accepts the document, the model's listing otherwise
fn explain_or<G, D: Diagnostics<G>>(
    outcome: LibXml2Result<ValidationOutcome>,
    model: Option<&ContentModel<G>>,
    diagnostics: &D,
    document: &XmlDocument,
    render: impl Fn(&XmlMessage) -> String,
) -> Vec<String> {
    if matches!(outcome, Ok(ValidationOutcome::Valid { .. })) {
        return collect_messages(outcome, render);
    }
    model
        .and_then(|model| model.explain(document, diagnostics))
        .filter(|errors| !errors.is_empty())
        .unwrap_or_else(|| collect_messages(outcome, render))
}

fn isolated_messages(
    outcome: LibXml2Result<ValidationOutcome>,
    render: impl Fn(&XmlMessage) -> String,
) -> Option<Vec<String>> {
    match outcome {
        Ok(ValidationOutcome::Valid { warnings }) => Some(warnings.iter().map(render).collect()),
        Ok(ValidationOutcome::Invalid { messages }) if !messages.is_empty() => {
            Some(messages.iter().map(render).collect())
        }
        _ => None,
    }
}

fn collect_messages(
    outcome: LibXml2Result<ValidationOutcome>,
    render: impl Fn(&XmlMessage) -> String,
) -> Vec<String> {
    match outcome {
        Ok(ValidationOutcome::Valid { warnings }) => warnings.iter().map(render).collect(),
        Ok(ValidationOutcome::Invalid { messages }) if messages.is_empty() => {
            vec!["Error: document does not match the grammar".to_string()]
        }
        Ok(ValidationOutcome::Invalid { messages }) => messages.iter().map(render).collect(),
        Ok(ValidationOutcome::InternalError { code }) => {
            vec![format!("Error: internal validation failure (code {})", code)]
        }
        Err(LibXml2Error::ValidationContextCreationFailed) => {
            vec!["Error: validation context could not be created".to_string()]
        }
        Err(e) => vec![format!("Error: {}", e)],
    }
}

/// Both compiled grammars, shareable across threads
#[derive(Debug, Clone)]
pub struct GrammarSet {
    schema: SchemaValidator,
    pattern: PatternValidator,
}

impl GrammarSet {
    pub fn new(schema: SchemaValidator, pattern: PatternValidator) -> Self {
        Self { schema, pattern }
    }

    pub fn schema(&self) -> &SchemaValidator {
        &self.schema
    }

    pub fn pattern(&self) -> &PatternValidator {
        &self.pattern
    }

    /// Validate text; parses once even when both grammars apply
    pub fn validate(&self, text: &str, grammar: Grammar) -> ValidationResult {
        match LibXml2Wrapper::new().parse_document(text) {
            Ok(document) => self.validate_document(&document, grammar),
            Err(e) => ValidationResult::malformed(e),
        }
    }

    pub fn validate_document(&self, document: &XmlDocument, grammar: Grammar) -> ValidationResult {
        let errors = match grammar {
            Grammar::Schema => self.schema.check(document),
            Grammar::Pattern => self.pattern.check(document),
            Grammar::Both => {
                let mut errors = self.schema.check(document);
                errors.extend(self.pattern.check(document));
                errors
            }
        };
        ValidationResult::from_errors(errors)
    }
}
