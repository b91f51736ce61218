//! Snapshot search over a record collection
//!
//! Every call serializes the collection into one `<videos xmlns="urn:tiktok">`
//! document, evaluates a fixed XPath expression over it, and reads the
//! matching `<video>` subtrees back into records.
//!
//! The search term never becomes part of the expression text. It is bound
//! as the XPath variable `$term`, together with the case-folding tables
//! `$upper`/`$lower` used by `translate()`. The tables hold every character
//! with a one-to-one lower-case mapping. The term is folded in Rust with the
//! same table, so both sides of `contains()` are lower-cased alike.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{debug, error, info, warn};

use crate::document::{DocumentConverter, VIDEO_NAMESPACE};
use crate::error::SearchError;
use crate::libxml2::{LibXml2Wrapper, XmlElement};
use crate::model::Record;
use crate::store::Store;
use crate::xml_codec::{read_video, write_snapshot};

const NAMESPACE_PREFIX: &str = "t";

const MATCH_EXPRESSION: &str = "/t:videos/t:video[\
    contains(translate(t:title, $upper, $lower), $term) \
    or contains(translate(t:author, $upper, $lower), $term)]";

/// Parallel upper/lower strings for XPath `translate()`, plus the same mapping as a lookup
struct CaseFolding {
    upper: String,
    lower: String,
    map: HashMap<char, char>,
}

impl CaseFolding {
    fn get() -> &'static CaseFolding {
        static FOLDING: OnceLock<CaseFolding> = OnceLock::new();
        FOLDING.get_or_init(CaseFolding::build)
    }

    fn build() -> Self {
        let mut folding = CaseFolding {
            upper: String::new(),
            lower: String::new(),
            map: HashMap::new(),
        };

        // Upper and title case letters alike; only one-to-one mappings fit translate()
        for c in char::MIN..=char::MAX {
            let mut lowered = c.to_lowercase();
            if let (Some(l), None) = (lowered.next(), lowered.next())
                && l != c
            {
                folding.upper.push(c);
                folding.lower.push(l);
                folding.map.insert(c, l);
            }
        }

        folding
    }

    fn fold(&self, text: &str) -> String {
        text.chars()
            .map(|c| self.map.get(&c).copied().unwrap_or(c))
            .collect()
    }
}

/// Lower-case `text` exactly as the search query folds titles and authors
pub fn fold_case(text: &str) -> String {
    CaseFolding::get().fold(text)
}

/// Case-insensitive substring search over titles and authors
#[derive(Debug, Clone, Default)]
pub struct SearchEngine {
    converter: DocumentConverter,
    snapshot_path: Option<PathBuf>,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write each snapshot to `path` for inspection
    pub fn with_snapshot_path(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Records whose title or author contains `term`, in collection order
    ///
    /// An empty term matches every record.
    ///
    /// # Errors
    ///
    /// `SearchError` only for internal faults: the snapshot failing to parse
    /// or evaluate, or a matched entry failing to read back.
    pub fn search(&self, collection: &[Record], term: &str) -> Result<Vec<Record>, SearchError> {
        if collection.is_empty() {
            debug!(term, "Search over empty collection");
            return Ok(Vec::new());
        }
        // A NUL cannot occur in any stored text, and libxml2 strings cannot carry one.
        if term.contains('\0') {
            debug!("Search term contains NUL; nothing can match");
            return Ok(Vec::new());
        }

        let snapshot = write_snapshot(collection);
        debug!(
            records = collection.len(),
            bytes = snapshot.len(),
            "Built search snapshot"
        );
        self.write_artifact(&snapshot);

        let libxml2 = LibXml2Wrapper::new();
        let document = libxml2.parse_document(&snapshot)?;
        let folding = CaseFolding::get();
        let folded_term = folding.fold(term);

        let mut query = document.xpath()?;
        query.register_namespace(NAMESPACE_PREFIX, VIDEO_NAMESPACE)?;
        query.bind_string("upper", &folding.upper)?;
        query.bind_string("lower", &folding.lower)?;
        query.bind_string("term", &folded_term)?;

        let matches = query.select_elements(MATCH_EXPRESSION)?;
        debug!(matched = matches.len(), "Evaluated search expression");

        let root = document.root().ok_or_else(|| SearchError::Snapshot {
            details: "snapshot has no root element".to_string(),
        })?;
        let records = self.read_matches(collection, root, matches)?;
        info!(term, hits = records.len(), "Search completed");
        Ok(records)
    }

    /// Search a point-in-time copy of the store's collection
    pub fn search_store(&self, store: &dyn Store, term: &str) -> Result<Vec<Record>, SearchError> {
        let collection = store.list()?;
        self.search(&collection, term)
    }

    /// The collection entries behind the matched `<video>` elements
    ///
    /// Snapshot children are in collection order, so each match maps back to
    /// its entry by position. Stored values are returned as they are, since
    /// text outside the XML character range does not survive the snapshot.
    fn read_matches(
        &self,
        collection: &[Record],
        root: XmlElement<'_>,
        matches: Vec<XmlElement<'_>>,
    ) -> Result<Vec<Record>, SearchError> {
        let positions: HashMap<XmlElement<'_>, usize> = root
            .children()
            .enumerate()
            .map(|(index, element)| (element, index))
            .collect();
        let mut records = Vec::with_capacity(matches.len());
        let mut failures = Vec::new();

        for element in matches {
            let line = element.line();
            let stored = positions
                .get(&element)
                .and_then(|&index| collection.get(index))
                .ok_or_else(|| "match is not an entry of the snapshot".to_string());
            let converted = stored.and_then(|stored| {
                read_video(element)
                    .map_err(|e| e.to_string())
                    .and_then(|doc| self.converter.to_external(&doc).map_err(|e| e.to_string()))
                    .map(|read| (stored, read))
            });

            match converted {
                Ok((stored, read)) => {
                    if read != *stored {
                        debug!(line, id = stored.id, "Snapshot entry differs from the stored record");
                    }
                    records.push(stored.clone());
                }
                Err(details) => {
                    error!(line, %details, "Matched snapshot entry could not be read back");
                    failures.push(format!("line {}: {}", line, details));
                }
            }
        }

        if failures.is_empty() {
            Ok(records)
        } else {
            Err(SearchError::Snapshot {
                details: failures.join("; "),
            })
        }
    }

    fn write_artifact(&self, snapshot: &str) {
        let Some(path) = &self.snapshot_path else {
            return;
        };

        let written = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| std::fs::write(path, snapshot));

        match written {
            Ok(()) => debug!(path = %path.display(), "Wrote search snapshot"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not write search snapshot"),
        }
    }
}
