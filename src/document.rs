//! Internal namespaced document model and the converter into it
//!
//! The internal shape mirrors [`Record`] field for field but is qualified by
//! [`VIDEO_NAMESPACE`]. [`DocumentConverter`] is the only place that applies
//! that qualification.

use crate::error::ConversionError;
use crate::model::{Media, Record};

/// Namespace of every internal document and of the search snapshot
pub const VIDEO_NAMESPACE: &str = "urn:tiktok";

/// Internal representation of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDocument {
    namespace: String,
    pub id: i64,
    pub url: String,
    pub source: String,
    pub unique_id: String,
    pub author: String,
    pub title: String,
    pub thumbnail: String,
    pub duration: i32,
    pub medias: Vec<VideoMedia>,
    pub kind: String,
    pub error: bool,
    pub time_end: i32,
}

/// Internal representation of one media variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMedia {
    pub url: String,
    pub data_size: i64,
    pub quality: String,
    pub extension: String,
    pub kind: String,
    pub duration: Option<i32>,
}

impl VideoDocument {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Rebuild a document read back from XML under `namespace`
    pub(crate) fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Maps between the external record and the internal document
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentConverter;

impl DocumentConverter {
    pub fn new() -> Self {
        Self
    }

    /// Qualify an external record into the internal document shape
    pub fn to_internal(&self, record: &Record) -> VideoDocument {
        VideoDocument {
            namespace: VIDEO_NAMESPACE.to_string(),
            id: record.id,
            url: record.url.clone(),
            source: record.source.clone(),
            unique_id: record.unique_id.clone(),
            author: record.author.clone(),
            title: record.title.clone(),
            thumbnail: record.thumbnail.clone(),
            duration: record.duration,
            medias: record.medias.iter().map(Self::media_to_internal).collect(),
            kind: record.kind.clone(),
            error: record.error,
            time_end: record.time_end,
        }
    }

    /// Map an internal document back to the external record
    ///
    /// # Errors
    ///
    /// `ConversionError::NamespaceMismatch` if the document is not in
    /// [`VIDEO_NAMESPACE`].
    pub fn to_external(&self, document: &VideoDocument) -> Result<Record, ConversionError> {
        if document.namespace != VIDEO_NAMESPACE {
            return Err(ConversionError::NamespaceMismatch {
                expected: VIDEO_NAMESPACE.to_string(),
                found: document.namespace.clone(),
            });
        }

        Ok(Record {
            id: document.id,
            url: document.url.clone(),
            source: document.source.clone(),
            unique_id: document.unique_id.clone(),
            author: document.author.clone(),
            title: document.title.clone(),
            thumbnail: document.thumbnail.clone(),
            duration: document.duration,
            medias: document.medias.iter().map(Self::media_to_external).collect(),
            kind: document.kind.clone(),
            error: document.error,
            time_end: document.time_end,
        })
    }

    fn media_to_internal(media: &Media) -> VideoMedia {
        VideoMedia {
            url: media.url.clone(),
            data_size: media.data_size,
            quality: media.quality.clone(),
            extension: media.extension.clone(),
            kind: media.kind.clone(),
            duration: media.duration,
        }
    }

    fn media_to_external(media: &VideoMedia) -> Media {
        Media {
            url: media.url.clone(),
            data_size: media.data_size,
            quality: media.quality.clone(),
            extension: media.extension.clone(),
            kind: media.kind.clone(),
            duration: media.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record {
            id: 42,
            url: "https://example.com/v/42".to_string(),
            source: "tiktok".to_string(),
            unique_id: "abc42".to_string(),
            author: "Ana".to_string(),
            title: "Sunset Over Paris".to_string(),
            thumbnail: "https://example.com/t/42.jpg".to_string(),
            duration: 31,
            medias: vec![
                Media {
                    url: "https://example.com/m/hd".to_string(),
                    data_size: 1_048_576,
                    quality: "hd".to_string(),
                    extension: "mp4".to_string(),
                    kind: "video".to_string(),
                    duration: Some(31),
                },
                Media {
                    url: "https://example.com/m/audio".to_string(),
                    data_size: 2048,
                    quality: "audio".to_string(),
                    extension: "mp3".to_string(),
                    kind: "audio".to_string(),
                    duration: None,
                },
            ],
            kind: "multiple".to_string(),
            error: false,
            time_end: 120,
        }
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let converter = DocumentConverter::new();
        let record = sample_record();

        let internal = converter.to_internal(&record);
        assert_eq!(internal.namespace(), VIDEO_NAMESPACE);
        assert_eq!(converter.to_external(&internal), Ok(record));
    }

    #[test]
    fn test_round_trip_of_empty_record() {
        let converter = DocumentConverter::new();
        let record = Record::default();

        let internal = converter.to_internal(&record);
        assert!(internal.medias.is_empty());
        assert_eq!(converter.to_external(&internal), Ok(record));
    }

    #[test]
    fn test_media_order_is_preserved() {
        let converter = DocumentConverter::new();
        let internal = converter.to_internal(&sample_record());

        let qualities: Vec<_> = internal.medias.iter().map(|m| m.quality.as_str()).collect();
        assert_eq!(qualities, vec!["hd", "audio"]);
    }

    #[test]
    fn test_foreign_namespace_is_rejected() {
        let converter = DocumentConverter::new();
        let foreign = converter
            .to_internal(&sample_record())
            .with_namespace("urn:other");

        assert_eq!(
            converter.to_external(&foreign),
            Err(ConversionError::NamespaceMismatch {
                expected: VIDEO_NAMESPACE.to_string(),
                found: "urn:other".to_string(),
            })
        );
    }
}
