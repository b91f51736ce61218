//! External record model
//!
//! `Record` is the flat, unqualified shape clients submit (the `<item>`
//! document, or its JSON equivalent). Field names on the wire are snake_case.

use serde::{Deserialize, Serialize};

/// One piece of video content metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    pub id: i64,
    pub url: String,
    pub source: String,
    pub unique_id: String,
    pub author: String,
    pub title: String,
    pub thumbnail: String,
    pub duration: i32,
    /// Quality/format variants, in the order the source listed them
    pub medias: Vec<Media>,
    #[serde(rename = "type")]
    pub kind: String,
    pub error: bool,
    pub time_end: i32,
}

/// A single downloadable variant of a record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Media {
    pub url: String,
    pub data_size: i64,
    pub quality: String,
    pub extension: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
}
