//! Canonical XML writer and libxml2-tree reader for records
//!
//! Two shapes share one field set:
//!
//! | field      | external `<item>` | internal `<video xmlns="urn:tiktok">` |
//! |------------|-------------------|---------------------------------------|
//! | unique id  | `unique_id`       | `uniqueId`                            |
//! | end time   | `time_end`        | `timeEnd`                             |
//! | media size | `data_size`       | `dataSize`                            |
//!
//! All other element names are identical. Readers ignore unknown elements and
//! default missing ones, the same leniency the validators' grammars are
//! expected to have already tightened.

use crate::document::{DocumentConverter, VIDEO_NAMESPACE, VideoDocument};
use crate::error::{DeserializeError, LibXml2Error};
use crate::libxml2::{LibXml2Wrapper, XmlElement};
use crate::model::{Media, Record};

pub const RECORD_ELEMENT: &str = "item";
pub const VIDEO_ELEMENT: &str = "video";
pub const SNAPSHOT_ELEMENT: &str = "videos";

struct FieldNames {
    unique_id: &'static str,
    time_end: &'static str,
    data_size: &'static str,
}

const EXTERNAL_NAMES: FieldNames = FieldNames {
    unique_id: "unique_id",
    time_end: "time_end",
    data_size: "data_size",
};

const INTERNAL_NAMES: FieldNames = FieldNames {
    unique_id: "uniqueId",
    time_end: "timeEnd",
    data_size: "dataSize",
};

/// Serialize a record as a standalone external `<item>` document
pub fn write_record(record: &Record) -> String {
    let names = &EXTERNAL_NAMES;
    let mut w = XmlWriter::new();
    w.start(RECORD_ELEMENT, None);
    w.leaf("url", &record.url);
    w.leaf("source", &record.source);
    w.leaf("id", &record.id.to_string());
    w.leaf(names.unique_id, &record.unique_id);
    w.leaf("author", &record.author);
    w.leaf("title", &record.title);
    w.leaf("thumbnail", &record.thumbnail);
    w.leaf("duration", &record.duration.to_string());
    if record.medias.is_empty() {
        w.empty("medias");
    } else {
        w.start("medias", None);
        for media in &record.medias {
            write_media(
                &mut w,
                names,
                &media.url,
                media.data_size,
                &media.quality,
                &media.extension,
                &media.kind,
                media.duration,
            );
        }
        w.end("medias");
    }
    w.leaf("type", &record.kind);
    w.leaf("error", bool_text(record.error));
    w.leaf(names.time_end, &record.time_end.to_string());
    w.end(RECORD_ELEMENT);
    w.finish()
}

/// Serialize one internal document as a standalone namespaced `<video>`
pub fn write_video(document: &VideoDocument) -> String {
    let mut w = XmlWriter::new();
    write_video_element(&mut w, document, Some(document.namespace()));
    w.finish()
}

/// Serialize a collection as the canonical search snapshot
///
/// One `<video>` child per record, in collection order, all inheriting the
/// snapshot root's default namespace.
pub fn write_snapshot(records: &[Record]) -> String {
    let converter = DocumentConverter::new();
    let mut w = XmlWriter::new();
    w.start(SNAPSHOT_ELEMENT, Some(VIDEO_NAMESPACE));
    for record in records {
        write_video_element(&mut w, &converter.to_internal(record), None);
    }
    w.end(SNAPSHOT_ELEMENT);
    w.finish()
}

fn write_video_element(w: &mut XmlWriter, document: &VideoDocument, namespace: Option<&str>) {
    let names = &INTERNAL_NAMES;
    w.start(VIDEO_ELEMENT, namespace);
    w.leaf("url", &document.url);
    w.leaf("source", &document.source);
    w.leaf("id", &document.id.to_string());
    w.leaf(names.unique_id, &document.unique_id);
    w.leaf("author", &document.author);
    w.leaf("title", &document.title);
    w.leaf("thumbnail", &document.thumbnail);
    w.leaf("duration", &document.duration.to_string());
    if document.medias.is_empty() {
        w.empty("medias");
    } else {
        w.start("medias", None);
        for media in &document.medias {
            write_media(
                w,
                names,
                &media.url,
                media.data_size,
                &media.quality,
                &media.extension,
                &media.kind,
                media.duration,
            );
        }
        w.end("medias");
    }
    w.leaf("type", &document.kind);
    w.leaf("error", bool_text(document.error));
    w.leaf(names.time_end, &document.time_end.to_string());
    w.end(VIDEO_ELEMENT);
}

#[allow(clippy::too_many_arguments)]
fn write_media(
    w: &mut XmlWriter,
    names: &FieldNames,
    url: &str,
    data_size: i64,
    quality: &str,
    extension: &str,
    kind: &str,
    duration: Option<i32>,
) {
    w.start("media", None);
    w.leaf("url", url);
    w.leaf(names.data_size, &data_size.to_string());
    w.leaf("quality", quality);
    w.leaf("extension", extension);
    w.leaf("type", kind);
    if let Some(duration) = duration {
        w.leaf("duration", &duration.to_string());
    }
    w.end("media");
}

fn bool_text(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Parse text and read its root as an external record
pub fn parse_record(libxml2: &LibXml2Wrapper, text: &str) -> Result<Record, DeserializeError> {
    let document = libxml2.parse_document(text).map_err(|e| match e {
        LibXml2Error::Malformed { details } => DeserializeError::Malformed { details },
        other => DeserializeError::Malformed {
            details: other.to_string(),
        },
    })?;
    let root = document.root().ok_or_else(|| DeserializeError::Malformed {
        details: "document has no root element".to_string(),
    })?;
    read_record(root)
}

/// Read an unqualified `<item>` element into a record
pub fn read_record(element: XmlElement<'_>) -> Result<Record, DeserializeError> {
    if element.name() != RECORD_ELEMENT || element.namespace().is_some() {
        return Err(DeserializeError::UnexpectedRoot {
            expected: RECORD_ELEMENT.to_string(),
            found: qualified_name(&element),
        });
    }
    read_fields(element, &EXTERNAL_NAMES)
}

/// Read a `<video>` element into an internal document, keeping its namespace
pub fn read_video(element: XmlElement<'_>) -> Result<VideoDocument, DeserializeError> {
    if element.name() != VIDEO_ELEMENT {
        return Err(DeserializeError::UnexpectedRoot {
            expected: VIDEO_ELEMENT.to_string(),
            found: qualified_name(&element),
        });
    }
    let record = read_fields(element, &INTERNAL_NAMES)?;
    Ok(DocumentConverter::new()
        .to_internal(&record)
        .with_namespace(element.namespace().unwrap_or_default()))
}

fn qualified_name(element: &XmlElement<'_>) -> String {
    match element.namespace() {
        Some(ns) => format!("{{{}}}{}", ns, element.name()),
        None => element.name().to_string(),
    }
}

fn read_fields(element: XmlElement<'_>, names: &FieldNames) -> Result<Record, DeserializeError> {
    let mut record = Record::default();

    for child in element.children() {
        let name = child.name();
        match name {
            "url" => record.url = child.text(),
            "source" => record.source = child.text(),
            "id" => record.id = parse_number(&child)?,
            "author" => record.author = child.text(),
            "title" => record.title = child.text(),
            "thumbnail" => record.thumbnail = child.text(),
            "duration" => record.duration = parse_number(&child)?,
            "type" => record.kind = child.text(),
            "error" => record.error = parse_bool(&child)?,
            "medias" => {
                record.medias = child
                    .children()
                    .filter(|media| media.name() == "media")
                    .map(|media| read_media(media, names))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            n if n == names.unique_id => record.unique_id = child.text(),
            n if n == names.time_end => record.time_end = parse_number(&child)?,
            _ => {}
        }
    }

    Ok(record)
}

fn read_media(element: XmlElement<'_>, names: &FieldNames) -> Result<Media, DeserializeError> {
    let mut media = Media::default();

    for child in element.children() {
        match child.name() {
            "url" => media.url = child.text(),
            "quality" => media.quality = child.text(),
            "extension" => media.extension = child.text(),
            "type" => media.kind = child.text(),
            "duration" => media.duration = Some(parse_number(&child)?),
            n if n == names.data_size => media.data_size = parse_number(&child)?,
            _ => {}
        }
    }

    Ok(media)
}

fn parse_number<T: std::str::FromStr>(element: &XmlElement<'_>) -> Result<T, DeserializeError> {
    let raw = element.text();
    raw.trim().parse().map_err(|_| DeserializeError::InvalidValue {
        element: element.name().to_string(),
        value: raw.clone(),
        expected: std::any::type_name::<T>(),
        line: element.line(),
    })
}

fn parse_bool(element: &XmlElement<'_>) -> Result<bool, DeserializeError> {
    let raw = element.text();
    match raw.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(DeserializeError::InvalidValue {
            element: element.name().to_string(),
            value: raw,
            expected: "boolean",
            line: element.line(),
        }),
    }
}

/// Minimal indenting writer; escapes text and replaces characters XML 1.0 cannot carry
struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn start(&mut self, name: &str, namespace: Option<&str>) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        if let Some(namespace) = namespace {
            self.out.push_str(" xmlns=\"");
            escape_into(&mut self.out, namespace, true);
            self.out.push('"');
        }
        self.out.push_str(">\n");
        self.depth += 1;
    }

    fn end(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
    }

    fn empty(&mut self, name: &str) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        self.out.push_str("/>\n");
    }

    fn leaf(&mut self, name: &str, value: &str) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        self.out.push('>');
        escape_into(&mut self.out, value, false);
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
    }

    fn finish(self) -> String {
        self.out
    }
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

pub(crate) fn escape_into(out: &mut String, value: &str, attribute: bool) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            c if !is_xml_char(c) => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            id: 7,
            url: "https://example.com/?a=1&b=2".to_string(),
            source: "tiktok".to_string(),
            unique_id: "7x".to_string(),
            author: "Tom & Jerry <official>".to_string(),
            title: "Line one\r\nline two".to_string(),
            thumbnail: String::new(),
            duration: 12,
            medias: vec![Media {
                url: "https://example.com/m".to_string(),
                data_size: 99,
                quality: "sd".to_string(),
                extension: "mp4".to_string(),
                kind: "video".to_string(),
                duration: Some(12),
            }],
            kind: "video".to_string(),
            error: true,
            time_end: 5,
        }
    }

    #[test]
    fn test_external_record_survives_write_and_read() {
        let libxml2 = LibXml2Wrapper::new();
        let text = write_record(&record());

        assert!(text.contains("<unique_id>7x</unique_id>"));
        assert!(text.contains("&amp;b=2"));
        assert_eq!(parse_record(&libxml2, &text).unwrap(), record());
    }

    #[test]
    fn test_video_document_is_namespaced() {
        let libxml2 = LibXml2Wrapper::new();
        let internal = DocumentConverter::new().to_internal(&record());
        let text = write_video(&internal);

        assert!(text.contains(r#"<video xmlns="urn:tiktok">"#));
        assert!(text.contains("<uniqueId>7x</uniqueId>"));
        assert!(text.contains("<dataSize>99</dataSize>"));

        let doc = libxml2.parse_document(&text).unwrap();
        let read = read_video(doc.root().unwrap()).unwrap();
        assert_eq!(read, internal);
    }

    #[test]
    fn test_snapshot_children_inherit_namespace() {
        let libxml2 = LibXml2Wrapper::new();
        let text = write_snapshot(&[record(), Record::default()]);
        let doc = libxml2.parse_document(&text).unwrap();
        let root = doc.root().unwrap();

        assert_eq!(root.name(), SNAPSHOT_ELEMENT);
        let videos: Vec<_> = root.children().collect();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[1].namespace(), Some(VIDEO_NAMESPACE));
        assert_eq!(read_video(videos[1]).unwrap().namespace(), VIDEO_NAMESPACE);
    }

    #[test]
    fn test_missing_elements_default_and_unknown_are_ignored() {
        let libxml2 = LibXml2Wrapper::new();
        let parsed = parse_record(
            &libxml2,
            "<item><id> 5 </id><title>T</title><extra>ignored</extra></item>",
        )
        .unwrap();

        assert_eq!(parsed.id, 5);
        assert_eq!(parsed.title, "T");
        assert_eq!(parsed.author, "");
        assert!(parsed.medias.is_empty());
    }

    #[test]
    fn test_bad_number_is_a_deserialize_error() {
        let libxml2 = LibXml2Wrapper::new();
        let err = parse_record(&libxml2, "<item>\n<id>seven</id></item>").unwrap_err();

        match err {
            DeserializeError::InvalidValue {
                element, value, line, ..
            } => {
                assert_eq!(element, "id");
                assert_eq!(value, "seven");
                assert_eq!(line, 2);
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_root_is_rejected() {
        let libxml2 = LibXml2Wrapper::new();
        let err = parse_record(&libxml2, r#"<item xmlns="urn:tiktok"/>"#).unwrap_err();
        assert_eq!(
            err,
            DeserializeError::UnexpectedRoot {
                expected: "item".to_string(),
                found: "{urn:tiktok}item".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_xml_characters_are_replaced() {
        let mut out = String::new();
        escape_into(&mut out, "a\u{1}b", false);
        assert_eq!(out, "a\u{FFFD}b");
    }
}
