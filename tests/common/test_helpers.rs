#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

use metadata_verify::model::{Media, Record};
use metadata_verify::xml_codec::write_record;

/// A fully populated record with one media variant
pub fn sample_record(id: i64) -> Record {
    Record {
        id,
        url: format!("https://www.tiktok.com/@creator/video/{}", id),
        source: "tiktok".to_string(),
        unique_id: format!("v{}", id),
        author: "Creator".to_string(),
        title: format!("Video number {}", id),
        thumbnail: format!("https://cdn.example.com/{}.jpg", id),
        duration: 42,
        medias: vec![Media {
            url: format!("https://cdn.example.com/{}.mp4", id),
            data_size: 1_048_576,
            quality: "hd".to_string(),
            extension: "mp4".to_string(),
            kind: "video".to_string(),
            duration: Some(42),
        }],
        kind: "video".to_string(),
        error: false,
        time_end: 1_700_000_000,
    }
}

pub fn titled_record(id: i64, title: &str, author: &str) -> Record {
    Record {
        title: title.to_string(),
        author: author.to_string(),
        ..sample_record(id)
    }
}

/// `<item>` text for `record` that satisfies both grammars
pub fn item_xml(record: &Record) -> String {
    write_record(record)
}

/// Valid item with `id`, `duration` and `time_end` replaced by non-numbers
pub fn three_datatype_errors_xml() -> String {
    item_xml(&sample_record(1))
        .replace("<id>1</id>", "<id>abc</id>")
        .replace("<duration>42</duration>\n  <medias>", "<duration>x</duration>\n  <medias>")
        .replace("<time_end>1700000000</time_end>", "<time_end>y</time_end>")
}

/// Valid item without `source` and `thumbnail`, plus an undeclared `<bogus/>`
pub fn missing_and_unexpected_xml() -> String {
    let record = sample_record(1);
    let title = format!("<title>{}</title>", record.title);
    item_xml(&record)
        .replace("  <source>tiktok</source>\n", "")
        .replace(&format!("  <thumbnail>{}</thumbnail>\n", record.thumbnail), "")
        .replace(&title, &format!("{}\n  <bogus/>", title))
}

/// Accepted by the XSD, rejected by the RelaxNG extension pattern
pub fn uppercase_extension_xml() -> String {
    item_xml(&sample_record(2)).replace("<extension>mp4</extension>", "<extension>MP4</extension>")
}

/// Accepted by the RelaxNG interleave, rejected by the XSD sequence
pub fn reordered_children_xml() -> String {
    let record = sample_record(3);
    let author = format!("<author>{}</author>", record.author);
    let title = format!("<title>{}</title>", record.title);
    item_xml(&record)
        .replace(&author, "@@AUTHOR@@")
        .replace(&title, &author)
        .replace("@@AUTHOR@@", &title)
}

pub const MALFORMED_XML: &str = "<item><id>1</id>";

/// Directory with valid, invalid and malformed documents plus a non-XML file
///
/// ```text
/// a_valid.xml        id 1, valid
/// b_invalid.xml      three datatype errors
/// nested/c_valid.xml id 2, valid
/// nested/d_bad.xml   not well-formed
/// notes.txt
/// ```
pub async fn create_document_tree() -> std::io::Result<TempDir> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path();

    create_test_file(&root.join("a_valid.xml"), &item_xml(&sample_record(1))).await?;
    create_test_file(&root.join("b_invalid.xml"), &three_datatype_errors_xml()).await?;
    create_test_file(
        &root.join("nested/c_valid.xml"),
        &item_xml(&sample_record(2)),
    )
    .await?;
    create_test_file(&root.join("nested/d_bad.xml"), MALFORMED_XML).await?;
    create_test_file(&root.join("notes.txt"), "not a document").await?;

    Ok(temp_dir)
}

/// Directory of valid documents, one per record, named in collection order
pub async fn create_collection(records: &[Record]) -> std::io::Result<TempDir> {
    let temp_dir = TempDir::new()?;
    for (index, record) in records.iter().enumerate() {
        create_test_file(
            &temp_dir.path().join(format!("{:03}.xml", index)),
            &item_xml(record),
        )
        .await?;
    }
    Ok(temp_dir)
}

/// File system test utilities
pub async fn create_test_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await
}

pub fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .collect()
}
