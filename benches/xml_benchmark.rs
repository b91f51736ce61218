use divan::Bencher;
use metadata_verify::grammar::{DocumentValidator, Grammar, PatternValidator, SchemaValidator};
use metadata_verify::model::{Media, Record};
use metadata_verify::schema_loader::{BUILTIN_RNG, BUILTIN_XSD, SchemaLoader};
use metadata_verify::search::SearchEngine;
use metadata_verify::xml_codec::{write_record, write_snapshot};

fn main() {
    divan::main();
}

fn record(id: i64) -> Record {
    Record {
        id,
        url: format!("https://www.tiktok.com/@creator/video/{}", id),
        source: "tiktok".to_string(),
        unique_id: format!("v{}", id),
        author: format!("Creator {}", id % 17),
        title: format!("Clip {} from Paris", id),
        medias: vec![Media {
            url: format!("https://cdn.example.com/{}.mp4", id),
            data_size: 4096,
            quality: "hd".to_string(),
            extension: "mp4".to_string(),
            kind: "video".to_string(),
            duration: None,
        }],
        kind: "video".to_string(),
        ..Record::default()
    }
}

fn collection(size: i64) -> Vec<Record> {
    (0..size).map(record).collect()
}

#[divan::bench]
fn compile_schema(bencher: Bencher) {
    bencher.bench_local(|| SchemaValidator::compile(BUILTIN_XSD.as_bytes()).expect("XSD compiles"));
}

#[divan::bench]
fn compile_pattern(bencher: Bencher) {
    bencher
        .bench_local(|| PatternValidator::compile(BUILTIN_RNG.as_bytes()).expect("RNG compiles"));
}

#[divan::bench(args = [Grammar::Schema, Grammar::Pattern, Grammar::Both])]
fn validate_valid_item(bencher: Bencher, grammar: Grammar) {
    let grammars = SchemaLoader::builtin().expect("built-in grammars compile");
    let xml = write_record(&record(1));

    bencher.bench_local(move || grammars.validate(&xml, grammar));
}

#[divan::bench]
fn validate_invalid_item(bencher: Bencher) {
    let grammars = SchemaLoader::builtin().expect("built-in grammars compile");
    let xml = write_record(&record(1))
        .replace("<id>1</id>", "<id>one</id>")
        .replace("<extension>mp4</extension>", "<extension>MP4</extension>");

    bencher.bench_local(move || grammars.validate(&xml, Grammar::Both));
}

#[divan::bench(args = [10, 100, 1000])]
fn build_snapshot(bencher: Bencher, size: i64) {
    let records = collection(size);
    bencher.bench_local(move || write_snapshot(&records));
}

#[divan::bench(args = [10, 100, 1000])]
fn search_collection(bencher: Bencher, size: i64) {
    let records = collection(size);
    let engine = SearchEngine::new();

    bencher.bench_local(move || engine.search(&records, "creator 3").expect("search succeeds"));
}
