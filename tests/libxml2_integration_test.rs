//! Grammar validation against the built-in XSD and RelaxNG grammars

mod common;

use rayon::prelude::*;

use common::test_helpers::*;
use metadata_verify::grammar::{DocumentValidator, Grammar, GrammarSet};
use metadata_verify::libxml2::LibXml2Wrapper;
use metadata_verify::schema_loader::SchemaLoader;

fn grammars() -> GrammarSet {
    SchemaLoader::builtin().unwrap()
}

#[test]
fn test_valid_document_passes_every_grammar() {
    let grammars = grammars();
    let xml = item_xml(&sample_record(1));

    for grammar in [Grammar::Schema, Grammar::Pattern, Grammar::Both] {
        let result = grammars.validate(&xml, grammar);
        assert!(result.is_valid(), "{}: {:?}", grammar, result.errors());
    }
}

#[test]
fn test_record_without_medias_is_valid() {
    let mut record = sample_record(5);
    record.medias.clear();

    let result = grammars().validate(&item_xml(&record), Grammar::Both);
    assert!(result.is_valid(), "{:?}", result.errors());
}

#[test]
fn test_schema_reports_every_datatype_error() {
    let result = grammars().validate(&three_datatype_errors_xml(), Grammar::Schema);

    assert!(!result.is_valid());
    assert_eq!(result.errors().len(), 3, "{:?}", result.errors());
    assert!(result.errors()[0].contains("'id'"));
    assert!(result.errors()[1].contains("'duration'"));
    assert!(result.errors()[2].contains("'time_end'"));
    assert!(result.errors().iter().all(|e| e.starts_with("Error: ")));
}

#[test]
fn test_pattern_reports_each_datatype_error_once() {
    let result = grammars().validate(&three_datatype_errors_xml(), Grammar::Pattern);

    assert_eq!(result.errors().len(), 3, "{:?}", result.errors());
    assert!(result.errors()[0].contains("abc"));
    assert!(result.errors().iter().all(|e| e.starts_with("pattern: ")));
}

#[test]
fn test_both_reports_three_errors_per_grammar() {
    let result = grammars().validate(&three_datatype_errors_xml(), Grammar::Both);
    assert_eq!(result.errors().len(), 6, "{:?}", result.errors());
}

#[test]
fn test_missing_and_unexpected_children_are_each_reported() {
    let grammars = grammars();
    let xml = missing_and_unexpected_xml();

    let schema = grammars.validate(&xml, Grammar::Schema);
    assert_eq!(
        schema.errors(),
        [
            "Error: Element 'bogus': This element is not expected in 'item'.",
            "Error: Element 'item': Missing child element 'source'.",
            "Error: Element 'item': Missing child element 'thumbnail'.",
        ]
    );

    let pattern = grammars.validate(&xml, Grammar::Pattern);
    assert_eq!(
        pattern.errors(),
        [
            "pattern: Element 'bogus': This element is not expected in 'item'.",
            "pattern: Element 'item': Missing child element 'source'.",
            "pattern: Element 'item': Missing child element 'thumbnail'.",
        ]
    );

    assert_eq!(grammars.validate(&xml, Grammar::Both).errors().len(), 6);
}

#[test]
fn test_datatype_errors_after_a_content_error_are_kept() {
    let xml = three_datatype_errors_xml().replace("<source>tiktok</source>", "");

    for grammar in [Grammar::Schema, Grammar::Pattern] {
        let result = grammars().validate(&xml, grammar);
        assert_eq!(result.errors().len(), 4, "{}: {:?}", grammar, result.errors());
    }
}

#[test]
fn test_malformed_document_yields_exactly_one_error() {
    for grammar in [Grammar::Schema, Grammar::Pattern, Grammar::Both] {
        let result = grammars().validate(MALFORMED_XML, grammar);
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].starts_with("well-formedness error: "));
    }
}

#[test]
fn test_extension_pattern_is_only_in_relaxng() {
    let grammars = grammars();
    let xml = uppercase_extension_xml();

    assert!(grammars.validate(&xml, Grammar::Schema).is_valid());

    let pattern = grammars.validate(&xml, Grammar::Pattern);
    assert!(!pattern.is_valid());
    assert!(pattern.errors().iter().all(|e| e.starts_with("pattern: ")));
}

#[test]
fn test_child_order_is_only_enforced_by_the_schema() {
    let grammars = grammars();
    let xml = reordered_children_xml();

    assert!(grammars.validate(&xml, Grammar::Pattern).is_valid());
    assert!(!grammars.validate(&xml, Grammar::Schema).is_valid());
}

#[test]
fn test_both_concatenates_schema_then_pattern_errors() {
    let grammars = grammars();
    let xml = uppercase_extension_xml().replace("<id>2</id>", "<id>two</id>");

    let schema = grammars.validate(&xml, Grammar::Schema);
    let pattern = grammars.validate(&xml, Grammar::Pattern);
    let both = grammars.validate(&xml, Grammar::Both);

    let mut expected = schema.errors().to_vec();
    expected.extend_from_slice(pattern.errors());
    assert_eq!(both.errors(), expected.as_slice());
    assert!(both.errors()[0].starts_with("Error: "));
}

#[test]
fn test_wrong_root_element_is_rejected() {
    let result = grammars().validate("<video><id>1</id></video>", Grammar::Both);
    assert!(!result.is_valid());
}

#[test]
fn test_individual_validators_match_the_set() {
    let grammars = grammars();
    let xml = three_datatype_errors_xml();

    assert_eq!(
        grammars.schema().validate(&xml),
        grammars.validate(&xml, Grammar::Schema)
    );
    assert_eq!(
        grammars.pattern().validate(&xml),
        grammars.validate(&xml, Grammar::Pattern)
    );
}

#[test]
fn test_shared_grammars_validate_in_parallel() {
    let grammars = grammars();
    let valid = item_xml(&sample_record(1));
    let invalid = three_datatype_errors_xml();

    let counts: Vec<usize> = (0..64)
        .into_par_iter()
        .map(|i| {
            let xml = if i % 2 == 0 { &valid } else { &invalid };
            grammars.validate(xml, Grammar::Both).errors().len()
        })
        .collect();

    let expected_invalid = counts[1];
    assert_eq!(expected_invalid, 6);
    for (i, count) in counts.iter().enumerate() {
        if i % 2 == 0 {
            assert_eq!(*count, 0);
        } else {
            assert_eq!(*count, expected_invalid);
        }
    }
}

#[test]
fn test_documents_parse_and_expose_their_root() {
    let libxml2 = LibXml2Wrapper::new();
    let document = libxml2
        .parse_document(&item_xml(&sample_record(9)))
        .unwrap();

    let root = document.root().unwrap();
    assert_eq!(root.name(), "item");
    assert_eq!(root.namespace(), None);
    assert_eq!(root.child("id").unwrap().text(), "9");
    assert!(libxml2.parse_document(MALFORMED_XML).is_err());
}
