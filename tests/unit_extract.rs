//! Unit tests for payload extraction

use rulesmith::extract::{find_object, strip_fence, Extractor};
use rulesmith::{extract_payload, ExtractError};
use serde_json::{json, Value};

fn doc() -> Value {
    json!({"format": "v1", "program": {"clauses": [
        {"head": {"pred": "p", "args": [{"kind": "name", "value": "/a"}]}}
    ]}})
}

fn decoded(text: &str) -> Value {
    Extractor::default().extract_document(text).unwrap()
}

#[test]
fn test_plain_document() {
    assert_eq!(decoded(&doc().to_string()), doc());
}

#[test]
fn test_prose_around_document() {
    let text = format!("Sure! Here is the program:\n{}\nLet me know if it fails.", doc());
    assert_eq!(decoded(&text), doc());
}

#[test]
fn test_fenced_document() {
    let text = format!("```json\n{}\n```", serde_json::to_string_pretty(&doc()).unwrap());
    assert_eq!(decoded(&text), doc());
}

#[test]
fn test_envelope_with_fenced_string() {
    let inner = format!("```json\n{}\n```", doc());
    let text = json!({ "surface_response": inner }).to_string();
    assert_eq!(decoded(&text), doc());
}

#[test]
fn test_envelope_with_nested_object() {
    let text = json!({ "response": { "content": doc() } }).to_string();
    assert_eq!(decoded(&text), doc());
}

#[test]
fn test_doubly_encoded_document() {
    let once = doc().to_string();
    let twice = Value::String(once).to_string();
    assert_eq!(decoded(&twice), doc());
}

#[test]
fn test_unknown_envelope_is_returned_as_is() {
    let text = r#"{"answer": 42}"#;
    assert_eq!(decoded(text), json!({"answer": 42}));
}

#[test]
fn test_custom_envelope_fields() {
    let extractor = Extractor::new(vec!["result".to_string()], 2);
    let text = json!({ "result": doc().to_string() }).to_string();
    assert_eq!(extractor.extract_document(&text).unwrap(), doc());
    // The default field list does not know about `result`
    assert_ne!(decoded(&text), doc());
}

#[test]
fn test_malformed_object() {
    let err = extract_payload(r#"{"format": "v1", "program": }"#).unwrap_err();
    assert!(matches!(err, ExtractError::Malformed(_)));
}

#[test]
fn test_braces_in_prose_are_skipped() {
    let text = format!("I used the {{name}} placeholder style. Here it is:\n{}", doc());
    assert_eq!(decoded(&text), doc());

    let fenced = format!("Keys look like {{key}}.\n```json\n{}\n```", doc());
    assert_eq!(decoded(&fenced), doc());
}

#[test]
fn test_first_decode_error_is_reported() {
    let err = extract_payload("see {name} and {\"format\": }").unwrap_err();
    match err {
        ExtractError::Malformed(message) => assert!(message.contains("key must be a string"), "{message}"),
        other => panic!("expected a malformed payload, got {other:?}"),
    }
}

#[test]
fn test_extract_returns_compact_json() {
    let text = format!("noise {} noise", serde_json::to_string_pretty(&doc()).unwrap());
    let extracted = extract_payload(&text).unwrap();
    assert_eq!(serde_json::from_str::<Value>(&extracted).unwrap(), doc());
    assert!(!extracted.contains('\n'));
}

#[test]
fn test_helpers() {
    assert_eq!(find_object("a {b} c"), Some("{b}"));
    assert_eq!(find_object("no braces"), None);
    assert_eq!(strip_fence("```\nx\n```"), Some("x\n"));
}
