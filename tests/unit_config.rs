//! Unit tests for configuration loading

use std::io::Write;
use std::sync::Arc;

use rulesmith::*;

#[test]
fn test_empty_document_is_the_default() {
    assert_eq!(CompilerConfig::from_toml_str("").unwrap(), CompilerConfig::default());
}

#[test]
fn test_partial_document_keeps_other_defaults() {
    let config = CompilerConfig::from_toml_str(
        r#"
indent = 4
envelope_fields = ["answer"]
max_trace_depth = 3
"#,
    )
    .unwrap();
    assert_eq!(config.indent, 4);
    assert_eq!(config.envelope_fields, vec!["answer".to_string()]);
    assert_eq!(config.max_trace_depth, 3);
    assert_eq!(config.format_version, "v1");
    assert_eq!(config.max_fixpoint_iterations, 10_000);
}

#[test]
fn test_unknown_field_is_rejected() {
    let err = CompilerConfig::from_toml_str("indentation = 4").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn test_other_format_versions_are_rejected() {
    let err = CompilerConfig::from_toml_str(r#"format_version = "v2""#).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat(ref v) if v == "v2"));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "envelope_fields = [\"answer\"]").unwrap();
    writeln!(file, "max_envelope_depth = 2").unwrap();
    let config = CompilerConfig::from_path(file.path()).unwrap();
    assert_eq!(config.max_envelope_depth, 2);

    // The configured envelope is the only one unwrapped
    let compiler = Compiler::new(config, Arc::new(SchemaRegistry::empty()));
    let payload = r#"{"format":"v1","program":{"clauses":[{"head":{"pred":"p","args":[{"kind":"var","value":"X"}]},"body":[{"kind":"atom","atom":{"pred":"q","args":[{"kind":"var","value":"X"}]}}]}]}}"#;
    let wrapped = serde_json::json!({ "answer": payload }).to_string();
    assert!(compiler.compile(&wrapped).ok);
    let other = serde_json::json!({ "surface_response": payload }).to_string();
    assert!(!compiler.compile(&other).ok);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = CompilerConfig::from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}
