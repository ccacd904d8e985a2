//! Unit tests for structural and semantic validation of payloads

use rulesmith::validate::validate_document;
use rulesmith::*;
use serde_json::{json, Value};

fn validate(program: Value) -> Result<Program, Vec<Diagnostic>> {
    validate_with(program, &SchemaRegistry::empty())
}

fn validate_with(program: Value, registry: &SchemaRegistry) -> Result<Program, Vec<Diagnostic>> {
    let doc = json!({"format": "v1", "program": program});
    validate_document(&doc, &CompilerConfig::default(), registry)
}

fn paths(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics.iter().map(|d| d.path.as_str()).collect()
}

fn var(name: &str) -> Value {
    json!({"kind": "var", "value": name})
}

fn atom(pred: &str, args: Vec<Value>) -> Value {
    json!({"pred": pred, "args": args})
}

fn rule(head: Value, body: Vec<Value>) -> Value {
    json!({"head": head, "body": body})
}

fn positive(a: Value) -> Value {
    json!({"kind": "atom", "atom": a})
}

// ============================================================================
// Document shape
// ============================================================================

#[test]
fn test_format_is_pinned() {
    let doc = json!({"format": "v2", "program": {"clauses": [rule(atom("p", vec![]), vec![])]}});
    let errors = validate_document(&doc, &CompilerConfig::default(), &SchemaRegistry::empty()).unwrap_err();
    assert_eq!(paths(&errors), vec!["format"]);
    assert!(errors[0].message.contains("v2"));
}

#[test]
fn test_missing_fields() {
    let doc = json!({"program": {"clauses": [{"body": []}]}});
    let errors = validate_document(&doc, &CompilerConfig::default(), &SchemaRegistry::empty()).unwrap_err();
    assert_eq!(paths(&errors), vec!["format", "program.clauses[0].head"]);
    assert!(errors.iter().all(|d| d.kind == DiagnosticKind::Schema));
}

#[test]
fn test_empty_program_is_rejected() {
    let errors = validate(json!({})).unwrap_err();
    assert_eq!(paths(&errors), vec!["program"]);
}

// ============================================================================
// Field-level violations
// ============================================================================

#[test]
fn test_lowercase_variable_points_at_the_argument() {
    let errors = validate(json!({"clauses": [
        rule(atom("p", vec![var("X")]), vec![positive(atom("q", vec![var("X")]))]),
        rule(atom("r", vec![var("Y")]), vec![positive(atom("s", vec![var("Y"), var("lower")]))])
    ]}))
    .unwrap_err();
    assert_eq!(paths(&errors), vec!["program.clauses[1].body[0].atom.args[1].value"]);
    assert!(errors[0].message.contains("lower"));
}

#[test]
fn test_bad_identifiers() {
    let errors = validate(json!({"clauses": [
        rule(atom("fn:p", vec![]), vec![]),
        rule(atom("let", vec![]), vec![]),
        rule(atom("p", vec![json!({"kind": "name", "value": "alice"})]), vec![]),
        rule(atom("p", vec![json!({"kind": "apply", "function": "plus", "args": []})]), vec![])
    ]}))
    .unwrap_err();
    assert_eq!(
        paths(&errors),
        vec![
            "program.clauses[0].head.pred",
            "program.clauses[1].head.pred",
            "program.clauses[2].head.args[0].value",
            "program.clauses[3].head.args[0].function",
        ]
    );
    assert!(errors[0].message.contains("fn:"));
    assert!(errors[1].message.contains("reserved"));
}

#[test]
fn test_unknown_kinds() {
    let errors = validate(json!({"clauses": [rule(
        atom("p", vec![json!({"kind": "tuple", "args": []})]),
        vec![json!({"kind": "or", "atom": atom("q", vec![])})]
    )]}))
    .unwrap_err();
    assert_eq!(
        paths(&errors),
        vec!["program.clauses[0].head.args[0].kind", "program.clauses[0].body[0].kind"]
    );
}

#[test]
fn test_numbers_accept_both_spellings() {
    let program = validate(json!({"clauses": [rule(atom("p", vec![
        json!({"kind": "number", "number": 7}),
        json!({"kind": "number", "value": "-8"}),
        json!({"kind": "float", "float": "2.5"}),
    ]), vec![])]}))
    .unwrap();
    assert_eq!(
        program.clauses[0].head.args,
        vec![Term::Number(7), Term::Number(-8), Term::Float(2.5)]
    );

    let errors = validate(json!({"clauses": [rule(atom("p", vec![
        json!({"kind": "number", "number": 1.5}),
    ]), vec![])]}))
    .unwrap_err();
    assert_eq!(paths(&errors), vec!["program.clauses[0].head.args[0].number"]);
}

#[test]
fn test_odd_struct_and_bad_arity_hint() {
    let errors = validate(json!({"clauses": [rule(atom("p", vec![
        json!({"kind": "struct", "args": [{"kind": "name", "value": "/k"}]}),
        json!({"kind": "apply", "function": "fn:plus", "args": [{"kind": "number", "number": 1}], "arity": 2}),
    ]), vec![])]}))
    .unwrap_err();
    assert_eq!(
        paths(&errors),
        vec!["program.clauses[0].head.args[0].args", "program.clauses[0].head.args[1].args"]
    );
}

#[test]
fn test_statement_shape() {
    let errors = validate(json!({"clauses": [{
        "head": atom("p", vec![var("N")]),
        "body": [positive(atom("q", vec![var("X")]))],
        "transform": [
            {"kind": "let", "var": "_", "apply": {"kind": "apply", "function": "fn:count", "args": []}},
            {"kind": "do", "apply": var("X")}
        ]
    }]}))
    .unwrap_err();
    assert_eq!(
        paths(&errors),
        vec!["program.clauses[0].transform[0].var", "program.clauses[0].transform[1].apply"]
    );
}

// ============================================================================
// Semantic checks
// ============================================================================

#[test]
fn test_unsafe_head_variable() {
    let errors = validate(json!({"clauses": [
        rule(atom("p", vec![var("X"), var("Y")]), vec![positive(atom("q", vec![var("X")]))])
    ]}))
    .unwrap_err();
    assert_eq!(paths(&errors), vec!["program.clauses[0].head.args[1]"]);
    assert!(errors[0].message.contains('Y'));
}

#[test]
fn test_unsafe_negation() {
    let errors = validate(json!({"clauses": [rule(
        atom("p", vec![var("X")]),
        vec![
            positive(atom("q", vec![var("X")])),
            json!({"kind": "not", "atom": atom("r", vec![var("X"), var("Z")])})
        ]
    )]}))
    .unwrap_err();
    assert_eq!(paths(&errors), vec!["program.clauses[0].body[1]"]);
}

#[test]
fn test_arity_mismatch_against_first_use() {
    let errors = validate(json!({"clauses": [
        rule(atom("p", vec![var("X")]), vec![positive(atom("q", vec![var("X")]))]),
        rule(atom("r", vec![var("X")]), vec![positive(atom("q", vec![var("X"), var("X")]))])
    ]}))
    .unwrap_err();
    assert_eq!(paths(&errors), vec!["program.clauses[1].body[0].atom"]);
    assert!(errors[0].message.contains("first used"));
}

#[test]
fn test_arity_mismatch_against_registry() {
    let registry = SchemaRegistry::load(&parse("Decl q(A, B).").unwrap().decls).unwrap();
    let errors = validate_with(
        json!({"clauses": [rule(atom("p", vec![var("X")]), vec![positive(atom("q", vec![var("X")]))])]}),
        &registry,
    )
    .unwrap_err();
    assert_eq!(paths(&errors), vec!["program.clauses[0].body[0].atom"]);
    assert!(errors[0].message.contains("declared"));
}

#[test]
fn test_redeclaring_a_registered_predicate() {
    let registry = SchemaRegistry::load(&parse("Decl q(A, B).").unwrap().decls).unwrap();
    let same = json!({"decls": [{"atom": atom("q", vec![var("X"), var("Y")])}]});
    assert!(validate_with(same, &registry).is_ok());

    let different = json!({"decls": [{"atom": atom("q", vec![var("X")])}]});
    let errors = validate_with(different, &registry).unwrap_err();
    assert_eq!(paths(&errors), vec!["program.decls[0].atom.pred"]);
}

#[test]
fn test_declaration_checks() {
    let errors = validate(json!({"decls": [
        {"atom": atom("p", vec![var("X"), var("X")])},
        {"atom": atom("p", vec![var("Y")])},
        {"atom": atom("q", vec![var("A")]), "bounds": [[
            {"kind": "name", "value": "/name"},
            {"kind": "number", "number": 1}
        ]]}
    ]}))
    .unwrap_err();
    assert_eq!(
        paths(&errors),
        vec![
            "program.decls[0].atom.args[1]",
            "program.decls[1].atom.pred",
            "program.decls[2].bounds[0]",
            "program.decls[2].bounds[0][1]",
        ]
    );
}

#[test]
fn test_aggregate_outside_transform() {
    let errors = validate(json!({"clauses": [rule(
        atom("p", vec![var("X"), json!({"kind": "apply", "function": "fn:count", "args": []})]),
        vec![positive(atom("q", vec![var("X")]))]
    )]}))
    .unwrap_err();
    assert_eq!(paths(&errors), vec!["program.clauses[0].head.args[1]"]);
}

#[test]
fn test_rebinding_let_target() {
    let errors = validate(json!({"clauses": [{
        "head": atom("p", vec![var("X")]),
        "body": [positive(atom("q", vec![var("X")]))],
        "transform": [{"kind": "let", "var": "X", "apply": {
            "kind": "apply", "function": "fn:plus", "args": [var("X"), {"kind": "number", "number": 1}]
        }}]
    }]}))
    .unwrap_err();
    assert_eq!(paths(&errors), vec!["program.clauses[0].transform[0].var"]);
}

#[test]
fn test_wildcard_outside_atom_patterns() {
    let one = json!({"kind": "number", "number": 1});
    let plus_wildcard = json!({"kind": "apply", "function": "fn:plus", "args": [var("_"), one]});
    let errors = validate(json!({"clauses": [
        rule(atom("p", vec![var("_")]), vec![positive(atom("q", vec![var("X")]))]),
        rule(atom("p", vec![var("_")]), vec![]),
        rule(atom("r", vec![var("X")]), vec![
            positive(atom("q", vec![var("X")])),
            json!({"kind": "neq", "left": var("X"), "right": var("_")})
        ]),
        rule(atom("r", vec![var("X")]), vec![
            positive(atom("q", vec![var("X")])),
            json!({"kind": "cmp", "op": "lt", "left": var("X"), "right": var("_")})
        ]),
        {
            "head": atom("s", vec![var("N")]),
            "body": [positive(atom("q", vec![var("X")]))],
            "transform": [{"kind": "let", "var": "N", "apply": plus_wildcard}]
        },
        rule(atom("t", vec![var("X")]), vec![
            positive(atom("q", vec![var("X")])),
            json!({"kind": "eq", "left": var("X"), "right": var("_")})
        ]),
        rule(atom("u", vec![var("X")]), vec![
            positive(atom("q", vec![var("X")])),
            positive(atom("q", vec![plus_wildcard]))
        ])
    ]}))
    .unwrap_err();
    assert_eq!(
        paths(&errors),
        vec![
            "program.clauses[0].head.args[0]",
            "program.clauses[1].head.args[0]",
            "program.clauses[2].body[1]",
            "program.clauses[3].body[1]",
            "program.clauses[4].transform[0]",
            "program.clauses[5].body[1]",
            "program.clauses[6].body[1]",
        ]
    );
    assert!(errors.iter().all(|d| d.message.contains("_ only matches inside atom arguments")));
}

#[test]
fn test_group_by_cannot_bind_a_variable() {
    let errors = validate(json!({"clauses": [{
        "head": atom("p", vec![var("K")]),
        "body": [positive(atom("q", vec![var("X")]))],
        "transform": [{"kind": "let", "var": "K", "apply": {
            "kind": "apply", "function": "fn:group_by", "args": [var("X")]
        }}]
    }]}))
    .unwrap_err();
    assert_eq!(paths(&errors), vec!["program.clauses[0].transform[0].var"]);
    assert!(errors[0].message.contains("fn:group_by yields no value"));
}

#[test]
fn test_transform_needs_body() {
    let errors = validate(json!({"clauses": [{
        "head": atom("p", vec![var("N")]),
        "transform": [{"kind": "let", "var": "N", "apply": {"kind": "apply", "function": "fn:count", "args": []}}]
    }]}))
    .unwrap_err();
    assert!(paths(&errors).contains(&"program.clauses[0].transform"));
}

#[test]
fn test_negation_cycle_is_unstratifiable() {
    let errors = validate(json!({"clauses": [
        rule(atom("p", vec![var("X")]), vec![
            positive(atom("n", vec![var("X")])),
            json!({"kind": "not", "atom": atom("q", vec![var("X")])})
        ]),
        rule(atom("q", vec![var("X")]), vec![
            positive(atom("n", vec![var("X")])),
            json!({"kind": "not", "atom": atom("p", vec![var("X")])})
        ])
    ]}))
    .unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].path.starts_with("program.clauses["));
    assert!(errors[0].message.contains("unstratifiable"));
}

#[test]
fn test_valid_program_builds_ir() {
    let program = validate(json!({
        "package": "gate",
        "use": ["base"],
        "clauses": [rule(
            atom("reachable", vec![var("X"), var("Y")]),
            vec![positive(atom("edge", vec![var("X"), var("Y")]))]
        )]
    }))
    .unwrap();
    assert_eq!(program.package.as_deref(), Some("gate"));
    assert_eq!(program.uses, vec!["base".to_string()]);
    assert_eq!(
        program.clauses[0].body,
        vec![Premise::Positive(Atom::new("edge", vec![Term::var("X"), Term::var("Y")]))]
    );
}
