//! Property tests for the render -> parse round trip
//!
//! Rendering must produce source the grammar accepts, and parsing it back
//! must give the same program minus the arity hints that only payloads carry.


use generators::*;
use proptest::prelude::*;
use rulesmith::render::{render_atom, render_term};
use rulesmith::{parse, parse_query, render_program, CompileOutput, Compiler, CompilerConfig, SchemaRegistry};
use std::sync::Arc;

fn compiler() -> Compiler {
    Compiler::new(CompilerConfig::default(), Arc::new(SchemaRegistry::empty()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn rendered_programs_parse_back(program in arb_program()) {
        let source = render_program(&program);
        let parsed = parse(&source)
            .map_err(|e| TestCaseError::fail(format!("{e}\nsource:\n{source}")))?;
        prop_assert_eq!(parsed, program.without_hints(), "source:\n{}", source);
    }

    #[test]
    fn rendered_atoms_parse_as_queries(atom in arb_atom()) {
        let text = render_atom(&atom);
        let parsed = parse_query(&text)
            .map_err(|e| TestCaseError::fail(format!("{e}\nquery: {text}")))?;
        prop_assert_eq!(render_atom(&parsed), text);
    }

    #[test]
    fn rendering_is_a_fixpoint(program in arb_program()) {
        let once = render_program(&program);
        let reparsed = parse(&once).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(render_program(&reparsed), once);
    }

    #[test]
    fn term_text_survives_inside_a_fact(term in arb_term()) {
        let source = format!("p({}).", render_term(&term));
        let parsed = parse(&source).map_err(|e| TestCaseError::fail(format!("{e}\n{source}")))?;
        prop_assert_eq!(render_term(&parsed.clauses[0].head.args[0]), render_term(&term));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn safe_programs_compile_and_round_trip(program in arb_safe_program()) {
        let output: CompileOutput = compiler().compile_document(&document(&program));
        prop_assert!(output.ok, "diagnostics: {:?}", output.diagnostics);
        prop_assert_eq!(output.rendered_clauses.len(), program.clauses.len());
        prop_assert_eq!(parse(&output.source).ok(), Some(program.clone()));
        prop_assert_eq!(output.into_result().ok(), Some(program));
    }
}
