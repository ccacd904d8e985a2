//! Round-trip verification of rendered source
//!
//! Rendered text is parsed back with the real grammar and analyzed again.
//! The parsed program must have the same shape as the IR it was rendered
//! from: same declarations and clauses, same predicates and arities, and the
//! same argument kinds in every position.

use crate::analysis::{self, Analysis};
use crate::diagnostic::Diagnostic;
use crate::ir::*;

/// A program that survived the round trip
#[derive(Clone, Debug)]
pub struct Verified {
    pub program: Program,
    pub analysis: Analysis,
}

/// Parse `source`, analyze it and compare it with `expected`
pub fn verify_round_trip(source: &str, expected: &Program) -> Result<Verified, Vec<Diagnostic>> {
    let parsed = crate::parse(source).map_err(|e| vec![Diagnostic::grammar("source", e.to_string())])?;

    let analysis = analysis::analyze(&parsed).map_err(|errors| {
        errors
            .iter()
            .map(|e| Diagnostic::grammar(e.path(), e.to_string()))
            .collect::<Vec<_>>()
    })?;

    let mismatches = compare_programs(expected, &parsed);
    if !mismatches.is_empty() {
        return Err(mismatches);
    }
    Ok(Verified {
        program: parsed,
        analysis,
    })
}

/// Shape signature of an atom: predicate plus argument kinds
fn atom_shape(atom: &Atom) -> String {
    let kinds: Vec<String> = atom.args.iter().map(term_shape).collect();
    format!("{}({})", atom.predicate, kinds.join(", "))
}

fn term_shape(term: &Term) -> String {
    let nested = |items: &[Term]| items.iter().map(term_shape).collect::<Vec<_>>().join(", ");
    match term {
        Term::Apply { function, args, .. } => format!("{function}({})", nested(args)),
        Term::List(items) | Term::Map(items) | Term::Struct(items) => {
            format!("{}[{}]", term.kind().tag(), nested(items))
        }
        _ => term.kind().tag().to_string(),
    }
}

fn premise_shape(premise: &Premise) -> String {
    match premise {
        Premise::Positive(atom) => atom_shape(atom),
        Premise::Negated(atom) => format!("!{}", atom_shape(atom)),
        Premise::Eq(l, r) => format!("{} = {}", term_shape(l), term_shape(r)),
        Premise::Neq(l, r) => format!("{} != {}", term_shape(l), term_shape(r)),
        Premise::Cmp(op, l, r) => format!("{} {} {}", term_shape(l), op.symbol(), term_shape(r)),
    }
}

fn clause_shape(clause: &Clause) -> Vec<String> {
    let mut shape = vec![atom_shape(&clause.head)];
    shape.extend(clause.body.iter().map(premise_shape));
    if let Some(transform) = &clause.transform {
        shape.extend(transform.statements.iter().map(|s| {
            format!(
                "{} {}",
                if s.target.is_some() { "let" } else { "do" },
                term_shape(&s.apply)
            )
        }));
    }
    shape
}

fn decl_shape(decl: &Decl) -> Vec<String> {
    let mut shape = vec![atom_shape(&decl.atom)];
    shape.extend(decl.descr.iter().map(atom_shape));
    shape.extend(decl.bounds.iter().map(|b| {
        b.iter().map(term_shape).collect::<Vec<_>>().join(", ")
    }));
    shape.extend(decl.inclusion.iter().map(atom_shape));
    shape
}

fn compare_programs(expected: &Program, parsed: &Program) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    if expected.decls.len() != parsed.decls.len() {
        out.push(Diagnostic::grammar(
            "program.decls",
            format!(
                "rendered source parses to {} declaration(s), expected {}",
                parsed.decls.len(),
                expected.decls.len()
            ),
        ));
    }
    if expected.clauses.len() != parsed.clauses.len() {
        out.push(Diagnostic::grammar(
            "program.clauses",
            format!(
                "rendered source parses to {} clause(s), expected {}",
                parsed.clauses.len(),
                expected.clauses.len()
            ),
        ));
    }
    if !out.is_empty() {
        return out;
    }

    for (i, (want, got)) in expected.decls.iter().zip(&parsed.decls).enumerate() {
        let (want, got) = (decl_shape(want), decl_shape(got));
        if want != got {
            out.push(Diagnostic::grammar(
                format!("program.decls[{i}]"),
                format!("round trip changed the declaration: expected {want:?}, parsed {got:?}"),
            ));
        }
    }
    for (i, (want, got)) in expected.clauses.iter().zip(&parsed.clauses).enumerate() {
        let (want, got) = (clause_shape(want), clause_shape(got));
        if want != got {
            out.push(Diagnostic::grammar(
                format!("program.clauses[{i}]"),
                format!("round trip changed the clause: expected {want:?}, parsed {got:?}"),
            ));
        }
    }
    if expected.package != parsed.package || expected.uses != parsed.uses {
        out.push(Diagnostic::grammar(
            "program.package",
            "round trip changed the package header",
        ));
    }
    out
}
