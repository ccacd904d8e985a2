//! Matching terms against ground values
//!
//! Shared by queries, the evaluator and the tracer. A match either extends a
//! copy of the incoming bindings or fails without touching them.

use std::collections::BTreeMap;

use crate::builtin;
use crate::eval::EvalError;
use crate::ir::{Atom, Term};
use crate::value::Value;

/// Variable name to value
pub type Bindings = BTreeMap<String, Value>;

/// Evaluate a term under `bindings`
pub fn eval_term(term: &Term, bindings: &Bindings) -> Result<Value, EvalError> {
    match term {
        Term::Var(v) => bindings
            .get(v)
            .cloned()
            .ok_or_else(|| EvalError::Unbound(v.clone())),
        Term::Name(n) => Ok(Value::Name(n.clone())),
        Term::Text(s) => Ok(Value::Text(s.clone())),
        Term::Bytes(b) => Ok(Value::Bytes(b.clone())),
        Term::Number(n) => Ok(Value::Number(*n)),
        Term::Float(x) => Ok(Value::Float(*x)),
        Term::Apply { function, args, .. } => {
            let values = eval_all(args, bindings)?;
            builtin::apply_scalar(function, values)
        }
        Term::List(items) => Ok(Value::List(eval_all(items, bindings)?)),
        Term::Map(flat) => Ok(Value::Map(eval_pairs(flat, bindings)?)),
        Term::Struct(flat) => Ok(Value::Struct(eval_pairs(flat, bindings)?)),
    }
}

fn eval_all(terms: &[Term], bindings: &Bindings) -> Result<Vec<Value>, EvalError> {
    terms.iter().map(|t| eval_term(t, bindings)).collect()
}

fn eval_pairs(flat: &[Term], bindings: &Bindings) -> Result<Vec<(Value, Value)>, EvalError> {
    flat.chunks(2)
        .map(|pair| match pair {
            [k, v] => Ok((eval_term(k, bindings)?, eval_term(v, bindings)?)),
            _ => Err(EvalError::Function {
                function: "map".to_string(),
                reason: "odd number of map entries".to_string(),
            }),
        })
        .collect()
}

/// Function applications met while matching, with the value each must equal
type Deferred<'a> = Vec<(&'a Term, &'a Value)>;

/// Structural match; may leave partial bindings behind on failure.
///
/// Function applications are not evaluated here but pushed onto `deferred`,
/// at any nesting depth, so that sibling patterns can bind what they read.
fn match_term<'a>(
    term: &'a Term,
    value: &'a Value,
    bindings: &mut Bindings,
    deferred: &mut Deferred<'a>,
) -> Result<bool, EvalError> {
    match term {
        Term::Var(_) if term.is_wildcard() => Ok(true),
        Term::Var(v) => match bindings.get(v) {
            Some(bound) => Ok(bound == value),
            None => {
                bindings.insert(v.clone(), value.clone());
                Ok(true)
            }
        },
        Term::List(items) => match value {
            Value::List(values) if values.len() == items.len() => {
                match_all(items.iter().zip(values), bindings, deferred)
            }
            _ => Ok(false),
        },
        Term::Map(flat) => match value {
            Value::Map(pairs) => match_pairs(flat, pairs, bindings, deferred),
            _ => Ok(false),
        },
        Term::Struct(flat) => match value {
            Value::Struct(pairs) => match_pairs(flat, pairs, bindings, deferred),
            _ => Ok(false),
        },
        Term::Apply { .. } => {
            deferred.push((term, value));
            Ok(true)
        }
        _ => Ok(Value::from_ground_term(term).as_ref() == Some(value)),
    }
}

fn match_all<'a>(
    pairs: impl Iterator<Item = (&'a Term, &'a Value)>,
    bindings: &mut Bindings,
    deferred: &mut Deferred<'a>,
) -> Result<bool, EvalError> {
    for (term, value) in pairs {
        if !match_term(term, value, bindings, deferred)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn match_pairs<'a>(
    flat: &'a [Term],
    pairs: &'a [(Value, Value)],
    bindings: &mut Bindings,
    deferred: &mut Deferred<'a>,
) -> Result<bool, EvalError> {
    if flat.len() != pairs.len() * 2 {
        return Ok(false);
    }
    let values = pairs.iter().flat_map(|(k, v)| [k, v]);
    match_all(flat.iter().zip(values), bindings, deferred)
}

/// Match an atom's arguments against a tuple.
///
/// Function applications, top-level or nested in collections, are checked
/// after every pattern has had the chance to bind the variables they read.
pub fn match_atom(atom: &Atom, tuple: &[Value], bindings: &Bindings) -> Result<Option<Bindings>, EvalError> {
    if atom.args.len() != tuple.len() {
        return Ok(None);
    }
    let mut extended = bindings.clone();
    let mut deferred = Vec::new();
    if !match_all(atom.args.iter().zip(tuple), &mut extended, &mut deferred)? {
        return Ok(None);
    }
    for (term, value) in deferred {
        if &eval_term(term, &extended)? != value {
            return Ok(None);
        }
    }
    Ok(Some(extended))
}

/// Like [`match_atom`] but skips function applications, leaving their
/// variables unbound. Used to seed a body search from a derived fact.
pub fn match_head_patterns(atom: &Atom, tuple: &[Value]) -> Result<Option<Bindings>, EvalError> {
    if atom.args.len() != tuple.len() {
        return Ok(None);
    }
    let mut bindings = Bindings::new();
    let mut skipped = Vec::new();
    if match_all(atom.args.iter().zip(tuple), &mut bindings, &mut skipped)? {
        Ok(Some(bindings))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(args: Vec<Term>) -> Atom {
        Atom::new("p", args)
    }

    #[test]
    fn repeated_variable_must_agree() {
        let pattern = atom(vec![Term::var("X"), Term::var("X")]);
        let same = [Value::name("/a"), Value::name("/a")];
        let different = [Value::name("/a"), Value::name("/b")];
        assert!(match_atom(&pattern, &same, &Bindings::new()).unwrap().is_some());
        assert!(match_atom(&pattern, &different, &Bindings::new()).unwrap().is_none());
    }

    #[test]
    fn wildcard_binds_nothing() {
        let pattern = atom(vec![Term::var("_"), Term::var("_")]);
        let tuple = [Value::name("/a"), Value::name("/b")];
        let bound = match_atom(&pattern, &tuple, &Bindings::new()).unwrap().unwrap();
        assert!(bound.is_empty());
    }

    #[test]
    fn application_is_checked_after_patterns() {
        let pattern = atom(vec![
            Term::Apply {
                function: "fn:plus".into(),
                args: vec![Term::var("X"), Term::Number(1)],
                arity: None,
            },
            Term::var("X"),
        ]);
        let tuple = [Value::Number(3), Value::Number(2)];
        let bound = match_atom(&pattern, &tuple, &Bindings::new()).unwrap().unwrap();
        assert_eq!(bound.get("X"), Some(&Value::Number(2)));
    }

    #[test]
    fn nested_application_waits_for_later_siblings() {
        // q([fn:plus(X, 1), X]) against [2, 1]
        let plus = Term::Apply {
            function: "fn:plus".into(),
            args: vec![Term::var("X"), Term::Number(1)],
            arity: None,
        };
        let pattern = atom(vec![Term::List(vec![plus, Term::var("X")])]);
        let matching = [Value::List(vec![Value::Number(2), Value::Number(1)])];
        let bound = match_atom(&pattern, &matching, &Bindings::new()).unwrap().unwrap();
        assert_eq!(bound.get("X"), Some(&Value::Number(1)));

        let mismatched = [Value::List(vec![Value::Number(5), Value::Number(1)])];
        assert!(match_atom(&pattern, &mismatched, &Bindings::new()).unwrap().is_none());
    }

    #[test]
    fn text_does_not_match_name() {
        let pattern = atom(vec![Term::Text("alice".into())]);
        let tuple = [Value::name("/alice")];
        assert!(match_atom(&pattern, &tuple, &Bindings::new()).unwrap().is_none());
    }

    #[test]
    fn nested_list_destructures() {
        let pattern = atom(vec![Term::List(vec![Term::var("H"), Term::var("_")])]);
        let tuple = [Value::List(vec![Value::Number(1), Value::Number(2)])];
        let bound = match_atom(&pattern, &tuple, &Bindings::new()).unwrap().unwrap();
        assert_eq!(bound.get("H"), Some(&Value::Number(1)));
    }
}
