//! Reference evaluator: naive bottom-up fixpoint per stratum
//!
//! ```text
//! seed base facts and unit clauses
//! for each stratum (dependencies first):
//!     while changed:
//!         for each clause of the stratum:
//!             solutions = solve(body)        // premises in scheduled order
//!             rows = transform(solutions)    // optional |> do ... / let ...
//!             changed |= insert(head(rows))
//! ```
//!
//! The body solver also returns, per solution, the positive facts it matched.
//! The tracer reuses it to find witnesses for derived facts.

use std::cmp::Ordering;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::analysis::{self, schedule_body};
use crate::builtin::{self, FunctionClass};
use crate::context::{Interrupted, QueryContext};
use crate::ir::{Clause, CmpOp, Premise, Program, Term, Transform};
use crate::store::FactSet;
use crate::unify::{self, eval_term, Bindings};
use crate::value::{Fact, Value};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("program rejected by analysis: {0}")]
    Analysis(String),
    #[error("variable {0} is unbound")]
    Unbound(String),
    #[error("unsupported function {0}")]
    UnsupportedFunction(String),
    #[error("{0} is only allowed in a transform")]
    MisplacedAggregate(String),
    #[error("{function} expects {expected} arguments, got {found}")]
    FunctionArity {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("{function}: {reason}")]
    Function { function: String, reason: String },
    #[error("no fixpoint after {0} iterations")]
    NotConverged(usize),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Pluggable evaluation strategy
pub trait Evaluator: Send + Sync {
    /// Compute every fact derivable from `base` under `program`,
    /// base facts included
    fn evaluate(&self, program: &Program, base: &FactSet, ctx: &QueryContext) -> Result<FactSet, EvalError>;
}

/// One way of satisfying a clause body
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub bindings: Bindings,
    /// Facts matched by the positive premises, in body order
    pub support: Vec<Fact>,
}

/// All solutions of `body` over `facts`, extending `initial`
pub fn solve_body(
    body: &[Premise],
    facts: &FactSet,
    initial: Bindings,
    ctx: &QueryContext,
) -> Result<Vec<Solution>, EvalError> {
    let schedule = schedule_body(body);
    if !schedule.stuck.is_empty() {
        return Err(EvalError::Analysis(format!(
            "premise {} can never be evaluated",
            schedule.stuck[0]
        )));
    }
    let mut solver = BodySolver {
        body,
        order: &schedule.order,
        facts,
        ctx,
        support: Vec::with_capacity(body.len()),
        out: Vec::new(),
    };
    solver.step(0, initial)?;
    Ok(solver.out)
}

struct BodySolver<'a> {
    body: &'a [Premise],
    order: &'a [usize],
    facts: &'a FactSet,
    ctx: &'a QueryContext,
    /// Matched facts keyed by premise index
    support: Vec<(usize, Fact)>,
    out: Vec<Solution>,
}

impl BodySolver<'_> {
    fn step(&mut self, pos: usize, bindings: Bindings) -> Result<(), EvalError> {
        let Some(&index) = self.order.get(pos) else {
            let mut support = self.support.clone();
            support.sort_by_key(|(i, _)| *i);
            self.out.push(Solution {
                bindings,
                support: support.into_iter().map(|(_, f)| f).collect(),
            });
            return Ok(());
        };
        self.ctx.check()?;

        let body = self.body;
        match &body[index] {
            Premise::Positive(atom) => {
                let facts = self.facts;
                for tuple in facts.tuples(&atom.predicate) {
                    if let Some(extended) = unify::match_atom(atom, tuple, &bindings)? {
                        self.support
                            .push((index, Fact::new(atom.predicate.clone(), tuple.to_vec())));
                        let result = self.step(pos + 1, extended);
                        self.support.pop();
                        result?;
                    }
                }
                Ok(())
            }
            Premise::Negated(atom) => {
                for tuple in self.facts.tuples(&atom.predicate) {
                    if unify::match_atom(atom, tuple, &bindings)?.is_some() {
                        return Ok(());
                    }
                }
                self.step(pos + 1, bindings)
            }
            Premise::Eq(left, right) => match equate(left, right, bindings)? {
                Some(extended) => self.step(pos + 1, extended),
                None => Ok(()),
            },
            Premise::Neq(left, right) => {
                if eval_term(left, &bindings)? != eval_term(right, &bindings)? {
                    self.step(pos + 1, bindings)
                } else {
                    Ok(())
                }
            }
            Premise::Cmp(op, left, right) => {
                let l = eval_term(left, &bindings)?;
                let r = eval_term(right, &bindings)?;
                if compare(*op, &l, &r) {
                    self.step(pos + 1, bindings)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// `=` binds an unbound variable side, otherwise compares
fn equate(left: &Term, right: &Term, mut bindings: Bindings) -> Result<Option<Bindings>, EvalError> {
    let unbound = |t: &Term, b: &Bindings| match t {
        Term::Var(v) if !t.is_wildcard() && !b.contains_key(v) => Some(v.clone()),
        _ => None,
    };
    if let Some(var) = unbound(left, &bindings) {
        let value = eval_term(right, &bindings)?;
        bindings.insert(var, value);
        return Ok(Some(bindings));
    }
    if let Some(var) = unbound(right, &bindings) {
        let value = eval_term(left, &bindings)?;
        bindings.insert(var, value);
        return Ok(Some(bindings));
    }
    let equal = eval_term(left, &bindings)? == eval_term(right, &bindings)?;
    Ok(equal.then_some(bindings))
}

/// Numbers compare numerically across integer and float; names, strings
/// and bytes compare within their own type. Anything else is false.
fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
        (Value::Name(a), Value::Name(b)) | (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    match ordering {
        Some(o) => match op {
            CmpOp::Lt => o == Ordering::Less,
            CmpOp::Le => o != Ordering::Greater,
            CmpOp::Gt => o == Ordering::Greater,
            CmpOp::Ge => o != Ordering::Less,
        },
        None => false,
    }
}

/// True when the transform groups or aggregates
pub fn is_aggregating(transform: &Transform) -> bool {
    transform.statements.iter().any(|s| match &s.apply {
        Term::Apply { function, .. } => builtin::is_aggregating(function),
        _ => false,
    })
}

/// Rows visible to the head after the transform
pub fn apply_transform(transform: &Transform, solutions: Vec<Bindings>) -> Result<Vec<Bindings>, EvalError> {
    if !is_aggregating(transform) {
        return solutions
            .into_iter()
            .map(|mut row| {
                for stmt in &transform.statements {
                    let value = eval_term(&stmt.apply, &row)?;
                    if let Some(target) = &stmt.target {
                        row.insert(target.clone(), value);
                    }
                }
                Ok(row)
            })
            .collect();
    }

    let mut keys: Vec<String> = Vec::new();
    for stmt in &transform.statements {
        if let Term::Apply { function, args, .. } = &stmt.apply {
            if function == "fn:group_by" {
                keys.extend(args.iter().filter_map(|a| match a {
                    Term::Var(v) => Some(v.clone()),
                    _ => None,
                }));
            }
        }
    }

    // Set semantics: identical body solutions count once
    let distinct: IndexSet<Bindings> = solutions.into_iter().collect();
    let mut groups: IndexMap<Vec<Value>, Vec<Bindings>> = IndexMap::new();
    for row in distinct {
        let key = keys
            .iter()
            .map(|k| row.get(k).cloned().ok_or_else(|| EvalError::Unbound(k.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        groups.entry(key).or_default().push(row);
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, rows) in groups {
        let mut result: Bindings = keys.iter().cloned().zip(key).collect();
        for stmt in &transform.statements {
            let Term::Apply { function, args, .. } = &stmt.apply else {
                continue;
            };
            let value = match builtin::lookup(function).map(|b| b.class) {
                Some(FunctionClass::Grouping) => continue,
                Some(FunctionClass::Aggregate) => aggregate(function, args, &rows)?,
                _ => eval_term(&stmt.apply, &result)?,
            };
            if let Some(target) = &stmt.target {
                result.insert(target.clone(), value);
            }
        }
        out.push(result);
    }
    Ok(out)
}

fn aggregate(function: &str, args: &[Term], rows: &[Bindings]) -> Result<Value, EvalError> {
    let expected = builtin::lookup(function).and_then(|b| b.arity).unwrap_or(0);
    if args.len() != expected {
        return Err(EvalError::FunctionArity {
            function: function.to_string(),
            expected,
            found: args.len(),
        });
    }
    if function == "fn:count" {
        return Ok(Value::Number(rows.len() as i64));
    }
    let values = rows
        .iter()
        .map(|row| eval_term(&args[0], row))
        .collect::<Result<Vec<_>, _>>()?;
    let fail = |reason: String| EvalError::Function {
        function: function.to_string(),
        reason,
    };
    match function {
        "fn:sum" => {
            if let Some(bad) = values.iter().find(|v| v.as_f64().is_none()) {
                return Err(fail(format!("cannot sum a {}", bad.type_label())));
            }
            let mut total: Option<i64> = Some(0);
            for value in &values {
                total = match (total, value) {
                    (Some(t), Value::Number(n)) => {
                        Some(t.checked_add(*n).ok_or_else(|| fail("integer overflow".to_string()))?)
                    }
                    _ => None,
                };
            }
            Ok(match total {
                Some(total) => Value::Number(total),
                None => Value::Float(values.iter().filter_map(Value::as_f64).sum()),
            })
        }
        "fn:max" => values
            .into_iter()
            .max()
            .ok_or_else(|| fail("empty group".to_string())),
        "fn:min" => values
            .into_iter()
            .min()
            .ok_or_else(|| fail("empty group".to_string())),
        "fn:collect" => {
            let distinct: IndexSet<Value> = values.into_iter().collect();
            Ok(Value::List(distinct.into_iter().collect()))
        }
        _ => Err(EvalError::UnsupportedFunction(function.to_string())),
    }
}

/// Head facts produced by one clause over `facts`
pub fn fire_clause(clause: &Clause, facts: &FactSet, ctx: &QueryContext) -> Result<Vec<Fact>, EvalError> {
    let solutions = solve_body(&clause.body, facts, Bindings::new(), ctx)?;
    let rows: Vec<Bindings> = solutions.into_iter().map(|s| s.bindings).collect();
    let rows = match &clause.transform {
        Some(transform) => apply_transform(transform, rows)?,
        None => rows,
    };
    rows.iter()
        .map(|row| {
            let args = clause
                .head
                .args
                .iter()
                .map(|t| eval_term(t, row))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Fact::new(clause.head.predicate.clone(), args))
        })
        .collect()
}

/// Naive bottom-up evaluation, stratum by stratum
#[derive(Clone, Debug)]
pub struct NaiveEvaluator {
    max_iterations: usize,
}

impl Default for NaiveEvaluator {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
        }
    }
}

impl NaiveEvaluator {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl Evaluator for NaiveEvaluator {
    fn evaluate(&self, program: &Program, base: &FactSet, ctx: &QueryContext) -> Result<FactSet, EvalError> {
        let analysis = analysis::analyze(program).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            EvalError::Analysis(messages.join("; "))
        })?;

        let mut facts = base.clone();
        for clause in program.clauses.iter().filter(|c| c.is_unit()) {
            facts.extend(fire_clause(clause, &facts, ctx)?);
        }

        for stratum in &analysis.strata {
            let mut iterations = 0;
            loop {
                if iterations >= self.max_iterations {
                    return Err(EvalError::NotConverged(self.max_iterations));
                }
                iterations += 1;

                let mut derived = Vec::new();
                for &index in &stratum.clauses {
                    for fact in fire_clause(&program.clauses[index], &facts, ctx)? {
                        if !facts.contains(&fact) {
                            derived.push(fact);
                        }
                    }
                }
                let changed = derived.into_iter().fold(false, |acc, f| facts.insert(f) | acc);
                if !changed || !stratum.recursive {
                    break;
                }
            }
            tracing::debug!(
                predicates = ?stratum.predicates,
                iterations,
                "stratum reached fixpoint"
            );
        }
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_mixes_numbers_but_not_types() {
        assert!(compare(CmpOp::Lt, &Value::Number(1), &Value::Float(1.5)));
        assert!(compare(CmpOp::Ge, &Value::Number(2), &Value::Number(2)));
        assert!(!compare(CmpOp::Lt, &Value::Number(1), &Value::text("2")));
        assert!(compare(CmpOp::Lt, &Value::name("/a"), &Value::name("/b")));
    }

    #[test]
    fn equate_binds_either_side() {
        let mut b = Bindings::new();
        b.insert("X".into(), Value::Number(1));
        let bound = equate(&Term::Number(1), &Term::var("Y"), b.clone()).unwrap().unwrap();
        assert_eq!(bound.get("Y"), Some(&Value::Number(1)));
        assert!(equate(&Term::var("X"), &Term::Number(2), b).unwrap().is_none());
    }
}
