//! Unit tests for the reference evaluator and session queries

use std::sync::Arc;
use std::time::{Duration, Instant};

use rulesmith::*;
use serde_json::json;

fn session(source: &str) -> Session {
    Session::from_source(source, Arc::new(SchemaRegistry::empty()), CompilerConfig::default()).unwrap()
}

fn name(n: &str) -> TypedValue {
    TypedValue::constant(n)
}

fn ctx() -> QueryContext {
    QueryContext::unbounded()
}

fn single(session: &Session, query: &str, var: &str) -> Vec<Value> {
    let mut values: Vec<Value> = session
        .query(query, &ctx())
        .unwrap()
        .into_iter()
        .map(|b| b[var].clone())
        .collect();
    values.sort();
    values
}

const REACHABILITY: &str = "
reachable(X, Y) :- edge(X, Y).
reachable(X, Z) :- edge(X, Y), reachable(Y, Z).
unreachable(X, Y) :- node(X), node(Y), !reachable(X, Y).
";

fn graph() -> Session {
    let s = session(REACHABILITY);
    for (a, b) in [("/a", "/b"), ("/b", "/c"), ("/c", "/d")] {
        s.insert("edge", vec![name(a), name(b)]).unwrap();
    }
    for n in ["/a", "/b", "/c", "/d"] {
        s.insert("node", vec![name(n)]).unwrap();
    }
    s
}

// ============================================================================
// Recursion and negation
// ============================================================================

#[test]
fn test_transitive_closure() {
    let s = graph();
    assert_eq!(
        single(&s, "reachable(/a, Z)", "Z"),
        vec![Value::name("/b"), Value::name("/c"), Value::name("/d")]
    );
    assert_eq!(s.query("reachable(X, Y)", &ctx()).unwrap().len(), 6);
}

#[test]
fn test_stratified_negation() {
    let s = graph();
    // 16 ordered pairs minus 6 reachable ones
    assert_eq!(s.query("unreachable(X, Y)", &ctx()).unwrap().len(), 10);
    assert_eq!(single(&s, "unreachable(/d, Y)", "Y").len(), 4);
    assert!(s.query("unreachable(/a, /d)", &ctx()).unwrap().is_empty());
}

#[test]
fn test_results_follow_the_store() {
    let s = graph();
    assert_eq!(single(&s, "reachable(/d, Z)", "Z"), vec![]);
    s.insert("edge", vec![name("/d"), name("/a")]).unwrap();
    assert_eq!(single(&s, "reachable(/d, Z)", "Z").len(), 4);
    s.clear();
    assert!(s.query("reachable(X, Y)", &ctx()).unwrap().is_empty());
}

#[test]
fn test_unit_clauses_seed_the_fixpoint() {
    let s = session(
        "edge(/x, /y).\n\
         edge(/y, /z).\n\
         reachable(X, Y) :- edge(X, Y).\n\
         reachable(X, Z) :- edge(X, Y), reachable(Y, Z).",
    );
    assert_eq!(single(&s, "reachable(/x, Z)", "Z").len(), 2);
    // Unit clause facts are program facts, not store facts
    assert!(s.store().is_empty());
}

// ============================================================================
// Builtins and comparisons
// ============================================================================

#[test]
fn test_arithmetic_and_comparison() {
    let s = session(
        "double(X, Y) :- num(X), Y = fn:mult(X, 2).\n\
         big(X) :- num(X), X > 5.\n\
         next(X, Y) :- num(X) |> let Y = fn:plus(X, 1).",
    );
    s.insert("num", vec![TypedValue::Number(3)]).unwrap();
    s.insert("num", vec![TypedValue::Number(7)]).unwrap();
    s.insert("num", vec![TypedValue::Float(7.5)]).unwrap();

    assert_eq!(
        single(&s, "double(3, Y)", "Y"),
        vec![Value::Number(6)]
    );
    assert_eq!(
        single(&s, "big(X)", "X"),
        vec![Value::Number(7), Value::Float(7.5)]
    );
    assert_eq!(single(&s, "next(7.5, Y)", "Y"), vec![Value::Float(8.5)]);
}

#[test]
fn test_comparisons_across_types_are_false() {
    let s = session("small(X) :- item(X), X < 10.");
    s.insert("item", vec![TypedValue::Number(1)]).unwrap();
    s.insert("item", vec![TypedValue::text("1")]).unwrap();
    assert_eq!(single(&s, "small(X)", "X"), vec![Value::Number(1)]);
}

#[test]
fn test_division_by_zero_is_an_error() {
    let s = session("ratio(X, R) :- pair(X, Y), R = fn:div(X, Y).");
    s.insert("pair", vec![TypedValue::Number(1), TypedValue::Number(0)]).unwrap();
    let err = s.query("ratio(X, R)", &ctx()).unwrap_err();
    assert!(matches!(err, SessionError::Eval(EvalError::Function { .. })));
}

#[test]
fn test_inequality_and_equality_filters() {
    let s = session("pair(X, Y) :- node(X), node(Y), X != Y.\nsame(X, Y) :- node(X), node(Y), X = Y.");
    for n in ["/a", "/b", "/c"] {
        s.insert("node", vec![name(n)]).unwrap();
    }
    assert_eq!(s.query("pair(X, Y)", &ctx()).unwrap().len(), 6);
    assert_eq!(s.query("same(X, Y)", &ctx()).unwrap().len(), 3);
}

#[test]
fn test_computed_list_element_waits_for_its_inputs() {
    let s = session("r(X) :- q([fn:plus(X, 1), X]).");
    s.insert_loose("q", &[json!([2, 1])]).unwrap();
    s.insert_loose("q", &[json!([5, 1])]).unwrap();
    assert_eq!(single(&s, "r(X)", "X"), vec![Value::Number(1)]);
}

// ============================================================================
// Aggregation
// ============================================================================

const PAYROLL: &str = "
dept_size(D, N) :- works_in(E, D) |> do fn:group_by(D), let N = fn:count().
payroll(D, T) :- works_in(E, D), salary(E, S) |> do fn:group_by(D), let T = fn:sum(S).
top(D, M) :- works_in(E, D), salary(E, S) |> do fn:group_by(D), let M = fn:max(S).
staff(D, L) :- works_in(E, D) |> do fn:group_by(D), let L = fn:collect(E).
headcount(N) :- works_in(E, D) |> let N = fn:count().
";

fn payroll() -> Session {
    let s = session(PAYROLL);
    for (e, d, pay) in [("/ann", "/eng", 100), ("/bo", "/eng", 50), ("/cy", "/ops", 70)] {
        s.insert("works_in", vec![name(e), name(d)]).unwrap();
        s.insert("salary", vec![name(e), TypedValue::Number(pay)]).unwrap();
    }
    s
}

#[test]
fn test_group_by_count_and_sum() {
    let s = payroll();
    assert_eq!(single(&s, "dept_size(/eng, N)", "N"), vec![Value::Number(2)]);
    assert_eq!(single(&s, "dept_size(/ops, N)", "N"), vec![Value::Number(1)]);
    assert_eq!(single(&s, "payroll(/eng, T)", "T"), vec![Value::Number(150)]);
    assert_eq!(single(&s, "top(/eng, M)", "M"), vec![Value::Number(100)]);
    assert_eq!(single(&s, "headcount(N)", "N"), vec![Value::Number(3)]);
}

#[test]
fn test_collect_builds_a_list() {
    let s = payroll();
    let lists = single(&s, "staff(/eng, L)", "L");
    assert_eq!(lists.len(), 1);
    let Value::List(mut members) = lists[0].clone() else {
        panic!("expected a list, got {}", lists[0]);
    };
    members.sort();
    assert_eq!(members, vec![Value::name("/ann"), Value::name("/bo")]);
}

#[test]
fn test_empty_groups_derive_nothing() {
    let s = session(PAYROLL);
    assert!(s.query("headcount(N)", &ctx()).unwrap().is_empty());
}

// ============================================================================
// Budgets and pluggable evaluators
// ============================================================================

#[test]
fn test_expired_deadline_interrupts() {
    let s = graph();
    let expired = QueryContext::with_deadline(Instant::now());
    let err = s.query("reachable(X, Y)", &expired).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Eval(EvalError::Interrupted(Interrupted::DeadlineExceeded))
    ));
    assert!(s.query("reachable(X, Y)", &QueryContext::with_timeout(Duration::from_secs(60))).is_ok());
}

#[test]
fn test_cancellation_interrupts() {
    let s = graph();
    let ctx = QueryContext::unbounded();
    let handle = ctx.clone();
    handle.cancel();
    let err = s.evaluate(&ctx).unwrap_err();
    assert!(matches!(err, SessionError::Eval(EvalError::Interrupted(Interrupted::Cancelled))));
}

#[test]
fn test_divergent_program_hits_iteration_ceiling() {
    let config = CompilerConfig {
        max_fixpoint_iterations: 5,
        ..CompilerConfig::default()
    };
    let s = Session::from_source(
        "count(0).\ncount(Y) :- count(X), Y = fn:plus(X, 1).",
        Arc::new(SchemaRegistry::empty()),
        config,
    )
    .unwrap();
    let err = s.evaluate(&ctx()).unwrap_err();
    assert!(matches!(err, SessionError::Eval(EvalError::NotConverged(5))));
}

struct BaseOnly;

impl Evaluator for BaseOnly {
    fn evaluate(&self, _program: &Program, base: &FactSet, _ctx: &QueryContext) -> Result<FactSet, EvalError> {
        Ok(base.clone())
    }
}

#[test]
fn test_evaluator_is_pluggable() {
    let s = graph().with_evaluator(BaseOnly);
    assert!(s.query("reachable(X, Y)", &ctx()).unwrap().is_empty());
    assert_eq!(s.query("edge(X, Y)", &ctx()).unwrap().len(), 3);
}

#[test]
fn test_direct_evaluation_matches_session() {
    let program = parse(REACHABILITY).unwrap();
    let s = graph();
    let base = s.store().snapshot();
    let direct = NaiveEvaluator::default().evaluate(&program, &base, &ctx()).unwrap();
    assert_eq!(direct, s.evaluate(&ctx()).unwrap());
}

#[test]
fn test_unsafe_program_is_refused_by_the_session() {
    let result = Session::from_source("p(X) :- !q(X).", Arc::new(SchemaRegistry::empty()), CompilerConfig::default());
    assert!(matches!(result, Err(SessionError::Analysis(_))));
}
