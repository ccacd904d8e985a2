//! Safety and stratification analysis
//!
//! The body scheduler here is shared by the analyzer and the evaluator: a
//! clause is safe exactly when its premises can be put in an order where
//! every premise is ready when reached.
//!
//! # Readiness
//!
//! - positive atom: variables under function applications are bound
//! - negated atom, `!=`, comparisons: every variable is bound
//! - `=`: both sides bound, or one side is an unbound variable and the other
//!   side is bound (binds that variable)
//!
//! The wildcard `_` never binds, so it may only stand as a pattern inside a
//! body atom. Anywhere it would be read (heads, (in)equalities, comparisons,
//! function arguments) it is a safety violation.
//!
//! # Stratification
//!
//! Predicates form a dependency graph (head -> body predicate). Edges through
//! negation, and every edge of a clause with an aggregating transform, are
//! strict. Strongly connected components are computed with Tarjan's
//! algorithm, which emits them dependencies-first; a strict edge inside a
//! component makes the program unstratifiable.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::builtin;
use crate::ir::*;

// ============================================================================
// Safety
// ============================================================================

/// Where in a clause a safety violation sits
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    Head { arg: usize },
    Body { premise: usize },
    Transform { statement: usize },
}

impl Location {
    /// Path suffix relative to the clause, e.g. `.body[1]`
    pub fn path_suffix(&self) -> String {
        match self {
            Location::Head { arg } => format!(".head.args[{arg}]"),
            Location::Body { premise } => format!(".body[{premise}]"),
            Location::Transform { statement } => format!(".transform[{statement}]"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SafetyReason {
    /// Variables never bound by a positive premise
    Unbound(Vec<String>),
    /// A `let` target that is already bound
    Rebound(String),
    /// A head variable hidden by aggregation (not grouped, not a `let` target)
    NotGrouped(Vec<String>),
    /// Argument of `fn:group_by` that is not a variable
    GroupKey,
    /// `let` bound to `fn:group_by`, which produces no value
    GroupTarget(String),
    /// `_` where its value would be read
    Wildcard,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafetyViolation {
    pub location: Location,
    pub reason: SafetyReason,
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            SafetyReason::Unbound(vars) => write!(
                f,
                "unsafe variable(s) {} not bound by any positive premise",
                vars.join(", ")
            ),
            SafetyReason::Rebound(var) => {
                write!(f, "transform binds {var}, which is already bound in the clause")
            }
            SafetyReason::NotGrouped(vars) => write!(
                f,
                "head variable(s) {} are neither grouped nor bound by the transform",
                vars.join(", ")
            ),
            SafetyReason::GroupKey => write!(f, "fn:group_by arguments must be variables"),
            SafetyReason::GroupTarget(var) => {
                write!(f, "fn:group_by yields no value; use `do` instead of binding {var}")
            }
            SafetyReason::Wildcard => {
                write!(f, "_ only matches inside atom arguments and cannot be read here")
            }
        }
    }
}

/// Outcome of scheduling a clause body
#[derive(Clone, Debug, Default)]
pub struct BodySchedule {
    /// Premise indices in evaluation order
    pub order: Vec<usize>,
    /// Premises that never became ready
    pub stuck: Vec<usize>,
    /// Variables bound once the scheduled premises have run
    pub bound: BTreeSet<String>,
}

/// Variables of an atom that must be bound before it can be matched
fn atom_inputs(atom: &Atom) -> BTreeSet<String> {
    let mut pattern = BTreeSet::new();
    for arg in &atom.args {
        arg.collect_pattern_variables(&mut pattern);
    }
    atom.variables().difference(&pattern).cloned().collect()
}

fn atom_outputs(atom: &Atom) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for arg in &atom.args {
        arg.collect_pattern_variables(&mut out);
    }
    out
}

fn unbound_in(vars: &BTreeSet<String>, bound: &BTreeSet<String>) -> Vec<String> {
    vars.difference(bound).cloned().collect()
}

/// If the premise is ready under `bound`, the variables it binds
pub fn premise_binds(premise: &Premise, bound: &BTreeSet<String>) -> Option<BTreeSet<String>> {
    match premise {
        Premise::Positive(atom) => atom_inputs(atom)
            .is_subset(bound)
            .then(|| atom_outputs(atom)),
        Premise::Negated(atom) => atom.variables().is_subset(bound).then(BTreeSet::new),
        Premise::Neq(l, r) | Premise::Cmp(_, l, r) => {
            (l.variables().is_subset(bound) && r.variables().is_subset(bound)).then(BTreeSet::new)
        }
        Premise::Eq(l, r) => {
            let lv = l.variables();
            let rv = r.variables();
            if lv.is_subset(bound) && rv.is_subset(bound) {
                return Some(BTreeSet::new());
            }
            match (l, r) {
                (Term::Var(v), _) if !l.is_wildcard() && rv.is_subset(bound) => {
                    Some(BTreeSet::from([v.clone()]))
                }
                (_, Term::Var(v)) if !r.is_wildcard() && lv.is_subset(bound) => {
                    Some(BTreeSet::from([v.clone()]))
                }
                _ => None,
            }
        }
    }
}

/// Order premises greedily: always take the first ready premise.
pub fn schedule_body(body: &[Premise]) -> BodySchedule {
    let mut schedule = BodySchedule::default();
    let mut remaining: Vec<usize> = (0..body.len()).collect();

    while let Some(pos) = remaining
        .iter()
        .position(|&i| premise_binds(&body[i], &schedule.bound).is_some())
    {
        let index = remaining.remove(pos);
        if let Some(binds) = premise_binds(&body[index], &schedule.bound) {
            schedule.bound.extend(binds);
        }
        schedule.order.push(index);
    }

    schedule.stuck = remaining;
    schedule
}

fn premise_variables(premise: &Premise) -> BTreeSet<String> {
    match premise {
        Premise::Positive(atom) | Premise::Negated(atom) => atom.variables(),
        Premise::Eq(l, r) | Premise::Neq(l, r) | Premise::Cmp(_, l, r) => {
            let mut vars = l.variables();
            vars.extend(r.variables());
            vars
        }
    }
}

fn has_wildcard(term: &Term) -> bool {
    match term {
        Term::Var(_) => term.is_wildcard(),
        Term::Apply { args, .. } | Term::List(args) | Term::Map(args) | Term::Struct(args) => {
            args.iter().any(has_wildcard)
        }
        _ => false,
    }
}

/// `_` under a function application, where matching cannot reach it
fn has_computed_wildcard(term: &Term) -> bool {
    match term {
        Term::Apply { .. } => has_wildcard(term),
        Term::List(args) | Term::Map(args) | Term::Struct(args) => {
            args.iter().any(has_computed_wildcard)
        }
        _ => false,
    }
}

fn premise_reads_wildcard(premise: &Premise) -> bool {
    match premise {
        Premise::Positive(atom) | Premise::Negated(atom) => atom.args.iter().any(has_computed_wildcard),
        Premise::Eq(l, r) | Premise::Neq(l, r) | Premise::Cmp(_, l, r) => has_wildcard(l) || has_wildcard(r),
    }
}

/// Check a clause for unsafe variables, misplaced wildcards, rebinding `let`s
/// and hidden head variables.
pub fn check_clause_safety(clause: &Clause) -> Vec<SafetyViolation> {
    let mut violations = Vec::new();
    let schedule = schedule_body(&clause.body);

    for (index, premise) in clause.body.iter().enumerate() {
        if premise_reads_wildcard(premise) {
            violations.push(SafetyViolation {
                location: Location::Body { premise: index },
                reason: SafetyReason::Wildcard,
            });
        }
    }

    for &index in &schedule.stuck {
        let missing = unbound_in(&premise_variables(&clause.body[index]), &schedule.bound);
        violations.push(SafetyViolation {
            location: Location::Body { premise: index },
            reason: SafetyReason::Unbound(missing),
        });
    }

    let mut bound = schedule.bound.clone();
    // Variables visible to the head; narrowed when the transform aggregates
    let mut visible: Option<BTreeSet<String>> = None;

    if let Some(transform) = &clause.transform {
        let aggregating = transform.statements.iter().any(|stmt| match &stmt.apply {
            Term::Apply { function, .. } => builtin::is_aggregating(function),
            _ => false,
        });
        if aggregating {
            visible = Some(BTreeSet::new());
        }

        for (i, stmt) in transform.statements.iter().enumerate() {
            let location = Location::Transform { statement: i };
            if let Term::Apply { function, args, .. } = &stmt.apply {
                if function == "fn:group_by" {
                    for arg in args {
                        match arg {
                            Term::Var(v) if !arg.is_wildcard() => {
                                if let Some(visible) = visible.as_mut() {
                                    visible.insert(v.clone());
                                }
                            }
                            _ => violations.push(SafetyViolation {
                                location: location.clone(),
                                reason: SafetyReason::GroupKey,
                            }),
                        }
                    }
                }
            }
            if has_wildcard(&stmt.apply) {
                violations.push(SafetyViolation {
                    location: location.clone(),
                    reason: SafetyReason::Wildcard,
                });
            }
            let missing = unbound_in(&stmt.apply.variables(), &bound);
            if !missing.is_empty() {
                violations.push(SafetyViolation {
                    location: location.clone(),
                    reason: SafetyReason::Unbound(missing),
                });
            }
            if let Some(target) = &stmt.target {
                let groups = matches!(&stmt.apply, Term::Apply { function, .. } if function == "fn:group_by");
                if groups {
                    violations.push(SafetyViolation {
                        location: location.clone(),
                        reason: SafetyReason::GroupTarget(target.clone()),
                    });
                } else if bound.contains(target) {
                    violations.push(SafetyViolation {
                        location,
                        reason: SafetyReason::Rebound(target.clone()),
                    });
                }
                bound.insert(target.clone());
                if let Some(visible) = visible.as_mut() {
                    visible.insert(target.clone());
                }
            }
        }
    }

    let visible = visible.unwrap_or(bound.clone());
    for (i, arg) in clause.head.args.iter().enumerate() {
        if has_wildcard(arg) {
            violations.push(SafetyViolation {
                location: Location::Head { arg: i },
                reason: SafetyReason::Wildcard,
            });
            continue;
        }
        let vars = arg.variables();
        let missing = unbound_in(&vars, &bound);
        if !missing.is_empty() {
            violations.push(SafetyViolation {
                location: Location::Head { arg: i },
                reason: SafetyReason::Unbound(missing),
            });
            continue;
        }
        let hidden = unbound_in(&vars, &visible);
        if !hidden.is_empty() {
            violations.push(SafetyViolation {
                location: Location::Head { arg: i },
                reason: SafetyReason::NotGrouped(hidden),
            });
        }
    }

    violations
}

// ============================================================================
// Program analysis
// ============================================================================

/// A semantic error in a parsed program
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("predicate {predicate} is declared more than once")]
    DuplicateDecl { decl: usize, predicate: String },

    #[error("predicate {predicate} used with arity {found}, expected {expected}")]
    ArityConflict {
        clause: usize,
        predicate: String,
        expected: usize,
        found: usize,
    },

    #[error("clause {clause}: {violation}")]
    Unsafe {
        clause: usize,
        violation: SafetyViolation,
    },

    #[error("unstratifiable: {predicate} depends on itself through negation or aggregation (cycle: {})", .cycle.join(" -> "))]
    Unstratifiable {
        clause: usize,
        predicate: String,
        cycle: Vec<String>,
    },
}

impl AnalysisError {
    /// Field path of the offending program element
    pub fn path(&self) -> String {
        match self {
            AnalysisError::DuplicateDecl { decl, .. } => format!("program.decls[{decl}]"),
            AnalysisError::ArityConflict { clause, .. }
            | AnalysisError::Unstratifiable { clause, .. } => format!("program.clauses[{clause}]"),
            AnalysisError::Unsafe { clause, violation } => {
                format!("program.clauses[{clause}]{}", violation.location.path_suffix())
            }
        }
    }
}

/// One evaluation layer: a strongly connected set of intensional predicates
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stratum {
    pub predicates: Vec<String>,
    /// Indices of the non-unit clauses defining these predicates
    pub clauses: Vec<usize>,
    /// Whether the component depends on itself
    pub recursive: bool,
}

/// Result of a successful analysis
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Analysis {
    /// Dependencies first
    pub strata: Vec<Stratum>,
    /// Predicate arities as used by the program
    pub arities: IndexMap<String, usize>,
}

fn clause_atoms(clause: &Clause) -> impl Iterator<Item = &Atom> {
    std::iter::once(&clause.head).chain(clause.body.iter().filter_map(Premise::atom))
}

fn check_arities(program: &Program, errors: &mut Vec<AnalysisError>) -> IndexMap<String, usize> {
    let mut arities: IndexMap<String, usize> = IndexMap::new();
    let mut seen = IndexSet::new();

    for (i, decl) in program.decls.iter().enumerate() {
        if !seen.insert(decl.predicate().to_string()) {
            errors.push(AnalysisError::DuplicateDecl {
                decl: i,
                predicate: decl.predicate().to_string(),
            });
            continue;
        }
        arities.insert(decl.predicate().to_string(), decl.arity());
    }

    for (i, clause) in program.clauses.iter().enumerate() {
        for atom in clause_atoms(clause) {
            match arities.get(&atom.predicate) {
                Some(&expected) if expected != atom.arity() => {
                    errors.push(AnalysisError::ArityConflict {
                        clause: i,
                        predicate: atom.predicate.clone(),
                        expected,
                        found: atom.arity(),
                    });
                }
                Some(_) => {}
                None => {
                    arities.insert(atom.predicate.clone(), atom.arity());
                }
            }
        }
    }
    arities
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Edge {
    Positive,
    Strict,
}

struct DependencyGraph {
    /// Intensional predicates in first-definition order
    nodes: IndexSet<String>,
    /// `edges[n]`: (dependency node, edge kind, defining clause)
    edges: Vec<Vec<(usize, Edge, usize)>>,
}

impl DependencyGraph {
    fn build(program: &Program) -> Self {
        let nodes: IndexSet<String> = program
            .clauses
            .iter()
            .filter(|c| !c.is_unit())
            .map(|c| c.head.predicate.clone())
            .collect();
        let mut edges = vec![Vec::new(); nodes.len()];

        for (ci, clause) in program.clauses.iter().enumerate() {
            let Some(head) = nodes.get_index_of(&clause.head.predicate) else {
                continue;
            };
            let aggregating = clause.transform.as_ref().is_some_and(|t| {
                t.statements.iter().any(|s| match &s.apply {
                    Term::Apply { function, .. } => builtin::is_aggregating(function),
                    _ => false,
                })
            });
            for premise in &clause.body {
                let (atom, negated) = match premise {
                    Premise::Positive(atom) => (atom, false),
                    Premise::Negated(atom) => (atom, true),
                    _ => continue,
                };
                if let Some(dep) = nodes.get_index_of(&atom.predicate) {
                    let kind = if negated || aggregating {
                        Edge::Strict
                    } else {
                        Edge::Positive
                    };
                    edges[head].push((dep, kind, ci));
                }
            }
        }
        Self { nodes, edges }
    }

    /// Tarjan's algorithm; components come out dependencies-first
    fn components(&self) -> Vec<Vec<usize>> {
        struct State {
            index: usize,
            indices: Vec<Option<usize>>,
            lowlink: Vec<usize>,
            on_stack: Vec<bool>,
            stack: Vec<usize>,
            out: Vec<Vec<usize>>,
        }

        fn visit(graph: &DependencyGraph, v: usize, st: &mut State) {
            st.indices[v] = Some(st.index);
            st.lowlink[v] = st.index;
            st.index += 1;
            st.stack.push(v);
            st.on_stack[v] = true;

            for &(w, _, _) in &graph.edges[v] {
                match st.indices[w] {
                    None => {
                        visit(graph, w, st);
                        st.lowlink[v] = st.lowlink[v].min(st.lowlink[w]);
                    }
                    Some(wi) if st.on_stack[w] => {
                        st.lowlink[v] = st.lowlink[v].min(wi);
                    }
                    Some(_) => {}
                }
            }

            if Some(st.lowlink[v]) == st.indices[v] {
                let mut component = Vec::new();
                while let Some(w) = st.stack.pop() {
                    st.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                st.out.push(component);
            }
        }

        let n = self.nodes.len();
        let mut st = State {
            index: 0,
            indices: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            out: Vec::new(),
        };
        for v in 0..n {
            if st.indices[v].is_none() {
                visit(self, v, &mut st);
            }
        }
        st.out
    }
}

/// Partition the intensional predicates into strata.
pub fn stratify(program: &Program) -> Result<Vec<Stratum>, Vec<AnalysisError>> {
    let graph = DependencyGraph::build(program);
    let mut strata = Vec::new();
    let mut errors = Vec::new();

    for component in graph.components() {
        let members: BTreeSet<usize> = component.iter().copied().collect();
        let predicates: Vec<String> = component.iter().map(|&i| graph.nodes[i].clone()).collect();
        let internal: Vec<(usize, Edge, usize)> = component
            .iter()
            .flat_map(|&v| graph.edges[v].iter().map(move |&(w, kind, clause)| (v, kind, clause, w)))
            .filter(|(_, _, _, w)| members.contains(w))
            .map(|(v, kind, clause, _)| (v, kind, clause))
            .collect();
        let recursive = !internal.is_empty();

        // One report per component is enough to reject it
        if let Some(&(v, _, clause)) = internal.iter().find(|(_, kind, _)| *kind == Edge::Strict) {
            errors.push(AnalysisError::Unstratifiable {
                clause,
                predicate: graph.nodes[v].clone(),
                cycle: predicates.clone(),
            });
        }

        let clauses = program
            .clauses
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_unit() && predicates.contains(&c.head.predicate))
            .map(|(i, _)| i)
            .collect();
        strata.push(Stratum {
            predicates,
            clauses,
            recursive,
        });
    }

    if errors.is_empty() {
        Ok(strata)
    } else {
        Err(errors)
    }
}

/// Full semantic analysis: declarations, arities, safety, stratification.
pub fn analyze(program: &Program) -> Result<Analysis, Vec<AnalysisError>> {
    let mut errors = Vec::new();
    let arities = check_arities(program, &mut errors);

    for (i, clause) in program.clauses.iter().enumerate() {
        for violation in check_clause_safety(clause) {
            errors.push(AnalysisError::Unsafe {
                clause: i,
                violation,
            });
        }
    }

    let strata = match stratify(program) {
        Ok(strata) => strata,
        Err(errs) => {
            errors.extend(errs);
            Vec::new()
        }
    };

    if errors.is_empty() {
        Ok(Analysis { strata, arities })
    } else {
        Err(errors)
    }
}
