//! Derivation tracing: explain why a fact holds
//!
//! A trace walks backwards from a fact. Extensional facts are leaves;
//! intensional facts are re-derived by solving a defining clause's body with
//! the head seeded from the fact, and each supporting fact is traced in turn.
//!
//! Termination does not depend on the program being acyclic: a fact already
//! on the active path becomes a [`Provenance::Cycle`] leaf, and the depth
//! ceiling turns anything deeper into a [`Provenance::DepthLimit`] leaf.

use std::fmt::Write as _;

use indexmap::IndexSet;
use thiserror::Error;

use crate::context::{Interrupted, QueryContext};
use crate::eval::{self, EvalError, Solution};
use crate::ir::{Atom, Clause, Transform};
use crate::registry::{PredicateClass, RuleBook};
use crate::store::{FactSet, QueryError};
use crate::unify::{self, eval_term, Bindings};
use crate::value::Fact;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// How a fact came to hold
#[derive(Clone, Debug, PartialEq)]
pub enum Provenance {
    /// Asserted directly
    Base,
    /// Produced by clause `clause` of rule `rule`. Children are the facts
    /// one body solution matched; for an aggregating clause they are the
    /// matched facts of every row in the group.
    Derived {
        rule: String,
        clause: usize,
        children: Vec<Derivation>,
    },
    /// Already being explained higher up the tree
    Cycle,
    /// Cut off by the depth ceiling
    DepthLimit,
    /// Rule metadata or a witness is missing
    Unknown { reason: String },
}

/// One node of a derivation tree
#[derive(Clone, Debug, PartialEq)]
pub struct Derivation {
    pub fact: Fact,
    pub provenance: Provenance,
}

impl Derivation {
    pub fn children(&self) -> &[Derivation] {
        match &self.provenance {
            Provenance::Derived { children, .. } => children,
            _ => &[],
        }
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(Derivation::size).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(Derivation::depth).max().unwrap_or(0)
    }

    /// Indented text, one fact per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, level: usize) {
        let label = match &self.provenance {
            Provenance::Base => "base".to_string(),
            Provenance::Derived { rule, .. } => format!("derived: {rule}"),
            Provenance::Cycle => "cycle".to_string(),
            Provenance::DepthLimit => "depth limit".to_string(),
            Provenance::Unknown { reason } => format!("unknown: {reason}"),
        };
        let _ = writeln!(out, "{:width$}{} [{}]", "", self.fact, label, width = level * 2);
        for child in self.children() {
            child.render_into(out, level + 1);
        }
    }
}

/// Render several trees, separated by blank lines
pub fn render_forest(trees: &[Derivation]) -> String {
    trees
        .iter()
        .map(Derivation::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds derivation trees over an evaluated fact set
pub struct Tracer<'a> {
    /// Every fact, base and derived
    facts: &'a FactSet,
    /// Base facts only
    base: &'a FactSet,
    rules: &'a RuleBook,
    max_depth: usize,
}

impl<'a> Tracer<'a> {
    pub fn new(facts: &'a FactSet, base: &'a FactSet, rules: &'a RuleBook, max_depth: usize) -> Self {
        Self {
            facts,
            base,
            rules,
            max_depth,
        }
    }

    /// One tree per fact matching `pattern`
    pub fn trace(&self, pattern: &Atom, ctx: &QueryContext) -> Result<Vec<Derivation>, TraceError> {
        let facts = self.facts.matching(pattern, ctx)?;
        facts.iter().map(|fact| self.explain(fact, ctx)).collect()
    }

    pub fn explain(&self, fact: &Fact, ctx: &QueryContext) -> Result<Derivation, TraceError> {
        let mut path = IndexSet::new();
        self.node(fact, &mut path, 0, ctx)
    }

    fn leaf(fact: &Fact, provenance: Provenance) -> Derivation {
        Derivation {
            fact: fact.clone(),
            provenance,
        }
    }

    fn node(
        &self,
        fact: &Fact,
        path: &mut IndexSet<Fact>,
        depth: usize,
        ctx: &QueryContext,
    ) -> Result<Derivation, TraceError> {
        ctx.check()?;
        if path.contains(fact) {
            return Ok(Self::leaf(fact, Provenance::Cycle));
        }
        if depth >= self.max_depth {
            tracing::debug!(%fact, depth, "derivation truncated at depth limit");
            return Ok(Self::leaf(fact, Provenance::DepthLimit));
        }

        match self.rules.classify(&fact.predicate) {
            None => {
                tracing::warn!(predicate = %fact.predicate, "no rule metadata while tracing");
                Ok(Self::leaf(
                    fact,
                    Provenance::Unknown {
                        reason: format!("no rule metadata for {}", fact.predicate),
                    },
                ))
            }
            Some(PredicateClass::Extensional) => {
                if self.base.contains(fact) || self.facts.contains(fact) {
                    Ok(Self::leaf(fact, Provenance::Base))
                } else {
                    Ok(Self::leaf(
                        fact,
                        Provenance::Unknown {
                            reason: "fact is not present".to_string(),
                        },
                    ))
                }
            }
            Some(PredicateClass::Intensional) => {
                path.insert(fact.clone());
                let result = self.derived(fact, path, depth, ctx);
                path.shift_remove(fact);
                result
            }
        }
    }

    fn derived(
        &self,
        fact: &Fact,
        path: &mut IndexSet<Fact>,
        depth: usize,
        ctx: &QueryContext,
    ) -> Result<Derivation, TraceError> {
        for rule in self.rules.rules_for(&fact.predicate) {
            let support = match &rule.clause.transform {
                Some(transform) if eval::is_aggregating(transform) => {
                    self.group_support(&rule.clause, transform, fact, ctx)?
                }
                _ => self
                    .witness(&rule.clause, fact, path, ctx)?
                    .map(|solution| solution.support),
            };
            let Some(support) = support else {
                continue;
            };
            let children = support
                .iter()
                .map(|child| self.node(child, path, depth + 1, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Derivation {
                fact: fact.clone(),
                provenance: Provenance::Derived {
                    rule: rule.clause.head.predicate.clone(),
                    clause: rule.index,
                    children,
                },
            });
        }

        if self.base.contains(fact) {
            return Ok(Self::leaf(fact, Provenance::Base));
        }
        Ok(Self::leaf(
            fact,
            Provenance::Unknown {
                reason: "no clause instance derives this fact".to_string(),
            },
        ))
    }

    /// A body solution of `clause` producing `fact`, preferring one whose
    /// support stays off the active path
    fn witness(
        &self,
        clause: &Clause,
        fact: &Fact,
        path: &IndexSet<Fact>,
        ctx: &QueryContext,
    ) -> Result<Option<Solution>, TraceError> {
        let Some(initial) = seed(clause, fact)? else {
            return Ok(None);
        };
        let solutions = eval::solve_body(&clause.body, self.facts, initial, ctx)?;
        let mut fallback = None;
        for solution in solutions {
            let rows = match &clause.transform {
                None => vec![solution.bindings.clone()],
                Some(t) => eval::apply_transform(t, vec![solution.bindings.clone()])?,
            };
            if !head_matches(clause, &rows, fact)? {
                continue;
            }
            if solution.support.iter().all(|f| !path.contains(f)) {
                return Ok(Some(solution));
            }
            fallback.get_or_insert(solution);
        }
        Ok(fallback)
    }

    /// Support of every body solution in the group that aggregates to `fact`.
    ///
    /// Seeding from the head binds the group keys, so the body solutions are
    /// exactly the rows of that group. The aggregate is recomputed over them
    /// and must reproduce `fact`.
    fn group_support(
        &self,
        clause: &Clause,
        transform: &Transform,
        fact: &Fact,
        ctx: &QueryContext,
    ) -> Result<Option<Vec<Fact>>, TraceError> {
        let Some(initial) = seed(clause, fact)? else {
            return Ok(None);
        };
        let solutions = eval::solve_body(&clause.body, self.facts, initial, ctx)?;
        let rows: Vec<Bindings> = solutions.iter().map(|s| s.bindings.clone()).collect();
        if !head_matches(clause, &eval::apply_transform(transform, rows)?, fact)? {
            return Ok(None);
        }
        let support: IndexSet<Fact> = solutions.into_iter().flat_map(|s| s.support).collect();
        Ok(Some(support.into_iter().collect()))
    }
}

/// Bindings a clause head fixes for `fact`. Transform targets are not body
/// variables and stay out of the body search.
fn seed(clause: &Clause, fact: &Fact) -> Result<Option<Bindings>, EvalError> {
    let Some(bound) = unify::match_head_patterns(&clause.head, &fact.args)? else {
        return Ok(None);
    };
    let targets: Vec<&String> = clause
        .transform
        .iter()
        .flat_map(|t| t.statements.iter().filter_map(|s| s.target.as_ref()))
        .collect();
    Ok(Some(
        bound
            .into_iter()
            .filter(|(var, _)| !targets.contains(&var))
            .collect(),
    ))
}

/// Whether one of the transformed rows instantiates the head as `fact`
fn head_matches(clause: &Clause, rows: &[Bindings], fact: &Fact) -> Result<bool, EvalError> {
    for row in rows {
        let args = clause
            .head
            .args
            .iter()
            .map(|t| eval_term(t, row))
            .collect::<Result<Vec<_>, _>>()?;
        if args == fact.args {
            return Ok(true);
        }
    }
    Ok(false)
}
