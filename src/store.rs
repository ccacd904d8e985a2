//! In-memory fact store.
//!
//! Key design points:
//! - **Copy-on-write**: readers take an `Arc<FactSet>` snapshot and never
//!   block writers; a write clones the set only while a snapshot is alive
//! - **Typed ingestion**: facts arrive as [`TypedValue`]s and are checked
//!   against the [`SchemaRegistry`] before anything is stored
//! - **All or nothing**: a rejected insert leaves the store untouched

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::context::{Interrupted, QueryContext};
use crate::eval::EvalError;
use crate::ir::Atom;
use crate::lexical;
use crate::registry::{SchemaRegistry, TypeMismatch};
use crate::unify::{self, Bindings};
use crate::value::{Fact, TypedValue, Value, ValueError};

/// How many tuples are scanned between deadline checks
const CHECK_INTERVAL: usize = 1024;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("{0:?} is not a valid predicate symbol")]
    InvalidPredicate(String),
    #[error("argument {index} of {predicate}: {source}")]
    Value {
        predicate: String,
        index: usize,
        #[source]
        source: ValueError,
    },
    #[error("{predicate} already holds facts of arity {existing}, got {found}")]
    ArityConflict {
        predicate: String,
        existing: usize,
        found: usize,
    },
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error(transparent)]
    Parse(#[from] crate::error::ParseError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

// ============================================================================
// FACT SET
// ============================================================================

/// A set of ground facts grouped by predicate, in insertion order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FactSet {
    relations: IndexMap<String, IndexSet<Vec<Value>>>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the fact was already present
    pub fn insert(&mut self, fact: Fact) -> bool {
        self.relations
            .entry(fact.predicate)
            .or_default()
            .insert(fact.args)
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        self.relations
            .get(&fact.predicate)
            .is_some_and(|tuples| tuples.contains(&fact.args))
    }

    /// Tuples of one predicate
    pub fn tuples(&self, predicate: &str) -> impl Iterator<Item = &[Value]> {
        self.relations
            .get(predicate)
            .into_iter()
            .flat_map(|tuples| tuples.iter().map(Vec::as_slice))
    }

    /// Arity of the stored tuples of `predicate`, if any are stored
    pub fn arity_of(&self, predicate: &str) -> Option<usize> {
        self.relations.get(predicate)?.first().map(Vec::len)
    }

    pub fn predicates(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = Fact> + '_ {
        self.relations.iter().flat_map(|(predicate, tuples)| {
            tuples
                .iter()
                .map(move |args| Fact::new(predicate.clone(), args.clone()))
        })
    }

    pub fn len(&self) -> usize {
        self.relations.values().map(IndexSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Facts of `pattern.predicate` matching the pattern
    pub fn matching(&self, pattern: &Atom, ctx: &QueryContext) -> Result<Vec<Fact>, QueryError> {
        let mut out = Vec::new();
        for (i, tuple) in self.tuples(&pattern.predicate).enumerate() {
            if i % CHECK_INTERVAL == 0 {
                ctx.check()?;
            }
            if unify::match_atom(pattern, tuple, &Bindings::new())?.is_some() {
                out.push(Fact::new(pattern.predicate.clone(), tuple.to_vec()));
            }
        }
        Ok(out)
    }

    /// Distinct variable bindings of the pattern, wildcards excluded
    pub fn query(&self, pattern: &Atom, ctx: &QueryContext) -> Result<Vec<Bindings>, QueryError> {
        let mut answers = IndexSet::new();
        for (i, tuple) in self.tuples(&pattern.predicate).enumerate() {
            if i % CHECK_INTERVAL == 0 {
                ctx.check()?;
            }
            if let Some(bindings) = unify::match_atom(pattern, tuple, &Bindings::new())? {
                answers.insert(bindings);
            }
        }
        Ok(answers.into_iter().collect())
    }
}

impl Extend<Fact> for FactSet {
    fn extend<I: IntoIterator<Item = Fact>>(&mut self, iter: I) {
        for fact in iter {
            self.insert(fact);
        }
    }
}

impl FromIterator<Fact> for FactSet {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        let mut set = FactSet::new();
        set.extend(iter);
        set
    }
}

// ============================================================================
// FACT STORE
// ============================================================================

/// Concurrent base-fact store for one session
#[derive(Debug)]
pub struct FactStore {
    registry: Arc<SchemaRegistry>,
    facts: RwLock<Arc<FactSet>>,
}

impl FactStore {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            facts: RwLock::new(Arc::new(FactSet::new())),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Insert a fact given as tagged values. Returns false for a duplicate.
    pub fn insert(&self, predicate: &str, args: Vec<TypedValue>) -> Result<bool, StoreError> {
        let args = args
            .into_iter()
            .enumerate()
            .map(|(index, arg)| {
                arg.into_value().map_err(|source| StoreError::Value {
                    predicate: predicate.to_string(),
                    index,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.insert_fact(Fact::new(predicate, args))
    }

    /// Legacy untagged ingestion; strings are promoted by
    /// [`lexical::promote_loose_string`]
    pub fn insert_loose(&self, predicate: &str, args: &[serde_json::Value]) -> Result<bool, StoreError> {
        let args = args
            .iter()
            .enumerate()
            .map(|(index, arg)| {
                Value::from_loose(arg).map_err(|source| StoreError::Value {
                    predicate: predicate.to_string(),
                    index,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.insert_fact(Fact::new(predicate, args))
    }

    pub fn insert_fact(&self, fact: Fact) -> Result<bool, StoreError> {
        if !lexical::is_predicate_symbol(&fact.predicate) {
            return Err(StoreError::InvalidPredicate(fact.predicate));
        }
        self.registry.check_fact(&fact)?;

        let mut guard = self.facts.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = guard.arity_of(&fact.predicate) {
            if existing != fact.args.len() {
                return Err(StoreError::ArityConflict {
                    predicate: fact.predicate,
                    existing,
                    found: fact.args.len(),
                });
            }
        }
        if guard.contains(&fact) {
            return Ok(false);
        }
        tracing::trace!(%fact, "insert");
        Ok(Arc::make_mut(&mut guard).insert(fact))
    }

    /// A consistent view unaffected by later writes
    pub fn snapshot(&self) -> Arc<FactSet> {
        Arc::clone(&self.facts.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn clear(&self) {
        let mut guard = self.facts.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(FactSet::new());
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
