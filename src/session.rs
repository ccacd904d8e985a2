//! Session facade: one verified program, its facts and an evaluator
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rulesmith::{CompilerConfig, QueryContext, SchemaRegistry, Session, TypedValue};
//!
//! let source = "reachable(X, Y) :- edge(X, Y).\nreachable(X, Z) :- edge(X, Y), reachable(Y, Z).";
//! let session = Session::from_source(source, Arc::new(SchemaRegistry::empty()), CompilerConfig::default())?;
//! session.insert("edge", vec![TypedValue::constant("/a"), TypedValue::constant("/b")])?;
//! session.insert("edge", vec![TypedValue::constant("/b"), TypedValue::constant("/c")])?;
//!
//! let answers = session.query("reachable(/a, Z)", &QueryContext::unbounded())?;
//! assert_eq!(answers.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::analysis::{self, AnalysisError};
use crate::config::CompilerConfig;
use crate::context::QueryContext;
use crate::error::ParseError;
use crate::eval::{self, EvalError, Evaluator, NaiveEvaluator};
use crate::ir::{Decl, Program};
use crate::registry::{RuleBook, SchemaError, SchemaRegistry};
use crate::store::{FactSet, FactStore, QueryError, StoreError};
use crate::trace::{Derivation, TraceError, Tracer};
use crate::unify::Bindings;
use crate::value::TypedValue;

fn join_errors(errors: &[AnalysisError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("program rejected by analysis: {}", join_errors(.0))]
    Analysis(Vec<AnalysisError>),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

pub struct Session {
    config: CompilerConfig,
    program: Program,
    registry: Arc<SchemaRegistry>,
    rules: RuleBook,
    store: FactStore,
    evaluator: Box<dyn Evaluator>,
}

impl Session {
    /// Start a session over an analyzed program. The program's declarations
    /// extend `registry`; ones already registered are kept as they are.
    pub fn new(program: Program, registry: Arc<SchemaRegistry>, config: CompilerConfig) -> Result<Self, SessionError> {
        analysis::analyze(&program).map_err(SessionError::Analysis)?;

        let fresh: Vec<Decl> = program
            .decls
            .iter()
            .filter(|d| !registry.contains(d.predicate()))
            .cloned()
            .collect();
        let registry = if fresh.is_empty() {
            registry
        } else {
            Arc::new(registry.extended(&fresh)?)
        };
        let rules = RuleBook::from_program(&program, &registry);
        let evaluator = Box::new(NaiveEvaluator::new(config.max_fixpoint_iterations));
        tracing::debug!(
            clauses = program.clauses.len(),
            predicates = registry.len(),
            "session started"
        );

        Ok(Self {
            config,
            program,
            store: FactStore::new(Arc::clone(&registry)),
            registry,
            rules,
            evaluator,
        })
    }

    /// Parse rule source and start a session over it
    pub fn from_source(source: &str, registry: Arc<SchemaRegistry>, config: CompilerConfig) -> Result<Self, SessionError> {
        let program = crate::parse(source)?;
        Self::new(program, registry, config)
    }

    /// Swap in another evaluation strategy
    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub fn store(&self) -> &FactStore {
        &self.store
    }

    pub fn insert(&self, predicate: &str, args: Vec<TypedValue>) -> Result<bool, StoreError> {
        self.store.insert(predicate, args)
    }

    pub fn insert_loose(&self, predicate: &str, args: &[serde_json::Value]) -> Result<bool, StoreError> {
        self.store.insert_loose(predicate, args)
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Every fact derivable from the current base facts
    pub fn evaluate(&self, ctx: &QueryContext) -> Result<FactSet, SessionError> {
        let base = self.store.snapshot();
        Ok(self.evaluator.evaluate(&self.program, &base, ctx)?)
    }

    /// Answer a query such as `reachable(/a, X)`
    pub fn query(&self, query: &str, ctx: &QueryContext) -> Result<Vec<Bindings>, SessionError> {
        let pattern = crate::parse_query(query)?;
        let facts = self.evaluate(ctx)?;
        let answers = facts.query(&pattern, ctx)?;
        tracing::debug!(%pattern, answers = answers.len(), "query answered");
        Ok(answers)
    }

    /// Derivation trees for every fact matching the query
    pub fn explain(&self, query: &str, ctx: &QueryContext) -> Result<Vec<Derivation>, SessionError> {
        let pattern = crate::parse_query(query)?;
        let base = self.store.snapshot();
        let facts = self.evaluator.evaluate(&self.program, &base, ctx)?;

        // Facts stated by unit clauses count as asserted
        let mut asserted = FactSet::clone(&base);
        for clause in self.program.clauses.iter().filter(|c| c.is_unit()) {
            asserted.extend(eval::fire_clause(clause, &FactSet::new(), ctx)?);
        }

        let tracer = Tracer::new(&facts, &asserted, &self.rules, self.config.max_trace_depth);
        Ok(tracer.trace(&pattern, ctx)?)
    }
}
