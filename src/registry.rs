//! Schema registry and rule metadata
//!
//! [`SchemaRegistry`] is loaded once per session from declarations and never
//! mutated afterwards; extending it produces a new registry. [`RuleBook`]
//! records which clauses define which predicates and whether a predicate is
//! extensional (base facts) or intensional (derived by rules).

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::ir::{Clause, Decl, Premise, Program, Term};
use crate::value::{Fact, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("predicate {0} is declared more than once")]
    Duplicate(String),
    #[error("bound list of {predicate} has {found} entries, expected {expected}")]
    BoundArity {
        predicate: String,
        expected: usize,
        found: usize,
    },
    #[error("bound of {predicate} must be a type name, found {found}")]
    InvalidBound { predicate: String, found: String },
}

/// A fact that does not fit its declaration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("type mismatch for {predicate}: {reason}")]
pub struct TypeMismatch {
    pub predicate: String,
    pub reason: String,
}

/// A type hint from a `bound [...]` list
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeBound {
    Any,
    String,
    Bytes,
    Number,
    Float,
    Name,
    List,
    Map,
    Struct,
    /// Names under a prefix, e.g. `/person` admits `/person/alice`
    NamePrefix(String),
}

impl TypeBound {
    pub fn from_term(term: &Term) -> Option<TypeBound> {
        let Term::Name(name) = term else {
            return None;
        };
        Some(match name.as_str() {
            "/any" => TypeBound::Any,
            "/string" => TypeBound::String,
            "/bytes" => TypeBound::Bytes,
            "/number" => TypeBound::Number,
            "/float64" => TypeBound::Float,
            "/name" => TypeBound::Name,
            "/list" => TypeBound::List,
            "/map" => TypeBound::Map,
            "/struct" => TypeBound::Struct,
            other => TypeBound::NamePrefix(other.to_string()),
        })
    }

    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeBound::Any, _) => true,
            (TypeBound::String, Value::Text(_)) => true,
            (TypeBound::Bytes, Value::Bytes(_)) => true,
            (TypeBound::Number, Value::Number(_)) => true,
            (TypeBound::Float, Value::Float(_)) => true,
            (TypeBound::Name, Value::Name(_)) => true,
            (TypeBound::List, Value::List(_)) => true,
            (TypeBound::Map, Value::Map(_)) => true,
            (TypeBound::Struct, Value::Struct(_)) => true,
            (TypeBound::NamePrefix(prefix), Value::Name(n)) => {
                n == prefix || n.strip_prefix(prefix.as_str()).is_some_and(|rest| rest.starts_with('/'))
            }
            _ => false,
        }
    }
}

impl fmt::Display for TypeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeBound::Any => f.write_str("/any"),
            TypeBound::String => f.write_str("/string"),
            TypeBound::Bytes => f.write_str("/bytes"),
            TypeBound::Number => f.write_str("/number"),
            TypeBound::Float => f.write_str("/float64"),
            TypeBound::Name => f.write_str("/name"),
            TypeBound::List => f.write_str("/list"),
            TypeBound::Map => f.write_str("/map"),
            TypeBound::Struct => f.write_str("/struct"),
            TypeBound::NamePrefix(p) => f.write_str(p),
        }
    }
}

#[derive(Clone, Debug)]
struct PredicateSchema {
    decl: Decl,
    /// Alternatives; a fact must satisfy one of them
    bounds: Vec<Vec<TypeBound>>,
}

/// Immutable, load-once registry of declarations keyed by predicate symbol
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    predicates: IndexMap<String, PredicateSchema>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(decls: &[Decl]) -> Result<Self, SchemaError> {
        Self::empty().extended(decls)
    }

    /// A new registry with `decls` added; `self` is left untouched
    pub fn extended(&self, decls: &[Decl]) -> Result<Self, SchemaError> {
        let mut predicates = self.predicates.clone();
        for decl in decls {
            let predicate = decl.predicate().to_string();
            if predicates.contains_key(&predicate) {
                return Err(SchemaError::Duplicate(predicate));
            }
            let mut bounds = Vec::with_capacity(decl.bounds.len());
            for list in &decl.bounds {
                if list.len() != decl.arity() {
                    return Err(SchemaError::BoundArity {
                        predicate,
                        expected: decl.arity(),
                        found: list.len(),
                    });
                }
                let parsed = list
                    .iter()
                    .map(|term| {
                        TypeBound::from_term(term).ok_or_else(|| SchemaError::InvalidBound {
                            predicate: predicate.clone(),
                            found: term.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                bounds.push(parsed);
            }
            predicates.insert(
                predicate,
                PredicateSchema {
                    decl: decl.clone(),
                    bounds,
                },
            );
        }
        Ok(Self { predicates })
    }

    pub fn get(&self, predicate: &str) -> Option<&Decl> {
        self.predicates.get(predicate).map(|s| &s.decl)
    }

    pub fn arity(&self, predicate: &str) -> Option<usize> {
        self.get(predicate).map(Decl::arity)
    }

    pub fn contains(&self, predicate: &str) -> bool {
        self.predicates.contains_key(predicate)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn decls(&self) -> impl Iterator<Item = &Decl> {
        self.predicates.values().map(|s| &s.decl)
    }

    /// Check a fact against the arity and bounds of its declaration.
    /// Undeclared predicates are accepted.
    pub fn check_fact(&self, fact: &Fact) -> Result<(), TypeMismatch> {
        let Some(schema) = self.predicates.get(&fact.predicate) else {
            return Ok(());
        };
        let mismatch = |reason: String| TypeMismatch {
            predicate: fact.predicate.clone(),
            reason,
        };
        if schema.decl.arity() != fact.args.len() {
            return Err(mismatch(format!(
                "expected {} arguments, got {}",
                schema.decl.arity(),
                fact.args.len()
            )));
        }
        if schema.bounds.is_empty() {
            return Ok(());
        }
        let fits = |list: &Vec<TypeBound>| list.iter().zip(&fact.args).all(|(b, v)| b.admits(v));
        if schema.bounds.iter().any(fits) {
            return Ok(());
        }
        let got: Vec<&str> = fact.args.iter().map(Value::type_label).collect();
        let expected: Vec<String> = schema
            .bounds
            .iter()
            .map(|list| {
                let names: Vec<String> = list.iter().map(ToString::to_string).collect();
                format!("[{}]", names.join(", "))
            })
            .collect();
        Err(mismatch(format!(
            "argument types ({}) match none of the bounds {}",
            got.join(", "),
            expected.join(" or ")
        )))
    }
}

/// Extensional (base) or intensional (derived) predicate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredicateClass {
    Extensional,
    Intensional,
}

/// A clause together with its index in the program
#[derive(Clone, Debug)]
pub struct IndexedClause {
    pub index: usize,
    pub clause: Clause,
}

/// Rule metadata for one program
#[derive(Clone, Debug, Default)]
pub struct RuleBook {
    rules: IndexMap<String, Vec<IndexedClause>>,
    extensional: IndexSet<String>,
}

impl RuleBook {
    pub fn from_program(program: &Program, registry: &SchemaRegistry) -> Self {
        let mut rules: IndexMap<String, Vec<IndexedClause>> = IndexMap::new();
        for (index, clause) in program.clauses.iter().enumerate() {
            if !clause.is_unit() {
                rules
                    .entry(clause.head.predicate.clone())
                    .or_default()
                    .push(IndexedClause {
                        index,
                        clause: clause.clone(),
                    });
            }
        }

        let mut extensional = IndexSet::new();
        let mut mark = |predicate: &str| {
            if !rules.contains_key(predicate) {
                extensional.insert(predicate.to_string());
            }
        };
        for decl in registry.decls().chain(&program.decls) {
            mark(decl.predicate());
        }
        for clause in &program.clauses {
            if clause.is_unit() {
                mark(&clause.head.predicate);
            }
            for premise in &clause.body {
                if let Premise::Positive(atom) | Premise::Negated(atom) = premise {
                    mark(&atom.predicate);
                }
            }
        }

        Self { rules, extensional }
    }

    /// `None` when the predicate is unknown to this program
    pub fn classify(&self, predicate: &str) -> Option<PredicateClass> {
        if self.rules.contains_key(predicate) {
            Some(PredicateClass::Intensional)
        } else if self.extensional.contains(predicate) {
            Some(PredicateClass::Extensional)
        } else {
            None
        }
    }

    /// Non-unit clauses whose head is `predicate`
    pub fn rules_for(&self, predicate: &str) -> &[IndexedClause] {
        self.rules.get(predicate).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn intensional(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}
