//! Typed intermediate representation of the rule language
//!
//! Mirrors the surface grammar one node per production. IR values are built
//! from a validated payload (see [`crate::validate`]) or from parsed source
//! (see [`crate::parser`]) and rendered with [`crate::render`].

use std::collections::BTreeSet;
use std::fmt;

/// A complete program
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    /// `Package gate!`
    pub package: Option<String>,
    /// `Use base!`
    pub uses: Vec<String>,
    pub decls: Vec<Decl>,
    pub clauses: Vec<Clause>,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty() && self.clauses.is_empty()
    }

    /// Drop information the surface syntax does not carry (apply arity hints).
    pub fn without_hints(&self) -> Program {
        let mut program = self.clone();
        for decl in &mut program.decls {
            decl.atom.strip_hints();
            decl.descr.iter_mut().for_each(Atom::strip_hints);
            decl.inclusion.iter_mut().for_each(Atom::strip_hints);
            for bound in &mut decl.bounds {
                bound.iter_mut().for_each(Term::strip_hints);
            }
        }
        for clause in &mut program.clauses {
            clause.head.strip_hints();
            for premise in &mut clause.body {
                match premise {
                    Premise::Positive(atom) | Premise::Negated(atom) => atom.strip_hints(),
                    Premise::Eq(l, r) | Premise::Neq(l, r) | Premise::Cmp(_, l, r) => {
                        l.strip_hints();
                        r.strip_hints();
                    }
                }
            }
            if let Some(transform) = &mut clause.transform {
                for stmt in &mut transform.statements {
                    stmt.apply.strip_hints();
                }
            }
        }
        program
    }
}

/// A predicate declaration
/// e.g., `Decl edge(X, Y) descr [doc("an edge")] bound [/name, /name].`
#[derive(Clone, Debug, PartialEq)]
pub struct Decl {
    /// Predicate symbol and argument names; every argument is a variable
    pub atom: Atom,
    /// Descriptor atoms, e.g. `doc("...")`
    pub descr: Vec<Atom>,
    /// Type/mode hints, one term per argument per bound list
    pub bounds: Vec<Vec<Term>>,
    /// Declarations this one includes
    pub inclusion: Vec<Atom>,
}

impl Decl {
    pub fn predicate(&self) -> &str {
        &self.atom.predicate
    }

    pub fn arity(&self) -> usize {
        self.atom.args.len()
    }
}

/// A rule or a fact
/// e.g., `reachable(X, Z) :- edge(X, Y), reachable(Y, Z).`
#[derive(Clone, Debug, PartialEq)]
pub struct Clause {
    pub head: Atom,
    pub body: Vec<Premise>,
    pub transform: Option<Transform>,
}

impl Clause {
    /// A clause with no body and no transform
    pub fn is_unit(&self) -> bool {
        self.body.is_empty() && self.transform.is_none()
    }
}

/// A body premise
#[derive(Clone, Debug, PartialEq)]
pub enum Premise {
    /// `q(X)`
    Positive(Atom),
    /// `!q(X)`
    Negated(Atom),
    /// `X = Y`
    Eq(Term, Term),
    /// `X != Y`
    Neq(Term, Term),
    /// `X < Y`, `X <= Y`, `X > Y`, `X >= Y`
    Cmp(CmpOp, Term, Term),
}

impl Premise {
    pub fn atom(&self) -> Option<&Atom> {
        match self {
            Premise::Positive(atom) | Premise::Negated(atom) => Some(atom),
            _ => None,
        }
    }
}

/// Ordered comparison operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// Payload spelling (`lt`, `le`, `gt`, `ge`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lt" => Some(CmpOp::Lt),
            "le" => Some(CmpOp::Le),
            "gt" => Some(CmpOp::Gt),
            "ge" => Some(CmpOp::Ge),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        }
    }

    /// Surface spelling
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// An aggregation/derivation pipeline after `|>`
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    pub statements: Vec<Statement>,
}

/// `do fn:group_by(X)` or `let N = fn:count()`
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    /// Target variable of a `let`; `None` for `do`
    pub target: Option<String>,
    /// Always a [`Term::Apply`]
    pub apply: Term,
}

/// A predicate applied to terms
#[derive(Clone, Debug, PartialEq)]
pub struct Atom {
    pub predicate: String,
    pub args: Vec<Term>,
}

impl Atom {
    pub fn new(predicate: impl Into<String>, args: Vec<Term>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Variables anywhere in the arguments, wildcards excluded
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        for arg in &self.args {
            arg.collect_variables(&mut vars);
        }
        vars
    }

    fn strip_hints(&mut self) {
        self.args.iter_mut().for_each(Term::strip_hints);
    }
}

/// The wildcard variable
pub const WILDCARD: &str = "_";

/// Terms
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    /// `X`, `_`
    Var(String),
    /// Symbolic constant: `/alice`
    Name(String),
    /// `"text"`
    Text(String),
    /// `b"bytes"`
    Bytes(Vec<u8>),
    /// `42`
    Number(i64),
    /// `4.2`
    Float(f64),
    /// `fn:plus(X, 1)`; `arity` is an optional fixed-arity hint from the payload
    Apply {
        function: String,
        args: Vec<Term>,
        arity: Option<usize>,
    },
    /// `[a, b]`
    List(Vec<Term>),
    /// `[k: v, ...]`, stored flat as key, value, key, value, ...
    Map(Vec<Term>),
    /// `{k: v, ...}`, stored flat like [`Term::Map`]
    Struct(Vec<Term>),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Term::Name(name.into())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Term::Var(v) if v == WILDCARD)
    }

    /// The payload `kind` tag for this term
    pub fn kind(&self) -> TermKind {
        match self {
            Term::Var(_) => TermKind::Var,
            Term::Name(_) => TermKind::Name,
            Term::Text(_) => TermKind::Text,
            Term::Bytes(_) => TermKind::Bytes,
            Term::Number(_) => TermKind::Number,
            Term::Float(_) => TermKind::Float,
            Term::Apply { .. } => TermKind::Apply,
            Term::List(_) => TermKind::List,
            Term::Map(_) => TermKind::Map,
            Term::Struct(_) => TermKind::Struct,
        }
    }

    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    pub fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Term::Var(v) if v != WILDCARD => {
                out.insert(v.clone());
            }
            Term::Apply { args, .. } | Term::List(args) | Term::Map(args) | Term::Struct(args) => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
            _ => {}
        }
    }

    /// Variables this term binds when matched against a value.
    ///
    /// Variables under a function application are never bound by matching.
    pub fn collect_pattern_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Term::Var(v) if v != WILDCARD => {
                out.insert(v.clone());
            }
            Term::List(args) | Term::Map(args) | Term::Struct(args) => {
                for arg in args {
                    arg.collect_pattern_variables(out);
                }
            }
            _ => {}
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Apply { args, .. } | Term::List(args) | Term::Map(args) | Term::Struct(args) => {
                args.iter().all(Term::is_ground)
            }
            _ => true,
        }
    }

    fn strip_hints(&mut self) {
        match self {
            Term::Apply { args, arity, .. } => {
                *arity = None;
                args.iter_mut().for_each(Term::strip_hints);
            }
            Term::List(args) | Term::Map(args) | Term::Struct(args) => {
                args.iter_mut().for_each(Term::strip_hints);
            }
            _ => {}
        }
    }
}

/// Term kinds, spelled as in the payload `kind` field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TermKind {
    Var,
    Name,
    Text,
    Bytes,
    Number,
    Float,
    Apply,
    List,
    Map,
    Struct,
}

impl TermKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "var" => TermKind::Var,
            "name" => TermKind::Name,
            "string" => TermKind::Text,
            "bytes" => TermKind::Bytes,
            "number" => TermKind::Number,
            "float" => TermKind::Float,
            "apply" => TermKind::Apply,
            "list" => TermKind::List,
            "map" => TermKind::Map,
            "struct" => TermKind::Struct,
            _ => return None,
        })
    }

    pub fn tag(self) -> &'static str {
        match self {
            TermKind::Var => "var",
            TermKind::Name => "name",
            TermKind::Text => "string",
            TermKind::Bytes => "bytes",
            TermKind::Number => "number",
            TermKind::Float => "float",
            TermKind::Apply => "apply",
            TermKind::List => "list",
            TermKind::Map => "map",
            TermKind::Struct => "struct",
        }
    }
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::render::render_atom(self))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::render::render_term(self))
    }
}
