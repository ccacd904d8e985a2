//! Structural and semantic validation of decoded payloads
//!
//! A recursive-descent visitor over the untyped JSON tree. Each visitor
//! method takes the node and its [`FieldPath`], records a [`Diagnostic`] for
//! every violation it finds and returns the IR node only when its whole
//! subtree is valid. Siblings are always visited, so one pass reports every
//! structural problem.
//!
//! Semantic checks (duplicates, arities, safety, stratification) run only on
//! a structurally valid program, since they need the IR.

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::analysis::{self, Location, SafetyReason};
use crate::builtin;
use crate::config::CompilerConfig;
use crate::diagnostic::{Diagnostic, FieldPath};
use crate::ir::*;
use crate::lexical;
use crate::registry::SchemaRegistry;

/// Validate a decoded document and build its program
pub fn validate_document(
    doc: &Value,
    config: &CompilerConfig,
    registry: &SchemaRegistry,
) -> Result<Program, Vec<Diagnostic>> {
    let mut validator = Validator::new(config, registry);
    let program = validator.document(doc);
    if let Some(program) = &program {
        validator.semantics(program);
    }
    match program {
        Some(program) if validator.diagnostics.is_empty() => Ok(program),
        _ if validator.diagnostics.is_empty() => Err(vec![Diagnostic::schema(
            "program",
            "payload could not be turned into a program",
        )]),
        _ => Err(validator.diagnostics),
    }
}

struct Validator<'a> {
    config: &'a CompilerConfig,
    registry: &'a SchemaRegistry,
    diagnostics: Vec<Diagnostic>,
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn predicate_problem(s: &str) -> Option<String> {
    if lexical::is_predicate_symbol(s) {
        None
    } else if s.starts_with(lexical::FUNCTION_PREFIX) {
        Some(format!(
            "{s:?} is in the reserved function namespace; predicate symbols may not start with fn:"
        ))
    } else if lexical::is_reserved(s) {
        Some(format!("{s:?} is a reserved word"))
    } else {
        Some(format!("{s:?} is not a valid predicate symbol; expected [a-z][A-Za-z0-9_]*"))
    }
}

fn variable_problem(s: &str) -> Option<String> {
    if lexical::is_variable(s) {
        None
    } else if lexical::is_reserved(s) {
        Some(format!("{s:?} is a reserved word"))
    } else {
        Some(format!(
            "{s:?} is not a valid variable; expected _ or [A-Z][A-Za-z0-9_]*"
        ))
    }
}

impl<'a> Validator<'a> {
    fn new(config: &'a CompilerConfig, registry: &'a SchemaRegistry) -> Self {
        Self {
            config,
            registry,
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, path: &FieldPath, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::schema(path.as_str(), message));
    }

    // ------------------------------------------------------------------------
    // Shape helpers
    // ------------------------------------------------------------------------

    fn object<'v>(&mut self, value: &'v Value, path: &FieldPath, what: &str) -> Option<&'v Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            other => {
                self.error(path, format!("expected {what} object, found {}", describe(other)));
                None
            }
        }
    }

    fn required<'v>(&mut self, obj: &'v Map<String, Value>, path: &FieldPath, key: &str) -> Option<&'v Value> {
        match obj.get(key) {
            Some(value) => Some(value),
            None => {
                self.error(&path.field(key), format!("missing required field {key:?}"));
                None
            }
        }
    }

    fn string<'v>(&mut self, value: &'v Value, path: &FieldPath) -> Option<&'v str> {
        match value {
            Value::String(s) => Some(s),
            other => {
                self.error(path, format!("expected a string, found {}", describe(other)));
                None
            }
        }
    }

    fn string_field<'v>(&mut self, obj: &'v Map<String, Value>, path: &FieldPath, key: &str) -> Option<&'v str> {
        let value = self.required(obj, path, key)?;
        self.string(value, &path.field(key))
    }

    /// Visit every element; `Some` only if all elements are valid
    fn list<T>(
        &mut self,
        value: &Value,
        path: &FieldPath,
        mut visit: impl FnMut(&mut Self, &Value, &FieldPath) -> Option<T>,
    ) -> Option<Vec<T>> {
        let Value::Array(items) = value else {
            self.error(path, format!("expected an array, found {}", describe(value)));
            return None;
        };
        let visited: Vec<Option<T>> = items
            .iter()
            .enumerate()
            .map(|(i, item)| visit(self, item, &path.index(i)))
            .collect();
        visited.into_iter().collect()
    }

    /// Optional array field; absent or `null` is empty
    fn optional_list<T>(
        &mut self,
        obj: &Map<String, Value>,
        path: &FieldPath,
        key: &str,
        visit: impl FnMut(&mut Self, &Value, &FieldPath) -> Option<T>,
    ) -> Option<Vec<T>> {
        match obj.get(key) {
            None | Some(Value::Null) => Some(Vec::new()),
            Some(value) => self.list(value, &path.field(key), visit),
        }
    }

    // ------------------------------------------------------------------------
    // Document and program
    // ------------------------------------------------------------------------

    fn document(&mut self, doc: &Value) -> Option<Program> {
        let root = FieldPath::root("");
        let obj = self.object(doc, &root, "document")?;

        let format_ok = match obj.get("format") {
            Some(Value::String(f)) if *f == self.config.format_version => true,
            Some(Value::String(f)) => {
                let message = format!(
                    "unsupported format {f:?}; expected {:?}",
                    self.config.format_version
                );
                self.error(&root.field("format"), message);
                false
            }
            Some(other) => {
                self.error(
                    &root.field("format"),
                    format!("expected a string, found {}", describe(other)),
                );
                false
            }
            None => {
                self.error(&root.field("format"), "missing required field \"format\"");
                false
            }
        };

        let program = match self.required(obj, &root, "program") {
            Some(value) => self.program(value, &FieldPath::root("program")),
            None => None,
        };
        program.filter(|_| format_ok)
    }

    fn program(&mut self, value: &Value, path: &FieldPath) -> Option<Program> {
        let obj = self.object(value, path, "program")?;

        let package = match obj.get("package") {
            None | Some(Value::Null) => Some(None),
            Some(value) => {
                let field = path.field("package");
                self.string(value, &field).and_then(|name| {
                    if lexical::is_package_name(name) {
                        Some(Some(name.to_string()))
                    } else {
                        self.error(&field, format!("{name:?} is not a valid package name"));
                        None
                    }
                })
            }
        };
        let uses = self.optional_list(obj, path, "use", |v, item, p| {
            let name = v.string(item, p)?;
            if lexical::is_package_name(name) {
                Some(name.to_string())
            } else {
                v.error(p, format!("{name:?} is not a valid package name"));
                None
            }
        });
        let decls = self.optional_list(obj, path, "decls", Self::decl);
        let clauses = self.optional_list(obj, path, "clauses", Self::clause);

        if let (Some(decls), Some(clauses)) = (&decls, &clauses) {
            if decls.is_empty() && clauses.is_empty() {
                self.error(path, "program must contain at least one declaration or clause");
                return None;
            }
        }

        Some(Program {
            package: package?,
            uses: uses?,
            decls: decls?,
            clauses: clauses?,
        })
    }

    fn decl(&mut self, value: &Value, path: &FieldPath) -> Option<Decl> {
        let obj = self.object(value, path, "declaration")?;
        let atom = self
            .required(obj, path, "atom")
            .and_then(|v| self.atom(v, &path.field("atom")));
        let descr = self.optional_list(obj, path, "descr", Self::atom);
        let bounds = self.optional_list(obj, path, "bounds", |v, item, p| {
            v.list(item, p, Self::term)
        });
        let inclusion = self.optional_list(obj, path, "inclusion", Self::atom);
        Some(Decl {
            atom: atom?,
            descr: descr?,
            bounds: bounds?,
            inclusion: inclusion?,
        })
    }

    fn clause(&mut self, value: &Value, path: &FieldPath) -> Option<Clause> {
        let obj = self.object(value, path, "clause")?;
        let head = self
            .required(obj, path, "head")
            .and_then(|v| self.atom(v, &path.field("head")));
        let body = self.optional_list(obj, path, "body", Self::premise);
        let statements = self.optional_list(obj, path, "transform", Self::statement);

        let (head, body, statements) = (head?, body?, statements?);
        let transform = (!statements.is_empty()).then_some(Transform { statements });
        Some(Clause {
            head,
            body,
            transform,
        })
    }

    fn premise(&mut self, value: &Value, path: &FieldPath) -> Option<Premise> {
        let obj = self.object(value, path, "premise")?;
        let kind = self.string_field(obj, path, "kind")?;
        match kind {
            "atom" | "not" => {
                let atom = self
                    .required(obj, path, "atom")
                    .and_then(|v| self.atom(v, &path.field("atom")))?;
                Some(if kind == "atom" {
                    Premise::Positive(atom)
                } else {
                    Premise::Negated(atom)
                })
            }
            "eq" | "neq" | "cmp" => {
                let op = if kind == "cmp" {
                    match self.string_field(obj, path, "op") {
                        Some(name) => match CmpOp::from_name(name) {
                            Some(op) => Some(op),
                            None => {
                                self.error(
                                    &path.field("op"),
                                    format!("unknown comparison {name:?}; expected lt, le, gt or ge"),
                                );
                                None
                            }
                        },
                        None => None,
                    }
                } else {
                    None
                };
                let left = self
                    .required(obj, path, "left")
                    .and_then(|v| self.term(v, &path.field("left")));
                let right = self
                    .required(obj, path, "right")
                    .and_then(|v| self.term(v, &path.field("right")));
                let (left, right) = (left?, right?);
                match kind {
                    "eq" => Some(Premise::Eq(left, right)),
                    "neq" => Some(Premise::Neq(left, right)),
                    _ => Some(Premise::Cmp(op?, left, right)),
                }
            }
            other => {
                self.error(
                    &path.field("kind"),
                    format!("unknown premise kind {other:?}; expected atom, not, eq, neq or cmp"),
                );
                None
            }
        }
    }

    fn statement(&mut self, value: &Value, path: &FieldPath) -> Option<Statement> {
        let obj = self.object(value, path, "transform statement")?;
        let kind = self.string_field(obj, path, "kind")?;
        let target = match kind {
            "do" => Some(None),
            "let" => self.string_field(obj, path, "var").and_then(|var| {
                let field = path.field("var");
                if var == WILDCARD {
                    self.error(&field, "a let target must be a named variable, not _");
                    None
                } else if let Some(problem) = variable_problem(var) {
                    self.error(&field, problem);
                    None
                } else {
                    Some(Some(var.to_string()))
                }
            }),
            other => {
                self.error(
                    &path.field("kind"),
                    format!("unknown statement kind {other:?}; expected do or let"),
                );
                return None;
            }
        };
        let apply = self
            .required(obj, path, "apply")
            .and_then(|v| self.term(v, &path.field("apply")));
        let apply = match apply {
            Some(term @ Term::Apply { .. }) => Some(term),
            Some(_) => {
                self.error(&path.field("apply"), "transform statements must apply a fn: function");
                None
            }
            None => None,
        };
        Some(Statement {
            target: target?,
            apply: apply?,
        })
    }

    fn atom(&mut self, value: &Value, path: &FieldPath) -> Option<Atom> {
        let obj = self.object(value, path, "atom")?;
        let predicate = self.string_field(obj, path, "pred").and_then(|pred| {
            match predicate_problem(pred) {
                Some(problem) => {
                    self.error(&path.field("pred"), problem);
                    None
                }
                None => Some(pred.to_string()),
            }
        });
        let args = self.optional_list(obj, path, "args", Self::term);
        Some(Atom::new(predicate?, args?))
    }

    // ------------------------------------------------------------------------
    // Terms
    // ------------------------------------------------------------------------

    fn term(&mut self, value: &Value, path: &FieldPath) -> Option<Term> {
        let obj = self.object(value, path, "term")?;
        let tag = self.string_field(obj, path, "kind")?;
        let Some(kind) = TermKind::from_tag(tag) else {
            self.error(
                &path.field("kind"),
                format!(
                    "unknown term kind {tag:?}; expected var, name, string, bytes, number, float, apply, list, map or struct"
                ),
            );
            return None;
        };

        match kind {
            TermKind::Var => {
                let var = self.string_field(obj, path, "value")?;
                if let Some(problem) = variable_problem(var) {
                    self.error(&path.field("value"), problem);
                    return None;
                }
                Some(Term::Var(var.to_string()))
            }
            TermKind::Name => {
                let name = self.string_field(obj, path, "value")?;
                if !lexical::is_name_constant(name) {
                    self.error(
                        &path.field("value"),
                        format!(
                            "{name:?} is not a valid name; expected / followed by /-separated segments of [A-Za-z0-9_-]"
                        ),
                    );
                    return None;
                }
                Some(Term::Name(name.to_string()))
            }
            TermKind::Text => Some(Term::Text(self.string_field(obj, path, "value")?.to_string())),
            TermKind::Bytes => Some(Term::Bytes(
                self.string_field(obj, path, "value")?.as_bytes().to_vec(),
            )),
            TermKind::Number => {
                let (key, value) = self.numeric_field(obj, path, "number")?;
                self.integer(value, &path.field(key)).map(Term::Number)
            }
            TermKind::Float => {
                let (key, value) = self.numeric_field(obj, path, "float")?;
                self.float(value, &path.field(key)).map(Term::Float)
            }
            TermKind::Apply => self.apply(obj, path),
            TermKind::List => Some(Term::List(self.args(obj, path)?)),
            TermKind::Map | TermKind::Struct => {
                let args = self.args(obj, path)?;
                if args.len() % 2 != 0 {
                    self.error(
                        &path.field("args"),
                        format!(
                            "{} literals need key/value pairs (an even argument count), found {}",
                            kind.tag(),
                            args.len()
                        ),
                    );
                    return None;
                }
                Some(if kind == TermKind::Map {
                    Term::Map(args)
                } else {
                    Term::Struct(args)
                })
            }
        }
    }

    fn args(&mut self, obj: &Map<String, Value>, path: &FieldPath) -> Option<Vec<Term>> {
        self.optional_list(obj, path, "args", Self::term)
    }

    /// The numeric payload lives under its kind name, or under `value`
    fn numeric_field<'v>(
        &mut self,
        obj: &'v Map<String, Value>,
        path: &FieldPath,
        key: &'static str,
    ) -> Option<(&'static str, &'v Value)> {
        if let Some(value) = obj.get(key) {
            return Some((key, value));
        }
        if let Some(value) = obj.get("value") {
            return Some(("value", value));
        }
        self.error(&path.field(key), format!("missing required field {key:?}"));
        None
    }

    fn integer(&mut self, value: &Value, path: &FieldPath) -> Option<i64> {
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.error(path, format!("{value} is not a well-formed 64-bit integer"));
        }
        parsed
    }

    fn float(&mut self, value: &Value, path: &FieldPath) -> Option<f64> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(x) if x.is_finite() => Some(x),
            Some(_) => {
                self.error(path, format!("{value} is not a finite float"));
                None
            }
            None => {
                self.error(path, format!("{value} is not a well-formed float"));
                None
            }
        }
    }

    fn apply(&mut self, obj: &Map<String, Value>, path: &FieldPath) -> Option<Term> {
        let function = self.string_field(obj, path, "function").and_then(|name| {
            if lexical::is_function_name(name) {
                Some(name.to_string())
            } else {
                self.error(
                    &path.field("function"),
                    format!("{name:?} is not a valid function name; expected fn: followed by [a-z][A-Za-z0-9_]*"),
                );
                None
            }
        });
        let args = self.args(obj, path);
        let arity = match obj.get("arity") {
            None | Some(Value::Null) => Some(None),
            Some(value) => match value.as_u64().and_then(|a| usize::try_from(a).ok()) {
                Some(arity) => Some(Some(arity)),
                None => {
                    self.error(
                        &path.field("arity"),
                        format!("{value} is not a valid arity; expected a non-negative integer"),
                    );
                    None
                }
            },
        };
        let (function, args, arity) = (function?, args?, arity?);
        if let Some(expected) = arity {
            if expected != args.len() {
                self.error(
                    &path.field("args"),
                    format!(
                        "{function} declares arity {expected} but has {} argument(s)",
                        args.len()
                    ),
                );
                return None;
            }
        }
        Some(Term::Apply {
            function,
            args,
            arity,
        })
    }

    // ------------------------------------------------------------------------
    // Semantics
    // ------------------------------------------------------------------------

    fn semantics(&mut self, program: &Program) {
        let root = FieldPath::root("program");
        let arities = self.declarations(program, &root);
        self.arities(program, &root, arities);

        for (ci, clause) in program.clauses.iter().enumerate() {
            let path = root.field("clauses").index(ci);
            if clause.body.is_empty() && clause.transform.is_some() {
                self.error(&path.field("transform"), "a transform needs a non-empty body");
            }
            self.aggregate_placement(clause, &path);
            for violation in analysis::check_clause_safety(clause) {
                let at = match (&violation.location, &violation.reason) {
                    (
                        Location::Transform { statement },
                        SafetyReason::Rebound(_) | SafetyReason::GroupTarget(_),
                    ) => {
                        path.field("transform").index(*statement).field("var")
                    }
                    (Location::Head { arg }, _) => path.field("head").field("args").index(*arg),
                    (Location::Body { premise }, _) => path.field("body").index(*premise),
                    (Location::Transform { statement }, _) => {
                        path.field("transform").index(*statement)
                    }
                };
                self.error(&at, violation.to_string());
            }
        }

        if let Err(errors) = analysis::stratify(program) {
            for error in errors {
                self.diagnostics.push(Diagnostic::schema(error.path(), error.to_string()));
            }
        }
    }

    /// Declaration shape and uniqueness; returns the declared arities
    fn declarations(&mut self, program: &Program, root: &FieldPath) -> IndexMap<String, usize> {
        let mut declared: IndexMap<String, usize> = IndexMap::new();
        for (di, decl) in program.decls.iter().enumerate() {
            let path = root.field("decls").index(di).field("atom");
            let predicate = decl.predicate();

            if declared.contains_key(predicate) {
                self.error(
                    &path.field("pred"),
                    format!("predicate {predicate} is declared more than once"),
                );
                continue;
            }
            if let Some(existing) = self.registry.arity(predicate) {
                if existing != decl.arity() {
                    self.error(
                        &path.field("pred"),
                        format!(
                            "predicate {predicate} is already registered with arity {existing}, declared here with {}",
                            decl.arity()
                        ),
                    );
                }
            }

            let mut names = BTreeSet::new();
            for (ai, arg) in decl.atom.args.iter().enumerate() {
                match arg {
                    Term::Var(v) if !arg.is_wildcard() => {
                        if !names.insert(v.clone()) {
                            self.error(
                                &path.field("args").index(ai),
                                format!("declaration argument {v} appears more than once"),
                            );
                        }
                    }
                    _ => self.error(
                        &path.field("args").index(ai),
                        "declaration arguments must be distinct named variables",
                    ),
                }
            }
            for (bi, bound) in decl.bounds.iter().enumerate() {
                let bpath = root.field("decls").index(di).field("bounds").index(bi);
                if bound.len() != decl.arity() {
                    self.error(
                        &bpath,
                        format!(
                            "bound list has {} entries but {predicate} has {} arguments",
                            bound.len(),
                            decl.arity()
                        ),
                    );
                }
                for (ti, term) in bound.iter().enumerate() {
                    if !matches!(term, Term::Name(_)) {
                        self.error(&bpath.index(ti), "bounds must be type names such as /string");
                    }
                }
            }
            declared.insert(predicate.to_string(), decl.arity());
        }
        declared
    }

    fn arities(&mut self, program: &Program, root: &FieldPath, declared: IndexMap<String, usize>) {
        let mut expected = declared;
        let mut is_declared: IndexSet<String> = expected.keys().cloned().collect();
        for decl in self.registry.decls() {
            if !expected.contains_key(decl.predicate()) {
                expected.insert(decl.predicate().to_string(), decl.arity());
                is_declared.insert(decl.predicate().to_string());
            }
        }

        let mut check = |v: &mut Self, atom: &Atom, path: FieldPath| match expected.get(&atom.predicate) {
            Some(&arity) if arity != atom.arity() => {
                let origin = if is_declared.contains(&atom.predicate) {
                    "declared"
                } else {
                    "first used"
                };
                v.error(
                    &path,
                    format!(
                        "{} expects {arity} argument(s) ({origin}), found {}",
                        atom.predicate,
                        atom.arity()
                    ),
                );
            }
            Some(_) => {}
            None => {
                expected.insert(atom.predicate.clone(), atom.arity());
            }
        };

        for (di, decl) in program.decls.iter().enumerate() {
            for (ii, atom) in decl.inclusion.iter().enumerate() {
                let path = root.field("decls").index(di).field("inclusion").index(ii);
                check(self, atom, path);
            }
        }
        for (ci, clause) in program.clauses.iter().enumerate() {
            let path = root.field("clauses").index(ci);
            check(self, &clause.head, path.field("head"));
            for (pi, premise) in clause.body.iter().enumerate() {
                if let Some(atom) = premise.atom() {
                    check(self, atom, path.field("body").index(pi).field("atom"));
                }
            }
        }
    }

    /// Aggregates fold whole groups, so they only make sense as the top-level
    /// function of a transform statement
    fn aggregate_placement(&mut self, clause: &Clause, path: &FieldPath) {
        fn nested_aggregate(term: &Term) -> Option<&str> {
            match term {
                Term::Apply { function, args, .. } => {
                    if builtin::is_aggregating(function) {
                        Some(function.as_str())
                    } else {
                        args.iter().find_map(nested_aggregate)
                    }
                }
                Term::List(items) | Term::Map(items) | Term::Struct(items) => {
                    items.iter().find_map(nested_aggregate)
                }
                _ => None,
            }
        }

        let mut found: Vec<(FieldPath, String)> = Vec::new();
        for (ai, arg) in clause.head.args.iter().enumerate() {
            if let Some(f) = nested_aggregate(arg) {
                found.push((path.field("head").field("args").index(ai), f.to_string()));
            }
        }
        for (pi, premise) in clause.body.iter().enumerate() {
            let terms: Vec<&Term> = match premise {
                Premise::Positive(atom) | Premise::Negated(atom) => atom.args.iter().collect(),
                Premise::Eq(l, r) | Premise::Neq(l, r) | Premise::Cmp(_, l, r) => vec![l, r],
            };
            if let Some(f) = terms.into_iter().find_map(nested_aggregate) {
                found.push((path.field("body").index(pi), f.to_string()));
            }
        }
        if let Some(transform) = &clause.transform {
            for (si, stmt) in transform.statements.iter().enumerate() {
                if let Term::Apply { args, .. } = &stmt.apply {
                    if let Some(f) = args.iter().find_map(nested_aggregate) {
                        found.push((path.field("transform").index(si).field("apply"), f.to_string()));
                    }
                }
            }
        }
        for (at, function) in found {
            self.error(
                &at,
                format!("{function} is only allowed as the function of a transform statement"),
            );
        }
    }
}
