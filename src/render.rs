//! Renderer from IR to concrete syntax
//!
//! One rendering rule per IR node kind. Output is deterministic and parses
//! back (via [`crate::parse`]) to the same IR modulo arity hints.

use std::fmt::Write as _;

use crate::ir::*;

/// Render configuration
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Indentation for continuation lines of declarations
    pub indent: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { indent: 2 }
    }
}

/// A renderer with an output buffer
pub struct Render {
    output: String,
    config: RenderConfig,
}

impl Default for Render {
    fn default() -> Self {
        Self::new()
    }
}

impl Render {
    pub fn new() -> Self {
        Self::with_config(RenderConfig::default())
    }

    pub fn with_config(config: RenderConfig) -> Self {
        Self {
            output: String::new(),
            config,
        }
    }

    pub fn finish(self) -> String {
        self.output
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn newline(&mut self) {
        self.output.push('\n');
    }

    fn indent(&mut self) {
        for _ in 0..self.config.indent {
            self.output.push(' ');
        }
    }

    fn separated<T>(&mut self, items: &[T], sep: &str, mut each: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.write(sep);
            }
            each(self, item);
        }
    }
}

// ============ Rendering rules ============

impl Render {
    pub fn program(&mut self, program: &Program) {
        if let Some(package) = &program.package {
            self.write("Package ");
            self.write(package);
            self.write("!");
            self.newline();
        }
        for name in &program.uses {
            self.write("Use ");
            self.write(name);
            self.write("!");
            self.newline();
        }
        if (program.package.is_some() || !program.uses.is_empty()) && !program.is_empty() {
            self.newline();
        }
        for decl in &program.decls {
            self.decl(decl);
            self.newline();
        }
        if !program.decls.is_empty() && !program.clauses.is_empty() {
            self.newline();
        }
        for clause in &program.clauses {
            self.clause(clause);
            self.newline();
        }
    }

    pub fn decl(&mut self, decl: &Decl) {
        self.write("Decl ");
        self.atom(&decl.atom);
        if !decl.descr.is_empty() {
            self.newline();
            self.indent();
            self.write("descr [");
            self.separated(&decl.descr, ", ", |r, a| r.atom(a));
            self.write("]");
        }
        for bound in &decl.bounds {
            self.newline();
            self.indent();
            self.write("bound [");
            self.separated(bound, ", ", |r, t| r.term(t));
            self.write("]");
        }
        if !decl.inclusion.is_empty() {
            self.newline();
            self.indent();
            self.write("inclusion [");
            self.separated(&decl.inclusion, ", ", |r, a| r.atom(a));
            self.write("]");
        }
        self.write(".");
    }

    pub fn clause(&mut self, clause: &Clause) {
        self.atom(&clause.head);
        if !clause.body.is_empty() {
            self.write(" :- ");
            self.separated(&clause.body, ", ", |r, p| r.premise(p));
        }
        if let Some(transform) = &clause.transform {
            self.write(" |> ");
            self.transform(transform);
        }
        self.write(".");
    }

    pub fn premise(&mut self, premise: &Premise) {
        match premise {
            Premise::Positive(atom) => self.atom(atom),
            Premise::Negated(atom) => {
                self.write("!");
                self.atom(atom);
            }
            Premise::Eq(l, r) => self.binary(l, "=", r),
            Premise::Neq(l, r) => self.binary(l, "!=", r),
            Premise::Cmp(op, l, r) => self.binary(l, op.symbol(), r),
        }
    }

    fn binary(&mut self, left: &Term, op: &str, right: &Term) {
        self.term(left);
        self.write(" ");
        self.write(op);
        self.write(" ");
        self.term(right);
    }

    pub fn transform(&mut self, transform: &Transform) {
        self.separated(&transform.statements, ", ", |r, stmt| match &stmt.target {
            Some(target) => {
                r.write("let ");
                r.write(target);
                r.write(" = ");
                r.term(&stmt.apply);
            }
            None => {
                r.write("do ");
                r.term(&stmt.apply);
            }
        });
    }

    pub fn atom(&mut self, atom: &Atom) {
        self.write(&atom.predicate);
        self.write("(");
        self.separated(&atom.args, ", ", |r, t| r.term(t));
        self.write(")");
    }

    pub fn term(&mut self, term: &Term) {
        match term {
            Term::Var(v) => self.write(v),
            Term::Name(n) => self.write(n),
            Term::Text(s) => self.text(s),
            Term::Bytes(b) => self.bytes(b),
            Term::Number(n) => {
                let _ = write!(self.output, "{}", n);
            }
            // Debug formatting always carries a fraction or exponent and round-trips exactly
            Term::Float(x) => {
                let _ = write!(self.output, "{:?}", x);
            }
            Term::Apply { function, args, .. } => {
                self.write(function);
                self.write("(");
                self.separated(args, ", ", |r, t| r.term(t));
                self.write(")");
            }
            Term::List(items) => {
                self.write("[");
                self.separated(items, ", ", |r, t| r.term(t));
                self.write("]");
            }
            Term::Map(entries) if entries.is_empty() => self.write("[:]"),
            Term::Map(entries) => {
                self.write("[");
                self.entries(entries);
                self.write("]");
            }
            Term::Struct(entries) => {
                self.write("{");
                self.entries(entries);
                self.write("}");
            }
        }
    }

    fn entries(&mut self, flat: &[Term]) {
        for (i, pair) in flat.chunks(2).enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.term(&pair[0]);
            self.write(": ");
            if let Some(value) = pair.get(1) {
                self.term(value);
            }
        }
    }

    fn text(&mut self, s: &str) {
        self.output.push('"');
        for c in s.chars() {
            match c {
                '"' => self.write("\\\""),
                '\\' => self.write("\\\\"),
                '\n' => self.write("\\n"),
                '\t' => self.write("\\t"),
                '\r' => self.write("\\r"),
                '\0' => self.write("\\0"),
                c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                    let _ = write!(self.output, "\\x{:02x}", c as u32);
                }
                c => self.output.push(c),
            }
        }
        self.output.push('"');
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.write("b\"");
        for &b in bytes {
            match b {
                b'"' => self.write("\\\""),
                b'\\' => self.write("\\\\"),
                b'\n' => self.write("\\n"),
                b'\t' => self.write("\\t"),
                b'\r' => self.write("\\r"),
                0 => self.write("\\0"),
                0x20..=0x7e => self.output.push(char::from(b)),
                _ => {
                    let _ = write!(self.output, "\\x{:02x}", b);
                }
            }
        }
        self.output.push('"');
    }
}

/// Render a whole program with the default configuration
pub fn render_program(program: &Program) -> String {
    let mut r = Render::new();
    r.program(program);
    r.finish()
}

pub fn render_decl(decl: &Decl, config: &RenderConfig) -> String {
    let mut r = Render::with_config(config.clone());
    r.decl(decl);
    r.finish()
}

pub fn render_clause(clause: &Clause) -> String {
    let mut r = Render::new();
    r.clause(clause);
    r.finish()
}

pub fn render_atom(atom: &Atom) -> String {
    let mut r = Render::new();
    r.atom(atom);
    r.finish()
}

pub fn render_term(term: &Term) -> String {
    let mut r = Render::new();
    r.term(term);
    r.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_collections() {
        let term = Term::List(vec![
            Term::Map(vec![Term::name("/k"), Term::Number(1)]),
            Term::Map(vec![]),
            Term::Struct(vec![Term::name("/a"), Term::Text("x".into())]),
        ]);
        assert_eq!(render_term(&term), r#"[[/k: 1], [:], {/a: "x"}]"#);
    }

    #[test]
    fn renders_escapes() {
        assert_eq!(render_term(&Term::Text("a\"b\\\u{1}".into())), r#""a\"b\\\x01""#);
        assert_eq!(render_term(&Term::Bytes(vec![b'a', 0xff, 0])), r#"b"a\xff\0""#);
        assert_eq!(render_term(&Term::Float(1.0)), "1.0");
        assert_eq!(render_term(&Term::Float(-0.5)), "-0.5");
    }
}
