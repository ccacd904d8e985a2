//! Parser for the rule language
//!
//! Parses token streams into the IR. This is the grammar the round-trip
//! verifier holds rendered programs against.

use chumsky::prelude::*;

use crate::ir::*;
use crate::lexer::Token;

/// Create a parser for a complete program
pub fn parser() -> impl Parser<Token, Program, Error = Simple<Token>> + Clone {
    let package = just(Token::Package)
        .ignore_then(ident())
        .then_ignore(just(Token::Bang));
    let uses = just(Token::Use)
        .ignore_then(ident())
        .then_ignore(just(Token::Bang))
        .repeated();
    let item = choice((decl().map(Item::Decl), clause().map(Item::Clause)));

    package
        .or_not()
        .then(uses)
        .then(item.repeated())
        .then_ignore(end())
        .map(|((package, uses), items)| {
            let mut program = Program {
                package,
                uses,
                ..Program::default()
            };
            for item in items {
                match item {
                    Item::Decl(decl) => program.decls.push(decl),
                    Item::Clause(clause) => program.clauses.push(clause),
                }
            }
            program
        })
}

/// Create a parser for a single query atom, e.g. `reachable(/a, X)`.
/// A trailing `.` is accepted.
pub fn query_parser() -> impl Parser<Token, Atom, Error = Simple<Token>> + Clone {
    atom()
        .then_ignore(just(Token::Dot).or_not())
        .then_ignore(end())
}

#[derive(Clone)]
enum Item {
    Decl(Decl),
    Clause(Clause),
}

// ============================================================================
// Helpers
// ============================================================================

fn ident() -> impl Parser<Token, String, Error = Simple<Token>> + Clone {
    select! { Token::Ident(s) => s }
}

fn variable() -> impl Parser<Token, String, Error = Simple<Token>> + Clone {
    select! { Token::Variable(s) => s }
}

fn bracketed<T>(
    item: impl Parser<Token, T, Error = Simple<Token>> + Clone,
) -> impl Parser<Token, Vec<T>, Error = Simple<Token>> + Clone {
    item.separated_by(just(Token::Comma))
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
}

/// Flatten `k: v` entries into the key, value, key, value layout of the IR
fn flatten_entries(entries: Vec<(Term, Term)>) -> Vec<Term> {
    entries
        .into_iter()
        .flat_map(|(key, value)| [key, value])
        .collect()
}

// ============================================================================
// Terms
// ============================================================================

fn term() -> impl Parser<Token, Term, Error = Simple<Token>> + Clone {
    recursive(|term| {
        let scalar = select! {
            Token::Variable(v) => Term::Var(v),
            Token::Name(n) => Term::Name(n),
            Token::Str(s) => Term::Text(s),
            Token::Bytes(b) => Term::Bytes(b),
        };

        let number = select! { Token::Number(n) => n }.try_map(|n: String, span| {
            n.parse::<i64>()
                .map(Term::Number)
                .map_err(|e| Simple::custom(span, format!("invalid integer {n}: {e}")))
        });

        let float = select! { Token::Float(f) => f }.try_map(|f: String, span| {
            match f.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Term::Float(value)),
                Ok(_) => Err(Simple::custom(span, format!("float {f} is out of range"))),
                Err(e) => Err(Simple::custom(span, format!("invalid float {f}: {e}"))),
            }
        });

        let args = term
            .clone()
            .separated_by(just(Token::Comma))
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let apply = select! { Token::FnName(f) => f }
            .then(args)
            .map(|(function, args)| Term::Apply {
                function,
                args,
                arity: None,
            });

        let entry = term
            .clone()
            .then_ignore(just(Token::Colon))
            .then(term.clone());

        // `[:]` is the empty map; `[]` is the empty list
        let empty_map = just(Token::LBracket)
            .ignore_then(just(Token::Colon))
            .ignore_then(just(Token::RBracket))
            .to(Term::Map(Vec::new()));

        let map = entry
            .clone()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(|entries| Term::Map(flatten_entries(entries)));

        let list = bracketed(term.clone()).map(Term::List);

        let structure = entry
            .separated_by(just(Token::Comma))
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map(|entries| Term::Struct(flatten_entries(entries)));

        choice((scalar, number, float, apply, empty_map, map, list, structure))
    })
}

fn apply() -> impl Parser<Token, Term, Error = Simple<Token>> + Clone {
    term().try_map(|t, span| match t {
        Term::Apply { .. } => Ok(t),
        _ => Err(Simple::custom(span, "expected a function application")),
    })
}

// ============================================================================
// Atoms, premises, clauses
// ============================================================================

fn atom() -> impl Parser<Token, Atom, Error = Simple<Token>> + Clone {
    ident()
        .then(
            term()
                .separated_by(just(Token::Comma))
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map(|(predicate, args)| Atom { predicate, args })
}

#[derive(Clone)]
enum BinOp {
    Eq,
    Neq,
    Cmp(CmpOp),
}

fn premise() -> impl Parser<Token, Premise, Error = Simple<Token>> + Clone {
    let negated = just(Token::Bang).ignore_then(atom()).map(Premise::Negated);
    let positive = atom().map(Premise::Positive);

    let op = select! {
        Token::Eq => BinOp::Eq,
        Token::Neq => BinOp::Neq,
        Token::Lt => BinOp::Cmp(CmpOp::Lt),
        Token::Le => BinOp::Cmp(CmpOp::Le),
        Token::Gt => BinOp::Cmp(CmpOp::Gt),
        Token::Ge => BinOp::Cmp(CmpOp::Ge),
    };

    let binary = term()
        .then(op)
        .then(term())
        .map(|((left, op), right)| match op {
            BinOp::Eq => Premise::Eq(left, right),
            BinOp::Neq => Premise::Neq(left, right),
            BinOp::Cmp(op) => Premise::Cmp(op, left, right),
        });

    choice((negated, positive, binary))
}

fn statement() -> impl Parser<Token, Statement, Error = Simple<Token>> + Clone {
    let do_stmt = just(Token::Do)
        .ignore_then(apply())
        .map(|apply| Statement {
            target: None,
            apply,
        });
    let let_stmt = just(Token::Let)
        .ignore_then(variable())
        .then_ignore(just(Token::Eq))
        .then(apply())
        .map(|(target, apply)| Statement {
            target: Some(target),
            apply,
        });
    do_stmt.or(let_stmt)
}

fn clause() -> impl Parser<Token, Clause, Error = Simple<Token>> + Clone {
    let transform = just(Token::Pipe).ignore_then(
        statement()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .map(|statements| Transform { statements }),
    );

    let body = just(Token::ColonDash)
        .ignore_then(premise().separated_by(just(Token::Comma)).at_least(1))
        .then(transform.or_not());

    atom()
        .then(body.or_not())
        .then_ignore(just(Token::Dot))
        .map(|(head, rest)| match rest {
            Some((body, transform)) => Clause {
                head,
                body,
                transform,
            },
            None => Clause {
                head,
                body: Vec::new(),
                transform: None,
            },
        })
}

fn decl() -> impl Parser<Token, Decl, Error = Simple<Token>> + Clone {
    just(Token::Decl)
        .ignore_then(atom())
        .then(just(Token::Descr).ignore_then(bracketed(atom())).or_not())
        .then(just(Token::Bound).ignore_then(bracketed(term())).repeated())
        .then(just(Token::Inclusion).ignore_then(bracketed(atom())).or_not())
        .then_ignore(just(Token::Dot))
        .map(|(((atom, descr), bounds), inclusion)| Decl {
            atom,
            descr: descr.unwrap_or_default(),
            bounds,
            inclusion: inclusion.unwrap_or_default(),
        })
}
