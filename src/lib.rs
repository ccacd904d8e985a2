//! Rulesmith: a compiler and runtime for a Datalog-style rule language
//!
//! Structured rule payloads (usually produced by an automated author) are
//! extracted from noisy text, validated field by field, rendered to concrete
//! syntax and verified by parsing the result back. Verified programs run
//! against a typed fact store, and derived facts can be explained as
//! derivation trees.

pub mod analysis;
pub mod builtin;
pub mod compile;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod error;
pub mod eval;
pub mod extract;
pub mod ir;
pub mod lexer;
pub mod lexical;
pub mod parser;
pub mod registry;
pub mod render;
pub mod session;
pub mod store;
pub mod trace;
pub mod unify;
pub mod validate;
pub mod value;
pub mod verify;

pub use compile::{CompileOutput, Compiler};
pub use config::{CompilerConfig, ConfigError};
pub use context::{Interrupted, QueryContext};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use error::ParseError;
pub use eval::{EvalError, Evaluator, NaiveEvaluator};
pub use extract::{extract_payload, ExtractError, Extractor};
pub use ir::*;
pub use registry::{RuleBook, SchemaError, SchemaRegistry, TypeMismatch};
pub use render::render_program;
pub use session::{Session, SessionError};
pub use store::{FactSet, FactStore, QueryError, StoreError};
pub use trace::{Derivation, Provenance, TraceError, Tracer};
pub use unify::Bindings;
pub use value::{Fact, TypedValue, Value, ValueError};

use chumsky::error::Simple;
use chumsky::{Parser, Stream};

/// Lex and parse `input` with `parser`
fn parse_with<T>(
    input: &str,
    parser: impl Parser<lexer::Token, T, Error = Simple<lexer::Token>>,
) -> Result<T, ParseError> {
    let tokens = lexer::lexer()
        .parse(input)
        .map_err(|errs| ParseError::Lex(error::format_lexer_errors(input, errs)))?;

    let len = input.chars().count();
    parser
        .parse(Stream::from_iter(len..len + 1, tokens.into_iter()))
        .map_err(|errs| ParseError::Parse(error::format_parser_errors(input, errs)))
}

/// Parse rule source into a program
pub fn parse(input: &str) -> Result<Program, ParseError> {
    parse_with(input, parser::parser())
}

/// Parse a single query atom such as `reachable(/a, X)`
pub fn parse_query(input: &str) -> Result<Atom, ParseError> {
    parse_with(input, parser::query_parser())
}
