//! Parse error formatting
//!
//! Provides user-friendly error messages using ariadne for nice formatting.
//! The rendered reports travel back to the caller inside diagnostics, so the
//! output is plain text (no colors).

use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::prelude::Simple;
use std::ops::Range;
use thiserror::Error;

use crate::lexer::Token;

/// A lexing or parsing failure, with the rendered ariadne report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("lexical error:\n{0}")]
    Lex(String),
    #[error("parse error:\n{0}")]
    Parse(String),
}

fn report_config() -> Config {
    Config::default().with_color(false)
}

fn write_report(source: &str, report: Report<'_, Range<usize>>, output: &mut Vec<u8>) {
    if report.write(Source::from(source), &mut *output).is_err() {
        output.extend_from_slice(b"<unprintable report>\n");
    }
}

/// Format lexer errors into a user-friendly string
pub fn format_lexer_errors(source: &str, errors: Vec<Simple<char>>) -> String {
    let mut output = Vec::new();

    for error in errors {
        let span = error.span();
        let report = Report::build(ReportKind::Error, (), span.start)
            .with_config(report_config())
            .with_message("Lexical error")
            .with_label(Label::new(span.clone()).with_message(format_lexer_error(&error)))
            .finish();
        write_report(source, report, &mut output);
    }

    String::from_utf8(output).unwrap_or_else(|_| "Error formatting failed".to_string())
}

/// Format a single lexer error into a readable message
fn format_lexer_error(error: &Simple<char>) -> String {
    let found = error
        .found()
        .map(|c| format!("'{}'", c))
        .unwrap_or_else(|| "end of input".to_string());

    if let chumsky::error::SimpleReason::Custom(msg) = error.reason() {
        return msg.clone();
    }

    if error.expected().next().is_some() {
        format!(
            "Unexpected {}, expected {}",
            found,
            format_char_set(error.expected())
        )
    } else {
        format!("Unexpected character {}", found)
    }
}

/// Format parser errors into a user-friendly string
///
/// Token streams are built with character spans, so error spans are already
/// character positions; the end-of-input span is clamped into the source.
pub fn format_parser_errors(source: &str, errors: Vec<Simple<Token>>) -> String {
    let mut output = Vec::new();

    for error in errors {
        let span = error.span();
        let start = span.start.min(source.len());
        let end = span.end.min(source.len()).max(start);
        let char_span = start..end;

        let report = Report::build(ReportKind::Error, (), char_span.start)
            .with_config(report_config())
            .with_message("Parse error")
            .with_label(Label::new(char_span).with_message(format_parser_error(&error)))
            .finish();
        write_report(source, report, &mut output);
    }

    String::from_utf8(output).unwrap_or_else(|_| "Error formatting failed".to_string())
}

/// Format a single parser error into a readable message
fn format_parser_error(error: &Simple<Token>) -> String {
    use chumsky::error::SimpleReason;

    let found = error
        .found()
        .map(|t| format!("'{}'", t))
        .unwrap_or_else(|| "end of input".to_string());

    // Check for custom error messages first (from Simple::custom())
    if let SimpleReason::Custom(msg) = error.reason() {
        return msg.clone();
    }

    let expected = format_token_set(error.expected());

    if !expected.is_empty() {
        let expected_str = expected.join(", ");

        // Detect common mistakes
        if error.found() == Some(&Token::Dot) && expected.contains(&"')'".to_string()) {
            return "Clause ended before the argument list was closed".to_string();
        }

        if expected.contains(&"'.'".to_string()) && error.found().is_none() {
            return "Expected '.' to end the clause".to_string();
        }

        format!("Unexpected {}, expected one of: {}", found, expected_str)
    } else if let Some(label) = error.label() {
        label.to_string()
    } else {
        format!("Unexpected token {}", found)
    }
}

/// Format a set of expected tokens
fn format_token_set<'a>(expected: impl Iterator<Item = &'a Option<Token>>) -> Vec<String> {
    let mut tokens: Vec<String> = expected
        .filter_map(|opt| opt.as_ref())
        .map(|t| format!("'{}'", t))
        .collect();
    tokens.sort();
    tokens
}

/// Format a set of expected characters
fn format_char_set<'a>(expected: impl Iterator<Item = &'a Option<char>>) -> String {
    let chars: Vec<String> = expected
        .filter_map(|opt| opt.as_ref())
        .map(|c| format!("'{}'", c))
        .collect();

    if chars.is_empty() {
        "valid character".to_string()
    } else if chars.len() == 1 {
        chars[0].clone()
    } else {
        chars.join(" or ")
    }
}
