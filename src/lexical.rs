//! Lexical classes of the rule language
//!
//! These predicates are the single source of truth for what the lexer
//! accepts; the validator checks payload strings against them so that
//! anything it lets through also lexes.

/// Prefix of the function-application namespace
pub const FUNCTION_PREFIX: &str = "fn:";

/// Leading character of a symbolic constant
pub const NAME_PREFIX: char = '/';

/// Words the lexer turns into keywords
pub const RESERVED_WORDS: &[&str] = &[
    "Package",
    "Use",
    "Decl",
    "descr",
    "bound",
    "inclusion",
    "do",
    "let",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `[a-z][A-Za-z0-9_]*`, excluding reserved words
pub fn is_predicate_symbol(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => chars.all(is_word_char) && !is_reserved(s),
        _ => false,
    }
}

/// `_` or `[A-Z][A-Za-z0-9_]*`, excluding reserved words
pub fn is_variable(s: &str) -> bool {
    if s == crate::ir::WILDCARD {
        return true;
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => chars.all(is_word_char) && !is_reserved(s),
        _ => false,
    }
}

fn is_name_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// `/seg(/seg)*` with segments of `[A-Za-z0-9_-]`
pub fn is_name_constant(s: &str) -> bool {
    match s.strip_prefix(NAME_PREFIX) {
        Some(rest) => rest
            .split(NAME_PREFIX)
            .all(|seg| !seg.is_empty() && seg.chars().all(is_name_segment_char)),
        None => false,
    }
}

/// `fn:` followed by `[a-z][A-Za-z0-9_]*`
pub fn is_function_name(s: &str) -> bool {
    match s.strip_prefix(FUNCTION_PREFIX) {
        Some(rest) => {
            let mut chars = rest.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_lowercase()) && chars.all(is_word_char)
        }
        None => false,
    }
}

/// Package and use names share the predicate grammar.
pub fn is_package_name(s: &str) -> bool {
    is_predicate_symbol(s)
}

/// Loose-path promotion of an untagged string to a symbolic constant.
///
/// A string becomes a name iff it already is a lexically valid name
/// (`"/alice"` stays `/alice`), or it is one bare word `[A-Za-z][A-Za-z0-9_]*`
/// with no whitespace or other punctuation (`"alice"` becomes `/alice`).
/// Every other string stays text. Tagged ingestion never calls this.
pub fn promote_loose_string(s: &str) -> Option<String> {
    if is_name_constant(s) {
        return Some(s.to_string());
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() && chars.all(is_word_char) => {
            Some(format!("{NAME_PREFIX}{s}"))
        }
        _ => None,
    }
}
