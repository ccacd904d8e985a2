//! Payload extraction from noisy caller text
//!
//! Callers wrap documents in prose, markdown fences, envelope objects and
//! sometimes encode them twice. Extraction is staged:
//!
//! 1. strip an enclosing fenced code block
//! 2. find the first balanced `{...}` object that decodes as JSON (braces
//!    inside string literals do not count; stray braces in prose are skipped)
//! 3. a document (an object with `format` or `program`) is returned as is
//! 4. otherwise look for a known envelope field holding the document, either
//!    as a nested object or as a string (possibly fenced, possibly encoded
//!    again), and recurse into it
//!
//! Nothing here allocates partial results: the output is either a complete
//! JSON object string or an [`ExtractError`].

use serde_json::Value;
use thiserror::Error;

/// Envelope fields tried, in order, when the decoded object is not a document
pub const DEFAULT_ENVELOPE_FIELDS: &[&str] =
    &["surface_response", "response", "content", "output", "text", "payload"];

/// Keys that mark an object as a document
const DOCUMENT_KEYS: &[&str] = &["format", "program"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("empty input")]
    Empty,
    #[error("no structured payload found")]
    NoObject,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("envelopes nested deeper than {0} levels")]
    EnvelopeTooDeep(usize),
}

/// Configurable extractor; [`extract_payload`] uses the defaults.
#[derive(Clone, Debug)]
pub struct Extractor {
    envelope_fields: Vec<String>,
    max_depth: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            envelope_fields: DEFAULT_ENVELOPE_FIELDS.iter().map(|s| s.to_string()).collect(),
            max_depth: 4,
        }
    }
}

impl Extractor {
    pub fn new(envelope_fields: Vec<String>, max_depth: usize) -> Self {
        Self {
            envelope_fields,
            max_depth,
        }
    }

    /// Extract the document as a JSON object string
    pub fn extract(&self, text: &str) -> Result<String, ExtractError> {
        let doc = self.extract_document(text)?;
        serde_json::to_string(&doc).map_err(|e| ExtractError::Malformed(e.to_string()))
    }

    /// Extract and decode the document
    pub fn extract_document(&self, text: &str) -> Result<Value, ExtractError> {
        self.extract_at_depth(text, 0)
    }

    fn extract_at_depth(&self, text: &str, depth: usize) -> Result<Value, ExtractError> {
        if depth > self.max_depth {
            return Err(ExtractError::EnvelopeTooDeep(self.max_depth));
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ExtractError::Empty);
        }

        // A doubly encoded payload arrives as one JSON string literal
        if trimmed.starts_with('"') {
            if let Ok(Value::String(inner)) = serde_json::from_str::<Value>(trimmed) {
                return self.extract_at_depth(&inner, depth + 1);
            }
        }

        let body = enclosing_fence(trimmed).unwrap_or(trimmed);
        let decoded = decode_object(body)?;

        match self.unwrap_envelope(&decoded, depth)? {
            Some(inner) => Ok(inner),
            None => Ok(decoded),
        }
    }

    /// `Ok(None)` when the object is itself the document (or nothing better is found)
    fn unwrap_envelope(&self, decoded: &Value, depth: usize) -> Result<Option<Value>, ExtractError> {
        let Value::Object(map) = decoded else {
            return Ok(None);
        };
        if DOCUMENT_KEYS.iter().any(|k| map.contains_key(*k)) {
            return Ok(None);
        }
        for field in &self.envelope_fields {
            match map.get(field) {
                Some(Value::String(inner)) => match self.extract_at_depth(inner, depth + 1) {
                    Ok(doc) => {
                        tracing::debug!(field = %field, depth, "unwrapped envelope string");
                        return Ok(Some(doc));
                    }
                    Err(ExtractError::EnvelopeTooDeep(n)) => {
                        return Err(ExtractError::EnvelopeTooDeep(n))
                    }
                    Err(err) => {
                        tracing::debug!(field = %field, error = %err, "envelope string holds no document");
                        continue;
                    }
                },
                Some(inner @ Value::Object(_)) => {
                    if depth + 1 > self.max_depth {
                        return Err(ExtractError::EnvelopeTooDeep(self.max_depth));
                    }
                    return Ok(Some(
                        self.unwrap_envelope(inner, depth + 1)?
                            .unwrap_or_else(|| inner.clone()),
                    ));
                }
                _ => continue,
            }
        }
        Ok(None)
    }
}

/// Extract with the default envelope fields
pub fn extract_payload(text: &str) -> Result<String, ExtractError> {
    Extractor::default().extract(text)
}

/// A fence only encloses the payload when it opens before the first brace;
/// fences appearing later sit inside string values of an envelope.
fn enclosing_fence(text: &str) -> Option<&str> {
    let fence = text.find("```")?;
    match text.find('{') {
        Some(brace) if brace < fence => None,
        _ => strip_fence(text),
    }
}

/// Interior of the first fenced code block, if the text has one.
/// An unterminated fence yields everything after its opening line.
pub fn strip_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_ticks = &text[open + 3..];
    // The rest of the opening line is the language tag
    let interior_start = match after_ticks.find('\n') {
        Some(nl) => nl + 1,
        None => return None,
    };
    let interior = &after_ticks[interior_start..];
    match interior.find("```") {
        Some(close) => Some(&interior[..close]),
        None => Some(interior),
    }
}

/// The first balanced `{...}` in `text`, skipping braces inside string literals.
pub fn find_object(text: &str) -> Option<&str> {
    object_span(text, 0).map(|(start, end)| &text[start..end])
}

/// Decode the first balanced object that is valid JSON.
///
/// Prose can hold braces of its own (`the {name} style`), so a candidate
/// that does not decode is skipped whole and the scan resumes after it.
/// `Malformed` carries the error of the first candidate.
fn decode_object(text: &str) -> Result<Value, ExtractError> {
    let mut from = 0;
    let mut first_error = None;
    while let Some((start, end)) = object_span(text, from) {
        match serde_json::from_str(&text[start..end]) {
            Ok(decoded) => return Ok(decoded),
            Err(e) => {
                tracing::debug!(offset = start, error = %e, "skipping undecodable object");
                first_error.get_or_insert_with(|| e.to_string());
                from = end;
            }
        }
    }
    Err(first_error.map_or(ExtractError::NoObject, ExtractError::Malformed))
}

/// Byte range of the first balanced object starting at or after `from`
fn object_span(text: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut search_from = from;

    while let Some(offset) = text.get(search_from..)?.find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((start, i + 1));
                    }
                }
                _ => {}
            }
        }
        // Unbalanced from here; try the next opening brace
        search_from = start + 1;
    }
    None
}
