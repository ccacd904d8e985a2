//! Compile pipeline: extract, validate, render, verify
//!
//! ```text
//! caller text --extract--> JSON document --validate--> Program
//!     --render--> source text --parse + analyze + compare--> CompileOutput
//! ```
//!
//! Every stage is pure and the pipeline holds no mutable state, so a
//! [`Compiler`] can be shared between threads and a failed payload can be
//! retried as often as the caller likes.

use std::sync::Arc;

use serde::Serialize;

use crate::config::CompilerConfig;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::extract::Extractor;
use crate::ir::Program;
use crate::registry::SchemaRegistry;
use crate::render::{render_clause, render_decl, Render};
use crate::validate::validate_document;
use crate::verify::verify_round_trip;

/// Outcome of one compile
#[derive(Clone, Debug, Serialize)]
pub struct CompileOutput {
    pub ok: bool,
    /// The whole rendered program; empty when rendering never happened
    pub source: String,
    pub rendered_decls: Vec<String>,
    pub rendered_clauses: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// The verified program, present exactly when `ok`
    #[serde(skip)]
    pub program: Option<Program>,
}

impl CompileOutput {
    fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            ok: false,
            source: String::new(),
            rendered_decls: Vec::new(),
            rendered_clauses: Vec::new(),
            diagnostics,
            program: None,
        }
    }

    /// The verified program, or every diagnostic
    pub fn into_result(self) -> Result<Program, Vec<Diagnostic>> {
        match self.program {
            Some(program) if self.ok => Ok(program),
            _ => Err(self.diagnostics),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Shareable, stateless compiler
#[derive(Clone, Debug)]
pub struct Compiler {
    config: CompilerConfig,
    registry: Arc<SchemaRegistry>,
    extractor: Extractor,
}

impl Compiler {
    pub fn new(config: CompilerConfig, registry: Arc<SchemaRegistry>) -> Self {
        let extractor = config.extractor();
        Self {
            config,
            registry,
            extractor,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile raw caller text
    pub fn compile(&self, text: &str) -> CompileOutput {
        match self.extractor.extract_document(text) {
            Ok(doc) => self.compile_document(&doc),
            Err(e) => {
                tracing::warn!(error = %e, "payload extraction failed");
                CompileOutput::failed(vec![Diagnostic::new(
                    DiagnosticKind::Decode,
                    "payload",
                    e.to_string(),
                )])
            }
        }
    }

    /// Compile an already decoded document
    pub fn compile_document(&self, doc: &serde_json::Value) -> CompileOutput {
        match validate_document(doc, &self.config, &self.registry) {
            Ok(program) => self.compile_program(program),
            Err(diagnostics) => {
                tracing::warn!(count = diagnostics.len(), "payload failed validation");
                CompileOutput::failed(diagnostics)
            }
        }
    }

    /// Render and verify a program
    pub fn compile_program(&self, program: Program) -> CompileOutput {
        let render_config = self.config.render_config();
        let rendered_decls: Vec<String> = program
            .decls
            .iter()
            .map(|d| render_decl(d, &render_config))
            .collect();
        let rendered_clauses: Vec<String> = program.clauses.iter().map(render_clause).collect();

        let mut render = Render::with_config(render_config);
        render.program(&program);
        let source = render.finish();
        tracing::debug!(
            decls = rendered_decls.len(),
            clauses = rendered_clauses.len(),
            "rendered program"
        );

        match verify_round_trip(&source, &program) {
            Ok(verified) => {
                tracing::info!(strata = verified.analysis.strata.len(), "program compiled");
                CompileOutput {
                    ok: true,
                    source,
                    rendered_decls,
                    rendered_clauses,
                    diagnostics: Vec::new(),
                    program: Some(program),
                }
            }
            Err(diagnostics) => {
                tracing::warn!(count = diagnostics.len(), "rendered program failed verification");
                CompileOutput {
                    ok: false,
                    source,
                    rendered_decls,
                    rendered_clauses,
                    diagnostics,
                    program: None,
                }
            }
        }
    }
}
