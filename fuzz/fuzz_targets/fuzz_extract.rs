//! Fuzz the compile pipeline on arbitrary author output
//!
//! Extraction, validation, rendering and verification should report
//! diagnostics for any input instead of panicking.

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use rulesmith::{Compiler, CompilerConfig, SchemaRegistry};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let compiler = Compiler::new(CompilerConfig::default(), Arc::new(SchemaRegistry::empty()));
        let output = compiler.compile(input);
        assert_eq!(output.ok, output.diagnostics.is_empty());
    }
});
