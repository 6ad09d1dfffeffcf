// src/validate/mod.rs
//
// =============================================================================
// SHADERGRAPH: STATIC VALIDATOR
// =============================================================================
//
// Three ordered passes over a parsed document:
//   1. structural  - shapes, enums, type strings, size/persistence blocks
//   2. referential - duplicate ids, entry point, dangling references, cycles
//   3. static logic - argument resolution, type inference, overload selection
//
// Errors accumulate across the whole document; the validator never throws.
// A function rejected by pass 2 is skipped by pass 3 rather than producing
// cascading noise.

mod refs;
mod structure;
mod typing;

use crate::ir::IrDocument;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Error codes surfaced to callers. The strings are part of the contract.
pub mod codes {
    pub const STRUCTURAL: &str = "Structural";
    pub const DUPLICATE_ID: &str = "Duplicate Id";
    pub const UNKNOWN_REFERENCE: &str = "Unknown Reference";
    pub const UNKNOWN_TYPE: &str = "Unknown Type";
    pub const BAD_EDGE: &str = "Bad Edge";
    pub const ENTRY_POINT: &str = "Entry Point";
    pub const STRUCT_RECURSION: &str = "Struct Recursion";
    pub const RECURSIVE_CALLS: &str = "Recursive call graph";
    pub const UNKNOWN_OP: &str = "Unknown Op";
    pub const TYPE_MISMATCH: &str = "Type Mismatch";
    pub const MISSING_ARGUMENT: &str = "Missing required argument";
    pub const NEGATIVE_INDEX: &str = "Invalid Negative Index";
    pub const STATIC_OOB: &str = "Static OOB Access";
    pub const INVALID_CONSTANT: &str = "Invalid constant name";
    pub const UNSUPPORTED: &str = "Unsupported";
    pub const CYCLIC_DATA: &str = "Cyclic data dependency";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    /// JSON-pointer-ish location of the offending field, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
    pub code: &'static str,
    pub severity: Severity,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(node) = &self.node_id {
            write!(f, " (node '{node}')")?;
        }
        if let Some(path) = &self.path {
            write!(f, " at {path}")?;
        }
        Ok(())
    }
}

/// Outcome of `validate`. The document is valid iff no `Error`-severity
/// entry was emitted.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn ok(&self) -> bool {
        !self.errors.iter().any(|e| e.severity == Severity::Error)
    }

    pub fn errors_with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.errors.iter().filter(move |e| e.code == code)
    }
}

/// Accumulator threaded through the passes.
pub(crate) struct Collector {
    errors: Vec<ValidationError>,
    /// Functions rejected by pass 2; pass 3 skips them.
    pub(crate) poisoned_functions: HashSet<String>,
}

impl Collector {
    fn new() -> Self {
        Self {
            errors: Vec::new(),
            poisoned_functions: HashSet::new(),
        }
    }

    pub(crate) fn error(
        &mut self,
        code: &'static str,
        message: impl Into<String>,
        path: Option<String>,
        node_id: Option<String>,
    ) {
        self.errors.push(ValidationError {
            path,
            node_id,
            message: message.into(),
            code,
            severity: Severity::Error,
        });
    }

    pub(crate) fn warning(
        &mut self,
        code: &'static str,
        message: impl Into<String>,
        path: Option<String>,
        node_id: Option<String>,
    ) {
        self.errors.push(ValidationError {
            path,
            node_id,
            message: message.into(),
            code,
            severity: Severity::Warning,
        });
    }

}

/// Run all passes over a document. Pass 1 poisons substructures it rejects
/// so the later passes skip them instead of cascading.
pub fn validate(doc: &IrDocument) -> ValidationResult {
    let mut collector = Collector::new();

    structure::check(doc, &mut collector);
    refs::check(doc, &mut collector);
    typing::check(doc, &mut collector);

    log::debug!(
        "validated '{}': {} finding(s)",
        doc.meta.name,
        collector.errors.len()
    );
    ValidationResult {
        errors: collector.errors,
    }
}
