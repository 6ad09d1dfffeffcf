// src/error.rs
//
// =============================================================================
// SHADERGRAPH: RUNTIME ERROR TAXONOMY
// =============================================================================
//
// Errors raised by the evaluator, the interpreter, the rasterizer and both
// code generators. The static validator does NOT use this type: it
// accumulates `ValidationError` records instead of failing early.

use thiserror::Error;

/// Any error raised after validation. Variants carry the offending node id
/// when it is known at the raise site.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecError {
    // --- Referential ---
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown resource '{0}'")]
    UnknownResource(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    // --- Type ---
    #[error("unknown op '{op}' on node '{node}'")]
    UnknownOp { node: String, op: String },
    #[error("type mismatch on node '{node}': expected {expected}, found {found}")]
    TypeMismatch {
        node: String,
        expected: String,
        found: String,
    },
    #[error("missing required argument '{key}' on node '{node}'")]
    MissingArgument { node: String, key: String },

    // --- Bounds ---
    #[error("buffer_load OOB: index {index} out of range for '{buffer}' (len {len})")]
    BufferLoadOob {
        buffer: String,
        index: i64,
        len: usize,
    },
    #[error("buffer_store OOB: index {index} out of range for '{buffer}' (len {len})")]
    BufferStoreOob {
        buffer: String,
        index: i64,
        len: usize,
    },
    #[error("negative index {index} on node '{node}'")]
    NegativeIndex { node: String, index: i64 },
    #[error("array index {index} out of range (len {len})")]
    ArrayOob { index: i64, len: usize },

    // --- Runtime ---
    #[error("Recursion detected: function '{0}' is already on the evaluation stack")]
    Recursion(String),
    #[error("Cannot marshal string to shader input '{0}'")]
    StringMarshal(String),
    #[error("read of uninitialized variable '{0}'")]
    UninitializedVariable(String),
    #[error("singular matrix cannot be inverted")]
    SingularMatrix,
    #[error("Invalid constant name '{0}'")]
    InvalidConstant(String),
    #[error("loop on node '{node}' exceeded the iteration budget ({budget})")]
    LoopBudget { node: String, budget: u64 },
    #[error("runtime error on node '{node}': {message}")]
    Runtime { node: String, message: String },

    // --- Pipeline ---
    #[error("unsupported topology '{0}': only triangle-list is rasterized")]
    UnsupportedTopology(String),
    #[error("draw call is missing its {0} function")]
    MissingStage(String),
}

impl ExecError {
    /// Attach a node id to errors raised below the node layer.
    pub fn at_node(self, node: &str) -> ExecError {
        match self {
            ExecError::Runtime { node: n, message } if n.is_empty() => ExecError::Runtime {
                node: node.to_string(),
                message,
            },
            ExecError::TypeMismatch {
                node: n,
                expected,
                found,
            } if n.is_empty() => ExecError::TypeMismatch {
                node: node.to_string(),
                expected,
                found,
            },
            other => other,
        }
    }
}
