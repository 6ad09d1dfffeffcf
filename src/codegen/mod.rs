// src/codegen/mod.rs
//
// =============================================================================
// SHADERGRAPH: CODE GENERATORS
// =============================================================================
//
// Two backends over one execution-graph visitor: `host` emits JavaScript
// driver text for the CPU orchestrator, `shader` emits WGSL per shader
// function. The visitor owns the block structure (if/else for flow_branch,
// for loops for flow_loop with the continuation emitted after the loop);
// backends own statements and expression grammar.

pub mod host;
pub mod shader;

pub use host::compile_host;
pub use shader::{compile_shaders, ShaderOptions};

use crate::error::ExecError;
use crate::graph::FunctionGraph;
use crate::ir::Node;
use std::collections::VecDeque;

/// Indented text sink shared by both backends.
pub(crate) struct CodeWriter {
    buf: String,
    indent: usize,
}

impl CodeWriter {
    pub(crate) fn new() -> CodeWriter {
        CodeWriter {
            buf: String::new(),
            indent: 0,
        }
    }

    pub(crate) fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.buf.push_str("  ");
        }
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.buf.push('\n');
    }

    pub(crate) fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.indent += 1;
    }

    pub(crate) fn close(&mut self, text: impl AsRef<str>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    pub(crate) fn finish(self) -> String {
        self.buf
    }
}

/// Backend hooks for the shared flow visitor. Both target grammars use
/// C-style blocks, so only conditions, loop headers and statements differ.
pub(crate) trait FlowBackend {
    /// Emit one non-flow executable node as a statement.
    fn statement(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
        w: &mut CodeWriter,
    ) -> Result<(), ExecError>;

    /// The branch condition expression, already coerced to the target's
    /// boolean convention.
    fn branch_condition(&mut self, graph: &FunctionGraph, node: &Node)
        -> Result<String, ExecError>;

    /// (start, end) loop bound expressions.
    fn loop_bounds(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
    ) -> Result<(String, String), ExecError>;

    /// The `for` header introducing the induction variable.
    fn loop_header(&self, var: &str, start: &str, end: &str) -> String;
}

/// Walk the execution graph from `seed`, emitting straight-line statements
/// and block-structured control flow.
pub(crate) fn emit_flow<B: FlowBackend>(
    backend: &mut B,
    graph: &FunctionGraph,
    seed: Vec<&Node>,
    w: &mut CodeWriter,
) -> Result<(), ExecError> {
    let mut queue: VecDeque<&Node> = seed.into();
    while let Some(node) = queue.pop_front() {
        match node.op.as_str() {
            "flow_branch" => {
                let cond = backend.branch_condition(graph, node)?;
                w.open(format!("if ({cond}) {{"));
                emit_flow(backend, graph, graph.exec_successors(&node.id, "exec_true"), w)?;
                let false_side = graph.exec_successors(&node.id, "exec_false");
                if false_side.is_empty() {
                    w.close("}");
                } else {
                    w.close("} else {");
                    w.indent += 1;
                    emit_flow(backend, graph, false_side, w)?;
                    w.close("}");
                }
            }
            "flow_loop" => {
                let (start, end) = backend.loop_bounds(graph, node)?;
                let var = format!("loop_{}", node.id);
                w.open(backend.loop_header(&var, &start, &end));
                emit_flow(backend, graph, graph.exec_successors(&node.id, "exec_body"), w)?;
                w.close("}");
                // the continuation runs after the loop completes
                emit_flow(
                    backend,
                    graph,
                    graph.exec_successors(&node.id, "exec_completed"),
                    w,
                )?;
            }
            _ => {
                backend.statement(graph, node, w)?;
                for successor in graph.exec_successors(&node.id, "exec_out") {
                    queue.push_back(successor);
                }
            }
        }
    }
    Ok(())
}

/// Escape a string for inclusion in double quotes in either grammar.
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
