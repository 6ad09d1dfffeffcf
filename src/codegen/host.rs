// src/codegen/host.rs
//
// JavaScript driver emission for a CPU function. The generated text runs
// against an evaluation harness (`ctx`, `resources`, `globals`) and defers
// all op-level math to `globals.callOp`, which is backed by the same op
// evaluator the interpreter uses. That delegation is what keeps the two in
// semantic lockstep.
//
// Naming contract:
//   l_<id>     locally-scoped bindings for declared local vars
//   r_<id>     result bindings for executable-returning nodes
//   loop_<id>  induction variable of a flow_loop node

use super::{emit_flow, quote, CodeWriter, FlowBackend};
use crate::error::ExecError;
use crate::graph::FunctionGraph;
use crate::ir::{is_reserved_key, FunctionDef, IrDocument, IrType, Node};
use crate::value::RuntimeValue;
use serde_json::Value as Json;

/// Emit driver source for one validated CPU function.
pub fn compile_host(func: &FunctionDef, ir: &IrDocument) -> Result<String, ExecError> {
    let graph = FunctionGraph::build(func)?;
    let mut backend = HostBackend { ir, func };
    let mut w = CodeWriter::new();

    w.open(format!("function driver_{}(ctx, resources, globals) {{", func.id));
    for var in &func.local_vars {
        let init = match &var.initial_value {
            Some(v) => v.to_string(),
            None => zero_literal(&var.ty, ir)?,
        };
        w.line(format!("let l_{} = {};", var.id, init));
    }
    if !func.local_vars.is_empty() {
        w.blank();
    }
    emit_flow(&mut backend, &graph, graph.entry_nodes(), &mut w)?;
    w.close("}");

    log::debug!("compiled host driver for '{}'", func.id);
    Ok(w.finish())
}

fn zero_literal(ty: &str, ir: &IrDocument) -> Result<String, ExecError> {
    let parsed = IrType::parse(ty).ok_or_else(|| ExecError::UnknownResource(ty.to_string()))?;
    Ok(RuntimeValue::zero_of(&parsed, ir)?.to_json().to_string())
}

struct HostBackend<'a> {
    ir: &'a IrDocument,
    func: &'a FunctionDef,
}

impl<'a> HostBackend<'a> {
    /// Where a `var` symbol reads from / writes to.
    fn var_read(&self, name: &str) -> String {
        if self.func.local_var(name).is_some() {
            format!("l_{name}")
        } else if self.func.input_port(name).is_some() || self.ir.input(name).is_some() {
            format!("ctx.input({})", quote(name))
        } else {
            format!("ctx.getVar({})", quote(name))
        }
    }

    /// Compile one argument of a node to an expression string.
    fn arg_expr(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
        key: &str,
    ) -> Result<Option<String>, ExecError> {
        if let Some(edge) = graph.data_edge(&node.id, key) {
            let source = graph
                .node(&edge.from)
                .ok_or_else(|| ExecError::UnknownNode(edge.from.clone()))?;
            return self.expr(graph, source).map(Some);
        }
        let Some(value) = node.field(key) else {
            return Ok(None);
        };
        if is_reserved_key(key) {
            return Ok(Some(match value {
                Json::String(s) => quote(s),
                other => other.to_string(),
            }));
        }
        if let Json::String(s) = value {
            if let Some(source) = graph.node(s) {
                return self.expr(graph, source).map(Some);
            }
            if self.func.local_var(s).is_some()
                || self.func.input_port(s).is_some()
                || self.ir.input(s).is_some()
                || self.ir.global(s).is_some()
            {
                return Ok(Some(self.var_read(s)));
            }
            return Ok(Some(quote(s)));
        }
        Ok(Some(value.to_string()))
    }

    fn require_expr(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
        key: &str,
    ) -> Result<String, ExecError> {
        self.arg_expr(graph, node, key)?
            .ok_or_else(|| ExecError::MissingArgument {
                node: node.id.clone(),
                key: key.to_string(),
            })
    }

    /// All data arguments of a node as a JS object literal, reserved symbol
    /// keys included as strings so `callOp` sees the same argument set the
    /// interpreter resolves.
    fn args_object(&mut self, graph: &FunctionGraph, node: &Node) -> Result<String, ExecError> {
        let mut keys: Vec<String> = node.arg_keys().map(str::to_string).collect();
        for key in graph.data_edge_keys(&node.id) {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        let mut parts = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(expr) = self.arg_expr(graph, node, key)? {
                parts.push(format!("{}: {}", quote(key), expr));
            }
        }
        Ok(format!("{{ {} }}", parts.join(", ")))
    }

    /// Recursive expression inlining with the dedicated fast paths.
    fn expr(&mut self, graph: &FunctionGraph, node: &Node) -> Result<String, ExecError> {
        match node.op.as_str() {
            "var_get" => {
                let name = required_symbol(node, "var")?;
                Ok(self.var_read(name))
            }
            "literal" => self.require_expr(graph, node, "value"),
            "loop_index" => Ok(format!("loop_{}", required_symbol(node, "loop")?)),
            "buffer_load" => {
                let buffer = required_symbol(node, "buffer")?;
                let index = self.require_expr(graph, node, "index")?;
                Ok(format!("resources.bufferLoad({}, {index})", quote(buffer)))
            }
            "texture_sample" => {
                let tex = required_symbol(node, "tex")?;
                let coord = self.require_expr(graph, node, "coord")?;
                Ok(format!("resources.textureSample({}, {coord})", quote(tex)))
            }
            "texture_load" => {
                let tex = required_symbol(node, "tex")?;
                let coord = self.require_expr(graph, node, "coord")?;
                Ok(format!("resources.textureLoad({}, {coord})", quote(tex)))
            }
            "resource_get_size" => Ok(format!(
                "resources.sizeOf({})",
                quote(required_symbol(node, "resource")?)
            )),
            "resource_get_format" => Ok(format!(
                "resources.formatOf({})",
                quote(required_symbol(node, "resource")?)
            )),
            "builtin_get" => Ok(format!(
                "ctx.builtin({})",
                quote(required_symbol(node, "name")?)
            )),
            // executable-returning nodes read their result binding
            "call_func" | "array_set" => Ok(format!("r_{}", node.id)),
            "var_set" => {
                let name = required_symbol(node, "var")?;
                Ok(self.var_read(name))
            }
            op => {
                let args = self.args_object(graph, node)?;
                Ok(format!("globals.callOp({}, {args})", quote(op)))
            }
        }
    }
}

fn required_symbol<'n>(node: &'n Node, key: &str) -> Result<&'n str, ExecError> {
    node.symbol(key).ok_or_else(|| ExecError::MissingArgument {
        node: node.id.clone(),
        key: key.to_string(),
    })
}

impl<'a> FlowBackend for HostBackend<'a> {
    fn statement(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
        w: &mut CodeWriter,
    ) -> Result<(), ExecError> {
        match node.op.as_str() {
            "var_set" => {
                let name = required_symbol(node, "var")?;
                let value = self.require_expr(graph, node, "value")?;
                if self.func.local_var(name).is_some() {
                    w.line(format!("l_{name} = {value};"));
                } else {
                    w.line(format!("ctx.setVar({}, {value});", quote(name)));
                }
            }
            "array_set" => {
                let name = required_symbol(node, "var")?;
                let index = self.require_expr(graph, node, "index")?;
                let value = self.require_expr(graph, node, "value")?;
                if self.func.local_var(name).is_some() {
                    w.line(format!("l_{name}[{index}] = {value};"));
                    w.line(format!("const r_{} = l_{name};", node.id));
                } else {
                    w.line(format!(
                        "ctx.setVarIndex({}, {index}, {value});",
                        quote(name)
                    ));
                    w.line(format!("const r_{} = ctx.getVar({});", node.id, quote(name)));
                }
            }
            "buffer_store" => {
                let buffer = required_symbol(node, "buffer")?;
                let index = self.require_expr(graph, node, "index")?;
                let value = self.require_expr(graph, node, "value")?;
                w.line(format!(
                    "resources.bufferStore({}, {index}, {value});",
                    quote(buffer)
                ));
            }
            "texture_store" => {
                let tex = required_symbol(node, "tex")?;
                let coord = self.require_expr(graph, node, "coord")?;
                let value = self.require_expr(graph, node, "value")?;
                w.line(format!(
                    "resources.textureStore({}, {coord}, {value});",
                    quote(tex)
                ));
            }
            "call_func" => {
                let target = required_symbol(node, "func")?;
                let args = self.call_args(graph, node, target)?;
                w.line(format!(
                    "const r_{} = ctx.callFunction({}, {args});",
                    node.id,
                    quote(target)
                ));
            }
            "cmd_dispatch" => {
                let target = required_symbol(node, "func")?;
                let extent = self.require_expr(graph, node, "dispatch")?;
                let args = self.call_args(graph, node, target)?;
                w.line(format!(
                    "ctx.dispatch({}, {extent}, {args});",
                    quote(target)
                ));
            }
            "cmd_draw" => {
                let vertex = required_symbol(node, "vertex")?;
                let fragment = required_symbol(node, "fragment")?;
                let target = required_symbol(node, "target")?;
                let count = self.require_expr(graph, node, "count")?;
                let instances = self
                    .arg_expr(graph, node, "instances")?
                    .unwrap_or_else(|| "1".into());
                w.line(format!(
                    "ctx.draw({{ vertex: {}, fragment: {}, target: {}, count: {count}, instances: {instances} }});",
                    quote(vertex),
                    quote(fragment),
                    quote(target)
                ));
            }
            "cmd_resize_resource" => {
                let resource = required_symbol(node, "resource")?;
                let size = self.require_expr(graph, node, "size")?;
                let format = node
                    .symbol("format")
                    .map(quote)
                    .unwrap_or_else(|| "null".into());
                w.line(format!(
                    "resources.resize({}, {size}, {format});",
                    quote(resource)
                ));
            }
            "cmd_clear_resource" => {
                let resource = required_symbol(node, "resource")?;
                let value = self
                    .arg_expr(graph, node, "value")?
                    .unwrap_or_else(|| "null".into());
                w.line(format!("resources.clear({}, {value});", quote(resource)));
            }
            "func_return" => match self.arg_expr(graph, node, "value")? {
                Some(value) => w.line(format!("return {value};")),
                None => w.line("return;"),
            },
            op => {
                return Err(ExecError::UnknownOp {
                    node: node.id.clone(),
                    op: op.to_string(),
                })
            }
        }
        Ok(())
    }

    fn branch_condition(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
    ) -> Result<String, ExecError> {
        self.require_expr(graph, node, "cond")
    }

    fn loop_bounds(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
    ) -> Result<(String, String), ExecError> {
        Ok((
            self.require_expr(graph, node, "start")?,
            self.require_expr(graph, node, "end")?,
        ))
    }

    fn loop_header(&self, var: &str, start: &str, end: &str) -> String {
        format!("for (let {var} = {start}; {var} < {end}; {var}++) {{")
    }
}

impl<'a> HostBackend<'a> {
    /// Arguments bound to a call/dispatch target's input ports, by id.
    fn call_args(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
        target: &str,
    ) -> Result<String, ExecError> {
        let Some(target) = self.ir.function(target) else {
            return Err(ExecError::UnknownFunction(target.to_string()));
        };
        let mut parts = Vec::new();
        for port in &target.inputs {
            if let Some(expr) = self.arg_expr(graph, node, &port.id)? {
                parts.push(format!("{}: {}", quote(&port.id), expr));
            }
        }
        Ok(format!("{{ {} }}", parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> IrDocument {
        IrDocument::from_json(v).unwrap()
    }

    #[test]
    fn emits_locals_and_loop() {
        let ir = doc(json!({
            "version": "1", "meta": {"name": "t"}, "entryPoint": "main",
            "resources": [{"id": "b_result", "kind": "buffer", "elementType": "int", "size": 4}],
            "functions": [{
                "id": "main", "kind": "cpu",
                "localVars": [{"id": "acc", "type": "int", "initialValue": 0}],
                "nodes": [
                    {"id": "loop", "op": "flow_loop", "start": 0, "end": 5},
                    {"id": "idx", "op": "loop_index", "loop": "loop"},
                    {"id": "sum", "op": "math_add", "a": "acc", "b": "idx"},
                    {"id": "set", "op": "var_set", "var": "acc", "value": "sum"},
                    {"id": "store", "op": "buffer_store", "buffer": "b_result", "index": 0, "value": "acc"}
                ],
                "edges": [
                    {"from": "loop", "portOut": "exec_body", "to": "set", "portIn": "exec_in", "type": "execution"},
                    {"from": "loop", "portOut": "exec_completed", "to": "store", "portIn": "exec_in", "type": "execution"}
                ]
            }]
        }));
        let func = ir.function("main").unwrap();
        let text = compile_host(func, &ir).unwrap();
        assert!(text.contains("let l_acc = 0;"));
        assert!(text.contains("for (let loop_loop = 0; loop_loop < 5; loop_loop++) {"));
        assert!(text.contains("l_acc = globals.callOp(\"math_add\", { \"a\": l_acc, \"b\": loop_loop });"));
        assert!(text.contains("resources.bufferStore(\"b_result\", 0, l_acc);"));
    }

    #[test]
    fn emits_branch_blocks() {
        let ir = doc(json!({
            "version": "1", "meta": {"name": "t"}, "entryPoint": "main",
            "resources": [{"id": "b", "kind": "buffer", "elementType": "int", "size": 1}],
            "functions": [{
                "id": "main", "kind": "cpu",
                "nodes": [
                    {"id": "br", "op": "flow_branch", "cond": true},
                    {"id": "t1", "op": "buffer_store", "buffer": "b", "index": 0, "value": 1},
                    {"id": "f1", "op": "buffer_store", "buffer": "b", "index": 0, "value": 2}
                ],
                "edges": [
                    {"from": "br", "portOut": "exec_true", "to": "t1", "portIn": "exec_in", "type": "execution"},
                    {"from": "br", "portOut": "exec_false", "to": "f1", "portIn": "exec_in", "type": "execution"}
                ]
            }]
        }));
        let text = compile_host(ir.function("main").unwrap(), &ir).unwrap();
        assert!(text.contains("if (true) {"));
        assert!(text.contains("} else {"));
    }
}
