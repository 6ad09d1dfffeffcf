// src/interp/mod.rs
//
// =============================================================================
// SHADERGRAPH: REFERENCE INTERPRETER
// =============================================================================
//
// Executes a validated document on the CPU. Cooperative and single-threaded:
// executable nodes run through a breadth-first queue seeded from entry
// nodes; pure nodes are pulled lazily during argument resolution and cached
// per frame. Dispatches drive the target shader function over a 3D index
// space; draws delegate to the software rasterizer.
//
// Every frame push has a matching pop on every exit path, including error
// unwinds: run_function pops in straight-line code after the drive result is
// in hand, never inside it.

pub mod resources;

use crate::error::ExecError;
use crate::eval::{self, Args};
use crate::graph::FunctionGraph;
use crate::ir::{
    is_executable_op, is_reserved_key, FunctionDef, FunctionKind, IrDocument, IrType, Node,
};
use crate::raster;
use crate::value::RuntimeValue;
use resources::{ResourceTable, TextureState};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet, VecDeque};

/// Implementation-imposed ceiling on flow_loop iterations.
pub const LOOP_BUDGET: u64 = 1 << 22;

pub type JsonMap = serde_json::Map<String, Json>;

/// One activation record of the evaluation stack.
#[derive(Debug, Default)]
pub struct Frame {
    pub name: String,
    pub variables: HashMap<String, RuntimeValue>,
    pub node_results: HashMap<String, RuntimeValue>,
    pub loop_indices: HashMap<String, i64>,
    pulling: HashSet<String>,
    return_value: Option<RuntimeValue>,
    returning: bool,
}

impl Frame {
    fn new(name: &str) -> Frame {
        Frame {
            name: name.to_string(),
            ..Frame::default()
        }
    }
}

/// The evaluation context returned by `interpret` for inspection.
#[derive(Debug)]
pub struct EvalContext<'a> {
    pub doc: &'a IrDocument,
    pub resources: ResourceTable,
    pub globals: HashMap<String, RuntimeValue>,
    inputs: HashMap<String, RuntimeValue>,
    builtins: HashMap<String, RuntimeValue>,
    frames: Vec<Frame>,
}

/// Run the document's entry point and hand back the final context.
pub fn interpret<'a>(doc: &'a IrDocument, inputs: &JsonMap) -> Result<EvalContext<'a>, ExecError> {
    let mut ctx = EvalContext::new(doc, inputs)?;
    let entry = doc
        .function(&doc.entry_point)
        .ok_or_else(|| ExecError::UnknownFunction(doc.entry_point.clone()))?;
    ctx.resources.begin_frame(doc)?;
    log::debug!("interpreting '{}' from '{}'", doc.meta.name, entry.id);
    ctx.run_function(entry, HashMap::new())?;
    Ok(ctx)
}

/// Everything a single tool call mutated, for the debugger collaborator.
#[derive(Debug)]
pub struct ToolReport {
    pub result: RuntimeValue,
    pub mutated_globals: Vec<(String, RuntimeValue)>,
    pub mutated_resources: Vec<String>,
}

/// Run one function as an isolated "tool call" and report what it touched.
pub fn interpret_tool(
    doc: &IrDocument,
    tool: &str,
    args: &JsonMap,
    bindings: Option<&JsonMap>,
) -> Result<ToolReport, ExecError> {
    let empty = JsonMap::new();
    let mut ctx = EvalContext::new(doc, bindings.unwrap_or(&empty))?;
    let func = doc
        .function(tool)
        .ok_or_else(|| ExecError::UnknownFunction(tool.to_string()))?;

    let mut bound = HashMap::new();
    for port in &func.inputs {
        let ty = IrType::parse(&port.ty)
            .ok_or_else(|| ExecError::UnknownResource(port.ty.clone()))?;
        let value = match args.get(&port.id) {
            Some(v) => RuntimeValue::from_json_typed(v, &ty, doc)?,
            None => RuntimeValue::zero_of(&ty, doc)?,
        };
        bound.insert(port.id.clone(), value);
    }

    let globals_before = ctx.globals.clone();
    ctx.resources.take_dirty();
    let result = ctx.run_function(func, bound)?;

    let mut mutated_globals: Vec<(String, RuntimeValue)> = ctx
        .globals
        .iter()
        .filter(|(k, v)| globals_before.get(k.as_str()) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    mutated_globals.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(ToolReport {
        result,
        mutated_globals,
        mutated_resources: ctx.resources.take_dirty(),
    })
}

impl<'a> EvalContext<'a> {
    pub fn new(doc: &'a IrDocument, inputs: &JsonMap) -> Result<EvalContext<'a>, ExecError> {
        let mut resources = ResourceTable::from_document(doc)?;

        let mut globals = HashMap::new();
        for global in &doc.globals {
            let ty = IrType::parse(&global.ty)
                .ok_or_else(|| ExecError::UnknownResource(global.ty.clone()))?;
            let value = match &global.value {
                Some(v) => RuntimeValue::from_json_typed(v, &ty, doc)?,
                None => RuntimeValue::zero_of(&ty, doc)?,
            };
            globals.insert(global.id.clone(), value);
        }

        let mut bound = HashMap::new();
        for input in &doc.inputs {
            let payload = inputs.get(&input.id).or(input.default.as_ref());
            if input.ty == "texture" {
                if let Some(payload) = payload {
                    resources.bind_texture(&input.id, TextureState::from_json(payload)?);
                }
                continue;
            }
            let ty = IrType::parse(&input.ty)
                .ok_or_else(|| ExecError::UnknownResource(input.ty.clone()))?;
            let value = match payload {
                Some(v) => RuntimeValue::from_json_typed(v, &ty, doc)?,
                None => RuntimeValue::zero_of(&ty, doc)?,
            };
            bound.insert(input.id.clone(), value);
        }

        Ok(EvalContext {
            doc,
            resources,
            globals,
            inputs: bound,
            builtins: HashMap::new(),
            frames: Vec::new(),
        })
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    pub(crate) fn set_builtin(&mut self, name: &str, value: RuntimeValue) {
        self.builtins.insert(name.to_string(), value);
    }

    pub(crate) fn take_builtins(&mut self) -> HashMap<String, RuntimeValue> {
        std::mem::take(&mut self.builtins)
    }

    pub(crate) fn restore_builtins(&mut self, saved: HashMap<String, RuntimeValue>) {
        self.builtins = saved;
    }

    // ------------------------------------------------------------------
    // Function driving
    // ------------------------------------------------------------------

    /// Push a frame, bind arguments to input ports, run to completion and
    /// return the function's return value.
    pub(crate) fn run_function(
        &mut self,
        func: &'a FunctionDef,
        mut args: HashMap<String, RuntimeValue>,
    ) -> Result<RuntimeValue, ExecError> {
        if self.frames.iter().any(|f| f.name == func.id) {
            return Err(ExecError::Recursion(func.id.clone()));
        }

        let mut frame = Frame::new(&func.id);
        for port in &func.inputs {
            let ty = IrType::parse(&port.ty)
                .ok_or_else(|| ExecError::UnknownResource(port.ty.clone()))?;
            let value = match args.remove(&port.id) {
                Some(v) => v,
                None => RuntimeValue::zero_of(&ty, self.doc)?,
            };
            if func.kind == FunctionKind::Shader
                && matches!(value, RuntimeValue::Str(_))
                && ty != IrType::Str
            {
                return Err(ExecError::StringMarshal(port.id.clone()));
            }
            frame.variables.insert(port.id.clone(), value);
        }
        for var in &func.local_vars {
            let ty = IrType::parse(&var.ty)
                .ok_or_else(|| ExecError::UnknownResource(var.ty.clone()))?;
            let value = match &var.initial_value {
                Some(v) => RuntimeValue::from_json_typed(v, &ty, self.doc)?,
                None => RuntimeValue::zero_of(&ty, self.doc)?,
            };
            frame.variables.insert(var.id.clone(), value);
        }

        self.frames.push(frame);
        let outcome = self.drive(func);
        let frame = self.frames.pop().expect("frame stack balance");
        outcome?;
        Ok(frame.return_value.unwrap_or(RuntimeValue::Void))
    }

    fn drive(&mut self, func: &'a FunctionDef) -> Result<(), ExecError> {
        let graph = FunctionGraph::build(func)?;
        let entries = graph.entry_nodes();
        self.drive_nodes(&graph, entries)
    }

    fn drive_nodes(
        &mut self,
        graph: &FunctionGraph<'a>,
        seed: Vec<&'a Node>,
    ) -> Result<(), ExecError> {
        let mut queue: VecDeque<&'a Node> = seed.into();
        while let Some(node) = queue.pop_front() {
            if self.frame().returning {
                break;
            }
            self.exec_node(graph, node, &mut queue)?;
        }
        Ok(())
    }

    fn enqueue(
        &self,
        graph: &FunctionGraph<'a>,
        node: &Node,
        port: &str,
        queue: &mut VecDeque<&'a Node>,
    ) {
        for successor in graph.exec_successors(&node.id, port) {
            queue.push_back(successor);
        }
    }

    // ------------------------------------------------------------------
    // Executable nodes
    // ------------------------------------------------------------------

    fn exec_node(
        &mut self,
        graph: &FunctionGraph<'a>,
        node: &'a Node,
        queue: &mut VecDeque<&'a Node>,
    ) -> Result<(), ExecError> {
        log::trace!("exec {} ({})", node.id, node.op);
        match node.op.as_str() {
            "flow_branch" => {
                let cond = self.require_arg(graph, node, "cond")?.as_bool()?;
                let port = if cond { "exec_true" } else { "exec_false" };
                self.enqueue(graph, node, port, queue);
            }
            "flow_loop" => {
                let start = self.require_arg(graph, node, "start")?.as_i64()?;
                let end = self.require_arg(graph, node, "end")?.as_i64()?;
                if end > start && (end - start) as u64 > LOOP_BUDGET {
                    return Err(ExecError::LoopBudget {
                        node: node.id.clone(),
                        budget: LOOP_BUDGET,
                    });
                }
                for i in start..end {
                    // pure reads inside the body must observe current state
                    self.frame_mut().node_results.clear();
                    self.frame_mut().loop_indices.insert(node.id.clone(), i);
                    let body = graph.exec_successors(&node.id, "exec_body");
                    self.drive_nodes(graph, body)?;
                    if self.frame().returning {
                        return Ok(());
                    }
                }
                self.enqueue(graph, node, "exec_completed", queue);
            }
            "call_func" => {
                let target = self.target_function(node, "func")?;
                let bound = self.bind_call_args(graph, node, target)?;
                let result = self.run_function(target, bound)?;
                self.frame_mut().node_results.insert(node.id.clone(), result);
                self.enqueue(graph, node, "exec_out", queue);
            }
            "cmd_dispatch" => {
                self.dispatch(graph, node)?;
                self.enqueue(graph, node, "exec_out", queue);
            }
            "cmd_draw" => {
                raster::draw(self, graph, node)?;
                self.enqueue(graph, node, "exec_out", queue);
            }
            "cmd_resize_resource" => {
                let name = self.symbol(node, "resource")?;
                let size = self.require_arg(graph, node, "size")?;
                let format = node.symbol("format").map(str::to_string);
                self.resources
                    .resize(self.doc, &name, &size, format.as_deref())?;
                self.enqueue(graph, node, "exec_out", queue);
            }
            "cmd_clear_resource" => {
                let name = self.symbol(node, "resource")?;
                let value = self.resolve_arg(graph, node, "value")?.map(|v| v.to_json());
                self.resources.clear(self.doc, &name, value.as_ref())?;
                self.enqueue(graph, node, "exec_out", queue);
            }
            "func_return" => {
                let value = self.resolve_arg(graph, node, "value")?;
                let frame = self.frame_mut();
                frame.return_value = value;
                frame.returning = true;
            }
            "var_set" => {
                let name = self.symbol(node, "var")?;
                let value = self.require_arg(graph, node, "value")?;
                self.set_var(&name, value.clone())?;
                // var_set passes the stored value through
                self.frame_mut().node_results.insert(node.id.clone(), value);
                self.enqueue(graph, node, "exec_out", queue);
            }
            "array_set" => {
                let name = self.symbol(node, "var")?;
                let index = self.require_arg(graph, node, "index")?.as_i64()?;
                let value = self.require_arg(graph, node, "value")?;
                if index < 0 {
                    return Err(ExecError::NegativeIndex {
                        node: node.id.clone(),
                        index,
                    });
                }
                let mut array = match self.read_var(&name)? {
                    RuntimeValue::Array(items) => items,
                    other => {
                        return Err(ExecError::TypeMismatch {
                            node: node.id.clone(),
                            expected: "array".into(),
                            found: other.type_name().into(),
                        })
                    }
                };
                if index as usize >= array.len() {
                    return Err(ExecError::ArrayOob {
                        index,
                        len: array.len(),
                    });
                }
                array[index as usize] = value;
                let updated = RuntimeValue::Array(array);
                self.set_var(&name, updated.clone())?;
                self.frame_mut()
                    .node_results
                    .insert(node.id.clone(), updated);
                self.enqueue(graph, node, "exec_out", queue);
            }
            "buffer_store" => {
                let name = self.symbol(node, "buffer")?;
                let index = self.require_arg(graph, node, "index")?.as_i64()?;
                let value = self.require_arg(graph, node, "value")?;
                self.resources.buffer_store(&name, index, value)?;
                self.enqueue(graph, node, "exec_out", queue);
            }
            "texture_store" => {
                let name = self.symbol(node, "tex")?;
                let coord = self.require_arg(graph, node, "coord")?.as_vector()?;
                let value = self.require_arg(graph, node, "value")?.as_vector()?;
                if coord.len() != 2 || value.len() != 4 {
                    return Err(ExecError::TypeMismatch {
                        node: node.id.clone(),
                        expected: "int2 coord and float4 value".into(),
                        found: "mis-sized operands".into(),
                    });
                }
                let texture = self.resources.texture_mut(&name)?;
                texture.store(
                    coord[0] as i64,
                    coord[1] as i64,
                    [value[0], value[1], value[2], value[3]],
                );
                self.enqueue(graph, node, "exec_out", queue);
            }
            op if is_executable_op(op) => {
                return Err(ExecError::UnknownOp {
                    node: node.id.clone(),
                    op: op.to_string(),
                })
            }
            // A pure node reached the execution queue: nothing to schedule.
            _ => {}
        }
        Ok(())
    }

    fn dispatch(&mut self, graph: &FunctionGraph<'a>, node: &'a Node) -> Result<(), ExecError> {
        let target = self.target_function(node, "func")?;
        if target.kind != FunctionKind::Shader {
            return Err(ExecError::Runtime {
                node: node.id.clone(),
                message: format!("cmd_dispatch target '{}' is not a shader", target.id),
            });
        }
        let extent = self.require_arg(graph, node, "dispatch")?;
        let (ex, ey, ez) = dispatch_extent(&extent, &node.id)?;
        // arguments bind once, before the index loops
        let bound = self.bind_call_args(graph, node, target)?;

        log::debug!("dispatch '{}' over {}x{}x{}", target.id, ex, ey, ez);
        let saved = std::mem::take(&mut self.builtins);
        let outcome = (|| -> Result<(), ExecError> {
            for z in 0..ez {
                for y in 0..ey {
                    for x in 0..ex {
                        let id = vec![x as f64, y as f64, z as f64];
                        self.builtins = HashMap::from([
                            ("global_invocation_id".into(), RuntimeValue::Vector(id.clone())),
                            ("local_invocation_id".into(), RuntimeValue::Vector(vec![0.0; 3])),
                            ("workgroup_id".into(), RuntimeValue::Vector(id)),
                            (
                                "num_workgroups".into(),
                                RuntimeValue::Vector(vec![ex as f64, ey as f64, ez as f64]),
                            ),
                            ("local_invocation_index".into(), RuntimeValue::Int(0)),
                        ]);
                        self.run_function(target, bound.clone())?;
                    }
                }
            }
            Ok(())
        })();
        self.builtins = saved;
        outcome
    }

    fn target_function(&self, node: &Node, key: &str) -> Result<&'a FunctionDef, ExecError> {
        let name = node
            .symbol(key)
            .ok_or_else(|| ExecError::MissingArgument {
                node: node.id.clone(),
                key: key.to_string(),
            })?;
        self.doc
            .function(name)
            .ok_or_else(|| ExecError::UnknownFunction(name.to_string()))
    }

    /// Bind a call/dispatch node's data arguments to the target's input
    /// ports by id. Unbound ports get their zero value.
    pub(crate) fn bind_call_args(
        &mut self,
        graph: &FunctionGraph<'a>,
        node: &'a Node,
        target: &FunctionDef,
    ) -> Result<HashMap<String, RuntimeValue>, ExecError> {
        let mut bound = HashMap::new();
        for port in &target.inputs {
            if let Some(value) = self.resolve_arg(graph, node, &port.id)? {
                bound.insert(port.id.clone(), value);
            }
        }
        Ok(bound)
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    fn read_var(&self, name: &str) -> Result<RuntimeValue, ExecError> {
        if let Some(v) = self.frame().variables.get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.inputs.get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        Err(ExecError::UninitializedVariable(name.to_string()))
    }

    fn set_var(&mut self, name: &str, value: RuntimeValue) -> Result<(), ExecError> {
        if self.frame().variables.contains_key(name) {
            self.frame_mut().variables.insert(name.to_string(), value);
            return Ok(());
        }
        if self.globals.contains_key(name) {
            self.globals.insert(name.to_string(), value);
            return Ok(());
        }
        Err(ExecError::UnknownVariable(name.to_string()))
    }

    // ------------------------------------------------------------------
    // Argument resolution (edges > inline references > literals)
    // ------------------------------------------------------------------

    fn symbol(&self, node: &Node, key: &str) -> Result<String, ExecError> {
        node.symbol(key)
            .map(str::to_string)
            .ok_or_else(|| ExecError::MissingArgument {
                node: node.id.clone(),
                key: key.to_string(),
            })
    }

    pub(crate) fn require_arg(
        &mut self,
        graph: &FunctionGraph<'a>,
        node: &'a Node,
        key: &str,
    ) -> Result<RuntimeValue, ExecError> {
        self.resolve_arg(graph, node, key)?
            .ok_or_else(|| ExecError::MissingArgument {
                node: node.id.clone(),
                key: key.to_string(),
            })
    }

    pub(crate) fn resolve_arg(
        &mut self,
        graph: &FunctionGraph<'a>,
        node: &'a Node,
        key: &str,
    ) -> Result<Option<RuntimeValue>, ExecError> {
        // (a) a data edge overrides any inline value
        if let Some(edge) = graph.data_edge(&node.id, key) {
            let source = graph
                .node(&edge.from)
                .ok_or_else(|| ExecError::UnknownNode(edge.from.clone()))?;
            return self.pull_node(graph, source).map(Some);
        }
        let Some(value) = node.field(key) else {
            return Ok(None);
        };
        // reserved keys hold symbols, never data references
        if is_reserved_key(key) {
            return Ok(Some(RuntimeValue::from_json(value)));
        }
        // (b) strings resolve to a node, local, input or global in scope
        if let Json::String(s) = value {
            if let Some(source) = graph.node(s) {
                return self.pull_node(graph, source).map(Some);
            }
            if let Some(v) = self.frame().variables.get(s) {
                return Ok(Some(v.clone()));
            }
            if let Some(v) = self.inputs.get(s) {
                return Ok(Some(v.clone()));
            }
            if let Some(v) = self.globals.get(s) {
                return Ok(Some(v.clone()));
            }
        }
        // (c) literal
        Ok(Some(RuntimeValue::from_json(value)))
    }

    fn resolve_args(
        &mut self,
        graph: &FunctionGraph<'a>,
        node: &'a Node,
    ) -> Result<Args, ExecError> {
        let mut keys: Vec<String> = node.arg_keys().map(str::to_string).collect();
        for key in graph.data_edge_keys(&node.id) {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        let mut args = Args::new();
        for key in keys {
            if let Some(value) = self.resolve_arg(graph, node, &key)? {
                args.insert(key, value);
            }
        }
        Ok(args)
    }

    // ------------------------------------------------------------------
    // Pure nodes
    // ------------------------------------------------------------------

    /// Pull a node's value. Pure results are cached for the lifetime of the
    /// frame, except `loop_index`, which always reads the live counter.
    pub(crate) fn pull_node(
        &mut self,
        graph: &FunctionGraph<'a>,
        node: &'a Node,
    ) -> Result<RuntimeValue, ExecError> {
        if is_executable_op(&node.op) {
            return self
                .frame()
                .node_results
                .get(&node.id)
                .cloned()
                .ok_or_else(|| ExecError::Runtime {
                    node: node.id.clone(),
                    message: "result of executable node is not available yet".into(),
                });
        }
        if node.op == "loop_index" {
            let target = self.symbol(node, "loop")?;
            return self
                .frame()
                .loop_indices
                .get(&target)
                .copied()
                .map(RuntimeValue::Int)
                .ok_or_else(|| ExecError::Runtime {
                    node: node.id.clone(),
                    message: format!("loop_index read outside loop '{target}'"),
                });
        }
        if let Some(cached) = self.frame().node_results.get(&node.id) {
            return Ok(cached.clone());
        }
        if !self.frame_mut().pulling.insert(node.id.clone()) {
            return Err(ExecError::Runtime {
                node: node.id.clone(),
                message: "data-dependency cycle".into(),
            });
        }
        let result = self.pull_node_uncached(graph, node);
        self.frame_mut().pulling.remove(&node.id);
        let value = result?;
        self.frame_mut()
            .node_results
            .insert(node.id.clone(), value.clone());
        Ok(value)
    }

    fn pull_node_uncached(
        &mut self,
        graph: &FunctionGraph<'a>,
        node: &'a Node,
    ) -> Result<RuntimeValue, ExecError> {
        match node.op.as_str() {
            "var_get" => {
                let name = self.symbol(node, "var")?;
                self.read_var(&name)
            }
            "builtin_get" => {
                let name = self.symbol(node, "name")?;
                self.builtins
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| ExecError::Runtime {
                        node: node.id.clone(),
                        message: format!("builtin '{name}' is not set in this scope"),
                    })
            }
            "buffer_load" => {
                let name = self.symbol(node, "buffer")?;
                let index = self.require_arg(graph, node, "index")?.as_i64()?;
                self.resources.buffer_load(&name, index)
            }
            "texture_sample" => {
                let name = self.symbol(node, "tex")?;
                let coord = self.require_arg(graph, node, "coord")?.as_vector()?;
                if coord.len() != 2 {
                    return Err(ExecError::TypeMismatch {
                        node: node.id.clone(),
                        expected: "float2".into(),
                        found: format!("vector of width {}", coord.len()),
                    });
                }
                let texture = self
                    .resources
                    .texture(&name)
                    .ok_or_else(|| ExecError::UnknownResource(name.clone()))?;
                Ok(RuntimeValue::Vector(texture.sample(coord[0], coord[1]).to_vec()))
            }
            "texture_load" => {
                let name = self.symbol(node, "tex")?;
                let coord = self.require_arg(graph, node, "coord")?.as_vector()?;
                if coord.len() != 2 {
                    return Err(ExecError::TypeMismatch {
                        node: node.id.clone(),
                        expected: "int2".into(),
                        found: format!("vector of width {}", coord.len()),
                    });
                }
                let texture = self
                    .resources
                    .texture(&name)
                    .ok_or_else(|| ExecError::UnknownResource(name.clone()))?;
                Ok(RuntimeValue::Vector(
                    texture.load(coord[0] as i64, coord[1] as i64).to_vec(),
                ))
            }
            "resource_get_size" => {
                let name = self.symbol(node, "resource")?;
                self.resources.size_of(&name)
            }
            "resource_get_format" => {
                let name = self.symbol(node, "resource")?;
                self.resources.format_of(&name)
            }
            _ => {
                let args = self.resolve_args(graph, node)?;
                eval::eval_pure(&node.op, &node.id, &args)
            }
        }
    }
}

fn dispatch_extent(value: &RuntimeValue, node: &str) -> Result<(i64, i64, i64), ExecError> {
    let clamp = |v: f64| v.max(0.0) as i64;
    match value {
        RuntimeValue::Int(n) => Ok(((*n).max(0), 1, 1)),
        RuntimeValue::Vector(_) | RuntimeValue::Array(_) => {
            let v = value.as_vector()?;
            if v.is_empty() || v.len() > 3 {
                return Err(ExecError::Runtime {
                    node: node.to_string(),
                    message: "dispatch extent must have 1 to 3 components".into(),
                });
            }
            let get = |i: usize| v.get(i).copied().map(clamp).unwrap_or(1);
            Ok((get(0), get(1), get(2)))
        }
        other => Err(ExecError::TypeMismatch {
            node: node.to_string(),
            expected: "dispatch extent".into(),
            found: other.type_name().into(),
        }),
    }
}
