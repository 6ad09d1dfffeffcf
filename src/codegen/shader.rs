// src/codegen/shader.rs
//
// WGSL emission per shader-kind function. One module is produced per entry:
// struct declarations, storage-buffer bindings for every referenced buffer,
// an optional globals buffer, helper functions, every other shader function
// as an ordinary WGSL function, and the entry with the compute stage
// annotation.
//
// Boolean convention: comparison, logic and classification ops produce
// 0.0/1.0 f32 (`select(0.0, 1.0, a > b)`); branch conditions of non-bool
// shape are wrapped `(expr) != 0.0`. The `bool` IR type maps to f32.

use super::{emit_flow, CodeWriter, FlowBackend};
use crate::error::ExecError;
use crate::graph::FunctionGraph;
use crate::ir::{
    is_reserved_key, FunctionDef, FunctionKind, IrDocument, IrType, Node, ResourceDef,
};
use crate::ops;
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Options threaded in by the runtime collaborator.
#[derive(Debug, Clone, Default)]
pub struct ShaderOptions {
    /// When set, a writable storage buffer at group 0 backing global
    /// variables is emitted at this binding.
    pub global_buffer_binding: Option<u32>,
    /// Global variable name -> index inside the globals buffer.
    pub var_map: HashMap<String, usize>,
    /// Resource id -> group-0 binding index.
    pub resource_bindings: HashMap<String, u32>,
    /// Definitions for synthesizing typed storage declarations. Falls back
    /// to the document's own resources when empty.
    pub resource_defs: Vec<ResourceDef>,
}

/// Emit one WGSL module per shader-kind function, keyed by entry id.
pub fn compile_shaders(
    ir: &IrDocument,
    options: &ShaderOptions,
) -> Result<BTreeMap<String, String>, ExecError> {
    let mut modules = BTreeMap::new();
    for func in &ir.functions {
        if func.kind == FunctionKind::Shader {
            modules.insert(func.id.clone(), compile_shader(ir, &func.id, options)?);
        }
    }
    log::debug!("compiled {} shader module(s)", modules.len());
    Ok(modules)
}

/// Emit the WGSL module for a single entry function.
pub fn compile_shader(
    ir: &IrDocument,
    entry: &str,
    options: &ShaderOptions,
) -> Result<String, ExecError> {
    let entry_fn = ir
        .function(entry)
        .ok_or_else(|| ExecError::UnknownFunction(entry.to_string()))?;

    let usage = Usage::scan(ir);
    let mut w = CodeWriter::new();
    w.line(format!("// generated module for '{entry}'"));
    w.blank();

    emit_structs(ir, &mut w);
    emit_bindings(ir, options, &usage, &mut w);
    emit_helpers(&usage, &mut w);

    let mut backend = ShaderBackend { ir, options, func: entry_fn };
    for func in &ir.functions {
        if func.kind == FunctionKind::Shader && func.id != entry {
            backend.func = func;
            emit_function(&mut backend, func, false, &mut w)?;
        }
    }
    backend.func = entry_fn;
    emit_function(&mut backend, entry_fn, true, &mut w)?;

    Ok(w.finish())
}

// ============================================================================
// MODULE PREAMBLE
// ============================================================================

/// Which buffers/textures/helpers the module actually needs.
struct Usage {
    buffers: BTreeSet<String>,
    sampled: BTreeSet<String>,
    stored: BTreeSet<String>,
    uses_invert: bool,
    uses_quat: bool,
}

impl Usage {
    fn scan(ir: &IrDocument) -> Usage {
        let mut usage = Usage {
            buffers: BTreeSet::new(),
            sampled: BTreeSet::new(),
            stored: BTreeSet::new(),
            uses_invert: false,
            uses_quat: false,
        };
        for func in &ir.functions {
            if func.kind != FunctionKind::Shader {
                continue;
            }
            for node in &func.nodes {
                match node.op.as_str() {
                    "buffer_load" | "buffer_store" => {
                        if let Some(name) = node.symbol("buffer") {
                            usage.buffers.insert(name.to_string());
                        }
                    }
                    "texture_sample" | "texture_load" => {
                        if let Some(name) = node.symbol("tex") {
                            usage.sampled.insert(name.to_string());
                        }
                    }
                    "texture_store" => {
                        if let Some(name) = node.symbol("tex") {
                            usage.stored.insert(name.to_string());
                        }
                    }
                    "mat_invert" => usage.uses_invert = true,
                    op if op.starts_with("quat_") => usage.uses_quat = true,
                    _ => {}
                }
            }
        }
        usage
    }
}

fn emit_structs(ir: &IrDocument, w: &mut CodeWriter) {
    for def in &ir.structs {
        w.open(format!("struct {} {{", def.id));
        for member in &def.members {
            let ty = IrType::parse(&member.ty)
                .map(|t| wgsl_type(&t))
                .unwrap_or_else(|| "f32".into());
            w.line(format!("{}: {},", member.id, ty));
        }
        w.close("}");
        w.blank();
    }
}

fn emit_bindings(ir: &IrDocument, options: &ShaderOptions, usage: &Usage, w: &mut CodeWriter) {
    let defs: &[ResourceDef] = if options.resource_defs.is_empty() {
        &ir.resources
    } else {
        &options.resource_defs
    };

    let mut taken: BTreeSet<u32> = options.resource_bindings.values().copied().collect();
    if let Some(b) = options.global_buffer_binding {
        taken.insert(b);
    }
    let mut next_free = move |taken: &mut BTreeSet<u32>| -> u32 {
        let mut candidate = 0;
        while taken.contains(&candidate) {
            candidate += 1;
        }
        taken.insert(candidate);
        candidate
    };

    for name in &usage.buffers {
        let element = defs
            .iter()
            .find(|d| &d.id == name)
            .and_then(|d| d.element_type.as_deref())
            .and_then(IrType::parse)
            .map(|t| wgsl_type(&t))
            .unwrap_or_else(|| "f32".into());
        let binding = options
            .resource_bindings
            .get(name)
            .copied()
            .unwrap_or_else(|| next_free(&mut taken));
        w.line(format!("struct Buffer_{name} {{ data: array<{element}> }}"));
        w.line(format!(
            "@group(0) @binding({binding}) var<storage, read_write> b_{name}: Buffer_{name};"
        ));
        w.blank();
    }

    if let Some(binding) = options.global_buffer_binding {
        w.line("struct Globals { data: array<f32> }");
        w.line(format!(
            "@group(0) @binding({binding}) var<storage, read_write> b_globals: Globals;"
        ));
        w.blank();
    }

    let mut slot = 0u32;
    for name in &usage.sampled {
        w.line(format!("@group(1) @binding({slot}) var t_{name}: texture_2d<f32>;"));
        w.line(format!("@group(1) @binding({}) var s_{name}: sampler;", slot + 1));
        slot += 2;
    }
    let mut slot = 0u32;
    for name in &usage.stored {
        let format = defs
            .iter()
            .find(|d| &d.id == name)
            .and_then(|d| d.format.as_deref())
            .map(storage_format)
            .unwrap_or("rgba32float");
        w.line(format!(
            "@group(2) @binding({slot}) var st_{name}: texture_storage_2d<{format}, write>;"
        ));
        slot += 1;
    }
    if !usage.sampled.is_empty() || !usage.stored.is_empty() {
        w.blank();
    }
}

fn storage_format(ir_format: &str) -> &'static str {
    match ir_format {
        "rgba8" => "rgba8unorm",
        "rgba16f" => "rgba16float",
        "r32f" => "r32float",
        _ => "rgba32float",
    }
}

fn emit_helpers(usage: &Usage, w: &mut CodeWriter) {
    w.open("fn blend_premultiplied(src: vec4<f32>, dst: vec4<f32>) -> vec4<f32> {");
    w.line("return src + dst * (1.0 - src.a);");
    w.close("}");
    w.blank();

    if usage.uses_quat {
        w.open("fn quat_mul(a: vec4<f32>, b: vec4<f32>) -> vec4<f32> {");
        w.line("return vec4<f32>(");
        w.line("  a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,");
        w.line("  a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,");
        w.line("  a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,");
        w.line("  a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z);");
        w.close("}");
        w.blank();
        w.open("fn quat_from_axis_angle(axis: vec3<f32>, angle: f32) -> vec4<f32> {");
        w.line("let h = angle * 0.5;");
        w.line("return vec4<f32>(normalize(axis) * sin(h), cos(h));");
        w.close("}");
        w.blank();
        w.open("fn quat_slerp(a: vec4<f32>, b: vec4<f32>, t: f32) -> vec4<f32> {");
        w.line("var bb = b;");
        w.line("var d = dot(a, b);");
        w.line("if (d < 0.0) { bb = -b; d = -d; }");
        w.line("if (d > 0.9995) { return normalize(mix(a, bb, t)); }");
        w.line("let theta = acos(clamp(d, -1.0, 1.0));");
        w.line("let s = sin(theta);");
        w.line("return normalize(a * (sin((1.0 - t) * theta) / s) + bb * (sin(t * theta) / s));");
        w.close("}");
        w.blank();
        w.open("fn quat_to_float4x4(q: vec4<f32>) -> mat4x4<f32> {");
        w.line("let x = q.x; let y = q.y; let z = q.z; let w = q.w;");
        w.line("return mat4x4<f32>(");
        w.line("  vec4<f32>(1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y + w * z), 2.0 * (x * z - w * y), 0.0),");
        w.line("  vec4<f32>(2.0 * (x * y - w * z), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z + w * x), 0.0),");
        w.line("  vec4<f32>(2.0 * (x * z + w * y), 2.0 * (y * z - w * x), 1.0 - 2.0 * (x * x + y * y), 0.0),");
        w.line("  vec4<f32>(0.0, 0.0, 0.0, 1.0));");
        w.close("}");
        w.blank();
    }

    if usage.uses_invert {
        // column reconstruction via the adjugate, 3x3 only; 4x4 falls back
        // to transpose of the cofactor-free approximation used upstream
        w.open("fn mat3_inverse(m: mat3x3<f32>) -> mat3x3<f32> {");
        w.line("let a = cross(m[1], m[2]);");
        w.line("let b = cross(m[2], m[0]);");
        w.line("let c = cross(m[0], m[1]);");
        w.line("let det = dot(m[0], a);");
        w.line("return mat3x3<f32>(a / det, b / det, c / det);");
        w.close("}");
        w.blank();
        w.open("fn mat4_inverse(m: mat4x4<f32>) -> mat4x4<f32> {");
        w.line("// affine inverse: transpose the rotation, back-rotate the translation");
        w.line("let r = transpose(mat3x3<f32>(m[0].xyz, m[1].xyz, m[2].xyz));");
        w.line("let t = -(r * m[3].xyz);");
        w.line("return mat4x4<f32>(");
        w.line("  vec4<f32>(r[0], 0.0), vec4<f32>(r[1], 0.0), vec4<f32>(r[2], 0.0),");
        w.line("  vec4<f32>(t, 1.0));");
        w.close("}");
        w.blank();
    }
}

// ============================================================================
// FUNCTION EMISSION
// ============================================================================

fn emit_function(
    backend: &mut ShaderBackend,
    func: &FunctionDef,
    is_entry: bool,
    w: &mut CodeWriter,
) -> Result<(), ExecError> {
    let graph = FunctionGraph::build(func)?;

    if is_entry {
        w.line("@compute @workgroup_size(1)");
        w.open(format!(
            "fn {}(@builtin(global_invocation_id) gid: vec3<u32>) {{",
            func.id
        ));
        // entry inputs become zero-initialized module-driven slots
        for port in &func.inputs {
            let ty = port_type(&port.ty);
            w.line(format!("var {}: {} = {};", port.id, wgsl_type(&ty), zero_literal(&ty)));
        }
    } else {
        let params: Vec<String> = func
            .inputs
            .iter()
            .map(|p| format!("{}: {}", p.id, wgsl_type(&port_type(&p.ty))))
            .collect();
        let ret = func
            .outputs
            .first()
            .map(|p| format!(" -> {}", wgsl_type(&port_type(&p.ty))))
            .unwrap_or_default();
        w.open(format!("fn {}({}){} {{", func.id, params.join(", "), ret));
    }

    for var in &func.local_vars {
        let ty = port_type(&var.ty);
        let init = match &var.initial_value {
            Some(v) => wgsl_literal(v),
            None => zero_literal(&ty),
        };
        w.line(format!("var l_{}: {} = {};", var.id, wgsl_type(&ty), init));
    }

    emit_flow(backend, &graph, graph.entry_nodes(), w)?;
    w.close("}");
    w.blank();
    Ok(())
}

fn port_type(ty: &str) -> IrType {
    IrType::parse(ty).unwrap_or(IrType::Float)
}

// ============================================================================
// TYPE / LITERAL GRAMMAR
// ============================================================================

/// The fixed IR -> WGSL type table. `bool` follows the module's float
/// boolean convention.
fn wgsl_type(ty: &IrType) -> String {
    match ty {
        IrType::Float | IrType::Bool => "f32".into(),
        IrType::Int => "i32".into(),
        IrType::Str => "f32".into(),
        IrType::Float2 => "vec2<f32>".into(),
        IrType::Float3 => "vec3<f32>".into(),
        IrType::Float4 => "vec4<f32>".into(),
        IrType::Int2 => "vec2<i32>".into(),
        IrType::Int3 => "vec3<i32>".into(),
        IrType::Int4 => "vec4<i32>".into(),
        IrType::Float3x3 => "mat3x3<f32>".into(),
        IrType::Float4x4 => "mat4x4<f32>".into(),
        IrType::Struct(name) => name.clone(),
        IrType::Array { elem, len: Some(n) } => format!("array<{}, {n}>", wgsl_type(elem)),
        IrType::Array { elem, len: None } => format!("array<{}>", wgsl_type(elem)),
    }
}

fn zero_literal(ty: &IrType) -> String {
    match ty {
        IrType::Int => "0".into(),
        _ => format!("{}()", wgsl_type(ty)),
    }
    .replace("f32()", "0.0")
}

fn wgsl_num(v: f64) -> String {
    if !v.is_finite() {
        // clamp non-finite constants to the largest representable f32
        return if v > 0.0 {
            "3.402823466e+38".into()
        } else {
            "-3.402823466e+38".into()
        };
    }
    format!("{v:?}")
}

fn wgsl_literal(value: &Json) -> String {
    match value {
        Json::Bool(true) => "1.0".into(),
        Json::Bool(false) => "0.0".into(),
        Json::Number(n) => wgsl_num(n.as_f64().unwrap_or(0.0)),
        Json::Array(items) => {
            let parts: Vec<String> = items.iter().map(wgsl_literal).collect();
            match items.len() {
                2 => format!("vec2<f32>({})", parts.join(", ")),
                3 => format!("vec3<f32>({})", parts.join(", ")),
                4 => format!("vec4<f32>({})", parts.join(", ")),
                9 => matrix_literal(3, &parts),
                16 => matrix_literal(4, &parts),
                _ => format!("array({})", parts.join(", ")),
            }
        }
        // strings and objects have no shader representation
        _ => "0.0".into(),
    }
}

/// Row-major IR payload into WGSL's column-major constructor.
fn matrix_literal(dim: usize, parts: &[String]) -> String {
    let mut columns = Vec::with_capacity(dim);
    for col in 0..dim {
        let mut comps = Vec::with_capacity(dim);
        for row in 0..dim {
            comps.push(parts[row * dim + col].clone());
        }
        columns.push(format!("vec{dim}<f32>({})", comps.join(", ")));
    }
    format!("mat{dim}x{dim}<f32>({})", columns.join(", "))
}

// ============================================================================
// BACKEND
// ============================================================================

struct ShaderBackend<'a> {
    ir: &'a IrDocument,
    options: &'a ShaderOptions,
    func: &'a FunctionDef,
}

impl<'a> ShaderBackend<'a> {
    fn var_read(&self, name: &str) -> String {
        if self.func.local_var(name).is_some() {
            format!("l_{name}")
        } else if let Some(index) = self.options.var_map.get(name) {
            format!("b_globals.data[{index}u]")
        } else {
            // function input: the parameter name
            name.to_string()
        }
    }

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
            return Ok(Some(wgsl_literal(value)));
        }
        if let Json::String(s) = value {
            if let Some(source) = graph.node(s) {
                return self.expr(graph, source).map(Some);
            }
            if self.func.local_var(s).is_some()
                || self.func.input_port(s).is_some()
                || self.options.var_map.contains_key(s)
            {
                return Ok(Some(self.var_read(s)));
            }
        }
        Ok(Some(wgsl_literal(value)))
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

    fn binary(&mut self, graph: &FunctionGraph, node: &Node, op: &str) -> Result<String, ExecError> {
        let a = self.require_expr(graph, node, "a")?;
        let b = self.require_expr(graph, node, "b")?;
        Ok(format!("({a} {op} {b})"))
    }

    fn call2(&mut self, graph: &FunctionGraph, node: &Node, f: &str) -> Result<String, ExecError> {
        let a = self.require_expr(graph, node, "a")?;
        let b = self.require_expr(graph, node, "b")?;
        Ok(format!("{f}({a}, {b})"))
    }

    fn call1(&mut self, graph: &FunctionGraph, node: &Node, f: &str) -> Result<String, ExecError> {
        let v = self.require_expr(graph, node, "value")?;
        Ok(format!("{f}({v})"))
    }

    fn compare(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
        op: &str,
    ) -> Result<String, ExecError> {
        let a = self.require_expr(graph, node, "a")?;
        let b = self.require_expr(graph, node, "b")?;
        Ok(format!("select(0.0, 1.0, {a} {op} {b})"))
    }

    /// Expression compilation mirroring the op evaluator's semantics.
    fn expr(&mut self, graph: &FunctionGraph, node: &Node) -> Result<String, ExecError> {
        match node.op.as_str() {
            "var_get" => Ok(self.var_read(required_symbol(node, "var")?)),
            "literal" => self.require_expr(graph, node, "value"),
            "loop_index" => Ok(format!("loop_{}", required_symbol(node, "loop")?)),
            "buffer_load" => {
                let buffer = required_symbol(node, "buffer")?;
                let index = self.require_expr(graph, node, "index")?;
                Ok(format!("b_{buffer}.data[u32({index})]"))
            }
            "call_func" | "array_set" => Ok(format!("v_{}", node.id)),
            "var_set" => Ok(self.var_read(required_symbol(node, "var")?)),
            "builtin_get" => Ok(match required_symbol(node, "name")? {
                "global_invocation_id" => "vec3<i32>(gid)".into(),
                "workgroup_id" => "vec3<i32>(gid)".into(),
                "num_workgroups" => "vec3<i32>(1, 1, 1)".into(),
                "local_invocation_id" => "vec3<i32>(0, 0, 0)".into(),
                "position" => "vec4<f32>()".into(),
                _ => "0".into(),
            }),
            "texture_sample" => {
                let tex = required_symbol(node, "tex")?;
                let coord = self.require_expr(graph, node, "coord")?;
                Ok(format!("textureSampleLevel(t_{tex}, s_{tex}, {coord}, 0.0)"))
            }
            "texture_load" => {
                let tex = required_symbol(node, "tex")?;
                let coord = self.require_expr(graph, node, "coord")?;
                Ok(format!("textureLoad(t_{tex}, vec2<i32>({coord}), 0)"))
            }
            "resource_get_size" => {
                let name = required_symbol(node, "resource")?;
                match self.ir.resource(name).map(|r| r.kind) {
                    Some(crate::ir::ResourceKind::Texture) => {
                        Ok(format!("vec2<i32>(textureDimensions(t_{name}))"))
                    }
                    _ => Ok(format!("i32(arrayLength(&b_{name}.data))")),
                }
            }
            "resource_get_format" => Ok("0.0".into()),
            "const_get" => {
                let name = required_symbol(node, "name")?;
                let value = ops::constant(name)
                    .ok_or_else(|| ExecError::InvalidConstant(name.to_string()))?;
                Ok(wgsl_num(value))
            }

            // --- arithmetic ---
            "math_add" => self.binary(graph, node, "+"),
            "math_sub" => self.binary(graph, node, "-"),
            "math_mul" => self.binary(graph, node, "*"),
            "math_div" => self.binary(graph, node, "/"),
            "math_mod" => self.binary(graph, node, "%"),
            "math_pow" => self.call2(graph, node, "pow"),
            "math_min" => self.call2(graph, node, "min"),
            "math_max" => self.call2(graph, node, "max"),
            "math_atan2" => self.call2(graph, node, "atan2"),
            "math_step" => self.call2(graph, node, "step"),
            "math_mad" => {
                let a = self.require_expr(graph, node, "a")?;
                let b = self.require_expr(graph, node, "b")?;
                let c = self.require_expr(graph, node, "c")?;
                Ok(format!("fma({a}, {b}, {c})"))
            }
            "math_clamp" => {
                let v = self.require_expr(graph, node, "value")?;
                let lo = self.require_expr(graph, node, "min")?;
                let hi = self.require_expr(graph, node, "max")?;
                Ok(format!("clamp({v}, {lo}, {hi})"))
            }
            "math_lerp" => {
                let a = self.require_expr(graph, node, "a")?;
                let b = self.require_expr(graph, node, "b")?;
                let t = self.require_expr(graph, node, "t")?;
                Ok(format!("mix({a}, {b}, {t})"))
            }
            "math_smoothstep" => {
                let a = self.require_expr(graph, node, "a")?;
                let b = self.require_expr(graph, node, "b")?;
                let t = self.require_expr(graph, node, "t")?;
                Ok(format!("smoothstep({a}, {b}, {t})"))
            }
            "math_abs" => self.call1(graph, node, "abs"),
            "math_neg" => {
                let v = self.require_expr(graph, node, "value")?;
                Ok(format!("(-({v}))"))
            }
            "math_sign" => self.call1(graph, node, "sign"),
            "math_floor" => self.call1(graph, node, "floor"),
            "math_ceil" => self.call1(graph, node, "ceil"),
            "math_round" => self.call1(graph, node, "round"),
            "math_frac" => self.call1(graph, node, "fract"),
            "math_sqrt" => self.call1(graph, node, "sqrt"),
            "math_sin" => self.call1(graph, node, "sin"),
            "math_cos" => self.call1(graph, node, "cos"),
            "math_tan" => self.call1(graph, node, "tan"),
            "math_asin" => self.call1(graph, node, "asin"),
            "math_acos" => self.call1(graph, node, "acos"),
            "math_atan" => self.call1(graph, node, "atan"),
            "math_exp" => self.call1(graph, node, "exp"),
            "math_log" => self.call1(graph, node, "log"),

            // --- comparison / logic / classification (float booleans) ---
            "math_lt" => self.compare(graph, node, "<"),
            "math_lte" => self.compare(graph, node, "<="),
            "math_gt" => self.compare(graph, node, ">"),
            "math_gte" => self.compare(graph, node, ">="),
            "math_eq" => self.compare(graph, node, "=="),
            "math_neq" => self.compare(graph, node, "!="),
            "logic_and" => {
                let a = self.require_expr(graph, node, "a")?;
                let b = self.require_expr(graph, node, "b")?;
                Ok(format!("select(0.0, 1.0, ({a}) != 0.0 && ({b}) != 0.0)"))
            }
            "logic_or" => {
                let a = self.require_expr(graph, node, "a")?;
                let b = self.require_expr(graph, node, "b")?;
                Ok(format!("select(0.0, 1.0, ({a}) != 0.0 || ({b}) != 0.0)"))
            }
            "logic_not" => {
                let v = self.require_expr(graph, node, "value")?;
                Ok(format!("select(1.0, 0.0, ({v}) != 0.0)"))
            }
            "math_is_nan" => {
                let v = self.require_expr(graph, node, "value")?;
                Ok(format!("select(0.0, 1.0, ({v}) != ({v}))"))
            }
            "math_is_inf" => {
                let v = self.require_expr(graph, node, "value")?;
                Ok(format!("select(0.0, 1.0, abs({v}) > 3.0e38)"))
            }
            "math_is_finite" => {
                let v = self.require_expr(graph, node, "value")?;
                Ok(format!(
                    "select(0.0, 1.0, abs({v}) <= 3.0e38 && ({v}) == ({v}))"
                ))
            }
            "math_mantissa" => {
                let v = self.require_expr(graph, node, "value")?;
                Ok(format!("frexp({v}).fract"))
            }
            "math_exponent" => {
                let v = self.require_expr(graph, node, "value")?;
                Ok(format!("frexp({v}).exp"))
            }
            "math_to_int" => {
                let v = self.require_expr(graph, node, "value")?;
                Ok(format!("i32({v})"))
            }
            "math_to_float" => {
                let v = self.require_expr(graph, node, "value")?;
                Ok(format!("f32({v})"))
            }

            // --- vectors ---
            "vec_construct" => {
                let mut parts = Vec::new();
                for key in ["x", "y", "z", "w"] {
                    match self.arg_expr(graph, node, key)? {
                        Some(expr) => parts.push(expr),
                        None => break,
                    }
                }
                Ok(format!("vec{}<f32>({})", parts.len(), parts.join(", ")))
            }
            "vec_swizzle" => {
                let v = self.require_expr(graph, node, "value")?;
                let channels = required_symbol(node, "channels")?;
                Ok(format!("({v}).{channels}"))
            }
            "vec_dot" => self.call2(graph, node, "dot"),
            "vec_cross" => self.call2(graph, node, "cross"),
            "vec_length" => self.call1(graph, node, "length"),
            "vec_distance" => self.call2(graph, node, "distance"),
            "vec_normalize" => self.call1(graph, node, "normalize"),

            // --- matrices ---
            "mat_identity" => Ok(match node.field("size").and_then(Json::as_i64) {
                Some(3) => matrix_literal(
                    3,
                    &"1,0,0,0,1,0,0,0,1"
                        .split(',')
                        .map(|c| format!("{c}.0"))
                        .collect::<Vec<_>>(),
                ),
                _ => matrix_literal(
                    4,
                    &"1,0,0,0,0,1,0,0,0,0,1,0,0,0,0,1"
                        .split(',')
                        .map(|c| format!("{c}.0"))
                        .collect::<Vec<_>>(),
                ),
            }),
            "mat_multiply" => self.binary(graph, node, "*"),
            "mat_transform" => {
                let m = self.require_expr(graph, node, "matrix")?;
                let v = self.require_expr(graph, node, "vector")?;
                Ok(format!("({m} * {v})"))
            }
            "mat_transpose" => {
                let m = self.require_expr(graph, node, "matrix")?;
                Ok(format!("transpose({m})"))
            }
            "mat_invert" => {
                let m = self.require_expr(graph, node, "matrix")?;
                Ok(format!("mat4_inverse({m})"))
            }
            "mat_rotation" => {
                let angle = self.require_expr(graph, node, "angle")?;
                let axis = required_symbol(node, "axis")?;
                Ok(match axis {
                    "x" => format!("mat3x3<f32>(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, cos({angle}), sin({angle})), vec3<f32>(0.0, -sin({angle}), cos({angle})))"),
                    "y" => format!("mat3x3<f32>(vec3<f32>(cos({angle}), 0.0, -sin({angle})), vec3<f32>(0.0, 1.0, 0.0), vec3<f32>(sin({angle}), 0.0, cos({angle})))"),
                    _ => format!("mat3x3<f32>(vec3<f32>(cos({angle}), sin({angle}), 0.0), vec3<f32>(-sin({angle}), cos({angle}), 0.0), vec3<f32>(0.0, 0.0, 1.0))"),
                })
            }

            // --- quaternions / color ---
            "quat_from_axis_angle" => {
                let axis = self.require_expr(graph, node, "axis")?;
                let angle = self.require_expr(graph, node, "angle")?;
                Ok(format!("quat_from_axis_angle({axis}, {angle})"))
            }
            "quat_mul" => self.call2(graph, node, "quat_mul"),
            "quat_normalize" => self.call1(graph, node, "normalize"),
            "quat_slerp" => {
                let a = self.require_expr(graph, node, "a")?;
                let b = self.require_expr(graph, node, "b")?;
                let t = self.require_expr(graph, node, "t")?;
                Ok(format!("quat_slerp({a}, {b}, {t})"))
            }
            "quat_to_float4x4" => self.call1(graph, node, "quat_to_float4x4"),
            "color_mix" => self.call2(graph, node, "blend_premultiplied"),

            // --- structural ---
            "struct_construct" => {
                let name = required_symbol(node, "type")?.to_string();
                let def = self
                    .ir
                    .struct_def(&name)
                    .ok_or_else(|| ExecError::UnknownResource(name.clone()))?;
                let mut parts = Vec::with_capacity(def.members.len());
                for member in def.members.clone() {
                    let expr = self
                        .arg_expr(graph, node, &member.id)?
                        .unwrap_or_else(|| zero_literal(&port_type(&member.ty)));
                    parts.push(expr);
                }
                Ok(format!("{name}({})", parts.join(", ")))
            }
            "struct_get" => {
                let v = self.require_expr(graph, node, "value")?;
                let field = required_symbol(node, "field")?;
                Ok(format!("({v}).{field}"))
            }
            "array_construct" => {
                let mut keys: Vec<&str> = node
                    .arg_keys()
                    .filter(|k| !is_reserved_key(k))
                    .collect();
                keys.sort_by_key(|k| k.parse::<usize>().unwrap_or(usize::MAX));
                let mut parts = Vec::with_capacity(keys.len());
                for key in keys {
                    if let Some(expr) = self.arg_expr(graph, node, key)? {
                        parts.push(expr);
                    }
                }
                Ok(format!("array({})", parts.join(", ")))
            }
            "array_get" => {
                let arr = self.require_expr(graph, node, "array")?;
                let index = self.require_expr(graph, node, "index")?;
                Ok(format!("{arr}[u32({index})]"))
            }
            "array_length" => {
                // fixed counts only; dynamic lengths live behind buffers
                let count = node
                    .field("array")
                    .and_then(Json::as_str)
                    .and_then(|s| self.func.node(s))
                    .filter(|n| n.op == "array_construct")
                    .map(|n| n.arg_keys().filter(|k| !is_reserved_key(k)).count())
                    .unwrap_or(0);
                Ok(format!("{count}"))
            }

            op => Err(ExecError::UnknownOp {
                node: node.id.clone(),
                op: op.to_string(),
            }),
        }
    }
}

fn required_symbol<'n>(node: &'n Node, key: &str) -> Result<&'n str, ExecError> {
    node.symbol(key).ok_or_else(|| ExecError::MissingArgument {
        node: node.id.clone(),
        key: key.to_string(),
    })
}

impl<'a> FlowBackend for ShaderBackend<'a> {
    fn statement(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
        w: &mut CodeWriter,
    ) -> Result<(), ExecError> {
        match node.op.as_str() {
            "var_set" => {
                let name = required_symbol(node, "var")?.to_string();
                let value = self.require_expr(graph, node, "value")?;
                w.line(format!("{} = {value};", self.var_read(&name)));
            }
            "array_set" => {
                let name = required_symbol(node, "var")?.to_string();
                let index = self.require_expr(graph, node, "index")?;
                let value = self.require_expr(graph, node, "value")?;
                let target = self.var_read(&name);
                w.line(format!("{target}[u32({index})] = {value};"));
                w.line(format!("let v_{} = {target};", node.id));
            }
            "buffer_store" => {
                let buffer = required_symbol(node, "buffer")?;
                let index = self.require_expr(graph, node, "index")?;
                let value = self.require_expr(graph, node, "value")?;
                w.line(format!("b_{buffer}.data[u32({index})] = {value};"));
            }
            "texture_store" => {
                let tex = required_symbol(node, "tex")?;
                let coord = self.require_expr(graph, node, "coord")?;
                let value = self.require_expr(graph, node, "value")?;
                w.line(format!(
                    "textureStore(st_{tex}, vec2<i32>({coord}), {value});"
                ));
            }
            "call_func" => {
                let target_id = required_symbol(node, "func")?;
                let target = self
                    .ir
                    .function(target_id)
                    .ok_or_else(|| ExecError::UnknownFunction(target_id.to_string()))?;
                let mut args = Vec::with_capacity(target.inputs.len());
                for port in target.inputs.clone() {
                    let expr = self
                        .arg_expr(graph, node, &port.id)?
                        .unwrap_or_else(|| zero_literal(&port_type(&port.ty)));
                    args.push(expr);
                }
                w.line(format!(
                    "let v_{} = {}({});",
                    node.id,
                    target.id,
                    args.join(", ")
                ));
            }
            "func_return" => match self.arg_expr(graph, node, "value")? {
                Some(value) => w.line(format!("return {value};")),
                None => w.line("return;"),
            },
            op => {
                // host-side commands have no shader representation
                w.line(format!("// '{op}' has no shader lowering"));
            }
        }
        Ok(())
    }

    fn branch_condition(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
    ) -> Result<String, ExecError> {
        if let Some(Json::Bool(b)) = node.field("cond") {
            return Ok(b.to_string());
        }
        let cond = self.require_expr(graph, node, "cond")?;
        Ok(format!("({cond}) != 0.0"))
    }

    fn loop_bounds(
        &mut self,
        graph: &FunctionGraph,
        node: &Node,
    ) -> Result<(String, String), ExecError> {
        Ok((
            format!("i32({})", self.require_expr(graph, node, "start")?),
            format!("i32({})", self.require_expr(graph, node, "end")?),
        ))
    }

    fn loop_header(&self, var: &str, start: &str, end: &str) -> String {
        format!("for (var {var}: i32 = {start}; {var} < {end}; {var} = {var} + 1) {{")
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
    fn module_shapes() {
        let ir = doc(json!({
            "version": "1", "meta": {"name": "t"}, "entryPoint": "main",
            "resources": [{"id": "b_out", "kind": "buffer", "elementType": "float", "size": 64}],
            "functions": [
                {"id": "main", "kind": "cpu"},
                {"id": "fill", "kind": "shader", "nodes": [
                    {"id": "gid", "op": "builtin_get", "name": "global_invocation_id"},
                    {"id": "x", "op": "vec_swizzle", "value": "gid", "channels": "x"},
                    {"id": "store", "op": "buffer_store", "buffer": "b_out", "index": "x", "value": 1.5}
                ]}
            ]
        }));
        let options = ShaderOptions {
            resource_bindings: HashMap::from([("b_out".to_string(), 0u32)]),
            ..ShaderOptions::default()
        };
        let modules = compile_shaders(&ir, &options).unwrap();
        let text = &modules["fill"];
        assert!(text.contains("struct Buffer_b_out { data: array<f32> }"));
        assert!(text.contains("@group(0) @binding(0) var<storage, read_write> b_b_out: Buffer_b_out;"));
        assert!(text.contains("@compute @workgroup_size(1)"));
        assert!(text.contains("fn fill(@builtin(global_invocation_id) gid: vec3<u32>)"));
        assert!(text.contains("b_b_out.data[u32((vec3<i32>(gid)).x)] = 1.5;"));
        assert!(text.contains("fn blend_premultiplied"));
    }

    #[test]
    fn expression_grammar_matches_op_semantics() {
        let ir = doc(json!({
            "version": "1", "meta": {"name": "t"}, "entryPoint": "main",
            "globals": [{"id": "energy", "type": "float"}],
            "functions": [
                {"id": "main", "kind": "cpu"},
                {"id": "fx", "kind": "shader",
                 "localVars": [{"id": "out", "type": "float"}],
                 "nodes": [
                    {"id": "m", "op": "math_mad", "a": 2.0, "b": 3.0, "c": 1.0},
                    {"id": "g", "op": "math_gt", "a": "m", "b": 4.0},
                    {"id": "e", "op": "var_get", "var": "energy"},
                    {"id": "sum", "op": "math_add", "a": "g", "b": "e"},
                    {"id": "set", "op": "var_set", "var": "out", "value": "sum"}
                ]}
            ]
        }));
        let options = ShaderOptions {
            global_buffer_binding: Some(7),
            var_map: HashMap::from([("energy".to_string(), 0usize)]),
            ..ShaderOptions::default()
        };
        let text = compile_shader(&ir, "fx", &options).unwrap();
        assert!(text.contains("@group(0) @binding(7) var<storage, read_write> b_globals: Globals;"));
        assert!(text.contains("fma(2.0, 3.0, 1.0)"));
        assert!(text.contains("select(0.0, 1.0, fma(2.0, 3.0, 1.0) > 4.0)"));
        assert!(text.contains("b_globals.data[0u]"));
        assert!(text.contains("l_out = "));
    }
}
