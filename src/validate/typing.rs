// src/validate/typing.rs
//
// Pass 3: static logic. For every node: resolve its argument set (data
// edges override inline references), infer each argument's type by walking
// the data graph, then select an overload from the signature table.
//
// Inference is memoized per node. An argument whose type cannot be known
// statically (opaque literals, markers) participates in overload matching
// as a wildcard so one unknown does not cascade into noise.

use super::{codes, Collector};
use crate::graph::FunctionGraph;
use crate::ir::{
    builtin_type, is_reserved_key, FunctionDef, IrDocument, IrType, Node, ResourceKind, SizeSpec,
};
use crate::ops::{self, type_matches, Signature, ValidationType};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub(super) fn check(doc: &IrDocument, out: &mut Collector) {
    for func in &doc.functions {
        if func.outputs.len() > 1 {
            out.error(
                codes::UNSUPPORTED,
                format!(
                    "Multiple outputs not supported: function '{}' declares {}",
                    func.id,
                    func.outputs.len()
                ),
                None,
                None,
            );
        }
    }

    for func in &doc.functions {
        if out.poisoned_functions.contains(&func.id) {
            continue;
        }
        let graph = match FunctionGraph::build(func) {
            Ok(g) => g,
            // dangling endpoints were reported by pass 2
            Err(_) => continue,
        };
        let mut inference = Inference::new(doc, func, &graph);
        for node in &func.nodes {
            check_node(&mut inference, node, out);
        }
    }
}

fn check_node(inference: &mut Inference, node: &Node, out: &mut Collector) {
    let Some(signatures) = ops::signatures(&node.op) else {
        out.error(
            codes::UNKNOWN_OP,
            format!("unknown op '{}'", node.op),
            None,
            Some(node.id.clone()),
        );
        return;
    };

    let args = inference.resolved_args(node, out);
    match select_overload(signatures, &args) {
        Ok(_) => {}
        Err(OverloadFailure::Missing(key)) => out.error(
            codes::MISSING_ARGUMENT,
            format!("Missing required argument '{key}' on op '{}'", node.op),
            None,
            Some(node.id.clone()),
        ),
        Err(OverloadFailure::Mismatch {
            key,
            expected,
            found,
        }) => out.error(
            codes::TYPE_MISMATCH,
            format!("Type Mismatch on '{key}': expected {expected}, found {found}"),
            None,
            Some(node.id.clone()),
        ),
    }

    check_static_bounds(inference.doc, node, out);

    // Surface inference-time errors (bad constants, missing struct fields,
    // multi-output calls) even for nodes nothing pulls from.
    inference.node_type(&node.id, out);
}

/// Static OOB: literal buffer indices must lie inside the declared size.
fn check_static_bounds(doc: &IrDocument, node: &Node, out: &mut Collector) {
    if node.op != "buffer_load" && node.op != "buffer_store" {
        return;
    }
    let Some(index) = node.field("index").and_then(Value::as_i64) else {
        return;
    };
    if index < 0 {
        out.error(
            codes::NEGATIVE_INDEX,
            format!("Invalid Negative Index {index} on '{}'", node.op),
            None,
            Some(node.id.clone()),
        );
        return;
    }
    let Some(name) = node.symbol("buffer") else {
        return;
    };
    if let Some(resource) = doc.resource(name) {
        if let SizeSpec::Fixed(len) = resource.size {
            if index as u64 >= len {
                out.error(
                    codes::STATIC_OOB,
                    format!(
                        "Static OOB Access: index {index} exceeds buffer '{name}' of size {len}"
                    ),
                    None,
                    Some(node.id.clone()),
                );
            }
        }
    }
}

// ============================================================================
// OVERLOAD SELECTION
// ============================================================================

enum OverloadFailure {
    Missing(String),
    Mismatch {
        key: String,
        expected: String,
        found: String,
    },
}

fn describe(vt: &ValidationType) -> String {
    match vt {
        ValidationType::Exact(t) => t.to_string(),
        ValidationType::AnyStruct => "struct".into(),
        ValidationType::AnyArray => "array".into(),
        ValidationType::Any => "any".into(),
    }
}

/// First-match selection: a signature wins when every declared key is
/// present and every known argument type matches up to broadcasting.
fn select_overload<'s>(
    signatures: &'s [Signature],
    args: &HashMap<String, Option<IrType>>,
) -> Result<&'s Signature, OverloadFailure> {
    let mut first_mismatch: Option<OverloadFailure> = None;

    'sigs: for signature in signatures {
        for (key, declared) in &signature.inputs {
            let Some(inferred) = args.get(*key) else {
                continue 'sigs;
            };
            if let Some(found) = inferred {
                if !type_matches(declared, found) {
                    if first_mismatch.is_none() {
                        first_mismatch = Some(OverloadFailure::Mismatch {
                            key: key.to_string(),
                            expected: describe(declared),
                            found: found.to_string(),
                        });
                    }
                    continue 'sigs;
                }
            }
        }
        return Ok(signature);
    }

    if let Some(mismatch) = first_mismatch {
        return Err(mismatch);
    }
    // No signature had all its keys: report the first missing key of the
    // preferred (first) signature.
    let missing = signatures
        .first()
        .and_then(|s| {
            s.inputs
                .iter()
                .find(|(k, _)| !args.contains_key(*k))
                .map(|(k, _)| k.to_string())
        })
        .unwrap_or_else(|| "?".to_string());
    Err(OverloadFailure::Missing(missing))
}

// ============================================================================
// TYPE INFERENCE
// ============================================================================

struct Inference<'a> {
    doc: &'a IrDocument,
    func: &'a FunctionDef,
    graph: &'a FunctionGraph<'a>,
    cache: HashMap<String, Option<IrType>>,
    visiting: HashSet<String>,
}

impl<'a> Inference<'a> {
    fn new(doc: &'a IrDocument, func: &'a FunctionDef, graph: &'a FunctionGraph<'a>) -> Self {
        Self {
            doc,
            func,
            graph,
            cache: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    /// The argument set of a node: inline keys plus edge-fed keys, each with
    /// its inferred type (None when statically unknown).
    fn resolved_args(&mut self, node: &Node, out: &mut Collector) -> HashMap<String, Option<IrType>> {
        let mut keys: Vec<String> = node.arg_keys().map(str::to_string).collect();
        for key in self.graph.data_edge_keys(&node.id) {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys.into_iter()
            .map(|key| {
                let ty = self.arg_type(node, &key, out);
                (key, ty)
            })
            .collect()
    }

    fn arg_type(&mut self, node: &Node, key: &str, out: &mut Collector) -> Option<IrType> {
        // (a) a data edge overrides any inline value
        if let Some(edge) = self.graph.data_edge(&node.id, key) {
            return self.node_type(&edge.from, out);
        }
        // reserved keys hold symbols
        if is_reserved_key(key) {
            return Some(IrType::Str);
        }
        let value = node.field(key)?;
        // (b) strings resolve to nodes, locals, inputs or globals in scope
        if let Value::String(s) = value {
            if self.func.node(s).is_some() {
                return self.node_type(&s.clone(), out);
            }
            if let Some(var) = self.func.local_var(s) {
                return IrType::parse(&var.ty);
            }
            if let Some(port) = self.func.input_port(s) {
                return IrType::parse(&port.ty);
            }
            if let Some(global) = self.doc.global(s) {
                return IrType::parse(&global.ty);
            }
            return Some(IrType::Str);
        }
        // (c) literal
        literal_type(value)
    }

    /// Inferred output type of a node; memoized, cycle-guarded.
    fn node_type(&mut self, id: &str, out: &mut Collector) -> Option<IrType> {
        if let Some(cached) = self.cache.get(id) {
            return cached.clone();
        }
        if !self.visiting.insert(id.to_string()) {
            out.error(
                codes::CYCLIC_DATA,
                format!("node '{id}' participates in a data-dependency cycle"),
                None,
                Some(id.to_string()),
            );
            return None;
        }
        let node = self.graph.node(id);
        let ty = match node {
            Some(node) => self.node_type_uncached(node, out),
            None => None,
        };
        self.visiting.remove(id);
        self.cache.insert(id.to_string(), ty.clone());
        ty
    }

    fn node_type_uncached(&mut self, node: &Node, out: &mut Collector) -> Option<IrType> {
        match node.op.as_str() {
            "literal" => self.arg_type(node, "value", out),
            "var_get" => {
                let name = node.symbol("var")?;
                if let Some(var) = self.func.local_var(name) {
                    IrType::parse(&var.ty)
                } else if let Some(port) = self.func.input_port(name) {
                    IrType::parse(&port.ty)
                } else {
                    self.doc.global(name).and_then(|g| IrType::parse(&g.ty))
                }
            }
            "call_func" => {
                let target = self.doc.function(node.symbol("func")?)?;
                match target.outputs.len() {
                    0 => None,
                    1 => IrType::parse(&target.outputs[0].ty),
                    _ => {
                        // the doc-level UNSUPPORTED error already fired;
                        // stay quiet here
                        None
                    }
                }
            }
            "builtin_get" => {
                let name = node.symbol("name")?;
                match builtin_type(name) {
                    Some(ty) => Some(ty),
                    None => {
                        out.error(
                            codes::UNKNOWN_REFERENCE,
                            format!("unknown builtin '{name}'"),
                            None,
                            Some(node.id.clone()),
                        );
                        None
                    }
                }
            }
            "const_get" => {
                let name = node.symbol("name")?;
                if ops::constant(name).is_none() {
                    out.error(
                        codes::INVALID_CONSTANT,
                        format!("Invalid constant name '{name}'"),
                        None,
                        Some(node.id.clone()),
                    );
                    return None;
                }
                Some(IrType::Float)
            }
            "loop_index" => Some(IrType::Int),
            "buffer_load" => {
                let name = node.symbol("buffer")?;
                self.doc
                    .resource(name)
                    .and_then(|r| r.element_type.as_deref())
                    .and_then(IrType::parse)
            }
            "texture_sample" | "texture_load" => Some(IrType::Float4),
            "resource_get_size" => {
                let name = node.symbol("resource")?;
                match self.doc.resource(name).map(|r| r.kind) {
                    Some(ResourceKind::Texture) => Some(IrType::Int2),
                    Some(_) => Some(IrType::Int),
                    None => Some(IrType::Int2),
                }
            }
            "resource_get_format" => Some(IrType::Str),
            "struct_get" => {
                let value_ty = self.arg_type(node, "value", out)?;
                let field = node.symbol("field")?;
                let IrType::Struct(struct_id) = value_ty else {
                    return None;
                };
                let def = self.doc.struct_def(&struct_id)?;
                match def.members.iter().find(|m| m.id == field) {
                    Some(member) => IrType::parse(&member.ty),
                    None => {
                        out.error(
                            codes::TYPE_MISMATCH,
                            format!("struct '{struct_id}' has no field '{field}'"),
                            None,
                            Some(node.id.clone()),
                        );
                        None
                    }
                }
            }
            "struct_construct" => {
                let name = node.symbol("type")?;
                if self.doc.struct_def(name).is_none() {
                    out.error(
                        codes::UNKNOWN_TYPE,
                        format!("unknown struct type '{name}'"),
                        None,
                        Some(node.id.clone()),
                    );
                    return None;
                }
                Some(IrType::Struct(name.to_string()))
            }
            "array_construct" => {
                let keys: Vec<String> = node
                    .arg_keys()
                    .filter(|k| !is_reserved_key(k))
                    .map(str::to_string)
                    .collect();
                let elem = keys
                    .first()
                    .and_then(|k| self.arg_type(node, k, out))
                    .unwrap_or(IrType::Float);
                Some(IrType::Array {
                    elem: Box::new(elem),
                    len: Some(keys.len()),
                })
            }
            "array_get" => match self.arg_type(node, "array", out)? {
                IrType::Array { elem, .. } => Some(*elem),
                other => other.vector_info().map(|_| IrType::Float),
            },
            "array_length" => Some(IrType::Int),
            "vec_swizzle" => {
                let channels = node.symbol("channels")?;
                match channels.len() {
                    1 => Some(IrType::Float),
                    n => IrType::float_vector(n),
                }
            }
            "mat_identity" => match node.field("size").and_then(Value::as_i64) {
                Some(3) => Some(IrType::Float3x3),
                Some(4) => Some(IrType::Float4x4),
                _ => None,
            },
            "var_set" => self.arg_type(node, "value", out),
            "array_set" => {
                let name = node.symbol("var")?;
                self.func.local_var(name).and_then(|v| IrType::parse(&v.ty))
            }
            op => {
                // everything else takes its output from the selected overload
                let signatures = ops::signatures(op)?;
                let args = self.resolved_args(node, out);
                match select_overload(signatures, &args) {
                    Ok(signature) => match &signature.output {
                        Some(ValidationType::Exact(t)) => Some(t.clone()),
                        _ => None,
                    },
                    Err(_) => None,
                }
            }
        }
    }
}

/// Type of a literal JSON value. Whole numbers are int, fractional float;
/// arrays are typed by their elements.
fn literal_type(value: &Value) -> Option<IrType> {
    match value {
        Value::Bool(_) => Some(IrType::Bool),
        Value::Number(n) => Some(if n.as_i64().is_some() {
            IrType::Int
        } else {
            IrType::Float
        }),
        Value::String(_) => Some(IrType::Str),
        Value::Array(items) => {
            let mut elem: Option<IrType> = None;
            for item in items {
                let t = literal_type(item)?;
                elem = Some(match elem {
                    None => t,
                    Some(prev) if prev == t => prev,
                    // int and float literals unify to float
                    Some(IrType::Int) if t == IrType::Float => IrType::Float,
                    Some(IrType::Float) if t == IrType::Int => IrType::Float,
                    Some(_) => return None,
                });
            }
            Some(IrType::Array {
                elem: Box::new(elem.unwrap_or(IrType::Float)),
                len: Some(items.len()),
            })
        }
        _ => None,
    }
}
