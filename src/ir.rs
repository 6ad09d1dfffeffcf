// src/ir.rs
//
// =============================================================================
// SHADERGRAPH: IR SCHEMA AUTHORITY
// =============================================================================
//
// The single source of truth for the document model shared by the validator,
// the reference interpreter and both code generators.
//
// Design principles:
// 1. Lossless JSON round-trips: nodes keep their op-specific keys verbatim.
// 2. Symbols vs. data: a fixed key table decides which node fields name
//    entities and which carry values (see RESERVED_KEYS).
// 3. Types are authored as strings and parsed once into IrType.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

// ============================================================================
// 1. TYPE UNIVERSE
// ============================================================================

/// Names of the fixed primitive types.
pub const PRIMITIVE_TYPES: &[&str] = &[
    "float", "int", "bool", "string", "float2", "float3", "float4", "int2", "int3", "int4",
    "float3x3", "float4x4",
];

/// Built-in slot names and the type each produces through `builtin_get`.
pub const BUILTIN_TYPES: &[(&str, &str)] = &[
    ("global_invocation_id", "int3"),
    ("local_invocation_id", "int3"),
    ("workgroup_id", "int3"),
    ("num_workgroups", "int3"),
    ("local_invocation_index", "int"),
    ("vertex_index", "int"),
    ("instance_index", "int"),
    ("position", "float4"),
];

/// Node keys that always hold a symbol (an entity name), never a value to
/// resolve through the data graph.
pub const RESERVED_KEYS: &[&str] = &[
    "var", "func", "resource", "buffer", "tex", "texture", "loop", "type", "field", "member",
    "channels", "mask", "target", "vertex", "fragment", "name",
];

/// Node keys that are identity/bookkeeping, not op arguments.
pub const IDENTITY_KEYS: &[&str] = &["id", "op", "metadata", "const_data"];

/// Reserved execution-port names on edges.
pub const EXEC_PORTS: &[&str] = &[
    "exec_in",
    "exec_out",
    "exec_true",
    "exec_false",
    "exec_body",
    "exec_completed",
];

/// A parsed type expression.
///
/// Struct names are not resolved here; the validator checks that every
/// `Struct` id names a declared struct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Float,
    Int,
    Bool,
    Str,
    Float2,
    Float3,
    Float4,
    Int2,
    Int3,
    Int4,
    Float3x3,
    Float4x4,
    Struct(String),
    Array {
        elem: Box<IrType>,
        /// `None` is a dynamic array, legal only as a global resource.
        len: Option<usize>,
    },
}

impl IrType {
    /// Parse a type string (`"float3"`, `"array<float, 16>"`, a struct id).
    pub fn parse(s: &str) -> Option<IrType> {
        let s = s.trim();
        let prim = match s {
            "float" => Some(IrType::Float),
            "int" => Some(IrType::Int),
            "bool" => Some(IrType::Bool),
            "string" => Some(IrType::Str),
            "float2" => Some(IrType::Float2),
            "float3" => Some(IrType::Float3),
            "float4" => Some(IrType::Float4),
            "int2" => Some(IrType::Int2),
            "int3" => Some(IrType::Int3),
            "int4" => Some(IrType::Int4),
            "float3x3" => Some(IrType::Float3x3),
            "float4x4" => Some(IrType::Float4x4),
            _ => None,
        };
        if prim.is_some() {
            return prim;
        }
        if let Some(rest) = s.strip_prefix("array<") {
            let inner = rest.strip_suffix('>')?;
            return match inner.rsplit_once(',') {
                Some((elem, len)) => {
                    let len: usize = len.trim().parse().ok()?;
                    Some(IrType::Array {
                        elem: Box::new(IrType::parse(elem)?),
                        len: Some(len),
                    })
                }
                None => Some(IrType::Array {
                    elem: Box::new(IrType::parse(inner)?),
                    len: None,
                }),
            };
        }
        // Bare identifiers name user structs. Anything with punctuation is
        // malformed.
        if !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Some(IrType::Struct(s.to_string()));
        }
        None
    }

    /// Vector width and element kind, if this is a vector type.
    pub fn vector_info(&self) -> Option<(usize, bool)> {
        match self {
            IrType::Float2 => Some((2, true)),
            IrType::Float3 => Some((3, true)),
            IrType::Float4 => Some((4, true)),
            IrType::Int2 => Some((2, false)),
            IrType::Int3 => Some((3, false)),
            IrType::Int4 => Some((4, false)),
            _ => None,
        }
    }

    pub fn float_vector(width: usize) -> Option<IrType> {
        match width {
            2 => Some(IrType::Float2),
            3 => Some(IrType::Float3),
            4 => Some(IrType::Float4),
            _ => None,
        }
    }

    pub fn int_vector(width: usize) -> Option<IrType> {
        match width {
            2 => Some(IrType::Int2),
            3 => Some(IrType::Int3),
            4 => Some(IrType::Int4),
            _ => None,
        }
    }

    pub fn is_scalar_numeric(&self) -> bool {
        matches!(self, IrType::Float | IrType::Int)
    }

    pub fn matrix_dim(&self) -> Option<usize> {
        match self {
            IrType::Float3x3 => Some(3),
            IrType::Float4x4 => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Float => write!(f, "float"),
            IrType::Int => write!(f, "int"),
            IrType::Bool => write!(f, "bool"),
            IrType::Str => write!(f, "string"),
            IrType::Float2 => write!(f, "float2"),
            IrType::Float3 => write!(f, "float3"),
            IrType::Float4 => write!(f, "float4"),
            IrType::Int2 => write!(f, "int2"),
            IrType::Int3 => write!(f, "int3"),
            IrType::Int4 => write!(f, "int4"),
            IrType::Float3x3 => write!(f, "float3x3"),
            IrType::Float4x4 => write!(f, "float4x4"),
            IrType::Struct(name) => write!(f, "{name}"),
            IrType::Array { elem, len: Some(n) } => write!(f, "array<{elem}, {n}>"),
            IrType::Array { elem, len: None } => write!(f, "array<{elem}>"),
        }
    }
}

/// Look up the type a built-in slot produces.
pub fn builtin_type(name: &str) -> Option<IrType> {
    BUILTIN_TYPES
        .iter()
        .find(|(n, _)| *n == name)
        .and_then(|(_, t)| IrType::parse(t))
}

// ============================================================================
// 2. DOCUMENT MODEL
// ============================================================================

/// Raised when a JSON value does not have the document shape.
#[derive(Debug, Error)]
#[error("structural error: {0}")]
pub struct StructuralError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrDocument {
    pub version: String,
    pub meta: Meta,
    /// Id of the CPU function that drives the program.
    #[serde(rename = "entryPoint")]
    pub entry_point: String,
    #[serde(default)]
    pub inputs: Vec<InputDef>,
    #[serde(default)]
    pub resources: Vec<ResourceDef>,
    #[serde(default)]
    pub structs: Vec<StructDef>,
    #[serde(default)]
    pub globals: Vec<GlobalDef>,
    pub functions: Vec<FunctionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl IrDocument {
    /// Parse an arbitrary JSON value into a document.
    pub fn from_json(value: Value) -> Result<IrDocument, StructuralError> {
        serde_json::from_value(value).map_err(|e| StructuralError(e.to_string()))
    }

    /// Serialize back to JSON. Lossless for documents built by `from_json`.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("document model is always representable")
    }

    pub fn function(&self, id: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn struct_def(&self, id: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.id == id)
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDef> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn input(&self, id: &str) -> Option<&InputDef> {
        self.inputs.iter().find(|i| i.id == id)
    }

    pub fn global(&self, id: &str) -> Option<&GlobalDef> {
        self.globals.iter().find(|g| g.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

/// A scalar or texture uniform addressable by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDef {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Buffer,
    Texture,
    Atomic,
}

/// Sizing strategy for a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SizeSpec {
    /// Element count (buffers, atomics).
    Fixed(u64),
    /// Fixed pixel extent (textures).
    Extent { width: u32, height: u32 },
    /// Follows the viewport, scaled.
    Viewport { viewport: f64 },
}

/// Per-frame and per-resize lifecycle rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSpec {
    /// When false the resource is cleared at the start of every frame.
    #[serde(default)]
    pub persistent: bool,
    #[serde(default = "default_true", rename = "clearOnResize")]
    pub clear_on_resize: bool,
    #[serde(default, rename = "clearValue", skip_serializing_if = "Option::is_none")]
    pub clear_value: Option<Value>,
}

fn default_true() -> bool {
    true
}

impl Default for PersistenceSpec {
    fn default() -> Self {
        Self {
            persistent: false,
            clear_on_resize: true,
            clear_value: None,
        }
    }
}

/// A global resource: buffer, texture or atomic counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDef {
    pub id: String,
    pub kind: ResourceKind,
    /// Element type for buffers (`float`, a struct id, ...).
    #[serde(default, rename = "elementType", skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    /// Texel format for textures (`rgba8`, `rgba32f`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub size: SizeSpec,
    #[serde(default)]
    pub persistence: PersistenceSpec,
    /// Texture sampling controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<WrapMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDef {
    pub id: String,
    pub members: Vec<StructMember>,
}

impl StructDef {
    /// Member carrying the given builtin tag, if any.
    pub fn builtin_member(&self, tag: &str) -> Option<&StructMember> {
        self.members.iter().find(|m| m.builtin.as_deref() == Some(tag))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructMember {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    /// Stage built-in the member maps to (`position`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<String>,
}

/// A shared data value addressable by `var_get`/`var_set` from any function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDef {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

// ============================================================================
// 3. FUNCTIONS, NODES, EDGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Cpu,
    Shader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalVar {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, rename = "initialValue", skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub id: String,
    pub kind: FunctionKind,
    #[serde(default)]
    pub inputs: Vec<PortDef>,
    #[serde(default)]
    pub outputs: Vec<PortDef>,
    #[serde(default, rename = "localVars")]
    pub local_vars: Vec<LocalVar>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl FunctionDef {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn local_var(&self, id: &str) -> Option<&LocalVar> {
        self.local_vars.iter().find(|v| v.id == id)
    }

    pub fn input_port(&self, id: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.id == id)
    }
}

/// A graph node. Op-specific keys survive round-trips in `fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub const_data: Option<Value>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl Node {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A reserved key holding a symbol, as a string.
    pub fn symbol(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    /// Keys that participate in argument resolution: everything that is not
    /// identity bookkeeping. Reserved keys are still arguments, they just
    /// resolve as symbols.
    pub fn arg_keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .keys()
            .map(|k| k.as_str())
            .filter(|k| !IDENTITY_KEYS.contains(k))
    }
}

/// Whether a key always names an entity rather than data.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    #[default]
    Data,
    Execution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    #[serde(rename = "portOut")]
    pub port_out: String,
    pub to: String,
    #[serde(rename = "portIn")]
    pub port_in: String,
    #[serde(default, rename = "type")]
    pub kind: EdgeKind,
}

/// Executable ops sit on the execution graph and may have side effects;
/// everything else is a pure data node pulled lazily.
pub fn is_executable_op(op: &str) -> bool {
    op.starts_with("cmd_")
        || op.starts_with("flow_")
        || matches!(
            op,
            "var_set" | "array_set" | "buffer_store" | "texture_store" | "call_func" | "func_return"
        )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_primitives_and_arrays() {
        assert_eq!(IrType::parse("float3"), Some(IrType::Float3));
        assert_eq!(
            IrType::parse("array<int, 8>"),
            Some(IrType::Array {
                elem: Box::new(IrType::Int),
                len: Some(8)
            })
        );
        assert_eq!(
            IrType::parse("array<float>"),
            Some(IrType::Array {
                elem: Box::new(IrType::Float),
                len: None
            })
        );
        assert_eq!(IrType::parse("Particle"), Some(IrType::Struct("Particle".into())));
        assert_eq!(IrType::parse("array<"), None);
        assert_eq!(IrType::parse("foo bar"), None);
    }

    #[test]
    fn type_display_round_trips() {
        for s in ["float", "int4", "float4x4", "array<float3, 4>", "Particle"] {
            assert_eq!(IrType::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn node_keeps_unknown_keys() {
        let raw = json!({
            "id": "n1",
            "op": "math_add",
            "a": 1,
            "b": "other_node",
            "weird_key": {"nested": true}
        });
        let node: Node = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(node.op, "math_add");
        assert_eq!(node.field("weird_key").unwrap()["nested"], json!(true));
        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn missing_required_fields_fail_structurally() {
        let err = IrDocument::from_json(json!({"version": "1"})).unwrap_err();
        assert!(err.to_string().contains("structural error"));
    }

    #[test]
    fn executable_classification() {
        for op in ["cmd_dispatch", "flow_loop", "var_set", "call_func", "func_return"] {
            assert!(is_executable_op(op), "{op}");
        }
        for op in ["math_add", "var_get", "literal", "buffer_load", "texture_sample"] {
            assert!(!is_executable_op(op), "{op}");
        }
    }

    #[test]
    fn size_spec_shapes() {
        let fixed: SizeSpec = serde_json::from_value(json!(64)).unwrap();
        assert_eq!(fixed, SizeSpec::Fixed(64));
        let extent: SizeSpec = serde_json::from_value(json!({"width": 8, "height": 4})).unwrap();
        assert_eq!(extent, SizeSpec::Extent { width: 8, height: 4 });
        let vp: SizeSpec = serde_json::from_value(json!({"viewport": 0.5})).unwrap();
        assert_eq!(vp, SizeSpec::Viewport { viewport: 0.5 });
    }
}
