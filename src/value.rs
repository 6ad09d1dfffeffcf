// src/value.rs
//
// =============================================================================
// SHADERGRAPH: RUNTIME VALUES
// =============================================================================
//
// The tagged value universe shared by the op evaluator, the interpreter and
// the rasterizer. Matrices are stored row-major (9 or 16 elements).

use crate::error::ExecError;
use crate::ir::{IrDocument, IrType};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
    /// floatN / intN payloads. Int vectors round-trip through f64, which is
    /// exact for the 32-bit index ranges the IR works with.
    Vector(Vec<f64>),
    /// Row-major float3x3 (9) or float4x4 (16).
    Matrix(Vec<f64>),
    Struct(BTreeMap<String, RuntimeValue>),
    Array(Vec<RuntimeValue>),
    Void,
}

impl RuntimeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::Float(_) => "float",
            RuntimeValue::Int(_) => "int",
            RuntimeValue::Bool(_) => "bool",
            RuntimeValue::Str(_) => "string",
            RuntimeValue::Vector(_) => "vector",
            RuntimeValue::Matrix(_) => "matrix",
            RuntimeValue::Struct(_) => "struct",
            RuntimeValue::Array(_) => "array",
            RuntimeValue::Void => "void",
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, RuntimeValue::Void)
    }

    // ------------------------------------------------------------------
    // Narrowing accessors
    // ------------------------------------------------------------------

    pub fn as_f64(&self) -> Result<f64, ExecError> {
        match self {
            RuntimeValue::Float(v) => Ok(*v),
            RuntimeValue::Int(v) => Ok(*v as f64),
            RuntimeValue::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            other => Err(mismatch("float", other)),
        }
    }

    pub fn as_i64(&self) -> Result<i64, ExecError> {
        match self {
            RuntimeValue::Int(v) => Ok(*v),
            RuntimeValue::Float(v) => Ok(*v as i64),
            RuntimeValue::Bool(v) => Ok(*v as i64),
            other => Err(mismatch("int", other)),
        }
    }

    /// Truthiness for branch conditions.
    pub fn as_bool(&self) -> Result<bool, ExecError> {
        match self {
            RuntimeValue::Bool(v) => Ok(*v),
            RuntimeValue::Int(v) => Ok(*v != 0),
            RuntimeValue::Float(v) => Ok(*v != 0.0),
            other => Err(mismatch("bool", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, ExecError> {
        match self {
            RuntimeValue::Str(s) => Ok(s),
            other => Err(mismatch("string", other)),
        }
    }

    /// A vector payload. Arrays of scalars are accepted so that literal
    /// `[x, y, z]` arguments feed vector ops directly.
    pub fn as_vector(&self) -> Result<Vec<f64>, ExecError> {
        match self {
            RuntimeValue::Vector(v) => Ok(v.clone()),
            RuntimeValue::Array(items) => items.iter().map(|i| i.as_f64()).collect(),
            other => Err(mismatch("vector", other)),
        }
    }

    pub fn as_matrix(&self) -> Result<&[f64], ExecError> {
        match self {
            RuntimeValue::Matrix(m) => Ok(m),
            other => Err(mismatch("matrix", other)),
        }
    }

    // ------------------------------------------------------------------
    // JSON marshalling
    // ------------------------------------------------------------------

    /// Literal typing: whole numbers are `int`, fractional ones `float`.
    pub fn from_json(value: &Json) -> RuntimeValue {
        match value {
            Json::Null => RuntimeValue::Void,
            Json::Bool(b) => RuntimeValue::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RuntimeValue::Int(i)
                } else {
                    RuntimeValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => RuntimeValue::Str(s.clone()),
            Json::Array(items) => {
                RuntimeValue::Array(items.iter().map(RuntimeValue::from_json).collect())
            }
            Json::Object(map) => RuntimeValue::Struct(
                map.iter()
                    .map(|(k, v)| (k.clone(), RuntimeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Marshal a JSON value against a declared type, coercing numerics and
    /// packing arrays into vectors/matrices where the type asks for them.
    pub fn from_json_typed(
        value: &Json,
        ty: &IrType,
        doc: &IrDocument,
    ) -> Result<RuntimeValue, ExecError> {
        let numbers = |v: &Json| -> Option<Vec<f64>> {
            v.as_array()
                .map(|a| a.iter().filter_map(|x| x.as_f64()).collect::<Vec<_>>())
        };
        match ty {
            IrType::Float => Ok(RuntimeValue::Float(
                value.as_f64().ok_or_else(|| json_mismatch(ty, value))?,
            )),
            IrType::Int => Ok(RuntimeValue::Int(
                value.as_i64().ok_or_else(|| json_mismatch(ty, value))?,
            )),
            IrType::Bool => Ok(RuntimeValue::Bool(
                value.as_bool().ok_or_else(|| json_mismatch(ty, value))?,
            )),
            IrType::Str => Ok(RuntimeValue::Str(
                value
                    .as_str()
                    .ok_or_else(|| json_mismatch(ty, value))?
                    .to_string(),
            )),
            IrType::Float2 | IrType::Float3 | IrType::Float4 | IrType::Int2 | IrType::Int3
            | IrType::Int4 => {
                let (width, _) = ty.vector_info().unwrap();
                let nums = numbers(value).ok_or_else(|| json_mismatch(ty, value))?;
                if nums.len() != width {
                    return Err(json_mismatch(ty, value));
                }
                Ok(RuntimeValue::Vector(nums))
            }
            IrType::Float3x3 | IrType::Float4x4 => {
                let dim = ty.matrix_dim().unwrap();
                let nums = numbers(value).ok_or_else(|| json_mismatch(ty, value))?;
                if nums.len() != dim * dim {
                    return Err(json_mismatch(ty, value));
                }
                Ok(RuntimeValue::Matrix(nums))
            }
            IrType::Struct(name) => {
                let def = doc
                    .struct_def(name)
                    .ok_or_else(|| ExecError::UnknownResource(name.clone()))?;
                let obj = value.as_object().ok_or_else(|| json_mismatch(ty, value))?;
                let mut out = BTreeMap::new();
                for member in &def.members {
                    let mty = IrType::parse(&member.ty)
                        .ok_or_else(|| ExecError::UnknownResource(member.ty.clone()))?;
                    let v = match obj.get(&member.id) {
                        Some(v) => RuntimeValue::from_json_typed(v, &mty, doc)?,
                        None => RuntimeValue::zero_of(&mty, doc)?,
                    };
                    out.insert(member.id.clone(), v);
                }
                Ok(RuntimeValue::Struct(out))
            }
            IrType::Array { elem, .. } => {
                let items = value.as_array().ok_or_else(|| json_mismatch(ty, value))?;
                items
                    .iter()
                    .map(|v| RuntimeValue::from_json_typed(v, elem, doc))
                    .collect::<Result<Vec<_>, _>>()
                    .map(RuntimeValue::Array)
            }
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            RuntimeValue::Float(v) => json!(v),
            RuntimeValue::Int(v) => json!(v),
            RuntimeValue::Bool(v) => json!(v),
            RuntimeValue::Str(s) => json!(s),
            RuntimeValue::Vector(v) | RuntimeValue::Matrix(v) => json!(v),
            RuntimeValue::Struct(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            RuntimeValue::Array(items) => Json::Array(items.iter().map(|i| i.to_json()).collect()),
            RuntimeValue::Void => Json::Null,
        }
    }

    /// The zero value for a declared type.
    pub fn zero_of(ty: &IrType, doc: &IrDocument) -> Result<RuntimeValue, ExecError> {
        Ok(match ty {
            IrType::Float => RuntimeValue::Float(0.0),
            IrType::Int => RuntimeValue::Int(0),
            IrType::Bool => RuntimeValue::Bool(false),
            IrType::Str => RuntimeValue::Str(String::new()),
            IrType::Float2 | IrType::Int2 => RuntimeValue::Vector(vec![0.0; 2]),
            IrType::Float3 | IrType::Int3 => RuntimeValue::Vector(vec![0.0; 3]),
            IrType::Float4 | IrType::Int4 => RuntimeValue::Vector(vec![0.0; 4]),
            IrType::Float3x3 => RuntimeValue::Matrix(vec![0.0; 9]),
            IrType::Float4x4 => RuntimeValue::Matrix(vec![0.0; 16]),
            IrType::Struct(name) => {
                let def = doc
                    .struct_def(name)
                    .ok_or_else(|| ExecError::UnknownResource(name.clone()))?;
                let mut out = BTreeMap::new();
                for member in &def.members {
                    let mty = IrType::parse(&member.ty)
                        .ok_or_else(|| ExecError::UnknownResource(member.ty.clone()))?;
                    out.insert(member.id.clone(), RuntimeValue::zero_of(&mty, doc)?);
                }
                RuntimeValue::Struct(out)
            }
            IrType::Array { elem, len } => {
                let n = len.unwrap_or(0);
                let zero = RuntimeValue::zero_of(elem, doc)?;
                RuntimeValue::Array(vec![zero; n])
            }
        })
    }
}

fn mismatch(expected: &str, found: &RuntimeValue) -> ExecError {
    ExecError::TypeMismatch {
        node: String::new(),
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
}

fn json_mismatch(ty: &IrType, value: &Json) -> ExecError {
    ExecError::TypeMismatch {
        node: String::new(),
        expected: ty.to_string(),
        found: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_doc() -> IrDocument {
        IrDocument::from_json(json!({
            "version": "1",
            "meta": {"name": "t"},
            "entryPoint": "main",
            "functions": [{"id": "main", "kind": "cpu"}]
        }))
        .unwrap()
    }

    #[test]
    fn literal_number_typing() {
        assert_eq!(RuntimeValue::from_json(&json!(3)), RuntimeValue::Int(3));
        assert_eq!(RuntimeValue::from_json(&json!(3.5)), RuntimeValue::Float(3.5));
        assert_eq!(RuntimeValue::from_json(&json!(true)), RuntimeValue::Bool(true));
    }

    #[test]
    fn typed_marshalling_packs_vectors() {
        let doc = empty_doc();
        let v = RuntimeValue::from_json_typed(&json!([1, 2, 3]), &IrType::Float3, &doc).unwrap();
        assert_eq!(v, RuntimeValue::Vector(vec![1.0, 2.0, 3.0]));
        assert!(RuntimeValue::from_json_typed(&json!([1, 2]), &IrType::Float3, &doc).is_err());
    }

    #[test]
    fn array_of_scalars_feeds_vector_ops() {
        let arr = RuntimeValue::Array(vec![RuntimeValue::Int(1), RuntimeValue::Float(2.0)]);
        assert_eq!(arr.as_vector().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn zero_values() {
        let doc = empty_doc();
        assert_eq!(
            RuntimeValue::zero_of(&IrType::Float4, &doc).unwrap(),
            RuntimeValue::Vector(vec![0.0; 4])
        );
        assert_eq!(
            RuntimeValue::zero_of(&IrType::Int, &doc).unwrap(),
            RuntimeValue::Int(0)
        );
    }

    #[test]
    fn json_round_trip() {
        let v = RuntimeValue::Struct(
            [
                ("a".to_string(), RuntimeValue::Int(1)),
                ("b".to_string(), RuntimeValue::Vector(vec![1.0, 2.0])),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(v.to_json(), json!({"a": 1, "b": [1.0, 2.0]}));
    }
}
