// src/eval/mod.rs
//
// =============================================================================
// SHADERGRAPH: OP EVALUATOR
// =============================================================================
//
// Pure, context-free op handlers: value in, value out. Context-dependent ops
// (var_get, buffer_load, builtin_get, loop_index, texture reads and every
// executable op) are driven by the interpreter, which resolves their
// environment before or instead of calling into this table.
//
// The two code generators delegate op math back to this table through their
// runtime harness, which is what keeps the three consumers observably
// identical.

pub mod linalg;
pub mod math;

use crate::error::ExecError;
use crate::ir::is_reserved_key;
use crate::ops;
use crate::value::RuntimeValue;
use std::collections::HashMap;

/// Resolved arguments for one node: input key -> value.
pub type Args = HashMap<String, RuntimeValue>;

fn require<'a>(args: &'a Args, node: &str, key: &str) -> Result<&'a RuntimeValue, ExecError> {
    args.get(key).ok_or_else(|| ExecError::MissingArgument {
        node: node.to_string(),
        key: key.to_string(),
    })
}

/// Evaluate a pure op. `node` is used only for error attribution.
pub fn eval_pure(op: &str, node: &str, args: &Args) -> Result<RuntimeValue, ExecError> {
    let a = |key: &str| require(args, node, key);
    let result = match op {
        // --- Arithmetic ---------------------------------------------------
        "math_add" => math::binary(a("a")?, a("b")?, Some(|x, y| Ok(x.wrapping_add(y))), |x, y| {
            x + y
        }),
        "math_sub" => math::binary(a("a")?, a("b")?, Some(|x, y| Ok(x.wrapping_sub(y))), |x, y| {
            x - y
        }),
        "math_mul" => math::binary(a("a")?, a("b")?, Some(|x, y| Ok(x.wrapping_mul(y))), |x, y| {
            x * y
        }),
        "math_div" => math::binary(a("a")?, a("b")?, Some(math::checked_int_div), |x, y| x / y),
        "math_mod" => math::binary(a("a")?, a("b")?, Some(math::checked_int_rem), |x, y| x % y),
        "math_pow" => math::binary(a("a")?, a("b")?, Some(math::int_pow), f64::powf),
        "math_min" => math::binary(a("a")?, a("b")?, Some(|x, y| Ok(x.min(y))), f64::min),
        "math_max" => math::binary(a("a")?, a("b")?, Some(|x, y| Ok(x.max(y))), f64::max),
        "math_atan2" => math::binary(a("a")?, a("b")?, None, f64::atan2),
        "math_step" => math::binary(a("a")?, a("b")?, None, |edge, x| {
            if x < edge {
                0.0
            } else {
                1.0
            }
        }),

        // --- Unary --------------------------------------------------------
        "math_abs" => math::unary(a("value")?, Some(i64::wrapping_abs), f64::abs),
        "math_neg" => math::unary(a("value")?, Some(i64::wrapping_neg), |x| -x),
        "math_sign" => math::unary(a("value")?, Some(i64::signum), math::sign),
        "math_floor" => math::unary(a("value")?, None, f64::floor),
        "math_ceil" => math::unary(a("value")?, None, f64::ceil),
        "math_round" => math::unary(a("value")?, None, f64::round),
        "math_frac" => math::unary(a("value")?, None, |x| x - x.floor()),
        "math_sqrt" => math::unary(a("value")?, None, f64::sqrt),
        "math_sin" => math::unary(a("value")?, None, f64::sin),
        "math_cos" => math::unary(a("value")?, None, f64::cos),
        "math_tan" => math::unary(a("value")?, None, f64::tan),
        "math_asin" => math::unary(a("value")?, None, f64::asin),
        "math_acos" => math::unary(a("value")?, None, f64::acos),
        "math_atan" => math::unary(a("value")?, None, f64::atan),
        "math_exp" => math::unary(a("value")?, None, f64::exp),
        "math_log" => math::unary(a("value")?, None, f64::ln),

        // --- Ternary ------------------------------------------------------
        "math_mad" => math::ternary(a("a")?, a("b")?, a("c")?, |x, y, z| x * y + z),
        "math_clamp" => math::ternary(a("value")?, a("min")?, a("max")?, |v, lo, hi| {
            v.max(lo).min(hi)
        }),
        "math_lerp" => math::ternary(a("a")?, a("b")?, a("t")?, |x, y, t| x + (y - x) * t),
        "math_smoothstep" => math::ternary(a("a")?, a("b")?, a("t")?, math::smoothstep),

        // --- Classification / frexp ---------------------------------------
        "math_is_nan" => math::classify(a("value")?, f64::is_nan),
        "math_is_inf" => math::classify(a("value")?, f64::is_infinite),
        "math_is_finite" => math::classify(a("value")?, f64::is_finite),
        "math_mantissa" => a("value")?
            .as_f64()
            .map(|v| RuntimeValue::Float(math::frexp(v).0)),
        "math_exponent" => a("value")?
            .as_f64()
            .map(|v| RuntimeValue::Int(math::frexp(v).1 as i64)),

        // --- Casts --------------------------------------------------------
        "math_to_int" => a("value")?.as_i64().map(RuntimeValue::Int),
        "math_to_float" => a("value")?.as_f64().map(RuntimeValue::Float),

        // --- Comparison ---------------------------------------------------
        "math_lt" => math::compare(a("a")?, a("b")?, |x, y| x < y),
        "math_lte" => math::compare(a("a")?, a("b")?, |x, y| x <= y),
        "math_gt" => math::compare(a("a")?, a("b")?, |x, y| x > y),
        "math_gte" => math::compare(a("a")?, a("b")?, |x, y| x >= y),
        "math_eq" => equality(a("a")?, a("b")?, false),
        "math_neq" => equality(a("a")?, a("b")?, true),

        // --- Logic --------------------------------------------------------
        "logic_and" => Ok(RuntimeValue::Bool(a("a")?.as_bool()? && a("b")?.as_bool()?)),
        "logic_or" => Ok(RuntimeValue::Bool(a("a")?.as_bool()? || a("b")?.as_bool()?)),
        "logic_not" => Ok(RuntimeValue::Bool(!a("value")?.as_bool()?)),

        // --- Vectors ------------------------------------------------------
        "vec_construct" => construct_vector(args, node),
        "vec_swizzle" => linalg::swizzle(a("value")?, a("channels")?.as_str()?),
        "vec_dot" => linalg::dot(a("a")?, a("b")?).map(RuntimeValue::Float),
        "vec_cross" => linalg::cross(a("a")?, a("b")?),
        "vec_length" => linalg::length(a("value")?).map(RuntimeValue::Float),
        "vec_distance" => linalg::distance(a("a")?, a("b")?).map(RuntimeValue::Float),
        "vec_normalize" => linalg::normalize(a("value")?),

        // --- Matrices -----------------------------------------------------
        "mat_identity" => linalg::identity(a("size")?.as_i64()?),
        "mat_multiply" => linalg::multiply(a("a")?.as_matrix()?, a("b")?.as_matrix()?),
        "mat_transform" => linalg::transform(a("matrix")?.as_matrix()?, a("vector")?),
        "mat_transpose" => linalg::transpose(a("matrix")?.as_matrix()?),
        "mat_invert" => linalg::invert(a("matrix")?.as_matrix()?),
        "mat_rotation" => linalg::rotation(a("axis")?.as_str()?, a("angle")?.as_f64()?),

        // --- Quaternions --------------------------------------------------
        "quat_from_axis_angle" => linalg::quat_from_axis_angle(a("axis")?, a("angle")?.as_f64()?),
        "quat_mul" => linalg::quat_mul(a("a")?, a("b")?),
        "quat_normalize" => linalg::quat_normalize(a("value")?),
        "quat_slerp" => linalg::quat_slerp(a("a")?, a("b")?, a("t")?.as_f64()?),
        "quat_to_float4x4" => linalg::quat_to_matrix(a("value")?),

        // --- Color --------------------------------------------------------
        "color_mix" => linalg::color_mix(a("a")?, a("b")?),

        // --- Structural ---------------------------------------------------
        "struct_construct" => Ok(RuntimeValue::Struct(
            args.iter()
                .filter(|(k, _)| !is_reserved_key(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )),
        "struct_get" => struct_get(a("value")?, a("field")?.as_str()?, node),
        "array_construct" => Ok(RuntimeValue::Array(ordered_values(args))),
        "array_get" => array_get(a("array")?, a("index")?.as_i64()?, node),
        "array_length" => match a("array")? {
            RuntimeValue::Array(items) => Ok(RuntimeValue::Int(items.len() as i64)),
            RuntimeValue::Vector(v) => Ok(RuntimeValue::Int(v.len() as i64)),
            other => Err(ExecError::TypeMismatch {
                node: node.to_string(),
                expected: "array".into(),
                found: other.type_name().into(),
            }),
        },
        "literal" => a("value").cloned(),
        "const_get" => {
            let name = a("name")?.as_str()?;
            ops::constant(name)
                .map(RuntimeValue::Float)
                .ok_or_else(|| ExecError::InvalidConstant(name.to_string()))
        }

        other => Err(ExecError::UnknownOp {
            node: node.to_string(),
            op: other.to_string(),
        }),
    };
    result.map_err(|e| e.at_node(node))
}

fn equality(a: &RuntimeValue, b: &RuntimeValue, negate: bool) -> Result<RuntimeValue, ExecError> {
    match (a, b) {
        (RuntimeValue::Str(x), RuntimeValue::Str(y)) => Ok(RuntimeValue::Bool((x == y) != negate)),
        (RuntimeValue::Bool(x), RuntimeValue::Bool(y)) => {
            Ok(RuntimeValue::Bool((x == y) != negate))
        }
        _ => {
            if negate {
                math::compare(a, b, |x, y| x != y)
            } else {
                math::compare(a, b, |x, y| x == y)
            }
        }
    }
}

fn construct_vector(args: &Args, node: &str) -> Result<RuntimeValue, ExecError> {
    let mut out = Vec::with_capacity(4);
    for key in ["x", "y", "z", "w"] {
        match args.get(key) {
            Some(v) => out.push(v.as_f64()?),
            None => break,
        }
    }
    if out.len() < 2 {
        return Err(ExecError::MissingArgument {
            node: node.to_string(),
            key: "y".into(),
        });
    }
    Ok(RuntimeValue::Vector(out))
}

fn struct_get(value: &RuntimeValue, field: &str, node: &str) -> Result<RuntimeValue, ExecError> {
    match value {
        RuntimeValue::Struct(map) => map.get(field).cloned().ok_or_else(|| ExecError::Runtime {
            node: node.to_string(),
            message: format!("struct has no field '{field}'"),
        }),
        other => Err(ExecError::TypeMismatch {
            node: node.to_string(),
            expected: "struct".into(),
            found: other.type_name().into(),
        }),
    }
}

fn array_get(value: &RuntimeValue, index: i64, node: &str) -> Result<RuntimeValue, ExecError> {
    if index < 0 {
        return Err(ExecError::NegativeIndex {
            node: node.to_string(),
            index,
        });
    }
    match value {
        RuntimeValue::Array(items) => items
            .get(index as usize)
            .cloned()
            .ok_or(ExecError::ArrayOob {
                index,
                len: items.len(),
            }),
        RuntimeValue::Vector(v) => v
            .get(index as usize)
            .copied()
            .map(RuntimeValue::Float)
            .ok_or(ExecError::ArrayOob {
                index,
                len: v.len(),
            }),
        other => Err(ExecError::TypeMismatch {
            node: node.to_string(),
            expected: "array".into(),
            found: other.type_name().into(),
        }),
    }
}

/// Variadic element collection ordered numerically (`"0"`, `"1"`, ...) with
/// non-numeric keys after, lexically.
fn ordered_values(args: &Args) -> Vec<RuntimeValue> {
    let mut keys: Vec<&String> = args.keys().filter(|k| !is_reserved_key(k)).collect();
    keys.sort_by(|a, b| match (a.parse::<usize>(), b.parse::<usize>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    keys.into_iter().map(|k| args[k].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, RuntimeValue)]) -> Args {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn dispatch_basics() {
        let r = eval_pure(
            "math_add",
            "n",
            &args(&[("a", RuntimeValue::Int(2)), ("b", RuntimeValue::Int(3))]),
        )
        .unwrap();
        assert_eq!(r, RuntimeValue::Int(5));

        let r = eval_pure(
            "math_lerp",
            "n",
            &args(&[
                ("a", RuntimeValue::Float(0.0)),
                ("b", RuntimeValue::Float(10.0)),
                ("t", RuntimeValue::Float(0.25)),
            ]),
        )
        .unwrap();
        assert_eq!(r, RuntimeValue::Float(2.5));
    }

    #[test]
    fn unknown_op_is_an_error() {
        let err = eval_pure("math_bogus", "n7", &Args::new()).unwrap_err();
        assert_eq!(
            err,
            ExecError::UnknownOp {
                node: "n7".into(),
                op: "math_bogus".into()
            }
        );
    }

    #[test]
    fn missing_argument_names_the_key() {
        let err = eval_pure("math_add", "n1", &args(&[("a", RuntimeValue::Int(1))])).unwrap_err();
        assert_eq!(
            err,
            ExecError::MissingArgument {
                node: "n1".into(),
                key: "b".into()
            }
        );
    }

    #[test]
    fn struct_construct_and_get() {
        let s = eval_pure(
            "struct_construct",
            "n",
            &args(&[
                ("type", RuntimeValue::Str("Particle".into())),
                ("pos", RuntimeValue::Vector(vec![1.0, 2.0, 3.0])),
                ("mass", RuntimeValue::Float(4.0)),
            ]),
        )
        .unwrap();
        // reserved `type` key does not become a member
        if let RuntimeValue::Struct(map) = &s {
            assert_eq!(map.len(), 2);
        } else {
            panic!("expected struct");
        }
        let got = eval_pure(
            "struct_get",
            "n",
            &args(&[("value", s), ("field", RuntimeValue::Str("mass".into()))]),
        )
        .unwrap();
        assert_eq!(got, RuntimeValue::Float(4.0));
    }

    #[test]
    fn array_ops() {
        let arr = eval_pure(
            "array_construct",
            "n",
            &args(&[
                ("1", RuntimeValue::Int(20)),
                ("0", RuntimeValue::Int(10)),
                ("2", RuntimeValue::Int(30)),
            ]),
        )
        .unwrap();
        assert_eq!(
            arr,
            RuntimeValue::Array(vec![
                RuntimeValue::Int(10),
                RuntimeValue::Int(20),
                RuntimeValue::Int(30)
            ])
        );
        let got = eval_pure(
            "array_get",
            "n",
            &args(&[("array", arr.clone()), ("index", RuntimeValue::Int(1))]),
        )
        .unwrap();
        assert_eq!(got, RuntimeValue::Int(20));
        let err = eval_pure(
            "array_get",
            "n",
            &args(&[("array", arr), ("index", RuntimeValue::Int(-1))]),
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::NegativeIndex { .. }));
    }

    #[test]
    fn const_get_rejects_unknown_names() {
        let ok = eval_pure(
            "const_get",
            "n",
            &args(&[("name", RuntimeValue::Str("PI".into()))]),
        )
        .unwrap();
        assert_eq!(ok, RuntimeValue::Float(std::f64::consts::PI));
        let err = eval_pure(
            "const_get",
            "n",
            &args(&[("name", RuntimeValue::Str("TAO".into()))]),
        )
        .unwrap_err();
        assert_eq!(err, ExecError::InvalidConstant("TAO".into()));
    }

    #[test]
    fn vec_construct_arity() {
        let v = eval_pure(
            "vec_construct",
            "n",
            &args(&[
                ("x", RuntimeValue::Int(1)),
                ("y", RuntimeValue::Int(2)),
                ("z", RuntimeValue::Float(3.0)),
            ]),
        )
        .unwrap();
        assert_eq!(v, RuntimeValue::Vector(vec![1.0, 2.0, 3.0]));
    }
}
