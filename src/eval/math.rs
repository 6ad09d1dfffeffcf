// src/eval/math.rs
//
// Scalar and element-wise math handlers. Floats follow IEEE-754: division
// may produce infinities and NaN, sqrt of a negative is NaN, and the
// classification ops report exactly what the hardware would.

use crate::error::ExecError;
use crate::value::RuntimeValue;

/// Normalized numeric operand: a scalar (tracking int-ness) or a vector.
enum Operand {
    Scalar { value: f64, is_int: bool },
    Vector(Vec<f64>),
}

fn operand(v: &RuntimeValue) -> Result<Operand, ExecError> {
    match v {
        RuntimeValue::Int(i) => Ok(Operand::Scalar {
            value: *i as f64,
            is_int: true,
        }),
        RuntimeValue::Float(f) => Ok(Operand::Scalar {
            value: *f,
            is_int: false,
        }),
        RuntimeValue::Bool(b) => Ok(Operand::Scalar {
            value: if *b { 1.0 } else { 0.0 },
            is_int: true,
        }),
        RuntimeValue::Vector(_) | RuntimeValue::Array(_) => Ok(Operand::Vector(v.as_vector()?)),
        other => Err(ExecError::TypeMismatch {
            node: String::new(),
            expected: "numeric".into(),
            found: other.type_name().into(),
        }),
    }
}

fn width_mismatch(a: usize, b: usize) -> ExecError {
    ExecError::TypeMismatch {
        node: String::new(),
        expected: format!("vector of width {a}"),
        found: format!("vector of width {b}"),
    }
}

/// Element-wise binary op with scalar broadcasting. Int results stay int
/// when both operands are int and `int_op` is provided.
pub fn binary(
    a: &RuntimeValue,
    b: &RuntimeValue,
    int_op: Option<fn(i64, i64) -> Result<i64, ExecError>>,
    float_op: fn(f64, f64) -> f64,
) -> Result<RuntimeValue, ExecError> {
    match (operand(a)?, operand(b)?) {
        (
            Operand::Scalar {
                value: x,
                is_int: xi,
            },
            Operand::Scalar {
                value: y,
                is_int: yi,
            },
        ) => {
            if xi && yi {
                if let Some(op) = int_op {
                    return Ok(RuntimeValue::Int(op(x as i64, y as i64)?));
                }
            }
            Ok(RuntimeValue::Float(float_op(x, y)))
        }
        (Operand::Vector(xs), Operand::Vector(ys)) => {
            if xs.len() != ys.len() {
                return Err(width_mismatch(xs.len(), ys.len()));
            }
            Ok(RuntimeValue::Vector(
                xs.iter().zip(&ys).map(|(x, y)| float_op(*x, *y)).collect(),
            ))
        }
        (Operand::Vector(xs), Operand::Scalar { value: y, .. }) => Ok(RuntimeValue::Vector(
            xs.iter().map(|x| float_op(*x, y)).collect(),
        )),
        (Operand::Scalar { value: x, .. }, Operand::Vector(ys)) => Ok(RuntimeValue::Vector(
            ys.iter().map(|y| float_op(x, *y)).collect(),
        )),
    }
}

pub fn unary(
    v: &RuntimeValue,
    int_op: Option<fn(i64) -> i64>,
    float_op: fn(f64) -> f64,
) -> Result<RuntimeValue, ExecError> {
    match operand(v)? {
        Operand::Scalar { value, is_int } => {
            if is_int {
                if let Some(op) = int_op {
                    return Ok(RuntimeValue::Int(op(value as i64)));
                }
            }
            Ok(RuntimeValue::Float(float_op(value)))
        }
        Operand::Vector(xs) => Ok(RuntimeValue::Vector(xs.iter().map(|x| float_op(*x)).collect())),
    }
}

/// Ternary element-wise op (mad, clamp, lerp, smoothstep). The third operand
/// broadcasts when the first two are vectors.
pub fn ternary(
    a: &RuntimeValue,
    b: &RuntimeValue,
    c: &RuntimeValue,
    float_op: fn(f64, f64, f64) -> f64,
) -> Result<RuntimeValue, ExecError> {
    match (operand(a)?, operand(b)?, operand(c)?) {
        (
            Operand::Scalar { value: x, .. },
            Operand::Scalar { value: y, .. },
            Operand::Scalar { value: z, .. },
        ) => Ok(RuntimeValue::Float(float_op(x, y, z))),
        (Operand::Vector(xs), Operand::Vector(ys), third) => {
            if xs.len() != ys.len() {
                return Err(width_mismatch(xs.len(), ys.len()));
            }
            let zs: Vec<f64> = match third {
                Operand::Scalar { value, .. } => vec![value; xs.len()],
                Operand::Vector(zs) => {
                    if zs.len() != xs.len() {
                        return Err(width_mismatch(xs.len(), zs.len()));
                    }
                    zs
                }
            };
            Ok(RuntimeValue::Vector(
                xs.iter()
                    .zip(&ys)
                    .zip(&zs)
                    .map(|((x, y), z)| float_op(*x, *y, *z))
                    .collect(),
            ))
        }
        _ => Err(ExecError::TypeMismatch {
            node: String::new(),
            expected: "matching scalar or vector operands".into(),
            found: "mixed operands".into(),
        }),
    }
}

/// Comparison: bool for scalars, 0.0/1.0 same-width vector element-wise.
pub fn compare(
    a: &RuntimeValue,
    b: &RuntimeValue,
    pred: fn(f64, f64) -> bool,
) -> Result<RuntimeValue, ExecError> {
    // Non-numeric equality is handled by the eq/neq entry points before
    // reaching here.
    match (operand(a)?, operand(b)?) {
        (Operand::Scalar { value: x, .. }, Operand::Scalar { value: y, .. }) => {
            Ok(RuntimeValue::Bool(pred(x, y)))
        }
        (Operand::Vector(xs), Operand::Vector(ys)) => {
            if xs.len() != ys.len() {
                return Err(width_mismatch(xs.len(), ys.len()));
            }
            Ok(RuntimeValue::Vector(
                xs.iter()
                    .zip(&ys)
                    .map(|(x, y)| if pred(*x, *y) { 1.0 } else { 0.0 })
                    .collect(),
            ))
        }
        (Operand::Vector(xs), Operand::Scalar { value: y, .. }) => Ok(RuntimeValue::Vector(
            xs.iter().map(|x| if pred(*x, y) { 1.0 } else { 0.0 }).collect(),
        )),
        (Operand::Scalar { value: x, .. }, Operand::Vector(ys)) => Ok(RuntimeValue::Vector(
            ys.iter().map(|y| if pred(x, *y) { 1.0 } else { 0.0 }).collect(),
        )),
    }
}

/// IEEE classification: bool for scalars, component-wise 0.0/1.0 vector.
pub fn classify(v: &RuntimeValue, pred: fn(f64) -> bool) -> Result<RuntimeValue, ExecError> {
    match operand(v)? {
        Operand::Scalar { value, .. } => Ok(RuntimeValue::Bool(pred(value))),
        Operand::Vector(xs) => Ok(RuntimeValue::Vector(
            xs.iter().map(|x| if pred(*x) { 1.0 } else { 0.0 }).collect(),
        )),
    }
}

pub fn checked_int_div(a: i64, b: i64) -> Result<i64, ExecError> {
    if b == 0 {
        return Err(ExecError::Runtime {
            node: String::new(),
            message: "integer division by zero".into(),
        });
    }
    Ok(a.wrapping_div(b))
}

pub fn checked_int_rem(a: i64, b: i64) -> Result<i64, ExecError> {
    if b == 0 {
        return Err(ExecError::Runtime {
            node: String::new(),
            message: "integer modulo by zero".into(),
        });
    }
    Ok(a.wrapping_rem(b))
}

pub fn int_pow(a: i64, b: i64) -> Result<i64, ExecError> {
    if b < 0 {
        return Err(ExecError::Runtime {
            node: String::new(),
            message: "negative integer exponent".into(),
        });
    }
    Ok(a.wrapping_pow(b.min(u32::MAX as i64) as u32))
}

/// frexp: v = m * 2^e with 0.5 <= |m| < 1. Zero (and non-finite values)
/// report m = v, e = 0.
pub fn frexp(v: f64) -> (f64, i32) {
    if v == 0.0 || !v.is_finite() {
        return (v, 0);
    }
    let bits = v.to_bits();
    let exp_bits = ((bits >> 52) & 0x7ff) as i64;
    if exp_bits == 0 {
        // subnormal: renormalize first
        let (m, e) = frexp(v * 2f64.powi(64));
        return (m, e - 64);
    }
    let e = (exp_bits - 1022) as i32;
    let m = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (m, e)
}

pub fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ieee_invariants() {
        // math_is_nan(math_sqrt(-1)) = true
        assert!((-1.0f64).sqrt().is_nan());
        // math_is_inf(math_div(1, 0)) = true
        let div = binary(
            &RuntimeValue::Float(1.0),
            &RuntimeValue::Float(0.0),
            None,
            |x, y| x / y,
        )
        .unwrap();
        assert_eq!(div, RuntimeValue::Float(f64::INFINITY));
        // math_is_finite(0) = true
        let fin = classify(&RuntimeValue::Int(0), f64::is_finite).unwrap();
        assert_eq!(fin, RuntimeValue::Bool(true));
    }

    #[test]
    fn classification_on_vectors_is_componentwise() {
        let v = RuntimeValue::Vector(vec![1.0, f64::NAN, f64::INFINITY]);
        assert_eq!(
            classify(&v, f64::is_nan).unwrap(),
            RuntimeValue::Vector(vec![0.0, 1.0, 0.0])
        );
    }

    #[test]
    fn broadcasting_lifts_scalars() {
        let v = RuntimeValue::Vector(vec![1.0, 2.0, 3.0]);
        let s = RuntimeValue::Int(2);
        assert_eq!(
            binary(&v, &s, None, |x, y| x * y).unwrap(),
            RuntimeValue::Vector(vec![2.0, 4.0, 6.0])
        );
        assert_eq!(
            binary(&s, &v, None, |x, y| x - y).unwrap(),
            RuntimeValue::Vector(vec![1.0, 0.0, -1.0])
        );
    }

    #[test]
    fn int_operands_stay_int() {
        let r = binary(
            &RuntimeValue::Int(7),
            &RuntimeValue::Int(2),
            Some(checked_int_div),
            |x, y| x / y,
        )
        .unwrap();
        assert_eq!(r, RuntimeValue::Int(3));
        assert!(binary(
            &RuntimeValue::Int(1),
            &RuntimeValue::Int(0),
            Some(checked_int_div),
            |x, y| x / y,
        )
        .is_err());
    }

    #[test]
    fn frexp_semantics() {
        assert_eq!(frexp(0.0), (0.0, 0));
        assert_eq!(frexp(1.0), (0.5, 1));
        assert_eq!(frexp(8.0), (0.5, 4));
        let (m, e) = frexp(-0.75);
        assert_eq!((m, e), (-0.75, 0));
        let (m, e) = frexp(3.0);
        assert_eq!((m, e), (0.75, 2));
        // reconstruction holds
        for v in [0.1, 123.456, -9.5e10, 1e-320] {
            let (m, e) = frexp(v);
            assert!((m * 2f64.powi(e) - v).abs() <= v.abs() * 1e-15);
            assert!((0.5..1.0).contains(&m.abs()), "{v} -> {m}");
        }
    }

    #[test]
    fn sign_of_zero_is_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-3.0), -1.0);
        assert_eq!(sign(0.5), 1.0);
    }

    #[test]
    fn mismatched_vector_widths_fail() {
        let a = RuntimeValue::Vector(vec![1.0, 2.0]);
        let b = RuntimeValue::Vector(vec![1.0, 2.0, 3.0]);
        assert!(binary(&a, &b, None, |x, y| x + y).is_err());
    }
}
