// src/eval/linalg.rs
//
// Vector, matrix, quaternion and color handlers. Matrices are row-major;
// quaternions use the [x, y, z, w] convention with w scalar.

use crate::error::ExecError;
use crate::value::RuntimeValue;

fn runtime(message: impl Into<String>) -> ExecError {
    ExecError::Runtime {
        node: String::new(),
        message: message.into(),
    }
}

// ============================================================================
// 1. VECTORS
// ============================================================================

pub fn swizzle(value: &RuntimeValue, channels: &str) -> Result<RuntimeValue, ExecError> {
    let v = value.as_vector()?;
    let mut out = Vec::with_capacity(channels.len());
    for c in channels.chars() {
        let idx = match c {
            'x' | 'r' => 0,
            'y' | 'g' => 1,
            'z' | 'b' => 2,
            'w' | 'a' => 3,
            other => return Err(runtime(format!("invalid swizzle channel '{other}'"))),
        };
        let component = v
            .get(idx)
            .copied()
            .ok_or_else(|| runtime(format!("swizzle channel '{c}' out of range")))?;
        out.push(component);
    }
    match out.len() {
        0 => Err(runtime("empty swizzle")),
        1 => Ok(RuntimeValue::Float(out[0])),
        _ => Ok(RuntimeValue::Vector(out)),
    }
}

pub fn dot(a: &RuntimeValue, b: &RuntimeValue) -> Result<f64, ExecError> {
    let (a, b) = (a.as_vector()?, b.as_vector()?);
    if a.len() != b.len() {
        return Err(runtime("dot product of mismatched widths"));
    }
    Ok(a.iter().zip(&b).map(|(x, y)| x * y).sum())
}

pub fn cross(a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, ExecError> {
    let (a, b) = (a.as_vector()?, b.as_vector()?);
    if a.len() != 3 || b.len() != 3 {
        return Err(runtime("cross product requires float3 operands"));
    }
    Ok(RuntimeValue::Vector(vec![
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]))
}

pub fn length(v: &RuntimeValue) -> Result<f64, ExecError> {
    Ok(v.as_vector()?.iter().map(|x| x * x).sum::<f64>().sqrt())
}

pub fn normalize(v: &RuntimeValue) -> Result<RuntimeValue, ExecError> {
    let xs = v.as_vector()?;
    let len = xs.iter().map(|x| x * x).sum::<f64>().sqrt();
    Ok(RuntimeValue::Vector(xs.iter().map(|x| x / len).collect()))
}

pub fn distance(a: &RuntimeValue, b: &RuntimeValue) -> Result<f64, ExecError> {
    let (a, b) = (a.as_vector()?, b.as_vector()?);
    if a.len() != b.len() {
        return Err(runtime("distance of mismatched widths"));
    }
    Ok(a.iter()
        .zip(&b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt())
}

// ============================================================================
// 2. MATRICES (row-major)
// ============================================================================

fn matrix_dim(m: &[f64]) -> Result<usize, ExecError> {
    match m.len() {
        9 => Ok(3),
        16 => Ok(4),
        n => Err(runtime(format!("matrix payload of {n} elements"))),
    }
}

pub fn identity(size: i64) -> Result<RuntimeValue, ExecError> {
    let dim = match size {
        3 => 3usize,
        4 => 4,
        other => return Err(runtime(format!("mat_identity size {other}, expected 3 or 4"))),
    };
    let mut m = vec![0.0; dim * dim];
    for i in 0..dim {
        m[i * dim + i] = 1.0;
    }
    Ok(RuntimeValue::Matrix(m))
}

pub fn multiply(a: &[f64], b: &[f64]) -> Result<RuntimeValue, ExecError> {
    let dim = matrix_dim(a)?;
    if matrix_dim(b)? != dim {
        return Err(runtime("matrix dimension mismatch"));
    }
    let mut out = vec![0.0; dim * dim];
    for row in 0..dim {
        for col in 0..dim {
            out[row * dim + col] = (0..dim)
                .map(|k| a[row * dim + k] * b[k * dim + col])
                .sum();
        }
    }
    Ok(RuntimeValue::Matrix(out))
}

pub fn transform(m: &[f64], v: &RuntimeValue) -> Result<RuntimeValue, ExecError> {
    let dim = matrix_dim(m)?;
    let v = v.as_vector()?;
    if v.len() != dim {
        return Err(runtime("matrix/vector width mismatch"));
    }
    let out = (0..dim)
        .map(|row| (0..dim).map(|col| m[row * dim + col] * v[col]).sum())
        .collect();
    Ok(RuntimeValue::Vector(out))
}

pub fn transpose(m: &[f64]) -> Result<RuntimeValue, ExecError> {
    let dim = matrix_dim(m)?;
    let mut out = vec![0.0; dim * dim];
    for row in 0..dim {
        for col in 0..dim {
            out[col * dim + row] = m[row * dim + col];
        }
    }
    Ok(RuntimeValue::Matrix(out))
}

pub fn invert(m: &[f64]) -> Result<RuntimeValue, ExecError> {
    match matrix_dim(m)? {
        3 => invert3(m),
        _ => invert4(m),
    }
}

fn invert3(m: &[f64]) -> Result<RuntimeValue, ExecError> {
    let det = m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
        + m[2] * (m[3] * m[7] - m[4] * m[6]);
    if det.abs() < 1e-12 {
        return Err(ExecError::SingularMatrix);
    }
    let inv_det = 1.0 / det;
    Ok(RuntimeValue::Matrix(vec![
        (m[4] * m[8] - m[5] * m[7]) * inv_det,
        (m[2] * m[7] - m[1] * m[8]) * inv_det,
        (m[1] * m[5] - m[2] * m[4]) * inv_det,
        (m[5] * m[6] - m[3] * m[8]) * inv_det,
        (m[0] * m[8] - m[2] * m[6]) * inv_det,
        (m[2] * m[3] - m[0] * m[5]) * inv_det,
        (m[3] * m[7] - m[4] * m[6]) * inv_det,
        (m[1] * m[6] - m[0] * m[7]) * inv_det,
        (m[0] * m[4] - m[1] * m[3]) * inv_det,
    ]))
}

fn invert4(m: &[f64]) -> Result<RuntimeValue, ExecError> {
    // Cofactor expansion over 2x2 sub-determinants.
    let s0 = m[0] * m[5] - m[1] * m[4];
    let s1 = m[0] * m[6] - m[2] * m[4];
    let s2 = m[0] * m[7] - m[3] * m[4];
    let s3 = m[1] * m[6] - m[2] * m[5];
    let s4 = m[1] * m[7] - m[3] * m[5];
    let s5 = m[2] * m[7] - m[3] * m[6];

    let c5 = m[10] * m[15] - m[11] * m[14];
    let c4 = m[9] * m[15] - m[11] * m[13];
    let c3 = m[9] * m[14] - m[10] * m[13];
    let c2 = m[8] * m[15] - m[11] * m[12];
    let c1 = m[8] * m[14] - m[10] * m[12];
    let c0 = m[8] * m[13] - m[9] * m[12];

    let det = s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0;
    if det.abs() < 1e-12 {
        return Err(ExecError::SingularMatrix);
    }
    let inv_det = 1.0 / det;

    Ok(RuntimeValue::Matrix(vec![
        (m[5] * c5 - m[6] * c4 + m[7] * c3) * inv_det,
        (-m[1] * c5 + m[2] * c4 - m[3] * c3) * inv_det,
        (m[13] * s5 - m[14] * s4 + m[15] * s3) * inv_det,
        (-m[9] * s5 + m[10] * s4 - m[11] * s3) * inv_det,
        (-m[4] * c5 + m[6] * c2 - m[7] * c1) * inv_det,
        (m[0] * c5 - m[2] * c2 + m[3] * c1) * inv_det,
        (-m[12] * s5 + m[14] * s2 - m[15] * s1) * inv_det,
        (m[8] * s5 - m[10] * s2 + m[11] * s1) * inv_det,
        (m[4] * c4 - m[5] * c2 + m[7] * c0) * inv_det,
        (-m[0] * c4 + m[1] * c2 - m[3] * c0) * inv_det,
        (m[12] * s4 - m[13] * s2 + m[15] * s0) * inv_det,
        (-m[8] * s4 + m[9] * s2 - m[11] * s0) * inv_det,
        (-m[4] * c3 + m[5] * c1 - m[6] * c0) * inv_det,
        (m[0] * c3 - m[1] * c1 + m[2] * c0) * inv_det,
        (-m[12] * s3 + m[13] * s1 - m[14] * s0) * inv_det,
        (m[8] * s3 - m[9] * s1 + m[10] * s0) * inv_det,
    ]))
}

pub fn rotation(axis: &str, angle: f64) -> Result<RuntimeValue, ExecError> {
    let (s, c) = angle.sin_cos();
    let m = match axis {
        "x" => vec![1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c],
        "y" => vec![c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c],
        "z" => vec![c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0],
        other => return Err(runtime(format!("rotation axis '{other}', expected x|y|z"))),
    };
    Ok(RuntimeValue::Matrix(m))
}

// ============================================================================
// 3. QUATERNIONS ([x, y, z, w])
// ============================================================================

fn quat(v: &RuntimeValue) -> Result<[f64; 4], ExecError> {
    let v = v.as_vector()?;
    if v.len() != 4 {
        return Err(runtime("quaternion requires a float4"));
    }
    Ok([v[0], v[1], v[2], v[3]])
}

pub fn quat_from_axis_angle(axis: &RuntimeValue, angle: f64) -> Result<RuntimeValue, ExecError> {
    let a = axis.as_vector()?;
    if a.len() != 3 {
        return Err(runtime("axis requires a float3"));
    }
    let len = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    if len == 0.0 {
        return Err(runtime("axis of zero length"));
    }
    let (s, c) = (angle * 0.5).sin_cos();
    Ok(RuntimeValue::Vector(vec![
        a[0] / len * s,
        a[1] / len * s,
        a[2] / len * s,
        c,
    ]))
}

pub fn quat_mul(a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, ExecError> {
    let (a, b) = (quat(a)?, quat(b)?);
    Ok(RuntimeValue::Vector(vec![
        a[3] * b[0] + a[0] * b[3] + a[1] * b[2] - a[2] * b[1],
        a[3] * b[1] - a[0] * b[2] + a[1] * b[3] + a[2] * b[0],
        a[3] * b[2] + a[0] * b[1] - a[1] * b[0] + a[2] * b[3],
        a[3] * b[3] - a[0] * b[0] - a[1] * b[1] - a[2] * b[2],
    ]))
}

pub fn quat_normalize(v: &RuntimeValue) -> Result<RuntimeValue, ExecError> {
    let q = quat(v)?;
    let len = q.iter().map(|x| x * x).sum::<f64>().sqrt();
    if len == 0.0 {
        return Err(runtime("normalize of zero quaternion"));
    }
    Ok(RuntimeValue::Vector(q.iter().map(|x| x / len).collect()))
}

/// Shorter-arc slerp, falling back to linear interpolation when the
/// endpoints are nearly parallel.
pub fn quat_slerp(a: &RuntimeValue, b: &RuntimeValue, t: f64) -> Result<RuntimeValue, ExecError> {
    let a = quat(a)?;
    let mut b = quat(b)?;
    let mut cos_theta: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
    if cos_theta < 0.0 {
        for x in &mut b {
            *x = -*x;
        }
        cos_theta = -cos_theta;
    }
    let mixed: Vec<f64> = if cos_theta > 0.9995 {
        a.iter().zip(&b).map(|(x, y)| x + (y - x) * t).collect()
    } else {
        let theta = cos_theta.clamp(-1.0, 1.0).acos();
        let sin_theta = theta.sin();
        let wa = ((1.0 - t) * theta).sin() / sin_theta;
        let wb = (t * theta).sin() / sin_theta;
        a.iter().zip(&b).map(|(x, y)| x * wa + y * wb).collect()
    };
    quat_normalize(&RuntimeValue::Vector(mixed))
}

/// Row-major 4x4 rotation matrix from a unit quaternion.
pub fn quat_to_matrix(v: &RuntimeValue) -> Result<RuntimeValue, ExecError> {
    let [x, y, z, w] = quat(v)?;
    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, xz, yz) = (x * y, x * z, y * z);
    let (wx, wy, wz) = (w * x, w * y, w * z);
    Ok(RuntimeValue::Matrix(vec![
        1.0 - 2.0 * (yy + zz),
        2.0 * (xy - wz),
        2.0 * (xz + wy),
        0.0,
        2.0 * (xy + wz),
        1.0 - 2.0 * (xx + zz),
        2.0 * (yz - wx),
        0.0,
        2.0 * (xz - wy),
        2.0 * (yz + wx),
        1.0 - 2.0 * (xx + yy),
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
    ]))
}

// ============================================================================
// 4. COLOR
// ============================================================================

/// Premultiplied-alpha over composition: `a` over `b`.
pub fn color_mix(a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, ExecError> {
    let (a, b) = (a.as_vector()?, b.as_vector()?);
    if a.len() != 4 || b.len() != 4 {
        return Err(runtime("color_mix requires float4 operands"));
    }
    let inv = 1.0 - a[3];
    Ok(RuntimeValue::Vector(vec![
        a[0] + b[0] * inv,
        a[1] + b[1] * inv,
        a[2] + b[2] * inv,
        a[3] + b[3] * inv,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec3(x: f64, y: f64, z: f64) -> RuntimeValue {
        RuntimeValue::Vector(vec![x, y, z])
    }

    fn assert_close(a: &RuntimeValue, expected: &[f64]) {
        let got = a.as_vector().unwrap();
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(expected) {
            assert!((g - e).abs() < 1e-5, "{got:?} vs {expected:?}");
        }
    }

    #[test]
    fn identity_3x3() {
        let m = identity(3).unwrap();
        assert_eq!(
            m,
            RuntimeValue::Matrix(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
        );
    }

    #[test]
    fn rotation_z_quarter_turn() {
        let m = rotation("z", std::f64::consts::FRAC_PI_2).unwrap();
        let rotated = transform(m.as_matrix().unwrap(), &vec3(1.0, 0.0, 0.0)).unwrap();
        assert_close(&rotated, &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn invert_round_trips() {
        let m = vec![2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 1.0, 0.0, 1.0];
        let inv = invert(&m).unwrap();
        let product = multiply(&m, inv.as_matrix().unwrap()).unwrap();
        let id = identity(3).unwrap();
        let (p, i) = (product.as_matrix().unwrap(), id.as_matrix().unwrap());
        for (a, b) in p.iter().zip(i) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn singular_matrix_is_rejected() {
        assert_eq!(invert(&[0.0; 9]).unwrap_err(), ExecError::SingularMatrix);
    }

    #[test]
    fn quat_matrix_rotates_like_the_quat() {
        let q = quat_from_axis_angle(&vec3(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2).unwrap();
        let m = quat_to_matrix(&q).unwrap();
        let rotated = transform(
            m.as_matrix().unwrap(),
            &RuntimeValue::Vector(vec![1.0, 0.0, 0.0, 1.0]),
        )
        .unwrap();
        assert_close(&rotated, &[0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn slerp_endpoints_and_shorter_arc() {
        let a = quat_from_axis_angle(&vec3(0.0, 0.0, 1.0), 0.0).unwrap();
        let b = quat_from_axis_angle(&vec3(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2).unwrap();
        assert_close(&quat_slerp(&a, &b, 0.0).unwrap(), &a.as_vector().unwrap());
        assert_close(&quat_slerp(&a, &b, 1.0).unwrap(), &b.as_vector().unwrap());
        // halfway is the quarter-angle rotation
        let mid = quat_slerp(&a, &b, 0.5).unwrap();
        let expect = quat_from_axis_angle(&vec3(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_4).unwrap();
        assert_close(&mid, &expect.as_vector().unwrap());
    }

    #[test]
    fn premultiplied_over() {
        // opaque red over anything is red
        let red = RuntimeValue::Vector(vec![1.0, 0.0, 0.0, 1.0]);
        let blue = RuntimeValue::Vector(vec![0.0, 0.0, 1.0, 1.0]);
        assert_close(&color_mix(&red, &blue).unwrap(), &[1.0, 0.0, 0.0, 1.0]);
        // half-transparent (premultiplied) white over black
        let half_white = RuntimeValue::Vector(vec![0.5, 0.5, 0.5, 0.5]);
        let black = RuntimeValue::Vector(vec![0.0, 0.0, 0.0, 1.0]);
        assert_close(&color_mix(&half_white, &black).unwrap(), &[0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn swizzle_channels() {
        let v = RuntimeValue::Vector(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(swizzle(&v, "x").unwrap(), RuntimeValue::Float(1.0));
        assert_close(&swizzle(&v, "wzyx").unwrap(), &[4.0, 3.0, 2.0, 1.0]);
        assert_close(&swizzle(&v, "rgb").unwrap(), &[1.0, 2.0, 3.0]);
        assert!(swizzle(&v, "q").is_err());
    }
}
