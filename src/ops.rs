// src/ops.rs
//
// =============================================================================
// SHADERGRAPH: OP SIGNATURE TABLE
// =============================================================================
//
// The closed op vocabulary with its typed, overloaded signatures. The static
// validator resolves overloads against this table; the evaluator and both
// code generators implement exactly this set.
//
// Overload resolution is first-match: wider signatures are registered before
// narrower ones that share a key prefix (vec_construct), and int signatures
// before float ones so whole-number literals pick the int variant.

use crate::ir::IrType;
use std::collections::HashMap;
use std::sync::OnceLock;

/// A type slot in a signature: a concrete type, or a generic marker.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationType {
    Exact(IrType),
    AnyStruct,
    AnyArray,
    Any,
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub inputs: Vec<(&'static str, ValidationType)>,
    /// None for side-effecting ops that produce no data output.
    pub output: Option<ValidationType>,
    /// Accepts arbitrary extra keys (`*: any`) for variadic argument passing.
    pub variadic: bool,
}

impl Signature {
    pub fn input(&self, key: &str) -> Option<&ValidationType> {
        self.inputs.iter().find(|(k, _)| *k == key).map(|(_, t)| t)
    }
}

/// Constants reachable through `const_get`.
pub const CONSTANTS: &[(&str, f64)] = &[
    ("PI", std::f64::consts::PI),
    ("TAU", std::f64::consts::TAU),
    ("E", std::f64::consts::E),
    ("SQRT2", std::f64::consts::SQRT_2),
    ("EPSILON", f64::EPSILON),
    ("INFINITY", f64::INFINITY),
    ("NEG_INFINITY", f64::NEG_INFINITY),
];

pub fn constant(name: &str) -> Option<f64> {
    CONSTANTS.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

/// Whether an inferred type satisfies a declared slot, up to broadcasting.
pub fn type_matches(decl: &ValidationType, found: &IrType) -> bool {
    match decl {
        ValidationType::Any => true,
        ValidationType::AnyStruct => matches!(found, IrType::Struct(_)),
        ValidationType::AnyArray => matches!(found, IrType::Array { .. }),
        ValidationType::Exact(want) => {
            if want == found {
                return true;
            }
            // int and bool operands flow into float slots
            if *want == IrType::Float && matches!(found, IrType::Int | IrType::Bool) {
                return true;
            }
            if let Some((want_w, _)) = want.vector_info() {
                // broadcasting: a scalar operand lifts into a vector slot
                if found.is_scalar_numeric() {
                    return true;
                }
                // same-width vectors are interchangeable across element kinds
                if let Some((found_w, _)) = found.vector_info() {
                    return want_w == found_w;
                }
                // a literal array of matching length packs into a vector
                if let IrType::Array { elem, len: Some(n) } = found {
                    return *n == want_w && elem.is_scalar_numeric();
                }
            }
            if let Some(dim) = want.matrix_dim() {
                if let IrType::Array { elem, len: Some(n) } = found {
                    return *n == dim * dim && elem.is_scalar_numeric();
                }
            }
            false
        }
    }
}

/// The ordered overload list for an op, or None for an unknown op.
pub fn signatures(op: &str) -> Option<&'static [Signature]> {
    registry().get(op).map(|v| v.as_slice())
}

pub fn is_known_op(op: &str) -> bool {
    registry().contains_key(op)
}

/// The closed set of op names, sorted.
pub fn builtin_ops() -> Vec<&'static str> {
    let mut ops: Vec<&'static str> = registry().keys().copied().collect();
    ops.sort_unstable();
    ops
}

// ============================================================================
// REGISTRY CONSTRUCTION
// ============================================================================

type Registry = HashMap<&'static str, Vec<Signature>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

// Shorthand slot constructors.
fn f() -> ValidationType {
    ValidationType::Exact(IrType::Float)
}
fn i() -> ValidationType {
    ValidationType::Exact(IrType::Int)
}
fn b() -> ValidationType {
    ValidationType::Exact(IrType::Bool)
}
fn s() -> ValidationType {
    ValidationType::Exact(IrType::Str)
}
fn fv(width: usize) -> ValidationType {
    ValidationType::Exact(IrType::float_vector(width).unwrap())
}
fn iv(width: usize) -> ValidationType {
    ValidationType::Exact(IrType::int_vector(width).unwrap())
}
fn mat(dim: usize) -> ValidationType {
    ValidationType::Exact(if dim == 3 {
        IrType::Float3x3
    } else {
        IrType::Float4x4
    })
}
fn any() -> ValidationType {
    ValidationType::Any
}

fn sig(inputs: &[(&'static str, ValidationType)], output: ValidationType) -> Signature {
    Signature {
        inputs: inputs.to_vec(),
        output: Some(output),
        variadic: false,
    }
}

fn variadic(inputs: &[(&'static str, ValidationType)], output: ValidationType) -> Signature {
    Signature {
        inputs: inputs.to_vec(),
        output: Some(output),
        variadic: true,
    }
}

fn effect(inputs: &[(&'static str, ValidationType)]) -> Signature {
    Signature {
        inputs: inputs.to_vec(),
        output: None,
        variadic: false,
    }
}

fn effect_variadic(inputs: &[(&'static str, ValidationType)]) -> Signature {
    Signature {
        inputs: inputs.to_vec(),
        output: None,
        variadic: true,
    }
}

/// Scalar + vector + broadcasting overloads for a binary numeric op.
fn binary_numeric() -> Vec<Signature> {
    let mut sigs = vec![
        sig(&[("a", i()), ("b", i())], i()),
        sig(&[("a", f()), ("b", f())], f()),
    ];
    for w in 2..=4 {
        sigs.push(sig(&[("a", iv(w)), ("b", iv(w))], iv(w)));
        sigs.push(sig(&[("a", fv(w)), ("b", fv(w))], fv(w)));
        sigs.push(sig(&[("a", fv(w)), ("b", f())], fv(w)));
        sigs.push(sig(&[("a", f()), ("b", fv(w))], fv(w)));
    }
    sigs
}

/// Float-only binary op (atan2, step).
fn binary_float() -> Vec<Signature> {
    let mut sigs = vec![sig(&[("a", f()), ("b", f())], f())];
    for w in 2..=4 {
        sigs.push(sig(&[("a", fv(w)), ("b", fv(w))], fv(w)));
    }
    sigs
}

/// Unary op preserving int-ness (abs, neg, sign).
fn unary_numeric() -> Vec<Signature> {
    let mut sigs = vec![sig(&[("value", i())], i()), sig(&[("value", f())], f())];
    for w in 2..=4 {
        sigs.push(sig(&[("value", iv(w))], iv(w)));
        sigs.push(sig(&[("value", fv(w))], fv(w)));
    }
    sigs
}

/// Unary float op (trig, sqrt, exp, ...).
fn unary_float() -> Vec<Signature> {
    let mut sigs = vec![sig(&[("value", f())], f())];
    for w in 2..=4 {
        sigs.push(sig(&[("value", fv(w))], fv(w)));
    }
    sigs
}

/// Comparisons: bool for scalars, element-wise same-width vector otherwise.
fn comparison(include_bool: bool) -> Vec<Signature> {
    let mut sigs = vec![
        sig(&[("a", i()), ("b", i())], b()),
        sig(&[("a", f()), ("b", f())], b()),
    ];
    if include_bool {
        sigs.push(sig(&[("a", b()), ("b", b())], b()));
    }
    for w in 2..=4 {
        sigs.push(sig(&[("a", fv(w)), ("b", fv(w))], fv(w)));
        sigs.push(sig(&[("a", fv(w)), ("b", f())], fv(w)));
        sigs.push(sig(&[("a", f()), ("b", fv(w))], fv(w)));
    }
    sigs
}

/// IEEE classification: bool for scalars, 0.0/1.0 vector for vectors.
fn classification() -> Vec<Signature> {
    let mut sigs = vec![sig(&[("value", f())], b())];
    for w in 2..=4 {
        sigs.push(sig(&[("value", fv(w))], fv(w)));
    }
    sigs
}

fn ternary_float(keys: [&'static str; 3]) -> Vec<Signature> {
    let mut sigs = vec![sig(
        &[(keys[0], f()), (keys[1], f()), (keys[2], f())],
        f(),
    )];
    for w in 2..=4 {
        sigs.push(sig(
            &[(keys[0], fv(w)), (keys[1], fv(w)), (keys[2], fv(w))],
            fv(w),
        ));
        // lerp/smoothstep style: vector endpoints, scalar parameter
        sigs.push(sig(
            &[(keys[0], fv(w)), (keys[1], fv(w)), (keys[2], f())],
            fv(w),
        ));
    }
    sigs
}

fn build_registry() -> Registry {
    let mut reg: Registry = HashMap::new();

    // --- Arithmetic -------------------------------------------------------
    for op in [
        "math_add", "math_sub", "math_mul", "math_div", "math_mod", "math_pow", "math_min",
        "math_max",
    ] {
        reg.insert(op, binary_numeric());
    }
    reg.insert("math_atan2", binary_float());
    reg.insert("math_step", binary_float());
    for op in ["math_abs", "math_neg", "math_sign"] {
        reg.insert(op, unary_numeric());
    }
    for op in [
        "math_floor", "math_ceil", "math_round", "math_frac", "math_sqrt", "math_sin", "math_cos",
        "math_tan", "math_asin", "math_acos", "math_atan", "math_exp", "math_log",
    ] {
        reg.insert(op, unary_float());
    }
    reg.insert("math_mad", ternary_float(["a", "b", "c"]));
    reg.insert("math_clamp", ternary_float(["value", "min", "max"]));
    reg.insert("math_lerp", ternary_float(["a", "b", "t"]));
    reg.insert("math_smoothstep", ternary_float(["a", "b", "t"]));

    // --- Classification / frexp ------------------------------------------
    for op in ["math_is_nan", "math_is_inf", "math_is_finite"] {
        reg.insert(op, classification());
    }
    reg.insert("math_mantissa", vec![sig(&[("value", f())], f())]);
    reg.insert("math_exponent", vec![sig(&[("value", f())], i())]);

    // --- Casts ------------------------------------------------------------
    reg.insert(
        "math_to_int",
        vec![
            sig(&[("value", i())], i()),
            sig(&[("value", f())], i()),
            sig(&[("value", b())], i()),
        ],
    );
    reg.insert(
        "math_to_float",
        vec![
            sig(&[("value", f())], f()),
            sig(&[("value", i())], f()),
            sig(&[("value", b())], f()),
        ],
    );

    // --- Comparison / logic ----------------------------------------------
    for op in ["math_lt", "math_lte", "math_gt", "math_gte"] {
        reg.insert(op, comparison(false));
    }
    for op in ["math_eq", "math_neq"] {
        reg.insert(op, comparison(true));
    }
    reg.insert(
        "logic_and",
        vec![sig(&[("a", b()), ("b", b())], b())],
    );
    reg.insert("logic_or", vec![sig(&[("a", b()), ("b", b())], b())]);
    reg.insert("logic_not", vec![sig(&[("value", b())], b())]);

    // --- Vectors ----------------------------------------------------------
    // Wider constructors first; int variants before float so whole-number
    // literals stay integral.
    reg.insert(
        "vec_construct",
        vec![
            sig(&[("x", i()), ("y", i()), ("z", i()), ("w", i())], iv(4)),
            sig(&[("x", f()), ("y", f()), ("z", f()), ("w", f())], fv(4)),
            sig(&[("x", i()), ("y", i()), ("z", i())], iv(3)),
            sig(&[("x", f()), ("y", f()), ("z", f())], fv(3)),
            sig(&[("x", i()), ("y", i())], iv(2)),
            sig(&[("x", f()), ("y", f())], fv(2)),
        ],
    );
    reg.insert(
        "vec_swizzle",
        vec![sig(&[("value", any()), ("channels", s())], any())],
    );
    reg.insert("vec_dot", {
        let mut sigs = Vec::new();
        for w in 2..=4 {
            sigs.push(sig(&[("a", fv(w)), ("b", fv(w))], f()));
        }
        sigs
    });
    reg.insert(
        "vec_cross",
        vec![sig(&[("a", fv(3)), ("b", fv(3))], fv(3))],
    );
    reg.insert("vec_length", {
        let mut sigs = Vec::new();
        for w in 2..=4 {
            sigs.push(sig(&[("value", fv(w))], f()));
        }
        sigs
    });
    reg.insert("vec_distance", {
        let mut sigs = Vec::new();
        for w in 2..=4 {
            sigs.push(sig(&[("a", fv(w)), ("b", fv(w))], f()));
        }
        sigs
    });
    reg.insert("vec_normalize", {
        let mut sigs = Vec::new();
        for w in 2..=4 {
            sigs.push(sig(&[("value", fv(w))], fv(w)));
        }
        sigs
    });

    // --- Matrices ---------------------------------------------------------
    reg.insert("mat_identity", vec![sig(&[("size", i())], any())]);
    reg.insert(
        "mat_multiply",
        vec![
            sig(&[("a", mat(3)), ("b", mat(3))], mat(3)),
            sig(&[("a", mat(4)), ("b", mat(4))], mat(4)),
        ],
    );
    reg.insert(
        "mat_transform",
        vec![
            sig(&[("matrix", mat(3)), ("vector", fv(3))], fv(3)),
            sig(&[("matrix", mat(4)), ("vector", fv(4))], fv(4)),
        ],
    );
    reg.insert(
        "mat_transpose",
        vec![
            sig(&[("matrix", mat(3))], mat(3)),
            sig(&[("matrix", mat(4))], mat(4)),
        ],
    );
    reg.insert(
        "mat_invert",
        vec![
            sig(&[("matrix", mat(3))], mat(3)),
            sig(&[("matrix", mat(4))], mat(4)),
        ],
    );
    reg.insert(
        "mat_rotation",
        vec![sig(&[("axis", s()), ("angle", f())], mat(3))],
    );

    // --- Quaternions ([x, y, z, w]) ---------------------------------------
    reg.insert(
        "quat_from_axis_angle",
        vec![sig(&[("axis", fv(3)), ("angle", f())], fv(4))],
    );
    reg.insert(
        "quat_mul",
        vec![sig(&[("a", fv(4)), ("b", fv(4))], fv(4))],
    );
    reg.insert("quat_normalize", vec![sig(&[("value", fv(4))], fv(4))]);
    reg.insert(
        "quat_slerp",
        vec![sig(&[("a", fv(4)), ("b", fv(4)), ("t", f())], fv(4))],
    );
    reg.insert(
        "quat_to_float4x4",
        vec![sig(&[("value", fv(4))], mat(4))],
    );

    // --- Color ------------------------------------------------------------
    reg.insert(
        "color_mix",
        vec![sig(&[("a", fv(4)), ("b", fv(4))], fv(4))],
    );

    // --- Structural -------------------------------------------------------
    reg.insert(
        "struct_construct",
        vec![variadic(&[("type", s())], any())],
    );
    reg.insert(
        "struct_get",
        vec![sig(
            &[("value", ValidationType::AnyStruct), ("field", s())],
            any(),
        )],
    );
    reg.insert("array_construct", vec![variadic(&[], any())]);
    reg.insert(
        "array_get",
        vec![sig(
            &[("array", ValidationType::AnyArray), ("index", i())],
            any(),
        )],
    );
    reg.insert(
        "array_length",
        vec![sig(&[("array", ValidationType::AnyArray)], i())],
    );
    reg.insert("literal", vec![sig(&[("value", any())], any())]);
    reg.insert("const_get", vec![sig(&[("name", s())], f())]);
    reg.insert("builtin_get", vec![sig(&[("name", s())], any())]);
    reg.insert("var_get", vec![sig(&[("var", s())], any())]);
    reg.insert("loop_index", vec![sig(&[("loop", s())], i())]);

    // --- Resources (pure reads) -------------------------------------------
    reg.insert(
        "buffer_load",
        vec![sig(&[("buffer", s()), ("index", i())], any())],
    );
    reg.insert(
        "texture_sample",
        vec![sig(&[("tex", s()), ("coord", fv(2))], fv(4))],
    );
    reg.insert(
        "texture_load",
        vec![sig(&[("tex", s()), ("coord", iv(2))], fv(4))],
    );
    reg.insert(
        "resource_get_size",
        vec![sig(&[("resource", s())], any())],
    );
    reg.insert(
        "resource_get_format",
        vec![sig(&[("resource", s())], s())],
    );

    // --- Executables ------------------------------------------------------
    reg.insert(
        "var_set",
        vec![sig(&[("var", s()), ("value", any())], any())],
    );
    reg.insert(
        "array_set",
        vec![sig(
            &[("var", s()), ("index", i()), ("value", any())],
            any(),
        )],
    );
    reg.insert(
        "buffer_store",
        vec![effect(&[("buffer", s()), ("index", i()), ("value", any())])],
    );
    reg.insert(
        "texture_store",
        vec![effect(&[("tex", s()), ("coord", iv(2)), ("value", fv(4))])],
    );
    reg.insert("call_func", vec![variadic(&[("func", s())], any())]);
    reg.insert(
        "func_return",
        vec![effect(&[("value", any())]), effect(&[])],
    );
    reg.insert(
        "flow_branch",
        vec![
            effect(&[("cond", b())]),
            effect(&[("cond", i())]),
            effect(&[("cond", f())]),
        ],
    );
    reg.insert("flow_loop", vec![effect(&[("start", i()), ("end", i())])]);
    reg.insert(
        "cmd_dispatch",
        vec![effect_variadic(&[("func", s()), ("dispatch", any())])],
    );
    reg.insert(
        "cmd_draw",
        vec![effect_variadic(&[
            ("vertex", s()),
            ("fragment", s()),
            ("target", s()),
            ("count", i()),
        ])],
    );
    reg.insert(
        "cmd_resize_resource",
        vec![effect_variadic(&[("resource", s()), ("size", any())])],
    );
    reg.insert(
        "cmd_clear_resource",
        vec![effect_variadic(&[("resource", s())])],
    );

    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_the_vocabulary() {
        for op in [
            "math_add",
            "math_is_nan",
            "vec_construct",
            "mat_identity",
            "quat_slerp",
            "color_mix",
            "struct_construct",
            "buffer_load",
            "cmd_dispatch",
            "flow_loop",
            "func_return",
        ] {
            assert!(is_known_op(op), "missing {op}");
        }
        assert!(!is_known_op("math_bogus"));
    }

    #[test]
    fn vec_construct_orders_wide_before_narrow() {
        let sigs = signatures("vec_construct").unwrap();
        assert_eq!(sigs[0].inputs.len(), 4);
        assert_eq!(sigs.last().unwrap().inputs.len(), 2);
    }

    #[test]
    fn broadcasting_matches() {
        assert!(type_matches(&fv(3), &IrType::Float));
        assert!(type_matches(&fv(3), &IrType::Int));
        assert!(type_matches(&fv(3), &IrType::Int3));
        assert!(!type_matches(&fv(3), &IrType::Float2));
        assert!(type_matches(
            &fv(3),
            &IrType::Array {
                elem: Box::new(IrType::Int),
                len: Some(3)
            }
        ));
        assert!(type_matches(&f(), &IrType::Int));
        assert!(!type_matches(&i(), &IrType::Float));
    }

    #[test]
    fn constants_table() {
        assert!(constant("PI").is_some());
        assert!(constant("INFINITY").unwrap().is_infinite());
        assert!(constant("nope").is_none());
    }

    #[test]
    fn comparisons_return_bool_for_scalars() {
        let sigs = signatures("math_gt").unwrap();
        assert_eq!(sigs[0].output, Some(b()));
        // vector variants produce same-width vectors
        assert!(sigs.iter().any(|s| s.output == Some(fv(3))));
    }

    #[test]
    fn stores_have_no_data_output() {
        assert!(signatures("buffer_store").unwrap()[0].output.is_none());
        assert!(signatures("flow_loop").unwrap()[0].output.is_none());
        assert!(signatures("var_set").unwrap()[0].output.is_some());
    }
}
