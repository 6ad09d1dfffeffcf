// End-to-end scenarios driving the full pipeline: parse, validate,
// interpret, inspect the observable state.

use serde_json::json;
use shadergraph::error::ExecError;
use shadergraph::interp::JsonMap;
use shadergraph::validate::codes;
use shadergraph::{interpret, validate, IrDocument, RuntimeValue};

fn document(v: serde_json::Value) -> IrDocument {
    IrDocument::from_json(v).expect("document parses")
}

fn run(doc: &IrDocument) -> shadergraph::EvalContext<'_> {
    let result = validate(doc);
    assert!(result.ok(), "unexpected validation errors: {:?}", result.errors);
    interpret(doc, &JsonMap::new()).expect("interpretation succeeds")
}

#[test]
fn branch_takes_the_true_side() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "branch"},
        "entryPoint": "main",
        "resources": [
            {"id": "b_result", "kind": "buffer", "elementType": "int", "size": 4}
        ],
        "functions": [{
            "id": "main", "kind": "cpu",
            "nodes": [
                {"id": "br", "op": "flow_branch", "cond": true},
                {"id": "then", "op": "buffer_store", "buffer": "b_result", "index": 0, "value": 1},
                {"id": "else", "op": "buffer_store", "buffer": "b_result", "index": 0, "value": 2}
            ],
            "edges": [
                {"from": "br", "portOut": "exec_true", "to": "then", "portIn": "exec_in", "type": "execution"},
                {"from": "br", "portOut": "exec_false", "to": "else", "portIn": "exec_in", "type": "execution"}
            ]
        }]
    }));
    let ctx = run(&doc);
    assert_eq!(ctx.resources.buffer("b_result").unwrap()[0], RuntimeValue::Int(1));
}

#[test]
fn loop_accumulates_indices() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "accumulator"},
        "entryPoint": "main",
        "resources": [
            {"id": "b_result", "kind": "buffer", "elementType": "int", "size": 1}
        ],
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
    let ctx = run(&doc);
    assert_eq!(ctx.resources.buffer("b_result").unwrap()[0], RuntimeValue::Int(10));
}

#[test]
fn identity_and_rotation_matrices() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "matrices"},
        "entryPoint": "main",
        "resources": [
            {"id": "b_mat", "kind": "buffer", "elementType": "float3x3", "size": 1},
            {"id": "b_vec", "kind": "buffer", "elementType": "float3", "size": 1}
        ],
        "functions": [{
            "id": "main", "kind": "cpu",
            "nodes": [
                {"id": "ident", "op": "mat_identity", "size": 3},
                {"id": "store_mat", "op": "buffer_store", "buffer": "b_mat", "index": 0, "value": "ident"},
                {"id": "rot", "op": "mat_rotation", "axis": "z", "angle": 1.5707963267948966},
                {"id": "spun", "op": "mat_transform", "matrix": "rot", "vector": [1.0, 0.0, 0.0]},
                {"id": "store_vec", "op": "buffer_store", "buffer": "b_vec", "index": 0, "value": "spun"}
            ],
            "edges": []
        }]
    }));
    let ctx = run(&doc);

    let ident = &ctx.resources.buffer("b_mat").unwrap()[0];
    assert_eq!(
        *ident,
        RuntimeValue::Matrix(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    );

    let spun = ctx.resources.buffer("b_vec").unwrap()[0].as_vector().unwrap();
    let expected = [0.0, 1.0, 0.0];
    for (got, want) in spun.iter().zip(expected) {
        assert!((got - want).abs() < 1e-5, "{spun:?}");
    }
}

#[test]
fn texture_wrap_modes() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "sampling"},
        "entryPoint": "main",
        "inputs": [{"id": "t_src", "type": "texture"}],
        "resources": [
            {"id": "b_out", "kind": "buffer", "elementType": "float4", "size": 1}
        ],
        "functions": [{
            "id": "main", "kind": "cpu",
            "nodes": [
                {"id": "sampled", "op": "texture_sample", "tex": "t_src", "coord": [1.5, 0.5]},
                {"id": "store", "op": "buffer_store", "buffer": "b_out", "index": 0, "value": "sampled"}
            ],
            "edges": []
        }]
    }));
    let result = validate(&doc);
    assert!(result.ok(), "{:?}", result.errors);

    // rows: [red, green], [blue, white]
    let texture = |wrap: &str| {
        json!({
            "width": 2, "height": 2, "filter": "nearest", "wrap": wrap,
            "data": [[1,0,0,1],[0,1,0,1],[0,0,1,1],[1,1,1,1]]
        })
    };

    let mut inputs = JsonMap::new();
    inputs.insert("t_src".into(), texture("repeat"));
    let ctx = interpret(&doc, &inputs).unwrap();
    assert_eq!(
        ctx.resources.buffer("b_out").unwrap()[0],
        RuntimeValue::Vector(vec![1.0, 1.0, 1.0, 1.0])
    );

    // clamp wrap, sampled past the left edge
    let clamped = document({
        let mut v = doc.to_json();
        v["functions"][0]["nodes"][0]["coord"] = json!([-0.5, 0.5]);
        v
    });
    let mut inputs = JsonMap::new();
    inputs.insert("t_src".into(), texture("clamp"));
    let ctx = interpret(&clamped, &inputs).unwrap();
    assert_eq!(
        ctx.resources.buffer("b_out").unwrap()[0],
        RuntimeValue::Vector(vec![0.0, 0.0, 1.0, 1.0])
    );
}

#[test]
fn static_oob_store_fails_validation() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "oob"},
        "entryPoint": "main",
        "resources": [
            {"id": "b", "kind": "buffer", "elementType": "int", "size": 10}
        ],
        "functions": [{
            "id": "main", "kind": "cpu",
            "nodes": [
                {"id": "bad", "op": "buffer_store", "buffer": "b", "index": 10, "value": 0}
            ],
            "edges": []
        }]
    }));
    let result = validate(&doc);
    assert!(!result.ok());
    let oob: Vec<_> = result.errors_with_code(codes::STATIC_OOB).collect();
    assert_eq!(oob.len(), 1);
    assert_eq!(oob[0].node_id.as_deref(), Some("bad"));
}

#[test]
fn self_call_is_detected_at_runtime() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "recursive"},
        "entryPoint": "main",
        "functions": [{
            "id": "main", "kind": "cpu",
            "nodes": [
                {"id": "again", "op": "call_func", "func": "main"}
            ],
            "edges": []
        }]
    }));
    // recursion is a runtime contract; validation only warns
    let result = validate(&doc);
    assert!(result.ok(), "{:?}", result.errors);

    let err = interpret(&doc, &JsonMap::new()).unwrap_err();
    assert_eq!(err, ExecError::Recursion("main".into()));
    assert!(err.to_string().contains("Recursion detected"));
}

#[test]
fn dispatch_covers_the_index_space() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "dispatch"},
        "entryPoint": "main",
        "resources": [
            {"id": "b_out", "kind": "buffer", "elementType": "int", "size": 6}
        ],
        "functions": [
            {
                "id": "main", "kind": "cpu",
                "nodes": [
                    {"id": "go", "op": "cmd_dispatch", "func": "mark", "dispatch": [3, 2, 1]}
                ],
                "edges": []
            },
            {
                "id": "mark", "kind": "shader",
                "nodes": [
                    {"id": "gid", "op": "builtin_get", "name": "global_invocation_id"},
                    {"id": "x", "op": "vec_swizzle", "value": "gid", "channels": "x"},
                    {"id": "y", "op": "vec_swizzle", "value": "gid", "channels": "y"},
                    {"id": "ymul", "op": "math_mul", "a": "y", "b": 3},
                    {"id": "slot", "op": "math_add", "a": "x", "b": "ymul"},
                    {"id": "islot", "op": "math_to_int", "value": "slot"},
                    {"id": "store", "op": "buffer_store", "buffer": "b_out", "index": "islot", "value": 1}
                ],
                "edges": []
            }
        ]
    }));
    let ctx = run(&doc);
    let data = ctx.resources.buffer("b_out").unwrap();
    for (i, slot) in data.iter().enumerate() {
        assert_eq!(slot.as_i64().unwrap(), 1, "slot {i} untouched");
    }
}

#[test]
fn draw_fills_covered_pixels() {
    // full-viewport pair of triangles through the vertex/fragment pipeline
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "draw"},
        "entryPoint": "main",
        "structs": [{
            "id": "VertexOut",
            "members": [
                {"id": "clip", "type": "float4", "builtin": "position"},
                {"id": "shade", "type": "float"}
            ]
        }],
        "resources": [{
            "id": "t_target", "kind": "texture", "format": "rgba32f",
            "size": {"width": 4, "height": 4}
        }],
        "functions": [
            {
                "id": "main", "kind": "cpu",
                "nodes": [
                    {"id": "go", "op": "cmd_draw", "vertex": "vs", "fragment": "fs",
                     "target": "t_target", "count": 3}
                ],
                "edges": []
            },
            {
                "id": "vs", "kind": "shader",
                "outputs": [{"id": "out", "type": "VertexOut"}],
                "nodes": [
                    // an oversized triangle: (-3,-3), (5,-3), (-3,5) in clip space
                    {"id": "vi", "op": "builtin_get", "name": "vertex_index"},
                    {"id": "xeq", "op": "math_eq", "a": "vi", "b": 1},
                    {"id": "px", "op": "math_lerp", "a": -3.0, "b": 5.0, "t": "xeq"},
                    {"id": "yeq", "op": "math_eq", "a": "vi", "b": 2},
                    {"id": "py", "op": "math_lerp", "a": -3.0, "b": 5.0, "t": "yeq"},
                    {"id": "clip", "op": "vec_construct", "x": "px", "y": "py", "z": 0.0, "w": 1.0},
                    {"id": "pos_struct", "op": "struct_construct", "type": "VertexOut",
                     "clip": "clip", "shade": 0.5},
                    {"id": "ret", "op": "func_return", "value": "pos_struct"}
                ],
                "edges": []
            },
            {
                "id": "fs", "kind": "shader",
                "inputs": [{"id": "varying", "type": "VertexOut"}],
                "outputs": [{"id": "color", "type": "float4"}],
                "nodes": [
                    {"id": "ret", "op": "func_return", "value": [0.0, 1.0, 0.0, 1.0]}
                ],
                "edges": []
            }
        ]
    }));
    let ctx = run(&doc);
    let target = ctx.resources.texture("t_target").unwrap();
    // the triangle spans far past the viewport, so every pixel is covered
    for texel in &target.texels {
        assert_eq!(*texel, [0.0, 1.0, 0.0, 1.0]);
    }
}

#[test]
fn ieee_edge_cases_flow_through_ops() {
    use shadergraph::eval::{eval_pure, Args};

    let args = |pairs: &[(&str, RuntimeValue)]| -> Args {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    };

    let sqrt_neg = eval_pure(
        "math_sqrt",
        "t",
        &args(&[("value", RuntimeValue::Float(-1.0))]),
    )
    .unwrap();
    assert_eq!(
        eval_pure("math_is_nan", "t", &args(&[("value", sqrt_neg)])).unwrap(),
        RuntimeValue::Bool(true)
    );

    let div = eval_pure(
        "math_div",
        "t",
        &args(&[
            ("a", RuntimeValue::Float(1.0)),
            ("b", RuntimeValue::Float(0.0)),
        ]),
    )
    .unwrap();
    assert_eq!(
        eval_pure("math_is_inf", "t", &args(&[("value", div)])).unwrap(),
        RuntimeValue::Bool(true)
    );

    assert_eq!(
        eval_pure(
            "math_is_finite",
            "t",
            &args(&[("value", RuntimeValue::Int(0))])
        )
        .unwrap(),
        RuntimeValue::Bool(true)
    );
}
