// Codegen contracts: any validated document compiles without error, and the
// emitted text keeps the documented shapes.

use serde_json::json;
use shadergraph::{compile_host, compile_shaders, validate, IrDocument, ShaderOptions};
use std::collections::HashMap;

fn document(v: serde_json::Value) -> IrDocument {
    let doc = IrDocument::from_json(v).expect("document parses");
    let result = validate(&doc);
    assert!(result.ok(), "fixture must validate: {:?}", result.errors);
    doc
}

fn particle_system() -> IrDocument {
    document(json!({
        "version": "1",
        "meta": {"name": "particles"},
        "entryPoint": "main",
        "structs": [{
            "id": "Particle",
            "members": [
                {"id": "pos", "type": "float3"},
                {"id": "vel", "type": "float3"}
            ]
        }],
        "globals": [{"id": "t_now", "type": "float", "value": 0.0}],
        "resources": [
            {"id": "b_particles", "kind": "buffer", "elementType": "float3", "size": 128},
            {"id": "b_energy", "kind": "buffer", "elementType": "float", "size": 1}
        ],
        "functions": [
            {
                "id": "main", "kind": "cpu",
                "localVars": [{"id": "frame", "type": "int", "initialValue": 0}],
                "nodes": [
                    {"id": "loop", "op": "flow_loop", "start": 0, "end": 4},
                    {"id": "i", "op": "loop_index", "loop": "loop"},
                    {"id": "next", "op": "math_add", "a": "frame", "b": 1},
                    {"id": "bump", "op": "var_set", "var": "frame", "value": "next"},
                    {"id": "go", "op": "cmd_dispatch", "func": "step", "dispatch": [128, 1, 1],
                     "dt": 0.016},
                    {"id": "done", "op": "buffer_store", "buffer": "b_energy", "index": 0,
                     "value": "frame"}
                ],
                "edges": [
                    {"from": "loop", "portOut": "exec_body", "to": "bump", "portIn": "exec_in", "type": "execution"},
                    {"from": "bump", "portOut": "exec_out", "to": "go", "portIn": "exec_in", "type": "execution"},
                    {"from": "loop", "portOut": "exec_completed", "to": "done", "portIn": "exec_in", "type": "execution"}
                ]
            },
            {
                "id": "step", "kind": "shader",
                "inputs": [{"id": "dt", "type": "float"}],
                "nodes": [
                    {"id": "gid", "op": "builtin_get", "name": "global_invocation_id"},
                    {"id": "xf", "op": "vec_swizzle", "value": "gid", "channels": "x"},
                    {"id": "x", "op": "math_to_int", "value": "xf"},
                    {"id": "p", "op": "buffer_load", "buffer": "b_particles", "index": "x"},
                    {"id": "drift", "op": "math_mul", "a": "p", "b": "dt"},
                    {"id": "moved", "op": "math_add", "a": "p", "b": "drift"},
                    {"id": "put", "op": "buffer_store", "buffer": "b_particles", "index": "x",
                     "value": "moved"}
                ],
                "edges": []
            }
        ]
    }))
}

#[test]
fn validated_documents_compile_host() {
    let ir = particle_system();
    let entry = ir.function("main").unwrap();
    let text = compile_host(entry, &ir).expect("host compiles");

    assert!(text.contains("function driver_main(ctx, resources, globals) {"));
    assert!(text.contains("let l_frame = 0;"));
    assert!(text.contains("for (let loop_loop = 0; loop_loop < 4; loop_loop++) {"));
    assert!(text.contains("l_frame = globals.callOp(\"math_add\", { \"a\": l_frame, \"b\": 1 });"));
    assert!(text.contains("ctx.dispatch(\"step\", [128,1,1], { \"dt\": 0.016 });"));
    assert!(text.contains("resources.bufferStore(\"b_energy\", 0, l_frame);"));
}

#[test]
fn validated_documents_compile_shaders() {
    let ir = particle_system();
    let options = ShaderOptions {
        global_buffer_binding: Some(9),
        var_map: HashMap::from([("t_now".to_string(), 0usize)]),
        resource_bindings: HashMap::from([
            ("b_particles".to_string(), 0u32),
            ("b_energy".to_string(), 1u32),
        ]),
        ..ShaderOptions::default()
    };
    let modules = compile_shaders(&ir, &options).expect("shaders compile");
    assert_eq!(modules.len(), 1);

    let text = &modules["step"];
    assert!(text.contains("struct Particle {"));
    assert!(text.contains("struct Buffer_b_particles { data: array<vec3<f32>> }"));
    assert!(text.contains(
        "@group(0) @binding(0) var<storage, read_write> b_b_particles: Buffer_b_particles;"
    ));
    assert!(text.contains("@group(0) @binding(9) var<storage, read_write> b_globals: Globals;"));
    assert!(text.contains("fn blend_premultiplied"));
    assert!(text.contains("@compute @workgroup_size(1)"));
    assert!(text.contains("fn step(@builtin(global_invocation_id) gid: vec3<u32>)"));
    assert!(text.contains("b_b_particles.data[u32(i32((vec3<i32>(gid)).x))]"));
}

#[test]
fn every_shader_function_gets_a_module() {
    let ir = document(json!({
        "version": "1",
        "meta": {"name": "two"},
        "entryPoint": "main",
        "functions": [
            {"id": "main", "kind": "cpu"},
            {"id": "alpha", "kind": "shader", "nodes": [
                {"id": "r", "op": "func_return", "value": 1.0}
            ]},
            {"id": "beta", "kind": "shader", "nodes": [
                {"id": "r", "op": "func_return", "value": 2.0}
            ]}
        ]
    }));
    let modules = compile_shaders(&ir, &ShaderOptions::default()).unwrap();
    assert_eq!(
        modules.keys().collect::<Vec<_>>(),
        vec!["alpha", "beta"]
    );
    // each entry sees its sibling emitted as an ordinary function
    assert!(modules["alpha"].contains("fn beta()"));
    assert!(modules["beta"].contains("fn alpha()"));
}

#[test]
fn call_results_read_from_temporaries() {
    let ir = document(json!({
        "version": "1",
        "meta": {"name": "calls"},
        "entryPoint": "main",
        "resources": [{"id": "b", "kind": "buffer", "elementType": "float", "size": 1}],
        "functions": [
            {
                "id": "main", "kind": "cpu",
                "nodes": [
                    {"id": "c", "op": "call_func", "func": "double", "value": 21.0},
                    {"id": "s", "op": "buffer_store", "buffer": "b", "index": 0, "value": "c"}
                ],
                "edges": [
                    {"from": "c", "portOut": "exec_out", "to": "s", "portIn": "exec_in", "type": "execution"}
                ]
            },
            {
                "id": "double", "kind": "cpu",
                "inputs": [{"id": "value", "type": "float"}],
                "outputs": [{"id": "out", "type": "float"}],
                "nodes": [
                    {"id": "twice", "op": "math_mul", "a": "value", "b": 2.0},
                    {"id": "ret", "op": "func_return", "value": "twice"}
                ],
                "edges": []
            }
        ]
    }));
    let text = compile_host(ir.function("main").unwrap(), &ir).unwrap();
    assert!(text.contains("const r_c = ctx.callFunction(\"double\", { \"value\": 21.0 });"));
    assert!(text.contains("resources.bufferStore(\"b\", 0, r_c);"));
}
