// Validator behavior: pass ordering, error codes, accumulation.

use serde_json::json;
use shadergraph::validate::codes;
use shadergraph::{validate, IrDocument};

fn document(v: serde_json::Value) -> IrDocument {
    IrDocument::from_json(v).expect("document parses")
}

fn base(functions: serde_json::Value) -> serde_json::Value {
    json!({
        "version": "1",
        "meta": {"name": "fixture"},
        "entryPoint": "main",
        "functions": functions
    })
}

#[test]
fn missing_required_fields_are_structural() {
    let err = IrDocument::from_json(json!({"version": "1"})).unwrap_err();
    assert!(err.to_string().starts_with("structural error"));
}

#[test]
fn duplicate_ids_are_reported_per_scope() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "dups"},
        "entryPoint": "main",
        "resources": [
            {"id": "b", "kind": "buffer", "elementType": "int", "size": 1},
            {"id": "b", "kind": "buffer", "elementType": "int", "size": 1}
        ],
        "functions": [
            {"id": "main", "kind": "cpu", "nodes": [
                {"id": "n", "op": "func_return"},
                {"id": "n", "op": "func_return"}
            ]},
            {"id": "main", "kind": "cpu"}
        ]
    }));
    let result = validate(&doc);
    assert!(!result.ok());
    assert!(result.errors_with_code(codes::DUPLICATE_ID).count() >= 3);
}

#[test]
fn entry_point_must_exist_and_be_cpu() {
    let missing = document(base(json!([{"id": "other", "kind": "cpu"}])));
    assert!(validate(&missing)
        .errors_with_code(codes::ENTRY_POINT)
        .next()
        .is_some());

    let shader_entry = document(base(json!([{"id": "main", "kind": "shader"}])));
    assert!(validate(&shader_entry)
        .errors_with_code(codes::ENTRY_POINT)
        .next()
        .is_some());
}

#[test]
fn unknown_types_and_struct_cycles() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "types"},
        "entryPoint": "main",
        "structs": [
            {"id": "A", "members": [{"id": "b", "type": "B"}]},
            {"id": "B", "members": [{"id": "a", "type": "A"}]}
        ],
        "functions": [{
            "id": "main", "kind": "cpu",
            "localVars": [{"id": "x", "type": "Ghost"}]
        }]
    }));
    let result = validate(&doc);
    assert!(result
        .errors_with_code(codes::STRUCT_RECURSION)
        .next()
        .is_some());
    assert!(result.errors_with_code(codes::UNKNOWN_TYPE).next().is_some());
}

#[test]
fn dynamic_arrays_are_resource_only() {
    let doc = document(base(json!([{
        "id": "main", "kind": "cpu",
        "localVars": [{"id": "xs", "type": "array<float>"}]
    }])));
    let result = validate(&doc);
    assert!(!result.ok());
    assert!(result.errors_with_code(codes::UNKNOWN_TYPE).next().is_some());
}

#[test]
fn dangling_edges_and_symbols() {
    let doc = document(base(json!([{
        "id": "main", "kind": "cpu",
        "nodes": [
            {"id": "get", "op": "var_get", "var": "nope"},
            {"id": "call", "op": "call_func", "func": "ghost"}
        ],
        "edges": [
            {"from": "get", "portOut": "out", "to": "missing", "portIn": "value", "type": "data"}
        ]
    }])));
    let result = validate(&doc);
    let refs: Vec<_> = result.errors_with_code(codes::UNKNOWN_REFERENCE).collect();
    assert_eq!(refs.len(), 2);
    assert!(result.errors_with_code(codes::BAD_EDGE).next().is_some());
}

#[test]
fn execution_edges_use_exec_ports() {
    let doc = document(base(json!([{
        "id": "main", "kind": "cpu",
        "nodes": [
            {"id": "a", "op": "func_return"},
            {"id": "b", "op": "func_return"}
        ],
        "edges": [
            {"from": "a", "portOut": "out", "to": "b", "portIn": "exec_in", "type": "execution"}
        ]
    }])));
    assert!(validate(&doc)
        .errors_with_code(codes::BAD_EDGE)
        .next()
        .is_some());
}

#[test]
fn unknown_op_is_a_type_pass_error() {
    let doc = document(base(json!([{
        "id": "main", "kind": "cpu",
        "nodes": [{"id": "n", "op": "math_frobnicate", "a": 1}]
    }])));
    let result = validate(&doc);
    let errs: Vec<_> = result.errors_with_code(codes::UNKNOWN_OP).collect();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].node_id.as_deref(), Some("n"));
}

#[test]
fn overload_mismatch_names_expected_and_found() {
    let doc = document(base(json!([{
        "id": "main", "kind": "cpu",
        "nodes": [{"id": "bad", "op": "math_add", "a": "oops", "b": 2}]
    }])));
    let result = validate(&doc);
    let errs: Vec<_> = result.errors_with_code(codes::TYPE_MISMATCH).collect();
    assert_eq!(errs.len(), 1);
    assert!(errs[0].message.contains("expected"));
    assert!(errs[0].message.contains("string"));
}

#[test]
fn missing_argument_is_reported() {
    let doc = document(base(json!([{
        "id": "main", "kind": "cpu",
        "nodes": [{"id": "half", "op": "math_add", "a": 1}]
    }])));
    let result = validate(&doc);
    let errs: Vec<_> = result.errors_with_code(codes::MISSING_ARGUMENT).collect();
    assert_eq!(errs.len(), 1);
    assert!(errs[0].message.contains("'b'"));
}

#[test]
fn negative_and_oob_literal_indices() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "bounds"},
        "entryPoint": "main",
        "resources": [{"id": "b", "kind": "buffer", "elementType": "float", "size": 8}],
        "functions": [{
            "id": "main", "kind": "cpu",
            "nodes": [
                {"id": "neg", "op": "buffer_load", "buffer": "b", "index": -1},
                {"id": "oob", "op": "buffer_load", "buffer": "b", "index": 8},
                {"id": "fine", "op": "buffer_load", "buffer": "b", "index": 7}
            ]
        }]
    }));
    let result = validate(&doc);
    assert_eq!(result.errors_with_code(codes::NEGATIVE_INDEX).count(), 1);
    assert_eq!(result.errors_with_code(codes::STATIC_OOB).count(), 1);
}

#[test]
fn invalid_constant_name() {
    let doc = document(base(json!([{
        "id": "main", "kind": "cpu",
        "nodes": [{"id": "c", "op": "const_get", "name": "TAO"}]
    }])));
    let result = validate(&doc);
    let errs: Vec<_> = result.errors_with_code(codes::INVALID_CONSTANT).collect();
    assert_eq!(errs.len(), 1);
    assert!(errs[0].message.contains("TAO"));
}

#[test]
fn multi_valued_returns_are_rejected() {
    let doc = document(base(json!([
        {"id": "main", "kind": "cpu"},
        {"id": "pair", "kind": "cpu", "outputs": [
            {"id": "a", "type": "float"},
            {"id": "b", "type": "float"}
        ]}
    ])));
    let result = validate(&doc);
    let errs: Vec<_> = result.errors_with_code(codes::UNSUPPORTED).collect();
    assert_eq!(errs.len(), 1);
    assert!(errs[0].message.contains("Multiple outputs"));
}

#[test]
fn errors_accumulate_across_the_document() {
    let doc = document(json!({
        "version": "1",
        "meta": {"name": "many"},
        "entryPoint": "ghost",
        "resources": [{"id": "b", "kind": "buffer", "elementType": "float", "size": 2}],
        "functions": [
            {"id": "f1", "kind": "cpu", "nodes": [
                {"id": "bad_op", "op": "nope_nope"},
                {"id": "oob", "op": "buffer_store", "buffer": "b", "index": 5, "value": 0}
            ]},
            {"id": "f2", "kind": "cpu", "nodes": [
                {"id": "c", "op": "const_get", "name": "NOT_A_CONSTANT"}
            ]}
        ]
    }));
    let result = validate(&doc);
    // entry point + unknown op + static OOB + bad constant, all in one run
    assert!(result.errors.len() >= 4);
    assert!(result.errors_with_code(codes::ENTRY_POINT).next().is_some());
    assert!(result.errors_with_code(codes::UNKNOWN_OP).next().is_some());
    assert!(result.errors_with_code(codes::STATIC_OOB).next().is_some());
    assert!(result
        .errors_with_code(codes::INVALID_CONSTANT)
        .next()
        .is_some());
}

#[test]
fn static_call_cycles_warn_but_do_not_block() {
    let doc = document(base(json!([
        {"id": "main", "kind": "cpu", "nodes": [
            {"id": "go", "op": "call_func", "func": "helper"}
        ]},
        {"id": "helper", "kind": "cpu", "nodes": [
            {"id": "back", "op": "call_func", "func": "main"}
        ]}
    ])));
    let result = validate(&doc);
    assert!(result.ok());
    assert!(result
        .errors_with_code(codes::RECURSIVE_CALLS)
        .next()
        .is_some());
}

#[test]
fn data_edges_override_inline_arguments() {
    // inline `a` would be a string literal, but a data edge rebinds it to an
    // int-producing node
    let doc = document(base(json!([{
        "id": "main", "kind": "cpu",
        "nodes": [
            {"id": "lit", "op": "literal", "value": 4},
            {"id": "sum", "op": "math_add", "a": "oops", "b": 2}
        ],
        "edges": [
            {"from": "lit", "portOut": "out", "to": "sum", "portIn": "a", "type": "data"}
        ]
    }])));
    let result = validate(&doc);
    assert!(result.ok(), "{:?}", result.errors);
}
