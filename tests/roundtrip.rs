// Wire-format guarantees: lossless JSON round-trips and patch semantics.

use serde_json::json;
use shadergraph::patch::PatchOpKind;
use shadergraph::{apply_patch, validate, IrDocument, PatchOp};

fn fixture() -> serde_json::Value {
    json!({
        "version": "1",
        "meta": {"name": "roundtrip", "author": "tests"},
        "entryPoint": "main",
        "inputs": [{"id": "speed", "type": "float", "default": 1.5}],
        "resources": [{
            "id": "b_state", "kind": "buffer", "elementType": "float", "size": 16,
            "persistence": {"persistent": true, "clearOnResize": false}
        }],
        "structs": [{
            "id": "Particle",
            "members": [
                {"id": "pos", "type": "float3"},
                {"id": "vel", "type": "float3"}
            ]
        }],
        "globals": [{"id": "t_now", "type": "float", "value": 0.0}],
        "functions": [{
            "id": "main", "kind": "cpu",
            "inputs": [],
            "outputs": [],
            "localVars": [{"id": "step", "type": "int", "initialValue": 2}],
            "nodes": [
                {"id": "load", "op": "buffer_load", "buffer": "b_state", "index": 3,
                 "custom_annotation": {"editor_x": 120, "editor_y": 40}},
                {"id": "store", "op": "buffer_store", "buffer": "b_state", "index": 3,
                 "value": "load"}
            ],
            "edges": [
                {"from": "load", "portOut": "out", "to": "store", "portIn": "value", "type": "data"}
            ]
        }]
    })
}

#[test]
fn parse_serialize_is_identity() {
    let original = fixture();
    let doc = IrDocument::from_json(original.clone()).unwrap();
    assert!(validate(&doc).ok());

    let reparsed = IrDocument::from_json(doc.to_json()).unwrap();
    assert_eq!(doc.to_json(), reparsed.to_json());
}

#[test]
fn unknown_node_keys_survive() {
    let doc = IrDocument::from_json(fixture()).unwrap();
    let back = doc.to_json();
    assert_eq!(
        back["functions"][0]["nodes"][0]["custom_annotation"]["editor_x"],
        json!(120)
    );
}

#[test]
fn empty_patch_is_identity() {
    let original = fixture();
    assert_eq!(apply_patch(&original, &[]).unwrap(), original);
}

#[test]
fn patched_document_revalidates() {
    let original = fixture();
    let ops = vec![
        PatchOp {
            op: PatchOpKind::Add,
            path: "/functions/0/nodes/-".into(),
            value: Some(json!({
                "id": "extra", "op": "math_add", "a": 1, "b": 2
            })),
        },
        PatchOp {
            op: PatchOpKind::Replace,
            path: "/meta/name".into(),
            value: Some(json!("patched")),
        },
        PatchOp {
            op: PatchOpKind::Remove,
            path: "/inputs/0/default".into(),
            value: None,
        },
    ];
    let patched = apply_patch(&original, &ops).unwrap();
    let doc = IrDocument::from_json(patched).unwrap();
    assert_eq!(doc.meta.name, "patched");
    assert_eq!(doc.functions[0].nodes.len(), 3);
    assert!(doc.inputs[0].default.is_none());
    assert!(validate(&doc).ok());
}

#[test]
fn patch_failures_leave_errors_not_panics() {
    let original = fixture();
    let bad = PatchOp {
        op: PatchOpKind::Replace,
        path: "/functions/7/id".into(),
        value: Some(json!("x")),
    };
    assert!(apply_patch(&original, &[bad]).is_err());
}
