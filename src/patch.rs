// src/patch.rs
//
// =============================================================================
// SHADERGRAPH: IR PATCHES
// =============================================================================
//
// JSON Patch restricted to add / remove / replace with JSON Pointer paths.
// This is the wire format collaborators use to propose document edits; the
// core only applies patches to plain JSON values and revalidates the result.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOpKind {
    Add,
    Remove,
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
}

#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("invalid JSON pointer '{0}'")]
    InvalidPointer(String),
    #[error("path '{0}' does not exist")]
    NotFound(String),
    #[error("'{0}' is not a valid array index")]
    BadIndex(String),
    #[error("op at '{0}' requires a value")]
    ValueRequired(String),
}

/// Apply a patch to a document value, returning the patched copy. The empty
/// patch is the identity.
pub fn apply_patch(doc: &Json, ops: &[PatchOp]) -> Result<Json, PatchError> {
    let mut out = doc.clone();
    for op in ops {
        apply_one(&mut out, op)?;
    }
    Ok(out)
}

fn apply_one(doc: &mut Json, op: &PatchOp) -> Result<(), PatchError> {
    let tokens = parse_pointer(&op.path)?;
    let Some((leaf, parents)) = tokens.split_last() else {
        // whole-document target
        return match op.op {
            PatchOpKind::Add | PatchOpKind::Replace => {
                let value = op
                    .value
                    .clone()
                    .ok_or_else(|| PatchError::ValueRequired(op.path.clone()))?;
                *doc = value;
                Ok(())
            }
            PatchOpKind::Remove => Err(PatchError::NotFound(op.path.clone())),
        };
    };

    let mut target = doc;
    for token in parents {
        target = descend(target, token).ok_or_else(|| PatchError::NotFound(op.path.clone()))?;
    }

    match op.op {
        PatchOpKind::Add => {
            let value = op
                .value
                .clone()
                .ok_or_else(|| PatchError::ValueRequired(op.path.clone()))?;
            match target {
                Json::Object(map) => {
                    map.insert(leaf.clone(), value);
                    Ok(())
                }
                Json::Array(items) => {
                    let index = if leaf == "-" {
                        items.len()
                    } else {
                        array_index(leaf)?
                    };
                    if index > items.len() {
                        return Err(PatchError::NotFound(op.path.clone()));
                    }
                    items.insert(index, value);
                    Ok(())
                }
                _ => Err(PatchError::NotFound(op.path.clone())),
            }
        }
        PatchOpKind::Remove => match target {
            Json::Object(map) => map
                .remove(leaf)
                .map(|_| ())
                .ok_or_else(|| PatchError::NotFound(op.path.clone())),
            Json::Array(items) => {
                let index = array_index(leaf)?;
                if index >= items.len() {
                    return Err(PatchError::NotFound(op.path.clone()));
                }
                items.remove(index);
                Ok(())
            }
            _ => Err(PatchError::NotFound(op.path.clone())),
        },
        PatchOpKind::Replace => {
            let value = op
                .value
                .clone()
                .ok_or_else(|| PatchError::ValueRequired(op.path.clone()))?;
            let slot =
                descend(target, leaf).ok_or_else(|| PatchError::NotFound(op.path.clone()))?;
            *slot = value;
            Ok(())
        }
    }
}

fn descend<'j>(value: &'j mut Json, token: &str) -> Option<&'j mut Json> {
    match value {
        Json::Object(map) => map.get_mut(token),
        Json::Array(items) => {
            let index = array_index(token).ok()?;
            items.get_mut(index)
        }
        _ => None,
    }
}

fn array_index(token: &str) -> Result<usize, PatchError> {
    // leading zeros are rejected per the pointer grammar
    if token != "0" && token.starts_with('0') {
        return Err(PatchError::BadIndex(token.to_string()));
    }
    token
        .parse()
        .map_err(|_| PatchError::BadIndex(token.to_string()))
}

/// Split a JSON pointer into unescaped tokens.
fn parse_pointer(path: &str) -> Result<Vec<String>, PatchError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if !path.starts_with('/') {
        return Err(PatchError::InvalidPointer(path.to_string()));
    }
    path.split('/')
        .skip(1)
        .map(|token| {
            if token.contains('~') && !token.contains("~0") && !token.contains("~1") {
                return Err(PatchError::InvalidPointer(path.to_string()));
            }
            Ok(token.replace("~1", "/").replace("~0", "~"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(kind: PatchOpKind, path: &str, value: Option<Json>) -> PatchOp {
        PatchOp {
            op: kind,
            path: path.to_string(),
            value,
        }
    }

    #[test]
    fn empty_patch_is_identity() {
        let doc = json!({"meta": {"name": "x"}, "functions": [1, 2]});
        assert_eq!(apply_patch(&doc, &[]).unwrap(), doc);
    }

    #[test]
    fn add_remove_replace() {
        let doc = json!({"functions": [{"id": "a"}], "meta": {"name": "x"}});
        let patched = apply_patch(
            &doc,
            &[
                op(PatchOpKind::Replace, "/meta/name", Some(json!("y"))),
                op(PatchOpKind::Add, "/functions/-", Some(json!({"id": "b"}))),
                op(PatchOpKind::Add, "/comment", Some(json!("hi"))),
            ],
        )
        .unwrap();
        assert_eq!(patched["meta"]["name"], "y");
        assert_eq!(patched["functions"][1]["id"], "b");
        assert_eq!(patched["comment"], "hi");

        let removed = apply_patch(&patched, &[op(PatchOpKind::Remove, "/functions/0", None)])
            .unwrap();
        assert_eq!(removed["functions"][0]["id"], "b");
    }

    #[test]
    fn replace_requires_existing_path() {
        let doc = json!({"a": 1});
        let err = apply_patch(&doc, &[op(PatchOpKind::Replace, "/b", Some(json!(2)))])
            .unwrap_err();
        assert_eq!(err, PatchError::NotFound("/b".into()));
    }

    #[test]
    fn escaped_tokens() {
        let doc = json!({"a/b": {"c~d": 1}});
        let patched =
            apply_patch(&doc, &[op(PatchOpKind::Replace, "/a~1b/c~0d", Some(json!(2)))]).unwrap();
        assert_eq!(patched["a/b"]["c~d"], 2);
    }

    #[test]
    fn bad_indices_are_rejected() {
        let doc = json!([1, 2, 3]);
        assert_eq!(
            apply_patch(&doc, &[op(PatchOpKind::Remove, "/01", None)]).unwrap_err(),
            PatchError::BadIndex("01".into())
        );
        assert_eq!(
            apply_patch(&doc, &[op(PatchOpKind::Remove, "/9", None)]).unwrap_err(),
            PatchError::NotFound("/9".into())
        );
    }
}
