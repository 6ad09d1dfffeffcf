// src/validate/structure.rs
//
// Pass 1: document shape. Serde already rejected missing/mistyped required
// fields; this pass checks everything the schema cannot express: non-empty
// names, well-formed type strings, size and persistence blocks, and where
// dynamic arrays are allowed to appear.

use super::{codes, Collector};
use crate::ir::{IrDocument, IrType, ResourceKind, SizeSpec};

pub(super) fn check(doc: &IrDocument, out: &mut Collector) {
    if doc.version.trim().is_empty() {
        out.error(codes::STRUCTURAL, "version must not be empty", Some("/version".into()), None);
    }
    if doc.meta.name.trim().is_empty() {
        out.error(
            codes::STRUCTURAL,
            "meta.name must not be empty",
            Some("/meta/name".into()),
            None,
        );
    }
    if doc.functions.is_empty() {
        out.error(
            codes::STRUCTURAL,
            "document must contain at least one function",
            Some("/functions".into()),
            None,
        );
    }

    for (i, input) in doc.inputs.iter().enumerate() {
        // Texture uniforms are declared with the bare `texture` type.
        if input.ty != "texture" {
            check_type(&input.ty, &format!("/inputs/{i}/type"), false, out, None);
        }
    }

    for (i, resource) in doc.resources.iter().enumerate() {
        let path = format!("/resources/{i}");
        match resource.kind {
            ResourceKind::Buffer => {
                match &resource.element_type {
                    Some(ty) => {
                        check_type(ty, &format!("{path}/elementType"), false, out, None);
                    }
                    None => out.error(
                        codes::STRUCTURAL,
                        format!("buffer '{}' is missing elementType", resource.id),
                        Some(path.clone()),
                        None,
                    ),
                }
                if !matches!(resource.size, SizeSpec::Fixed(_)) {
                    out.error(
                        codes::STRUCTURAL,
                        format!("buffer '{}' requires a fixed element count", resource.id),
                        Some(format!("{path}/size")),
                        None,
                    );
                }
            }
            ResourceKind::Texture => {
                if matches!(resource.size, SizeSpec::Fixed(_)) {
                    out.error(
                        codes::STRUCTURAL,
                        format!(
                            "texture '{}' requires an extent or viewport size",
                            resource.id
                        ),
                        Some(format!("{path}/size")),
                        None,
                    );
                }
                if let Some(format) = &resource.format {
                    if !matches!(format.as_str(), "rgba8" | "rgba16f" | "rgba32f" | "r32f") {
                        out.error(
                            codes::STRUCTURAL,
                            format!("texture '{}' has unknown format '{format}'", resource.id),
                            Some(format!("{path}/format")),
                            None,
                        );
                    }
                }
            }
            ResourceKind::Atomic => {
                if !matches!(resource.size, SizeSpec::Fixed(_)) {
                    out.error(
                        codes::STRUCTURAL,
                        format!("atomic '{}' requires a fixed element count", resource.id),
                        Some(format!("{path}/size")),
                        None,
                    );
                }
            }
        }
        if let SizeSpec::Viewport { viewport } = resource.size {
            if !(viewport.is_finite() && viewport > 0.0) {
                out.error(
                    codes::STRUCTURAL,
                    format!("resource '{}' has a non-positive viewport scale", resource.id),
                    Some(format!("{path}/size")),
                    None,
                );
            }
        }
    }

    for (i, def) in doc.structs.iter().enumerate() {
        for (j, member) in def.members.iter().enumerate() {
            check_type(
                &member.ty,
                &format!("/structs/{i}/members/{j}/type"),
                false,
                out,
                None,
            );
        }
    }

    for (i, global) in doc.globals.iter().enumerate() {
        check_type(&global.ty, &format!("/globals/{i}/type"), false, out, None);
    }

    for (fi, func) in doc.functions.iter().enumerate() {
        let mut ok = true;
        for (pi, port) in func.inputs.iter().enumerate() {
            ok &= check_type(
                &port.ty,
                &format!("/functions/{fi}/inputs/{pi}/type"),
                false,
                out,
                None,
            );
        }
        for (pi, port) in func.outputs.iter().enumerate() {
            ok &= check_type(
                &port.ty,
                &format!("/functions/{fi}/outputs/{pi}/type"),
                false,
                out,
                None,
            );
        }
        for (vi, var) in func.local_vars.iter().enumerate() {
            ok &= check_type(
                &var.ty,
                &format!("/functions/{fi}/localVars/{vi}/type"),
                false,
                out,
                None,
            );
        }
        if !ok {
            // Type inference over this function would only produce noise.
            out.poisoned_functions.insert(func.id.clone());
        }
    }
}

/// Returns false (and reports) when the string does not parse, or when it is
/// a dynamic array outside a resource declaration.
fn check_type(
    ty: &str,
    path: &str,
    allow_dynamic: bool,
    out: &mut Collector,
    node_id: Option<String>,
) -> bool {
    match IrType::parse(ty) {
        None => {
            out.error(
                codes::UNKNOWN_TYPE,
                format!("malformed type '{ty}'"),
                Some(path.to_string()),
                node_id,
            );
            false
        }
        Some(IrType::Array { len: None, .. }) if !allow_dynamic => {
            out.error(
                codes::UNKNOWN_TYPE,
                format!("dynamic array '{ty}' is only legal as a global resource"),
                Some(path.to_string()),
                node_id,
            );
            false
        }
        Some(_) => true,
    }
}
