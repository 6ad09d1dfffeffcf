// src/raster.rs
//
// =============================================================================
// SHADERGRAPH: SOFTWARE RASTERIZER
// =============================================================================
//
// A minimal triangle-list pipeline over the interpreter: vertex stage,
// triangle setup with perspective divide and Y flip, then a scanline fill
// that interpolates varyings barycentrically and runs the fragment function
// per covered pixel.
//
// The rasterizer owns no evaluation state; it drives the context it is
// handed (composition, not inheritance).

use crate::error::ExecError;
use crate::graph::FunctionGraph;
use crate::interp::EvalContext;
use crate::ir::{FunctionDef, IrType, Node, StructDef};
use crate::value::RuntimeValue;
use std::collections::HashMap;

/// A vertex-stage output split into its clip position and varyings.
struct ShadedVertex {
    clip: [f64; 4],
    varyings: RuntimeValue,
}

pub fn draw<'a>(
    ctx: &mut EvalContext<'a>,
    graph: &FunctionGraph<'a>,
    node: &'a Node,
) -> Result<(), ExecError> {
    if let Some(topology) = node.field("topology").and_then(|v| v.as_str()) {
        if topology != "triangle-list" {
            return Err(ExecError::UnsupportedTopology(topology.to_string()));
        }
    }

    let vertex_fn = stage_function(ctx, node, "vertex")?;
    let fragment_fn = stage_function(ctx, node, "fragment")?;
    let target = node
        .symbol("target")
        .ok_or_else(|| ExecError::MissingArgument {
            node: node.id.clone(),
            key: "target".into(),
        })?
        .to_string();
    let count = ctx.require_arg(graph, node, "count")?.as_i64()?;
    let instances = match ctx.resolve_arg(graph, node, "instances")? {
        Some(v) => v.as_i64()?.max(1),
        None => 1,
    };

    let (width, height) = {
        let texture = ctx
            .resources
            .texture(&target)
            .ok_or_else(|| ExecError::UnknownResource(target.clone()))?;
        (texture.width, texture.height)
    };
    if width == 0 || height == 0 {
        return Ok(());
    }

    let position_member = position_member_name(ctx, vertex_fn);
    let vertex_args = ctx.bind_call_args(graph, node, vertex_fn)?;
    let fragment_port = fragment_fn.inputs.first().map(|p| p.id.clone());

    log::debug!(
        "draw {count} vertice(s) x{instances} into '{target}' ({width}x{height})"
    );

    let saved = ctx.take_builtins();
    let outcome = (|| -> Result<(), ExecError> {
        for instance in 0..instances {
            // --- 1. vertex stage ---
            let mut shaded = Vec::with_capacity(count.max(0) as usize);
            for vertex_index in 0..count {
                ctx.set_builtin("vertex_index", RuntimeValue::Int(vertex_index));
                ctx.set_builtin("instance_index", RuntimeValue::Int(instance));
                let out = ctx.run_function(vertex_fn, vertex_args.clone())?;
                shaded.push(split_vertex(out, position_member.as_deref(), &node.id)?);
            }

            // --- 2 + 3. triangle setup and fill ---
            for triangle in shaded.chunks_exact(3) {
                rasterize_triangle(
                    ctx,
                    triangle,
                    fragment_fn,
                    fragment_port.as_deref(),
                    &target,
                    width,
                    height,
                )?;
            }
        }
        Ok(())
    })();
    ctx.restore_builtins(saved);
    outcome
}

fn stage_function<'a>(
    ctx: &EvalContext<'a>,
    node: &Node,
    stage: &str,
) -> Result<&'a FunctionDef, ExecError> {
    let name = node
        .symbol(stage)
        .ok_or_else(|| ExecError::MissingStage(stage.to_string()))?;
    ctx.doc
        .function(name)
        .ok_or_else(|| ExecError::UnknownFunction(name.to_string()))
}

/// The struct member holding the clip-space position: the member tagged
/// `builtin: position` in the vertex function's output struct, with
/// fallbacks to the conventional names.
fn position_member_name(ctx: &EvalContext, vertex_fn: &FunctionDef) -> Option<String> {
    let output = vertex_fn.outputs.first()?;
    let def: &StructDef = match IrType::parse(&output.ty)? {
        IrType::Struct(id) => ctx.doc.struct_def(&id)?,
        _ => return None,
    };
    if let Some(member) = def.builtin_member("position") {
        return Some(member.id.clone());
    }
    for fallback in ["position", "pos"] {
        if def.members.iter().any(|m| m.id == fallback) {
            return Some(fallback.to_string());
        }
    }
    None
}

fn split_vertex(
    out: RuntimeValue,
    position_member: Option<&str>,
    node: &str,
) -> Result<ShadedVertex, ExecError> {
    let clip_of = |v: &RuntimeValue| -> Result<[f64; 4], ExecError> {
        let v = v.as_vector()?;
        if v.len() != 4 {
            return Err(ExecError::TypeMismatch {
                node: node.to_string(),
                expected: "float4 clip position".into(),
                found: format!("vector of width {}", v.len()),
            });
        }
        Ok([v[0], v[1], v[2], v[3]])
    };

    match &out {
        RuntimeValue::Struct(members) => {
            let key = position_member
                .map(str::to_string)
                .or_else(|| {
                    ["position", "pos"]
                        .iter()
                        .find(|k| members.contains_key(**k))
                        .map(|k| k.to_string())
                })
                .ok_or_else(|| ExecError::Runtime {
                    node: node.to_string(),
                    message: "vertex output has no position member".into(),
                })?;
            let position = members.get(&key).ok_or_else(|| ExecError::Runtime {
                node: node.to_string(),
                message: format!("vertex output has no member '{key}'"),
            })?;
            let clip = clip_of(position)?;
            let mut varyings = members.clone();
            varyings.remove(&key);
            Ok(ShadedVertex {
                clip,
                varyings: RuntimeValue::Struct(varyings),
            })
        }
        other => Ok(ShadedVertex {
            clip: clip_of(other)?,
            varyings: RuntimeValue::Void,
        }),
    }
}

fn edge(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

#[allow(clippy::too_many_arguments)]
fn rasterize_triangle<'a>(
    ctx: &mut EvalContext<'a>,
    triangle: &[ShadedVertex],
    fragment_fn: &'a FunctionDef,
    fragment_port: Option<&str>,
    target: &str,
    width: usize,
    height: usize,
) -> Result<(), ExecError> {
    // perspective divide into screen space, flipping Y
    let mut screen = [[0.0f64; 2]; 3];
    for (i, vertex) in triangle.iter().enumerate() {
        let w = vertex.clip[3];
        if w.abs() < 1e-12 {
            return Ok(());
        }
        let ndc_x = vertex.clip[0] / w;
        let ndc_y = vertex.clip[1] / w;
        screen[i] = [
            (ndc_x * 0.5 + 0.5) * width as f64,
            (1.0 - (ndc_y * 0.5 + 0.5)) * height as f64,
        ];
    }

    let area = edge(screen[0], screen[1], screen[2]);
    if area == 0.0 {
        return Ok(());
    }

    // bounding box clamped to the target
    let min_x = screen.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
    let max_x = screen.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max);
    let min_y = screen.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min);
    let max_y = screen.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max);
    let x0 = (min_x.floor().max(0.0)) as usize;
    let x1 = (max_x.ceil().min(width as f64 - 1.0)).max(0.0) as usize;
    let y0 = (min_y.floor().max(0.0)) as usize;
    let y1 = (max_y.ceil().min(height as f64 - 1.0)).max(0.0) as usize;

    for py in y0..=y1 {
        for px in x0..=x1 {
            let p = [px as f64 + 0.5, py as f64 + 0.5];
            let e0 = edge(screen[1], screen[2], p);
            let e1 = edge(screen[2], screen[0], p);
            let e2 = edge(screen[0], screen[1], p);
            // inside under either winding
            let inside = (e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0)
                || (e0 <= 0.0 && e1 <= 0.0 && e2 <= 0.0);
            if !inside {
                continue;
            }
            let bary = [e0 / area, e1 / area, e2 / area];

            let mut args = HashMap::new();
            if let Some(port) = fragment_port {
                let interpolated = interpolate_varyings(triangle, bary);
                args.insert(port.to_string(), interpolated);
            }
            let color = ctx.run_function(fragment_fn, args)?;
            let color = color.as_vector()?;
            if color.len() != 4 {
                return Err(ExecError::TypeMismatch {
                    node: fragment_fn.id.clone(),
                    expected: "float4 fragment color".into(),
                    found: format!("vector of width {}", color.len()),
                });
            }
            let texture = ctx.resources.texture_mut(target)?;
            texture.store(
                px as i64,
                py as i64,
                [color[0], color[1], color[2], color[3]],
            );
        }
    }
    Ok(())
}

/// Component-wise barycentric interpolation of the non-position varyings.
/// Non-numeric members interpolate flat (provoking vertex 0).
fn interpolate_varyings(triangle: &[ShadedVertex], bary: [f64; 3]) -> RuntimeValue {
    let (a, b, c) = (
        &triangle[0].varyings,
        &triangle[1].varyings,
        &triangle[2].varyings,
    );
    match (a, b, c) {
        (RuntimeValue::Struct(ma), RuntimeValue::Struct(mb), RuntimeValue::Struct(mc)) => {
            let mut out = ma.clone();
            for (key, value) in out.iter_mut() {
                let (vb, vc) = (mb.get(key), mc.get(key));
                let next = match (&*value, vb, vc) {
                    (RuntimeValue::Float(x), Some(yb), Some(yc)) => {
                        match (yb.as_f64(), yc.as_f64()) {
                            (Ok(y), Ok(z)) => Some(RuntimeValue::Float(
                                x * bary[0] + y * bary[1] + z * bary[2],
                            )),
                            _ => None,
                        }
                    }
                    (RuntimeValue::Int(x), Some(yb), Some(yc)) => {
                        match (yb.as_f64(), yc.as_f64()) {
                            (Ok(y), Ok(z)) => Some(RuntimeValue::Float(
                                *x as f64 * bary[0] + y * bary[1] + z * bary[2],
                            )),
                            _ => None,
                        }
                    }
                    (
                        RuntimeValue::Vector(xs),
                        Some(RuntimeValue::Vector(ys)),
                        Some(RuntimeValue::Vector(zs)),
                    ) if xs.len() == ys.len() && ys.len() == zs.len() => Some(RuntimeValue::Vector(
                        xs.iter()
                            .zip(ys)
                            .zip(zs)
                            .map(|((x, y), z)| x * bary[0] + y * bary[1] + z * bary[2])
                            .collect(),
                    )),
                    _ => None,
                };
                if let Some(next) = next {
                    *value = next;
                }
            }
            RuntimeValue::Struct(out)
        }
        _ => a.clone(),
    }
}
