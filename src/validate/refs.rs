// src/validate/refs.rs
//
// Pass 2: referential integrity. Duplicate ids, the entry point, struct
// recursion, dangling edge endpoints, symbol references on nodes, and
// static call-graph cycles.

use super::{codes, Collector};
use crate::ir::{
    is_executable_op, EdgeKind, FunctionDef, FunctionKind, IrDocument, IrType, EXEC_PORTS,
};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

pub(super) fn check(doc: &IrDocument, out: &mut Collector) {
    check_unique_ids(doc, out);
    check_entry_point(doc, out);
    check_struct_recursion(doc, out);
    check_named_types(doc, out);
    for func in &doc.functions {
        check_function(doc, func, out);
    }
    check_call_cycles(doc, out);
}

fn duplicates<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for id in ids {
        if !seen.insert(id) && !dups.contains(&id) {
            dups.push(id);
        }
    }
    dups
}

fn check_unique_ids(doc: &IrDocument, out: &mut Collector) {
    let scopes: [(&str, Vec<&str>); 5] = [
        ("input", doc.inputs.iter().map(|i| i.id.as_str()).collect()),
        ("resource", doc.resources.iter().map(|r| r.id.as_str()).collect()),
        ("struct", doc.structs.iter().map(|s| s.id.as_str()).collect()),
        ("global", doc.globals.iter().map(|g| g.id.as_str()).collect()),
        ("function", doc.functions.iter().map(|f| f.id.as_str()).collect()),
    ];
    for (scope, ids) in scopes {
        for dup in duplicates(ids.into_iter()) {
            out.error(
                codes::DUPLICATE_ID,
                format!("duplicate {scope} id '{dup}'"),
                None,
                None,
            );
        }
    }

    for func in &doc.functions {
        for dup in duplicates(func.nodes.iter().map(|n| n.id.as_str())) {
            out.error(
                codes::DUPLICATE_ID,
                format!("duplicate node id '{dup}' in function '{}'", func.id),
                None,
                Some(dup.to_string()),
            );
        }
        for dup in duplicates(func.local_vars.iter().map(|v| v.id.as_str())) {
            out.error(
                codes::DUPLICATE_ID,
                format!("duplicate local var id '{dup}' in function '{}'", func.id),
                None,
                None,
            );
        }
    }
}

fn check_entry_point(doc: &IrDocument, out: &mut Collector) {
    match doc.function(&doc.entry_point) {
        None => out.error(
            codes::ENTRY_POINT,
            format!("entryPoint '{}' does not exist", doc.entry_point),
            Some("/entryPoint".into()),
            None,
        ),
        Some(f) if f.kind != FunctionKind::Cpu => out.error(
            codes::ENTRY_POINT,
            format!("entryPoint '{}' must be a cpu function", doc.entry_point),
            Some("/entryPoint".into()),
            None,
        ),
        Some(_) => {}
    }
}

/// Struct member types form a graph; a cycle means infinite nesting.
fn check_struct_recursion(doc: &IrDocument, out: &mut Collector) {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut index = HashMap::new();
    for def in &doc.structs {
        index.insert(def.id.as_str(), graph.add_node(def.id.as_str()));
    }
    for def in &doc.structs {
        for member in &def.members {
            let mut ty = IrType::parse(&member.ty);
            // unwrap array nesting to the element type
            while let Some(IrType::Array { elem, .. }) = ty {
                ty = Some(*elem);
            }
            if let Some(IrType::Struct(target)) = ty {
                if let (Some(&from), Some(&to)) =
                    (index.get(def.id.as_str()), index.get(target.as_str()))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }
    }
    if is_cyclic_directed(&graph) {
        out.error(
            codes::STRUCT_RECURSION,
            "struct definitions form a reference cycle",
            Some("/structs".into()),
            None,
        );
    }
}

/// Every struct name used in a port, local, member, global, input or buffer
/// element type must be declared.
fn check_named_types(doc: &IrDocument, out: &mut Collector) {
    let known: HashSet<&str> = doc.structs.iter().map(|s| s.id.as_str()).collect();
    let mut check = |ty: &str, where_: String, out: &mut Collector| {
        let mut parsed = IrType::parse(ty);
        while let Some(IrType::Array { elem, .. }) = parsed {
            parsed = Some(*elem);
        }
        if let Some(IrType::Struct(name)) = parsed {
            if !known.contains(name.as_str()) {
                out.error(
                    codes::UNKNOWN_TYPE,
                    format!("unknown type '{name}' in {where_}"),
                    None,
                    None,
                );
            }
        }
    };

    for input in &doc.inputs {
        if input.ty != "texture" {
            check(&input.ty, format!("input '{}'", input.id), out);
        }
    }
    for resource in &doc.resources {
        if let Some(ty) = &resource.element_type {
            check(ty, format!("resource '{}'", resource.id), out);
        }
    }
    for def in &doc.structs {
        for member in &def.members {
            check(
                &member.ty,
                format!("struct '{}' member '{}'", def.id, member.id),
                out,
            );
        }
    }
    for global in &doc.globals {
        check(&global.ty, format!("global '{}'", global.id), out);
    }
    for func in &doc.functions {
        for port in func.inputs.iter().chain(func.outputs.iter()) {
            check(&port.ty, format!("function '{}' port '{}'", func.id, port.id), out);
        }
        for var in &func.local_vars {
            check(&var.ty, format!("function '{}' local '{}'", func.id, var.id), out);
        }
    }
}

fn check_function(doc: &IrDocument, func: &FunctionDef, out: &mut Collector) {
    let before = out.poisoned_functions.len();
    let node_ids: HashSet<&str> = func.nodes.iter().map(|n| n.id.as_str()).collect();

    // --- Edges ---
    for (ei, edge) in func.edges.iter().enumerate() {
        let path = format!("/functions/{}/edges/{ei}", func.id);
        let mut poison = false;
        if !node_ids.contains(edge.from.as_str()) {
            out.error(
                codes::BAD_EDGE,
                format!("edge.from references unknown node '{}'", edge.from),
                Some(path.clone()),
                None,
            );
            poison = true;
        }
        if !node_ids.contains(edge.to.as_str()) {
            out.error(
                codes::BAD_EDGE,
                format!("edge.to references unknown node '{}'", edge.to),
                Some(path.clone()),
                None,
            );
            poison = true;
        }
        if edge.kind == EdgeKind::Execution {
            if !EXEC_PORTS.contains(&edge.port_out.as_str()) || edge.port_out == "exec_in" {
                out.error(
                    codes::BAD_EDGE,
                    format!("'{}' is not an execution output port", edge.port_out),
                    Some(path.clone()),
                    None,
                );
            }
            if edge.port_in != "exec_in" {
                out.error(
                    codes::BAD_EDGE,
                    format!("execution edges must target exec_in, found '{}'", edge.port_in),
                    Some(path),
                    None,
                );
            }
        }
        if poison {
            out.poisoned_functions.insert(func.id.clone());
        }
    }

    // --- Node symbols ---
    for node in &func.nodes {
        check_node_symbols(doc, func, node, out);
    }

    if out.poisoned_functions.len() > before {
        log::debug!("function '{}' poisoned by referential errors", func.id);
    }
}

fn check_node_symbols(
    doc: &IrDocument,
    func: &FunctionDef,
    node: &crate::ir::Node,
    out: &mut Collector,
) {
    let nid = Some(node.id.clone());
    let mut poison = false;

    if let Some(name) = node.symbol("func") {
        match doc.function(name) {
            None => {
                out.error(
                    codes::UNKNOWN_REFERENCE,
                    format!("unknown function '{name}'"),
                    None,
                    nid.clone(),
                );
                poison = true;
            }
            Some(target) => {
                if node.op == "cmd_dispatch" && target.kind != FunctionKind::Shader {
                    out.error(
                        codes::UNKNOWN_REFERENCE,
                        format!("cmd_dispatch target '{name}' must be a shader function"),
                        None,
                        nid.clone(),
                    );
                }
            }
        }
    }

    if let Some(name) = node.symbol("var") {
        let known = func.local_var(name).is_some()
            || func.input_port(name).is_some()
            || doc.global(name).is_some();
        if !known {
            out.error(
                codes::UNKNOWN_REFERENCE,
                format!("unknown variable '{name}'"),
                None,
                nid.clone(),
            );
            poison = true;
        }
    }

    for key in ["resource", "buffer", "tex", "texture", "target"] {
        if let Some(name) = node.symbol(key) {
            if doc.resource(name).is_none() && doc.input(name).is_none() {
                out.error(
                    codes::UNKNOWN_REFERENCE,
                    format!("unknown resource '{name}'"),
                    None,
                    nid.clone(),
                );
                poison = true;
            }
        }
    }

    for key in ["vertex", "fragment"] {
        if let Some(name) = node.symbol(key) {
            match doc.function(name) {
                None => {
                    out.error(
                        codes::UNKNOWN_REFERENCE,
                        format!("unknown {key} function '{name}'"),
                        None,
                        nid.clone(),
                    );
                    poison = true;
                }
                Some(f) if f.kind != FunctionKind::Shader => out.error(
                    codes::UNKNOWN_REFERENCE,
                    format!("{key} function '{name}' must be of shader kind"),
                    None,
                    nid.clone(),
                ),
                Some(_) => {}
            }
        }
    }

    if let Some(name) = node.symbol("loop") {
        match func.node(name) {
            Some(target) if target.op == "flow_loop" => {}
            Some(_) => out.error(
                codes::UNKNOWN_REFERENCE,
                format!("'{name}' is not a flow_loop node"),
                None,
                nid.clone(),
            ),
            None => {
                out.error(
                    codes::UNKNOWN_REFERENCE,
                    format!("unknown loop node '{name}'"),
                    None,
                    nid.clone(),
                );
                poison = true;
            }
        }
    }

    if poison {
        out.poisoned_functions.insert(func.id.clone());
    }
}

/// A static call cycle is reported as a warning: the runtime recursion
/// guard rejects it on the first re-entered frame, and that runtime error is
/// the contractual surface.
fn check_call_cycles(doc: &IrDocument, out: &mut Collector) {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut index = HashMap::new();
    for func in &doc.functions {
        index.insert(func.id.as_str(), graph.add_node(func.id.as_str()));
    }
    for func in &doc.functions {
        for node in &func.nodes {
            if !is_executable_op(&node.op) {
                continue;
            }
            if matches!(node.op.as_str(), "call_func" | "cmd_dispatch") {
                if let Some(target) = node.symbol("func") {
                    if let (Some(&from), Some(&to)) =
                        (index.get(func.id.as_str()), index.get(target))
                    {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }
    }
    if is_cyclic_directed(&graph) {
        out.warning(
            codes::RECURSIVE_CALLS,
            "functions form a recursive call graph",
            Some("/functions".into()),
            None,
        );
    }
}
