// src/graph.rs
//
// =============================================================================
// SHADERGRAPH: EXECUTION-GRAPH WALKER
// =============================================================================
//
// A per-function view over nodes and edges, shared by the interpreter, both
// code generators and the static type pass. Wraps a petgraph DiGraph so the
// consumers agree on entry nodes, execution successors and data-edge
// overrides.

use crate::error::ExecError;
use crate::ir::{is_executable_op, Edge, EdgeKind, FunctionDef, Node};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

pub struct FunctionGraph<'a> {
    pub func: &'a FunctionDef,
    graph: DiGraph<&'a Node, &'a Edge>,
    index: HashMap<&'a str, NodeIndex>,
    /// (target node, input key) -> overriding data edge. Last declared wins.
    data_in: HashMap<(&'a str, &'a str), &'a Edge>,
}

impl<'a> FunctionGraph<'a> {
    /// Build the view. Fails on edges naming unknown endpoints; the
    /// validator reports those before anything downstream runs.
    pub fn build(func: &'a FunctionDef) -> Result<FunctionGraph<'a>, ExecError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for node in &func.nodes {
            let idx = graph.add_node(node);
            index.insert(node.id.as_str(), idx);
        }

        let mut data_in = HashMap::new();
        for edge in &func.edges {
            let from = *index
                .get(edge.from.as_str())
                .ok_or_else(|| ExecError::UnknownNode(edge.from.clone()))?;
            let to = *index
                .get(edge.to.as_str())
                .ok_or_else(|| ExecError::UnknownNode(edge.to.clone()))?;
            graph.add_edge(from, to, edge);
            if edge.kind == EdgeKind::Data {
                data_in.insert((edge.to.as_str(), edge.port_in.as_str()), edge);
            }
        }

        Ok(FunctionGraph {
            func,
            graph,
            index,
            data_in,
        })
    }

    pub fn node(&self, id: &str) -> Option<&'a Node> {
        self.index.get(id).map(|idx| self.graph[*idx])
    }

    /// Executable nodes with no incoming execution edge, in declaration
    /// order. These seed the breadth-first schedule.
    pub fn entry_nodes(&self) -> Vec<&'a Node> {
        self.func
            .nodes
            .iter()
            .filter(|n| is_executable_op(&n.op))
            .filter(|n| !self.has_incoming_exec(&n.id))
            .collect()
    }

    pub fn has_incoming_exec(&self, id: &str) -> bool {
        let Some(idx) = self.index.get(id) else {
            return false;
        };
        self.graph
            .edges_directed(*idx, Direction::Incoming)
            .any(|e| e.weight().kind == EdgeKind::Execution)
    }

    /// Execution successors leaving `id` through `port`, in edge declaration
    /// order. petgraph iterates adjacency newest-first, so sort by edge id.
    pub fn exec_successors(&self, id: &str, port: &str) -> Vec<&'a Node> {
        let Some(idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(*idx, Direction::Outgoing)
            .filter(|e| {
                e.weight().kind == EdgeKind::Execution && e.weight().port_out == port
            })
            .collect();
        edges.sort_by_key(|e| e.id());
        edges.into_iter().map(|e| self.graph[e.target()]).collect()
    }

    /// The data edge overriding inline key `key` on node `to`, if any.
    pub fn data_edge(&self, to: &str, key: &str) -> Option<&'a Edge> {
        self.data_in.get(&(to, key)).copied()
    }

    /// All keys fed by data edges on `to`.
    pub fn data_edge_keys(&self, to: &str) -> Vec<&'a str> {
        let mut keys: Vec<&'a str> = self
            .data_in
            .iter()
            .filter(|((target, _), _)| *target == to)
            .map(|((_, key), _)| *key)
            .collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn func(v: serde_json::Value) -> FunctionDef {
        serde_json::from_value(v).unwrap()
    }

    fn branch_function() -> FunctionDef {
        func(json!({
            "id": "main",
            "kind": "cpu",
            "nodes": [
                {"id": "br", "op": "flow_branch", "cond": true},
                {"id": "then", "op": "buffer_store", "buffer": "b", "index": 0, "value": 1},
                {"id": "else", "op": "buffer_store", "buffer": "b", "index": 0, "value": 2},
                {"id": "add", "op": "math_add", "a": 1, "b": 2}
            ],
            "edges": [
                {"from": "br", "portOut": "exec_true", "to": "then", "portIn": "exec_in", "type": "execution"},
                {"from": "br", "portOut": "exec_false", "to": "else", "portIn": "exec_in", "type": "execution"},
                {"from": "add", "portOut": "out", "to": "then", "portIn": "value", "type": "data"}
            ]
        }))
    }

    #[test]
    fn entry_nodes_are_unreached_executables() {
        let f = branch_function();
        let g = FunctionGraph::build(&f).unwrap();
        let entries: Vec<&str> = g.entry_nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(entries, vec!["br"]);
    }

    #[test]
    fn successors_follow_ports() {
        let f = branch_function();
        let g = FunctionGraph::build(&f).unwrap();
        let t: Vec<&str> = g
            .exec_successors("br", "exec_true")
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(t, vec!["then"]);
        assert!(g.exec_successors("br", "exec_completed").is_empty());
    }

    #[test]
    fn data_edges_override_keys() {
        let f = branch_function();
        let g = FunctionGraph::build(&f).unwrap();
        let e = g.data_edge("then", "value").unwrap();
        assert_eq!(e.from, "add");
        assert!(g.data_edge("then", "index").is_none());
        assert_eq!(g.data_edge_keys("then"), vec!["value"]);
    }

    #[test]
    fn unknown_endpoint_fails() {
        let f = func(json!({
            "id": "main",
            "kind": "cpu",
            "nodes": [{"id": "a", "op": "func_return"}],
            "edges": [{"from": "a", "portOut": "exec_out", "to": "ghost", "portIn": "exec_in", "type": "execution"}]
        }));
        assert!(FunctionGraph::build(&f).is_err());
    }
}
