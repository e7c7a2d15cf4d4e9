//! Runtime type propagation for dynamic nodes
//!
//! Dynamic parameters take their runtime type from whatever is connected to
//! them: parameters sharing a group agree on one type, derived parameters
//! mirror another parameter, optionally unwrapping or wrapping a collection.
//! Whenever connections change, the affected node and everything downstream of
//! it is recomputed, and connections that no longer type-check are removed.

use super::data_type::{are_compatible, ValueType};
use super::graph::{Connection, NodeGraph};
use super::node::NodeId;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Upper bound on how often a single node is recomputed in one pass
const MAX_VISITS: usize = 32;

/// Re-propagates types starting at `start` and flowing downstream
pub fn propagate_from(graph: &mut NodeGraph, start: NodeId) {
    let mut worklist = Worklist::default();
    worklist.push(start);
    worklist.run(graph);
}

/// Re-propagates types starting at each of `nodes`
pub fn propagate_nodes(graph: &mut NodeGraph, nodes: BTreeSet<NodeId>) {
    let mut worklist = Worklist::default();
    for id in nodes {
        worklist.push(id);
    }
    worklist.run(graph);
}

/// Recomputes every node's runtime types, sources first
///
/// Used after a graph is loaded, when no override has been computed yet.
pub fn propagate_all(graph: &mut NodeGraph) {
    let (sources, others): (Vec<NodeId>, Vec<NodeId>) = graph
        .node_ids()
        .into_iter()
        .partition(|id| graph.incoming_connections(*id).is_empty());

    let mut worklist = Worklist::default();
    for id in sources.into_iter().chain(others) {
        worklist.push(id);
    }
    worklist.run(graph);
}

#[derive(Default)]
struct Worklist {
    queue: VecDeque<NodeId>,
    queued: HashSet<NodeId>,
    visits: HashMap<NodeId, usize>,
}

impl Worklist {
    fn push(&mut self, id: NodeId) {
        if self.queued.insert(id) {
            self.queue.push_back(id);
        }
    }

    fn run(&mut self, graph: &mut NodeGraph) {
        while let Some(id) = self.queue.pop_front() {
            self.queued.remove(&id);
            let Some(node) = graph.node(id) else {
                continue;
            };
            let dynamic = node.is_dynamic();
            let auto_disconnect = node.descriptor.auto_disconnect_incompatible();

            let visits = self.visits.entry(id).or_insert(0);
            if *visits >= MAX_VISITS {
                debug!("Type propagation for node {} did not settle, keeping current types", id);
                continue;
            }
            *visits += 1;
            let first_visit = *visits == 1;

            let mut changed = false;
            if dynamic {
                changed = update_node_types(graph, id);
                if auto_disconnect {
                    for removed in disconnect_incompatible(graph, id) {
                        changed = true;
                        self.push(removed.input_node);
                    }
                }
            }

            if first_visit || changed {
                for connection in graph.outgoing_connections(id) {
                    self.push(connection.input_node);
                }
            }
        }
    }
}

/// Recomputes the runtime types of one dynamic node from its connections
///
/// Returns true when any of the node's resolved types changed.
pub fn update_node_types(graph: &mut NodeGraph, id: NodeId) -> bool {
    let mut visited = HashSet::new();
    resolve_node_types(graph, id, &mut visited)
}

fn resolve_node_types(graph: &mut NodeGraph, id: NodeId, visited: &mut HashSet<NodeId>) -> bool {
    let Some(node) = graph.node(id) else {
        return false;
    };
    if !node.is_dynamic() {
        return false;
    }
    let descriptor = node.descriptor.clone();
    visited.insert(id);

    let mut connected: HashMap<&str, ValueType> = HashMap::new();
    let mut groups: HashMap<&str, ValueType> = HashMap::new();
    for param in descriptor.inputs() {
        let Some(connection) = graph.incoming_connection(id, &param.name).cloned() else {
            continue;
        };
        let ty = effective_type(graph, &connection, visited);
        if let Some(group) = param.dynamic.as_ref().and_then(|d| d.group.as_deref()) {
            groups.insert(group, ty.clone());
        }
        connected.insert(param.name.as_str(), ty);
    }

    let mut resolved = Vec::new();
    for param in &descriptor.params {
        let Some(dynamic) = &param.dynamic else {
            continue;
        };
        let group_type = dynamic.group.as_deref().and_then(|g| groups.get(g));

        let ty = if let Some(source) = dynamic.derived_from.as_deref() {
            match group_type.or_else(|| connected.get(source)) {
                Some(ty) => dynamic.apply(ty.clone()),
                None => param.value_type.clone(),
            }
        } else if let Some(ty) = group_type {
            dynamic.apply(ty.clone())
        } else if dynamic.group.is_none() && param.is_input() {
            connected
                .get(param.name.as_str())
                .cloned()
                .unwrap_or_else(|| param.value_type.clone())
        } else {
            param.value_type.clone()
        };
        resolved.push((param.name.as_str(), ty));
    }

    let mut changed = false;
    for (name, ty) in resolved {
        if graph.set_runtime_type(id, name, ty.clone()) {
            debug!("Node {} socket '{}' now resolves to {}", id, name, ty);
            changed = true;
        }
    }
    changed
}

/// Type flowing through a connection as seen by its input side
///
/// Generic outputs of dynamic nodes are recomputed first (unless the node is
/// already being resolved higher up). A type still generic afterwards is
/// narrowed by the value currently stored on the output, if any.
fn effective_type(graph: &mut NodeGraph, connection: &Connection, visited: &mut HashSet<NodeId>) -> ValueType {
    let upstream = connection.output_node;
    let socket = connection.output_socket.as_str();

    let Some(node) = graph.node(upstream) else {
        return ValueType::Any;
    };
    let mut ty = node.runtime_type(socket).unwrap_or(ValueType::Any);
    let recompute = node.is_dynamic()
        && node
            .param(socket)
            .map(|p| p.dynamic.is_some() && p.value_type.is_generic())
            .unwrap_or(false);

    if recompute && !visited.contains(&upstream) {
        resolve_node_types(graph, upstream, visited);
        if let Some(ty_now) = graph.node(upstream).and_then(|n| n.runtime_type(socket)) {
            ty = ty_now;
        }
    }

    if ty.is_generic() {
        if let Some(node) = graph.node(upstream) {
            let value = node.value(socket);
            if !value.is_null() {
                let value_type = value.value_type();
                if !value_type.is_generic() {
                    ty = value_type;
                }
            }
        }
    }
    ty
}

/// Removes connections of `id` that no longer type-check after propagation
///
/// Incoming connections are checked against the input's runtime type.
/// Outgoing ones are dropped only when this node cannot know better: an `Any`
/// feeding a typed input, or either end being dynamic.
pub fn disconnect_incompatible(graph: &mut NodeGraph, id: NodeId) -> Vec<Connection> {
    let mut removed = Vec::new();

    for connection in graph.incoming_connections(id) {
        let Some(expected) = graph.node(id).and_then(|n| n.runtime_type(&connection.input_socket)) else {
            continue;
        };
        let mut visited = HashSet::from([id]);
        let actual = effective_type(graph, &connection, &mut visited);
        if !are_compatible(&actual, &expected) {
            removed.push(connection);
        }
    }

    for connection in graph.outgoing_connections(id) {
        let (Some(node), Some(target)) = (graph.node(id), graph.node(connection.input_node)) else {
            continue;
        };
        let (Some(provided), Some(required)) = (
            node.runtime_type(&connection.output_socket),
            target.runtime_type(&connection.input_socket),
        ) else {
            continue;
        };
        if are_compatible(&provided, &required) {
            continue;
        }

        let target_dynamic = target
            .param(&connection.input_socket)
            .map(|p| p.dynamic.is_some())
            .unwrap_or(false);
        let own_dynamic = node
            .param(&connection.output_socket)
            .map(|p| p.dynamic.is_some())
            .unwrap_or(false);
        let untyped = provided == ValueType::Any && required != ValueType::Any;

        if untyped || target_dynamic || own_dynamic {
            removed.push(connection);
        }
    }

    for connection in &removed {
        if graph.detach(connection) {
            info!(
                "Disconnected incompatible connection {}.{} -> {}.{}",
                connection.output_node, connection.output_socket, connection.input_node, connection.input_socket
            );
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::factory::{DynamicType, NodeAttribute, NodeDescriptor, ParamDescriptor};
    use crate::nodes::port::SocketRef;
    use crate::nodes::value::Value;
    use egui::Pos2;
    use std::sync::Arc;

    fn float_source() -> Arc<NodeDescriptor> {
        Arc::new(NodeDescriptor::new(
            "NumberValue",
            NodeAttribute::new("Number", &["Values"], ""),
            vec![
                ParamDescriptor::input("inValue", ValueType::Float),
                ParamDescriptor::output("outValue", ValueType::Float),
            ],
        ))
    }

    fn list_source() -> Arc<NodeDescriptor> {
        Arc::new(NodeDescriptor::new(
            "NumberList",
            NodeAttribute::new("Number list", &["Values"], ""),
            vec![ParamDescriptor::output("outValue", ValueType::list(ValueType::Float))],
        ))
    }

    fn any_source() -> Arc<NodeDescriptor> {
        Arc::new(NodeDescriptor::new(
            "Anything",
            NodeAttribute::new("Anything", &["Values"], ""),
            vec![ParamDescriptor::output("outValue", ValueType::Any)],
        ))
    }

    fn float_sink() -> Arc<NodeDescriptor> {
        Arc::new(NodeDescriptor::new(
            "Sink",
            NodeAttribute::new("Sink", &["Values"], ""),
            vec![ParamDescriptor::input("x", ValueType::Float)],
        ))
    }

    fn identity() -> Arc<NodeDescriptor> {
        Arc::new(NodeDescriptor::new(
            "Identity",
            NodeAttribute::new("Identity", &["Generic"], "").dynamic(),
            vec![
                ParamDescriptor::input("value", ValueType::Any).with_dynamic(DynamicType::group("T")),
                ParamDescriptor::output("result", ValueType::Any).with_dynamic(DynamicType::group("T")),
            ],
        ))
    }

    fn first() -> Arc<NodeDescriptor> {
        Arc::new(NodeDescriptor::new(
            "First",
            NodeAttribute::new("First", &["Generic"], "").dynamic(),
            vec![
                ParamDescriptor::input("items", ValueType::list(ValueType::Any))
                    .with_dynamic(DynamicType::group("T")),
                ParamDescriptor::output("item", ValueType::Any)
                    .with_dynamic(DynamicType::group("T").derived_from("items").extract_element()),
            ],
        ))
    }

    fn connect(graph: &mut NodeGraph, from: NodeId, output: &str, to: NodeId, input: &str) -> Connection {
        graph
            .connect(&SocketRef::new(from, output), &SocketRef::new(to, input))
            .unwrap()
    }

    #[test]
    fn test_group_members_follow_connected_input() {
        let mut graph = NodeGraph::new();
        let source = graph.add_node(float_source(), Pos2::ZERO);
        let id = graph.add_node(identity(), Pos2::ZERO);

        connect(&mut graph, source, "outValue", id, "value");
        let node = graph.node(id).unwrap();
        assert_eq!(node.runtime_type("value"), Some(ValueType::Float));
        assert_eq!(node.runtime_type("result"), Some(ValueType::Float));
    }

    #[test]
    fn test_types_flow_through_chains_and_reset_on_disconnect() {
        let mut graph = NodeGraph::new();
        let source = graph.add_node(float_source(), Pos2::ZERO);
        let a = graph.add_node(identity(), Pos2::ZERO);
        let b = graph.add_node(identity(), Pos2::ZERO);

        connect(&mut graph, a, "result", b, "value");
        let head = connect(&mut graph, source, "outValue", a, "value");
        assert_eq!(graph.node(b).unwrap().runtime_type("result"), Some(ValueType::Float));

        graph.disconnect(&head);
        assert_eq!(graph.node(a).unwrap().runtime_type("result"), Some(ValueType::Any));
        assert_eq!(graph.node(b).unwrap().runtime_type("result"), Some(ValueType::Any));
        assert_eq!(graph.connections().len(), 1);
    }

    #[test]
    fn test_extract_element_from_collection() {
        let mut graph = NodeGraph::new();
        let list = graph.add_node(list_source(), Pos2::ZERO);
        let pick = graph.add_node(first(), Pos2::ZERO);
        let sink = graph.add_node(float_sink(), Pos2::ZERO);

        connect(&mut graph, list, "outValue", pick, "items");
        assert_eq!(graph.node(pick).unwrap().runtime_type("item"), Some(ValueType::Float));
        connect(&mut graph, pick, "item", sink, "x");
        assert_eq!(graph.connections().len(), 2);
    }

    #[test]
    fn test_incompatible_downstream_is_disconnected() {
        let mut graph = NodeGraph::new();
        let list = graph.add_node(list_source(), Pos2::ZERO);
        let pick = graph.add_node(first(), Pos2::ZERO);
        let sink = graph.add_node(float_sink(), Pos2::ZERO);

        let feed = connect(&mut graph, list, "outValue", pick, "items");
        connect(&mut graph, pick, "item", sink, "x");

        graph.remove_node(feed.output_node);
        assert_eq!(graph.node(pick).unwrap().runtime_type("item"), Some(ValueType::Any));
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_cycles_terminate() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(identity(), Pos2::ZERO);
        let b = graph.add_node(identity(), Pos2::ZERO);

        connect(&mut graph, a, "result", b, "value");
        connect(&mut graph, b, "result", a, "value");
        propagate_all(&mut graph);
        assert_eq!(graph.connections().len(), 2);
        assert_eq!(graph.node(a).unwrap().runtime_type("result"), Some(ValueType::Any));
    }

    #[test]
    fn test_generic_output_narrowed_by_stored_value() {
        let mut graph = NodeGraph::new();
        let source = graph.add_node(any_source(), Pos2::ZERO);
        let id = graph.add_node(identity(), Pos2::ZERO);
        graph.node_mut(source).unwrap().set_value("outValue", Value::Int(4));

        connect(&mut graph, source, "outValue", id, "value");
        assert_eq!(graph.node(id).unwrap().runtime_type("result"), Some(ValueType::Int));
    }

    #[test]
    fn test_propagate_all_after_bulk_attach() {
        let mut graph = NodeGraph::new();
        let list = graph.add_node(list_source(), Pos2::ZERO);
        let a = graph.add_node(identity(), Pos2::ZERO);
        let pick = graph.add_node(first(), Pos2::ZERO);
        graph.attach(Connection::new(a, "result", pick, "items"));
        graph.attach(Connection::new(list, "outValue", a, "value"));

        propagate_all(&mut graph);
        assert_eq!(graph.node(a).unwrap().runtime_type("result"), Some(ValueType::list(ValueType::Float)));
        assert_eq!(graph.node(pick).unwrap().runtime_type("item"), Some(ValueType::Float));
    }
}
