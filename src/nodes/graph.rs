//! Node graph data structures and operations

use super::cache::{CacheKeyPattern, CacheStatistics, GraphCache, InputKey};
use super::data_type::{are_compatible, ValueType};
use super::factory::NodeDescriptor;
use super::node::{Node, NodeId};
use super::port::{Socket, SocketRef};
use super::propagation;
use egui::Pos2;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Connect-time and lookup failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("cannot connect '{first}' to '{second}': both sockets are {direction}s")]
    DirectionMismatch {
        first: String,
        second: String,
        direction: &'static str,
    },
    #[error("cannot connect {output_type} output '{output}' to {input_type} input '{input}'")]
    TypeIncompatible {
        output: String,
        input: String,
        output_type: ValueType,
        input_type: ValueType,
    },
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("node {node} has no socket named '{socket}'")]
    SocketNotFound { node: NodeId, socket: String },
}

/// Directed edge from one node's output socket to another's input socket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub output_node: NodeId,
    pub output_socket: String,
    pub input_node: NodeId,
    pub input_socket: String,
}

impl Connection {
    /// Creates a new connection
    pub fn new(
        output_node: NodeId,
        output_socket: impl Into<String>,
        input_node: NodeId,
        input_socket: impl Into<String>,
    ) -> Self {
        Self {
            output_node,
            output_socket: output_socket.into(),
            input_node,
            input_socket: input_socket.into(),
        }
    }

    pub fn touches(&self, node_id: NodeId) -> bool {
        self.output_node == node_id || self.input_node == node_id
    }
}

/// A graph containing nodes and their connections
///
/// Invariants: every connection endpoint references a node in the graph, and
/// at most one connection targets a given input socket.
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: BTreeMap<NodeId, Node>,
    connections: Vec<Connection>,
    next_node_id: NodeId,
    cache: GraphCache,
}

impl NodeGraph {
    /// Creates a new empty node graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates a descriptor and returns the new node's handle
    pub fn add_node(&mut self, descriptor: Arc<NodeDescriptor>, position: Pos2) -> NodeId {
        let node = Node::new(0, descriptor, position);
        self.insert_node(node)
    }

    /// Adds an already built node, assigning it a fresh handle
    pub fn insert_node(&mut self, mut node: Node) -> NodeId {
        let id = self.next_node_id;
        node.id = id;
        self.nodes.insert(id, node);
        self.next_node_id += 1;
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Mutable access to a node; drops its cached sockets
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.cache.invalidate(&CacheKeyPattern::Node(id));
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in handle (creation) order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn find_by_guid(&self, guid: &str) -> Option<NodeId> {
        self.nodes.values().find(|n| n.guid == guid).map(|n| n.id)
    }

    /// Nodes whose display name is one of `names`
    pub fn nodes_named(&self, names: &[&str]) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| names.contains(&n.name.as_str()))
            .map(|n| n.id)
            .collect()
    }

    /// The node execution starts from when no start node is given
    pub fn execution_initiator(&self) -> Option<NodeId> {
        let mut initiators = self.nodes.values().filter(|n| n.callable && n.execution_initiator);
        let first = initiators.next()?;
        if initiators.next().is_some() {
            warn!("Multiple execution initiators found, starting from '{}'", first.name);
        }
        Some(first.id)
    }

    /// Sockets of a node, computed from its descriptor and runtime type overrides
    pub fn sockets(&self, id: NodeId) -> Vec<Socket> {
        match self.nodes.get(&id) {
            Some(node) => self.cache.sockets_or_insert_with(id, || node.build_sockets()),
            None => Vec::new(),
        }
    }

    pub fn socket(&self, id: NodeId, name: &str) -> Option<Socket> {
        self.sockets(id).into_iter().find(|s| s.name == name)
    }

    /// The connection feeding an input socket, if any
    pub fn incoming_connection(&self, node: NodeId, socket: &str) -> Option<&Connection> {
        let key: InputKey = (node, socket.to_string());
        let index = self.cache.input_connection(&key, || {
            self.connections
                .iter()
                .enumerate()
                .map(|(i, c)| ((c.input_node, c.input_socket.clone()), i))
                .collect::<HashMap<_, _>>()
        })?;
        self.connections.get(index)
    }

    /// All connections into a node
    pub fn incoming_connections(&self, node: NodeId) -> Vec<Connection> {
        self.connections.iter().filter(|c| c.input_node == node).cloned().collect()
    }

    /// All connections out of a node
    pub fn outgoing_connections(&self, node: NodeId) -> Vec<Connection> {
        self.connections.iter().filter(|c| c.output_node == node).cloned().collect()
    }

    /// Whether a connection carries control flow rather than data
    pub fn is_execution_connection(&self, connection: &Connection) -> bool {
        self.nodes
            .get(&connection.output_node)
            .and_then(|n| n.runtime_type(&connection.output_socket))
            .map(|ty| ty.is_execution_path())
            .unwrap_or(false)
    }

    /// Connects two sockets given in either order
    ///
    /// Replaces any previous connection into the same input and re-runs type
    /// propagation from the input node.
    pub fn connect(&mut self, a: &SocketRef, b: &SocketRef) -> Result<Connection, GraphError> {
        let first = self.socket(a.node, &a.name).ok_or_else(|| self.missing(a))?;
        let second = self.socket(b.node, &b.name).ok_or_else(|| self.missing(b))?;

        if first.direction == second.direction {
            return Err(GraphError::DirectionMismatch {
                first: a.name.clone(),
                second: b.name.clone(),
                direction: first.direction.name(),
            });
        }

        let (output, output_ref, input, input_ref) = if first.is_output() {
            (first, a, second, b)
        } else {
            (second, b, first, a)
        };

        if !are_compatible(&output.runtime_type, &input.runtime_type) {
            return Err(GraphError::TypeIncompatible {
                output: output.name,
                input: input.name,
                output_type: output.runtime_type,
                input_type: input.runtime_type,
            });
        }

        let connection = Connection::new(output_ref.node, &output_ref.name, input_ref.node, &input_ref.name);
        self.attach(connection.clone());
        propagation::propagate_from(self, connection.input_node);
        Ok(connection)
    }

    /// Removes a connection and re-propagates types from its former input node
    pub fn disconnect(&mut self, connection: &Connection) -> bool {
        if !self.detach(connection) {
            return false;
        }
        propagation::propagate_from(self, connection.input_node);
        true
    }

    /// Removes a node and every connection touching it
    ///
    /// Nodes downstream of the removed one are captured first and have their
    /// types re-propagated once their incoming edges are gone.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        if !self.nodes.contains_key(&id) {
            return None;
        }

        let downstream = self.collect_downstream(id);
        let removed = self.nodes.remove(&id);
        let before = self.connections.len();
        self.connections.retain(|c| !c.touches(id));
        debug!("Removed node {} and {} connections", id, before - self.connections.len());
        self.cache.invalidate(&CacheKeyPattern::Node(id));
        self.cache.invalidate_connections();

        propagation::propagate_nodes(self, downstream);
        removed
    }

    /// Every node reachable from `id` through outgoing connections
    pub fn collect_downstream(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut collected = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            for connection in self.connections.iter().filter(|c| c.output_node == current) {
                if connection.input_node != id && collected.insert(connection.input_node) {
                    stack.push(connection.input_node);
                }
            }
        }
        collected
    }

    /// Removes every node and connection
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
        self.cache.clear();
    }

    pub fn cache_statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }

    /// Adds a connection without validation, replacing any connection into the same input
    pub(crate) fn attach(&mut self, connection: Connection) -> Option<Connection> {
        let previous = self
            .connections
            .iter()
            .position(|c| c.input_node == connection.input_node && c.input_socket == connection.input_socket)
            .map(|index| self.connections.remove(index));

        self.cache.invalidate(&CacheKeyPattern::Node(connection.output_node));
        self.cache.invalidate(&CacheKeyPattern::Node(connection.input_node));
        self.connections.push(connection);
        self.cache.invalidate_connections();
        previous
    }

    /// Removes a connection without re-propagating
    pub(crate) fn detach(&mut self, connection: &Connection) -> bool {
        let Some(index) = self.connections.iter().position(|c| c == connection) else {
            return false;
        };
        self.connections.remove(index);
        self.cache.invalidate(&CacheKeyPattern::Node(connection.output_node));
        self.cache.invalidate(&CacheKeyPattern::Node(connection.input_node));
        self.cache.invalidate_connections();
        true
    }

    /// Stores a runtime type override; returns true when the resolved type changed
    pub(crate) fn set_runtime_type(&mut self, id: NodeId, socket: &str, ty: ValueType) -> bool {
        let changed = self
            .nodes
            .get_mut(&id)
            .map(|node| node.set_runtime_type(socket, ty))
            .unwrap_or(false);
        if changed {
            self.cache.invalidate(&CacheKeyPattern::Node(id));
        }
        changed
    }

    pub(crate) fn clear_runtime_types(&mut self, id: NodeId) {
        let changed = self.nodes.get_mut(&id).map(|n| n.clear_runtime_types()).unwrap_or(false);
        if changed {
            self.cache.invalidate(&CacheKeyPattern::Node(id));
        }
    }

    fn missing(&self, socket: &SocketRef) -> GraphError {
        if self.nodes.contains_key(&socket.node) {
            GraphError::SocketNotFound {
                node: socket.node,
                socket: socket.name.clone(),
            }
        } else {
            GraphError::NodeNotFound(socket.node)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::factory::{NodeCategory, ParamDescriptor};

    fn descriptor(name: &str, callable: bool, params: Vec<ParamDescriptor>) -> Arc<NodeDescriptor> {
        Arc::new(NodeDescriptor {
            name: name.to_string(),
            category: NodeCategory::new(&["Test"]),
            description: String::new(),
            method_name: name.to_string(),
            params,
            callable,
            execution_initiator: false,
            dynamic: None,
            flow_control: None,
            width: None,
            height: None,
            custom_editor: None,
        })
    }

    fn value_node() -> Arc<NodeDescriptor> {
        descriptor(
            "Value",
            false,
            vec![
                ParamDescriptor::input("inValue", ValueType::Float),
                ParamDescriptor::output("outValue", ValueType::Float),
            ],
        )
    }

    fn text_node() -> Arc<NodeDescriptor> {
        descriptor(
            "Upper",
            true,
            vec![
                ParamDescriptor::input("input", ValueType::Text),
                ParamDescriptor::output("output", ValueType::Text),
            ],
        )
    }

    #[test]
    fn test_connect_identical_types_in_either_order() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(value_node(), Pos2::ZERO);
        let b = graph.add_node(value_node(), Pos2::ZERO);

        let connection = graph
            .connect(&SocketRef::new(b, "inValue"), &SocketRef::new(a, "outValue"))
            .unwrap();
        assert_eq!(connection, Connection::new(a, "outValue", b, "inValue"));
        assert_eq!(graph.incoming_connection(b, "inValue"), Some(&connection));
    }

    #[test]
    fn test_direction_mismatch() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(value_node(), Pos2::ZERO);
        let b = graph.add_node(value_node(), Pos2::ZERO);

        let inputs = graph.connect(&SocketRef::new(a, "inValue"), &SocketRef::new(b, "inValue"));
        assert!(matches!(inputs, Err(GraphError::DirectionMismatch { .. })));
        let outputs = graph.connect(&SocketRef::new(a, "outValue"), &SocketRef::new(b, "outValue"));
        assert!(matches!(outputs, Err(GraphError::DirectionMismatch { .. })));
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_type_incompatible_leaves_graph_unchanged() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(value_node(), Pos2::ZERO);
        let b = graph.add_node(text_node(), Pos2::ZERO);

        let result = graph.connect(&SocketRef::new(a, "outValue"), &SocketRef::new(b, "input"));
        assert!(matches!(result, Err(GraphError::TypeIncompatible { .. })));
        assert!(graph.connections().is_empty());

        let missing = graph.connect(&SocketRef::new(a, "nope"), &SocketRef::new(b, "input"));
        assert!(matches!(missing, Err(GraphError::SocketNotFound { .. })));
        let gone = graph.connect(&SocketRef::new(42, "x"), &SocketRef::new(b, "input"));
        assert_eq!(gone, Err(GraphError::NodeNotFound(42)));
    }

    #[test]
    fn test_single_incoming_connection_per_input() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(value_node(), Pos2::ZERO);
        let b = graph.add_node(value_node(), Pos2::ZERO);
        let c = graph.add_node(value_node(), Pos2::ZERO);

        graph.connect(&SocketRef::new(a, "outValue"), &SocketRef::new(c, "inValue")).unwrap();
        graph.connect(&SocketRef::new(b, "outValue"), &SocketRef::new(c, "inValue")).unwrap();

        assert_eq!(graph.connections().len(), 1);
        assert_eq!(graph.incoming_connection(c, "inValue").map(|c| c.output_node), Some(b));
    }

    #[test]
    fn test_execution_sockets_connect() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(text_node(), Pos2::ZERO);
        let b = graph.add_node(text_node(), Pos2::ZERO);

        let connection = graph.connect(&SocketRef::new(a, "Exit"), &SocketRef::new(b, "Enter")).unwrap();
        assert!(graph.is_execution_connection(&connection));
    }

    #[test]
    fn test_remove_node_leaves_no_dangling_connections() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(value_node(), Pos2::ZERO);
        let b = graph.add_node(value_node(), Pos2::ZERO);
        let c = graph.add_node(value_node(), Pos2::ZERO);
        graph.connect(&SocketRef::new(a, "outValue"), &SocketRef::new(b, "inValue")).unwrap();
        graph.connect(&SocketRef::new(b, "outValue"), &SocketRef::new(c, "inValue")).unwrap();

        assert_eq!(graph.collect_downstream(a), BTreeSet::from([b, c]));
        assert!(graph.remove_node(b).is_some());
        assert!(graph.connections().iter().all(|conn| graph.contains(conn.output_node) && graph.contains(conn.input_node)));
        assert!(graph.connections().is_empty());
        assert!(graph.remove_node(b).is_none());
    }

    #[test]
    fn test_socket_cache_reflects_connection_changes() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(value_node(), Pos2::ZERO);
        let b = graph.add_node(value_node(), Pos2::ZERO);
        assert_eq!(graph.sockets(b).len(), 2);
        let connection = graph.connect(&SocketRef::new(a, "outValue"), &SocketRef::new(b, "inValue")).unwrap();
        assert!(graph.disconnect(&connection));
        assert!(!graph.disconnect(&connection));
        assert!(graph.incoming_connection(b, "inValue").is_none());
    }

    #[test]
    fn test_cache_statistics_count_hits() {
        let mut graph = NodeGraph::new();
        let a = graph.add_node(value_node(), Pos2::ZERO);
        graph.sockets(a);
        graph.sockets(a);

        let stats = graph.cache_statistics();
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.socket_entries, 1);

        graph.node_mut(a).unwrap().tag = 3;
        assert_eq!(graph.cache_statistics().socket_entries, 0);
    }
}
