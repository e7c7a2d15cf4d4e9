//! Node editor core
//!
//! [`NodeEditor`] owns a graph together with the registry, execution engine and
//! document metadata of one context type. Front ends drive it through this API
//! only.

pub mod file_manager;

pub use file_manager::{FileManager, GraphFormat};

use crate::config::EditorConfig;
use crate::nodes::execution_engine::{self, ExecutionEngine, ExecutionError, ExecutionStats};
use crate::nodes::factory::{NodeDescriptor, NodeRegistry, NodesContext};
use crate::nodes::feedback::{CancellationToken, FeedbackListener};
use crate::nodes::graph::{Connection, GraphError, NodeGraph};
use crate::nodes::node::{Node, NodeId};
use crate::nodes::port::SocketRef;
use crate::nodes::propagation;
use crate::serialization::{self, GraphMetadata};
use egui::{Color32, Pos2};
use log::{debug, info};
use std::sync::Arc;

/// Graph, registry and execution state for one context
pub struct NodeEditor<C: NodesContext> {
    graph: NodeGraph,
    registry: Arc<NodeRegistry<C>>,
    engine: ExecutionEngine<C>,
    context: C,
    metadata: GraphMetadata,
    config: EditorConfig,
    token: CancellationToken,
}

impl<C: NodesContext> NodeEditor<C> {
    pub fn new(context: C) -> Self {
        Self::with_config(context, EditorConfig::default())
    }

    pub fn with_config(context: C, config: EditorConfig) -> Self {
        let registry = NodeRegistry::<C>::discover();
        Self {
            graph: NodeGraph::new(),
            engine: ExecutionEngine::new(registry.clone()),
            registry,
            context,
            metadata: GraphMetadata::new(&config.author),
            config,
            token: CancellationToken::new(),
        }
    }

    /// Node kinds offered by the context, in declaration order
    pub fn discover(&self) -> Vec<Arc<NodeDescriptor>> {
        self.registry.descriptors()
    }

    pub fn registry(&self) -> &Arc<NodeRegistry<C>> {
        &self.registry
    }

    pub fn add_node(&mut self, descriptor: Arc<NodeDescriptor>, position: Pos2) -> NodeId {
        let id = self.graph.add_node(descriptor, position);
        let [r, g, b, a] = self.config.default_node_color;
        if let Some(node) = self.graph.node_mut(id) {
            node.color = Color32::from_rgba_unmultiplied(r, g, b, a);
        }
        id
    }

    pub fn add_node_by_method_name(&mut self, method_name: &str, position: Pos2) -> Option<NodeId> {
        let descriptor = self.registry.get(method_name)?;
        Some(self.add_node(descriptor, position))
    }

    /// Adds a node by its display name
    pub fn add_node_by_name(&mut self, name: &str, position: Pos2) -> Option<NodeId> {
        let descriptor = self.registry.get_by_name(name)?;
        Some(self.add_node(descriptor, position))
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        self.graph.remove_node(id)
    }

    pub fn connect(&mut self, a: &SocketRef, b: &SocketRef) -> Result<Connection, GraphError> {
        self.graph.connect(a, b)
    }

    /// Shorthand for connecting `from.output` to `to.input`
    pub fn connect_sockets(&mut self, from: NodeId, output: &str, to: NodeId, input: &str) -> Result<Connection, GraphError> {
        self.graph.connect(&SocketRef::new(from, output), &SocketRef::new(to, input))
    }

    pub fn disconnect(&mut self, connection: &Connection) -> bool {
        self.graph.disconnect(connection)
    }

    /// Runs the graph from `start`, or from its execution initiator
    pub fn execute(&mut self, start: Option<NodeId>) -> Result<(), ExecutionError> {
        self.engine.execute(&mut self.graph, &mut self.context, start, &self.token)
    }

    pub fn execute_resolving(&mut self, names: &[&str]) -> Result<(), ExecutionError> {
        self.engine
            .execute_resolving(&mut self.graph, &mut self.context, names, &self.token)
    }

    pub fn has_impact(&self, from: NodeId, to: NodeId) -> bool {
        execution_engine::has_impact(&self.graph, from, to)
    }

    /// Nodes whose display name is one of `names`
    pub fn get_nodes(&self, names: &[&str]) -> Vec<&Node> {
        self.graph
            .nodes_named(names)
            .into_iter()
            .filter_map(|id| self.graph.node(id))
            .collect()
    }

    /// Every node, in handle order
    pub fn nodes(&self) -> Vec<&Node> {
        self.graph.nodes().collect()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node(id)
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut NodeGraph {
        &mut self.graph
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut GraphMetadata {
        &mut self.metadata
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn stats(&self) -> &ExecutionStats {
        self.engine.stats()
    }

    /// Handle that can abort a running execution from another thread
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn set_feedback_listener(&mut self, listener: Option<FeedbackListener>) {
        self.engine.set_feedback_listener(listener);
    }

    /// Removes every node and starts a new document
    pub fn clear(&mut self) {
        self.graph.clear();
        self.engine.reset_stats();
        self.metadata = GraphMetadata::new(&self.config.author);
        debug!("Editor cleared");
    }

    /// Encodes the graph in the binary format
    pub fn serialize(&self) -> serialization::Result<Vec<u8>> {
        serialization::write_binary(&self.graph)
    }

    /// Replaces the graph with a binary document
    ///
    /// On error the current graph is left untouched.
    pub fn deserialize(&mut self, data: &[u8]) -> serialization::Result<()> {
        let graph = serialization::read_binary(data, &self.registry)?;
        self.install(graph, GraphMetadata::new(&self.config.author));
        Ok(())
    }

    pub fn serialize_to_json(&self) -> serialization::Result<String> {
        serialization::write_json(&self.graph, &self.metadata, self.config.pretty_json)
    }

    /// Replaces the graph and metadata with a JSON document
    ///
    /// On error the current graph is left untouched.
    pub fn deserialize_from_json(&mut self, text: &str) -> serialization::Result<()> {
        let (graph, metadata) = serialization::read_json(text, &self.registry)?;
        self.install(graph, metadata);
        Ok(())
    }

    fn install(&mut self, mut graph: NodeGraph, metadata: GraphMetadata) {
        propagation::propagate_all(&mut graph);
        info!(
            "Loaded graph with {} nodes and {} connections",
            graph.len(),
            graph.connections().len()
        );
        self.graph = graph;
        self.metadata = metadata;
    }
}

impl<C: NodesContext + Default> Default for NodeEditor<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::MathContext;
    use crate::nodes::data_type::ValueType;

    #[test]
    fn test_add_nodes_by_name_and_method() {
        let mut editor = NodeEditor::new(MathContext::new());
        let a = editor.add_node_by_name("For Each", Pos2::ZERO).unwrap();
        let b = editor.add_node_by_method_name("ToUpper", Pos2::new(100.0, 0.0)).unwrap();
        assert!(editor.add_node_by_name("Nope", Pos2::ZERO).is_none());

        assert_eq!(editor.nodes().len(), 2);
        assert_eq!(editor.get_nodes(&["For Each"]).len(), 1);
        assert_eq!(editor.get_nodes(&["For Each", "To Upper", "Nope"]).len(), 2);
        assert!(editor.get_nodes(&[]).is_empty());
        assert_eq!(editor.node(a).unwrap().method_name(), "ForEach");
        assert_eq!(editor.node(b).unwrap().name, "To Upper");
        assert_eq!(editor.discover().len(), editor.registry().len());
    }

    #[test]
    fn test_new_nodes_use_configured_color() {
        let config = EditorConfig {
            default_node_color: [10, 20, 30, 255],
            ..EditorConfig::default()
        };
        let mut editor = NodeEditor::with_config(MathContext::new(), config);
        let id = editor.add_node_by_method_name("Add", Pos2::ZERO).unwrap();
        assert_eq!(editor.node(id).unwrap().color, Color32::from_rgb(10, 20, 30));
    }

    #[test]
    fn test_failed_load_keeps_graph() {
        let mut editor = NodeEditor::new(MathContext::new());
        editor.add_node_by_method_name("Add", Pos2::ZERO).unwrap();

        assert!(editor.deserialize(b"garbage").is_err());
        assert!(editor.deserialize_from_json("{\"version\": 99999}").is_err());
        assert_eq!(editor.nodes().len(), 1);
    }

    #[test]
    fn test_load_propagates_types() {
        let mut editor = NodeEditor::new(MathContext::new());
        let source = editor.add_node_by_method_name("NumberListValue", Pos2::ZERO).unwrap();
        let first = editor.add_node_by_method_name("FirstItem", Pos2::ZERO).unwrap();
        editor.connect_sockets(source, "outValue", first, "items").unwrap();

        let bytes = editor.serialize().unwrap();
        editor.clear();
        assert!(editor.nodes().is_empty());

        editor.deserialize(&bytes).unwrap();
        let first = editor.get_nodes(&["First Item"])[0];
        assert_eq!(first.runtime_type("item"), Some(ValueType::Float));
        assert_eq!(editor.graph().connections().len(), 1);

        let text = editor.serialize_to_json().unwrap();
        let mut loaded = NodeEditor::new(MathContext::new());
        loaded.deserialize_from_json(&text).unwrap();
        let first = loaded.get_nodes(&["First Item"])[0];
        assert_eq!(first.runtime_type("item"), Some(ValueType::Float));
    }
}
