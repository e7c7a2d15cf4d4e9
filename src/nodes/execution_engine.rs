//! Node graph execution engine
//!
//! Execution follows the control-flow graph formed by execution-path sockets,
//! starting from a given node (or the graph's execution initiator):
//! - Data inputs are resolved on demand by pulling values from upstream nodes,
//!   running non-callable producers as needed
//! - A node that signals one of its own execution-path outputs continues along
//!   that path and is remembered on a history stack; otherwise `Exit` is taken
//! - When a path runs dry the most recent node on the stack is executed again as
//!   a back execution
//! - Flow-control nodes hand control to their [`FlowControlHandler`], which can
//!   run loop bodies and branches synchronously

use super::convert::convert;
use super::data_type::ValueType;
use super::factory::{Invocation, NodeRegistry, NodesContext};
use super::feedback::{CancellationToken, Feedback, FeedbackListener, FeedbackType};
use super::graph::{Connection, NodeGraph};
use super::hooks::FlowControlScope;
use super::node::NodeId;
use super::value::Value;
use crate::constants::sockets;
use log::{debug, error, info, warn};
use std::any::Any;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;

/// Fatal execution failures; they unwind out of [`ExecutionEngine::execute`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("node '{node}' expects a boolean condition, received {received}")]
    ConditionInvalid { node: String, received: String },
    #[error("operation '{operation}' of node '{node}' failed: {message}")]
    OperationFailed {
        node: String,
        operation: String,
        message: String,
    },
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("no operation named '{0}' is registered")]
    UnknownOperation(String),
}

/// Counters accumulated across executions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub executed_nodes: usize,
    pub flow_control_runs: usize,
    pub back_executions: usize,
    /// Inputs passed through unchanged after a failed type conversion
    pub recovered_conversions: usize,
}

/// Runs node graphs against a context of type `C`
pub struct ExecutionEngine<C: NodesContext> {
    registry: Arc<NodeRegistry<C>>,
    /// Nodes that continued along a signalled path, most recent last
    stack: Vec<NodeId>,
    stats: ExecutionStats,
    listener: Option<FeedbackListener>,
}

impl<C: NodesContext> ExecutionEngine<C> {
    pub fn new(registry: Arc<NodeRegistry<C>>) -> Self {
        Self {
            registry,
            stack: Vec::new(),
            stats: ExecutionStats::default(),
            listener: None,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry<C>> {
        &self.registry
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ExecutionStats::default();
    }

    /// Installs the callback receiving every feedback raised by node operations
    pub fn set_feedback_listener(&mut self, listener: Option<FeedbackListener>) {
        self.listener = listener;
    }

    /// Executes the graph from `start`, or from its execution initiator
    ///
    /// Returns `Ok` when the flow completes or is aborted through the token;
    /// the token is reset after an abort.
    pub fn execute(
        &mut self,
        graph: &mut NodeGraph,
        context: &mut C,
        start: Option<NodeId>,
        token: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        let Some(start) = start.or_else(|| graph.execution_initiator()) else {
            warn!("No start node given and no execution initiator in the graph");
            return Ok(());
        };
        if !graph.contains(start) {
            return Err(ExecutionError::NodeNotFound(start));
        }

        info!("Executing graph from node {}", start);
        self.stack.clear();
        let result = self.run(graph, context, start, token, 0);
        self.stack.clear();
        if let Err(e) = &result {
            error!("Execution failed: {}", e);
        }
        result
    }

    fn run(
        &mut self,
        graph: &mut NodeGraph,
        context: &mut C,
        start: NodeId,
        token: &CancellationToken,
        depth: usize,
    ) -> Result<(), ExecutionError> {
        let mut queue = VecDeque::from([start]);

        while let Some(id) = queue.pop_front() {
            if token.is_cancelled() {
                info!("Execution aborted before node {}", id);
                queue.clear();
                self.stack.clear();
                if depth == 0 {
                    token.reset();
                }
                return Ok(());
            }

            self.resolve(graph, context, id, &mut HashSet::new(), token)?;
            self.execute_node(graph, context, id, token)?;

            let handler = graph
                .node(id)
                .ok_or(ExecutionError::NodeNotFound(id))?
                .descriptor
                .flow_control
                .clone();

            if let Some(handler) = handler {
                self.stats.flow_control_runs += 1;
                debug!("Node {} handing control to {}", id, handler.name());
                let mut scope = FlowScope {
                    engine: &mut *self,
                    graph: &mut *graph,
                    context: &mut *context,
                    queue: &mut queue,
                    token,
                    node: id,
                    depth,
                };
                handler.execute(&mut scope)?;

                // An abort raised inside a loop body ends only that loop
                if token.is_cancelled() {
                    token.reset();
                    self.stack.clear();
                }
                continue;
            }

            match self.next_node(graph, id) {
                Some(next) => {
                    if let Some(node) = graph.node_mut(next) {
                        node.back_executed = false;
                    }
                    queue.push_back(next);
                }
                None => {
                    if let Some(back) = self.stack.pop() {
                        if let Some(node) = graph.node_mut(back) {
                            node.back_executed = true;
                        }
                        self.stats.back_executions += 1;
                        debug!("Back executing node {}", back);
                        self.run(graph, context, back, token, depth)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Picks the continuation of a non flow-control node
    ///
    /// A signalled execution-path output wins over `Exit` and pushes the node
    /// onto the history stack.
    fn next_node(&mut self, graph: &NodeGraph, id: NodeId) -> Option<NodeId> {
        let node = graph.node(id)?;
        let outgoing = graph.outgoing_connections(id);

        let signalled = node
            .descriptor
            .outputs()
            .filter(|p| p.value_type.is_execution_path() && node.value(&p.name).is_signaled())
            .find_map(|p| outgoing.iter().find(|c| c.output_socket == p.name));
        if let Some(connection) = signalled {
            self.stack.push(id);
            return Some(connection.input_node);
        }

        outgoing
            .iter()
            .find(|c| c.output_socket == sockets::EXIT)
            .map(|c| c.input_node)
    }

    /// Pulls every connected data input of `id` from upstream
    ///
    /// Non-callable producers are executed on the way; `path` guards against
    /// data cycles.
    fn resolve(
        &mut self,
        graph: &mut NodeGraph,
        context: &mut C,
        id: NodeId,
        path: &mut HashSet<NodeId>,
        token: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        if !path.insert(id) {
            debug!("Data cycle through node {}, using current values", id);
            return Ok(());
        }

        for (input, connection) in data_inputs(graph, id, false)? {
            let upstream = connection.output_node;
            self.resolve(graph, context, upstream, path, token)?;
            let callable = graph
                .node(upstream)
                .ok_or(ExecutionError::NodeNotFound(upstream))?
                .callable;
            if !callable {
                self.execute_node(graph, context, upstream, token)?;
            }
            copy_value(graph, &connection, &input);
        }

        path.remove(&id);
        Ok(())
    }

    /// Runs the operation of a single node against its property bag
    fn execute_node(
        &mut self,
        graph: &mut NodeGraph,
        context: &mut C,
        id: NodeId,
        token: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        let node = graph.node_mut(id).ok_or(ExecutionError::NodeNotFound(id))?;
        node.feedback = Some(FeedbackType::Debug);

        let descriptor = node.descriptor.clone();
        let mut values = BTreeMap::new();
        for param in &descriptor.params {
            let raw = node.value(&param.name);
            let value = if param.is_output() && param.value_type.is_execution_path() {
                Value::Signal(false)
            } else {
                match convert(&raw, &param.value_type) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Node '{}' socket '{}': {}", node.name, param.name, e);
                        self.stats.recovered_conversions += 1;
                        raw
                    }
                }
            };
            values.insert(param.name.clone(), value);
        }

        let node_name = node.name.clone();
        let mut invocation = Invocation::new(id, values, node.runtime_types(), node.back_executed);
        debug!("Executing node '{}' ({})", node_name, descriptor.method_name);
        let result = self
            .registry
            .invoke(context, &descriptor.method_name, &node_name, &mut invocation);

        let (values, feedback) = invocation.into_parts();
        for item in feedback {
            if let Some(node) = graph.node_mut(id) {
                node.feedback = Some(item.severity);
            }
            self.dispatch_feedback(&item, token);
        }
        result?;

        let node = graph.node_mut(id).ok_or(ExecutionError::NodeNotFound(id))?;
        let bag = node.context_mut();
        for (name, value) in values {
            bag.set(&name, value);
        }
        self.stats.executed_nodes += 1;
        Ok(())
    }

    fn dispatch_feedback(&mut self, feedback: &Feedback, token: &CancellationToken) {
        match feedback.severity {
            FeedbackType::Debug => debug!("{}", feedback.message),
            FeedbackType::Info => info!("{}", feedback.message),
            FeedbackType::Warning => warn!("{}", feedback.message),
            FeedbackType::Error => error!("{}", feedback.message),
        }
        if let Some(listener) = self.listener.as_mut() {
            listener(feedback);
        }
        if feedback.should_break {
            info!("Abort requested by node {:?}", feedback.node);
            token.cancel();
        }
    }

    /// Copies loop feedback inputs of a flow node from their producers
    fn collect_loop_feedback(
        &mut self,
        graph: &mut NodeGraph,
        context: &mut C,
        id: NodeId,
        token: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        for (input, connection) in data_inputs(graph, id, true)? {
            let upstream = connection.output_node;
            let callable = graph
                .node(upstream)
                .ok_or(ExecutionError::NodeNotFound(upstream))?
                .callable;
            if !callable {
                self.resolve(graph, context, upstream, &mut HashSet::new(), token)?;
                self.execute_node(graph, context, upstream, token)?;
            }
            copy_value(graph, &connection, &input);
        }
        Ok(())
    }

    /// Executes the nodes named in `names` after executing everything upstream
    ///
    /// Unlike regular resolution, callable producers are executed too. Control
    /// flow is not followed.
    pub fn execute_resolving(
        &mut self,
        graph: &mut NodeGraph,
        context: &mut C,
        names: &[&str],
        token: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        for id in graph.nodes_named(names) {
            let mut visited = HashSet::from([id]);
            self.execute_upstream(graph, context, id, &mut visited, token)?;
            self.execute_node(graph, context, id, token)?;
        }
        Ok(())
    }

    fn execute_upstream(
        &mut self,
        graph: &mut NodeGraph,
        context: &mut C,
        id: NodeId,
        visited: &mut HashSet<NodeId>,
        token: &CancellationToken,
    ) -> Result<(), ExecutionError> {
        for (input, connection) in data_inputs(graph, id, false)? {
            let upstream = connection.output_node;
            if visited.insert(upstream) {
                self.execute_upstream(graph, context, upstream, visited, token)?;
                self.execute_node(graph, context, upstream, token)?;
            }
            copy_value(graph, &connection, &input);
        }
        Ok(())
    }
}

/// Whether `to` depends on `from` through data connections
pub fn has_impact(graph: &NodeGraph, from: NodeId, to: NodeId) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        for connection in graph.outgoing_connections(current) {
            if graph.is_execution_connection(&connection) {
                continue;
            }
            if connection.input_node == to {
                return true;
            }
            stack.push(connection.input_node);
        }
    }
    false
}

/// Connected inputs of a node, either regular or loop feedback ones
fn data_inputs(
    graph: &NodeGraph,
    id: NodeId,
    loop_feedback: bool,
) -> Result<Vec<(String, Connection)>, ExecutionError> {
    let node = graph.node(id).ok_or(ExecutionError::NodeNotFound(id))?;
    Ok(node
        .descriptor
        .inputs()
        .filter(|p| p.loop_feedback == loop_feedback)
        .filter_map(|p| {
            graph
                .incoming_connection(id, &p.name)
                .map(|c| (p.name.clone(), c.clone()))
        })
        .collect())
}

fn copy_value(graph: &mut NodeGraph, connection: &Connection, input: &str) {
    let value = graph
        .node(connection.output_node)
        .map(|n| n.value(&connection.output_socket))
        .unwrap_or(Value::Null);
    if let Some(node) = graph.node_mut(connection.input_node) {
        node.set_value(input, value);
    }
}

/// Handler view of a flow-control node during its execution
struct FlowScope<'a, C: NodesContext> {
    engine: &'a mut ExecutionEngine<C>,
    graph: &'a mut NodeGraph,
    context: &'a mut C,
    queue: &'a mut VecDeque<NodeId>,
    token: &'a CancellationToken,
    node: NodeId,
    depth: usize,
}

impl<C: NodesContext> FlowControlScope for FlowScope<'_, C> {
    fn node(&self) -> NodeId {
        self.node
    }

    fn node_name(&self) -> String {
        self.graph
            .node(self.node)
            .map(|n| n.name.clone())
            .unwrap_or_default()
    }

    fn context(&mut self) -> &mut dyn Any {
        &mut *self.context
    }

    fn value(&self, name: &str) -> Value {
        self.graph
            .node(self.node)
            .map(|n| n.value(name))
            .unwrap_or(Value::Null)
    }

    fn set_value(&mut self, name: &str, value: Value) {
        if let Some(node) = self.graph.node_mut(self.node) {
            node.set_value(name, value);
        }
    }

    fn output_type(&self, name: &str) -> ValueType {
        self.graph
            .node(self.node)
            .and_then(|n| n.runtime_type(name))
            .unwrap_or(ValueType::Any)
    }

    fn execute_output_path(&mut self, path: &str) -> Result<(), ExecutionError> {
        let target = self
            .graph
            .outgoing_connections(self.node)
            .into_iter()
            .find(|c| c.output_socket == path)
            .map(|c| c.input_node);
        let Some(target) = target else {
            debug!("Output path '{}' of node {} is not connected", path, self.node);
            return Ok(());
        };

        if path == sockets::EXIT {
            if let Some(node) = self.graph.node_mut(target) {
                node.back_executed = false;
            }
            self.queue.push_back(target);
            return Ok(());
        }

        self.engine
            .run(self.graph, self.context, target, self.token, self.depth + 1)?;
        self.engine
            .collect_loop_feedback(self.graph, self.context, self.node, self.token)
    }

    fn should_break(&self) -> bool {
        self.token.is_cancelled()
    }
}
