//! Flow-control hooks
//!
//! Nodes whose descriptor carries a [`FlowControlHandler`] replace the default
//! "follow the signaled execution path" rule with their own logic. The engine
//! runs the node's operation first (to initialise its outputs) and then hands
//! control to the handler through a [`FlowControlScope`].

use super::data_type::ValueType;
use super::execution_engine::ExecutionError;
use super::node::NodeId;
use super::value::Value;
use std::any::Any;
use std::fmt::Debug;

/// What a flow-control handler can see and do while it runs
pub trait FlowControlScope {
    /// Node being executed
    fn node(&self) -> NodeId;

    /// Display name of the node being executed
    fn node_name(&self) -> String;

    /// Shared user context the operations run against
    fn context(&mut self) -> &mut dyn Any;

    /// Current value of one of the node's sockets (`Null` if unset)
    fn value(&self, name: &str) -> Value;

    /// Stores a value into the node's property bag
    fn set_value(&mut self, name: &str, value: Value);

    /// Resolved runtime type of one of the node's sockets
    fn output_type(&self, name: &str) -> ValueType;

    /// Executes the named output path
    ///
    /// The main `Exit` path is queued as the continuation; any other path is
    /// executed synchronously before this call returns, after which loop
    /// feedback inputs hold the values produced by the body.
    fn execute_output_path(&mut self, path: &str) -> Result<(), ExecutionError>;

    /// Whether an abort has been requested
    fn should_break(&self) -> bool;
}

/// Pluggable logic overriding sequential execution for branching/looping nodes
pub trait FlowControlHandler: Debug + Send + Sync {
    /// Stable name persisted alongside nodes using this handler
    fn name(&self) -> &'static str;

    fn execute(&self, scope: &mut dyn FlowControlScope) -> Result<(), ExecutionError>;
}
