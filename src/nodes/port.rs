//! Socket types derived from node descriptors

use super::data_type::ValueType;
use super::node::NodeId;
use super::value::Value;
use serde::{Deserialize, Serialize};

/// Direction of a socket (input or output)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Addresses a socket on a node in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketRef {
    pub node: NodeId,
    pub name: String,
}

impl SocketRef {
    pub fn new(node: NodeId, name: impl Into<String>) -> Self {
        Self { node, name: name.into() }
    }
}

/// A connection point on a node
///
/// Sockets are never stored on their own; they are computed from the node's
/// descriptor and its runtime type overrides, and cached by the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Socket {
    pub name: String,
    pub direction: Direction,
    /// Type declared by the operation
    pub declared_type: ValueType,
    /// Override if present, else the declared type
    pub runtime_type: ValueType,
    /// True for execution path sockets (reserved Enter/Exit and path outputs)
    pub is_execution_path: bool,
    /// True for the reserved Enter/Exit sockets of callable nodes
    pub is_main_execution: bool,
    /// Input whose value is copied back after a loop body runs
    pub loop_feedback: bool,
    /// Socket carries a dynamic type transform
    pub dynamic: bool,
    /// Current value snapshot (outputs only)
    pub value: Option<Value>,
}

impl Socket {
    /// Creates a socket whose runtime type equals its declared type
    pub fn new(name: impl Into<String>, direction: Direction, declared_type: ValueType) -> Self {
        let is_execution_path = declared_type.is_execution_path();
        Self {
            name: name.into(),
            direction,
            runtime_type: declared_type.clone(),
            declared_type,
            is_execution_path,
            is_main_execution: false,
            loop_feedback: false,
            dynamic: false,
            value: None,
        }
    }

    /// Creates one of the reserved Enter/Exit sockets
    pub fn main_execution(name: &str, direction: Direction) -> Self {
        let mut socket = Self::new(name, direction, ValueType::ExecutionPath);
        socket.is_main_execution = true;
        socket
    }

    pub fn is_input(&self) -> bool {
        matches!(self.direction, Direction::Input)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.direction, Direction::Output)
    }

    /// Whether the socket currently accepts or produces a generic type
    pub fn is_generic(&self) -> bool {
        self.runtime_type.is_generic()
    }
}
