//! Nodeflow core library
//!
//! Dataflow node graphs whose nodes wrap operations registered by a context
//! type. Sockets are typed, generic sockets are resolved by type propagation,
//! and execution follows explicit control-flow connections with pluggable
//! branch and loop nodes.

pub mod config;
pub mod constants;
pub mod contexts;
pub mod editor;
pub mod nodes;
pub mod serialization;

// Re-export commonly used types
pub use config::EditorConfig;
pub use editor::{FileManager, GraphFormat, NodeEditor};
pub use nodes::{
    CancellationToken, Connection, ExecutionError, Feedback, FeedbackType, GraphError, Node, NodeGraph, NodeId,
    NodesContext, SocketRef, Value, ValueType,
};
pub use serialization::{GraphMetadata, SerializationError};
