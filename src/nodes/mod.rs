//! Node system - Core data structures, type propagation and execution

// Value model
pub mod convert;
pub mod data_type;
pub mod value;

// Core node system modules
pub mod cache;
pub mod factory;
pub mod graph;
pub mod node;
pub mod port;
pub mod property_context;
pub mod propagation;

// Execution
pub mod execution_engine;
pub mod feedback;
pub mod flow;
pub mod hooks;

// Re-export core types
pub use data_type::{are_compatible, ValueType};
pub use graph::{Connection, GraphError, NodeGraph};
pub use node::{Node, NodeId};
pub use port::{Direction, Socket, SocketRef};
pub use property_context::PropertyContext;
pub use value::Value;

// Re-export factory types
pub use factory::{
    discover, discover_context, CustomEditorRef, DynamicNode, DynamicType, Invocation, MethodInfo,
    NodeAttribute, NodeCategory, NodeDescriptor, NodeRegistry, NodesContext, ParamDescriptor,
};

// Re-export execution engine types
pub use execution_engine::{has_impact, ExecutionEngine, ExecutionError, ExecutionStats};
pub use feedback::{CancellationToken, Feedback, FeedbackListener, FeedbackType};
pub use flow::{BranchFlowControl, ForEachFlowControl};
pub use hooks::{FlowControlHandler, FlowControlScope};
