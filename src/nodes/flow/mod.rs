//! Built-in flow-control handlers

pub mod branch;
pub mod for_each;

pub use branch::BranchFlowControl;
pub use for_each::ForEachFlowControl;
