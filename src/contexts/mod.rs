//! Sample node contexts
//!
//! Each context type lists its operations through
//! [`NodesContext`](crate::nodes::NodesContext); the editor discovers them into
//! a registry of node kinds.

pub mod math;
pub mod parts;

pub use math::MathContext;
pub use parts::{Part, PartsContext};
