//! Graph persistence
//!
//! Two formats are supported: a compact little-endian binary stream with
//! length-prefixed forward-compatible trailers, and an indented JSON document
//! carrying free-form metadata. Both load into a fresh [`NodeGraph`], so a
//! failed load never touches the graph currently in use.
//!
//! [`NodeGraph`]: crate::nodes::NodeGraph

pub mod binary;
pub mod error;
pub mod json;

pub use binary::{read_binary, write_binary};
pub use error::{Result, SerializationError};
pub use json::{read_json, write_json, GraphMetadata, GraphModel};
