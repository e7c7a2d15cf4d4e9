//! Graph-wide constants and default values
//!
//! Centralized location for format identifiers and reserved socket names

/// Reserved socket names shared by the data model and the execution engine
pub mod sockets {
    /// Incoming execution socket of callable nodes
    pub const ENTER: &str = "Enter";

    /// Outgoing (main) execution socket of callable nodes
    pub const EXIT: &str = "Exit";
}

/// Binary graph format
pub mod binary {
    /// Recognition string written at the start of every binary graph
    pub const MAGIC: &str = "NodeSystemP";

    /// Current binary format version
    pub const VERSION: i32 = 1000;

    /// Size of the per-node trailer written by this version (tag + packed color)
    pub const NODE_TRAILER_LEN: i32 = 8;
}

/// Structured (JSON) graph format
pub mod json {
    /// Current JSON format version
    pub const VERSION: i32 = 1001;
}

/// Node defaults
pub mod node {
    /// Default node color (light cyan), RGBA
    pub const DEFAULT_COLOR: [u8; 4] = [224, 255, 255, 255];

    /// Sentinel for "no custom size"
    pub const NO_CUSTOM_SIZE: i32 = -1;
}
