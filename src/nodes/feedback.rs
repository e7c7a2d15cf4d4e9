//! Node feedback channel and cooperative cancellation

use super::node::NodeId;
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Severity of a feedback message, also kept on the node for highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackType {
    Debug,
    Info,
    Warning,
    Error,
}

/// Message raised by a node operation
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub message: String,
    /// Node that raised it; filled in by the engine
    pub node: Option<NodeId>,
    pub severity: FeedbackType,
    pub tag: Option<Value>,
    /// Requests that the running execution be aborted
    pub should_break: bool,
}

impl Feedback {
    pub fn new(message: impl Into<String>, severity: FeedbackType) -> Self {
        Self {
            message: message.into(),
            node: None,
            severity,
            tag: None,
            should_break: false,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, FeedbackType::Info)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, FeedbackType::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, FeedbackType::Error)
    }

    pub fn with_tag(mut self, tag: Value) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Marks this feedback as an abort request
    pub fn breaking(mut self) -> Self {
        self.should_break = true;
        self
    }
}

/// Callback receiving every feedback raised during execution
pub type FeedbackListener = Box<dyn FnMut(&Feedback)>;

/// Shared abort flag checked once per dequeued node
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let remote = token.clone();
        assert!(!token.is_cancelled());

        remote.cancel();
        assert!(token.is_cancelled());

        token.reset();
        assert!(!remote.is_cancelled());
    }

    #[test]
    fn test_feedback_builder() {
        let feedback = Feedback::warning("value out of range").with_tag(Value::Int(7)).breaking();
        assert_eq!(feedback.severity, FeedbackType::Warning);
        assert_eq!(feedback.tag, Some(Value::Int(7)));
        assert!(feedback.should_break);
        assert!(feedback.node.is_none());
    }
}
