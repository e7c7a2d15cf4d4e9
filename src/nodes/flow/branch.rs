//! If/else branching on a boolean condition

use crate::constants::sockets;
use crate::nodes::convert::as_condition;
use crate::nodes::execution_engine::ExecutionError;
use crate::nodes::hooks::{FlowControlHandler, FlowControlScope};
use crate::nodes::value::Value;

/// Runs exactly one of `ifTrue` / `ifFalse`, then continues with `Exit`
///
/// The condition accepts booleans and the texts "true"/"false" (any case);
/// anything else fails with [`ExecutionError::ConditionInvalid`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BranchFlowControl;

impl BranchFlowControl {
    pub const CONDITION: &'static str = "condition";
    pub const IF_TRUE: &'static str = "ifTrue";
    pub const IF_FALSE: &'static str = "ifFalse";
}

impl FlowControlHandler for BranchFlowControl {
    fn name(&self) -> &'static str {
        "BranchFlowControl"
    }

    fn execute(&self, scope: &mut dyn FlowControlScope) -> Result<(), ExecutionError> {
        if scope.should_break() {
            return Ok(());
        }

        let condition = scope.value(Self::CONDITION);
        let taken = as_condition(&condition).ok_or_else(|| ExecutionError::ConditionInvalid {
            node: scope.node_name(),
            received: describe(&condition),
        })?;

        scope.execute_output_path(if taken { Self::IF_TRUE } else { Self::IF_FALSE })?;
        scope.execute_output_path(sockets::EXIT)
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => format!("{} '{}'", other.value_type(), other),
    }
}
