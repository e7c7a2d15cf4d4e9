//! Iteration over a collection with an optional per-item result

use crate::constants::sockets;
use crate::nodes::convert::convert;
use crate::nodes::data_type::ValueType;
use crate::nodes::execution_engine::ExecutionError;
use crate::nodes::hooks::{FlowControlHandler, FlowControlScope};
use crate::nodes::value::Value;
use log::debug;

/// Runs the `forEachItemLoop` body once per item of `inputCollection`
///
/// Each iteration exposes the item on `currentItemInLoop` and clears
/// `loopResult`; whatever the body feeds back into `loopResult` (or the item
/// itself when nothing is fed back) is collected into `forEachResult`. A
/// missing collection behaves like an empty one. `Exit` always runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForEachFlowControl;

impl ForEachFlowControl {
    pub const INPUT_COLLECTION: &'static str = "inputCollection";
    pub const LOOP_RESULT: &'static str = "loopResult";
    pub const CURRENT_ITEM: &'static str = "currentItemInLoop";
    pub const ITEM_LOOP: &'static str = "forEachItemLoop";
    pub const RESULT: &'static str = "forEachResult";
}

impl FlowControlHandler for ForEachFlowControl {
    fn name(&self) -> &'static str {
        "ForEachFlowControl"
    }

    fn execute(&self, scope: &mut dyn FlowControlScope) -> Result<(), ExecutionError> {
        let items = match scope.value(Self::INPUT_COLLECTION) {
            Value::List { items, .. } => items,
            Value::Null => Vec::new(),
            other => {
                debug!("'{}' is not a collection, iterating nothing", other);
                Vec::new()
            }
        };

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            if scope.should_break() {
                debug!("Loop in node '{}' interrupted", scope.node_name());
                break;
            }
            scope.set_value(Self::CURRENT_ITEM, item.clone());
            scope.set_value(Self::LOOP_RESULT, Value::Null);
            scope.execute_output_path(Self::ITEM_LOOP)?;

            let result = scope.value(Self::LOOP_RESULT);
            results.push(if result.is_null() { item } else { result });
        }

        let element = scope.output_type(Self::RESULT).element_type();
        scope.set_value(Self::RESULT, collect(element, results));
        scope.execute_output_path(sockets::EXIT)
    }
}

/// Builds the result list, typed by `element` when every item converts to it
fn collect(element: ValueType, items: Vec<Value>) -> Value {
    if element != ValueType::Any {
        let converted: Result<Vec<Value>, _> = items.iter().map(|item| convert(item, &element)).collect();
        if let Ok(items) = converted {
            return Value::List { element, items };
        }
    }
    Value::List {
        element: ValueType::Any,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_prefers_typed_lists() {
        let typed = collect(ValueType::Float, vec![Value::Float(1.0), Value::Int(2)]);
        assert_eq!(typed, Value::floats(&[1.0, 2.0]));

        let mixed = collect(ValueType::Float, vec![Value::Float(1.0), Value::from("x")]);
        assert_eq!(
            mixed,
            Value::List {
                element: ValueType::Any,
                items: vec![Value::Float(1.0), Value::from("x")],
            }
        );
    }
}
