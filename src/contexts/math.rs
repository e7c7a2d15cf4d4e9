//! Math, string and loop operations for the sample editor

use crate::nodes::data_type::ValueType;
use crate::nodes::factory::{DynamicType, MethodInfo, NodeAttribute, NodesContext, ParamDescriptor};
use crate::nodes::feedback::Feedback;
use crate::nodes::flow::{BranchFlowControl, ForEachFlowControl};
use crate::nodes::value::Value;
use std::sync::Arc;

/// Context of the sample graph; "Show Value" nodes append what they show
#[derive(Debug, Default)]
pub struct MathContext {
    pub shown: Vec<String>,
}

impl MathContext {
    pub fn new() -> Self {
        Self::default()
    }
}

fn float_operator(name: &str, method: &str, description: &str, callable: bool, op: fn(f64, f64) -> f64) -> MethodInfo<MathContext> {
    let mut attribute = NodeAttribute::new(name, &["Operators", "Basic"], description);
    if callable {
        attribute = attribute.callable();
    }
    MethodInfo::new(method, move |_: &mut MathContext, inv| {
        let result = op(inv.float("a"), inv.float("b"));
        inv.set("result", result);
        Ok(())
    })
    .node(attribute)
    .input("a", ValueType::Float)
    .input("b", ValueType::Float)
    .output("result", ValueType::Float)
}

pub fn rounding_mode() -> ValueType {
    ValueType::enumeration("RoundingMode", &["Nearest", "Down", "Up", "TowardZero"])
}

/// Node producing its input unchanged
fn passthrough(name: &str, method: &str, ty: ValueType) -> MethodInfo<MathContext> {
    MethodInfo::new(method, |_: &mut MathContext, inv| {
        let value = inv.get("inValue").clone();
        inv.set("outValue", value);
        Ok(())
    })
    .node(NodeAttribute::new(name, &["Input", "Basic"], "Allows to output a simple value."))
    .input("inValue", ty.clone())
    .output("outValue", ty)
}

impl NodesContext for MathContext {
    fn methods() -> Vec<MethodInfo<Self>> {
        vec![
            passthrough("String Value", "StringValue", ValueType::Text),
            passthrough("String List Value", "StringListValue", ValueType::list(ValueType::Text)),
            passthrough("Number List Value", "NumberListValue", ValueType::list(ValueType::Float)),
            passthrough("Value", "InputValue", ValueType::Float),
            MethodInfo::new("ForEach", |_: &mut MathContext, inv| {
                inv.set("currentItemInLoop", Value::Null);
                inv.set("forEachResult", Value::Null);
                Ok(())
            })
            .node(
                NodeAttribute::new(
                    "For Each",
                    &["Loops", "Functional"],
                    "Transforms each item in a collection and returns the results.",
                )
                .callable()
                .dynamic()
                .with_width(250)
                .with_flow_control(Arc::new(ForEachFlowControl)),
            )
            .param(
                ParamDescriptor::input("inputCollection", ValueType::list(ValueType::Any))
                    .with_dynamic(DynamicType::group("InputType")),
            )
            .param(
                ParamDescriptor::input("loopResult", ValueType::Any)
                    .loop_feedback()
                    .with_dynamic(DynamicType::group("OutputType")),
            )
            .param(
                ParamDescriptor::output("currentItemInLoop", ValueType::Any).with_dynamic(
                    DynamicType::group("InputType")
                        .derived_from("inputCollection")
                        .extract_element(),
                ),
            )
            .output("forEachItemLoop", ValueType::ExecutionPath)
            .param(
                ParamDescriptor::output("forEachResult", ValueType::list(ValueType::Any))
                    .with_dynamic(DynamicType::group("OutputType").wrap_in_collection()),
            ),
            MethodInfo::new("Round", |_: &mut MathContext, inv| {
                let value = inv.float("value");
                let rounded = match inv.get("mode") {
                    Value::Enum { variant, .. } => match variant.as_str() {
                        "Down" => value.floor(),
                        "Up" => value.ceil(),
                        "TowardZero" => value.trunc(),
                        _ => value.round(),
                    },
                    other => return Err(format!("invalid rounding mode '{}'", other)),
                };
                inv.set("result", rounded);
                Ok(())
            })
            .node(NodeAttribute::new("Round", &["Operators", "Basic"], "Rounds a number using the selected mode."))
            .input("value", ValueType::Float)
            .input("mode", rounding_mode())
            .output("result", ValueType::Float),
            MethodInfo::new("IfElse", |_: &mut MathContext, _| Ok(()))
                .node(
                    NodeAttribute::new("If Else", &["Flow", "Basic"], "Runs one of two paths depending on a condition.")
                        .callable()
                        .with_flow_control(Arc::new(BranchFlowControl)),
                )
                .input("condition", ValueType::Any)
                .output("ifTrue", ValueType::ExecutionPath)
                .output("ifFalse", ValueType::ExecutionPath),
            float_operator("Add", "Add", "Adds two input values.", false, |a, b| a + b),
            float_operator("Subtract", "Subtract", "Substracts two input values.", true, |a, b| a - b),
            float_operator("Multiply", "Multiply", "Multiplies two input values.", true, |a, b| a * b),
            float_operator("Divide", "Divide", "Divides two input values.", true, |a, b| a / b),
            MethodInfo::new("ShowValue", |ctx: &mut MathContext, inv| {
                let shown = inv.get("x").to_string();
                inv.raise(Feedback::info(shown.clone()));
                ctx.shown.push(shown);
                Ok(())
            })
            .node(NodeAttribute::new("Show Value", &["Helper", "Basic"], "Shows input value.").callable())
            .input("x", ValueType::Any),
            MethodInfo::new("ToUpper", |_: &mut MathContext, inv| {
                let output = inv.text("input").to_uppercase();
                inv.set("output", output);
                Ok(())
            })
            .node(NodeAttribute::new("To Upper", &["Operators", "String"], "Converts a string to uppercase.").callable())
            .input("input", ValueType::Text)
            .output("output", ValueType::Text),
            MethodInfo::new("Concatenate", |_: &mut MathContext, inv| {
                let result = inv.text("a") + &inv.text("b");
                inv.set("result", result);
                Ok(())
            })
            .node(NodeAttribute::new("Concatenate", &["Operators", "String"], "Concatenates two strings.").callable())
            .input("a", ValueType::Text)
            .input("b", ValueType::Text)
            .output("result", ValueType::Text),
            MethodInfo::new("ToStringNode", |_: &mut MathContext, inv| {
                let result = match inv.get("a") {
                    Value::Null => Value::Null,
                    other => Value::Text(other.to_string()),
                };
                inv.set("result", result);
                Ok(())
            })
            .node(NodeAttribute::new("To String", &["Operators", "String"], "Converts to a string.").callable())
            .input("a", ValueType::Any)
            .output("result", ValueType::Text),
            MethodInfo::new("Sequence", |_: &mut MathContext, inv| {
                let step = if inv.is_back_executed() { inv.int("step") + 1 } else { 1 };
                inv.set("step", step);
                match step {
                    1 => inv.signal("first"),
                    2 => inv.signal("then"),
                    _ => {}
                }
                Ok(())
            })
            .node(
                NodeAttribute::new("Sequence", &["Flow", "Basic"], "Runs 'first', then 'then', then continues.")
                    .callable(),
            )
            .output("first", ValueType::ExecutionPath)
            .output("then", ValueType::ExecutionPath)
            .output("step", ValueType::Int),
            MethodInfo::new("Abort", |_: &mut MathContext, inv| {
                inv.raise(Feedback::warning("Execution aborted").breaking());
                Ok(())
            })
            .node(NodeAttribute::new("Abort", &["Flow", "Basic"], "Stops the running execution.").callable()),
            MethodInfo::new("Identity", |_: &mut MathContext, inv| {
                let value = inv.get("value").clone();
                inv.set("result", value);
                Ok(())
            })
            .node(NodeAttribute::new("Identity", &["Generic"], "Passes any value through.").dynamic())
            .param(ParamDescriptor::input("value", ValueType::Any).with_dynamic(DynamicType::group("T")))
            .param(ParamDescriptor::output("result", ValueType::Any).with_dynamic(DynamicType::group("T"))),
            MethodInfo::new("FirstItem", |_: &mut MathContext, inv| {
                let first = inv.list("items").into_iter().next().unwrap_or(Value::Null);
                inv.set("item", first);
                Ok(())
            })
            .node(NodeAttribute::new("First Item", &["Generic"], "First element of a collection.").dynamic())
            .param(ParamDescriptor::input("items", ValueType::list(ValueType::Any)).with_dynamic(DynamicType::group("T")))
            .param(
                ParamDescriptor::output("item", ValueType::Any)
                    .with_dynamic(DynamicType::group("T").derived_from("items").extract_element()),
            ),
            MethodInfo::new("Wrap", |_: &mut MathContext, inv| {
                let item = inv.get("item").clone();
                let element = inv.runtime_type("list").element_type();
                inv.set("list", Value::list(element, vec![item]));
                Ok(())
            })
            .node(NodeAttribute::new("Wrap", &["Generic"], "Wraps a value into a one-element collection.").dynamic())
            .param(ParamDescriptor::input("item", ValueType::Any).with_dynamic(DynamicType::group("T")))
            .param(
                ParamDescriptor::output("list", ValueType::list(ValueType::Any))
                    .with_dynamic(DynamicType::group("T").wrap_in_collection()),
            ),
            MethodInfo::new("Starter", |_: &mut MathContext, _| Ok(()))
                .node(NodeAttribute::new("Starter", &["Helper", "Basic"], "Starts execution").execution_initiator()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::factory::NodeRegistry;

    #[test]
    fn test_sample_context_registration() {
        let registry = NodeRegistry::<MathContext>::build();
        assert!(!registry.get("Add").unwrap().callable);
        assert!(registry.get("Multiply").unwrap().callable);
        assert!(registry.get("Starter").unwrap().execution_initiator);

        let for_each = registry.get_by_name("For Each").unwrap();
        assert!(for_each.is_flow_control());
        assert!(for_each.is_dynamic());
        assert_eq!(for_each.width, Some(250));
        assert!(for_each.param("loopResult").unwrap().loop_feedback);
    }
}
