//! Bill-of-materials sample: parts travel between nodes as opaque blobs

use crate::nodes::data_type::ValueType;
use crate::nodes::factory::{DynamicType, Invocation, MethodInfo, NodeAttribute, NodesContext, ParamDescriptor};
use crate::nodes::value::Value;
use serde::{Deserialize, Serialize};

pub const PART_TYPE: &str = "Part";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub sku: String,
    pub description: String,
    pub package: String,
    pub quantity: f64,
    pub unit_of_measure: String,
}

impl Part {
    pub fn to_value(&self) -> Result<Value, String> {
        let bytes = bincode::serialize(self).map_err(|e| e.to_string())?;
        Ok(Value::Blob {
            type_name: PART_TYPE.to_string(),
            bytes,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Blob { type_name, bytes } if type_name == PART_TYPE => {
                bincode::deserialize(bytes).map_err(|e| e.to_string())
            }
            other => Err(format!("expected a part, got {}", other.value_type())),
        }
    }
}

/// Context collecting the parts lists computed by "Parts List" nodes
#[derive(Debug, Default)]
pub struct PartsContext {
    pub totals: Vec<f64>,
}

fn part_type() -> ValueType {
    ValueType::Custom(PART_TYPE.to_string())
}

fn create_part(_: &mut PartsContext, inv: &mut Invocation) -> Result<(), String> {
    let part = Part {
        sku: inv.text("sku"),
        description: inv.text("description"),
        package: inv.text("package"),
        quantity: inv.float("quantity"),
        unit_of_measure: inv.text("unitOfMeasure"),
    };
    inv.set("part", part.to_value()?);
    Ok(())
}

fn parts_list(ctx: &mut PartsContext, inv: &mut Invocation) -> Result<(), String> {
    let mut total = 0.0;
    for item in inv.list("parts") {
        total += Part::from_value(&item)?.quantity;
    }
    ctx.totals.push(total);
    inv.set("totalQuantity", total);
    Ok(())
}

impl NodesContext for PartsContext {
    fn methods() -> Vec<MethodInfo<Self>> {
        vec![
            MethodInfo::new("CreatePart", create_part)
                .node(NodeAttribute::new("Create Part", &["Parts", "Basic"], "Create a part").callable())
                .input("sku", ValueType::Text)
                .input("description", ValueType::Text)
                .input("package", ValueType::Text)
                .input("quantity", ValueType::Float)
                .input("unitOfMeasure", ValueType::Text)
                .output("part", part_type()),
            MethodInfo::new("PartsList", parts_list)
                .node(NodeAttribute::new("Parts List", &["Parts", "Basic"], "Sums a list of parts").callable())
                .input("parts", ValueType::list(part_type()))
                .output("totalQuantity", ValueType::Float),
            MethodInfo::new("ToListNode", |_: &mut PartsContext, inv| {
                let item = inv.get("a").clone();
                let element = inv.runtime_type("list").element_type();
                inv.set("list", Value::list(element, vec![item]));
                Ok(())
            })
            .node(NodeAttribute::new("To List", &["Operators", "List"], "Wraps a value into a list.").dynamic())
            .param(ParamDescriptor::input("a", ValueType::Any).with_dynamic(DynamicType::group("T")))
            .param(
                ParamDescriptor::output("list", ValueType::list(ValueType::Any))
                    .with_dynamic(DynamicType::group("T").wrap_in_collection()),
            ),
            MethodInfo::new("Starter", |_: &mut PartsContext, _| Ok(()))
                .node(NodeAttribute::new("Starter", &["Helper", "Basic"], "Starts execution").execution_initiator()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_blob_roundtrip() {
        let part = Part {
            sku: "P-100".to_string(),
            description: "Bolt".to_string(),
            package: "Box".to_string(),
            quantity: 12.0,
            unit_of_measure: "pcs".to_string(),
        };
        let value = part.to_value().unwrap();
        assert_eq!(value.value_type(), part_type());
        assert_eq!(Part::from_value(&value).unwrap(), part);
        assert!(Part::from_value(&Value::Float(1.0)).is_err());
    }
}
