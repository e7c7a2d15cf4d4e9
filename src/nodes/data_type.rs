//! Socket data types and the connection compatibility rule

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Types that can flow through sockets
///
/// The set is closed: dynamic typing only ever produces one of these, either
/// by copying an upstream type, extracting the element of a `List`, or
/// wrapping a type into a `List`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Universal type, accepts every data value
    Any,
    /// Boolean
    Bool,
    /// Signed integer
    Int,
    /// Floating point number
    Float,
    /// Text string
    Text,
    /// Control-flow marker; never carries data
    ExecutionPath,
    /// Named enumeration parsed from text by variant name
    Enum { name: String, variants: Vec<String> },
    /// Uniform ordered collection
    List(Box<ValueType>),
    /// Opaque host type, only compatible with itself (and `Any`)
    Custom(String),
}

impl ValueType {
    /// Convenience constructor for `List<element>`
    pub fn list(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    /// Convenience constructor for an enumeration type
    pub fn enumeration(name: &str, variants: &[&str]) -> Self {
        ValueType::Enum {
            name: name.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, ValueType::List(_))
    }

    pub fn is_execution_path(&self) -> bool {
        matches!(self, ValueType::ExecutionPath)
    }

    /// Generic sockets accept anything and are the ones type propagation refines
    pub fn is_generic(&self) -> bool {
        match self {
            ValueType::Any => true,
            ValueType::List(element) => **element == ValueType::Any,
            _ => false,
        }
    }

    /// Element type of a collection, `Any` for everything else
    pub fn element_type(&self) -> ValueType {
        match self {
            ValueType::List(element) => (**element).clone(),
            _ => ValueType::Any,
        }
    }

    /// Wraps this type into a uniform collection
    pub fn wrapped(&self) -> ValueType {
        ValueType::list(self.clone())
    }

    /// Checks whether a value of type `self` may flow into a socket of type `target`
    pub fn can_connect_to(&self, target: &ValueType) -> bool {
        are_compatible(self, target)
    }
}

/// Connection compatibility rule
///
/// True when the types are identical, when `target` is assignable from
/// `source` (`Any` accepts every data type), or when both are collections
/// whose element types are compatible by this same rule. A target element
/// type of `Any` accepts any collection. Enumerations match by name, since
/// values only carry the variant they hold.
pub fn are_compatible(source: &ValueType, target: &ValueType) -> bool {
    if source == target {
        return true;
    }

    match (source, target) {
        (ValueType::ExecutionPath, _) | (_, ValueType::ExecutionPath) => false,
        (_, ValueType::Any) => true,
        (ValueType::Enum { name: source_name, .. }, ValueType::Enum { name: target_name, .. }) => {
            source_name == target_name
        }
        (ValueType::List(source_element), ValueType::List(target_element)) => {
            **target_element == ValueType::Any || are_compatible(source_element, target_element)
        }
        _ => false,
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "Any"),
            ValueType::Bool => write!(f, "Bool"),
            ValueType::Int => write!(f, "Int"),
            ValueType::Float => write!(f, "Float"),
            ValueType::Text => write!(f, "Text"),
            ValueType::ExecutionPath => write!(f, "ExecutionPath"),
            ValueType::Enum { name, variants } => write!(f, "Enum<{}:{}>", name, variants.join("|")),
            ValueType::List(element) => write!(f, "List<{}>", element),
            ValueType::Custom(name) => write!(f, "Custom<{}>", name),
        }
    }
}

/// Error returned when a type name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type name: {0}")]
pub struct ParseTypeError(pub String);

impl FromStr for ValueType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "Any" => return Ok(ValueType::Any),
            "Bool" => return Ok(ValueType::Bool),
            "Int" => return Ok(ValueType::Int),
            "Float" => return Ok(ValueType::Float),
            "Text" => return Ok(ValueType::Text),
            "ExecutionPath" => return Ok(ValueType::ExecutionPath),
            _ => {}
        }

        let invalid = || ParseTypeError(s.to_string());
        let (head, rest) = s.split_once('<').ok_or_else(invalid)?;
        let inner = rest.strip_suffix('>').ok_or_else(invalid)?;

        match head {
            "List" => Ok(ValueType::list(inner.parse()?)),
            "Custom" if !inner.is_empty() => Ok(ValueType::Custom(inner.to_string())),
            "Enum" => {
                let (name, variants) = inner.split_once(':').ok_or_else(invalid)?;
                let variants = if variants.is_empty() {
                    Vec::new()
                } else {
                    variants.split('|').map(str::to_string).collect()
                };
                Ok(ValueType::Enum { name: name.to_string(), variants })
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_types_are_compatible() {
        for ty in [ValueType::Float, ValueType::Text, ValueType::ExecutionPath, ValueType::list(ValueType::Int)] {
            assert!(are_compatible(&ty, &ty));
        }
    }

    #[test]
    fn test_any_accepts_data_but_not_execution() {
        assert!(are_compatible(&ValueType::Float, &ValueType::Any));
        assert!(are_compatible(&ValueType::list(ValueType::Text), &ValueType::Any));
        assert!(!are_compatible(&ValueType::ExecutionPath, &ValueType::Any));
        assert!(!are_compatible(&ValueType::Any, &ValueType::Float));
    }

    #[test]
    fn test_collection_compatibility() {
        let floats = ValueType::list(ValueType::Float);
        let anys = ValueType::list(ValueType::Any);
        let texts = ValueType::list(ValueType::Text);
        let nested = ValueType::list(ValueType::list(ValueType::Float));

        assert!(are_compatible(&floats, &anys));
        assert!(!are_compatible(&floats, &texts));
        assert!(!are_compatible(&anys, &floats));
        assert!(are_compatible(&nested, &ValueType::list(ValueType::list(ValueType::Any))));
    }

    #[test]
    fn test_element_and_wrap() {
        let floats = ValueType::list(ValueType::Float);
        assert_eq!(floats.element_type(), ValueType::Float);
        assert_eq!(ValueType::Text.element_type(), ValueType::Any);
        assert_eq!(ValueType::Int.wrapped(), ValueType::list(ValueType::Int));
        assert!(ValueType::list(ValueType::Any).is_generic());
        assert!(!floats.is_generic());
    }

    #[test]
    fn test_type_names_parse_back() {
        let types = [
            ValueType::Any,
            ValueType::ExecutionPath,
            ValueType::list(ValueType::list(ValueType::Float)),
            ValueType::Custom("Part".to_string()),
            ValueType::enumeration("Unit", &["Piece", "Meter"]),
        ];
        for ty in types {
            let parsed: ValueType = ty.to_string().parse().unwrap();
            assert_eq!(parsed, ty);
        }
        assert!("List<Float".parse::<ValueType>().is_err());
        assert!("Widget".parse::<ValueType>().is_err());
    }
}
