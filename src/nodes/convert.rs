//! Best-effort coercion of property values to declared parameter types

use super::data_type::ValueType;
use super::value::Value;
use thiserror::Error;

/// A value could not be coerced to the requested type
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {actual} value '{value}' to {target}")]
pub struct ConversionError {
    pub value: String,
    pub actual: ValueType,
    pub target: ValueType,
}

impl ConversionError {
    fn new(value: &Value, target: &ValueType) -> Self {
        Self {
            value: value.to_string(),
            actual: value.value_type(),
            target: target.clone(),
        }
    }
}

/// Converts a value to the given declared type
///
/// Numbers convert between each other and to/from booleans and text, enums
/// parse from their variant name (exact first, then case-insensitive) or an
/// index, and collections convert element-wise. A collection conversion fails
/// as a whole if any element fails. `Null` becomes the default instance of
/// the target type.
pub fn convert(value: &Value, target: &ValueType) -> Result<Value, ConversionError> {
    if *target == ValueType::Any {
        return Ok(value.clone());
    }
    if value.is_null() {
        return Ok(Value::default_for(target));
    }

    let failed = || ConversionError::new(value, target);

    match target {
        ValueType::Any => Ok(value.clone()),
        ValueType::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(i) => Ok(Value::Bool(*i != 0)),
            Value::Float(f) => Ok(Value::Bool(*f != 0.0)),
            Value::Text(s) => parse_bool(s).map(Value::Bool).ok_or_else(failed),
            _ => Err(failed()),
        },
        ValueType::Int => match value {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) if f.is_finite() => Ok(Value::Int(f.round() as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Text(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Ok(Value::Int(i));
                }
                match s.parse::<f64>() {
                    Ok(f) if f.is_finite() => Ok(Value::Int(f.round() as i64)),
                    _ => Err(failed()),
                }
            }
            _ => Err(failed()),
        },
        ValueType::Float => match value {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
            Value::Text(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| failed()),
            _ => Err(failed()),
        },
        ValueType::Text => match value {
            Value::Text(s) => Ok(Value::Text(s.clone())),
            Value::Signal(_) => Err(failed()),
            other => Ok(Value::Text(other.to_string())),
        },
        ValueType::ExecutionPath => match value {
            Value::Signal(s) => Ok(Value::Signal(*s)),
            _ => Err(failed()),
        },
        ValueType::Enum { name, variants } => match value {
            Value::Enum { type_name, variant } if type_name == name => {
                if variants.is_empty() || variants.contains(variant) {
                    Ok(value.clone())
                } else {
                    Err(failed())
                }
            }
            Value::Text(s) => parse_enum(name, variants, s).ok_or_else(failed),
            Value::Int(i) => usize::try_from(*i)
                .ok()
                .and_then(|index| variants.get(index))
                .map(|variant| Value::Enum { type_name: name.clone(), variant: variant.clone() })
                .ok_or_else(failed),
            _ => Err(failed()),
        },
        ValueType::List(element) => match value {
            Value::List { element: current, items } => {
                if **element == ValueType::Any || **element == *current {
                    return Ok(value.clone());
                }
                let converted = items
                    .iter()
                    .map(|item| convert(item, element))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| failed())?;
                Ok(Value::list((**element).clone(), converted))
            }
            _ => Err(failed()),
        },
        ValueType::Custom(name) => match value {
            Value::Blob { type_name, .. } if type_name == name => Ok(value.clone()),
            _ => Err(failed()),
        },
    }
}

/// Reads a branch condition: a boolean or boolean-like text
pub fn as_condition(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Text(s) => parse_bool(s),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_enum(name: &str, variants: &[String], text: &str) -> Option<Value> {
    let text = text.trim();
    let variant = variants
        .iter()
        .find(|v| v.as_str() == text)
        .or_else(|| variants.iter().find(|v| v.eq_ignore_ascii_case(text)))?;
    Some(Value::Enum { type_name: name.to_string(), variant: variant.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(convert(&Value::Int(3), &ValueType::Float), Ok(Value::Float(3.0)));
        assert_eq!(convert(&Value::Float(2.6), &ValueType::Int), Ok(Value::Int(3)));
        assert_eq!(convert(&Value::from(" 4.5 "), &ValueType::Float), Ok(Value::Float(4.5)));
        assert!(convert(&Value::from("four"), &ValueType::Float).is_err());
    }

    #[test]
    fn test_null_becomes_default() {
        assert_eq!(convert(&Value::Null, &ValueType::Float), Ok(Value::Float(0.0)));
        assert_eq!(
            convert(&Value::Null, &ValueType::list(ValueType::Text)),
            Ok(Value::list(ValueType::Text, vec![]))
        );
    }

    #[test]
    fn test_enum_parsing_from_text() {
        let unit = ValueType::enumeration("Unit", &["Piece", "Meter"]);
        let expected = Value::Enum { type_name: "Unit".to_string(), variant: "Meter".to_string() };
        assert_eq!(convert(&Value::from("Meter"), &unit), Ok(expected.clone()));
        assert_eq!(convert(&Value::from("meter"), &unit), Ok(expected.clone()));
        assert_eq!(convert(&Value::Int(1), &unit), Ok(expected));
        assert!(convert(&Value::from("Liter"), &unit).is_err());
    }

    #[test]
    fn test_collection_conversion_is_element_wise() {
        let texts = Value::texts(&["1", "2.5"]);
        assert_eq!(
            convert(&texts, &ValueType::list(ValueType::Float)),
            Ok(Value::floats(&[1.0, 2.5]))
        );

        let mixed = Value::texts(&["1", "x"]);
        assert!(convert(&mixed, &ValueType::list(ValueType::Float)).is_err());

        let floats = Value::floats(&[1.0]);
        assert_eq!(convert(&floats, &ValueType::list(ValueType::Any)), Ok(floats.clone()));
    }

    #[test]
    fn test_conditions() {
        assert_eq!(as_condition(&Value::Bool(true)), Some(true));
        assert_eq!(as_condition(&Value::from("False")), Some(false));
        assert_eq!(as_condition(&Value::from("maybe")), None);
        assert_eq!(as_condition(&Value::Float(1.0)), None);
    }
}
