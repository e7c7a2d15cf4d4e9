//! Per-node property bag

use super::factory::NodeDescriptor;
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from socket name to the current value of that socket
///
/// Inputs hold the value last resolved from upstream (or entered by the
/// user), outputs hold the value last produced by the node's operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyContext {
    values: BTreeMap<String, Value>,
}

impl PropertyContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bag holding the default instance of every parameter
    pub fn for_descriptor(descriptor: &NodeDescriptor) -> Self {
        let values = descriptor
            .params
            .iter()
            .map(|param| (param.name.clone(), Value::default_for(&param.value_type)))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for PropertyContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}
