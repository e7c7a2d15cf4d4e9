//! Node instances and socket derivation

use super::data_type::ValueType;
use super::factory::{CustomEditorRef, NodeDescriptor, ParamDescriptor};
use super::feedback::FeedbackType;
use super::port::{Direction, Socket};
use super::property_context::PropertyContext;
use super::value::Value;
use crate::constants::{node as defaults, sockets};
use egui::{Color32, Pos2};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Handle of a node inside its graph
pub type NodeId = usize;

/// An operation placed in the graph
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Unique identifier persisted with the graph
    pub guid: String,
    pub descriptor: Arc<NodeDescriptor>,
    /// Opaque to the core; persisted only
    pub position: Pos2,
    pub name: String,
    pub order: i32,
    pub callable: bool,
    pub execution_initiator: bool,
    pub tag: i32,
    pub color: Color32,
    pub custom_editor: Option<CustomEditorRef>,
    pub custom_width: i32,
    pub custom_height: i32,
    /// Severity of the last feedback raised by this node
    pub feedback: Option<FeedbackType>,
    /// Set while the node is re-run from the execution history stack
    pub back_executed: bool,
    context: Option<PropertyContext>,
    type_overrides: BTreeMap<String, ValueType>,
}

impl Node {
    /// Creates a new node with a fresh unique id and an empty property bag
    pub fn new(id: NodeId, descriptor: Arc<NodeDescriptor>, position: Pos2) -> Self {
        let [r, g, b, a] = defaults::DEFAULT_COLOR;
        Self {
            id,
            guid: Uuid::new_v4().to_string(),
            position,
            name: descriptor.name.clone(),
            order: 0,
            callable: descriptor.callable,
            execution_initiator: descriptor.execution_initiator,
            tag: 0,
            color: Color32::from_rgba_unmultiplied(r, g, b, a),
            custom_editor: descriptor.custom_editor.clone(),
            custom_width: descriptor.width.unwrap_or(defaults::NO_CUSTOM_SIZE),
            custom_height: descriptor.height.unwrap_or(defaults::NO_CUSTOM_SIZE),
            feedback: None,
            back_executed: false,
            context: None,
            type_overrides: BTreeMap::new(),
            descriptor,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.descriptor.method_name
    }

    pub fn is_dynamic(&self) -> bool {
        self.descriptor.is_dynamic()
    }

    pub fn is_flow_control(&self) -> bool {
        self.descriptor.is_flow_control()
    }

    pub fn param(&self, name: &str) -> Option<&ParamDescriptor> {
        self.descriptor.param(name)
    }

    /// Property bag, if it has been created yet
    pub fn context(&self) -> Option<&PropertyContext> {
        self.context.as_ref()
    }

    /// Property bag, created with type-appropriate defaults on first access
    pub fn context_mut(&mut self) -> &mut PropertyContext {
        let descriptor = &self.descriptor;
        self.context.get_or_insert_with(|| PropertyContext::for_descriptor(descriptor))
    }

    /// Replaces the property bag wholesale
    pub fn set_context(&mut self, context: PropertyContext) {
        self.context = Some(context);
    }

    /// Current value of a socket, falling back to the declared default
    pub fn value(&self, name: &str) -> Value {
        if let Some(value) = self.context.as_ref().and_then(|c| c.get(name)) {
            return value.clone();
        }
        self.param(name)
            .map(|p| Value::default_for(&p.value_type))
            .unwrap_or(Value::Null)
    }

    pub fn set_value(&mut self, name: &str, value: Value) {
        self.context_mut().set(name, value);
    }

    /// Declared type of a socket, including the reserved execution sockets
    pub fn declared_type(&self, name: &str) -> Option<ValueType> {
        if let Some(param) = self.param(name) {
            return Some(param.value_type.clone());
        }
        if self.callable && (name == sockets::EXIT || (name == sockets::ENTER && !self.execution_initiator)) {
            return Some(ValueType::ExecutionPath);
        }
        None
    }

    /// Resolved type of a socket: the override if present, else the declared type
    pub fn runtime_type(&self, name: &str) -> Option<ValueType> {
        self.type_overrides
            .get(name)
            .cloned()
            .or_else(|| self.declared_type(name))
    }

    /// Resolved types of every parameter
    pub fn runtime_types(&self) -> BTreeMap<String, ValueType> {
        self.descriptor
            .params
            .iter()
            .map(|p| {
                let ty = self.type_overrides.get(&p.name).unwrap_or(&p.value_type);
                (p.name.clone(), ty.clone())
            })
            .collect()
    }

    pub fn type_overrides(&self) -> &BTreeMap<String, ValueType> {
        &self.type_overrides
    }

    /// Stores a runtime type; an override equal to the declared type is dropped
    ///
    /// Returns true when the resolved type changed.
    pub(crate) fn set_runtime_type(&mut self, name: &str, ty: ValueType) -> bool {
        let before = self.runtime_type(name);
        if self.declared_type(name).as_ref() == Some(&ty) {
            self.type_overrides.remove(name);
        } else {
            self.type_overrides.insert(name.to_string(), ty);
        }
        before != self.runtime_type(name)
    }

    pub(crate) fn clear_runtime_types(&mut self) -> bool {
        let changed = !self.type_overrides.is_empty();
        self.type_overrides.clear();
        changed
    }

    /// Computes the node's sockets from its descriptor and type overrides
    ///
    /// Callable nodes get the reserved `Enter` (unless they initiate execution)
    /// and `Exit` sockets ahead of their parameters.
    pub fn build_sockets(&self) -> Vec<Socket> {
        let mut result = Vec::with_capacity(self.descriptor.params.len() + 2);

        if self.callable {
            if !self.execution_initiator {
                result.push(Socket::main_execution(sockets::ENTER, Direction::Input));
            }
            let mut exit = Socket::main_execution(sockets::EXIT, Direction::Output);
            exit.value = Some(self.value(sockets::EXIT));
            result.push(exit);
        }

        for param in self.descriptor.inputs().chain(self.descriptor.outputs()) {
            let mut socket = Socket::new(param.name.clone(), param.direction, param.value_type.clone());
            if let Some(ty) = self.type_overrides.get(&param.name) {
                socket.runtime_type = ty.clone();
            }
            socket.loop_feedback = param.loop_feedback;
            socket.dynamic = param.dynamic.is_some();
            if param.is_output() {
                socket.value = Some(self.value(&param.name));
            }
            result.push(socket);
        }

        result
    }

    /// Color packed as ARGB, as persisted by both graph formats
    pub fn color_argb(&self) -> i32 {
        color_to_argb(self.color)
    }

    pub fn set_color_argb(&mut self, argb: i32) {
        self.color = color_from_argb(argb);
    }
}

/// Packs a color as a 32-bit ARGB integer
pub fn color_to_argb(color: Color32) -> i32 {
    let [r, g, b, a] = color.to_srgba_unmultiplied();
    i32::from_be_bytes([a, r, g, b])
}

/// Unpacks a 32-bit ARGB integer
pub fn color_from_argb(argb: i32) -> Color32 {
    let [a, r, g, b] = argb.to_be_bytes();
    Color32::from_rgba_unmultiplied(r, g, b, a)
}
