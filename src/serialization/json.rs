//! JSON graph format
//!
//! Values are stored as natural JSON next to their declared and actual type
//! names; the actual type is what allows a `List<Float>` behind an `Any`
//! socket to come back as a list of floats rather than untyped numbers.

use super::error::{Result, SerializationError};
use crate::constants::json::VERSION;
use crate::nodes::data_type::ValueType;
use crate::nodes::factory::{CustomEditorRef, NodeRegistry, NodesContext};
use crate::nodes::graph::{Connection, NodeGraph};
use crate::nodes::node::Node;
use crate::nodes::property_context::PropertyContext;
use crate::nodes::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use egui::Pos2;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Whole-document model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphModel {
    pub version: i32,
    #[serde(default)]
    pub nodes: Vec<NodeModel>,
    #[serde(default)]
    pub connections: Vec<ConnectionModel>,
    #[serde(default)]
    pub metadata: GraphMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeModel {
    pub guid: Option<String>,
    pub x: f32,
    pub y: f32,
    pub callable: bool,
    pub exec_init: bool,
    pub name: String,
    pub order: i32,
    pub custom_width: i32,
    pub custom_height: i32,
    pub int32_tag: i32,
    pub node_color: i32,
    pub method_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_editor: Option<CustomEditorModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_control_handler: Option<String>,
    pub context: BTreeMap<String, PropertyModel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEditorModel {
    pub assembly_name: String,
    pub type_name: String,
}

/// One property bag entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyModel {
    pub value: Json,
    #[serde(alias = "type")]
    pub declared_type_name: String,
    #[serde(alias = "actualType", default, skip_serializing_if = "Option::is_none")]
    pub actual_type_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionModel {
    pub output_node_id: String,
    pub output_socket_name: String,
    pub input_node_id: String,
    pub input_socket_name: String,
}

/// Free-form document metadata, carried but never interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphMetadata {
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub description: String,
    pub author: String,
    pub tags: Vec<String>,
}

impl Default for GraphMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            modified_at: now,
            description: String::new(),
            author: String::new(),
            tags: Vec::new(),
        }
    }
}

impl GraphMetadata {
    pub fn new(author: &str) -> Self {
        Self {
            author: author.to_string(),
            ..Self::default()
        }
    }

    /// Stamps the modification time
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

/// Builds the document model of a graph
pub fn to_model(graph: &NodeGraph, metadata: &GraphMetadata) -> GraphModel {
    let nodes = graph.nodes().map(node_model).collect();
    let connections = graph
        .connections()
        .iter()
        .filter_map(|c| {
            Some(ConnectionModel {
                output_node_id: graph.node(c.output_node)?.guid.clone(),
                output_socket_name: c.output_socket.clone(),
                input_node_id: graph.node(c.input_node)?.guid.clone(),
                input_socket_name: c.input_socket.clone(),
            })
        })
        .collect();

    GraphModel {
        version: VERSION,
        nodes,
        connections,
        metadata: metadata.clone(),
    }
}

fn node_model(node: &Node) -> NodeModel {
    let context = node
        .context()
        .map(|bag| {
            bag.iter()
                .map(|(name, value)| {
                    let declared = node
                        .declared_type(name)
                        .map(|ty| ty.to_string())
                        .unwrap_or_else(|| ValueType::Any.to_string());
                    let actual = (!value.is_null()).then(|| value.value_type().to_string());
                    let entry = PropertyModel {
                        value: value_to_json(value),
                        declared_type_name: declared,
                        actual_type_name: actual,
                    };
                    (name.clone(), entry)
                })
                .collect()
        })
        .unwrap_or_default();

    NodeModel {
        guid: Some(node.guid.clone()),
        x: node.position.x,
        y: node.position.y,
        callable: node.callable,
        exec_init: node.execution_initiator,
        name: node.name.clone(),
        order: node.order,
        custom_width: node.custom_width,
        custom_height: node.custom_height,
        int32_tag: node.tag,
        node_color: node.color_argb(),
        method_name: Some(node.method_name().to_string()),
        custom_editor: node.custom_editor.as_ref().map(|e| CustomEditorModel {
            assembly_name: e.assembly_name.clone(),
            type_name: e.type_name.clone(),
        }),
        flow_control_handler: node.descriptor.flow_control.as_ref().map(|h| h.name().to_string()),
        context,
    }
}

/// Serializes a graph to a JSON document
pub fn write_json(graph: &NodeGraph, metadata: &GraphMetadata, pretty: bool) -> Result<String> {
    let model = to_model(graph, metadata);
    let text = if pretty {
        serde_json::to_string_pretty(&model)?
    } else {
        serde_json::to_string(&model)?
    };
    Ok(text)
}

/// Parses a JSON document, resolving operations against `registry`
///
/// Connections whose endpoints are missing are dropped. Runtime types are
/// not restored; the caller re-runs propagation.
pub fn read_json<C: NodesContext>(text: &str, registry: &NodeRegistry<C>) -> Result<(NodeGraph, GraphMetadata)> {
    let model: GraphModel = serde_json::from_str(text)?;
    if model.version > VERSION {
        return Err(SerializationError::FormatMismatch(format!(
            "JSON version {} is newer than supported version {}",
            model.version, VERSION
        )));
    }

    let mut graph = NodeGraph::new();
    for node_model in model.nodes {
        let node = node_from_model(node_model, registry)?;
        graph.insert_node(node);
    }

    for c in model.connections {
        match (graph.find_by_guid(&c.output_node_id), graph.find_by_guid(&c.input_node_id)) {
            (Some(output), Some(input)) => {
                graph.attach(Connection::new(output, c.output_socket_name, input, c.input_socket_name));
            }
            _ => warn!(
                "Dropping connection {} -> {}: endpoint missing",
                c.output_node_id, c.input_node_id
            ),
        }
    }

    debug!(
        "Read JSON graph v{}: {} nodes, {} connections",
        model.version,
        graph.len(),
        graph.connections().len()
    );
    Ok((graph, model.metadata))
}

fn node_from_model<C: NodesContext>(model: NodeModel, registry: &NodeRegistry<C>) -> Result<Node> {
    let method = model.method_name.unwrap_or_default();
    let descriptor = registry
        .get(&method)
        .ok_or_else(|| SerializationError::UnknownOperation(method.clone()))?;
    if let Some(handler) = &model.flow_control_handler {
        if descriptor.flow_control.as_ref().map(|h| h.name()) != Some(handler.as_str()) {
            warn!("Node '{}' was saved with handler '{}', using the registered one", model.name, handler);
        }
    }

    let mut node = Node::new(0, descriptor, Pos2::new(model.x, model.y));
    node.guid = model.guid.unwrap_or_else(|| Uuid::new_v4().to_string());
    node.callable = model.callable;
    node.execution_initiator = model.exec_init;
    node.name = model.name;
    node.order = model.order;
    if model.custom_width != 0 {
        node.custom_width = model.custom_width;
    }
    if model.custom_height != 0 {
        node.custom_height = model.custom_height;
    }
    node.tag = model.int32_tag;
    node.set_color_argb(model.node_color);
    node.custom_editor = model
        .custom_editor
        .filter(|e| !e.assembly_name.is_empty() && !e.type_name.is_empty())
        .map(|e| CustomEditorRef::new(&e.assembly_name, &e.type_name));

    let mut bag = PropertyContext::new();
    for (name, entry) in model.context {
        let ty = entry
            .actual_type_name
            .as_deref()
            .and_then(|actual| actual.parse::<ValueType>().ok())
            .map_or_else(|| entry.declared_type_name.parse::<ValueType>(), Ok)?;
        bag.set(name, value_from_json(&entry.value, &ty)?);
    }
    node.set_context(bag);
    Ok(node)
}

/// Natural JSON form of a value
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) | Value::Signal(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => float_to_json(*f),
        Value::Text(s) => Json::String(s.clone()),
        Value::Enum { variant, .. } => Json::String(variant.clone()),
        Value::List { items, .. } => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Blob { bytes, .. } => Json::String(STANDARD.encode(bytes)),
    }
}

/// Rebuilds a value of type `ty` from its natural JSON form
///
/// Data that does not fit `ty` is read back as if the type were `Any`.
pub fn value_from_json(json: &Json, ty: &ValueType) -> Result<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }

    let value = match (ty, json) {
        (ValueType::Bool, Json::Bool(b)) => Value::Bool(*b),
        (ValueType::ExecutionPath, Json::Bool(b)) => Value::Signal(*b),
        (ValueType::Int, Json::Number(n)) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Int(n.as_f64().unwrap_or(0.0).round() as i64),
        },
        (ValueType::Float, Json::Number(n)) => Value::Float(n.as_f64().unwrap_or(0.0)),
        (ValueType::Float, Json::String(s)) => match non_finite(s) {
            Some(f) => Value::Float(f),
            None => Value::Text(s.clone()),
        },
        (ValueType::Text, Json::String(s)) => Value::Text(s.clone()),
        (ValueType::Enum { name, .. }, Json::String(s)) => Value::Enum {
            type_name: name.clone(),
            variant: s.clone(),
        },
        (ValueType::Custom(name), Json::String(s)) => Value::Blob {
            type_name: name.clone(),
            bytes: STANDARD.decode(s)?,
        },
        (ValueType::List(element), Json::Array(items)) => Value::List {
            element: (**element).clone(),
            items: items
                .iter()
                .map(|item| value_from_json(item, element))
                .collect::<Result<Vec<_>>>()?,
        },
        (_, other) => infer(other),
    };
    Ok(value)
}

/// JSON numbers cannot hold infinities or NaN; those are written as strings
fn float_to_json(f: f64) -> Json {
    match serde_json::Number::from_f64(f) {
        Some(n) => Json::Number(n),
        None if f.is_nan() => Json::String("NaN".to_string()),
        None if f > 0.0 => Json::String("Infinity".to_string()),
        None => Json::String("-Infinity".to_string()),
    }
}

fn non_finite(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn infer(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(0.0)),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::List {
            element: ValueType::Any,
            items: items.iter().map(infer).collect(),
        },
        Json::Object(_) => Value::Text(json.to_string()),
    }
}
