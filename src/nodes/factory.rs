//! Node registry built from an explicit registration table
//!
//! A context type lists its operations through [`NodesContext::methods`]. Each
//! annotated method becomes an immutable [`NodeDescriptor`] plus a type-erased
//! invocation thunk. Registries are built once per context type and cached.

use super::data_type::ValueType;
use super::execution_engine::ExecutionError;
use super::feedback::Feedback;
use super::hooks::FlowControlHandler;
use super::node::NodeId;
use super::port::Direction;
use super::value::Value;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Hierarchical category system for organizing nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodeCategory {
    path: Vec<String>,
}

impl NodeCategory {
    /// Create a new category from path components
    pub fn new(path: &[&str]) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Get the full path as a slice
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Get the category name (last component)
    pub fn name(&self) -> &str {
        self.path.last().map(|s| s.as_str()).unwrap_or("")
    }

    /// Check if this category is a child of another
    pub fn is_child_of(&self, other: &NodeCategory) -> bool {
        self.path.len() > other.path.len() && self.path[..other.path.len()] == other.path
    }

    /// Get display string for menus
    pub fn display_string(&self) -> String {
        self.path.join(" > ")
    }
}

/// Declared type transform of a dynamic parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicType {
    /// Label shared by parameters whose types must agree
    pub group: Option<String>,
    /// Parameter whose type this one mirrors
    pub derived_from: Option<String>,
    /// Take the element type of a collection
    pub extract_element: bool,
    /// Produce a collection of the resolved type
    pub wrap_in_collection: bool,
}

impl DynamicType {
    /// Parameter sharing its type with the other members of `group`
    pub fn group(group: &str) -> Self {
        Self {
            group: Some(group.to_string()),
            ..Self::default()
        }
    }

    /// Parameter mirroring the type of another parameter
    pub fn derived(from: &str) -> Self {
        Self {
            derived_from: Some(from.to_string()),
            ..Self::default()
        }
    }

    pub fn derived_from(mut self, from: &str) -> Self {
        self.derived_from = Some(from.to_string());
        self
    }

    pub fn extract_element(mut self) -> Self {
        self.extract_element = true;
        self
    }

    pub fn wrap_in_collection(mut self) -> Self {
        self.wrap_in_collection = true;
        self
    }

    /// Applies the element extraction or collection wrapping transform
    pub fn apply(&self, ty: ValueType) -> ValueType {
        if self.extract_element {
            ty.element_type()
        } else if self.wrap_in_collection {
            ty.wrapped()
        } else {
            ty
        }
    }
}

/// Marks a node as subject to type propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicNode {
    pub propagate_types: bool,
    pub auto_disconnect_incompatible: bool,
}

impl Default for DynamicNode {
    fn default() -> Self {
        Self {
            propagate_types: true,
            auto_disconnect_incompatible: true,
        }
    }
}

/// One parameter of a node operation
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub value_type: ValueType,
    pub direction: Direction,
    pub dynamic: Option<DynamicType>,
    /// Input filled from the loop body after each iteration rather than resolved
    pub loop_feedback: bool,
}

impl ParamDescriptor {
    pub fn input(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            direction: Direction::Input,
            dynamic: None,
            loop_feedback: false,
        }
    }

    pub fn output(name: &str, value_type: ValueType) -> Self {
        Self {
            direction: Direction::Output,
            ..Self::input(name, value_type)
        }
    }

    pub fn with_dynamic(mut self, dynamic: DynamicType) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    pub fn loop_feedback(mut self) -> Self {
        self.loop_feedback = true;
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == Direction::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }
}

/// Opaque reference to a host-side custom editor, persisted but never interpreted
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomEditorRef {
    pub assembly_name: String,
    pub type_name: String,
}

impl CustomEditorRef {
    pub fn new(assembly_name: &str, type_name: &str) -> Self {
        Self {
            assembly_name: assembly_name.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

/// Annotation turning a context method into a node kind
#[derive(Debug, Clone)]
pub struct NodeAttribute {
    pub name: String,
    pub category: NodeCategory,
    pub description: String,
    pub callable: bool,
    pub execution_initiator: bool,
    pub dynamic: Option<DynamicNode>,
    pub flow_control: Option<Arc<dyn FlowControlHandler>>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub custom_editor: Option<CustomEditorRef>,
}

impl NodeAttribute {
    pub fn new(name: &str, category: &[&str], description: &str) -> Self {
        Self {
            name: name.to_string(),
            category: NodeCategory::new(category),
            description: description.to_string(),
            callable: false,
            execution_initiator: false,
            dynamic: None,
            flow_control: None,
            width: None,
            height: None,
            custom_editor: None,
        }
    }

    /// Node participates in the execution-flow graph
    pub fn callable(mut self) -> Self {
        self.callable = true;
        self
    }

    /// Callable node without an incoming execution socket
    pub fn execution_initiator(mut self) -> Self {
        self.callable = true;
        self.execution_initiator = true;
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = Some(DynamicNode::default());
        self
    }

    pub fn with_dynamic(mut self, dynamic: DynamicNode) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    pub fn with_flow_control(mut self, handler: Arc<dyn FlowControlHandler>) -> Self {
        self.flow_control = Some(handler);
        self
    }

    pub fn with_width(mut self, width: i32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: i32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_custom_editor(mut self, editor: CustomEditorRef) -> Self {
        self.custom_editor = Some(editor);
        self
    }
}

/// Immutable description of a node kind
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub name: String,
    pub category: NodeCategory,
    pub description: String,
    /// Operation name, the key nodes are persisted under
    pub method_name: String,
    /// Parameters in declaration order
    pub params: Vec<ParamDescriptor>,
    pub callable: bool,
    pub execution_initiator: bool,
    pub dynamic: Option<DynamicNode>,
    pub flow_control: Option<Arc<dyn FlowControlHandler>>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub custom_editor: Option<CustomEditorRef>,
}

impl NodeDescriptor {
    pub fn new(method_name: &str, attribute: NodeAttribute, params: Vec<ParamDescriptor>) -> Self {
        Self {
            name: attribute.name,
            category: attribute.category,
            description: attribute.description,
            method_name: method_name.to_string(),
            params,
            callable: attribute.callable,
            execution_initiator: attribute.execution_initiator,
            dynamic: attribute.dynamic,
            flow_control: attribute.flow_control,
            width: attribute.width,
            height: attribute.height,
            custom_editor: attribute.custom_editor,
        }
    }

    /// Non-output parameters, in declaration order
    pub fn inputs(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.params.iter().filter(|p| p.is_input())
    }

    /// Output parameters, in declaration order
    pub fn outputs(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.params.iter().filter(|p| p.is_output())
    }

    pub fn param(&self, name: &str) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic.map(|d| d.propagate_types).unwrap_or(false)
    }

    pub fn auto_disconnect_incompatible(&self) -> bool {
        self.dynamic.map(|d| d.auto_disconnect_incompatible).unwrap_or(false)
    }

    pub fn is_flow_control(&self) -> bool {
        self.flow_control.is_some()
    }
}

/// Arguments and output slots of a single operation call
#[derive(Debug, Clone)]
pub struct Invocation {
    node: NodeId,
    values: BTreeMap<String, Value>,
    types: BTreeMap<String, ValueType>,
    back_executed: bool,
    feedback: Vec<Feedback>,
}

static NULL: Value = Value::Null;

impl Invocation {
    pub fn new(
        node: NodeId,
        values: BTreeMap<String, Value>,
        types: BTreeMap<String, ValueType>,
        back_executed: bool,
    ) -> Self {
        Self {
            node,
            values,
            types,
            back_executed,
            feedback: Vec::new(),
        }
    }

    /// Node currently being executed
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Whether this run is a back execution popped from the history stack
    pub fn is_back_executed(&self) -> bool {
        self.back_executed
    }

    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn float(&self, name: &str) -> f64 {
        self.get(name).as_float().unwrap_or(0.0)
    }

    pub fn int(&self, name: &str) -> i64 {
        self.get(name).as_int().unwrap_or(0)
    }

    pub fn bool(&self, name: &str) -> bool {
        self.get(name).as_bool().unwrap_or(false)
    }

    /// Text view of a value; `Null` reads as an empty string
    pub fn text(&self, name: &str) -> String {
        match self.get(name) {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn list(&self, name: &str) -> Vec<Value> {
        self.get(name).as_list().map(|items| items.to_vec()).unwrap_or_default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Signals the named execution path output
    pub fn signal(&mut self, name: &str) {
        self.values.insert(name.to_string(), Value::Signal(true));
    }

    /// Resolved runtime type of a parameter
    pub fn runtime_type(&self, name: &str) -> ValueType {
        self.types.get(name).cloned().unwrap_or(ValueType::Any)
    }

    /// Raises a feedback message for the current node
    pub fn raise(&mut self, mut feedback: Feedback) {
        feedback.node = Some(self.node);
        self.feedback.push(feedback);
    }

    pub fn into_parts(self) -> (BTreeMap<String, Value>, Vec<Feedback>) {
        (self.values, self.feedback)
    }
}

/// Type-erased call of a context operation
pub type NodeThunk<C> = Arc<dyn Fn(&mut C, &mut Invocation) -> Result<(), String> + Send + Sync>;

/// A method on the context's capability surface
pub struct MethodInfo<C> {
    pub name: String,
    pub attribute: Option<NodeAttribute>,
    pub params: Vec<ParamDescriptor>,
    pub thunk: NodeThunk<C>,
}

impl<C> MethodInfo<C> {
    pub fn new<F>(name: &str, thunk: F) -> Self
    where
        F: Fn(&mut C, &mut Invocation) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            attribute: None,
            params: Vec::new(),
            thunk: Arc::new(thunk),
        }
    }

    /// Annotates the method as a node
    pub fn node(mut self, attribute: NodeAttribute) -> Self {
        self.attribute = Some(attribute);
        self
    }

    pub fn input(self, name: &str, value_type: ValueType) -> Self {
        self.param(ParamDescriptor::input(name, value_type))
    }

    pub fn output(self, name: &str, value_type: ValueType) -> Self {
        self.param(ParamDescriptor::output(name, value_type))
    }

    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }
}

/// A user-supplied context whose methods become node kinds
pub trait NodesContext: Any {
    /// Lists every method the context exposes, annotated or not
    fn methods() -> Vec<MethodInfo<Self>>
    where
        Self: Sized;
}

struct RegistryEntry<C> {
    descriptor: Arc<NodeDescriptor>,
    thunk: NodeThunk<C>,
}

/// Registry of node kinds discovered from one context type
pub struct NodeRegistry<C> {
    entries: BTreeMap<String, RegistryEntry<C>>,
    order: Vec<String>,
    categories: HashMap<NodeCategory, Vec<String>>,
}

static REGISTRIES: Lazy<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

impl<C: NodesContext> NodeRegistry<C> {
    /// Returns the cached registry for `C`, building it on first use
    pub fn discover() -> Arc<Self> {
        let mut cache = REGISTRIES.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = cache.get(&TypeId::of::<C>()) {
            if let Ok(registry) = Arc::clone(existing).downcast::<Self>() {
                return registry;
            }
        }

        let registry = Arc::new(Self::build());
        cache.insert(TypeId::of::<C>(), registry.clone());
        registry
    }

    /// Builds a registry from the context's method table
    pub fn build() -> Self {
        let mut registry = Self {
            entries: BTreeMap::new(),
            order: Vec::new(),
            categories: HashMap::new(),
        };

        for method in C::methods() {
            let Some(attribute) = method.attribute else {
                debug!("Skipping method '{}' without node attribute", method.name);
                continue;
            };
            if registry.entries.contains_key(&method.name) {
                warn!("Duplicate node method '{}' ignored", method.name);
                continue;
            }

            let descriptor = NodeDescriptor::new(&method.name, attribute, method.params);
            registry
                .categories
                .entry(descriptor.category.clone())
                .or_default()
                .push(method.name.clone());
            registry.order.push(method.name.clone());
            registry.entries.insert(
                method.name,
                RegistryEntry {
                    descriptor: Arc::new(descriptor),
                    thunk: method.thunk,
                },
            );
        }

        info!(
            "Discovered {} node kinds in {}",
            registry.order.len(),
            std::any::type_name::<C>()
        );
        registry
    }

    /// All descriptors in declaration order
    pub fn descriptors(&self) -> Vec<Arc<NodeDescriptor>> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Looks up a descriptor by operation name
    pub fn get(&self, method_name: &str) -> Option<Arc<NodeDescriptor>> {
        self.entries.get(method_name).map(|entry| entry.descriptor.clone())
    }

    /// Looks up a descriptor by display name
    pub fn get_by_name(&self, name: &str) -> Option<Arc<NodeDescriptor>> {
        self.order
            .iter()
            .filter_map(|method| self.entries.get(method))
            .find(|entry| entry.descriptor.name == name)
            .map(|entry| entry.descriptor.clone())
    }

    /// Get nodes in a specific category
    pub fn nodes_in_category(&self, category: &NodeCategory) -> Vec<Arc<NodeDescriptor>> {
        self.categories
            .get(category)
            .map(|methods| methods.iter().filter_map(|m| self.get(m)).collect())
            .unwrap_or_default()
    }

    /// Get all categories
    pub fn categories(&self) -> Vec<&NodeCategory> {
        self.categories.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Calls the operation registered under `method_name`
    pub fn invoke(
        &self,
        context: &mut C,
        method_name: &str,
        node_name: &str,
        invocation: &mut Invocation,
    ) -> Result<(), ExecutionError> {
        let entry = self
            .entries
            .get(method_name)
            .ok_or_else(|| ExecutionError::UnknownOperation(method_name.to_string()))?;

        (entry.thunk)(context, invocation).map_err(|message| ExecutionError::OperationFailed {
            node: node_name.to_string(),
            operation: method_name.to_string(),
            message,
        })
    }
}

/// Discovers the node kinds of a context type
pub fn discover<C: NodesContext>() -> Vec<Arc<NodeDescriptor>> {
    NodeRegistry::<C>::discover().descriptors()
}

/// Discovers the node kinds of a context instance
pub fn discover_context<C: NodesContext>(_context: &C) -> Vec<Arc<NodeDescriptor>> {
    discover::<C>()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample;

    impl NodesContext for Sample {
        fn methods() -> Vec<MethodInfo<Self>> {
            vec![
                MethodInfo::new("Echo", |_: &mut Sample, inv| {
                    let value = inv.get("input").clone();
                    inv.set("output", value);
                    Ok(())
                })
                .node(NodeAttribute::new("Echo", &["Helper", "Basic"], "Echoes its input").callable())
                .input("input", ValueType::Any)
                .output("output", ValueType::Any),
                MethodInfo::new("Helper", |_: &mut Sample, _| Ok(())),
                MethodInfo::new("Start", |_: &mut Sample, _| Ok(()))
                    .node(NodeAttribute::new("Start", &["Helper", "Basic"], "Starts").execution_initiator()),
            ]
        }
    }

    #[test]
    fn test_unannotated_methods_are_excluded() {
        let registry = NodeRegistry::<Sample>::build();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("Helper").is_none());

        let names: Vec<String> = registry.descriptors().iter().map(|d| d.method_name.clone()).collect();
        assert_eq!(names, vec!["Echo".to_string(), "Start".to_string()]);
    }

    #[test]
    fn test_parameters_keep_declaration_order() {
        let registry = NodeRegistry::<Sample>::build();
        let echo = registry.get("Echo").unwrap();
        assert_eq!(echo.inputs().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["input"]);
        assert_eq!(echo.outputs().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["output"]);
        assert!(echo.callable);
        assert!(!echo.execution_initiator);

        let start = registry.get_by_name("Start").unwrap();
        assert!(start.callable && start.execution_initiator);
    }

    #[test]
    fn test_discovery_is_cached_per_context_type() {
        let first = NodeRegistry::<Sample>::discover();
        let second = NodeRegistry::<Sample>::discover();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(discover_context(&Sample).len(), 2);
    }

    #[test]
    fn test_invoke_marshals_values() {
        let registry = NodeRegistry::<Sample>::build();
        let mut values = BTreeMap::new();
        values.insert("input".to_string(), Value::Float(2.5));
        let mut invocation = Invocation::new(0, values, BTreeMap::new(), false);

        registry.invoke(&mut Sample, "Echo", "Echo", &mut invocation).unwrap();
        assert_eq!(invocation.get("output"), &Value::Float(2.5));

        let missing = registry.invoke(&mut Sample, "Nope", "Nope", &mut invocation);
        assert!(matches!(missing, Err(ExecutionError::UnknownOperation(_))));
    }

    #[test]
    fn test_dynamic_type_transforms() {
        let floats = ValueType::list(ValueType::Float);
        assert_eq!(DynamicType::group("T").extract_element().apply(floats.clone()), ValueType::Float);
        assert_eq!(DynamicType::group("T").wrap_in_collection().apply(ValueType::Float), floats);
        assert_eq!(DynamicType::group("T").apply(ValueType::Text), ValueType::Text);
    }

    #[test]
    fn test_lookup_by_category_and_layout_hints() {
        let registry = NodeRegistry::<Sample>::build();
        let basic = registry.nodes_in_category(&NodeCategory::new(&["Helper", "Basic"]));
        assert_eq!(basic.len(), 2);
        assert!(registry.nodes_in_category(&NodeCategory::new(&["Other"])).is_empty());

        let attribute = NodeAttribute::new("Panel", &["Helper"], "Custom drawn")
            .with_height(80)
            .with_custom_editor(CustomEditorRef::new("Editors", "PanelEditor"));
        let descriptor = NodeDescriptor::new("Panel", attribute, Vec::new());
        assert_eq!(descriptor.height, Some(80));
        assert_eq!(descriptor.custom_editor.unwrap().type_name, "PanelEditor");
    }

    #[test]
    fn test_category_paths() {
        let category = NodeCategory::new(&["Operators", "Basic"]);
        assert_eq!(category.name(), "Basic");
        assert_eq!(category.display_string(), "Operators > Basic");
        assert!(category.is_child_of(&NodeCategory::new(&["Operators"])));
    }
}
