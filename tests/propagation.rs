//! Type propagation and graph editing through the editor API

use egui::Pos2;
use nodeflow::contexts::MathContext;
use nodeflow::{GraphError, NodeEditor, NodeId, SocketRef, ValueType};

fn add(editor: &mut NodeEditor<MathContext>, method: &str) -> NodeId {
    editor.add_node_by_method_name(method, Pos2::ZERO).unwrap()
}

fn runtime_type(editor: &NodeEditor<MathContext>, id: NodeId, socket: &str) -> ValueType {
    editor.node(id).unwrap().runtime_type(socket).unwrap()
}

#[test]
fn test_group_follows_connected_type_and_resets() {
    let mut editor = NodeEditor::new(MathContext::new());
    let text = add(&mut editor, "StringValue");
    let identity = add(&mut editor, "Identity");

    let connection = editor.connect_sockets(text, "outValue", identity, "value").unwrap();
    assert_eq!(runtime_type(&editor, identity, "value"), ValueType::Text);
    assert_eq!(runtime_type(&editor, identity, "result"), ValueType::Text);

    assert!(editor.disconnect(&connection));
    assert_eq!(runtime_type(&editor, identity, "result"), ValueType::Any);
}

#[test]
fn test_for_each_sockets_follow_collection() {
    let mut editor = NodeEditor::new(MathContext::new());
    let list = add(&mut editor, "StringListValue");
    let for_each = add(&mut editor, "ForEach");
    let upper = add(&mut editor, "ToUpper");

    editor.connect_sockets(list, "outValue", for_each, "inputCollection").unwrap();
    assert_eq!(runtime_type(&editor, for_each, "currentItemInLoop"), ValueType::Text);
    assert_eq!(runtime_type(&editor, for_each, "forEachResult"), ValueType::list(ValueType::Any));

    editor.connect_sockets(upper, "output", for_each, "loopResult").unwrap();
    assert_eq!(runtime_type(&editor, for_each, "forEachResult"), ValueType::list(ValueType::Text));
}

#[test]
fn test_wrap_then_extract_round_trips_type() {
    let mut editor = NodeEditor::new(MathContext::new());
    let number = add(&mut editor, "InputValue");
    let wrap = add(&mut editor, "Wrap");
    let first = add(&mut editor, "FirstItem");

    editor.connect_sockets(number, "outValue", wrap, "item").unwrap();
    editor.connect_sockets(wrap, "list", first, "items").unwrap();
    assert_eq!(runtime_type(&editor, wrap, "list"), ValueType::list(ValueType::Float));
    assert_eq!(runtime_type(&editor, first, "item"), ValueType::Float);
}

#[test]
fn test_retyped_output_drops_incompatible_edge() {
    let mut editor = NodeEditor::new(MathContext::new());
    let text = add(&mut editor, "StringValue");
    let number = add(&mut editor, "InputValue");
    let identity = add(&mut editor, "Identity");
    let upper = add(&mut editor, "ToUpper");

    let source = editor.connect_sockets(text, "outValue", identity, "value").unwrap();
    editor.connect_sockets(identity, "result", upper, "input").unwrap();
    assert_eq!(editor.graph().connections().len(), 2);

    // The generic output can no longer feed a text input
    editor.disconnect(&source);
    assert!(editor.graph().connections().is_empty());

    editor.connect_sockets(number, "outValue", identity, "value").unwrap();
    assert_eq!(runtime_type(&editor, identity, "result"), ValueType::Float);
    assert!(matches!(
        editor.connect_sockets(identity, "result", upper, "input"),
        Err(GraphError::TypeIncompatible { .. })
    ));
}

#[test]
fn test_connect_validates_sockets() {
    let mut editor = NodeEditor::new(MathContext::new());
    let text = add(&mut editor, "StringValue");
    let number = add(&mut editor, "InputValue");
    let upper = add(&mut editor, "ToUpper");

    assert!(matches!(
        editor.connect_sockets(number, "outValue", upper, "input"),
        Err(GraphError::TypeIncompatible { .. })
    ));
    assert!(matches!(
        editor.connect(&SocketRef::new(text, "inValue"), &SocketRef::new(upper, "input")),
        Err(GraphError::DirectionMismatch { .. })
    ));
    assert!(matches!(
        editor.connect_sockets(text, "missing", upper, "input"),
        Err(GraphError::SocketNotFound { .. })
    ));

    // Either order is accepted
    editor
        .connect(&SocketRef::new(upper, "input"), &SocketRef::new(text, "outValue"))
        .unwrap();
    assert_eq!(editor.graph().connections().len(), 1);
}

#[test]
fn test_remove_node_leaves_no_dangling_connections() {
    let mut editor = NodeEditor::new(MathContext::new());
    let text = add(&mut editor, "StringValue");
    let identity = add(&mut editor, "Identity");
    let upper = add(&mut editor, "ToUpper");
    editor.connect_sockets(text, "outValue", identity, "value").unwrap();
    editor.connect_sockets(identity, "result", upper, "input").unwrap();

    editor.remove_node(text).unwrap();
    assert!(editor.graph().connections().iter().all(|c| c.output_node != text && c.input_node != text));
    assert_eq!(runtime_type(&editor, identity, "result"), ValueType::Any);
    assert!(editor.remove_node(text).is_none());
}

#[test]
fn test_has_impact_follows_data_edges_only() {
    let mut editor = NodeEditor::new(MathContext::new());
    let starter = add(&mut editor, "Starter");
    let number = add(&mut editor, "InputValue");
    let sum = add(&mut editor, "Add");
    let product = add(&mut editor, "Multiply");
    editor.connect_sockets(number, "outValue", sum, "a").unwrap();
    editor.connect_sockets(sum, "result", product, "a").unwrap();
    editor.connect_sockets(starter, "Exit", product, "Enter").unwrap();

    assert!(editor.has_impact(number, product));
    assert!(!editor.has_impact(product, number));
    assert!(!editor.has_impact(starter, product));
}
