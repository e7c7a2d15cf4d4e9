//! Binary graph format
//!
//! Layout (integers and floats little-endian, strings prefixed with their UTF-8
//! byte length as a 7-bit varint):
//!
//! ```text
//! magic "NodeSystemP" | version i32 | node count i32
//! per node:  guid | x f32 | y f32 | callable u8 | initiator u8 | name | order i32
//!            | editor assembly | editor type | operation
//!            | bag length i32 | bag bytes | trailer length i32 | tag i32 | color i32
//! connection count i32
//! per connection: output guid | output socket | input guid | input socket | trailer length i32
//! graph trailer length i32
//! ```
//!
//! The property bag is an entry count followed by `key | length i32 | value`
//! records, each value encoded with bincode. Trailers longer than this version
//! understands are skipped by length.

use super::error::{Result, SerializationError};
use crate::constants::binary::{MAGIC, NODE_TRAILER_LEN, VERSION};
use crate::nodes::factory::{CustomEditorRef, NodeRegistry, NodesContext};
use crate::nodes::graph::{Connection, NodeGraph};
use crate::nodes::node::Node;
use crate::nodes::property_context::PropertyContext;
use crate::nodes::value::Value;
use bytes::{Buf, BufMut, BytesMut};
use egui::Pos2;
use log::{debug, warn};

/// Serializes a graph to the binary format
pub fn write_binary(graph: &NodeGraph) -> Result<Vec<u8>> {
    let mut w = Writer::default();
    w.string(MAGIC);
    w.i32(VERSION);
    w.len(graph.len())?;

    for node in graph.nodes() {
        write_node(&mut w, node)?;
    }

    w.len(graph.connections().len())?;
    for connection in graph.connections() {
        let (Some(output), Some(input)) = (graph.node(connection.output_node), graph.node(connection.input_node)) else {
            continue;
        };
        w.string(&output.guid);
        w.string(&connection.output_socket);
        w.string(&input.guid);
        w.string(&connection.input_socket);
        w.i32(0);
    }
    w.i32(0);

    debug!("Wrote binary graph: {} bytes", w.buf.len());
    Ok(w.buf.to_vec())
}

fn write_node(w: &mut Writer, node: &Node) -> Result<()> {
    w.string(&node.guid);
    w.f32(node.position.x);
    w.f32(node.position.y);
    w.bool(node.callable);
    w.bool(node.execution_initiator);
    w.string(&node.name);
    w.i32(node.order);
    match &node.custom_editor {
        Some(editor) => {
            w.string(&editor.assembly_name);
            w.string(&editor.type_name);
        }
        None => {
            w.string("");
            w.string("");
        }
    }
    w.string(node.method_name());

    let bag = encode_bag(node.context())?;
    w.len(bag.len())?;
    w.buf.put_slice(&bag);

    w.i32(NODE_TRAILER_LEN);
    w.i32(node.tag);
    w.i32(node.color_argb());
    Ok(())
}

fn encode_bag(bag: Option<&PropertyContext>) -> Result<Vec<u8>> {
    let mut w = Writer::default();
    let Some(bag) = bag else {
        w.i32(0);
        return Ok(w.buf.to_vec());
    };

    w.len(bag.len())?;
    for (key, value) in bag.iter() {
        let encoded = bincode::serialize(value)?;
        w.string(key);
        w.len(encoded.len())?;
        w.buf.put_slice(&encoded);
    }
    Ok(w.buf.to_vec())
}

/// Parses a binary graph, resolving operations against `registry`
///
/// Nothing is returned unless the whole stream parses; runtime types are not
/// part of the format and must be recomputed by the caller.
pub fn read_binary<C: NodesContext>(data: &[u8], registry: &NodeRegistry<C>) -> Result<NodeGraph> {
    let mut r = Reader::new(data);
    let magic = r
        .string("magic")
        .map_err(|_| SerializationError::FormatMismatch("missing recognition string".to_string()))?;
    if magic != MAGIC {
        return Err(SerializationError::FormatMismatch(format!("unknown recognition string '{}'", magic)));
    }
    let version = r.i32("version")?;
    if version > VERSION {
        return Err(SerializationError::FormatMismatch(format!(
            "binary version {} is newer than supported version {}",
            version, VERSION
        )));
    }

    let mut graph = NodeGraph::new();
    let node_count = r.len("node count")?;
    for _ in 0..node_count {
        let node = read_node(&mut r, registry)?;
        graph.insert_node(node);
    }

    let connection_count = r.len("connection count")?;
    for _ in 0..connection_count {
        let output_guid = r.string("connection output node")?;
        let output_socket = r.string("connection output socket")?;
        let input_guid = r.string("connection input node")?;
        let input_socket = r.string("connection input socket")?;
        let trailer = r.len("connection trailer")?;
        r.bytes(trailer, "connection trailer")?;

        match (graph.find_by_guid(&output_guid), graph.find_by_guid(&input_guid)) {
            (Some(output), Some(input)) => {
                graph.attach(Connection::new(output, output_socket, input, input_socket));
            }
            _ => warn!(
                "Dropping connection {}.{} -> {}.{}: endpoint missing",
                output_guid, output_socket, input_guid, input_socket
            ),
        }
    }

    let trailer = r.len("graph trailer")?;
    r.bytes(trailer, "graph trailer")?;

    debug!(
        "Read binary graph v{}: {} nodes, {} connections",
        version,
        graph.len(),
        graph.connections().len()
    );
    Ok(graph)
}

fn read_node<C: NodesContext>(r: &mut Reader<'_>, registry: &NodeRegistry<C>) -> Result<Node> {
    let guid = r.string("node id")?;
    let x = r.f32("node position")?;
    let y = r.f32("node position")?;
    let callable = r.bool("callable flag")?;
    let execution_initiator = r.bool("initiator flag")?;
    let name = r.string("node name")?;
    let order = r.i32("node order")?;
    let editor_assembly = r.string("custom editor")?;
    let editor_type = r.string("custom editor")?;
    let method = r.string("operation name")?;

    let descriptor = registry
        .get(&method)
        .ok_or_else(|| SerializationError::UnknownOperation(method.clone()))?;
    let mut node = Node::new(0, descriptor, Pos2::new(x, y));
    node.guid = guid;
    node.callable = callable;
    node.execution_initiator = execution_initiator;
    node.name = name;
    node.order = order;
    if !editor_type.is_empty() {
        node.custom_editor = Some(CustomEditorRef::new(&editor_assembly, &editor_type));
    }

    let bag_len = r.len("property bag")?;
    let bag = r.bytes(bag_len, "property bag")?;
    node.set_context(decode_bag(bag)?);

    let trailer = r.len("node trailer")?;
    let mut consumed = 0;
    if trailer >= 4 {
        node.tag = r.i32("node tag")?;
        consumed = 4;
    }
    if trailer >= 8 {
        node.set_color_argb(r.i32("node color")?);
        consumed = 8;
    }
    r.bytes(trailer - consumed, "node trailer")?;

    Ok(node)
}

fn decode_bag(data: &[u8]) -> Result<PropertyContext> {
    let mut r = Reader::new(data);
    let count = r.len("property count")?;
    let mut bag = PropertyContext::new();
    for _ in 0..count {
        let key = r.string("property name")?;
        let len = r.len("property value")?;
        let bytes = r.bytes(len, "property value")?;
        let value: Value = bincode::deserialize(bytes)?;
        bag.set(key, value);
    }
    Ok(bag)
}

#[derive(Default)]
struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn string(&mut self, s: &str) {
        let mut len = s.len();
        while len >= 0x80 {
            self.buf.put_u8((len & 0x7f) as u8 | 0x80);
            len >>= 7;
        }
        self.buf.put_u8(len as u8);
        self.buf.put_slice(s.as_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    fn len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len)
            .map_err(|_| SerializationError::FormatMismatch(format!("length {} does not fit the format", len)))?;
        self.i32(len);
        Ok(())
    }

    fn f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    fn bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }
}

/// Bounds-checked reader; every short read is an [`SerializationError::UnexpectedEof`]
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn ensure(&self, n: usize, what: &'static str) -> Result<()> {
        if self.buf.remaining() < n {
            Err(SerializationError::UnexpectedEof(what))
        } else {
            Ok(())
        }
    }

    fn i32(&mut self, what: &'static str) -> Result<i32> {
        self.ensure(4, what)?;
        Ok(self.buf.get_i32_le())
    }

    fn len(&mut self, what: &'static str) -> Result<usize> {
        let len = self.i32(what)?;
        usize::try_from(len).map_err(|_| SerializationError::FormatMismatch(format!("negative length for {}", what)))
    }

    fn f32(&mut self, what: &'static str) -> Result<f32> {
        self.ensure(4, what)?;
        Ok(self.buf.get_f32_le())
    }

    fn bool(&mut self, what: &'static str) -> Result<bool> {
        self.ensure(1, what)?;
        Ok(self.buf.get_u8() != 0)
    }

    fn bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        self.ensure(n, what)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn varint(&mut self, what: &'static str) -> Result<usize> {
        let mut result = 0usize;
        for shift in (0..35).step_by(7) {
            self.ensure(1, what)?;
            let byte = self.buf.get_u8();
            result |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(SerializationError::FormatMismatch(format!("malformed string length for {}", what)))
    }

    fn string(&mut self, what: &'static str) -> Result<String> {
        let len = self.varint(what)?;
        let bytes = self.bytes(len, what)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::MathContext;

    #[test]
    fn test_strings_use_seven_bit_length_prefix() {
        let mut w = Writer::default();
        w.string("abc");
        assert_eq!(&w.buf[..], &[3, b'a', b'b', b'c']);

        let long = "x".repeat(200);
        let mut w = Writer::default();
        w.string(&long);
        assert_eq!(&w.buf[..2], &[0xC8, 0x01]);
        let mut r = Reader::new(&w.buf);
        assert_eq!(r.string("test").unwrap(), long);
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut r = Reader::new(&[1, 0]);
        assert!(matches!(r.i32("count"), Err(SerializationError::UnexpectedEof("count"))));
        let mut r = Reader::new(&[5, b'a']);
        assert!(matches!(r.string("name"), Err(SerializationError::UnexpectedEof("name"))));
    }

    #[test]
    fn test_property_bag_roundtrip() {
        let bag: PropertyContext = [
            ("a".to_string(), Value::Float(1.5)),
            ("list".to_string(), Value::floats(&[1.0, 2.0])),
            ("none".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        let bytes = encode_bag(Some(&bag)).unwrap();
        assert_eq!(decode_bag(&bytes).unwrap(), bag);
        assert!(decode_bag(&encode_bag(None).unwrap()).unwrap().is_empty());
    }

    fn longer_trailer_node(w: &mut Writer, guid: &str, method: &str, tag: i32, color: i32) {
        w.string(guid);
        w.f32(1.0);
        w.f32(2.0);
        w.bool(true);
        w.bool(method == "Starter");
        w.string(method);
        w.i32(0);
        w.string("");
        w.string("");
        w.string(method);
        let bag = encode_bag(None).unwrap();
        w.len(bag.len()).unwrap();
        w.buf.put_slice(&bag);
        w.i32(NODE_TRAILER_LEN + 6);
        w.i32(tag);
        w.i32(color);
        w.buf.put_slice(&[9; 6]);
    }

    #[test]
    fn test_longer_trailers_are_skipped() {
        let color = i32::from_be_bytes([0xFF, 0x10, 0x20, 0x30]);
        let mut w = Writer::default();
        w.string(MAGIC);
        w.i32(VERSION);
        w.i32(2);
        longer_trailer_node(&mut w, "a", "Starter", 5, color);
        longer_trailer_node(&mut w, "b", "ShowValue", 6, color);
        w.i32(1);
        w.string("a");
        w.string("Exit");
        w.string("b");
        w.string("Enter");
        w.i32(3);
        w.buf.put_slice(&[1, 2, 3]);
        w.i32(4);
        w.buf.put_slice(&[4, 5, 6, 7]);

        let registry = NodeRegistry::<MathContext>::discover();
        let graph = read_binary(&w.buf, &registry).unwrap();
        assert_eq!(graph.len(), 2);

        let a = graph.find_by_guid("a").unwrap();
        let b = graph.find_by_guid("b").unwrap();
        assert_eq!(graph.node(a).unwrap().tag, 5);
        assert_eq!(graph.node(b).unwrap().tag, 6);
        assert_eq!(graph.node(b).unwrap().color_argb(), color);
        assert_eq!(graph.connections(), &[Connection::new(a, "Exit", b, "Enter")]);
    }
}
