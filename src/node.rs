// 🧱 Object Graph - loosely-typed "Base" records
//
// A node is an ordered bag of named fields. Children nested under
// `elements` are real nodes; every other field stays a raw JSON value
// until a typed view (see `schema`) asks for it.

use crate::error::{BidError, Result};
use crate::schema::ELEMENTS_KEY;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// NODE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    /// Child nodes. `None` and an empty list both mean "no children".
    pub elements: Option<Vec<Node>>,

    /// All other members, in wire order
    pub fields: Map<String, Value>,

    /// Index into `fields` that `elements` sits in front of.
    /// `None` puts it after the last field.
    elements_at: Option<usize>,
}

impl Node {
    pub fn new() -> Self {
        Node::default()
    }

    /// Create a node carrying a `speckle_type`
    pub fn with_type(speckle_type: &str) -> Self {
        let mut node = Node::new();
        node.set("speckle_type", Value::String(speckle_type.to_string()));
        node
    }

    /// Parse a node out of a raw JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(BidError::schema("expected an object"));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Builder: add a child under `elements`
    pub fn push_element(mut self, child: Node) -> Self {
        self.elements.get_or_insert_with(Vec::new).push(child);
        self
    }

    /// Builder: set a field
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field, keeping its position if it already exists
    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    pub fn speckle_type(&self) -> Option<&str> {
        self.get("speckle_type").and_then(Value::as_str)
    }

    pub fn children(&self) -> &[Node] {
        self.elements.as_deref().unwrap_or(&[])
    }

    /// Read a nested object member as a node (e.g. `@Concrete`)
    pub fn child(&self, key: &str) -> Result<Node> {
        let value = self
            .get(key)
            .ok_or_else(|| BidError::schema(format!("missing member '{}'", key)))?;
        if !value.is_object() {
            return Err(BidError::schema(format!("member '{}' is not an object", key)));
        }
        Ok(Node::deserialize(value)?)
    }

    /// Edit a nested object member in place. The member keeps its position.
    pub fn update_child<T, F>(&mut self, key: &str, edit: F) -> Result<T>
    where
        F: FnOnce(&mut Node) -> Result<T>,
    {
        let mut child = self.child(key)?;
        let outcome = edit(&mut child)?;
        let slot = self
            .fields
            .get_mut(key)
            .ok_or_else(|| BidError::schema(format!("missing member '{}'", key)))?;
        *slot = child.to_value()?;
        Ok(outcome)
    }

    /// Where `elements` sits among the other fields
    fn elements_position(&self) -> usize {
        self.elements_at
            .map_or(self.fields.len(), |at| at.min(self.fields.len()))
    }

    /// Visit every entry of every list-valued member, in member order.
    ///
    /// Entries must be objects; anything else is a schema mismatch.
    pub fn for_each_list_entry<'a, F>(&'a self, mut visit: F) -> Result<()>
    where
        F: FnMut(&'a str, &'a Map<String, Value>) -> Result<()>,
    {
        let elements_at = self.elements_position();
        let children = self.children();

        for (index, (key, value)) in self.fields.iter().enumerate() {
            if index == elements_at {
                for child in children {
                    visit(ELEMENTS_KEY, &child.fields)?;
                }
            }
            if let Value::Array(entries) = value {
                for entry in entries {
                    let record = entry.as_object().ok_or_else(|| {
                        BidError::schema(format!("entry in list '{}' is not an object", key))
                    })?;
                    visit(key.as_str(), record)?;
                }
            }
        }

        if elements_at == self.fields.len() {
            for child in children {
                visit(ELEMENTS_KEY, &child.fields)?;
            }
        }
        Ok(())
    }

    /// Mutable twin of [`Node::for_each_list_entry`]
    pub fn for_each_list_entry_mut<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, &mut Map<String, Value>) -> Result<()>,
    {
        let elements_at = self.elements_position();
        let field_count = self.fields.len();
        let children: &mut [Node] = self.elements.as_deref_mut().unwrap_or_default();

        for (index, (key, value)) in self.fields.iter_mut().enumerate() {
            if index == elements_at {
                for child in children.iter_mut() {
                    visit(ELEMENTS_KEY, &mut child.fields)?;
                }
            }
            if let Value::Array(entries) = value {
                for entry in entries.iter_mut() {
                    let record = entry.as_object_mut().ok_or_else(|| {
                        BidError::schema(format!("entry in list '{}' is not an object", key))
                    })?;
                    visit(key.as_str(), record)?;
                }
            }
        }

        if elements_at == field_count {
            for child in children.iter_mut() {
                visit(ELEMENTS_KEY, &mut child.fields)?;
            }
        }
        Ok(())
    }

    /// Lazy post-order walk over this node and everything under `elements`
    pub fn flatten(&self) -> Flatten<'_> {
        flatten(self)
    }

    /// Number of reachable nodes, root included
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(Node::node_count).sum::<usize>()
    }
}

// ============================================================================
// WIRE FORMAT
// ============================================================================

// `elements` is written back at the position it was read from.
impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let elements = self.elements.as_ref();
        let len = self.fields.len() + usize::from(elements.is_some());
        let elements_at = self.elements_position();

        let mut map = serializer.serialize_map(Some(len))?;
        for (index, (key, value)) in self.fields.iter().enumerate() {
            if index == elements_at {
                if let Some(children) = elements {
                    map.serialize_entry(ELEMENTS_KEY, children)?;
                }
            }
            map.serialize_entry(key, value)?;
        }
        if elements_at == self.fields.len() {
            if let Some(children) = elements {
                map.serialize_entry(ELEMENTS_KEY, children)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;

        let mut node = Node::new();
        for (key, value) in raw {
            if key != ELEMENTS_KEY {
                node.fields.insert(key, value);
                continue;
            }
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    let children = items
                        .into_iter()
                        .map(|item| serde_json::from_value::<Node>(item).map_err(de::Error::custom))
                        .collect::<std::result::Result<Vec<_>, D::Error>>()?;
                    node.elements_at = Some(node.fields.len());
                    node.elements = Some(children);
                }
                other => {
                    return Err(de::Error::custom(format!(
                        "'{}' must be a list, found {}",
                        ELEMENTS_KEY, other
                    )))
                }
            }
        }
        Ok(node)
    }
}

// ============================================================================
// FLATTENER
// ============================================================================

/// Post-order iterator: every child subtree in order, then the node itself.
///
/// Uses an explicit stack, so deep graphs cannot overflow the call stack.
pub struct Flatten<'a> {
    stack: Vec<(&'a Node, usize)>,
}

pub fn flatten(root: &Node) -> Flatten<'_> {
    Flatten {
        stack: vec![(root, 0)],
    }
}

impl<'a> Iterator for Flatten<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        loop {
            let top = self.stack.last_mut()?;
            let node: &'a Node = top.0;

            if let Some(child) = node.children().get(top.1) {
                top.1 += 1;
                self.stack.push((child, 0));
            } else {
                self.stack.pop();
                return Some(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &str) -> Node {
        Node::new().with_field("Name", json!(name))
    }

    fn names(nodes: Flatten<'_>) -> Vec<String> {
        nodes
            .map(|n| n.get("Name").and_then(Value::as_str).unwrap_or("?").to_string())
            .collect()
    }

    #[test]
    fn test_leaf_yields_itself() {
        let leaf = named("leaf");
        assert_eq!(names(leaf.flatten()), vec!["leaf"]);
    }

    #[test]
    fn test_empty_elements_is_leaf() {
        let node = Node::from_value(json!({"Name": "box", "elements": []})).unwrap();
        assert_eq!(names(node.flatten()), vec!["box"]);

        let node = Node::from_value(json!({"Name": "box", "elements": null})).unwrap();
        assert!(node.elements.is_none());
        assert_eq!(names(node.flatten()), vec!["box"]);
    }

    #[test]
    fn test_post_order() {
        let root = named("root")
            .push_element(named("c1").push_element(named("c1a")).push_element(named("c1b")))
            .push_element(named("c2"));

        assert_eq!(
            names(root.flatten()),
            vec!["c1a", "c1b", "c1", "c2", "root"]
        );
    }

    #[test]
    fn test_flatten_completeness_deep() {
        let mut node = named("leaf");
        for i in 0..1000 {
            node = named(&format!("level{}", i)).push_element(node).push_element(named("side"));
        }

        assert_eq!(node.flatten().count(), node.node_count());
        assert_eq!(node.node_count(), 1 + 1000 * 2);
    }

    #[test]
    fn test_flatten_is_restartable() {
        let root = named("root").push_element(named("a"));
        let first: Vec<_> = root.flatten().collect();
        let second: Vec<_> = root.flatten().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_field_order_preserved() {
        let value = json!({"zeta": 1, "alpha": 2, "@Concrete": {"x": 1}, "mid": 3});
        let node = Node::from_value(value).unwrap();
        let keys: Vec<&str> = node.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "@Concrete", "mid"]);
    }

    #[test]
    fn test_child_missing_is_schema_mismatch() {
        let node = named("root");
        assert!(matches!(node.child("@Concrete"), Err(BidError::SchemaMismatch(_))));
    }

    #[test]
    fn test_update_child_keeps_position() {
        let mut node = Node::from_value(json!({
            "a": 1,
            "@Lighting": {"Name": "old"},
            "z": 2
        }))
        .unwrap();

        node.update_child("@Lighting", |child| {
            child.set("Name", json!("new"));
            Ok(())
        })
        .unwrap();

        let keys: Vec<&str> = node.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "@Lighting", "z"]);
        assert_eq!(node.child("@Lighting").unwrap().get("Name"), Some(&json!("new")));
    }

    #[test]
    fn test_list_entries_include_elements_and_arrays() {
        let node = Node::from_value(json!({
            "elements": [{"Name": "e1"}],
            "@Walls": [{"Name": "w1"}, {"Name": "w2"}],
            "units": "m"
        }))
        .unwrap();

        let mut seen = Vec::new();
        node.for_each_list_entry(|key, record| {
            seen.push(format!("{}:{}", key, record["Name"].as_str().unwrap()));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec!["elements:e1", "@Walls:w1", "@Walls:w2"]);
    }

    #[test]
    fn test_list_entries_follow_member_order() {
        let node = Node::from_value(json!({
            "@Walls": [{"Name": "w1"}],
            "elements": [{"Name": "e1"}],
            "@Floors": [{"Name": "f1"}]
        }))
        .unwrap();

        let mut seen = Vec::new();
        node.for_each_list_entry(|key, record| {
            seen.push(format!("{}:{}", key, record["Name"].as_str().unwrap()));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["@Walls:w1", "elements:e1", "@Floors:f1"]);
    }

    #[test]
    fn test_elements_keep_wire_position() {
        let value = json!({
            "speckle_type": "Base",
            "@Lighting": {"units": "m", "elements": [{"Name": "e"}], "z": 2}
        });
        let mut node = Node::from_value(value).unwrap();

        node.update_child("@Lighting", |child| {
            child.set("z", json!(3));
            Ok(())
        })
        .unwrap();

        let lighting = node.to_value().unwrap()["@Lighting"].clone();
        let keys: Vec<&str> = lighting.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["units", "elements", "z"]);
    }

    #[test]
    fn test_pushed_elements_go_last() {
        let node = named("root").push_element(named("child")).with_field("units", json!("m"));
        let value = node.to_value().unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Name", "units", "elements"]);
    }

    #[test]
    fn test_elements_must_be_a_list() {
        let result = Node::from_value(json!({"elements": 5}));
        assert!(matches!(result, Err(BidError::SchemaMismatch(_))));
    }

    #[test]
    fn test_non_object_entry_rejected() {
        let node = Node::from_value(json!({"@Walls": [1, 2]})).unwrap();
        let result = node.for_each_list_entry(|_, _| Ok(()));
        assert!(matches!(result, Err(BidError::SchemaMismatch(_))));
    }
}
