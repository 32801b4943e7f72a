// 🔗 Content-addressed serializer
//
// Send side: every object carrying `speckle_type` gets an id derived from
// its own serialized content. Members named `elements` or starting with
// `@` are detached: the child is stored on its own and replaced by a
// reference. Each object lists its detached descendants in `__closure`.
//
// Receive side: references (and chunked lists) are spliced back in.

use crate::error::{BidError, Result};
use crate::node::Node;
use crate::schema::ELEMENTS_KEY;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const REFERENCE_TYPE: &str = "reference";
pub const DATA_CHUNK_TYPE: &str = "Speckle.Core.Models.DataChunk";

const ID_KEY: &str = "id";
const TYPE_KEY: &str = "speckle_type";
const CLOSURE_KEY: &str = "__closure";
const CHILDREN_COUNT_KEY: &str = "totalChildrenCount";
const REFERENCED_ID_KEY: &str = "referencedId";

/// Length of an object id in hex characters
pub const ID_LENGTH: usize = 32;

/// Output of [`serialize_graph`]
#[derive(Debug, Clone)]
pub struct SerializedGraph {
    pub root_id: String,
    /// Every stored object keyed by id, children before parents, root last
    pub objects: Vec<(String, Value)>,
    pub total_children_count: usize,
}

/// Content id: sha256 over the compact JSON, truncated
pub fn object_id(object: &Map<String, Value>) -> Result<String> {
    let json = serde_json::to_string(object)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    Ok(digest[..ID_LENGTH].to_string())
}

fn is_detached(key: &str) -> bool {
    key == ELEMENTS_KEY || key.starts_with('@')
}

fn is_base(object: &Map<String, Value>) -> bool {
    matches!(object.get(TYPE_KEY), Some(Value::String(t)) if t != REFERENCE_TYPE)
}

fn is_reference(object: &Map<String, Value>) -> bool {
    matches!(object.get(TYPE_KEY), Some(Value::String(t)) if t == REFERENCE_TYPE)
}

fn merge_closure(into: &mut BTreeMap<String, usize>, id: &str, depth: usize) {
    into.entry(id.to_string())
        .and_modify(|existing| *existing = (*existing).min(depth))
        .or_insert(depth);
}

// ============================================================================
// SEND
// ============================================================================

#[derive(Default)]
struct Serializer {
    stored: Vec<(String, Value)>,
    seen: HashSet<String>,
}

impl Serializer {
    fn store(&mut self, id: &str, object: Value) {
        if self.seen.insert(id.to_string()) {
            self.stored.push((id.to_string(), object));
        }
    }

    /// Serialize one base object. Returns (object with id, id, closure).
    fn object(&mut self, source: &Map<String, Value>) -> Result<(Map<String, Value>, String, BTreeMap<String, usize>)> {
        let mut out = Map::new();
        let mut closure = BTreeMap::new();

        for (key, value) in source {
            if key == ID_KEY || key == CLOSURE_KEY || key == CHILDREN_COUNT_KEY {
                continue;
            }
            let converted = self.value(value, is_detached(key), &mut closure)?;
            out.insert(key.clone(), converted);
        }

        if !closure.is_empty() {
            out.insert(CHILDREN_COUNT_KEY.to_string(), Value::from(closure.len()));
            let closure_json: Map<String, Value> = closure
                .iter()
                .map(|(id, depth)| (id.clone(), Value::from(*depth)))
                .collect();
            out.insert(CLOSURE_KEY.to_string(), Value::Object(closure_json));
        }

        let id = object_id(&out)?;
        out.insert(ID_KEY.to_string(), Value::String(id.clone()));
        Ok((out, id, closure))
    }

    fn value(&mut self, value: &Value, detach: bool, closure: &mut BTreeMap<String, usize>) -> Result<Value> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.value(item, detach, closure))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),

            Value::Object(object) if is_reference(object) => {
                if let Some(Value::String(id)) = object.get(REFERENCED_ID_KEY) {
                    merge_closure(closure, id, 1);
                }
                Ok(value.clone())
            }

            Value::Object(object) if is_base(object) => {
                let (serialized, id, child_closure) = self.object(object)?;
                if detach {
                    merge_closure(closure, &id, 1);
                    for (child_id, depth) in &child_closure {
                        merge_closure(closure, child_id, depth + 1);
                    }
                    self.store(&id, Value::Object(serialized));
                    Ok(reference(&id))
                } else {
                    for (child_id, depth) in &child_closure {
                        merge_closure(closure, child_id, *depth);
                    }
                    Ok(Value::Object(serialized))
                }
            }

            Value::Object(object) => {
                let mut out = Map::new();
                for (key, member) in object {
                    out.insert(key.clone(), self.value(member, false, closure)?);
                }
                Ok(Value::Object(out))
            }

            other => Ok(other.clone()),
        }
    }
}

fn reference(id: &str) -> Value {
    let mut object = Map::new();
    object.insert(REFERENCED_ID_KEY.to_string(), Value::String(id.to_string()));
    object.insert(TYPE_KEY.to_string(), Value::String(REFERENCE_TYPE.to_string()));
    Value::Object(object)
}

/// Turn a graph into the flat list of objects the server stores
pub fn serialize_graph(root: &Node) -> Result<SerializedGraph> {
    let value = root.to_value()?;
    let source = value
        .as_object()
        .ok_or_else(|| BidError::schema("root is not an object"))?;

    let mut serializer = Serializer::default();
    let (object, root_id, closure) = serializer.object(source)?;
    serializer.store(&root_id, Value::Object(object));

    Ok(SerializedGraph {
        root_id,
        objects: serializer.stored,
        total_children_count: closure.len(),
    })
}

// ============================================================================
// RECEIVE
// ============================================================================

struct Recomposer<'a> {
    objects: &'a HashMap<String, Value>,
    path: HashSet<String>,
}

impl<'a> Recomposer<'a> {
    fn load(&mut self, id: &str) -> Result<Value> {
        let objects = self.objects;
        let stored = objects
            .get(id)
            .ok_or_else(|| BidError::NotFound(format!("object '{}'", id)))?;

        if !self.path.insert(id.to_string()) {
            return Err(BidError::schema(format!("object '{}' references itself", id)));
        }
        let resolved = self.value(stored);
        self.path.remove(id);
        resolved
    }

    fn value(&mut self, value: &Value) -> Result<Value> {
        match value {
            Value::Object(object) if is_reference(object) => match object.get(REFERENCED_ID_KEY) {
                Some(Value::String(id)) => self.load(id),
                _ => Err(BidError::schema("reference without 'referencedId'")),
            },

            Value::Object(object) => {
                let mut out = Map::new();
                for (key, member) in object {
                    if key == CLOSURE_KEY {
                        continue;
                    }
                    out.insert(key.clone(), self.value(member)?);
                }
                Ok(Value::Object(out))
            }

            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.value(item)? {
                        Value::Object(chunk)
                            if chunk.get(TYPE_KEY).and_then(Value::as_str) == Some(DATA_CHUNK_TYPE) =>
                        {
                            if let Some(Value::Array(data)) = chunk.get("data") {
                                out.extend(data.iter().cloned());
                            }
                        }
                        resolved => out.push(resolved),
                    }
                }
                Ok(Value::Array(out))
            }

            other => Ok(other.clone()),
        }
    }
}

/// Rebuild the full tree for `root_id` out of a bag of stored objects
pub fn recompose(root_id: &str, objects: &HashMap<String, Value>) -> Result<Node> {
    let mut recomposer = Recomposer {
        objects,
        path: HashSet::new(),
    };
    let value = recomposer.load(root_id)?;
    Node::from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_root() -> Node {
        Node::from_value(json!({
            "speckle_type": "Base",
            "@Concrete": {
                "speckle_type": "Base",
                "@Floors": [
                    {"speckle_type": "Objects.Geometry.Mesh", "Name": "C30/37", "Volume (m³)": 10.0},
                    {"speckle_type": "Objects.Geometry.Mesh", "Name": "C25/30", "Volume (m³)": 4.0}
                ],
                "Beams": [
                    {"speckle_type": "Objects.Geometry.Mesh", "Name": "C30/37", "Volume (m³)": 2.0}
                ]
            },
            "units": "m"
        }))
        .unwrap()
    }

    fn as_map(graph: &SerializedGraph) -> HashMap<String, Value> {
        graph.objects.iter().cloned().collect()
    }

    #[test]
    fn test_ids_are_stable() {
        let root = sample_root();
        let first = serialize_graph(&root).unwrap();
        let second = serialize_graph(&root).unwrap();
        assert_eq!(first.root_id, second.root_id);
        assert_eq!(first.root_id.len(), ID_LENGTH);
    }

    #[test]
    fn test_leaf_change_changes_root_id() {
        let root = sample_root();
        let mut changed = sample_root();
        changed
            .update_child("@Concrete", |c| {
                c.set("Beams", json!([
                    {"speckle_type": "Objects.Geometry.Mesh", "Name": "C30/37", "Volume (m³)": 3.0}
                ]));
                Ok(())
            })
            .unwrap();

        let a = serialize_graph(&root).unwrap();
        let b = serialize_graph(&changed).unwrap();
        assert_ne!(a.root_id, b.root_id);
    }

    #[test]
    fn test_detaches_at_members() {
        let graph = serialize_graph(&sample_root()).unwrap();
        let objects = as_map(&graph);
        let root = &objects[&graph.root_id];

        // @Concrete and its two @Floors meshes are stored separately
        assert_eq!(root["@Concrete"]["speckle_type"], json!("reference"));
        assert_eq!(graph.total_children_count, 3);
        assert_eq!(graph.objects.len(), 4);
        assert_eq!(graph.objects.last().unwrap().0, graph.root_id);

        let closure = root["__closure"].as_object().unwrap();
        let concrete_id = root["@Concrete"]["referencedId"].as_str().unwrap();
        assert_eq!(closure[concrete_id], json!(1));
        assert_eq!(closure.values().filter(|d| **d == json!(2)).count(), 2);
    }

    #[test]
    fn test_recompose_restores_tree() {
        let original = sample_root();
        let graph = serialize_graph(&original).unwrap();
        let restored = recompose(&graph.root_id, &as_map(&graph)).unwrap();

        let concrete = restored.child("@Concrete").unwrap();
        assert_eq!(concrete.get("@Floors").unwrap()[0]["Name"], json!("C30/37"));
        assert_eq!(concrete.get("Beams").unwrap()[0]["Volume (m³)"], json!(2.0));
        assert_eq!(restored.id(), Some(graph.root_id.as_str()));
        assert!(restored.get("__closure").is_none());
    }

    #[test]
    fn test_elements_are_detached() {
        let root = Node::with_type("Base")
            .push_element(Node::with_type("Base").with_field("Name", json!("a")))
            .push_element(Node::with_type("Base").with_field("Name", json!("b")));

        let graph = serialize_graph(&root).unwrap();
        assert_eq!(graph.total_children_count, 2);

        let restored = recompose(&graph.root_id, &as_map(&graph)).unwrap();
        assert_eq!(restored.children().len(), 2);
        assert_eq!(restored.children()[1].get("Name"), Some(&json!("b")));
    }

    #[test]
    fn test_recompose_splices_data_chunks() {
        let mut objects = HashMap::new();
        objects.insert(
            "chunk1".to_string(),
            json!({"id": "chunk1", "speckle_type": DATA_CHUNK_TYPE, "data": [{"Name": "a"}, {"Name": "b"}]}),
        );
        objects.insert(
            "root".to_string(),
            json!({
                "id": "root",
                "speckle_type": "Base",
                "@Items": [{"referencedId": "chunk1", "speckle_type": "reference"}, {"Name": "c"}]
            }),
        );

        let node = recompose("root", &objects).unwrap();
        let items = node.get("@Items").unwrap().as_array().unwrap();
        let names: Vec<&str> = items.iter().map(|i| i["Name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let objects = HashMap::new();
        assert!(matches!(recompose("nope", &objects), Err(BidError::NotFound(_))));
    }

    #[test]
    fn test_dangling_reference_is_not_found() {
        let mut objects = HashMap::new();
        objects.insert(
            "root".to_string(),
            json!({"speckle_type": "Base", "@x": {"referencedId": "gone", "speckle_type": "reference"}}),
        );
        assert!(matches!(recompose("root", &objects), Err(BidError::NotFound(_))));
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut objects = HashMap::new();
        objects.insert(
            "root".to_string(),
            json!({"speckle_type": "Base", "@x": {"referencedId": "root", "speckle_type": "reference"}}),
        );
        assert!(matches!(recompose("root", &objects), Err(BidError::SchemaMismatch(_))));
    }
}
