// 🧪 In-memory model store
//
// Append-only: objects are content-addressed and never overwritten,
// commits are only ever prepended to a branch. Old commits keep
// resolving to old content, same as the real server.

use super::serializer::{recompose, serialize_graph};
use super::{Branch, Commit, NewCommit, RemoteStore, RootHandle};
use crate::error::{BidError, Result};
use crate::node::Node;
use crate::schema::{CONCRETE_ROOT_KEY, LIGHTING_ROOT_KEY, MAIN_BRANCH};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct MemoryState {
    objects: HashMap<String, Value>,
    /// Branches in creation order, each with commits newest first
    branches: Vec<(Branch, Vec<Commit>)>,
}

impl MemoryState {
    fn branch(&self, name: &str) -> Option<&(Branch, Vec<Commit>)> {
        self.branches.iter().find(|(b, _)| b.name == name)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| BidError::remote("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| BidError::remote("memory store lock poisoned"))
    }

    /// Create an empty branch. Existing branches are left alone.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        let mut state = self.write()?;
        if state.branch(name).is_none() {
            let branch = Branch {
                id: short_id(),
                name: name.to_string(),
                description: None,
            };
            state.branches.push((branch, Vec::new()));
        }
        Ok(())
    }

    /// Create the branch if needed, send `root` and commit it
    pub fn seed(&self, branch_name: &str, root: &Node, message: &str) -> Result<String> {
        self.create_branch(branch_name)?;
        let object_id = self.send_graph(root)?;
        self.create_commit(&NewCommit {
            branch_name: branch_name.to_string(),
            object_id,
            message: message.to_string(),
            source_application: "seed".to_string(),
        })
    }

    /// Commits on a branch, newest first
    pub fn commits(&self, branch_name: &str) -> Result<Vec<Commit>> {
        let state = self.read()?;
        state
            .branch(branch_name)
            .map(|(_, commits)| commits.clone())
            .ok_or_else(|| BidError::NotFound(format!("branch '{}'", branch_name)))
    }

    /// A small two-category project, used by offline runs and tests
    pub fn demo() -> Result<Self> {
        let store = MemoryStore::new();
        store.create_branch(MAIN_BRANCH)?;

        let mesh = |name: &str, volume: f64| {
            json!({"speckle_type": "Objects.Geometry.Mesh", "Name": name, "Volume (m³)": volume})
        };
        let fixture = |name: &str| json!({"speckle_type": "Objects.Geometry.Mesh", "Name": name});

        let concrete = Node::with_type("Base").with_field(
            CONCRETE_ROOT_KEY,
            json!({
                "speckle_type": "Base",
                "@Floors": [mesh("C30/37", 182.4), mesh("C25/30", 96.0)],
                "@Walls": [mesh("C30/37", 41.6), mesh("C35/45 precast", 28.8)],
            }),
        );
        store.seed("concrete", &concrete, "Concrete quantities")?;

        let lighting = Node::with_type("Base").with_field(
            LIGHTING_ROOT_KEY,
            json!({
                "speckle_type": "Base",
                "@Fixtures": [
                    fixture("LED panel 600x600"),
                    fixture("LED panel 600x600"),
                    fixture("LED panel 600x600"),
                    fixture("Downlight 12W"),
                    fixture("Downlight 12W"),
                    fixture("Emergency exit sign"),
                ],
            }),
        );
        store.seed("lighting", &lighting, "Lighting fixtures")?;

        Ok(store)
    }
}

/// Server-style short commit/branch id
fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

impl RemoteStore for MemoryStore {
    fn list_branches(&self) -> Result<Vec<Branch>> {
        let state = self.read()?;
        Ok(state.branches.iter().map(|(b, _)| b.clone()).collect())
    }

    fn resolve_latest_root(&self, branch_name: &str) -> Result<RootHandle> {
        let state = self.read()?;
        let (_, commits) = state
            .branch(branch_name)
            .ok_or_else(|| BidError::NotFound(format!("branch '{}'", branch_name)))?;
        let latest = commits
            .first()
            .ok_or_else(|| BidError::NotFound(format!("commits on branch '{}'", branch_name)))?;

        Ok(RootHandle {
            branch_name: branch_name.to_string(),
            commit_id: latest.id.clone(),
            object_id: latest.referenced_object.clone(),
        })
    }

    fn receive_graph(&self, object_id: &str) -> Result<Node> {
        let state = self.read()?;
        recompose(object_id, &state.objects)
    }

    fn send_graph(&self, node: &Node) -> Result<String> {
        let graph = serialize_graph(node)?;
        let mut state = self.write()?;
        for (id, object) in graph.objects {
            state.objects.entry(id).or_insert(object);
        }
        Ok(graph.root_id)
    }

    fn create_commit(&self, commit: &NewCommit) -> Result<String> {
        let mut state = self.write()?;
        if !state.objects.contains_key(&commit.object_id) {
            return Err(BidError::NotFound(format!("object '{}'", commit.object_id)));
        }

        let (_, commits) = state
            .branches
            .iter_mut()
            .find(|(b, _)| b.name == commit.branch_name)
            .ok_or_else(|| BidError::NotFound(format!("branch '{}'", commit.branch_name)))?;

        let id = short_id();
        commits.insert(
            0,
            Commit {
                id: id.clone(),
                referenced_object: commit.object_id.clone(),
                message: Some(commit.message.clone()),
                source_application: Some(commit.source_application.clone()),
                created_at: Some(Utc::now()),
            },
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_branch() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.resolve_latest_root("concrete"),
            Err(BidError::NotFound(_))
        ));
    }

    #[test]
    fn test_branch_without_commits() {
        let store = MemoryStore::new();
        store.create_branch("lighting").unwrap();
        assert!(matches!(
            store.resolve_latest_root("lighting"),
            Err(BidError::NotFound(_))
        ));
    }

    #[test]
    fn test_latest_commit_wins() {
        let store = MemoryStore::new();
        let first = Node::with_type("Base").with_field("rev", json!(1));
        let second = Node::with_type("Base").with_field("rev", json!(2));

        store.seed("concrete", &first, "one").unwrap();
        let latest = store.seed("concrete", &second, "two").unwrap();

        let root = store.resolve_latest_root("concrete").unwrap();
        assert_eq!(root.commit_id, latest);

        let node = store.receive_graph(&root.object_id).unwrap();
        assert_eq!(node.get("rev"), Some(&json!(2)));
        assert_eq!(store.commits("concrete").unwrap().len(), 2);
    }

    #[test]
    fn test_commit_requires_known_object() {
        let store = MemoryStore::new();
        store.create_branch("concrete").unwrap();
        let result = store.create_commit(&NewCommit {
            branch_name: "concrete".to_string(),
            object_id: "deadbeef".to_string(),
            message: "x".to_string(),
            source_application: "test".to_string(),
        });
        assert!(matches!(result, Err(BidError::NotFound(_))));
    }

    #[test]
    fn test_demo_store() {
        let store = MemoryStore::demo().unwrap();
        let names: Vec<String> = store
            .list_branches()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["main", "concrete", "lighting"]);

        let root = store.resolve_latest_root("lighting").unwrap();
        let graph = store.receive_graph(&root.object_id).unwrap();
        assert!(graph.child(LIGHTING_ROOT_KEY).is_ok());
    }
}
