// 🗄️ Remote Object Store
//
// One trait, two backends:
// - SpeckleClient: the real server (GraphQL + REST objects API)
// - MemoryStore:   append-only in-process store for tests and offline runs
//
// Both share the serializer, so content ids are identical either way.

pub mod memory;
pub mod serializer;
pub mod speckle;

pub use memory::MemoryStore;
pub use serializer::{recompose, serialize_graph, SerializedGraph};
pub use speckle::SpeckleClient;

use crate::error::Result;
use crate::node::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CORE TYPES
// ============================================================================

/// Named line of commits in a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Immutable snapshot pointing at a root object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: String,
    pub referenced_object: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub source_application: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of resolving a branch to its latest commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootHandle {
    pub branch_name: String,
    pub commit_id: String,
    pub object_id: String,
}

/// Everything needed to record a new commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub branch_name: String,
    pub object_id: String,
    pub message: String,
    pub source_application: String,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Remote model store - the only seam to the outside world
///
/// Every call is blocking and is never retried. Failures are
/// `RemoteUnavailable` or `NotFound`.
pub trait RemoteStore: Send + Sync {
    /// All branches of the configured stream
    fn list_branches(&self) -> Result<Vec<Branch>>;

    /// Branch -> most recent commit -> referenced root object
    fn resolve_latest_root(&self, branch_name: &str) -> Result<RootHandle>;

    /// Download and recompose a full object graph
    fn receive_graph(&self, object_id: &str) -> Result<Node>;

    /// Upload a graph, returning the new root object id
    fn send_graph(&self, node: &Node) -> Result<String>;

    /// Record a commit on a branch. Never updates in place.
    fn create_commit(&self, commit: &NewCommit) -> Result<String>;
}
