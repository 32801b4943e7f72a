// 🌐 Speckle server client
//
// GraphQL for branches and commits, REST for object download/upload.
// Blocking ureq agent, bearer token auth, no retries.

use super::serializer::{recompose, serialize_graph};
use super::{Branch, Commit, NewCommit, RemoteStore, RootHandle};
use crate::config::SpeckleConfig;
use crate::error::{BidError, Result};
use crate::node::Node;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

const BRANCH_QUERY: &str = r#"
query Branch($streamId: String!, $name: String!) {
  stream(id: $streamId) {
    branch(name: $name) {
      id
      name
      description
      commits(limit: 1) {
        items { id referencedObject message sourceApplication createdAt }
      }
    }
  }
}"#;

const BRANCHES_QUERY: &str = r#"
query Branches($streamId: String!) {
  stream(id: $streamId) {
    branches(limit: 100) {
      items { id name description }
    }
  }
}"#;

const COMMIT_CREATE_MUTATION: &str = r#"
mutation CommitCreate($commit: CommitCreateInput!) {
  commitCreate(commit: $commit)
}"#;

/// Objects per multipart part on upload
const UPLOAD_BATCH_SIZE: usize = 500;
const MULTIPART_BOUNDARY: &str = "----openbid-batch-boundary";

// ============================================================================
// GRAPHQL ENVELOPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_result(self, what: &str) -> Result<T> {
        if !self.errors.is_empty() {
            let message = self
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let lower = message.to_lowercase();
            if lower.contains("not found") || lower.contains("does not exist") {
                return Err(BidError::NotFound(format!("{}: {}", what, message)));
            }
            return Err(BidError::remote(format!("{}: {}", what, message)));
        }
        self.data
            .ok_or_else(|| BidError::remote(format!("{}: response carried no data", what)))
    }
}

#[derive(Debug, Deserialize)]
struct StreamData<T> {
    stream: Option<T>,
}

#[derive(Debug, Deserialize)]
struct BranchData {
    branch: Option<BranchPayload>,
}

#[derive(Debug, Deserialize)]
struct BranchPayload {
    #[serde(flatten)]
    branch: Branch,
    commits: Page<Commit>,
}

#[derive(Debug, Deserialize)]
struct BranchesData {
    branches: Page<Branch>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitCreateData {
    commit_create: String,
}

fn latest_root(branch_name: &str, data: StreamData<BranchData>) -> Result<RootHandle> {
    let stream = data
        .stream
        .ok_or_else(|| BidError::NotFound("stream".to_string()))?;
    let payload = stream
        .branch
        .ok_or_else(|| BidError::NotFound(format!("branch '{}'", branch_name)))?;
    let latest = payload
        .commits
        .items
        .into_iter()
        .next()
        .ok_or_else(|| BidError::NotFound(format!("commits on branch '{}'", branch_name)))?;

    Ok(RootHandle {
        branch_name: payload.branch.name,
        commit_id: latest.id,
        object_id: latest.referenced_object,
    })
}

fn map_http_error(what: &str, err: ureq::Error) -> BidError {
    match err {
        ureq::Error::Status(404, _) => BidError::NotFound(what.to_string()),
        ureq::Error::Status(code, response) => BidError::remote(format!(
            "{}: HTTP {} {}",
            what,
            code,
            response.status_text()
        )),
        ureq::Error::Transport(transport) => BidError::remote(format!("{}: {}", what, transport)),
    }
}

/// Key downloaded objects by their `id`. A missing id is a server fault.
fn index_objects(objects: Vec<Value>) -> Result<HashMap<String, Value>> {
    let mut by_id = HashMap::with_capacity(objects.len());
    for object in objects {
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BidError::remote("object download returned an object without 'id'"))?
            .to_string();
        by_id.insert(id, object);
    }
    Ok(by_id)
}

/// Multipart body with one JSON-array part per batch of objects
fn multipart_body(objects: &[Value]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    for (index, batch) in objects.chunks(UPLOAD_BATCH_SIZE).enumerate() {
        let json = serde_json::to_string(batch)?;
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"batch-{0}\"; filename=\"batch-{0}\"\r\n",
                index + 1
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/json\r\n\r\n");
        body.extend_from_slice(json.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    Ok(body)
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct SpeckleClient {
    config: SpeckleConfig,
    agent: ureq::Agent,
}

impl SpeckleClient {
    pub fn new(config: SpeckleConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(&format!("open-bid/{}", crate::VERSION))
            .build();
        SpeckleClient { config, agent }
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.config.token)
    }

    fn graphql<T: DeserializeOwned>(&self, what: &str, query: &str, variables: Value) -> Result<T> {
        let response = self
            .agent
            .post(&self.config.graphql_url())
            .set("Authorization", &self.authorization())
            .send_json(json!({ "query": query, "variables": variables }))
            .map_err(|e| map_http_error(what, e))?;

        let envelope: GraphQlResponse<T> = response
            .into_json()
            .map_err(|e| BidError::remote(format!("{}: unreadable response: {}", what, e)))?;
        envelope.into_result(what)
    }
}

impl RemoteStore for SpeckleClient {
    fn list_branches(&self) -> Result<Vec<Branch>> {
        let data: StreamData<BranchesData> = self.graphql(
            "list branches",
            BRANCHES_QUERY,
            json!({ "streamId": self.config.stream_id }),
        )?;
        let stream = data
            .stream
            .ok_or_else(|| BidError::NotFound(format!("stream '{}'", self.config.stream_id)))?;
        Ok(stream.branches.items)
    }

    fn resolve_latest_root(&self, branch_name: &str) -> Result<RootHandle> {
        let data: StreamData<BranchData> = self.graphql(
            "branch lookup",
            BRANCH_QUERY,
            json!({ "streamId": self.config.stream_id, "name": branch_name }),
        )?;
        let root = latest_root(branch_name, data)?;
        debug!(branch = branch_name, commit = %root.commit_id, object = %root.object_id, "resolved latest commit");
        Ok(root)
    }

    fn receive_graph(&self, object_id: &str) -> Result<Node> {
        let what = format!("object '{}'", object_id);
        let response = self
            .agent
            .get(&format!("{}/{}", self.config.objects_url(), object_id))
            .set("Authorization", &self.authorization())
            .set("Accept", "application/json")
            .call()
            .map_err(|e| map_http_error(&what, e))?;

        let objects: Vec<Value> = response
            .into_json()
            .map_err(|e| BidError::remote(format!("{}: unreadable response: {}", what, e)))?;
        debug!(object = object_id, count = objects.len(), "received objects");

        recompose(object_id, &index_objects(objects)?)
    }

    fn send_graph(&self, node: &Node) -> Result<String> {
        let graph = serialize_graph(node)?;
        let objects: Vec<Value> = graph.objects.into_iter().map(|(_, object)| object).collect();
        let body = multipart_body(&objects)?;

        self.agent
            .post(&self.config.objects_url())
            .set("Authorization", &self.authorization())
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
            )
            .send_bytes(&body)
            .map_err(|e| map_http_error("object upload", e))?;

        debug!(object = %graph.root_id, count = objects.len(), children = graph.total_children_count, "sent objects");
        Ok(graph.root_id)
    }

    fn create_commit(&self, commit: &NewCommit) -> Result<String> {
        let data: CommitCreateData = self.graphql(
            "commit create",
            COMMIT_CREATE_MUTATION,
            json!({
                "commit": {
                    "streamId": self.config.stream_id,
                    "branchName": commit.branch_name,
                    "objectId": commit.object_id,
                    "message": commit.message,
                    "sourceApplication": commit.source_application,
                }
            }),
        )?;
        info!(branch = %commit.branch_name, commit = %data.commit_create, "created commit");
        Ok(data.commit_create)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: DeserializeOwned>(value: Value) -> GraphQlResponse<T> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_latest_root_from_response() {
        let response: GraphQlResponse<StreamData<BranchData>> = parse(json!({
            "data": {"stream": {"branch": {
                "id": "b1", "name": "concrete", "description": null,
                "commits": {"items": [{
                    "id": "c9", "referencedObject": "obj9", "message": "latest",
                    "sourceApplication": "openbid", "createdAt": "2024-03-01T10:00:00Z"
                }]}
            }}}
        }));

        let root = latest_root("concrete", response.into_result("branch lookup").unwrap()).unwrap();
        assert_eq!(root.commit_id, "c9");
        assert_eq!(root.object_id, "obj9");
        assert_eq!(root.branch_name, "concrete");
    }

    #[test]
    fn test_missing_branch_is_not_found() {
        let response: GraphQlResponse<StreamData<BranchData>> =
            parse(json!({"data": {"stream": {"branch": null}}}));
        let data = response.into_result("branch lookup").unwrap();
        assert!(matches!(latest_root("steel", data), Err(BidError::NotFound(_))));
    }

    #[test]
    fn test_empty_commit_list_is_not_found() {
        let response: GraphQlResponse<StreamData<BranchData>> = parse(json!({
            "data": {"stream": {"branch": {"id": "b1", "name": "lighting", "commits": {"items": []}}}}
        }));
        let data = response.into_result("branch lookup").unwrap();
        assert!(matches!(latest_root("lighting", data), Err(BidError::NotFound(_))));
    }

    #[test]
    fn test_graphql_errors() {
        let response: GraphQlResponse<Value> = parse(json!({
            "data": null,
            "errors": [{"message": "You do not have access to this resource."}]
        }));
        assert!(matches!(response.into_result("x"), Err(BidError::RemoteUnavailable(_))));

        let response: GraphQlResponse<Value> = parse(json!({
            "errors": [{"message": "Stream not found"}]
        }));
        assert!(matches!(response.into_result("x"), Err(BidError::NotFound(_))));
    }

    #[test]
    fn test_commit_create_payload() {
        let response: GraphQlResponse<CommitCreateData> =
            parse(json!({"data": {"commitCreate": "abc1234567"}}));
        assert_eq!(response.into_result("commit").unwrap().commit_create, "abc1234567");
    }

    #[test]
    fn test_index_objects() {
        let objects = vec![
            json!({"id": "root", "speckle_type": "Base", "@x": {"referencedId": "leaf", "speckle_type": "reference"}}),
            json!({"id": "leaf", "speckle_type": "Base", "Name": "x"}),
        ];
        let by_id = index_objects(objects).unwrap();
        assert_eq!(by_id.len(), 2);

        let node = recompose("root", &by_id).unwrap();
        assert_eq!(node.get("@x").unwrap()["Name"], json!("x"));
    }

    #[test]
    fn test_object_without_id_is_remote_fault() {
        let err = index_objects(vec![json!({"speckle_type": "Base", "Name": "x"})]).unwrap_err();
        assert!(matches!(err, BidError::RemoteUnavailable(_)));
    }

    #[test]
    fn test_multipart_batches() {
        let objects: Vec<Value> = (0..(UPLOAD_BATCH_SIZE + 1))
            .map(|i| json!({"id": format!("{:032}", i)}))
            .collect();
        let body = String::from_utf8(multipart_body(&objects).unwrap()).unwrap();

        assert!(body.contains("name=\"batch-1\""));
        assert!(body.contains("name=\"batch-2\""));
        assert!(!body.contains("name=\"batch-3\""));
        assert!(body.ends_with(&format!("--{}--\r\n", MULTIPART_BOUNDARY)));
    }
}
