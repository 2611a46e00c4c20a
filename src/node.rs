use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use crate::error::{FilterError, Result};
use crate::tree::{identifier_of, locate, resolve_mut};
use crate::types::{FetchTask, NodePath, TreeSchema};

/// Where detail data lives and which depth of rows carries it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetailPolicy {
    pub schema: TreeSchema,
    /// Depth of the rows that load details lazily (0 = root rows).
    pub leaf_depth: usize,
}

impl Default for DetailPolicy {
    fn default() -> Self {
        Self {
            schema: TreeSchema::default(),
            leaf_depth: 2,
        }
    }
}

/// The detail property is absent or holds nothing yet.
pub fn needs_details(node: &Value, detail_key: &str) -> bool {
    match node.get(detail_key) {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Bool(_) | Value::Number(_)) => false,
    }
}

/// Decides whether expanding the row at `pointer` requires a detail fetch.
pub fn on_expansion_requested(forest: &[Value], pointer: &str, policy: &DetailPolicy) -> Option<FetchTask> {
    let (path, node) = locate(forest, pointer, &policy.schema)?;
    if path.depth() != policy.leaf_depth {
        return None;
    }
    if !needs_details(node, &policy.schema.detail_key) {
        debug!(%path, "detail data already present");
        return None;
    }
    let identifier = path.identifier()?.to_string();
    Some(FetchTask {
        pointer: pointer.to_string(),
        path,
        identifier,
    })
}

/// Stores fetched records on the row the task was issued for. Sibling rows and the row's
/// other properties are left alone.
pub fn apply_details(forest: &mut [Value], task: &FetchTask, records: Vec<Value>, schema: &TreeSchema) -> Result<()> {
    let node = resolve_mut(forest, &task.pointer).ok_or_else(|| FilterError::NodeNotFound(task.pointer.clone()))?;

    // The row may have moved since the fetch was issued
    if identifier_of(node, schema).as_deref() != Some(task.identifier.as_str()) {
        return Err(FilterError::NodeNotFound(task.pointer.clone()));
    }
    let Value::Object(map) = node else {
        return Err(FilterError::NodeNotFound(task.pointer.clone()));
    };
    map.insert(schema.detail_key.clone(), Value::Array(records));
    Ok(())
}

/// Backend that supplies detail records for one row.
#[allow(async_fn_in_trait)]
pub trait DetailSource {
    async fn fetch_details(&self, identifier: &str) -> Result<Vec<Value>>;
}

/// Runs detail fetches: at most one in flight per row, bounded overall.
pub struct DetailLoader<S> {
    source: S,
    in_flight: Mutex<HashSet<NodePath>>,
    permits: Semaphore,
}

struct InFlight<'a> {
    set: &'a Mutex<HashSet<NodePath>>,
    path: NodePath,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.path);
    }
}

impl<S: DetailSource> DetailLoader<S> {
    pub fn new(source: S, max_concurrent: usize) -> Self {
        Self {
            source,
            in_flight: Mutex::new(HashSet::new()),
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_loading(&self, path: &NodePath) -> bool {
        self.in_flight.lock().contains(path)
    }

    /// Fetches that could start right now without waiting.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Fetches details for the task's row. Returns `None` when that row is already being
    /// fetched. Fetch failures are logged and resolve to an empty list.
    pub async fn load(&self, task: &FetchTask) -> Option<Vec<Value>> {
        if !self.in_flight.lock().insert(task.path.clone()) {
            debug!(path = %task.path, "detail fetch already in flight");
            return None;
        }
        let _guard = InFlight {
            set: &self.in_flight,
            path: task.path.clone(),
        };

        let _permit = self.permits.acquire().await.ok();
        match self.source.fetch_details(&task.identifier).await {
            Ok(records) => {
                debug!(identifier = %task.identifier, records = records.len(), "fetched details");
                Some(records)
            }
            Err(e) => {
                warn!(identifier = %task.identifier, error = %e, "detail fetch failed");
                Some(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forest() -> Vec<Value> {
        vec![json!({
            "id": 1, "name": "group",
            "subRows": [{
                "id": 2, "name": "product",
                "subRows": [
                    {"id": 3, "name": "sku a", "detailData": []},
                    {"id": 4, "name": "sku b", "detailData": [{"k": 1}]},
                    {"id": 5, "name": "sku c"}
                ]
            }]
        })]
    }

    #[test]
    fn empty_detail_at_leaf_depth_yields_task() {
        let rows = forest();
        let task = on_expansion_requested(&rows, "/0/subRows/0/subRows/0", &DetailPolicy::default()).unwrap();
        assert_eq!(task.identifier, "3");
        assert_eq!(task.path.to_string(), "root/0/0-2/0-3");
    }

    #[test]
    fn loaded_detail_needs_no_fetch() {
        let rows = forest();
        let policy = DetailPolicy::default();
        assert!(on_expansion_requested(&rows, "/0/subRows/0/subRows/1", &policy).is_none());
    }

    #[test]
    fn absent_detail_key_yields_task() {
        let rows = forest();
        let task = on_expansion_requested(&rows, "/0/subRows/0/subRows/2", &DetailPolicy::default()).unwrap();
        assert_eq!(task.identifier, "5");

        let bare = vec![json!({"id": 1, "subRows": [{"id": 2, "subRows": [{"id": 3, "name": "sku"}]}]})];
        let task = on_expansion_requested(&bare, "/0/subRows/0/subRows/0", &DetailPolicy::default()).unwrap();
        assert_eq!(task.path.to_string(), "root/0/0-2/0-3");
    }

    #[test]
    fn rows_off_leaf_depth_are_ignored() {
        let mut rows = forest();
        rows[0]["detailData"] = json!([]);
        assert!(on_expansion_requested(&rows, "/0", &DetailPolicy::default()).is_none());
        let root_level = DetailPolicy { leaf_depth: 0, ..DetailPolicy::default() };
        assert!(on_expansion_requested(&rows, "/0", &root_level).is_some());
    }

    #[test]
    fn apply_details_touches_only_target_row() {
        let mut rows = forest();
        let policy = DetailPolicy::default();
        let task = on_expansion_requested(&rows, "/0/subRows/0/subRows/0", &policy).unwrap();
        apply_details(&mut rows, &task, vec![json!({"qty": 9})], &policy.schema).unwrap();

        let skus = &rows[0]["subRows"][0]["subRows"];
        assert_eq!(skus[0]["detailData"], json!([{"qty": 9}]));
        assert_eq!(skus[0]["name"], "sku a");
        assert_eq!(skus[1]["detailData"], json!([{"k": 1}]));
        assert!(skus[2].get("detailData").is_none());
    }

    #[test]
    fn apply_details_rejects_moved_row() {
        let mut rows = forest();
        let policy = DetailPolicy::default();
        let task = on_expansion_requested(&rows, "/0/subRows/0/subRows/0", &policy).unwrap();
        rows[0]["subRows"][0]["subRows"][0]["id"] = json!(99);
        let err = apply_details(&mut rows, &task, vec![], &policy.schema).unwrap_err();
        assert!(matches!(err, FilterError::NodeNotFound(_)));
    }

    #[test]
    fn needs_details_treats_empty_values_as_missing() {
        assert!(needs_details(&json!({"d": null}), "d"));
        assert!(needs_details(&json!({"d": ""}), "d"));
        assert!(needs_details(&json!({"d": {}}), "d"));
        assert!(!needs_details(&json!({"d": [1]}), "d"));
        assert!(needs_details(&json!({}), "d"));
        assert!(!needs_details(&json!({"d": 0}), "d"));
    }

    struct Failing;

    impl DetailSource for Failing {
        async fn fetch_details(&self, identifier: &str) -> Result<Vec<Value>> {
            Err(FilterError::Fetch {
                identifier: identifier.to_string(),
                reason: "503".into(),
            })
        }
    }

    #[tokio::test]
    async fn failed_fetch_resolves_to_empty_records() {
        let loader = DetailLoader::new(Failing, 2);
        let rows = forest();
        let task = on_expansion_requested(&rows, "/0/subRows/0/subRows/0", &DetailPolicy::default()).unwrap();
        assert_eq!(loader.load(&task).await, Some(Vec::new()));
        assert!(!loader.is_loading(&task.path));
    }
}
