use parking_lot::RwLock;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use crate::error::Result;
use crate::node::{apply_details, on_expansion_requested, DetailLoader, DetailPolicy, DetailSource};
use crate::search::{filter_forest, FilterOptions};
use crate::types::{ExpansionSet, FetchTask};

/// Term and searchable fields as the host UI tracks them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchState {
    pub term: String,
    pub fields: Vec<String>,
}

impl SearchState {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            term: String::new(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true when the term actually changed and the view needs recomputing.
    pub fn set_term(&mut self, term: impl Into<String>) -> bool {
        let term = term.into();
        if term == self.term {
            return false;
        }
        self.term = term;
        true
    }
}

/// Filtered rows for one render. `rows` is the table's own snapshot when nothing was filtered.
#[derive(Clone, Debug)]
pub struct FilteredView {
    pub rows: Arc<Vec<Value>>,
    pub expanded: ExpansionSet,
    pub term: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Nothing to fetch: wrong depth, details present, or unknown row.
    Ready,
    /// A fetch for this row is already running.
    AlreadyLoading,
    /// Details fetched and stored; number of records.
    Loaded(usize),
}

/// The table's row data, shared between filtering and detail loading.
pub struct TableState {
    rows: RwLock<Arc<Vec<Value>>>,
    policy: DetailPolicy,
}

impl TableState {
    pub fn new(rows: Vec<Value>, policy: DetailPolicy) -> Self {
        Self {
            rows: RwLock::new(Arc::new(rows)),
            policy,
        }
    }

    pub fn policy(&self) -> &DetailPolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> Arc<Vec<Value>> {
        self.rows.read().clone()
    }

    pub fn replace(&self, rows: Vec<Value>) {
        *self.rows.write() = Arc::new(rows);
    }

    pub fn filtered(&self, search: &SearchState, options: &FilterOptions) -> FilteredView {
        let snapshot = self.snapshot();
        let outcome = filter_forest(&snapshot, &search.term, search.fields.as_slice(), options);
        let rows = match outcome.forest {
            Cow::Borrowed(_) => snapshot.clone(),
            Cow::Owned(rows) => Arc::new(rows),
        };
        FilteredView {
            rows,
            expanded: outcome.expanded,
            term: outcome.term,
        }
    }

    /// Writes fetched details into the current rows. Readers holding an older snapshot
    /// keep seeing it unchanged.
    pub fn apply(&self, task: &FetchTask, records: Vec<Value>) -> Result<()> {
        let mut guard = self.rows.write();
        let rows = Arc::make_mut(&mut guard);
        apply_details(rows, task, records, &self.policy.schema)
    }

    /// Expansion requested for the row at `pointer`: fetch details if the row needs them
    /// and store the result. A row collapsed meanwhile still receives its details.
    pub async fn expand<S: DetailSource>(&self, loader: &DetailLoader<S>, pointer: &str) -> Result<ExpandOutcome> {
        // Limit the read guard's scope so it is released before awaiting
        let task = {
            let rows = self.rows.read();
            on_expansion_requested(&rows, pointer, &self.policy)
        };
        let Some(task) = task else { return Ok(ExpandOutcome::Ready) };
        let Some(records) = loader.load(&task).await else {
            return Ok(ExpandOutcome::AlreadyLoading);
        };
        let count = records.len();
        self.apply(&task, records)?;
        info!(path = %task.path, records = count, "details loaded");
        Ok(ExpandOutcome::Loaded(count))
    }
}

/// Combines manual expansion state with freshly computed automatic entries. Automatic
/// entries only open their own rows; every other manual entry is kept as it was.
pub fn merge_expansion(manual: &BTreeMap<String, bool>, automatic: &BTreeMap<String, bool>) -> BTreeMap<String, bool> {
    let mut merged = manual.clone();
    for (key, open) in automatic {
        if *open {
            merged.insert(key.clone(), true);
        }
    }
    merged
}
