//! Search filtering for hierarchical row data: prune a forest of rows to the ones matching
//! a term, highlight the matched text, and work out which ancestor rows a grid must expand
//! so every match stays visible.

// Module declarations
pub mod config;
pub mod error;
pub mod file;
pub mod highlight;
pub mod node;
pub mod search;
pub mod state;
pub mod tree;
pub mod types;

pub use config::FilterConfig;
pub use error::{FilterError, Result};
pub use highlight::{highlight, Highlighter};
pub use node::{apply_details, on_expansion_requested, DetailLoader, DetailPolicy, DetailSource};
pub use search::{filter_forest, FilterOptions, MatchEvaluator};
pub use state::{merge_expansion, ExpandOutcome, FilteredView, SearchState, TableState};
pub use tree::{index_forest, TreeIndex, DEFAULT_MAX_DEPTH};
pub use types::{
    ExpansionSet, FetchTask, FilterOutcome, Highlight, NodePath, PathSegment, RowIdScheme, Segment, TreeSchema,
};
