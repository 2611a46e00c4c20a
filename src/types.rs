use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Record keys used to read rows. Defaults follow the grid's row shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSchema {
    pub id_key: String,
    pub children_key: String,
    pub detail_key: String,
}

impl Default for TreeSchema {
    fn default() -> Self {
        Self {
            id_key: "id".into(),
            children_key: "subRows".into(),
            detail_key: "detailData".into(),
        }
    }
}

/// One step from a parent to a child: position among siblings plus the child's identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathSegment {
    pub index: usize,
    pub identifier: String,
}

/// Structural key of a node. Unique even when identifiers repeat across branches.
///
/// Renders as `root/<index>` for a root row and `<parent>/<index>-<identifier>` below it.
/// Ordering follows document order because segments compare by index first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<PathSegment>);

impl NodePath {
    pub fn root(index: usize, identifier: impl Into<String>) -> Self {
        NodePath(vec![PathSegment { index, identifier: identifier.into() }])
    }

    pub fn child(&self, index: usize, identifier: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment { index, identifier: identifier.into() });
        NodePath(segments)
    }

    /// Zero for root rows.
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    pub fn identifier(&self) -> Option<&str> {
        self.last().map(|s| s.identifier.as_str())
    }

    /// `<index>-<identifier>` of every segment joined by `-`, e.g. `0-a-0-42`. Unique for
    /// distinct paths as long as identifiers contain no `-`.
    pub fn composite_key(&self) -> String {
        self.0
            .iter()
            .map(|seg| format!("{}-{}", seg.index, seg.identifier))
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segments = self.0.iter();
        if let Some(first) = segments.next() {
            write!(f, "root/{}", first.index)?;
        }
        for seg in segments {
            write!(f, "/{}-{}", seg.index, seg.identifier)?;
        }
        Ok(())
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A piece of highlighted text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum Segment {
    Plain(String),
    Match(String),
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Plain(s) | Segment::Match(s) => s,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Segment::Match(_))
    }
}

/// Output of the highlighter. `Unchanged` and a segment list without matches both mean
/// "nothing to highlight"; consumers should treat them alike.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Highlight {
    Unchanged(String),
    Segments(Vec<Segment>),
}

impl Highlight {
    pub fn is_highlighted(&self) -> bool {
        match self {
            Highlight::Unchanged(_) => false,
            Highlight::Segments(segments) => segments.iter().any(Segment::is_match),
        }
    }

    /// Reassembles the source text from either form.
    pub fn plain_text(&self) -> Cow<'_, str> {
        match self {
            Highlight::Unchanged(s) => Cow::Borrowed(s),
            Highlight::Segments(segments) => Cow::Owned(segments.iter().map(Segment::text).collect()),
        }
    }

    pub fn matched(&self) -> Vec<&str> {
        match self {
            Highlight::Unchanged(_) => Vec::new(),
            Highlight::Segments(segments) => segments
                .iter()
                .filter(|s| s.is_match())
                .map(Segment::text)
                .collect(),
        }
    }
}

/// Row-identity scheme the consuming grid keys its expanded state by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowIdScheme {
    /// Rendered structural path.
    Path,
    /// Identifier of the row alone. Collides when identifiers repeat.
    Identifier,
    /// `<index>-<identifier>` pairs of the row and all its ancestors, root first.
    #[default]
    Composite,
}

impl FromStr for RowIdScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(RowIdScheme::Path),
            "identifier" | "id" => Ok(RowIdScheme::Identifier),
            "composite" => Ok(RowIdScheme::Composite),
            other => Err(format!("unknown row id scheme: {other} (expected path, identifier or composite)")),
        }
    }
}

/// Paths that must render open so every match stays visible.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExpansionSet(BTreeSet<NodePath>);

impl ExpansionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the path was already present.
    pub fn insert(&mut self, path: NodePath) -> bool {
        self.0.insert(path)
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.0.contains(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodePath> {
        self.0.iter()
    }

    /// Translates paths into the keys a grid expects, each mapped to `true`.
    pub fn to_row_ids(&self, scheme: RowIdScheme) -> BTreeMap<String, bool> {
        self.0
            .iter()
            .filter_map(|path| {
                let last = path.last()?;
                let key = match scheme {
                    RowIdScheme::Path => path.to_string(),
                    RowIdScheme::Identifier => last.identifier.clone(),
                    RowIdScheme::Composite => path.composite_key(),
                };
                Some((key, true))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ExpansionSet {
    type Item = &'a NodePath;
    type IntoIter = std::collections::btree_set::Iter<'a, NodePath>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Result of one filter pass, handed to the grid for a single render.
#[derive(Debug, Serialize)]
pub struct FilterOutcome<'a> {
    pub forest: Cow<'a, [Value]>,
    pub expanded: ExpansionSet,
    pub term: String,
}

impl FilterOutcome<'_> {
    /// True when the source forest was passed through untouched (blank term).
    pub fn is_passthrough(&self) -> bool {
        matches!(self.forest, Cow::Borrowed(_))
    }
}

/// A detail fetch the host must perform for a freshly expanded row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchTask {
    pub pointer: String,
    pub path: NodePath,
    pub identifier: String,
}
