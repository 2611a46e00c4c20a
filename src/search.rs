use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::debug;
use crate::highlight::Highlighter;
use crate::tree::{child_pointer, children_of, field_text, index_forest, root_pointer, TreeIndex, DEFAULT_MAX_DEPTH};
use crate::types::{ExpansionSet, FilterOutcome, NodePath, TreeSchema};

#[derive(Clone, Debug)]
pub struct FilterOptions {
    pub schema: TreeSchema,
    pub max_depth: usize,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            schema: TreeSchema::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Decides per node whether it or anything below it matches, memoized by structural path.
/// Records which paths must be expanded along the way.
pub struct MatchEvaluator<'a> {
    index: &'a TreeIndex,
    schema: &'a TreeSchema,
    fields: &'a [String],
    matcher: Highlighter,
    cache: HashMap<NodePath, bool>,
    expanded: ExpansionSet,
}

impl<'a> MatchEvaluator<'a> {
    pub fn new(index: &'a TreeIndex, schema: &'a TreeSchema, fields: &'a [String], term: &str) -> Self {
        Self {
            index,
            schema,
            fields,
            matcher: Highlighter::new(term),
            cache: HashMap::new(),
            expanded: ExpansionSet::new(),
        }
    }

    /// Case-insensitive substring match against any searchable field. Uses the same
    /// matcher that later highlights the row, so a kept row always shows its match.
    pub fn matches_directly(&self, node: &Value) -> bool {
        self.fields
            .iter()
            .any(|field| field_text(node, field).is_some_and(|text| self.matcher.is_match(&text)))
    }

    /// True iff the node at `pointer` matches directly or through a descendant.
    /// Rows that were not indexed (null, no identifier, past the depth bound) never match.
    pub fn matches(&mut self, node: &Value, pointer: &str) -> bool {
        if !node.is_object() {
            return false;
        }
        let index = self.index;
        let schema = self.schema;
        let Some(path) = index.path_of(pointer) else { return false };
        if let Some(&hit) = self.cache.get(path) {
            return hit;
        }

        let direct = self.matches_directly(node);

        // no short-circuit: every matching descendant has to record its expansion
        let mut descendant = false;
        for (i, child) in children_of(node, schema).iter().enumerate() {
            let child_ptr = child_pointer(pointer, &schema.children_key, i);
            descendant |= self.matches(child, &child_ptr);
        }

        if descendant {
            self.expand_with_ancestors(path);
        }

        let result = direct || descendant;
        self.cache.insert(path.clone(), result);
        result
    }

    pub fn cached(&self, path: &NodePath) -> Option<bool> {
        self.cache.get(path).copied()
    }

    pub fn into_expanded(self) -> ExpansionSet {
        self.expanded
    }

    fn expand_with_ancestors(&mut self, path: &NodePath) {
        if !self.expanded.insert(path.clone()) {
            return;
        }
        let index = self.index;
        for ancestor in index.ancestors(path) {
            // an ancestor already present brought its own chain with it
            if !self.expanded.insert(ancestor.clone()) {
                break;
            }
        }
    }
}

/// Prunes the forest to matching rows and their ancestors, highlighting matched fields.
///
/// A blank term hands back the input slice untouched with nothing expanded. Otherwise the
/// result is a fresh forest; the source rows are never modified.
pub fn filter_forest<'a, S: AsRef<str>>(
    forest: &'a [Value],
    term: &str,
    fields: &[S],
    options: &FilterOptions,
) -> FilterOutcome<'a> {
    if term.trim().is_empty() {
        return FilterOutcome {
            forest: Cow::Borrowed(forest),
            expanded: ExpansionSet::new(),
            term: term.to_string(),
        };
    }

    let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
    let index = index_forest(forest, &options.schema, options.max_depth);
    let mut evaluator = MatchEvaluator::new(&index, &options.schema, &fields, term);

    let filtered = filter_level(forest, None, &mut evaluator);
    let expanded = evaluator.into_expanded();
    debug!(
        term,
        indexed = index.len(),
        roots_kept = filtered.len(),
        expanded = expanded.len(),
        "filtered forest"
    );

    FilterOutcome {
        forest: Cow::Owned(filtered),
        expanded,
        term: term.to_string(),
    }
}

fn filter_level(
    items: &[Value],
    parent_ptr: Option<&str>,
    evaluator: &mut MatchEvaluator<'_>,
) -> Vec<Value> {
    let schema = evaluator.schema;
    let mut kept = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let pointer = match parent_ptr {
            Some(p) => child_pointer(p, &schema.children_key, i),
            None => root_pointer(i),
        };
        if !evaluator.matches(item, &pointer) {
            continue;
        }
        let Value::Object(map) = item else { continue };

        let mut copy = Map::with_capacity(map.len());
        for (key, value) in map {
            if *key == schema.children_key {
                continue;
            }
            copy.insert(key.clone(), value.clone());
        }

        for field in evaluator.fields {
            let Some(text) = field_text(item, field) else { continue };
            let highlighted = evaluator.matcher.highlight(Some(&*text));
            // unmatched fields keep their original value and type
            if !highlighted.is_highlighted() {
                continue;
            }
            if let Ok(value) = serde_json::to_value(&highlighted) {
                copy.insert(field.clone(), value);
            }
        }

        match map.get(&schema.children_key) {
            Some(Value::Array(children)) => {
                let children = filter_level(children, Some(&pointer), evaluator);
                copy.insert(schema.children_key.clone(), Value::Array(children));
            }
            Some(other) => {
                copy.insert(schema.children_key.clone(), other.clone());
            }
            None => {}
        }

        kept.push(Value::Object(copy));
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluate(forest: &[Value], term: &str) -> (Vec<bool>, ExpansionSet) {
        let schema = TreeSchema::default();
        let fields = vec!["name".to_string()];
        let index = index_forest(forest, &schema, DEFAULT_MAX_DEPTH);
        let mut evaluator = MatchEvaluator::new(&index, &schema, &fields, term);
        let hits = forest
            .iter()
            .enumerate()
            .map(|(i, node)| evaluator.matches(node, &root_pointer(i)))
            .collect();
        (hits, evaluator.into_expanded())
    }

    #[test]
    fn direct_match_alone_does_not_expand() {
        let forest = vec![json!({"id": 1, "name": "alpha", "subRows": [{"id": 2, "name": "beta"}]})];
        let (hits, expanded) = evaluate(&forest, "alp");
        assert_eq!(hits, vec![true]);
        assert!(expanded.is_empty());
    }

    #[test]
    fn matching_descendant_expands_whole_chain() {
        let forest = vec![json!({
            "id": 1, "name": "root",
            "subRows": [{"id": 2, "name": "mid", "subRows": [{"id": 3, "name": "needle"}]}]
        })];
        let (hits, expanded) = evaluate(&forest, "needle");
        assert_eq!(hits, vec![true]);
        let rendered: Vec<String> = expanded.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["root/0", "root/0/0-2"]);
    }

    #[test]
    fn every_matching_branch_is_recorded() {
        let forest = vec![json!({
            "id": 1, "name": "root",
            "subRows": [
                {"id": 2, "name": "x", "subRows": [{"id": 3, "name": "hit one"}]},
                {"id": 4, "name": "y", "subRows": [{"id": 5, "name": "hit two"}]}
            ]
        })];
        let (_, expanded) = evaluate(&forest, "hit");
        assert!(expanded.contains(&NodePath::root(0, "1").child(0, "2")));
        assert!(expanded.contains(&NodePath::root(0, "1").child(1, "4")));
        assert_eq!(expanded.len(), 3);
    }

    #[test]
    fn malformed_rows_never_match() {
        let forest = vec![Value::Null, json!("text"), json!({"name": "no id but matching"})];
        let (hits, expanded) = evaluate(&forest, "matching");
        assert_eq!(hits, vec![false, false, false]);
        assert!(expanded.is_empty());
    }

    #[test]
    fn cache_is_keyed_by_path_not_identifier() {
        let forest = vec![
            json!({"id": "a", "name": "a", "subRows": [{"id": "42", "name": "found"}]}),
            json!({"id": "b", "name": "b", "subRows": [{"id": "42", "name": "other"}]}),
        ];
        let schema = TreeSchema::default();
        let fields = vec!["name".to_string()];
        let index = index_forest(&forest, &schema, DEFAULT_MAX_DEPTH);
        let mut evaluator = MatchEvaluator::new(&index, &schema, &fields, "found");
        assert!(evaluator.matches(&forest[0], "/0"));
        assert!(!evaluator.matches(&forest[1], "/1"));
        assert_eq!(evaluator.cached(&NodePath::root(0, "a").child(0, "42")), Some(true));
        assert_eq!(evaluator.cached(&NodePath::root(1, "b").child(0, "42")), Some(false));
    }

    #[test]
    fn every_kept_leaf_carries_a_highlight() {
        let forest = vec![
            json!({"id": 1, "name": "i\u{307}zmir"}),
            json!({"id": 2, "name": "\u{130}zmir"}),
            json!({"id": 3, "name": "KELVIN \u{212A}"}),
            json!({"id": 4, "name": "stra\u{df}e"}),
            json!({"id": 5, "name": "STRASSE"}),
        ];
        for term in ["\u{130}", "i", "k", "\u{df}", "ss", "ZMIR"] {
            let outcome = filter_forest(&forest, term, &["name"], &FilterOptions::default());
            for row in outcome.forest.iter() {
                assert!(row["name"].is_array(), "row {} kept for {term:?} without a highlight", row["id"]);
            }
        }
    }

    #[test]
    fn numeric_fields_match_by_string_form() {
        let forest = vec![json!({"id": 1, "name": 12345})];
        let (hits, _) = evaluate(&forest, "234");
        assert_eq!(hits, vec![true]);
    }

    #[test]
    fn filter_keeps_parent_with_empty_children_on_direct_match() {
        let forest = vec![json!({"id": 1, "name": "Acme", "subRows": [{"id": 2, "name": "other"}]})];
        let outcome = filter_forest(&forest, "acme", &["name"], &FilterOptions::default());
        assert_eq!(outcome.forest.len(), 1);
        assert_eq!(outcome.forest[0]["subRows"], json!([]));
        assert_eq!(outcome.forest[0]["name"], json!([{"kind": "match", "text": "Acme"}]));
    }

    #[test]
    fn filter_leaves_unmatched_fields_as_they_were() {
        let forest = vec![json!({
            "id": 1, "name": "parent", "code": 7,
            "subRows": [{"id": 2, "name": "kid match"}]
        })];
        let outcome = filter_forest(&forest, "match", &["name", "code"], &FilterOptions::default());
        assert_eq!(outcome.forest[0]["name"], "parent");
        assert_eq!(outcome.forest[0]["code"], 7);
    }

    #[test]
    fn filter_preserves_non_searchable_properties() {
        let forest = vec![json!({"id": 1, "name": "zed", "detailData": [], "extra": {"k": "v"}})];
        let outcome = filter_forest(&forest, "zed", &["name"], &FilterOptions::default());
        assert_eq!(outcome.forest[0]["extra"], json!({"k": "v"}));
        assert_eq!(outcome.forest[0]["detailData"], json!([]));
        assert_eq!(outcome.forest[0]["id"], 1);
    }

    #[test]
    fn custom_schema_keys_are_honoured() {
        let forest = vec![json!({"key": "p", "title": "top", "items": [{"key": "c", "title": "inner"}]})];
        let options = FilterOptions {
            schema: TreeSchema {
                id_key: "key".into(),
                children_key: "items".into(),
                detail_key: "details".into(),
            },
            max_depth: DEFAULT_MAX_DEPTH,
        };
        let outcome = filter_forest(&forest, "inner", &["title"], &options);
        assert_eq!(outcome.forest.len(), 1);
        assert_eq!(outcome.forest[0]["items"].as_array().map(Vec::len), Some(1));
        assert!(outcome.expanded.contains(&NodePath::root(0, "p")));
    }
}
