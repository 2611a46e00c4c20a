use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, warn};
use crate::types::{NodePath, TreeSchema};

/// Recursion guard for malformed or absurdly deep input.
pub const DEFAULT_MAX_DEPTH: usize = 100;

// JSON Pointer token escape (~0, ~1)
pub fn escape_pointer_token(raw: &str) -> String {
    raw.replace('~', "~0").replace('/', "~1")
}

pub fn root_pointer(index: usize) -> String {
    format!("/{}", index)
}

pub fn child_pointer(parent_ptr: &str, children_key: &str, index: usize) -> String {
    format!("{}/{}/{}", parent_ptr, escape_pointer_token(children_key), index)
}

/// Identifier as a string. Non-empty strings and numbers qualify; anything else does not.
pub fn identifier_of(node: &Value, schema: &TreeSchema) -> Option<String> {
    match node.get(&schema.id_key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Child rows, or an empty slice when the child list is missing or not an array.
pub fn children_of<'a>(node: &'a Value, schema: &TreeSchema) -> &'a [Value] {
    match node.get(&schema.children_key) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// String form of a searchable field. Null, missing and container values yield None.
pub fn field_text<'a>(node: &'a Value, field: &str) -> Option<Cow<'a, str>> {
    match node.get(field)? {
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn split_root(pointer: &str) -> Option<(usize, Option<&str>)> {
    let rest = pointer.strip_prefix('/')?;
    let (first, tail) = match rest.split_once('/') {
        Some((first, tail)) => (first, Some(tail)),
        None => (rest, None),
    };
    Some((first.parse().ok()?, tail))
}

/// Resolves a forest pointer such as `/0/subRows/3`.
pub fn resolve<'a>(forest: &'a [Value], pointer: &str) -> Option<&'a Value> {
    let (index, tail) = split_root(pointer)?;
    let root = forest.get(index)?;
    match tail {
        Some(tail) => root.pointer(&format!("/{}", tail)),
        None => Some(root),
    }
}

pub fn resolve_mut<'a>(forest: &'a mut [Value], pointer: &str) -> Option<&'a mut Value> {
    let (index, tail) = split_root(pointer)?;
    let root = forest.get_mut(index)?;
    match tail {
        Some(tail) => root.pointer_mut(&format!("/{}", tail)),
        None => Some(root),
    }
}

/// Resolves a forest pointer together with its structural path. Only pointers that step
/// through the children key, with an identifier on every row passed, resolve.
pub fn locate<'a>(forest: &'a [Value], pointer: &str, schema: &TreeSchema) -> Option<(NodePath, &'a Value)> {
    let (root_index, tail) = split_root(pointer)?;
    let mut node = forest.get(root_index)?;
    let mut path = NodePath::root(root_index, identifier_of(node, schema)?);

    if let Some(tail) = tail {
        let children_token = escape_pointer_token(&schema.children_key);
        let tokens: Vec<&str> = tail.split('/').collect();
        if tokens.len() % 2 != 0 {
            return None;
        }
        for pair in tokens.chunks(2) {
            if pair[0] != children_token {
                return None;
            }
            let index: usize = pair[1].parse().ok()?;
            node = children_of(node, schema).get(index)?;
            path = path.child(index, identifier_of(node, schema)?);
        }
    }
    Some((path, node))
}

/// Parent links and pointer-to-path lookup for one forest.
#[derive(Debug, Default)]
pub struct TreeIndex {
    parent_of: HashMap<NodePath, NodePath>,
    path_of: HashMap<String, NodePath>,
    truncated: usize,
}

impl TreeIndex {
    pub fn parent(&self, path: &NodePath) -> Option<&NodePath> {
        self.parent_of.get(path)
    }

    pub fn path_of(&self, pointer: &str) -> Option<&NodePath> {
        self.path_of.get(pointer)
    }

    /// Parent, grandparent, ... up to the root row.
    pub fn ancestors<'a>(&'a self, path: &NodePath) -> impl Iterator<Item = &'a NodePath> + 'a {
        std::iter::successors(self.parent(path), move |p| self.parent(p))
    }

    /// Number of indexed nodes.
    pub fn len(&self) -> usize {
        self.path_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_of.is_empty()
    }

    /// Branches whose children were not visited because of the depth bound.
    pub fn truncated(&self) -> usize {
        self.truncated
    }
}

/// Walks the forest depth-first assigning structural paths. Rows without an identifier
/// (and their subtrees) are left out. Descent stops below `max_depth`.
pub fn index_forest(forest: &[Value], schema: &TreeSchema, max_depth: usize) -> TreeIndex {
    let mut index = TreeIndex::default();
    index_level(forest, None, 0, schema, max_depth, &mut index);
    if index.truncated > 0 {
        warn!(branches = index.truncated, max_depth, "depth bound reached, deeper rows ignored");
    }
    debug!(nodes = index.len(), "indexed forest");
    index
}

fn index_level(
    items: &[Value],
    parent: Option<(&str, &NodePath)>,
    depth: usize,
    schema: &TreeSchema,
    max_depth: usize,
    index: &mut TreeIndex,
) {
    for (i, item) in items.iter().enumerate() {
        if !item.is_object() {
            continue;
        }
        let Some(id) = identifier_of(item, schema) else { continue };

        let (pointer, path) = match parent {
            Some((parent_ptr, parent_path)) => {
                (child_pointer(parent_ptr, &schema.children_key, i), parent_path.child(i, id))
            }
            None => (root_pointer(i), NodePath::root(i, id)),
        };

        if let Some((_, parent_path)) = parent {
            index.parent_of.insert(path.clone(), parent_path.clone());
        }
        index.path_of.insert(pointer.clone(), path.clone());

        let children = children_of(item, schema);
        if children.is_empty() {
            continue;
        }
        if depth < max_depth {
            index_level(children, Some((&pointer, &path)), depth + 1, schema, max_depth, index);
        } else {
            index.truncated += 1;
        }
    }
}
