//! Locate a structured idea inside an untrusted, loosely shaped state value.
//!
//! The search is depth-first over anything that can describe itself as a
//! [`Shape`]. Nodes already visited (by address) are skipped, so shared or
//! cyclic structures terminate. The depth bound sits above serde_json's
//! parse limit, so it only ever trims hand-built trees.

use std::collections::HashSet;

use serde_json::Value;

use crate::model::IdeaRecord;

/// Deepest level the search descends to. Anything `serde_json` parses is
/// shallower than this.
pub const MAX_DEPTH: usize = 256;

/// Fields a record must carry as strings to be accepted.
pub const REQUIRED_FIELDS: [&str; 3] = ["title", "hook", "script_outline"];

/// How a node looks to the search.
pub enum Shape<'a, T: ?Sized> {
    Text(&'a str),
    /// Key/value pairs in the value's natural enumeration order.
    Record(Vec<(&'a str, &'a T)>),
    List(Vec<&'a T>),
    /// Numbers, booleans, null and anything else without children.
    Other,
}

/// A tree-like value the extractor can walk.
pub trait StateTree {
    fn shape(&self) -> Shape<'_, Self>;
}

impl StateTree for Value {
    fn shape(&self) -> Shape<'_, Self> {
        match self {
            Value::String(s) => Shape::Text(s),
            Value::Object(map) => Shape::Record(map.iter().map(|(k, v)| (k.as_str(), v)).collect()),
            Value::Array(items) => Shape::List(items.iter().collect()),
            Value::Null | Value::Bool(_) | Value::Number(_) => Shape::Other,
        }
    }
}

/// Validate a single node as an idea record, without searching below it.
pub fn probe<T: StateTree>(node: &T) -> Option<IdeaRecord> {
    let Shape::Record(fields) = node.shape() else {
        return None;
    };

    let text = |name: &str| {
        fields.iter().find(|(key, _)| *key == name).and_then(|(_, v)| match v.shape() {
            Shape::Text(s) => Some(s.to_string()),
            _ => None,
        })
    };

    let title = text("title")?;
    let hook = text("hook")?;
    let script_outline = text("script_outline")?;

    let tags = fields
        .iter()
        .find(|(key, _)| *key == "tags")
        .map(|(_, v)| match v.shape() {
            Shape::List(items) => items
                .into_iter()
                .filter_map(|item| match item.shape() {
                    Shape::Text(s) => Some(s.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default();

    Some(IdeaRecord {
        title,
        hook,
        script_outline,
        tags,
        estimated_length: text("estimated_length"),
    })
}

/// Find the first idea record anywhere in `root`.
///
/// The first record carrying string `title`, `hook` and `script_outline`
/// wins; nothing below or after it is examined. Returns `None` when no
/// such record exists.
pub fn find_idea<T: StateTree>(root: &T) -> Option<IdeaRecord> {
    let mut seen = HashSet::new();
    search(root, 0, &mut seen)
}

fn search<T: StateTree>(node: &T, depth: usize, seen: &mut HashSet<usize>) -> Option<IdeaRecord> {
    if depth > MAX_DEPTH {
        return None;
    }

    let children: Vec<&T> = match node.shape() {
        Shape::Record(fields) => fields.into_iter().map(|(_, v)| v).collect(),
        Shape::List(items) => items,
        Shape::Text(_) | Shape::Other => return None,
    };

    if !seen.insert(std::ptr::from_ref(node) as *const () as usize) {
        return None;
    }

    if let Some(idea) = probe(node) {
        return Some(idea);
    }

    children
        .into_iter()
        .find_map(|child| search(child, depth + 1, seen))
}

/// Pick the idea out of a `node_complete` state.
///
/// A valid record under `generated_idea` is preferred; otherwise the whole
/// state is searched.
pub fn idea_from_state(state: &Value) -> Option<IdeaRecord> {
    state
        .get("generated_idea")
        .and_then(probe)
        .or_else(|| find_idea(state))
}
