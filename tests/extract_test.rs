//! Tests for locating idea records in backend state.

use std::cell::OnceCell;
use std::rc::Rc;

use scripter_rs::extract::{MAX_DEPTH, Shape, StateTree, find_idea, idea_from_state, probe};
use serde_json::{Value, json};

fn idea(title: &str) -> Value {
    json!({
        "title": title,
        "hook": "A hook",
        "script_outline": "**Beat one**\nbody",
    })
}

// ---------------------------------------------------------------------------
// probe
// ---------------------------------------------------------------------------

#[test]
fn probe_reads_optional_fields_leniently() {
    let record = probe(&json!({
        "title": "T",
        "hook": "H",
        "script_outline": "O",
        "tags": ["a", 1, null, "b"],
        "estimated_length": 30,
    }))
    .unwrap();

    assert_eq!(record.title, "T");
    assert_eq!(record.tags, vec!["a", "b"]);
    assert_eq!(record.estimated_length, None);
}

#[test]
fn probe_rejects_non_string_required_field() {
    assert!(probe(&json!({"title": 5, "hook": "H", "script_outline": "O"})).is_none());
    assert!(probe(&json!({"title": "T", "hook": "H"})).is_none());
    assert!(probe(&json!("title")).is_none());
}

#[test]
fn tags_that_are_not_a_list_become_empty() {
    let mut value = idea("T");
    value["tags"] = json!("fitness");
    assert!(probe(&value).unwrap().tags.is_empty());
}

// ---------------------------------------------------------------------------
// find_idea
// ---------------------------------------------------------------------------

#[test]
fn finds_record_buried_in_clutter() {
    let state = json!({
        "messages": ["hello", {"role": "ai", "content": "..."}],
        "meta": {"step": 3, "flags": [true, false, null]},
        "result": {"attempts": [{"draft": {"payload": idea("Deep")}}]},
    });
    assert_eq!(find_idea(&state).unwrap().title, "Deep");
}

#[test]
fn first_match_in_depth_first_order_wins() {
    let state = json!({
        "a": {"nested": idea("First")},
        "b": idea("Second"),
    });
    assert_eq!(find_idea(&state).unwrap().title, "First");
}

#[test]
fn enclosing_record_wins_over_nested_one() {
    let mut outer = idea("Outer");
    outer["child"] = idea("Inner");
    assert_eq!(find_idea(&json!({"x": outer})).unwrap().title, "Outer");
}

#[test]
fn searches_inside_arrays() {
    let state = json!({"items": [1, "two", [null, idea("In a list")]]});
    assert_eq!(find_idea(&state).unwrap().title, "In a list");
}

#[test]
fn nothing_found() {
    assert!(find_idea(&json!({"a": {"title": "T", "hook": "H"}})).is_none());
    assert!(find_idea(&json!(null)).is_none());
    assert!(find_idea(&json!("text")).is_none());
}

#[test]
fn finds_record_in_deeply_nested_parsed_state() {
    let levels = 100;
    let raw = format!(
        "{}{}{}",
        r#"{"inner":"#.repeat(levels),
        r#"{"title":"Bottom","hook":"h","script_outline":"o"}"#,
        "}".repeat(levels)
    );
    let state: Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(find_idea(&state).unwrap().title, "Bottom");
    assert_eq!(idea_from_state(&state).unwrap().title, "Bottom");
}

#[test]
fn depth_bound_only_trims_hand_built_trees() {
    let nest = |levels: usize| {
        let mut value = idea("Bottom");
        for _ in 0..levels {
            value = json!({"inner": value});
        }
        value
    };

    assert!(find_idea(&nest(MAX_DEPTH)).is_some());
    assert!(find_idea(&nest(MAX_DEPTH + 1)).is_none());
}

// ---------------------------------------------------------------------------
// idea_from_state
// ---------------------------------------------------------------------------

#[test]
fn prefers_generated_idea_key() {
    let state = json!({"a": idea("Elsewhere"), "generated_idea": idea("Preferred")});
    assert_eq!(idea_from_state(&state).unwrap().title, "Preferred");
}

#[test]
fn falls_back_to_search_when_generated_idea_is_invalid() {
    let state = json!({
        "generated_idea": {"title": "Half"},
        "z": {"wrapped": idea("Found")},
    });
    assert_eq!(idea_from_state(&state).unwrap().title, "Found");
}

// ---------------------------------------------------------------------------
// Cycles
// ---------------------------------------------------------------------------

/// A graph node that may reference itself through shared pointers.
struct Node {
    text: Option<String>,
    fields: OnceCell<Vec<(&'static str, Rc<Node>)>>,
}

impl Node {
    fn record() -> Rc<Self> {
        Rc::new(Self {
            text: None,
            fields: OnceCell::new(),
        })
    }

    fn text(s: &str) -> Rc<Self> {
        Rc::new(Self {
            text: Some(s.to_string()),
            fields: OnceCell::new(),
        })
    }

    fn set(&self, fields: Vec<(&'static str, Rc<Node>)>) {
        let _ = self.fields.set(fields);
    }
}

impl StateTree for Node {
    fn shape(&self) -> Shape<'_, Self> {
        if let Some(ref text) = self.text {
            return Shape::Text(text);
        }
        match self.fields.get() {
            Some(fields) => Shape::Record(fields.iter().map(|(k, v)| (*k, v.as_ref())).collect()),
            None => Shape::Other,
        }
    }
}

#[test]
fn cyclic_graph_without_idea_terminates() {
    let a = Node::record();
    let b = Node::record();
    a.set(vec![("next", Rc::clone(&b)), ("self", Rc::clone(&a))]);
    b.set(vec![("back", Rc::clone(&a))]);

    assert!(find_idea(a.as_ref()).is_none());
}

#[test]
fn cyclic_graph_still_yields_reachable_idea() {
    let a = Node::record();
    let b = Node::record();
    let found = Node::record();
    found.set(vec![
        ("title", Node::text("Loop")),
        ("hook", Node::text("H")),
        ("script_outline", Node::text("O")),
    ]);
    a.set(vec![("next", Rc::clone(&b))]);
    b.set(vec![("back", Rc::clone(&a)), ("idea", found)]);

    assert_eq!(find_idea(a.as_ref()).unwrap().title, "Loop");
}
