//! Turn a raw idea into a display card.
//!
//! Both derivations here are total: odd input degrades to a fixed
//! placeholder, never to an error.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{CardResult, CardStatus, IdeaRecord};

/// Hook shown when cleaning leaves nothing.
pub const EMPTY_HOOK: &str = "—";
/// Title shown when the generated one is blank.
pub const DEFAULT_TITLE: &str = "Generated Idea";
/// Beats used when the outline has no recognizable labels.
pub const FALLBACK_BEATS: [&str; 3] = ["Hook", "Build", "Payoff"];
/// Most beats kept per card.
pub const MAX_BEATS: usize = 3;

/// `**label**` at the start of a line, label 3 to 80 chars without `*`.
static BOLD_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*([^*]{3,80})\*\*").expect("bold label pattern"));

/// `## ` / `### ` heading prefix.
static HEADING_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{2,3}\s+").expect("heading pattern"));

/// Strip whitespace, then at most one leading and one trailing `"`.
pub fn clean_hook(hook: &str) -> String {
    let trimmed = hook.trim();
    let trimmed = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('"').unwrap_or(trimmed);
    let cleaned = trimmed.trim();
    if cleaned.is_empty() {
        EMPTY_HOOK.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Pull up to three beat labels out of a script outline.
///
/// Bold line labels win over `##`/`###` headings; with neither, the fixed
/// `Hook / Build / Payoff` sequence is returned.
pub fn extract_beats(outline: &str) -> Vec<String> {
    let lines: Vec<&str> = outline.lines().map(str::trim).collect();

    let bold = collect_labels(&lines, |line| {
        BOLD_LABEL
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    });
    if !bold.is_empty() {
        return bold;
    }

    let headings = collect_labels(&lines, |line| {
        if line.starts_with("## ") || line.starts_with("### ") {
            let label = HEADING_PREFIX.replace(line, "").replace("**", "");
            Some(label.trim().to_string())
        } else {
            None
        }
    });
    if !headings.is_empty() {
        return headings;
    }

    FALLBACK_BEATS.iter().map(|b| b.to_string()).collect()
}

/// Run one pass: keep distinct, non-empty labels and stop at the cap.
fn collect_labels<F>(lines: &[&str], label_of: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut labels: Vec<String> = Vec::new();
    for line in lines {
        let Some(label) = label_of(line) else {
            continue;
        };
        if !label.is_empty() && !labels.contains(&label) {
            labels.push(label);
        }
        if labels.len() >= MAX_BEATS {
            break;
        }
    }
    labels
}

/// Assemble the card for the `id`-th idea generated from `themes`.
pub fn build_card(idea: IdeaRecord, id: u64, themes: &[String]) -> CardResult {
    let title = match idea.title.trim() {
        "" => DEFAULT_TITLE.to_string(),
        t => t.to_string(),
    };

    CardResult {
        id,
        title,
        hook: clean_hook(&idea.hook),
        beats: extract_beats(&idea.script_outline),
        rationale: format!("Generated from themes: {}", themes.join(", ")),
        content_md: idea.script_outline,
        tags: idea.tags,
        estimated_length: idea.estimated_length,
        status: CardStatus::Shown,
    }
}
