/// Human-readable session summaries derived from the activity log.
use std::collections::HashMap;
use std::path::Path;

use crate::session::ActivityRecord;

/// How many file basenames are listed before collapsing to a count.
const MAX_LISTED_FILES: usize = 5;

/// Build a short description of what the session did, e.g.
/// `3 file edit(s), 2 file read(s) (main.rs, lib.rs)`.
pub fn generate(activities: &[ActivityRecord]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for activity in activities {
        *counts.entry(activity.tool.as_str()).or_default() += 1;
    }

    let edits = counts.get("edit").copied().unwrap_or(0) + counts.get("write").copied().unwrap_or(0);
    let reads = counts.get("read").copied().unwrap_or(0);
    let commands = counts.get("bash").copied().unwrap_or(0);
    let searches = counts.get("glob").copied().unwrap_or(0) + counts.get("grep").copied().unwrap_or(0);

    let mut phrases = Vec::new();
    if edits > 0 {
        phrases.push(format!("{edits} file edit(s)"));
    }
    if reads > 0 {
        phrases.push(format!("{reads} file read(s)"));
    }
    if commands > 0 {
        phrases.push(format!("{commands} command(s)"));
    }
    if searches > 0 {
        phrases.push(format!("{searches} search(es)"));
    }

    let mut description = if phrases.is_empty() {
        format!("{} tool call(s)", activities.len())
    } else {
        phrases.join(", ")
    };

    let files = distinct_basenames(activities);
    if !files.is_empty() {
        if files.len() > MAX_LISTED_FILES {
            description.push_str(&format!(" ({} files)", files.len()));
        } else {
            description.push_str(&format!(" ({})", files.join(", ")));
        }
    }

    description
}

/// Compact per-tool tally, e.g. `edit(3x), read(2x)`. Order follows first
/// appearance in the activity log.
pub fn generate_tool_summary(activities: &[ActivityRecord]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for activity in activities {
        let tool = activity.tool.as_str();
        if !counts.contains_key(tool) {
            order.push(tool);
        }
        *counts.entry(tool).or_default() += 1;
    }

    order
        .iter()
        .map(|tool| format!("{tool}({}x)", counts[tool]))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Distinct basenames of files touched, in first-seen order.
fn distinct_basenames(activities: &[ActivityRecord]) -> Vec<String> {
    let mut seen = Vec::new();
    for activity in activities {
        let Some(file) = &activity.file else { continue };
        let basename = Path::new(file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.clone());
        if !basename.is_empty() && !seen.contains(&basename) {
            seen.push(basename);
        }
    }
    seen
}
