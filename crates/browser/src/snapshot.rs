//! Accessibility snapshot: the page rendered as an indented role/name
//! outline, sized for an agent's context window.
//!
//! Best effort only. When the accessibility tree is unavailable the visible
//! body text stands in; either way the result is truncated to `max_chars`.

use std::collections::HashMap;

use serde_json::Value;

use crate::cdp::Page;
use crate::error::BrowserError;

const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Capture a snapshot of the page's current accessibility structure.
pub async fn capture(page: &Page, max_chars: usize) -> Result<String, BrowserError> {
    match page.accessibility_tree().await {
        Ok(nodes) => {
            let outline = render_outline(&nodes);
            if outline.trim().is_empty() {
                Ok("[No accessibility tree available]".to_string())
            } else {
                Ok(truncate(outline, max_chars))
            }
        }
        Err(e) => {
            tracing::debug!("accessibility tree unavailable, using body text: {}", e);
            let text = page.inner_text().await?;
            Ok(truncate(text, max_chars))
        }
    }
}

/// Render the raw AX node list as one line per interesting node.
fn render_outline(nodes: &Value) -> String {
    let Some(nodes) = nodes.as_array() else {
        return String::new();
    };

    let by_id: HashMap<&str, &Value> = nodes
        .iter()
        .filter_map(|node| node["nodeId"].as_str().map(|id| (id, node)))
        .collect();

    // The root is the one node nobody claims as a child.
    let root = nodes
        .iter()
        .find(|node| node["parentId"].as_str().is_none())
        .or_else(|| nodes.first());

    let mut out = String::new();
    if let Some(root) = root {
        write_node(root, &by_id, 0, &mut out);
    }
    out
}

fn write_node(node: &Value, by_id: &HashMap<&str, &Value>, depth: usize, out: &mut String) {
    // Runaway trees exist in the wild; cut off rather than recurse forever.
    if depth > 64 {
        return;
    }

    let ignored = node["ignored"].as_bool().unwrap_or(false);
    let child_depth = if ignored {
        depth
    } else {
        let role = node["role"]["value"].as_str().unwrap_or("unknown");
        let name = node["name"]["value"].as_str().unwrap_or("");
        out.push_str(&"  ".repeat(depth));
        out.push_str(role);
        if !name.is_empty() {
            out.push_str(&format!(" {:?}", name));
        }
        out.push('\n');
        depth + 1
    };

    if let Some(child_ids) = node["childIds"].as_array() {
        for child_id in child_ids.iter().filter_map(Value::as_str) {
            if let Some(child) = by_id.get(child_id) {
                write_node(child, by_id, child_depth, out);
            }
        }
    }
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}
