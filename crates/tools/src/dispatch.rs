//! Maps wire-level tool calls onto the browser session.
//!
//! Thin by design: argument extraction, defaults, and the documented success
//! payload per tool. Everything interesting happens in the browser crate.

use browser::{snapshot, BrowserError, Session};
use serde_json::{json, Value};
use thiserror::Error;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SNAPSHOT_CHARS: usize = 8_000;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("{tool}: missing or invalid argument \"{argument}\"")]
    InvalidArgs { tool: String, argument: &'static str },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

fn require_str<'a>(args: &'a Value, tool: &str, key: &'static str) -> Result<&'a str, ToolError> {
    args[key].as_str().ok_or_else(|| ToolError::InvalidArgs {
        tool: tool.to_string(),
        argument: key,
    })
}

fn opt_bool(args: &Value, key: &str, default: bool) -> bool {
    args[key].as_bool().unwrap_or(default)
}

fn opt_u64(args: &Value, key: &str, default: u64) -> u64 {
    args[key].as_u64().unwrap_or(default)
}

/// Execute one tool call and build its success payload.
pub async fn call_tool(session: &Session, name: &str, args: &Value) -> Result<Value, ToolError> {
    match name {
        "browser_start" => {
            let headless = opt_bool(args, "headless", true);
            session.start(headless).await?;
            Ok(json!({ "status": "started", "headless": headless }))
        }

        "browser_stop" => {
            session.stop().await?;
            Ok(json!({ "status": "stopped" }))
        }

        "browser_status" => Ok(serde_json::to_value(session.status())
            .unwrap_or_else(|_| json!({ "running": false }))),

        "browser_navigate" => {
            let url = require_str(args, name, "url")?;
            let page = session.page()?;
            page.navigate(url, DEFAULT_TIMEOUT_MS).await?;
            Ok(json!({ "url": page.url().await?, "title": page.title().await? }))
        }

        "browser_click" => {
            let selector = require_str(args, name, "selector")?;
            session.page()?.click(selector).await?;
            Ok(json!({ "clicked": selector }))
        }

        "browser_fill" => {
            let selector = require_str(args, name, "selector")?;
            let value = require_str(args, name, "value")?;
            session.page()?.fill(selector, value).await?;
            Ok(json!({ "filled": selector, "value": value }))
        }

        "browser_select" => {
            let selector = require_str(args, name, "selector")?;
            let value = require_str(args, name, "value")?;
            session.page()?.select_option(selector, value).await?;
            Ok(json!({ "selected": selector, "value": value }))
        }

        "browser_type" => {
            let text = require_str(args, name, "text")?;
            session.page()?.type_text(text).await?;
            Ok(json!({ "typed": text }))
        }

        "browser_press" => {
            let key = require_str(args, name, "key")?;
            session.page()?.press(key).await?;
            Ok(json!({ "pressed": key }))
        }

        "browser_hover" => {
            let selector = require_str(args, name, "selector")?;
            session.page()?.hover(selector).await?;
            Ok(json!({ "hovered": selector }))
        }

        "browser_screenshot" => {
            let full_page = opt_bool(args, "fullPage", false);
            let base64 = session.page()?.screenshot(full_page).await?;
            Ok(json!({ "type": "image", "format": "png", "base64": base64 }))
        }

        "browser_snapshot" => {
            let max_chars = opt_u64(args, "maxChars", DEFAULT_SNAPSHOT_CHARS as u64) as usize;
            let page = session.page()?;
            Ok(Value::String(snapshot::capture(&page, max_chars).await?))
        }

        "browser_console" => {
            let level = args["level"].as_str();
            let clear = opt_bool(args, "clear", false);
            let entries = session.read_console(level, clear);
            Ok(json!({ "count": entries.len(), "entries": entries }))
        }

        "browser_requests" => {
            let filter = args["filter"].as_str();
            let clear = opt_bool(args, "clear", false);
            let entries = session.read_network(filter, clear);
            Ok(json!({ "count": entries.len(), "entries": entries }))
        }

        "browser_errors" => {
            let clear = opt_bool(args, "clear", false);
            let entries = session.read_errors(clear);
            Ok(json!({ "count": entries.len(), "entries": entries }))
        }

        "browser_evaluate" => {
            let script = require_str(args, name, "script")?;
            let result = session.page()?.evaluate(script).await?;
            Ok(json!({ "result": result }))
        }

        "browser_wait" => {
            let selector = require_str(args, name, "selector")?;
            let timeout = opt_u64(args, "timeout", DEFAULT_TIMEOUT_MS);
            session.page()?.wait_for_selector(selector, timeout).await?;
            Ok(json!({ "waited": selector }))
        }

        "browser_wait_network" => {
            let timeout = opt_u64(args, "timeout", DEFAULT_TIMEOUT_MS);
            session.wait_for_network_idle(timeout).await?;
            Ok(json!({ "status": "network idle" }))
        }

        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}
