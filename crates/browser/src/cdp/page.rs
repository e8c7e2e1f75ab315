//! Page handle bound to one attached target.
//!
//! All automation primitives the tool surface needs live here: navigation,
//! DOM-addressed input, script evaluation, screenshots, bounded waits. The
//! handle shares the browser connection; it holds no page state of its own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::client::{CdpClient, CdpError};
use super::protocol::{SessionId, TargetId};
use crate::error::BrowserError;

/// How often bounded waits re-check their condition.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single attached page.
pub struct Page {
    client: Arc<CdpClient>,
    pub target_id: TargetId,
    pub session_id: SessionId,
}

impl Page {
    /// Create a page target and attach to it.
    pub async fn create(client: Arc<CdpClient>) -> Result<Self, BrowserError> {
        let result = client
            .send(
                "Target.createTarget",
                Some(json!({ "url": "about:blank" })),
                None,
            )
            .await?;
        let target_id = result["targetId"]
            .as_str()
            .ok_or(CdpError::UnexpectedReply("targetId"))?
            .to_string();

        let result = client
            .send(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
                None,
            )
            .await?;
        let session_id = result["sessionId"]
            .as_str()
            .ok_or(CdpError::UnexpectedReply("sessionId"))?
            .to_string();

        let page = Self {
            client,
            target_id,
            session_id,
        };
        page.enable_domains().await?;
        Ok(page)
    }

    /// Enable the domains every session needs, in parallel.
    async fn enable_domains(&self) -> Result<(), BrowserError> {
        let futures: Vec<_> = ["Page", "DOM", "Runtime", "Network"]
            .into_iter()
            .map(|domain| self.send(format!("{}.enable", domain), None))
            .collect();

        for result in futures_util::future::join_all(futures).await {
            result?;
        }
        Ok(())
    }

    /// Send a command within this page's session.
    pub async fn send(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<Value, BrowserError> {
        Ok(self
            .client
            .send(method, params, Some(self.session_id.clone()))
            .await?)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Navigate and wait for the document to become interactive.
    pub async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<(), BrowserError> {
        url::Url::parse(url).map_err(|e| BrowserError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let result = self.send("Page.navigate", Some(json!({ "url": url }))).await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            return Err(BrowserError::NavigationFailed(error_text.to_string()));
        }

        self.wait_for_load(timeout_ms).await
    }

    /// Poll `document.readyState` until the page is usable.
    pub async fn wait_for_load(&self, timeout_ms: u64) -> Result<(), BrowserError> {
        let start = Instant::now();
        loop {
            let state = self.evaluate("document.readyState").await?;
            if matches!(state.as_str(), Some("complete") | Some("interactive")) {
                return Ok(());
            }
            if start.elapsed() >= Duration::from_millis(timeout_ms) {
                return Err(BrowserError::Timeout {
                    what: "page load".to_string(),
                    timeout_ms,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn url(&self) -> Result<String, BrowserError> {
        let value = self.evaluate("window.location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub async fn title(&self) -> Result<String, BrowserError> {
        let value = self.evaluate("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    // ------------------------------------------------------------------
    // Script evaluation
    // ------------------------------------------------------------------

    /// Evaluate an expression and return its value. A throwing script is a
    /// `Script` error carrying the exception text.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .send(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            return Err(BrowserError::Script(exception_text(details)));
        }

        Ok(result["result"]["value"].clone())
    }

    // ------------------------------------------------------------------
    // Selector-addressed input
    // ------------------------------------------------------------------

    /// Click the center of the element matching `selector`.
    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let (x, y) = self.element_center(selector).await?;
        self.mouse_button("mousePressed", x, y).await?;
        self.mouse_button("mouseReleased", x, y).await?;
        Ok(())
    }

    /// Move the pointer over the element matching `selector`.
    pub async fn hover(&self, selector: &str) -> Result<(), BrowserError> {
        let (x, y) = self.element_center(selector).await?;
        self.send(
            "Input.dispatchMouseEvent",
            Some(json!({ "type": "mouseMoved", "x": x, "y": y })),
        )
        .await?;
        Ok(())
    }

    /// Replace the value of the input matching `selector`.
    pub async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let node_id = self.require_node(selector).await?;
        self.send("DOM.focus", Some(json!({ "nodeId": node_id })))
            .await?;
        // Select existing content so the insert replaces it.
        self.key_event("keyDown", "a", 2).await?;
        self.key_event("keyUp", "a", 2).await?;
        self.type_text(value).await
    }

    /// Select an option of the `<select>` matching `selector` by value or
    /// label, firing the events a real selection fires.
    pub async fn select_option(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return "no-element";
                const wanted = {value};
                const option = Array.from(el.options)
                    .find(o => o.value === wanted || o.label === wanted || o.text === wanted);
                if (!option) return "no-option";
                el.value = option.value;
                el.dispatchEvent(new Event("input", {{ bubbles: true }}));
                el.dispatchEvent(new Event("change", {{ bubbles: true }}));
                return "ok";
            }})()"#,
            selector = Value::String(selector.to_string()),
            value = Value::String(value.to_string()),
        );

        match self.evaluate(&script).await?.as_str() {
            Some("ok") => Ok(()),
            Some("no-option") => Err(BrowserError::ElementNotFound(format!(
                "option {:?} in {}",
                value, selector
            ))),
            _ => Err(BrowserError::ElementNotFound(selector.to_string())),
        }
    }

    /// Type into whatever currently has focus. Does not clear.
    pub async fn type_text(&self, text: &str) -> Result<(), BrowserError> {
        self.send("Input.insertText", Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    /// Press a single named key (Enter, Tab, Escape, ArrowDown, ...).
    pub async fn press(&self, key: &str) -> Result<(), BrowserError> {
        self.key_event("keyDown", key, 0).await?;
        self.key_event("keyUp", key, 0).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    /// PNG screenshot, base64 as the engine returns it.
    pub async fn screenshot(&self, full_page: bool) -> Result<String, BrowserError> {
        let result = self
            .send(
                "Page.captureScreenshot",
                Some(json!({ "format": "png", "captureBeyondViewport": full_page })),
            )
            .await?;
        result["data"]
            .as_str()
            .map(str::to_string)
            .ok_or(BrowserError::Cdp(CdpError::UnexpectedReply("data")))
    }

    /// Full accessibility tree, raw nodes.
    pub async fn accessibility_tree(&self) -> Result<Value, BrowserError> {
        self.send("Accessibility.enable", None).await?;
        let result = self.send("Accessibility.getFullAXTree", None).await?;
        Ok(result["nodes"].clone())
    }

    /// Visible text of the page body.
    pub async fn inner_text(&self) -> Result<String, BrowserError> {
        let value = self
            .evaluate("document.body ? document.body.innerText : \"\"")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    // ------------------------------------------------------------------
    // Bounded waits
    // ------------------------------------------------------------------

    /// Wait for `selector` to match, failing with `Timeout` at the deadline.
    pub async fn wait_for_selector(
        &self,
        selector: &str,
        timeout_ms: u64,
    ) -> Result<(), BrowserError> {
        let start = Instant::now();
        loop {
            if self.query_selector(selector).await?.is_some() {
                return Ok(());
            }
            if start.elapsed() >= Duration::from_millis(timeout_ms) {
                return Err(BrowserError::Timeout {
                    what: format!("selector {:?}", selector),
                    timeout_ms,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    // ------------------------------------------------------------------
    // DOM helpers
    // ------------------------------------------------------------------

    async fn query_selector(&self, selector: &str) -> Result<Option<i64>, BrowserError> {
        let doc = self
            .send("DOM.getDocument", Some(json!({ "depth": 0 })))
            .await?;
        let root_id = doc["root"]["nodeId"].as_i64().unwrap_or_default();

        let result = self
            .send(
                "DOM.querySelector",
                Some(json!({ "nodeId": root_id, "selector": selector })),
            )
            .await?;

        match result["nodeId"].as_i64() {
            Some(0) | None => Ok(None),
            Some(node_id) => Ok(Some(node_id)),
        }
    }

    async fn require_node(&self, selector: &str) -> Result<i64, BrowserError> {
        self.query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()))
    }

    /// Center of the element's content box. An element without layout is
    /// reported as not found rather than clicked at (0, 0).
    async fn element_center(&self, selector: &str) -> Result<(f64, f64), BrowserError> {
        let node_id = self.require_node(selector).await?;
        let result = match self
            .send("DOM.getBoxModel", Some(json!({ "nodeId": node_id })))
            .await
        {
            Ok(result) => result,
            // The engine reports "no layout object" as a protocol error.
            Err(BrowserError::Cdp(CdpError::Protocol { .. })) => {
                return Err(BrowserError::ElementNotFound(format!(
                    "{} (not visible)",
                    selector
                )))
            }
            Err(e) => return Err(e),
        };

        let quad: Vec<f64> = result["model"]["content"]
            .as_array()
            .map(|values| values.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        if quad.len() < 8 {
            return Err(BrowserError::ElementNotFound(format!(
                "{} (not visible)",
                selector
            )));
        }
        Ok(quad_center(&quad))
    }

    async fn mouse_button(&self, kind: &str, x: f64, y: f64) -> Result<(), BrowserError> {
        self.send(
            "Input.dispatchMouseEvent",
            Some(json!({
                "type": kind,
                "x": x,
                "y": y,
                "button": "left",
                "clickCount": 1,
            })),
        )
        .await?;
        Ok(())
    }

    async fn key_event(&self, kind: &str, key: &str, modifiers: i64) -> Result<(), BrowserError> {
        self.send(
            "Input.dispatchKeyEvent",
            Some(json!({ "type": kind, "key": key, "modifiers": modifiers })),
        )
        .await?;
        Ok(())
    }
}

fn quad_center(quad: &[f64]) -> (f64, f64) {
    let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
    let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;
    (x, y)
}

/// Human-readable text for a `Runtime` exception.
fn exception_text(details: &Value) -> String {
    if let Some(description) = details["exception"]["description"].as_str() {
        return description.to_string();
    }
    if let Some(text) = details["text"].as_str() {
        return text.to_string();
    }
    "unknown script error".to_string()
}
