//! Page telemetry: bounded buffers for console output, network request
//! lifecycles, and uncaught script errors.
//!
//! The store is pure data-structure logic. Raw CDP events are decoded into
//! [`PageEvent`] values by [`PageEvent::from_cdp`]; the session feeds them
//! through a single-consumer queue so mutation happens in arrival order on
//! one task. Queries take the same lock with short critical sections and
//! never touch the page.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Buffer capacities. Insertion beyond a cap evicts exactly one entry from
/// the head, so a long-running page can never grow the store without bound.
pub const CONSOLE_CAP: usize = 500;
pub const NETWORK_CAP: usize = 500;
pub const ERROR_CAP: usize = 200;

/// Where a console message came from, when the engine knows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u64>,
}

/// One console message. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    pub level: String,
    pub text: String,
    pub captured_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
}

/// One network request. Created at request-start; a later response or
/// failure event mutates it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// One uncaught page exception. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// A decoded page event, ready for the recorder.
#[derive(Debug, Clone)]
pub enum PageEvent {
    Console {
        level: String,
        text: String,
        location: Option<SourceLocation>,
    },
    Uncaught {
        message: String,
        name: Option<String>,
        stack: Option<String>,
    },
    RequestWillBeSent {
        /// The engine's per-request id, stable for the request's lifetime.
        engine_id: String,
        method: String,
        url: String,
        resource_type: Option<String>,
    },
    ResponseReceived {
        engine_id: String,
        status: i64,
    },
    LoadingFailed {
        engine_id: String,
        error_text: String,
    },
    FrameNavigated {
        url: String,
    },
}

impl PageEvent {
    /// Decode a raw CDP event into a page event. Methods we do not record,
    /// sub-frame navigations, and malformed payloads yield `None`.
    pub fn from_cdp(method: &str, params: &Value) -> Option<Self> {
        match method {
            "Runtime.consoleAPICalled" => {
                let level = params["type"].as_str().unwrap_or("log").to_string();
                let text = params["args"]
                    .as_array()
                    .map(|args| {
                        args.iter()
                            .map(format_console_arg)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                let location = params["stackTrace"]["callFrames"]
                    .as_array()
                    .and_then(|frames| frames.first())
                    .map(|frame| SourceLocation {
                        url: frame["url"].as_str().map(str::to_string),
                        line: frame["lineNumber"].as_u64(),
                        column: frame["columnNumber"].as_u64(),
                    });
                Some(PageEvent::Console {
                    level,
                    text,
                    location,
                })
            }
            "Runtime.exceptionThrown" => {
                let details = &params["exceptionDetails"];
                let description = details["exception"]["description"].as_str();
                let message = description
                    .map(|d| d.lines().next().unwrap_or(d).to_string())
                    .or_else(|| details["text"].as_str().map(str::to_string))?;
                Some(PageEvent::Uncaught {
                    message,
                    name: details["exception"]["className"]
                        .as_str()
                        .map(str::to_string),
                    stack: description
                        .filter(|d| d.contains('\n'))
                        .map(str::to_string),
                })
            }
            "Network.requestWillBeSent" => Some(PageEvent::RequestWillBeSent {
                engine_id: params["requestId"].as_str()?.to_string(),
                method: params["request"]["method"]
                    .as_str()
                    .unwrap_or("GET")
                    .to_string(),
                url: params["request"]["url"].as_str().unwrap_or("").to_string(),
                resource_type: params["type"].as_str().map(str::to_lowercase),
            }),
            "Network.responseReceived" => Some(PageEvent::ResponseReceived {
                engine_id: params["requestId"].as_str()?.to_string(),
                status: params["response"]["status"].as_i64().unwrap_or(0),
            }),
            "Network.loadingFailed" => Some(PageEvent::LoadingFailed {
                engine_id: params["requestId"].as_str()?.to_string(),
                error_text: params["errorText"]
                    .as_str()
                    .unwrap_or("loading failed")
                    .to_string(),
            }),
            "Page.frameNavigated" => {
                // Only the top frame moves the session's notion of "where
                // the page is"; iframes navigate constantly.
                if params["frame"]["parentId"].is_string() {
                    return None;
                }
                Some(PageEvent::FrameNavigated {
                    url: params["frame"]["url"].as_str()?.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Render one console argument the way a devtools console would.
fn format_console_arg(arg: &Value) -> String {
    match &arg["value"] {
        Value::String(s) => s.clone(),
        Value::Null => {
            if let Some(unserializable) = arg["unserializableValue"].as_str() {
                unserializable.to_string()
            } else if let Some(description) = arg["description"].as_str() {
                description.to_string()
            } else {
                arg["type"].as_str().unwrap_or("undefined").to_string()
            }
        }
        other => other.to_string(),
    }
}

/// The three bounded buffers plus the correlation state that ties network
/// completion events back to their request-start entries.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    console: VecDeque<ConsoleEntry>,
    network: VecDeque<NetworkEntry>,
    errors: VecDeque<PageError>,

    /// Engine request id -> assigned id ("r1", "r2", ...). Never pruned;
    /// lives exactly as long as the session's buffers.
    correlation: HashMap<String, String>,
    /// Assigned ids that have seen neither response nor failure.
    inflight: HashSet<String>,
    next_request_seq: u64,

    /// Last top-frame URL, for the synchronous status view.
    current_url: Option<String>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Called only from the session's pump task, so within
    /// each buffer insertion order is arrival order.
    pub fn record(&mut self, event: PageEvent) {
        match event {
            PageEvent::Console {
                level,
                text,
                location,
            } => {
                push_capped(
                    &mut self.console,
                    ConsoleEntry {
                        level,
                        text,
                        captured_at: Utc::now(),
                        source_location: location,
                    },
                    CONSOLE_CAP,
                );
            }
            PageEvent::Uncaught {
                message,
                name,
                stack,
            } => {
                push_capped(
                    &mut self.errors,
                    PageError {
                        message,
                        name,
                        stack,
                        captured_at: Utc::now(),
                    },
                    ERROR_CAP,
                );
            }
            PageEvent::RequestWillBeSent {
                engine_id,
                method,
                url,
                resource_type,
            } => {
                self.next_request_seq += 1;
                let id = format!("r{}", self.next_request_seq);
                self.correlation.insert(engine_id, id.clone());
                self.inflight.insert(id.clone());
                push_capped(
                    &mut self.network,
                    NetworkEntry {
                        id,
                        captured_at: Utc::now(),
                        method,
                        url,
                        resource_type,
                        status: None,
                        ok: None,
                        failure_reason: None,
                    },
                    NETWORK_CAP,
                );
            }
            PageEvent::ResponseReceived { engine_id, status } => {
                // A miss here is expected steady state under eviction, not
                // a fault: drop without logging.
                let Some(id) = self.correlation.get(&engine_id).cloned() else {
                    return;
                };
                self.inflight.remove(&id);
                if let Some(entry) = self.network.iter_mut().find(|e| e.id == id) {
                    entry.status = Some(status);
                    entry.ok = Some(status == 0 || (200..300).contains(&status));
                }
            }
            PageEvent::LoadingFailed {
                engine_id,
                error_text,
            } => {
                let Some(id) = self.correlation.get(&engine_id).cloned() else {
                    return;
                };
                self.inflight.remove(&id);
                if let Some(entry) = self.network.iter_mut().find(|e| e.id == id) {
                    entry.failure_reason = Some(error_text);
                    entry.ok = Some(false);
                }
            }
            PageEvent::FrameNavigated { url } => {
                self.current_url = Some(url);
            }
        }
    }

    /// Console entries, optionally filtered by exact level. `drain` clears
    /// the whole buffer afterwards regardless of the filter.
    pub fn read_console(&mut self, level: Option<&str>, drain: bool) -> Vec<ConsoleEntry> {
        let entries = self
            .console
            .iter()
            .filter(|e| level.map_or(true, |l| e.level == l))
            .cloned()
            .collect();
        if drain {
            self.console.clear();
        }
        entries
    }

    /// Network entries, optionally filtered by URL substring.
    pub fn read_network(&mut self, filter: Option<&str>, drain: bool) -> Vec<NetworkEntry> {
        let entries = self
            .network
            .iter()
            .filter(|e| filter.map_or(true, |f| e.url.contains(f)))
            .cloned()
            .collect();
        if drain {
            self.network.clear();
        }
        entries
    }

    /// Uncaught errors, unfiltered.
    pub fn read_errors(&mut self, drain: bool) -> Vec<PageError> {
        let entries = self.errors.iter().cloned().collect();
        if drain {
            self.errors.clear();
        }
        entries
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.console.len(), self.network.len(), self.errors.len())
    }

    /// Requests still awaiting a response or failure.
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    pub fn current_url(&self) -> Option<String> {
        self.current_url.clone()
    }

    /// Reset everything: buffers, correlation state, the id sequence, and
    /// the tracked URL. Called exactly once per session, on stop.
    pub fn clear(&mut self) {
        self.console.clear();
        self.network.clear();
        self.errors.clear();
        self.correlation.clear();
        self.inflight.clear();
        self.next_request_seq = 0;
        self.current_url = None;
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, entry: T, cap: usize) {
    buffer.push_back(entry);
    if buffer.len() > cap {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn console_event(level: &str, text: &str) -> PageEvent {
        PageEvent::Console {
            level: level.to_string(),
            text: text.to_string(),
            location: None,
        }
    }

    fn request_event(engine_id: &str, url: &str) -> PageEvent {
        PageEvent::RequestWillBeSent {
            engine_id: engine_id.to_string(),
            method: "GET".to_string(),
            url: url.to_string(),
            resource_type: Some("fetch".to_string()),
        }
    }

    #[test]
    fn console_buffer_keeps_last_cap_entries_in_order() {
        let mut store = TelemetryStore::new();
        for i in 0..CONSOLE_CAP + 20 {
            store.record(console_event("log", &format!("line {}", i)));
        }

        let entries = store.read_console(None, false);
        assert_eq!(entries.len(), CONSOLE_CAP);
        assert_eq!(entries[0].text, "line 20");
        assert_eq!(entries.last().unwrap().text, format!("line {}", CONSOLE_CAP + 19));
    }

    #[test]
    fn error_buffer_caps_at_its_own_limit() {
        let mut store = TelemetryStore::new();
        for i in 0..ERROR_CAP + 5 {
            store.record(PageEvent::Uncaught {
                message: format!("boom {}", i),
                name: None,
                stack: None,
            });
        }

        let entries = store.read_errors(false);
        assert_eq!(entries.len(), ERROR_CAP);
        assert_eq!(entries[0].message, "boom 5");
    }

    #[test]
    fn network_buffer_evicts_oldest_but_keeps_ids_monotonic() {
        let mut store = TelemetryStore::new();
        for i in 0..NETWORK_CAP + 3 {
            store.record(request_event(&format!("e{}", i), "https://x.test/"));
        }

        let entries = store.read_network(None, false);
        assert_eq!(entries.len(), NETWORK_CAP);
        assert_eq!(entries[0].id, "r4");
        assert_eq!(entries.last().unwrap().id, format!("r{}", NETWORK_CAP + 3));
    }

    #[test]
    fn response_mutates_exactly_the_matching_entry() {
        let mut store = TelemetryStore::new();
        for i in 1..=6 {
            store.record(request_event(&format!("e{}", i), "https://x.test/poll"));
        }

        store.record(PageEvent::ResponseReceived {
            engine_id: "e5".to_string(),
            status: 200,
        });

        let entries = store.read_network(None, false);
        for entry in &entries {
            if entry.id == "r5" {
                assert_eq!(entry.status, Some(200));
                assert_eq!(entry.ok, Some(true));
            } else {
                assert_eq!(entry.status, None, "entry {} was mutated", entry.id);
                assert_eq!(entry.ok, None);
            }
        }
    }

    #[test]
    fn completion_for_unknown_request_is_dropped_silently() {
        let mut store = TelemetryStore::new();
        store.record(PageEvent::LoadingFailed {
            engine_id: "never-started".to_string(),
            error_text: "net::ERR_ABORTED".to_string(),
        });
        store.record(PageEvent::ResponseReceived {
            engine_id: "also-unknown".to_string(),
            status: 200,
        });

        assert!(store.read_network(None, false).is_empty());
    }

    #[test]
    fn failure_marks_entry_not_ok() {
        let mut store = TelemetryStore::new();
        store.record(request_event("e1", "https://x.test/api/login"));
        store.record(PageEvent::LoadingFailed {
            engine_id: "e1".to_string(),
            error_text: "net::ERR_CONNECTION_REFUSED".to_string(),
        });

        let entries = store.read_network(None, false);
        assert_eq!(entries[0].ok, Some(false));
        assert_eq!(
            entries[0].failure_reason.as_deref(),
            Some("net::ERR_CONNECTION_REFUSED")
        );
        assert_eq!(store.inflight_count(), 0);
    }

    #[test]
    fn failure_then_response_is_last_writer_wins() {
        // A request aborted after headers may see both events; the later
        // one wins per field, by design.
        let mut store = TelemetryStore::new();
        store.record(request_event("e1", "https://x.test/"));
        store.record(PageEvent::LoadingFailed {
            engine_id: "e1".to_string(),
            error_text: "net::ERR_ABORTED".to_string(),
        });
        store.record(PageEvent::ResponseReceived {
            engine_id: "e1".to_string(),
            status: 200,
        });

        let entry = &store.read_network(None, false)[0];
        assert_eq!(entry.status, Some(200));
        assert_eq!(entry.ok, Some(true));
        assert_eq!(entry.failure_reason.as_deref(), Some("net::ERR_ABORTED"));
    }

    #[test]
    fn non_success_status_is_recorded_but_not_ok() {
        let mut store = TelemetryStore::new();
        store.record(request_event("e1", "https://x.test/missing"));
        store.record(PageEvent::ResponseReceived {
            engine_id: "e1".to_string(),
            status: 404,
        });

        let entry = &store.read_network(None, false)[0];
        assert_eq!(entry.status, Some(404));
        assert_eq!(entry.ok, Some(false));
    }

    #[test]
    fn level_filter_is_exact_and_preserves_order() {
        let mut store = TelemetryStore::new();
        store.record(console_event("error", "first"));
        store.record(console_event("log", "noise"));
        store.record(console_event("error", "second"));
        store.record(console_event("Error", "wrong case"));

        let errors = store.read_console(Some("error"), false);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].text, "first");
        assert_eq!(errors[1].text, "second");

        // Filtering alone never mutates.
        assert_eq!(store.read_console(None, false).len(), 4);
    }

    #[test]
    fn drain_clears_the_whole_buffer_even_when_filtered() {
        let mut store = TelemetryStore::new();
        store.record(console_event("error", "kept?"));
        store.record(console_event("log", "also gone"));

        let drained = store.read_console(Some("error"), true);
        assert_eq!(drained.len(), 1);
        assert!(store.read_console(None, false).is_empty());
    }

    #[test]
    fn network_filter_is_substring_containment() {
        let mut store = TelemetryStore::new();
        store.record(request_event("e1", "https://x.test/api/login"));
        store.record(request_event("e2", "https://x.test/home"));

        let matched = store.read_network(Some("api/"), false);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].url, "https://x.test/api/login");
    }

    #[test]
    fn clear_resets_buffers_and_id_sequence() {
        let mut store = TelemetryStore::new();
        store.record(request_event("e1", "https://x.test/"));
        store.record(console_event("log", "hello"));
        store.record(PageEvent::FrameNavigated {
            url: "https://x.test/".to_string(),
        });

        store.clear();
        assert_eq!(store.counts(), (0, 0, 0));
        assert_eq!(store.current_url(), None);

        store.record(request_event("e-new", "https://x.test/"));
        assert_eq!(store.read_network(None, false)[0].id, "r1");
    }

    #[test]
    fn correlation_survives_buffer_eviction_without_orphans() {
        let mut store = TelemetryStore::new();
        store.record(request_event("early", "https://x.test/early"));
        for i in 0..NETWORK_CAP {
            store.record(request_event(&format!("e{}", i), "https://x.test/"));
        }
        // "early" has been evicted; its completion must not resurrect it.
        store.record(PageEvent::ResponseReceived {
            engine_id: "early".to_string(),
            status: 200,
        });

        let entries = store.read_network(None, false);
        assert_eq!(entries.len(), NETWORK_CAP);
        assert!(entries.iter().all(|e| e.id != "r1"));
    }

    #[test]
    fn sub_frame_navigation_is_ignored() {
        let params = json!({
            "frame": { "id": "F2", "parentId": "F1", "url": "https://ads.test/" }
        });
        assert!(PageEvent::from_cdp("Page.frameNavigated", &params).is_none());

        let top = json!({ "frame": { "id": "F1", "url": "https://x.test/" } });
        let event = PageEvent::from_cdp("Page.frameNavigated", &top).unwrap();
        let mut store = TelemetryStore::new();
        store.record(event);
        assert_eq!(store.current_url().as_deref(), Some("https://x.test/"));
    }

    #[test]
    fn console_event_decodes_args_and_location() {
        let params = json!({
            "type": "warning",
            "args": [
                { "type": "string", "value": "count:" },
                { "type": "number", "value": 3 },
                { "type": "object", "description": "Object" }
            ],
            "stackTrace": {
                "callFrames": [
                    { "url": "https://x.test/app.js", "lineNumber": 10, "columnNumber": 4 }
                ]
            }
        });

        let event = PageEvent::from_cdp("Runtime.consoleAPICalled", &params).unwrap();
        match event {
            PageEvent::Console {
                level,
                text,
                location,
            } => {
                assert_eq!(level, "warning");
                assert_eq!(text, "count: 3 Object");
                let location = location.unwrap();
                assert_eq!(location.url.as_deref(), Some("https://x.test/app.js"));
                assert_eq!(location.line, Some(10));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn exception_event_splits_message_and_stack() {
        let params = json!({
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": {
                    "className": "TypeError",
                    "description": "TypeError: x is not a function\n    at https://x.test/app.js:3:1"
                }
            }
        });

        let event = PageEvent::from_cdp("Runtime.exceptionThrown", &params).unwrap();
        match event {
            PageEvent::Uncaught {
                message,
                name,
                stack,
            } => {
                assert_eq!(message, "TypeError: x is not a function");
                assert_eq!(name.as_deref(), Some("TypeError"));
                assert!(stack.unwrap().contains("app.js:3:1"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn request_event_lowercases_resource_type() {
        let params = json!({
            "requestId": "1000.2",
            "type": "XHR",
            "request": { "url": "https://x.test/api", "method": "POST" }
        });

        let event = PageEvent::from_cdp("Network.requestWillBeSent", &params).unwrap();
        match event {
            PageEvent::RequestWillBeSent {
                engine_id,
                method,
                resource_type,
                ..
            } => {
                assert_eq!(engine_id, "1000.2");
                assert_eq!(method, "POST");
                assert_eq!(resource_type.as_deref(), Some("xhr"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn unknown_methods_decode_to_none() {
        assert!(PageEvent::from_cdp("Page.loadEventFired", &json!({})).is_none());
    }
}
