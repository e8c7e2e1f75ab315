//! The tool catalog: static metadata, one entry per wire-level tool name.

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn no_args() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn selector_arg(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "selector": { "type": "string", "description": description }
        },
        "required": ["selector"]
    })
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "browser_start",
            description: "Start a browser session. Must be called before other browser tools.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "headless": {
                        "type": "boolean",
                        "description": "Run browser in headless mode (default: true)",
                        "default": true
                    }
                }
            }),
        },
        ToolDefinition {
            name: "browser_stop",
            description: "Stop the browser session and clear all buffers.",
            input_schema: no_args(),
        },
        ToolDefinition {
            name: "browser_status",
            description: "Get current browser session status including URL and buffer counts.",
            input_schema: no_args(),
        },
        ToolDefinition {
            name: "browser_navigate",
            description: "Navigate to a URL. Waits for DOM content to load.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "The URL to navigate to" }
                },
                "required": ["url"]
            }),
        },
        ToolDefinition {
            name: "browser_click",
            description: "Click an element by CSS selector.",
            input_schema: selector_arg("CSS selector for the element to click"),
        },
        ToolDefinition {
            name: "browser_fill",
            description: "Fill an input field with text. Clears existing content first.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector for the input field" },
                    "value": { "type": "string", "description": "Text to fill in the field" }
                },
                "required": ["selector", "value"]
            }),
        },
        ToolDefinition {
            name: "browser_select",
            description: "Select an option from a dropdown.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector for the select element" },
                    "value": { "type": "string", "description": "Value or label of the option to select" }
                },
                "required": ["selector", "value"]
            }),
        },
        ToolDefinition {
            name: "browser_type",
            description: "Type text using keyboard. Does not clear existing content.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to type" }
                },
                "required": ["text"]
            }),
        },
        ToolDefinition {
            name: "browser_press",
            description: "Press a keyboard key (e.g., Enter, Tab, Escape, ArrowDown).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string", "description": "Key to press (e.g., Enter, Tab, Escape)" }
                },
                "required": ["key"]
            }),
        },
        ToolDefinition {
            name: "browser_hover",
            description: "Hover over an element.",
            input_schema: selector_arg("CSS selector for the element to hover"),
        },
        ToolDefinition {
            name: "browser_screenshot",
            description: "Take a screenshot of the current page. Returns base64 PNG.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "fullPage": {
                        "type": "boolean",
                        "description": "Capture full scrollable page (default: false)",
                        "default": false
                    }
                }
            }),
        },
        ToolDefinition {
            name: "browser_snapshot",
            description: "Get accessibility tree snapshot. Useful for understanding page structure without vision.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "maxChars": {
                        "type": "number",
                        "description": "Maximum characters to return (default: 8000)",
                        "default": 8000
                    }
                }
            }),
        },
        ToolDefinition {
            name: "browser_console",
            description: "Get console log messages from the page.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "level": {
                        "type": "string",
                        "description": "Filter by log level (log, warn, error, info)"
                    },
                    "clear": {
                        "type": "boolean",
                        "description": "Clear buffer after reading (default: false)",
                        "default": false
                    }
                }
            }),
        },
        ToolDefinition {
            name: "browser_requests",
            description: "Get network requests made by the page.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filter": {
                        "type": "string",
                        "description": "Filter URLs containing this string"
                    },
                    "clear": {
                        "type": "boolean",
                        "description": "Clear buffer after reading (default: false)",
                        "default": false
                    }
                }
            }),
        },
        ToolDefinition {
            name: "browser_errors",
            description: "Get JavaScript errors from the page.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "clear": {
                        "type": "boolean",
                        "description": "Clear buffer after reading (default: false)",
                        "default": false
                    }
                }
            }),
        },
        ToolDefinition {
            name: "browser_evaluate",
            description: "Execute JavaScript in the page context.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "script": { "type": "string", "description": "JavaScript code to execute" }
                },
                "required": ["script"]
            }),
        },
        ToolDefinition {
            name: "browser_wait",
            description: "Wait for an element to appear.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector to wait for" },
                    "timeout": {
                        "type": "number",
                        "description": "Timeout in milliseconds (default: 30000)",
                        "default": 30000
                    }
                },
                "required": ["selector"]
            }),
        },
        ToolDefinition {
            name: "browser_wait_network",
            description: "Wait for network activity to settle.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "timeout": {
                        "type": "number",
                        "description": "Timeout in milliseconds (default: 30000)",
                        "default": 30000
                    }
                }
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_has_the_full_tool_surface() {
        let definitions = tool_definitions();
        assert_eq!(definitions.len(), 18);

        let names: HashSet<&str> = definitions.iter().map(|d| d.name).collect();
        assert_eq!(names.len(), definitions.len(), "duplicate tool name");
        for expected in [
            "browser_start",
            "browser_stop",
            "browser_status",
            "browser_navigate",
            "browser_click",
            "browser_fill",
            "browser_select",
            "browser_type",
            "browser_press",
            "browser_hover",
            "browser_screenshot",
            "browser_snapshot",
            "browser_console",
            "browser_requests",
            "browser_errors",
            "browser_evaluate",
            "browser_wait",
            "browser_wait_network",
        ] {
            assert!(names.contains(expected), "missing {}", expected);
        }
    }

    #[test]
    fn every_schema_is_an_object_schema() {
        for definition in tool_definitions() {
            assert_eq!(
                definition.input_schema["type"], "object",
                "{} schema is not an object",
                definition.name
            );
            assert!(
                definition.input_schema["properties"].is_object(),
                "{} schema has no properties table",
                definition.name
            );
        }
    }

    #[test]
    fn definitions_serialize_with_camel_case_schema_key() {
        let value = serde_json::to_value(tool_definitions()).unwrap();
        assert!(value[0].get("inputSchema").is_some());
        assert!(value[0].get("input_schema").is_none());
    }
}
