//! Tool surface for the browser session: catalog, dispatch, and the
//! JSON-RPC stdio server that exposes both.

pub mod definitions;
pub mod dispatch;
pub mod protocol;
pub mod server;

pub use definitions::{tool_definitions, ToolDefinition};
pub use dispatch::{call_tool, ToolError};
pub use server::run;
