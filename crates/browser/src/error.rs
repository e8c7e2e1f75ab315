//! Error taxonomy for the browser crate.

use thiserror::Error;

use crate::cdp::CdpError;

#[derive(Debug, Error)]
pub enum BrowserError {
    /// `start` while a session is active. The running session is untouched.
    #[error("browser already running")]
    AlreadyRunning,

    /// A page operation with no active session.
    #[error("browser not running; call browser_start first")]
    NotRunning,

    /// A bounded wait exceeded its deadline. Never retried automatically.
    #[error("timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Page script threw during evaluation.
    #[error("script error: {0}")]
    Script(String),

    #[error("chrome executable not found; pass --chrome-path or install Chromium")]
    ChromeNotFound,

    #[error("failed to launch chrome: {0}")]
    LaunchFailed(String),

    #[error(transparent)]
    Cdp(#[from] CdpError),
}
