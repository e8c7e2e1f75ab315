//! Single-session browser automation over the Chrome DevTools Protocol.
//!
//! The crate owns one browser, one page, and the telemetry that page emits:
//! console output, network request lifecycles, and uncaught script errors,
//! captured into bounded buffers that stay queryable while the page runs
//! arbitrary workloads.
//!
//! # Architecture
//!
//! 1. **Events are data**: raw CDP events decode into [`telemetry::PageEvent`]
//!    values and flow through a single-consumer queue, so buffer mutation is
//!    ordered and confined to one task.
//! 2. **Bounded everything**: each buffer has a fixed cap with head eviction;
//!    a week-long session costs the same memory as a minute-long one.
//! 3. **Explicit lifecycle**: `Idle | Running` state tag, no nullable
//!    handles; `stop` is a barrier and the only reset point.

pub mod cdp;
pub mod error;
pub mod launcher;
pub mod session;
pub mod snapshot;
pub mod telemetry;

pub use cdp::{CdpClient, Page};
pub use error::BrowserError;
pub use session::{Session, SessionConfig, SessionStatus};
pub use telemetry::{ConsoleEntry, NetworkEntry, PageError};
