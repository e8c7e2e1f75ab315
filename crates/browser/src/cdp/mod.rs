//! Chrome DevTools Protocol plumbing: wire types, the WebSocket client,
//! and the page handle the action layer drives.

pub mod client;
pub mod page;
pub mod protocol;

pub use client::{CdpClient, CdpError, EventCallback};
pub use page::Page;
pub use protocol::{CdpEvent, SessionId, TargetId};
