//! MCP (Model Context Protocol) client.
//!
//! One [`session::McpSession`] per configured server: spawn the server
//! process (stdio transport), perform the initialize handshake, discover its
//! tool catalogue, and dispatch `tools/call` requests. Sessions are owned by
//! the pack that opened them and closed with it.

pub mod protocol;
pub mod session;
pub mod transport;

pub use protocol::McpToolDef;
pub use session::{McpError, McpSession};
