//! Model Context Protocol client support: JSON-RPC framing over
//! stdio/HTTP/SSE transports, the per-server client, and the manager
//! that wires discovered tools into the shared [`crate::tools::ToolRegistry`].

pub mod client;
pub mod registry;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use registry::McpManager;
pub use types::{McpServerStatus, McpToolDef, McpTransportKind};
