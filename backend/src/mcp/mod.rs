//! MCP (Model Context Protocol) server support.
//!
//! The Streamable HTTP transport (protocol 2025-03-26) is the primary
//! surface: sessions, an in-memory event log for resumable SSE streams, and
//! per-session request serialization. The legacy SSE and stdio transports
//! share the same [`McpHandler`].
//!
//! ## Endpoints
//!
//! - `POST /mcp` - Send JSON-RPC requests
//! - `GET /mcp` - Open or resume an SSE stream
//! - `DELETE /mcp` - Terminate session
//!
//! ## Session Management
//!
//! Sessions are identified by the `Mcp-Session-Id` header, assigned during
//! initialization and required for subsequent requests.

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event_store;
pub mod handler;
pub mod legacy_sse;
pub mod protocol;
pub mod session;
pub mod sse_stream;
pub mod stdio;
pub mod transport;

pub use context::McpContext;
pub use dispatcher::{CallToolResult, DispatchError, ToolCall, ToolDescriptor, ToolDispatcher};
pub use error::McpError;
pub use event_store::InMemoryEventStore;
pub use handler::{McpHandler, ServerIdentity};
pub use legacy_sse::SseSessionManager;
pub use session::SessionRegistry;
pub use transport::{StreamTransport, TransportState};
