//! API handlers.

pub mod error;
pub mod health;
pub mod mcp;
pub mod sse;
