//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the SSE endpoint.
//! The session infrastructure (Manager, SessionRegistry, heartbeats)
//! lives in the `sse` crate.

pub mod handler;
