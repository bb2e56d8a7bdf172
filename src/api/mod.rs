//! HTTP API module
//!
//! This module provides the HTTP server and its endpoints including:
//! - REST routes for profiles, config generation and catalogs
//! - The `/hub` WebSocket upgrade
//! - Trace id middleware and error response formatting

pub mod server;
pub mod routes;
pub mod middleware;
pub mod handlers;
pub mod models;

pub use server::{ApiServer, ServerControl, ServerExit};
pub use middleware::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
