//! API module for HTTP endpoints
//!
//! This module exposes the audit query surface as a read-only JSON API.

pub mod http;
pub mod rest;
pub mod state;

pub use http::create_router;
pub use state::AppState;
