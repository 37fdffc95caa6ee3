//! AquaMind API crate - axum HTTP server, route handlers, SSE streaming.
//!
//! Exposes the conversational sessions to the dashboard: role catalog,
//! chat history, turns, voice capture and a live event stream per session.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
