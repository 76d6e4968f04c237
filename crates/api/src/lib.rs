//! RelayDesk API Library
//!
//! Realtime relay between support agents and clients, plus the read-only
//! chat endpoints.

pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
