//! WebSocket relay between support agents and clients
//!
//! # Architecture
//!
//! - **Frame**: Control token detection and outbound frame types
//! - **Connection**: One live socket and its outbound queue
//! - **Registry**: The current agent connection and every client connection
//! - **Relay**: Per-socket read loops that persist, then forward
//! - **Handler**: Axum upgrade handlers for `/ws/agent` and `/ws/client`

pub mod connection;
pub mod frame;
pub mod handler;
pub mod registry;
pub mod relay;

pub use handler::{agent_ws_handler, client_ws_handler};
pub use registry::{ConnectionRegistry, RegistryStats};
pub use relay::{RelayContext, RelayOutcome};
