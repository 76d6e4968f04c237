//! RelayDesk shared types and persistence
//!
//! This crate contains the chat data model and the persistence gateway used by
//! the relay service.

pub mod db;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use memory::MemoryChatStore;
pub use postgres::PgChatStore;
pub use store::ChatStore;
pub use types::*;
