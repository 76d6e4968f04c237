//! Chat lifecycle and read-side lookups

pub mod query;
pub mod session;

pub use query::ChatQueryService;
