//! Application state shared by every handler

use relaydesk_shared::ChatStore;
use std::sync::Arc;

use crate::{
    chat::ChatQueryService,
    config::Config,
    websocket::{ConnectionRegistry, RelayContext},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    /// Live sockets, one registry per process
    pub registry: ConnectionRegistry,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ChatStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            registry: ConnectionRegistry::new(),
        }
    }

    pub fn relay_context(&self) -> RelayContext {
        RelayContext {
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
            delivery: self.config.agent_delivery,
        }
    }

    pub fn queries(&self) -> ChatQueryService {
        ChatQueryService::new(Arc::clone(&self.store))
    }
}
