//! Application configuration

use std::env;
use std::str::FromStr;

/// Where chat records are persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres {
        database_url: String,
        max_connections: u32,
        run_migrations: bool,
    },
    /// Process-local store; history is lost on restart
    Memory,
}

/// Which client connections receive agent frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryScope {
    /// Every registered client connection, whatever chat it belongs to
    #[default]
    AllClients,
    /// Only client connections of the agent's chat, and client frames only
    /// reach an agent serving the client's chat
    OwningChat,
}

impl FromStr for DeliveryScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_clients" | "all" => Ok(Self::AllClients),
            "owning_chat" | "chat" => Ok(Self::OwningChat),
            _ => Err(ConfigError::Invalid(
                "AGENT_DELIVERY must be 'all_clients' or 'owning_chat'",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::Invalid("LOG_FORMAT must be 'pretty' or 'json'")),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Persistence
    pub store: StoreBackend,

    // Relay
    pub agent_delivery: DeliveryScope,

    // Logging
    pub log_format: LogFormat,
}

impl Default for Config {
    /// In-memory configuration, used by tests and local experiments
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            store: StoreBackend::Memory,
            agent_delivery: DeliveryScope::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = match env::var("CHAT_STORE")
            .unwrap_or_else(|_| "postgres".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StoreBackend::Postgres {
                database_url: env::var("DATABASE_URL")
                    .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                run_migrations: env::var("RUN_MIGRATIONS")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .unwrap_or(true),
            },
            "memory" => StoreBackend::Memory,
            _ => {
                return Err(ConfigError::Invalid(
                    "CHAT_STORE must be 'postgres' or 'memory'",
                ))
            }
        };

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            store,
            agent_delivery: match env::var("AGENT_DELIVERY") {
                Ok(value) => value.parse()?,
                Err(_) => DeliveryScope::default(),
            },
            log_format: match env::var("LOG_FORMAT") {
                Ok(value) => value.parse()?,
                Err(_) => LogFormat::default(),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "CHAT_STORE",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "RUN_MIGRATIONS",
        "BIND_ADDRESS",
        "AGENT_DELIVERY",
        "LOG_FORMAT",
    ];

    fn cleanup_config() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_postgres_requires_database_url() {
        cleanup_config();

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));

        env::set_var("DATABASE_URL", "postgres://test");
        let config = Config::from_env().unwrap();
        assert_eq!(
            config.store,
            StoreBackend::Postgres {
                database_url: "postgres://test".to_string(),
                max_connections: 5,
                run_migrations: true,
            }
        );
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.agent_delivery, DeliveryScope::AllClients);
        assert_eq!(config.log_format, LogFormat::Pretty);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_memory_store_and_overrides() {
        cleanup_config();
        env::set_var("CHAT_STORE", "memory");
        env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
        env::set_var("AGENT_DELIVERY", "owning_chat");
        env::set_var("LOG_FORMAT", "json");

        let config = Config::from_env().unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.agent_delivery, DeliveryScope::OwningChat);
        assert_eq!(config.log_format, LogFormat::Json);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        cleanup_config();
        env::set_var("CHAT_STORE", "mongo");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        env::set_var("CHAT_STORE", "memory");
        env::set_var("AGENT_DELIVERY", "everyone");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        env::remove_var("AGENT_DELIVERY");
        env::set_var("LOG_FORMAT", "xml");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        cleanup_config();
    }
}
