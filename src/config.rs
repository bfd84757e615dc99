use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entity cache capacity; 0 keeps every loaded entity until it is invalidated
    pub capacity: usize,
}

/// Defaults applied by the entity store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Site assigned to new entities created without an explicit site
    pub default_site_guid: i64,
    /// How far up a container chain an edit check may climb
    pub max_container_depth: usize,
    /// Page size used when a query leaves `limit` unset
    pub default_query_limit: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_site_guid: 1,
            max_container_depth: 32,
            default_query_limit: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = StoreConfig::default();
        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:entity_store.db".to_string()),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            cache: CacheConfig {
                capacity: env::var("CACHE_CAPACITY")
                    .unwrap_or_else(|_| "0".to_string())
                    .parse()
                    .unwrap_or(0),
            },
            store: StoreConfig {
                default_site_guid: env::var("DEFAULT_SITE_GUID")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.default_site_guid),
                max_container_depth: env::var("MAX_CONTAINER_DEPTH")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.max_container_depth),
                default_query_limit: env::var("DEFAULT_QUERY_LIMIT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.default_query_limit),
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
