//! Server configuration types
//!
//! Library sections (`pool`, `queue`, `worker`, `pipeline`) deserialize
//! straight into the core crate's config structs.

use sensemaker_core::{PipelineConfig, PoolConfig, QueueConfig, WorkerConfig};
use sensemaker_llm::EndpointConfig;
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Agent that reduces candidate answers
    pub summarizer: EndpointConfig,
    /// Agent that derives search terms; expansion searches the raw query without one
    #[serde(default)]
    pub searcher: Option<EndpointConfig>,
    /// Pool members
    #[serde(default)]
    pub members: Vec<EndpointConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            redis: RedisConfig::default(),
            database: DatabaseConfig::default(),
            pool: PoolConfig::default(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            pipeline: PipelineConfig::default(),
            summarizer: EndpointConfig::new("summarizer"),
            searcher: None,
            members: Vec::new(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3045
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL; empty keeps the queue in memory
    #[serde(default)]
    pub url: String,
}

/// Message database configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; empty keeps conversations in memory
    #[serde(default)]
    pub path: String,
}
