//! Server module for Sensemaker
//!
//! Contains the main server initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for all server components
//! - `loader`: Configuration loading from files and environment
//! - `handlers`: Queue methods and worker jobs
//! - `services`: Pool, queue, worker and pipeline wiring
//! - `init`: Main server initialization and run loop

pub mod config;
pub mod handlers;
mod init;
mod loader;
pub mod services;

// Re-export public API
pub use config::AppConfig;
pub use init::run;
pub use loader::load_config;
pub use services::{Components, Services};
