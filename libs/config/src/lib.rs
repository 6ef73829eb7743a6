//! # Tidal Centralized Configuration
//!
//! This crate provides configuration management and defaults for Tidal
//! pools, so the engine crate never reads files or environment variables
//! itself.
//!
//! ## Features
//!
//! - **Pool Settings**: interval length, instant swap fee, throughput guard
//! - **Defaults**: every setting has a built-in value
//! - **Loading**: TOML file, environment overlay file, `TIDAL_` variables
//! - **Logging**: one-call `tracing` subscriber setup
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tidal_config::{init_tracing, load_config};
//!
//! let config = load_config(Some("devnet")).unwrap();
//! init_tracing(&config.logging).unwrap();
//! assert!(config.pool.interval_length > 0);
//! ```

pub mod defaults;
pub mod pool_config;
pub mod telemetry;

// Re-export commonly used types
pub use pool_config::{load_config, LoggingSettings, PoolSettings, TidalConfig};
pub use telemetry::init_tracing;
