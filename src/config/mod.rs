//! Configuration module for News-Harvest
//!
//! This module handles loading, parsing, and validating the TOML configuration
//! file that holds the run settings and every source profile.
//!
//! # Example
//!
//! ```no_run
//! use news_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! for source in config.enabled_sources() {
//!     println!("{} -> {}", source.id, source.base_url);
//! }
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, FetcherConfig, FieldSelectors, RunConfig, SourceProfile, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
