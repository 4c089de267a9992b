//! URL handling module for News-Harvest
//!
//! This module provides URL normalization, host scoping, link resolution and
//! the regex pattern sets that link classification is built on.

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_domain, host_key, same_site};
pub use matcher::PatternSet;
pub use normalize::{normalize_url, resolve_href};
