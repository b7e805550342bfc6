//! Command implementations for the CLI
//!
//! - query: run queries through a query job manager and print formatted series
//! - annotate: run an annotation query and print annotation events
//! - variables: run a variable query and print the values of one field
//! - config: configuration display and validation

pub mod annotate;
pub mod config;
pub mod query;
pub mod variables;

use crate::cli::RangeArgs;
use logscale_query::config::Config;

/// Repository from the command line, else the configured default.
///
/// An empty result is passed through; the engine reports it as a missing repository.
pub(crate) fn resolve_repository(range: &RangeArgs, cfg: &Config) -> String {
    range
        .repository
        .clone()
        .or_else(|| cfg.query.default_repository.clone())
        .unwrap_or_default()
}
