//! Permgate Library
//!
//! Conversational action gateway for PERM case management.
//!
//! # Features
//!
//! - **Tool catalog**: a fixed, schema-validated set of case, notification,
//!   navigation and search tools exposed to the completion engine
//! - **Permission policy**: per-user action modes with a confirmation
//!   handshake for gated mutations and an unconditional one for
//!   destructive ones
//! - **Bulk target resolution**: declarative bulk requests expanded to a
//!   concrete identifier list before any preview or mutation
//! - **Result cache**: conversation-scoped memoization of read-only tools
//! - **Streaming turns**: bounded multi-step tool-calling loop over
//!   failover-wrapped completion providers, emitted as SSE
//! - **Context compaction**: summary plus recent-window payloads with
//!   fire-and-forget background summarization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bulk;
pub mod cache;
pub mod cli;
pub mod config;
pub mod confirm;
pub mod data;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod provider;
pub mod tools;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
