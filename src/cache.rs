//! Conversation-scoped memoization of read-only tool results
//!
//! Keys are computed from `scope:tool:args_hash` where `scope` is the
//! conversation id (or a global sentinel when the turn has none) and
//! `args_hash` is the SHA-256 digest of the canonical JSON arguments.
//! Only the declared read-only tool allow-list may use this path; routing
//! a mutating tool through the cache is a programming error, not a runtime
//! fallback. Entries expire after a fixed TTL and are evicted lazily on
//! lookup, so the map stays bounded across long-lived conversations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::tools::ToolName;
use crate::{Error, Result};

/// Read-only, side-effect-free tools eligible for result caching
const CACHEABLE_TOOLS: &[ToolName] = &[
    ToolName::QueryCases,
    ToolName::GetCaseStats,
    ToolName::QueryNotifications,
    ToolName::SearchKnowledge,
    ToolName::SearchWeb,
];

/// Whether a tool's results may be served from cache
#[must_use]
pub fn is_cache_eligible(tool: ToolName) -> bool {
    CACHEABLE_TOOLS.contains(&tool)
}

/// Thread-safe tool-result cache
pub struct ToolResultCache {
    /// Whether caching is active (disabled cache always misses and never stores)
    enabled: bool,
    /// Entry lifetime before re-execution
    ttl: Duration,
    /// Entries keyed by `scope:tool:args_hash`
    entries: DashMap<String, CachedEntry>,
    /// Cache statistics
    stats: CacheStats,
}

/// A cached result with its insertion time
struct CachedEntry {
    value: Value,
    cached_at: Instant,
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Expired entries removed
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
}

impl ToolResultCache {
    /// Create a new empty cache
    #[must_use]
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Execute a cache-eligible tool, serving a stored result when the
    /// canonicalized argument tuple has been seen before in this scope.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` when called with a tool outside the
    /// read-only allow-list, or the executor's error on a miss.
    pub async fn execute_with_cache<F, Fut>(
        &self,
        scope: Option<&str>,
        tool: ToolName,
        arguments: &Value,
        execute: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Value>>,
    {
        if !is_cache_eligible(tool) {
            debug_assert!(false, "mutating tool {tool} routed through the cache");
            return Err(Error::Internal(format!(
                "Tool {tool} is not cache-eligible"
            )));
        }

        if !self.enabled {
            return execute().await;
        }

        let key = Self::build_key(scope, tool, arguments);

        if let Some(entry) = self.entries.get(&key) {
            if entry.cached_at.elapsed() <= self.ttl {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(tool = %tool, scope = scope.unwrap_or("global"), "Tool result served from cache");
                return Ok(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        debug!(tool = %tool, scope = scope.unwrap_or("global"), "Tool result cache miss");

        let result = execute().await?;
        self.entries.insert(
            key,
            CachedEntry {
                value: result.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(result)
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }

    /// Build a cache key from scope, tool name, and arguments
    #[must_use]
    pub fn build_key(scope: Option<&str>, tool: ToolName, arguments: &Value) -> String {
        let args_hash = Self::hash_arguments(arguments);
        format!("{}:{tool}:{args_hash}", scope.unwrap_or("global"))
    }

    /// Compute SHA-256 hash of arguments in canonical JSON form.
    ///
    /// `serde_json` objects iterate in sorted key order, so semantically
    /// identical argument maps serialize identically regardless of the key
    /// order the model produced.
    fn hash_arguments(arguments: &Value) -> String {
        let canonical = serde_json::to_string(arguments).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        format!("{result:x}")
    }
}
