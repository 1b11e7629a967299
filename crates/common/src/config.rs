//! Planner configuration types.

use serde::{Deserialize, Serialize};

/// Top-level planner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Base URL of the remote catalog service (no trailing slash).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout enforced by the HTTP client.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Cache retention windows.
    #[serde(default)]
    pub cache: CacheConfig,

    /// External search defaults.
    #[serde(default)]
    pub search: SearchConfig,

    /// Snapshot freshness.
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Client-side request throttling.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// How long unused cache entries are kept (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Retention for the peak list.
    #[serde(default = "default_list_retention")]
    pub list_retention_secs: u64,

    /// Retention for single-peak entries.
    #[serde(default = "default_item_retention")]
    pub item_retention_secs: u64,

    /// Retention for external search results.
    #[serde(default = "default_search_retention")]
    pub search_retention_secs: u64,

    /// Interval of the background eviction sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result limit when the caller does not pass one.
    #[serde(default = "default_search_limit")]
    pub default_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot age (seconds) beyond which a peak is shown as stale.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_reads_per_sec")]
    pub reads_per_sec: u32,
    #[serde(default = "default_writes_per_sec")]
    pub writes_per_sec: u32,
    /// Search and snapshot refresh, which reach the external provider.
    #[serde(default = "default_provider_per_sec")]
    pub provider_per_sec: u32,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_api_base_url() -> String {
    "http://localhost:8000/api/peak-planner".into()
}
fn default_request_timeout() -> u64 {
    15
}
fn default_user_agent() -> String {
    "peak-planner/0.1".into()
}

fn default_list_retention() -> u64 {
    1800
}
fn default_item_retention() -> u64 {
    1800
}
fn default_search_retention() -> u64 {
    600
}
fn default_sweep_interval() -> u64 {
    60
}

fn default_search_limit() -> u32 {
    5
}
fn default_stale_after() -> u64 {
    crate::types::SNAPSHOT_STALE_AFTER_SECS as u64
}

fn default_reads_per_sec() -> u32 {
    20
}
fn default_writes_per_sec() -> u32 {
    10
}
fn default_provider_per_sec() -> u32 {
    1
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_retention_secs: default_list_retention(),
            item_retention_secs: default_item_retention(),
            search_retention_secs: default_search_retention(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            reads_per_sec: default_reads_per_sec(),
            writes_per_sec: default_writes_per_sec(),
            provider_per_sec: default_provider_per_sec(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
            snapshot: SnapshotConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
