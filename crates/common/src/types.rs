//! Domain types shared across the planner.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Age (seconds) after which an external snapshot is considered stale.
pub const SNAPSHOT_STALE_AFTER_SECS: i64 = 30 * 60;

/// Feet per metre, as used when importing provider elevations.
pub const FEET_PER_METRE: f64 = 3.28084;

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Peak ──────────────────────────────────────────────────────────────

/// External-provider data attached to a peak.
///
/// Inside a [`Peak`] the fields travel as flat `external_*` keys; the refresh
/// endpoint returns the same data as a nested object with short keys, so both
/// spellings are accepted on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalSnapshot {
    #[serde(rename = "external_source", alias = "source", default)]
    pub source: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(rename = "external_country", alias = "country", default)]
    pub country: Option<String>,
    #[serde(rename = "external_range", alias = "range", default)]
    pub range: Option<String>,
    #[serde(rename = "external_elevation_m", alias = "elevation_m", default)]
    pub elevation_m: Option<f64>,
    #[serde(rename = "external_prominence_m", alias = "prominence_m", default)]
    pub prominence_m: Option<f64>,
    #[serde(rename = "external_retrieved_at", alias = "retrieved_at", default)]
    pub retrieved_at: Option<DateTime<Utc>>,
    #[serde(rename = "external_payload", alias = "payload", default)]
    pub payload: Option<serde_json::Value>,
}

impl ExternalSnapshot {
    /// A snapshot exists once the provider has been queried at least once.
    pub fn is_present(&self) -> bool {
        self.retrieved_at.is_some()
    }
}

/// A user-owned peak record as returned by the catalog service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub id: i64,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub region: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub grade: String,
    #[serde(default)]
    pub elevation_ft: Option<f64>,
    #[serde(default)]
    pub prominence_ft: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(flatten)]
    pub snapshot: ExternalSnapshot,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Peak {
    /// Age of the external snapshot at `now`, if one was ever retrieved.
    pub fn snapshot_age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.snapshot.retrieved_at.map(|at| now - at)
    }

    /// Stale iff a snapshot exists and is strictly older than `window`.
    pub fn is_stale_after(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.snapshot_age_at(now).is_some_and(|age| age > window)
    }

    /// Staleness against the standard 30 minute freshness window.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.is_stale_after(now, Duration::seconds(SNAPSHOT_STALE_AFTER_SECS))
    }
}

/// Body for `POST /peaks` and `PUT /peaks/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub elevation_ft: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl PeakPayload {
    /// Minimal payload carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Response from `POST /peaks/{id}/snapshot/refresh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRefresh {
    pub peak: Peak,
    #[serde(default)]
    pub snapshot: Option<ExternalSnapshot>,
    /// True when the service answered from its own upstream cache.
    #[serde(default)]
    pub from_cache: bool,
}

// ── External search ───────────────────────────────────────────────────

/// One hit from the external geographic provider. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSearchResult {
    #[serde(alias = "osm_id")]
    pub external_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub elevation_m: Option<f64>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub retrieved_at: Option<DateTime<Utc>>,
}

impl ExternalSearchResult {
    /// Provider elevation converted to whole feet.
    pub fn elevation_ft(&self) -> Option<f64> {
        self.elevation_m.map(|m| (m * FEET_PER_METRE).round())
    }
}

/// Response from `GET /peaks/search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<ExternalSearchResult>,
}

/// Arguments for an external search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub q: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub limit: u32,
}

impl SearchQuery {
    pub const DEFAULT_LIMIT: u32 = 5;

    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            lat: None,
            lon: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Bias results towards a location.
    pub fn near(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Stable serialization of the arguments, used in cache keys.
    pub fn cache_args(&self) -> String {
        let coord = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_else(|| "-".into());
        format!(
            "q={}&lat={}&lon={}&limit={}",
            self.q,
            coord(self.lat),
            coord(self.lon),
            self.limit
        )
    }
}
