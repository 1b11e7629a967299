//! Typed peak operations on top of the transport and the request cache.
//!
//! The repository owns the tag rules: every successful mutation invalidates
//! the tags listed below and writes the returned peak into its item entry.
//!
//! The list entry is tagged `peak-list` plus `peak-item:{id}` for every row
//! it holds; item entries carry `peak-item:{id}` and `peak-external:{id}`.
//!
//! | operation | invalidates |
//! |---|---|
//! | create | `peak-list` |
//! | update | `peak-item:{id}`, `peak-list`, `peak-external:{id}` |
//! | delete | `peak-item:{id}`, `peak-list` |
//! | refresh snapshot | `peak-external:{id}`, `peak-item:{id}`, `peak-list` |
//!
//! Failed operations invalidate nothing and are never retried here.

use common::config::PlannerConfig;
use common::{
    Error, ExternalSearchResult, Peak, PeakPayload, SearchQuery, SnapshotRefresh,
};
use peak_client::PeakApi;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::{CacheEvent, CacheKey, CacheState, CacheStore, FetchOptions, Subscription, Tag};

pub const PEAK_LIST_TAG: &str = "peak-list";

pub fn peak_list_tag() -> Tag {
    Tag::new(PEAK_LIST_TAG)
}

pub fn peak_item_tag(id: i64) -> Tag {
    Tag::new(format!("peak-item:{}", id))
}

pub fn peak_external_tag(id: i64) -> Tag {
    Tag::new(format!("peak-external:{}", id))
}

pub fn list_key() -> CacheKey {
    CacheKey::new("listPeaks", "")
}

pub fn item_key(id: i64) -> CacheKey {
    CacheKey::new("getPeak", id.to_string())
}

pub fn search_key(query: &SearchQuery) -> CacheKey {
    CacheKey::new("searchExternal", query.cache_args())
}

fn refresh_key(id: i64) -> CacheKey {
    CacheKey::new("refreshExternalSnapshot", id.to_string())
}

/// Parse a free-text numeric field.
///
/// Blank input and anything that does not parse to a finite number map to
/// `None`; malformed numbers are dropped, never reported.
pub fn parse_optional_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn within(value: Option<f64>, limit: f64) -> Option<f64> {
    value.filter(|v| v.is_finite() && (-limit..=limit).contains(v))
}

/// Apply the write rules shared by create and update.
///
/// Only an empty name is an error. Non-finite numbers and out-of-range
/// coordinates are dropped to `None`.
pub fn normalize_payload(payload: &PeakPayload) -> Result<PeakPayload, Error> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Name is required".into()));
    }

    Ok(PeakPayload {
        name: name.to_string(),
        region: clean_text(payload.region.clone()),
        grade: clean_text(payload.grade.clone()),
        description: clean_text(payload.description.clone()),
        elevation_ft: payload.elevation_ft.filter(|v| v.is_finite()),
        lat: within(payload.lat, 90.0),
        lon: within(payload.lon, 180.0),
    })
}

/// Retention windows and defaults used by the repository.
#[derive(Debug, Clone)]
pub struct RepositorySettings {
    pub list_ttl: Duration,
    pub item_ttl: Duration,
    pub search_ttl: Duration,
    pub default_search_limit: u32,
}

impl RepositorySettings {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            list_ttl: Duration::from_secs(config.cache.list_retention_secs),
            item_ttl: Duration::from_secs(config.cache.item_retention_secs),
            search_ttl: Duration::from_secs(config.cache.search_retention_secs),
            default_search_limit: config.search.default_limit,
        }
    }
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}

/// Peak catalog operations. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct PeakRepository {
    api: Arc<dyn PeakApi>,
    cache: CacheStore,
    settings: RepositorySettings,
}

impl PeakRepository {
    pub fn new(api: Arc<dyn PeakApi>, cache: CacheStore, settings: RepositorySettings) -> Self {
        Self {
            api,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    /// The list also carries one item tag per row, so touching any peak it
    /// contains marks it stale.
    fn list_options(&self) -> FetchOptions {
        FetchOptions::new(self.settings.list_ttl)
            .tag(peak_list_tag())
            .tag_with(|peaks: &Vec<Peak>| peaks.iter().map(|p| peak_item_tag(p.id)).collect())
    }

    fn item_options(&self, id: i64) -> FetchOptions {
        item_options(self.settings.item_ttl, id)
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// All peaks in server order.
    pub async fn list(&self) -> Result<Vec<Peak>, Error> {
        let api = Arc::clone(&self.api);
        self.cache
            .fetch(list_key(), self.list_options(), move || async move {
                api.list_peaks().await
            })
            .await
    }

    /// One peak, cached under its own key.
    pub async fn get(&self, id: i64) -> Result<Peak, Error> {
        let api = Arc::clone(&self.api);
        self.cache
            .fetch(item_key(id), self.item_options(id), move || async move {
                api.get_peak(id).await
            })
            .await
    }

    /// Manual "refetch": mark the list stale and load it again.
    pub async fn refetch_list(&self) -> Result<Vec<Peak>, Error> {
        self.cache.invalidate(&peak_list_tag());
        self.list().await
    }

    /// Loading / refreshing / failed status of the list, for indicators.
    pub fn list_state(&self) -> CacheState {
        self.cache.state(&list_key())
    }

    /// Last known item value, without loading.
    pub fn cached_item(&self, id: i64) -> Option<Peak> {
        self.cache.peek(&item_key(id))
    }

    pub fn subscribe_list<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CacheKey, &CacheEvent) + Send + Sync + 'static,
    {
        self.cache.subscribe(list_key(), callback)
    }

    pub fn subscribe_item<F>(&self, id: i64, callback: F) -> Subscription
    where
        F: Fn(&CacheKey, &CacheEvent) + Send + Sync + 'static,
    {
        self.cache.subscribe(item_key(id), callback)
    }

    /// External provider search. Results are cached but never persisted.
    pub async fn search_external(
        &self,
        query: SearchQuery,
    ) -> Result<Vec<ExternalSearchResult>, Error> {
        if query.q.trim().is_empty() {
            return Err(Error::Validation("Search query must not be empty".into()));
        }

        let api = Arc::clone(&self.api);
        let options = FetchOptions::new(self.settings.search_ttl);
        self.cache
            .fetch(search_key(&query), options, move || async move {
                api.search_peaks(&query).await.map(|resp| resp.results)
            })
            .await
    }

    /// Search with the configured default limit and no location bias.
    pub async fn search(&self, q: &str) -> Result<Vec<ExternalSearchResult>, Error> {
        let query = SearchQuery::new(q).with_limit(self.settings.default_search_limit);
        self.search_external(query).await
    }

    // ── Mutations ─────────────────────────────────────────────────────

    pub async fn create(&self, payload: &PeakPayload) -> Result<Peak, Error> {
        let payload = normalize_payload(payload)?;
        let peak = self.api.create_peak(&payload).await?;
        info!("Created peak {} ({})", peak.id, peak.name);

        self.cache.invalidate(&peak_list_tag());
        self.cache
            .put(item_key(peak.id), peak.clone(), self.item_options(peak.id));
        Ok(peak)
    }

    pub async fn update(&self, id: i64, payload: &PeakPayload) -> Result<Peak, Error> {
        let payload = normalize_payload(payload)?;
        let peak = self.api.update_peak(id, &payload).await?;
        info!("Updated peak {} ({})", id, peak.name);

        for tag in [peak_item_tag(id), peak_list_tag(), peak_external_tag(id)] {
            self.cache.invalidate(&tag);
        }
        self.cache.put(item_key(id), peak.clone(), self.item_options(id));
        Ok(peak)
    }

    pub async fn delete(&self, id: i64) -> Result<(), Error> {
        self.api.delete_peak(id).await?;
        info!("Deleted peak {}", id);

        for tag in [peak_item_tag(id), peak_list_tag()] {
            self.cache.invalidate(&tag);
        }
        // Item subscribers get `Removed` and are detached; the record is gone.
        self.cache.remove(&item_key(id));
        Ok(())
    }

    /// Ask the service to re-fetch provider data for one peak.
    ///
    /// Concurrent calls for the same id share one request; invalidation and
    /// the item write happen once, when that request completes.
    pub async fn refresh_external_snapshot(&self, id: i64) -> Result<SnapshotRefresh, Error> {
        let api = Arc::clone(&self.api);
        let cache = self.cache.clone();
        let item_ttl = self.settings.item_ttl;

        self.cache
            .shared(refresh_key(id), move || async move {
                let refreshed = api.refresh_snapshot(id).await?;
                debug!(
                    "Peak {} snapshot refreshed (from_cache={})",
                    id, refreshed.from_cache
                );

                for tag in [peak_external_tag(id), peak_item_tag(id), peak_list_tag()] {
                    cache.invalidate(&tag);
                }
                cache.put(item_key(id), refreshed.peak.clone(), item_options(item_ttl, id));
                Ok::<_, Error>(refreshed)
            })
            .await
    }
}

fn item_options(ttl: Duration, id: i64) -> FetchOptions {
    FetchOptions::new(ttl)
        .tag(peak_item_tag(id))
        .tag(peak_external_tag(id))
}
