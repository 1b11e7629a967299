//! In-memory stand-in for the remote catalog service.

#![allow(dead_code)]

use async_trait::async_trait;
use catalog::{CacheStore, PeakRepository, RepositorySettings};
use chrono::Utc;
use common::{
    Error, ExternalSearchResult, ExternalSnapshot, Peak, PeakPayload, SearchQuery, SearchResponse,
    SnapshotRefresh,
};
use peak_client::PeakApi;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct Calls {
    pub list: AtomicUsize,
    pub get: AtomicUsize,
    pub create: AtomicUsize,
    pub update: AtomicUsize,
    pub delete: AtomicUsize,
    pub refresh: AtomicUsize,
    pub search: AtomicUsize,
}

impl Calls {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Store {
    peaks: Vec<Peak>,
    next_id: i64,
}

#[derive(Default)]
pub struct FakeApi {
    store: Mutex<Store>,
    pub calls: Calls,
    fail_writes: AtomicBool,
    refresh_delay: Mutex<Duration>,
    write_delay: Mutex<Duration>,
    search_results: Mutex<Vec<ExternalSearchResult>>,
}

fn peak_from(id: i64, payload: &PeakPayload) -> Peak {
    Peak {
        id,
        name: payload.name.clone(),
        region: payload.region.clone().unwrap_or_default(),
        grade: payload.grade.clone().unwrap_or_default(),
        elevation_ft: payload.elevation_ft,
        prominence_ft: None,
        lat: payload.lat,
        lon: payload.lon,
        description: payload.description.clone().unwrap_or_default(),
        snapshot: ExternalSnapshot::default(),
        created_at: Some(Utc::now()),
        updated_at: Some(Utc::now()),
    }
}

fn not_found() -> Error {
    Error::Api {
        status: 404,
        message: "{\"detail\":\"Not found.\"}".into(),
    }
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make create, update and delete fail with a 500.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    pub fn set_search_results(&self, results: Vec<ExternalSearchResult>) {
        *self.search_results.lock().unwrap() = results;
    }

    /// Insert a peak directly, bypassing the API.
    pub fn seed(&self, payload: PeakPayload) -> Peak {
        let mut store = self.store.lock().unwrap();
        store.next_id += 1;
        let peak = peak_from(store.next_id, &payload);
        store.peaks.push(peak.clone());
        peak
    }

    async fn before_write(&self) -> Result<(), Error> {
        let delay = *self.write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_writes()
    }

    fn check_writes(&self) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 500,
                message: "server exploded".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PeakApi for FakeApi {
    async fn list_peaks(&self) -> Result<Vec<Peak>, Error> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.lock().unwrap().peaks.clone())
    }

    async fn get_peak(&self, id: i64) -> Result<Peak, Error> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        let store = self.store.lock().unwrap();
        store
            .peaks
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn create_peak(&self, payload: &PeakPayload) -> Result<Peak, Error> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.before_write().await?;
        let mut store = self.store.lock().unwrap();
        store.next_id += 1;
        let peak = peak_from(store.next_id, payload);
        store.peaks.push(peak.clone());
        Ok(peak)
    }

    async fn update_peak(&self, id: i64, payload: &PeakPayload) -> Result<Peak, Error> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.before_write().await?;
        let mut store = self.store.lock().unwrap();
        let slot = store
            .peaks
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(not_found)?;
        let mut updated = peak_from(id, payload);
        updated.snapshot = slot.snapshot.clone();
        updated.created_at = slot.created_at;
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_peak(&self, id: i64) -> Result<(), Error> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.before_write().await?;
        let mut store = self.store.lock().unwrap();
        let before = store.peaks.len();
        store.peaks.retain(|p| p.id != id);
        if store.peaks.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    async fn refresh_snapshot(&self, id: i64) -> Result<SnapshotRefresh, Error> {
        self.calls.refresh.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut store = self.store.lock().unwrap();
        let peak = store
            .peaks
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(not_found)?;
        let snapshot = ExternalSnapshot {
            source: Some("osm".into()),
            external_id: Some(format!("node/{}", id)),
            range: Some("Alaska Range".into()),
            retrieved_at: Some(Utc::now()),
            ..ExternalSnapshot::default()
        };
        peak.snapshot = snapshot.clone();
        Ok(SnapshotRefresh {
            peak: peak.clone(),
            snapshot: Some(snapshot),
            from_cache: false,
        })
    }

    async fn search_peaks(&self, _query: &SearchQuery) -> Result<SearchResponse, Error> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);
        Ok(SearchResponse {
            results: self.search_results.lock().unwrap().clone(),
        })
    }
}

pub fn repository(api: &Arc<FakeApi>) -> PeakRepository {
    let api: Arc<dyn PeakApi> = api.clone();
    PeakRepository::new(api, CacheStore::new(), RepositorySettings::default())
}

pub fn search_hit(id: &str, name: Option<&str>, elevation_m: Option<f64>) -> ExternalSearchResult {
    ExternalSearchResult {
        external_id: id.into(),
        name: name.map(str::to_string),
        lat: Some(63.0695),
        lon: Some(-151.0074),
        elevation_m,
        country: Some("US".into()),
        region: Some("Alaska".into()),
        range: Some("Alaska Range".into()),
        retrieved_at: None,
    }
}
