//! Transport contract for the remote catalog service.

use async_trait::async_trait;
use common::{Error, Peak, PeakPayload, SearchQuery, SearchResponse, SnapshotRefresh};

/// Remote operations consumed by the catalog. Implementations only move
/// requests and responses; validation and caching live above this seam.
#[async_trait]
pub trait PeakApi: Send + Sync {
    /// `GET /peaks`
    async fn list_peaks(&self) -> Result<Vec<Peak>, Error>;

    /// `GET /peaks/{id}`
    async fn get_peak(&self, id: i64) -> Result<Peak, Error>;

    /// `POST /peaks`
    async fn create_peak(&self, payload: &PeakPayload) -> Result<Peak, Error>;

    /// `PUT /peaks/{id}`
    async fn update_peak(&self, id: i64, payload: &PeakPayload) -> Result<Peak, Error>;

    /// `DELETE /peaks/{id}`
    async fn delete_peak(&self, id: i64) -> Result<(), Error>;

    /// `POST /peaks/{id}/snapshot/refresh`
    async fn refresh_snapshot(&self, id: i64) -> Result<SnapshotRefresh, Error>;

    /// `GET /peaks/search`
    async fn search_peaks(&self, query: &SearchQuery) -> Result<SearchResponse, Error>;
}
