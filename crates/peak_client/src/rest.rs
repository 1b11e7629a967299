//! REST client for the peak catalog service.
//!
//! Covers: peak CRUD, external snapshot refresh, external search.
//! Every call waits on the throttle first; status codes are only classified
//! as success or failure.

use async_trait::async_trait;
use common::{
    Error, Peak, PeakPayload, PlannerConfig, SearchQuery, SearchResponse, SnapshotRefresh,
};
use serde::de::DeserializeOwned;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::PeakApi;
use crate::throttle::{Throttle, Traffic};

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// `reqwest` hides the interesting part (refused, DNS, TLS) in the source
/// chain; flatten it into one line.
fn describe_reqwest_error(err: &reqwest::Error) -> String {
    std::iter::successors(err.source(), |cause| (*cause).source())
        .map(|cause| cause.to_string())
        .fold(err.to_string(), |mut line, cause| {
            if !cause.is_empty() && !line.contains(&cause) {
                line.push_str(": ");
                line.push_str(&cause);
            }
            line
        })
}

fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 500;
    let compact = raw.replace(['\n', '\r'], " ");
    match compact.char_indices().nth(MAX_CHARS) {
        Some((cut, _)) => format!("{}…", &compact[..cut]),
        None => compact,
    }
}

/// Async REST client for the catalog API.
#[derive(Debug, Clone)]
pub struct PeakRestClient {
    client: reqwest::Client,
    base_url: String,
    throttle: Throttle,
}

impl PeakRestClient {
    /// Build a client from the planner configuration.
    pub fn new(config: &PlannerConfig) -> Result<Self, Error> {
        let base_url = normalize_base_url(&config.api_base_url);
        if base_url.is_empty() {
            return Err(Error::Config("api_base_url must not be empty".into()));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        info!("Catalog API at {}", base_url);

        Ok(Self {
            client,
            base_url,
            throttle: Throttle::from_config(&config.rate_limit),
        })
    }

    /// URL helper.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, map transport failures and non-2xx statuses.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Http(describe_reqwest_error(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Catalog API returned {}: {}", status.as_u16(), summarize_response_body(&body));
            return Err(Error::Api {
                status: status.as_u16(),
                message: summarize_response_body(&body),
            });
        }

        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, Error> {
        let body = self
            .send(req)
            .await?
            .text()
            .await
            .map_err(|e| Error::Http(describe_reqwest_error(&e)))?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PeakApi for PeakRestClient {
    // ── Read endpoints ────────────────────────────────────────────────

    async fn list_peaks(&self) -> Result<Vec<Peak>, Error> {
        self.throttle.acquire(Traffic::Read).await;
        let url = self.url("/peaks");
        debug!("GET {}", url);

        let peaks: Vec<Peak> = self.send_json(self.client.get(url)).await?;
        debug!("Fetched {} peaks", peaks.len());
        Ok(peaks)
    }

    async fn get_peak(&self, id: i64) -> Result<Peak, Error> {
        self.throttle.acquire(Traffic::Read).await;
        let url = self.url(&format!("/peaks/{}", id));
        debug!("GET {}", url);

        self.send_json(self.client.get(url)).await
    }

    async fn search_peaks(&self, query: &SearchQuery) -> Result<SearchResponse, Error> {
        self.throttle.acquire(Traffic::Provider).await;
        let url = self.url("/peaks/search");
        debug!("GET {} q={:?} limit={}", url, query.q, query.limit);

        let mut req = self
            .client
            .get(url)
            .query(&[("q", query.q.as_str())])
            .query(&[("limit", query.limit.to_string())]);
        if let Some(lat) = query.lat {
            req = req.query(&[("lat", lat.to_string())]);
        }
        if let Some(lon) = query.lon {
            req = req.query(&[("lon", lon.to_string())]);
        }

        let body: SearchResponse = self.send_json(req).await?;
        debug!("Search {:?} returned {} results", query.q, body.results.len());
        Ok(body)
    }

    // ── Write endpoints ───────────────────────────────────────────────

    async fn create_peak(&self, payload: &PeakPayload) -> Result<Peak, Error> {
        self.throttle.acquire(Traffic::Write).await;
        let url = self.url("/peaks");
        debug!("POST {}", url);

        self.send_json(self.client.post(url).json(payload)).await
    }

    async fn update_peak(&self, id: i64, payload: &PeakPayload) -> Result<Peak, Error> {
        self.throttle.acquire(Traffic::Write).await;
        let url = self.url(&format!("/peaks/{}", id));
        debug!("PUT {}", url);

        self.send_json(self.client.put(url).json(payload)).await
    }

    async fn delete_peak(&self, id: i64) -> Result<(), Error> {
        self.throttle.acquire(Traffic::Write).await;
        let url = self.url(&format!("/peaks/{}", id));
        debug!("DELETE {}", url);

        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn refresh_snapshot(&self, id: i64) -> Result<SnapshotRefresh, Error> {
        self.throttle.acquire(Traffic::Provider).await;
        let url = self.url(&format!("/peaks/{}/snapshot/refresh", id));
        debug!("POST {}", url);

        let body: SnapshotRefresh = self.send_json(self.client.post(url)).await?;
        debug!("Peak {} snapshot refreshed (from_cache={})", id, body.from_cache);
        Ok(body)
    }
}
