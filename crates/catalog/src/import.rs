//! Search the external provider and import a hit as a local peak.

use common::{Error, ExternalSearchResult, Peak, PeakPayload};
use tracing::info;

use crate::repository::PeakRepository;

/// Creation payload for an external hit.
///
/// The name falls back to `fallback_name` (normally the search query) when
/// the provider has none. Region, grade and description stay empty for the
/// user to fill in.
pub fn import_payload(result: &ExternalSearchResult, fallback_name: Option<&str>) -> PeakPayload {
    let name = result
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or(fallback_name)
        .unwrap_or_default();

    PeakPayload {
        name: name.to_string(),
        region: None,
        grade: None,
        description: None,
        elevation_ft: result.elevation_ft(),
        lat: result.lat,
        lon: result.lon,
    }
}

/// Search-and-import workflow. Holds the last query and its results.
#[derive(Clone)]
pub struct SearchImport {
    repo: PeakRepository,
    last_query: Option<String>,
    results: Vec<ExternalSearchResult>,
}

impl SearchImport {
    pub fn new(repo: PeakRepository) -> Self {
        Self {
            repo,
            last_query: None,
            results: Vec::new(),
        }
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn results(&self) -> &[ExternalSearchResult] {
        &self.results
    }

    /// Blank queries are rejected here and never reach the network.
    pub async fn search(&mut self, query: &str) -> Result<Vec<ExternalSearchResult>, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("Enter a peak name to search.".into()));
        }

        self.last_query = Some(query.to_string());
        let results = self.repo.search(query).await?;
        self.results = results.clone();
        Ok(results)
    }

    /// Create a local peak from `result`. Importing the same hit twice
    /// creates two peaks.
    pub async fn import(&self, result: &ExternalSearchResult) -> Result<Peak, Error> {
        let payload = import_payload(result, self.last_query.as_deref());
        let peak = self.repo.create(&payload).await?;
        info!("Imported {} as peak {}", result.external_id, peak.id);
        Ok(peak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(name: Option<&str>, elevation_m: Option<f64>) -> ExternalSearchResult {
        ExternalSearchResult {
            external_id: "node/1".into(),
            name: name.map(str::to_string),
            lat: Some(46.8529),
            lon: Some(-121.7604),
            elevation_m,
            country: Some("US".into()),
            region: Some("Washington".into()),
            range: Some("Cascade Range".into()),
            retrieved_at: None,
        }
    }

    #[test]
    fn test_elevation_converted_to_feet() {
        let payload = import_payload(&hit(Some("Peak"), Some(1000.0)), None);
        assert_eq!(payload.elevation_ft, Some(3281.0));
    }

    #[test]
    fn test_missing_elevation_is_null() {
        let payload = import_payload(&hit(Some("Peak"), None), None);
        assert_eq!(payload.elevation_ft, None);
    }

    #[test]
    fn test_name_falls_back_to_query() {
        let payload = import_payload(&hit(None, None), Some("rainier"));
        assert_eq!(payload.name, "rainier");

        let payload = import_payload(&hit(Some("Mount Rainier"), None), Some("rainier"));
        assert_eq!(payload.name, "Mount Rainier");
    }

    #[test]
    fn test_location_passes_through_and_text_left_empty() {
        let payload = import_payload(&hit(Some("Mount Rainier"), Some(4392.0)), None);
        assert_eq!(payload.lat, Some(46.8529));
        assert_eq!(payload.lon, Some(-121.7604));
        assert_eq!(payload.region, None);
        assert_eq!(payload.grade, None);
        assert_eq!(payload.description, None);
    }
}
