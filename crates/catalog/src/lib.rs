//! Peak catalog: request cache, repository, draft form and import pipeline.

pub mod cache;
pub mod draft;
pub mod import;
pub mod repository;

pub use cache::{CacheEvent, CacheKey, CacheState, CacheStore, FetchOptions, Subscription, Sweeper, Tag};
pub use draft::{DraftField, DraftFields, DraftForm, DraftState};
pub use import::{import_payload, SearchImport};
pub use repository::{parse_optional_number, PeakRepository, RepositorySettings};
