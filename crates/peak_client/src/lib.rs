//! Catalog service client library.
//!
//! Provides the [`PeakApi`] transport seam and its HTTP implementation.

pub mod api;
pub mod rest;
pub mod throttle;

pub use api::PeakApi;
pub use rest::PeakRestClient;
pub use throttle::{Throttle, Traffic};
