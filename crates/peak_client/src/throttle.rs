//! Client-side throttle for the catalog service.
//!
//! Catalog reads and writes only touch the service's own database. Search
//! and snapshot refresh are forwarded to the external geographic provider,
//! which allows far fewer requests, so they draw from their own bucket.

use common::config::RateLimitConfig;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type Bucket = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

fn bucket(per_sec: u32) -> Bucket {
    let per_sec = NonZeroU32::new(per_sec).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(per_sec)))
}

/// Which bucket a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traffic {
    /// Catalog GETs.
    Read,
    /// Catalog create/update/delete.
    Write,
    /// Anything the service forwards to the external provider.
    Provider,
}

#[derive(Debug, Clone)]
pub struct Throttle {
    read: Bucket,
    write: Bucket,
    provider: Bucket,
}

impl Throttle {
    /// Zero rates are clamped to one request per second.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            read: bucket(config.reads_per_sec),
            write: bucket(config.writes_per_sec),
            provider: bucket(config.provider_per_sec),
        }
    }

    fn bucket(&self, traffic: Traffic) -> &Bucket {
        match traffic {
            Traffic::Read => &self.read,
            Traffic::Write => &self.write,
            Traffic::Provider => &self.provider,
        }
    }

    /// Wait for a slot in the bucket for `traffic`.
    pub async fn acquire(&self, traffic: Traffic) {
        self.bucket(traffic).until_ready().await;
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
