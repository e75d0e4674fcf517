//! IP geolocation
//!
//! Lookups are best-effort: an error or a slow resolver yields no location
//! and never fails the event being processed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::error::ResponderResult;

/// Resolved location of an IP address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 code
    pub country: String,
    pub city: Option<String>,
}

impl GeoLocation {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            city: None,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.city {
            Some(city) => write!(f, "{}, {}", city, self.country),
            None => write!(f, "{}", self.country),
        }
    }
}

/// Source of IP geolocation
#[async_trait]
pub trait GeoResolver: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the address is unknown to the resolver
    async fn resolve(&self, ip_address: &str) -> ResponderResult<Option<GeoLocation>>;
}

/// In-process lookup table
#[derive(Default)]
pub struct StaticGeoResolver {
    table: RwLock<HashMap<String, GeoLocation>>,
}

impl StaticGeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, ip_address: impl Into<String>, location: GeoLocation) -> Self {
        self.set(ip_address, location);
        self
    }

    pub fn set(&self, ip_address: impl Into<String>, location: GeoLocation) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ip_address.into(), location);
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GeoResolver for StaticGeoResolver {
    fn name(&self) -> &str {
        "static"
    }

    async fn resolve(&self, ip_address: &str) -> ResponderResult<Option<GeoLocation>> {
        Ok(self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ip_address)
            .cloned())
    }
}

/// Resolve with a deadline; any failure is logged and reported as unknown
pub async fn locate(
    resolver: &dyn GeoResolver,
    ip_address: &str,
    timeout: Duration,
) -> Option<GeoLocation> {
    if ip_address.is_empty() {
        return None;
    }
    match tokio::time::timeout(timeout, resolver.resolve(ip_address)).await {
        Ok(Ok(location)) => location,
        Ok(Err(e)) => {
            tracing::warn!(
                resolver = resolver.name(),
                ip = %ip_address,
                error = %e,
                "Geolocation lookup failed"
            );
            None
        }
        Err(_) => {
            tracing::warn!(
                resolver = resolver.name(),
                ip = %ip_address,
                timeout_ms = timeout.as_millis() as u64,
                "Geolocation lookup timed out"
            );
            None
        }
    }
}
