//! Device position lookup
//!
//! Resolves an approximate position for grounding location-sensitive
//! queries. The default provider derives it from the caller's public IP,
//! which is coarse but needs no OS permission prompt. Callers own the
//! timeout and the cached-position fallback.

use async_trait::async_trait;
use serde::Deserialize;

use crate::gateway::GeoPoint;
use crate::{Error, Result};

/// Default lookup endpoint
const IP_API_URL: &str = "http://ip-api.com/json";

/// Resolves the device's approximate position
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Look up the current position
    ///
    /// # Errors
    ///
    /// Returns [`Error::GeolocationUnavailable`] when the lookup service
    /// cannot produce coordinates
    async fn locate(&self) -> Result<GeoPoint>;
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
    message: Option<String>,
}

/// IP-based position provider
pub struct IpLocationProvider {
    client: reqwest::Client,
    base_url: String,
}

impl IpLocationProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: IP_API_URL.to_string(),
        }
    }

    /// Override the lookup endpoint (used by tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for IpLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocationProvider for IpLocationProvider {
    async fn locate(&self) -> Result<GeoPoint> {
        let response = self.client.get(&self.base_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::GeolocationUnavailable(format!(
                "lookup service returned {status}"
            )));
        }

        let parsed: IpApiResponse = response.json().await?;
        if parsed.status != "success" {
            return Err(Error::GeolocationUnavailable(
                parsed
                    .message
                    .unwrap_or_else(|| "lookup failed".to_string()),
            ));
        }

        match (parsed.lat, parsed.lon) {
            (Some(lat), Some(lon)) => {
                tracing::debug!(lat, lon, "resolved device position");
                Ok(GeoPoint { lat, lng: lon })
            }
            _ => Err(Error::GeolocationUnavailable(
                "no coordinates in response".to_string(),
            )),
        }
    }
}
