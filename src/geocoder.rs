//! # Geocoding Adapter
//!
//! Best-effort address↔coordinates translation via the Yandex Maps
//! geocoder. Both directions return `Option`: any transport failure,
//! missing API key or unparseable response means "no location known",
//! never an error the pipeline has to handle.

use log::{error, info, warn};
use serde_json::Value;
use std::time::Duration;

/// Request timeout for geocoder calls.
pub const GEOCODER_TIMEOUT_SECS: u64 = 10;

const GEOCODER_URL: &str = "https://geocode-maps.yandex.ru/1.x/";

pub struct YandexGeocoder {
    api_key: Option<String>,
    http: reqwest::Client,
}

impl YandexGeocoder {
    pub fn new(api_key: Option<String>) -> Self {
        if api_key.is_none() {
            warn!("Yandex geocoder API key is not set, geocoding disabled");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(GEOCODER_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { api_key, http }
    }

    /// Forward geocoding: free-text address to `(latitude, longitude)`.
    pub async fn geocode_address(&self, address: &str) -> Option<(f64, f64)> {
        let api_key = self.api_key.as_ref()?;
        info!("Geocoding address: '{}'", address);

        let data = self.request(api_key, address).await?;
        let position = first_geo_object(&data)?
            .get("Point")?
            .get("pos")?
            .as_str()?
            .to_string();

        // Yandex returns "longitude latitude"
        let mut parts = position.split_whitespace();
        let lon: f64 = parts.next()?.parse().ok()?;
        let lat: f64 = parts.next()?.parse().ok()?;

        info!("Resolved '{}' to ({:.6}, {:.6})", address, lat, lon);
        Some((lat, lon))
    }

    /// Reverse geocoding: coordinates to a free-text address.
    pub async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Option<String> {
        let api_key = self.api_key.as_ref()?;
        info!("Reverse geocoding: {}, {}", latitude, longitude);

        // Yandex expects "lon,lat"
        let query = format!("{},{}", longitude, latitude);
        let data = self.request(api_key, &query).await?;
        let address = first_geo_object(&data)?
            .get("metaDataProperty")?
            .get("GeocoderMetaData")?
            .get("text")?
            .as_str()?
            .to_string();

        info!("Resolved ({}, {}) to '{}'", latitude, longitude, address);
        Some(address)
    }

    async fn request(&self, api_key: &str, geocode: &str) -> Option<Value> {
        let response = match self
            .http
            .get(GEOCODER_URL)
            .query(&[
                ("apikey", api_key),
                ("geocode", geocode),
                ("format", "json"),
                ("results", "1"),
            ])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!("Geocoder request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            error!("Geocoder returned {}", response.status());
            return None;
        }

        match response.json::<Value>().await {
            Ok(data) => Some(data),
            Err(e) => {
                error!("Failed to decode geocoder response: {}", e);
                None
            }
        }
    }
}

fn first_geo_object(data: &Value) -> Option<&Value> {
    data.get("response")?
        .get("GeoObjectCollection")?
        .get("featureMember")?
        .get(0)?
        .get("GeoObject")
}
