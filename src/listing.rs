//! # Listing Model
//!
//! Domain record for a single land/property auction lot as ingested from the
//! public registry. The search core only reads listings; ingestion and
//! updates belong to the external scraper process.

/// Registry root used when a listing carries no direct URL.
pub const REGISTRY_BASE_URL: &str = "https://easuz.mosreg.ru/torgi";

/// One auction/sale record for land or property.
///
/// `total_square` of `0.0` means the area is unknown; derived metrics such
/// as price-per-square treat it as missing. Coordinates are optional and
/// only present when the ingestion process managed to geocode the address.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: i64,
    pub name: String,
    pub registry_number: String,
    pub start_price: f64,
    pub deposit_amount: f64,
    pub start_step_amount: f64,
    pub total_square: f64,
    pub address_description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub district_code: Option<String>,
    pub purchase_kind_name: Option<String>,
    pub stage_state_name: Option<String>,
    pub land_allowed_use_name: Option<String>,
    pub is_active: bool,
    pub direct_url: Option<String>,
    pub cadastral_number: Option<String>,
    pub photos_json: Option<String>,
}

impl Listing {
    /// Photo URLs stored as a JSON array; malformed or missing data yields
    /// an empty list rather than an error.
    pub fn photos(&self) -> Vec<String> {
        match &self.photos_json {
            Some(raw) => serde_json::from_str::<Vec<String>>(raw).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Best available link to the lot on the source registry.
    pub fn link(&self) -> String {
        if let Some(url) = &self.direct_url {
            if !url.trim().is_empty() {
                return url.clone();
            }
        }
        if !self.registry_number.trim().is_empty() {
            return format!("{}/purchase/{}", REGISTRY_BASE_URL, self.registry_number);
        }
        REGISTRY_BASE_URL.to_string()
    }

    /// Price per square measure, or `None` when the area is unknown.
    pub fn price_per_square(&self) -> Option<f64> {
        if self.total_square > 0.0 {
            Some(self.start_price / self.total_square)
        } else {
            None
        }
    }
}
