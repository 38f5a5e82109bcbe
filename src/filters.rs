//! # Search Filters
//!
//! Structured constraint set produced by the filter extractor and consumed
//! by the query executor. Every field is optional and explicitly typed so
//! the relaxation ladder and the tests can be exhaustive.

use log::info;

/// Price ceiling multiplier applied by the relaxation ladder.
const RELAXED_PRICE_FACTOR: f64 = 1.5;

/// Structured search constraints extracted from one user query.
///
/// Built fresh per query and never persisted. `purposes`/`deal_kinds` are
/// the list variants produced by vocabulary normalization; the single
/// `purpose`/`deal_kind` fields are kept for raw values that the tables
/// could not expand and are matched as plain substrings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub location: Option<String>,
    pub purpose: Option<String>,
    pub purposes: Option<Vec<String>>,
    pub deal_kind: Option<String>,
    pub deal_kinds: Option<Vec<String>>,
    pub max_price: Option<f64>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub stage: Option<String>,
}

impl SearchFilters {
    /// True when no constraint at all is set.
    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.purpose.is_none()
            && self.purposes.is_none()
            && self.deal_kind.is_none()
            && self.deal_kinds.is_none()
            && self.max_price.is_none()
            && self.min_area.is_none()
            && self.max_area.is_none()
            && self.stage.is_none()
    }

    /// Repair inverted area bounds. Invariant after the call:
    /// `min_area <= max_area` whenever both are present.
    pub fn normalize(&mut self) {
        if let (Some(min), Some(max)) = (self.min_area, self.max_area) {
            if min > max {
                info!("Area bounds inverted ({} > {}), swapping", min, max);
                self.min_area = Some(max);
                self.max_area = Some(min);
            }
        }
    }

    /// One step down the relaxation ladder: location and purpose/deal-kind
    /// constraints survive, the price ceiling grows by half, area and stage
    /// constraints are dropped.
    pub fn relaxed(&self) -> SearchFilters {
        let relaxed = SearchFilters {
            location: self.location.clone(),
            purpose: self.purpose.clone(),
            purposes: self.purposes.clone(),
            deal_kind: self.deal_kind.clone(),
            deal_kinds: self.deal_kinds.clone(),
            max_price: self.max_price.map(|p| p * RELAXED_PRICE_FACTOR),
            min_area: None,
            max_area: None,
            stage: None,
        };
        if let (Some(before), Some(after)) = (self.max_price, relaxed.max_price) {
            info!("Relaxed price ceiling: {} -> {}", before, after);
        }
        relaxed
    }
}
