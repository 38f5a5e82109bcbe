//! # Natural-Language Search
//!
//! Orchestrates the full query pipeline: model-assisted filter extraction,
//! filtered execution against the store, the relaxation ladder on zero
//! results, and the deterministic keyword fallback as the ultimate safety
//! net. The pipeline never raises on extraction or model failures: every
//! degraded path lands in the fallback, and the fallback itself returns an
//! empty list rather than scanning the whole table.

use anyhow::Result;
use log::{info, warn};
use rusqlite::Connection;
use std::sync::Arc;

use crate::extractor;
use crate::filters::SearchFilters;
use crate::listing::Listing;
use crate::llm::LanguageModel;
use crate::store;
use crate::vocabulary;

/// Sampling parameters for the extraction request.
const EXTRACTION_TEMPERATURE: f32 = 0.2;
const EXTRACTION_MAX_TOKENS: u32 = 300;

/// Natural-language search over the listings store.
///
/// The language model is optional: without one, every query goes straight
/// to the deterministic fallback extractor.
pub struct SearchService {
    llm: Option<Arc<dyn LanguageModel>>,
}

impl SearchService {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { llm }
    }

    /// Resolve a free-text query to a ranked list of listings.
    ///
    /// Pipeline: model-assisted extraction → execution → relaxation ladder
    /// → keyword fallback. An empty result is a normal outcome, not an
    /// error; only store failures propagate.
    pub async fn search_by_natural_language(
        &self,
        conn: &Connection,
        user_query: &str,
    ) -> Result<Vec<Listing>> {
        info!("Search started for query: '{}'", user_query);

        let filters = match self.extract_with_model(user_query).await {
            Some(filters) => filters,
            None => {
                info!("Model extraction unavailable or empty, using fallback");
                return self.fallback_search(conn, user_query);
            }
        };

        info!("Extracted filters: {:?}", filters);

        let results = execute_with_relaxation(conn, &filters)?;
        if !results.is_empty() {
            info!("Search finished with {} listings", results.len());
            return Ok(results);
        }

        warn!("Relaxed search still empty, trying keyword fallback");
        self.fallback_search(conn, user_query)
    }

    /// Strategy A: ask the model for structured filters and expand the
    /// purpose label to the canonical list used by the store.
    async fn extract_with_model(&self, user_query: &str) -> Option<SearchFilters> {
        let llm = self.llm.as_ref()?;

        let messages = extractor::build_llm_messages(user_query);
        let response = llm
            .ask(&messages, EXTRACTION_TEMPERATURE, EXTRACTION_MAX_TOKENS)
            .await?;

        let mut filters = extractor::parse_llm_response(&response, user_query)?;

        if let Some(purpose) = &filters.purpose {
            let expanded = vocabulary::match_purposes(purpose);
            if !expanded.is_empty() {
                info!("Purpose '{}' expanded to {:?}", purpose, expanded);
                filters.purposes = Some(expanded);
            } else {
                warn!("Purpose '{}' not in the mapping, keeping as substring", purpose);
            }
        }

        Some(filters)
    }

    /// Strategy B: deterministic extraction, then one plain execution. No
    /// signal in the query means an empty result by design.
    fn fallback_search(&self, conn: &Connection, user_query: &str) -> Result<Vec<Listing>> {
        match extractor::fallback_filters(user_query) {
            Some(mut filters) => {
                filters.normalize();
                info!("Fallback filters: {:?}", filters);
                let results = store::search_listings(conn, &filters)?;
                info!("Fallback search found {} listings", results.len());
                Ok(results)
            }
            None => {
                warn!("No search criteria recognized, returning empty result");
                Ok(Vec::new())
            }
        }
    }
}

/// Execute a filter set, and on zero rows retry once with the relaxed
/// variant (price ceiling ×1.5, area and stage bounds dropped).
pub fn execute_with_relaxation(
    conn: &Connection,
    filters: &SearchFilters,
) -> Result<Vec<Listing>> {
    let results = store::search_listings(conn, filters)?;
    if !results.is_empty() {
        return Ok(results);
    }

    warn!("Strict filters matched nothing, relaxing");
    store::search_listings(conn, &filters.relaxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;
    use async_trait::async_trait;

    /// Canned model for pipeline tests.
    struct ScriptedModel {
        response: Option<String>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn ask(&self, _: &[ChatMessage], _: f32, _: u32) -> Option<String> {
            self.response.clone()
        }
    }

    fn listing(registry: &str, price: f64, area: f64, purpose: &str) -> Listing {
        Listing {
            id: 0,
            name: format!("Лот {}", registry),
            registry_number: registry.to_string(),
            start_price: price,
            deposit_amount: 0.0,
            start_step_amount: 0.0,
            total_square: area,
            address_description: Some("Московская область, Ступино".to_string()),
            latitude: None,
            longitude: None,
            district_code: None,
            purchase_kind_name: Some("Аренда".to_string()),
            stage_state_name: Some("Прием заявок".to_string()),
            land_allowed_use_name: Some(purpose.to_string()),
            is_active: true,
            direct_url: None,
            cadastral_number: None,
            photos_json: None,
        }
    }

    fn setup() -> Connection {
        let conn = store::open_in_memory().unwrap();
        store::init_schema(&conn).unwrap();
        conn
    }

    #[tokio::test]
    async fn test_model_extraction_path() {
        let conn = setup();
        store::insert_listing(
            &conn,
            &listing(
                "M-1",
                1_500_000.0,
                1000.0,
                "Для индивидуального жилищного строительства",
            ),
        )
        .unwrap();

        let model = ScriptedModel {
            response: Some(r#"{"purpose": "ИЖС", "max_price": 2000000}"#.to_string()),
        };
        let service = SearchService::new(Some(Arc::new(model)));

        let results = service
            .search_by_natural_language(&conn, "ИЖС до 2 млн")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registry_number, "M-1");
    }

    #[tokio::test]
    async fn test_garbage_model_response_falls_back() {
        let conn = setup();
        store::insert_listing(
            &conn,
            &listing(
                "M-2",
                1_500_000.0,
                1000.0,
                "Для индивидуального жилищного строительства",
            ),
        )
        .unwrap();

        let model = ScriptedModel {
            response: Some("извините, не могу помочь".to_string()),
        };
        let service = SearchService::new(Some(Arc::new(model)));

        // Fallback keyword extraction still resolves "ижс" + "2 млн"
        let results = service
            .search_by_natural_language(&conn, "ИЖС до 2 млн")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_model_silence_falls_back() {
        let conn = setup();
        store::insert_listing(&conn, &listing("M-3", 900_000.0, 500.0, "Склад")).unwrap();

        let model = ScriptedModel { response: None };
        let service = SearchService::new(Some(Arc::new(model)));

        let results = service
            .search_by_natural_language(&conn, "склад до 1 млн")
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_relaxation_ladder_price() {
        let conn = setup();
        store::insert_listing(
            &conn,
            &listing(
                "R-1",
                1_400_000.0,
                800.0,
                "Для индивидуального жилищного строительства",
            ),
        )
        .unwrap();

        // Strict ceiling misses; ×1.5 covers 1.4M
        let filters = SearchFilters {
            max_price: Some(1_000_000.0),
            ..Default::default()
        };
        let results = execute_with_relaxation(&conn, &filters).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registry_number, "R-1");
    }

    #[test]
    fn test_relaxation_drops_area_bounds() {
        let conn = setup();
        store::insert_listing(&conn, &listing("R-2", 500_000.0, 50.0, "Склад")).unwrap();

        let filters = SearchFilters {
            purposes: Some(vec!["Склад".to_string()]),
            min_area: Some(1000.0),
            ..Default::default()
        };
        let results = execute_with_relaxation(&conn, &filters).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_unrecognizable_query_returns_empty_without_error() {
        let conn = setup();
        let service = SearchService::new(None);

        let results = service
            .search_by_natural_language(&conn, "покажи что-нибудь хорошее")
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
