//! # Torgibot Search Core
//!
//! Natural-language search over land/property auction listings scraped
//! from a public registry. Free user text is resolved to structured
//! filters (by an external language model when one is configured, by
//! deterministic keyword extraction otherwise), executed against a SQLite
//! listings store with a progressive relaxation ladder, and optionally
//! ranked and compared by price, area, price-per-square or distance.

pub mod comparison;
pub mod extractor;
pub mod filters;
pub mod geocoder;
pub mod listing;
pub mod llm;
pub mod search;
pub mod settings;
pub mod store;
pub mod vocabulary;
