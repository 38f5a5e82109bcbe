//! # Filter Extractor
//!
//! Turns free user text into [`SearchFilters`](crate::filters::SearchFilters)
//! via two strategies:
//!
//! - **Model-assisted**: a fixed instruction template asks the language
//!   model for one strict JSON object; the response is parsed defensively
//!   (code fences stripped, first balanced-brace span located, fields
//!   decoded one by one with per-field failure tolerance).
//! - **Deterministic fallback**: keyword/regex scanning over the raw query,
//!   applied when the model is unavailable, errors, or yields nothing.
//!
//! The fallback deliberately refuses to produce an unconstrained filter
//! set: a query with no recognizable signal returns `None`, never an
//! implicit full-table scan.

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde_json::Value;

use crate::filters::SearchFilters;
use crate::llm::ChatMessage;
use crate::vocabulary;

/// Standalone numbers below this are not believable as a price in rubles
/// ("10 соток" must not become a 10-ruble ceiling).
const BARE_PRICE_FLOOR: f64 = 100_000.0;

const SYSTEM_PROMPT: &str = "Ты — ассистент по поиску земельных участков и имущества \
на торгах. Извлекай параметры поиска из запросов пользователей точно и без домыслов.";

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"```(?:json)?\s*").expect("code fence pattern should be valid");
    static ref DIGIT_RUNS: Regex = Regex::new(r"\d+").expect("digit pattern should be valid");
    static ref NON_NUMERIC: Regex =
        Regex::new(r"[^\d.\-]").expect("numeric cleanup pattern should be valid");
}

/// Build the chat messages that request structured extraction from the
/// language model: a strict single-JSON-object contract with the keys
/// `location`, `purpose`, `max_price`, `min_area`, `max_area`.
pub fn build_llm_messages(user_query: &str) -> Vec<ChatMessage> {
    let instruction = format!(
        r#"Извлеки параметры из запроса пользователя и верни их СТРОГО в формате JSON.

**ОБЯЗАТЕЛЬНАЯ СХЕМА JSON:**
{{
  "location": "название города/района без сокращений",
  "purpose": "полное официальное название категории земли",
  "max_price": число в рублях,
  "min_area": число в кв.м,
  "max_area": число в кв.м
}}

**ПРАВИЛА НОРМАЛИЗАЦИИ:**

1. location — полное название БЕЗ сокращений ("Ступино", не "г. Ступино").
2. purpose — переводи сокращения в официальные формулировки:
   "ИЖС" -> "Для индивидуального жилищного строительства",
   "ЛПХ" -> "Для ведения личного подсобного хозяйства",
   "КФХ" -> "Для крестьянского (фермерского) хозяйства",
   "сельхоз" -> "Для сельскохозяйственного производства",
   "бизнес" -> "Для размещения объектов торговли, общественного питания и бытового обслуживания".
3. Цены и площади — только числа в базовых единицах:
   "до 2 млн" -> "max_price": 2000000,
   "от 10 соток" -> "min_area": 1000 (1 сотка = 100 кв.м),
   "5 га" -> 50000 (1 га = 10000 кв.м).

**ВАЖНО:**
- Если параметр НЕ указан — НЕ ВКЛЮЧАЙ его в JSON
- НЕ ПРИДУМЫВАЙ данные
- Ответ должен содержать ТОЛЬКО валидный JSON, без текста до/после

**Запрос пользователя:**
"{user_query}"

**Твой ответ (только JSON):**"#
    );

    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(instruction),
    ]
}

/// Locate the first balanced-brace JSON object inside free-form text.
///
/// The scanner is string- and escape-aware so braces inside string values
/// do not confuse the depth count.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pull a numeric value out of a JSON field that may be a native number or
/// a string like "2000000 руб". Unusable values log and yield `None` so a
/// single bad field never aborts the whole parse.
fn parse_numeric_value(value: &Value, field_name: &str) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = NON_NUMERIC.replace_all(s, "");
            if cleaned.is_empty() {
                warn!("Could not extract a number from {}: '{}'", field_name, s);
                return None;
            }
            match cleaned.parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Could not parse number from {}: '{}'", field_name, s);
                    None
                }
            }
        }
        Value::Null => None,
        other => {
            warn!("Unexpected JSON type for {}: {:?}", field_name, other);
            None
        }
    }
}

/// Area fields additionally run through unit conversion, with the original
/// user query as disambiguation context.
fn parse_area_value(value: &Value, field_name: &str, original_query: &str) -> Option<f64> {
    let raw = parse_numeric_value(value, field_name)?;
    if raw <= 0.0 {
        warn!("{} must be positive, got {}", field_name, raw);
        return None;
    }
    Some(vocabulary::convert_area_units(raw, original_query).round())
}

/// Parse the model's raw completion into filters.
///
/// Returns `None` when no JSON object can be decoded or when zero usable
/// fields were extracted; the caller must then fall back to
/// [`fallback_filters`].
pub fn parse_llm_response(response: &str, original_query: &str) -> Option<SearchFilters> {
    if response.trim().is_empty() {
        warn!("Language model returned an empty response");
        return None;
    }

    let without_fences = CODE_FENCE.replace_all(response, "");
    let json_text = match extract_json_object(&without_fences) {
        Some(span) => span,
        None => {
            let preview: String = response.chars().take(200).collect();
            warn!("No JSON object found in model response: '{}'", preview);
            return None;
        }
    };

    debug!("Extracted JSON candidate: {}", json_text);

    let data: Value = match serde_json::from_str(json_text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Model response is not valid JSON: {}", e);
            return None;
        }
    };

    let mut filters = SearchFilters::default();

    if let Some(location) = data.get("location").and_then(|v| v.as_str()) {
        let cleaned = vocabulary::clean_location(location);
        if !cleaned.is_empty() {
            info!("Extracted location: '{}'", cleaned);
            filters.location = Some(cleaned);
        }
    }

    if let Some(purpose) = data.get("purpose").and_then(|v| v.as_str()) {
        let trimmed = purpose.trim();
        if !trimmed.is_empty() {
            let canonical = vocabulary::canonical_purpose(trimmed);
            if canonical != trimmed {
                info!("Purpose normalized: '{}' -> '{}'", trimmed, canonical);
            } else {
                info!("Extracted purpose: '{}'", canonical);
            }
            filters.purpose = Some(canonical);
        }
    }

    if let Some(value) = data.get("max_price") {
        match parse_numeric_value(value, "max_price") {
            Some(price) if price > 0.0 => {
                info!("Extracted max_price: {}", price);
                filters.max_price = Some(price);
            }
            Some(price) => warn!("Ignoring non-positive max_price: {}", price),
            None => {}
        }
    }

    if let Some(value) = data.get("min_area") {
        if let Some(area) = parse_area_value(value, "min_area", original_query) {
            info!("Extracted min_area: {}", area);
            filters.min_area = Some(area);
        }
    }

    if let Some(value) = data.get("max_area") {
        if let Some(area) = parse_area_value(value, "max_area", original_query) {
            info!("Extracted max_area: {}", area);
            filters.max_area = Some(area);
        }
    }

    filters.normalize();

    if filters.is_empty() {
        warn!("No usable field extracted from the model response");
        None
    } else {
        Some(filters)
    }
}

/// Largest numeric token in the query interpreted as a price ceiling.
///
/// Unit words scale the value; a bare number is accepted only when it is
/// already large enough to be a believable ruble amount.
fn fallback_price(lower_query: &str) -> Option<f64> {
    let max_number = DIGIT_RUNS
        .find_iter(lower_query)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .fold(None::<f64>, |acc, n| Some(acc.map_or(n, |a| a.max(n))))?;

    if lower_query.contains("млн") || lower_query.contains("миллион") {
        Some(max_number * 1_000_000.0)
    } else if lower_query.contains("тыс") || lower_query.contains("тысяч") {
        Some(max_number * 1_000.0)
    } else if max_number > BARE_PRICE_FLOOR {
        Some(max_number)
    } else {
        None
    }
}

/// Strategy B: deterministic keyword extraction over the raw query.
///
/// Scans for a purpose keyword, a deal-kind keyword, a known city and a
/// price signal. When none of the four is found the function returns
/// `None`; an unconstrained match-everything search is never produced.
pub fn fallback_filters(user_query: &str) -> Option<SearchFilters> {
    let lower = user_query.to_lowercase();
    let mut filters = SearchFilters::default();

    if let Some(purposes) = vocabulary::first_purpose_match(&lower) {
        info!("Fallback purpose filter: {:?}", purposes);
        filters.purposes = Some(purposes);
    }

    if let Some(deal_kinds) = vocabulary::first_deal_match(&lower) {
        info!("Fallback deal-kind filter: {:?}", deal_kinds);
        filters.deal_kinds = Some(deal_kinds);
    }

    if let Some(city) = vocabulary::match_city(&lower) {
        info!("Fallback city filter: '{}'", city);
        filters.location = Some(city);
    }

    if let Some(price) = fallback_price(&lower) {
        info!("Fallback price filter: {}", price);
        filters.max_price = Some(price);
    }

    if filters.is_empty() {
        warn!("Fallback extraction found no search signal, refusing to scan everything");
        None
    } else {
        Some(filters)
    }
}
