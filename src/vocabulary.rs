//! # Vocabulary Normalizer
//!
//! Maps free-text user vocabulary onto the canonical labels used by the
//! listings store: land-use purposes, deal kinds, city names and units of
//! area. All tables are declarative constant slices so that every entry can
//! be enumerated by tests; matching walks each slice in declaration order
//! and the first hit wins wherever a single match is needed. More specific
//! keywords are declared before generic ones.

use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;

/// Keyword → canonical land-use labels as stored in the registry.
///
/// Many-to-many on purpose: user vocabulary is coarser than the registry
/// categories, so one keyword may fan out into several canonical labels.
/// Matching is case-insensitive substring containment of the keyword.
pub const PURPOSE_KEYWORDS: &[(&str, &[&str])] = &[
    ("торгов", &["Магазины", "Объекты торговли", "Рынки"]),
    (
        "предприним",
        &["Производственная деятельность", "Деловое управление"],
    ),
    (
        "бизнес",
        &["Производственная деятельность", "Деловое управление", "Склад"],
    ),
    (
        "коммерч",
        &[
            "Производственная деятельность",
            "Магазины",
            "Бытовое обслуживание",
        ],
    ),
    ("ижс", &["Для индивидуального жилищного строительства"]),
    ("жилищн", &["Для индивидуального жилищного строительства"]),
    // Broad stem: also fires inside words like "Домодедово". Accepted as a
    // recall/precision trade-off; more specific stems are declared above it.
    ("дом", &["Для индивидуального жилищного строительства"]),
    (
        "сельхоз",
        &[
            "Для ведения личного подсобного хозяйства",
            "Растениеводство",
            "Скотоводство",
            "Сельскохозяйственное использование",
        ],
    ),
    ("лпх", &["Для ведения личного подсобного хозяйства"]),
    ("садовод", &["Ведение садоводства"]),
    ("склад", &["Склад", "Складские площадки"]),
    (
        "производ",
        &["Производственная деятельность", "Строительная промышленность"],
    ),
    ("обслуж", &["Бытовое обслуживание", "Коммунальное обслуживание"]),
    ("гараж", &["Хранение автотранспорта", "Служебные гаражи"]),
];

/// Exact lowercase phrase → official category label. Applied to the
/// language model's `purpose` output as insurance when it echoes a user
/// abbreviation instead of the official wording.
pub const PURPOSE_CANONICAL: &[(&str, &str)] = &[
    ("ижс", "Для индивидуального жилищного строительства"),
    ("под дом", "Для индивидуального жилищного строительства"),
    ("для дома", "Для индивидуального жилищного строительства"),
    ("жилой дом", "Для индивидуального жилищного строительства"),
    (
        "индивидуальное жилищное строительство",
        "Для индивидуального жилищного строительства",
    ),
    ("лпх", "Для ведения личного подсобного хозяйства"),
    ("личное подсобное", "Для ведения личного подсобного хозяйства"),
    (
        "личное подсобное хозяйство",
        "Для ведения личного подсобного хозяйства",
    ),
    ("кфх", "Для крестьянского (фермерского) хозяйства"),
    ("фермерское", "Для крестьянского (фермерского) хозяйства"),
    ("ферма", "Для крестьянского (фермерского) хозяйства"),
    (
        "крестьянское хозяйство",
        "Для крестьянского (фермерского) хозяйства",
    ),
    ("сельхоз", "Для сельскохозяйственного производства"),
    ("сельское хозяйство", "Для сельскохозяйственного производства"),
    (
        "сельскохозяйственное производство",
        "Для сельскохозяйственного производства",
    ),
    (
        "бизнес",
        "Для размещения объектов торговли, общественного питания и бытового обслуживания",
    ),
    (
        "коммерция",
        "Для размещения объектов торговли, общественного питания и бытового обслуживания",
    ),
    (
        "магазин",
        "Для размещения объектов торговли, общественного питания и бытового обслуживания",
    ),
    (
        "офис",
        "Для размещения объектов торговли, общественного питания и бытового обслуживания",
    ),
    (
        "торговля",
        "Для размещения объектов торговли, общественного питания и бытового обслуживания",
    ),
];

/// Deal-kind keyword → canonical `purchase_kind_name` labels.
pub const DEAL_KEYWORDS: &[(&str, &[&str])] = &[
    ("аренд", &["Аренда"]),
    ("снять", &["Аренда"]),
    ("сдач", &["Аренда"]),
    ("прода", &["Продажа"]),
    ("покупк", &["Продажа"]),
    ("купить", &["Продажа"]),
    ("куплю", &["Продажа"]),
    ("выкуп", &["Продажа"]),
    ("приобрет", &["Продажа"]),
];

/// Grammatical-case variants → canonical city name. Russian declension
/// means "в Ступине" and "Ступино" must land on the same store value.
pub const CITY_FORMS: &[(&str, &str)] = &[
    ("ступин", "ступино"),
    ("мытищ", "мытищи"),
    ("люберц", "люберцы"),
    ("химк", "химки"),
    ("королёв", "королёв"),
    ("королев", "королёв"),
    ("подольск", "подольск"),
    ("балаших", "балашиха"),
    ("красногорск", "красногорск"),
    ("одинцов", "одинцово"),
    ("щёлков", "щёлково"),
    ("щелков", "щёлково"),
    ("орехов", "орехово"),
    ("электростал", "электросталь"),
    ("сергиев", "сергиев посад"),
    ("посад", "сергиев посад"),
];

/// Cities probed by the fallback extractor, beyond the declension table.
pub const KNOWN_CITIES: &[&str] = &[
    "балашиха",
    "подольск",
    "химки",
    "королёв",
    "мытищи",
    "люберцы",
    "электросталь",
    "коломна",
    "красногорск",
    "одинцово",
    "серпухов",
    "щёлково",
    "орехово",
    "долгопрудн",
    "жуковск",
    "пушкино",
    "реутов",
    "сергиев посад",
    "воскресенск",
    "лобня",
    "клин",
    "ивантеевка",
    "дубна",
    "раменск",
    "домодедово",
    "ступино",
    "чехов",
    "фрязино",
    "лыткарино",
    "дзержинск",
];

// One сотка is 100 m², one hectare is 10 000 m².
const SQUARES_PER_SOTKA: f64 = 100.0;
const SQUARES_PER_HECTARE: f64 = 10_000.0;

// Values at or above these already look like square metres, so the unit
// multiplier is skipped for them.
const SOTKA_AMBIGUITY_LIMIT: f64 = 1000.0;
const HECTARE_AMBIGUITY_LIMIT: f64 = 100.0;

lazy_static! {
    // "га" must match as a standalone word: plain containment would fire on
    // "гараж" or "дорога".
    static ref HECTARE_TOKEN: Regex =
        Regex::new(r"(?i)\bга\b|гектар").expect("hectare pattern should be valid");
    static ref ADMIN_PREFIXES: Regex = Regex::new(
        r"(?i)\s*(г\.о\.|м\.р\.|г\.|пос\.|д\.|с\.|город|район|поселок|посёлок|деревня|село)\s*"
    )
    .expect("admin prefix pattern should be valid");
    static ref MULTI_SPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern should be valid");
}

/// Collect every canonical purpose label whose keyword appears in `text`,
/// de-duplicated in first-seen order.
pub fn match_purposes(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut labels: Vec<String> = Vec::new();

    for (keyword, canonical) in PURPOSE_KEYWORDS {
        if lower.contains(keyword) {
            debug!("Purpose keyword '{}' matched: {:?}", keyword, canonical);
            for label in *canonical {
                if !labels.iter().any(|l| l == label) {
                    labels.push((*label).to_string());
                }
            }
        }
    }

    if !labels.is_empty() {
        info!("Normalized purposes for '{}': {:?}", text, labels);
    }
    labels
}

/// Canonical labels of the first purpose keyword found in `text`, if any.
/// Used in single-match contexts such as the fallback extractor.
pub fn first_purpose_match(text: &str) -> Option<Vec<String>> {
    let lower = text.to_lowercase();
    for (keyword, canonical) in PURPOSE_KEYWORDS {
        if lower.contains(keyword) {
            debug!("First purpose keyword: '{}'", keyword);
            return Some(canonical.iter().map(|l| (*l).to_string()).collect());
        }
    }
    None
}

/// Official category label for an exact purpose phrase, or the input
/// unchanged when the phrase is not in the table.
pub fn canonical_purpose(raw: &str) -> String {
    let normalized = raw.trim().to_lowercase();
    for (phrase, official) in PURPOSE_CANONICAL {
        if normalized == *phrase {
            return (*official).to_string();
        }
    }
    raw.to_string()
}

/// Canonical deal-kind labels of the first deal keyword found in `text`.
/// Unmapped vocabulary is silently dropped.
pub fn first_deal_match(text: &str) -> Option<Vec<String>> {
    let lower = text.to_lowercase();
    for (keyword, canonical) in DEAL_KEYWORDS {
        if lower.contains(keyword) {
            debug!("Deal keyword: '{}' -> {:?}", keyword, canonical);
            return Some(canonical.iter().map(|l| (*l).to_string()).collect());
        }
    }
    None
}

/// Canonical city name for an arbitrary location fragment, handling
/// grammatical case variation via the declension table.
pub fn normalize_city(city: &str) -> String {
    let lower = city.trim().to_lowercase();
    for (form, canonical) in CITY_FORMS {
        if lower.contains(form) {
            return (*canonical).to_string();
        }
    }
    lower
}

/// First known city whose declension stem or full name appears in `text`.
pub fn match_city(text: &str) -> Option<String> {
    let lower = text.to_lowercase();

    // Stems first: "в Химках" must land on "химки"
    for (form, canonical) in CITY_FORMS {
        if lower.contains(form) {
            debug!("City stem match: '{}' -> '{}'", form, canonical);
            return Some((*canonical).to_string());
        }
    }
    for city in KNOWN_CITIES {
        if lower.contains(city) {
            debug!("City match: '{}'", city);
            return Some((*city).to_string());
        }
    }
    None
}

/// Normalize an area value to square metres using unit words from the
/// original query as disambiguation context.
///
/// Conservative on purpose: a value that already looks like square metres
/// (≥ 1000 next to "соток", ≥ 100 next to "га") is left untouched.
///
/// ```
/// use torgibot::vocabulary::convert_area_units;
///
/// assert_eq!(convert_area_units(10.0, "участок 10 соток"), 1000.0);
/// assert_eq!(convert_area_units(5.0, "5 га под ферму"), 50000.0);
/// assert_eq!(convert_area_units(1500.0, "1500 соток"), 1500.0);
/// assert_eq!(convert_area_units(10.0, "участок 10"), 10.0);
/// ```
pub fn convert_area_units(value: f64, query_text: &str) -> f64 {
    let lower = query_text.to_lowercase();

    if lower.contains("сотк") || lower.contains("сотка") || lower.contains("соток") {
        if value < SOTKA_AMBIGUITY_LIMIT {
            info!("Sotka unit detected, converting {} to {}", value, value * SQUARES_PER_SOTKA);
            return value * SQUARES_PER_SOTKA;
        }
    } else if HECTARE_TOKEN.is_match(&lower) && value < HECTARE_AMBIGUITY_LIMIT {
        info!(
            "Hectare unit detected, converting {} to {}",
            value,
            value * SQUARES_PER_HECTARE
        );
        return value * SQUARES_PER_HECTARE;
    }

    value
}

/// Strip administrative prefixes ("г.", "пос.", "город", ...) from a
/// location string and collapse repeated whitespace.
///
/// ```
/// use torgibot::vocabulary::clean_location;
///
/// assert_eq!(clean_location("г. Ступино"), "Ступино");
/// assert_eq!(clean_location("город  Химки"), "Химки");
/// ```
pub fn clean_location(location: &str) -> String {
    let stripped = ADMIN_PREFIXES.replace_all(location, " ");
    MULTI_SPACE.replace_all(&stripped, " ").trim().to_string()
}
