//! # Listings Store
//!
//! SQLite-backed storage for auction listings and per-user favorites.
//! The search core treats listings as read-only; inserts exist for the
//! ingestion process and for tests. All filtered queries are scoped to
//! active listings, ordered by ascending price with descending area as the
//! tie-break, and capped at [`RESULT_LIMIT`] rows.

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, Row, ToSql};

use crate::filters::SearchFilters;
use crate::listing::Listing;

/// Maximum rows returned by a single filtered query.
pub const RESULT_LIMIT: usize = 10;

/// Maximum favorites per user.
pub const MAX_FAVORITES: usize = 10;

const LISTING_COLUMNS: &str = "id, name, registry_number, start_price, deposit_amount, \
     start_step_amount, total_square, address_description, latitude, longitude, \
     district_code, purchase_kind_name, stage_state_name, land_allowed_use_name, \
     is_active, direct_url, cadastral_number, photos_json";

/// Open a database connection with the Unicode helpers registered.
pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path).context("Failed to open database")?;
    register_functions(&conn)?;
    Ok(conn)
}

/// In-memory connection for tests.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    register_functions(&conn)?;
    Ok(conn)
}

/// Register `rlower`: SQLite's built-in `lower()` only folds ASCII, which
/// breaks case-insensitive matching of Cyrillic addresses and categories.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "rlower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )
    .context("Failed to register rlower function")?;
    Ok(())
}

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<()> {
    info!("Initializing database schema...");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS listings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            registry_number TEXT NOT NULL UNIQUE,
            start_price REAL NOT NULL,
            deposit_amount REAL DEFAULT 0,
            start_step_amount REAL DEFAULT 0,
            total_square REAL DEFAULT 0,
            address_description TEXT,
            latitude REAL,
            longitude REAL,
            district_code TEXT,
            purchase_kind_name TEXT,
            stage_state_name TEXT,
            land_allowed_use_name TEXT,
            is_active INTEGER DEFAULT 1,
            direct_url TEXT,
            cadastral_number TEXT,
            photos_json TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create listings table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_price_area ON listings (start_price, total_square)",
        [],
    )
    .context("Failed to create price/area index")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_active ON listings (is_active)",
        [],
    )
    .context("Failed to create active index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS favorites (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            telegram_id INTEGER NOT NULL,
            listing_id INTEGER NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
            added_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (telegram_id, listing_id)
        )",
        [],
    )
    .context("Failed to create favorites table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_favorites ON favorites (telegram_id, added_at)",
        [],
    )
    .context("Failed to create favorites index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn row_to_listing(row: &Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        id: row.get(0)?,
        name: row.get(1)?,
        registry_number: row.get(2)?,
        start_price: row.get(3)?,
        deposit_amount: row.get(4)?,
        start_step_amount: row.get(5)?,
        total_square: row.get(6)?,
        address_description: row.get(7)?,
        latitude: row.get(8)?,
        longitude: row.get(9)?,
        district_code: row.get(10)?,
        purchase_kind_name: row.get(11)?,
        stage_state_name: row.get(12)?,
        land_allowed_use_name: row.get(13)?,
        is_active: row.get(14)?,
        direct_url: row.get(15)?,
        cadastral_number: row.get(16)?,
        photos_json: row.get(17)?,
    })
}

/// Insert a listing, returning its row id. Used by ingestion and tests.
pub fn insert_listing(conn: &Connection, listing: &Listing) -> Result<i64> {
    conn.execute(
        "INSERT INTO listings (
            name, registry_number, start_price, deposit_amount, start_step_amount,
            total_square, address_description, latitude, longitude, district_code,
            purchase_kind_name, stage_state_name, land_allowed_use_name, is_active,
            direct_url, cadastral_number, photos_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            listing.name,
            listing.registry_number,
            listing.start_price,
            listing.deposit_amount,
            listing.start_step_amount,
            listing.total_square,
            listing.address_description,
            listing.latitude,
            listing.longitude,
            listing.district_code,
            listing.purchase_kind_name,
            listing.stage_state_name,
            listing.land_allowed_use_name,
            listing.is_active,
            listing.direct_url,
            listing.cadastral_number,
            listing.photos_json,
        ],
    )
    .context("Failed to insert listing")?;

    Ok(conn.last_insert_rowid())
}

/// Execute a filtered search over active listings.
///
/// Each present filter contributes one predicate; purpose and deal-kind
/// accept either a label list (OR-combined) or a single substring. Results
/// are ordered by ascending price, ties broken by descending area, capped
/// at [`RESULT_LIMIT`].
pub fn search_listings(conn: &Connection, filters: &SearchFilters) -> Result<Vec<Listing>> {
    let mut sql = format!(
        "SELECT {} FROM listings WHERE is_active = 1",
        LISTING_COLUMNS
    );
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(location) = &filters.location {
        sql.push_str(" AND rlower(address_description) LIKE rlower(?)");
        params.push(Box::new(format!("%{}%", location)));
        debug!("Location filter: '{}'", location);
    }

    match (&filters.purposes, &filters.purpose) {
        (Some(purposes), _) if !purposes.is_empty() => {
            let clause = vec!["rlower(land_allowed_use_name) LIKE rlower(?)"; purposes.len()]
                .join(" OR ");
            sql.push_str(&format!(" AND ({})", clause));
            for purpose in purposes {
                params.push(Box::new(format!("%{}%", purpose)));
            }
            debug!("Purpose list filter: {:?}", purposes);
        }
        (_, Some(purpose)) => {
            sql.push_str(" AND rlower(land_allowed_use_name) LIKE rlower(?)");
            params.push(Box::new(format!("%{}%", purpose)));
            debug!("Purpose filter: '{}'", purpose);
        }
        _ => {}
    }

    match (&filters.deal_kinds, &filters.deal_kind) {
        (Some(kinds), _) if !kinds.is_empty() => {
            let clause =
                vec!["rlower(purchase_kind_name) LIKE rlower(?)"; kinds.len()].join(" OR ");
            sql.push_str(&format!(" AND ({})", clause));
            for kind in kinds {
                params.push(Box::new(format!("%{}%", kind)));
            }
            debug!("Deal-kind list filter: {:?}", kinds);
        }
        (_, Some(kind)) => {
            sql.push_str(" AND rlower(purchase_kind_name) LIKE rlower(?)");
            params.push(Box::new(format!("%{}%", kind)));
            debug!("Deal-kind filter: '{}'", kind);
        }
        _ => {}
    }

    if let Some(max_price) = filters.max_price {
        sql.push_str(" AND start_price <= ?");
        params.push(Box::new(max_price));
        debug!("Price filter: <= {}", max_price);
    }

    if let Some(min_area) = filters.min_area {
        sql.push_str(" AND total_square >= ?");
        params.push(Box::new(min_area));
        debug!("Area filter: >= {}", min_area);
    }

    if let Some(max_area) = filters.max_area {
        sql.push_str(" AND total_square <= ?");
        params.push(Box::new(max_area));
        debug!("Area filter: <= {}", max_area);
    }

    if let Some(stage) = &filters.stage {
        sql.push_str(" AND rlower(stage_state_name) LIKE rlower(?)");
        params.push(Box::new(format!("%{}%", stage)));
        debug!("Stage filter: '{}'", stage);
    }

    sql.push_str(&format!(
        " ORDER BY start_price ASC, total_square DESC LIMIT {}",
        RESULT_LIMIT
    ));

    debug!("Search SQL: {}", sql);

    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare search statement")?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(&param_refs[..], row_to_listing)
        .context("Failed to execute search")?;

    let mut listings = Vec::new();
    for row in rows {
        listings.push(row.context("Failed to read listing row")?);
    }

    info!("Search returned {} listings", listings.len());
    Ok(listings)
}

/// Number of active listings.
pub fn active_count(conn: &Connection) -> Result<i64> {
    let count = conn
        .query_row(
            "SELECT COUNT(*) FROM listings WHERE is_active = 1",
            [],
            |row| row.get(0),
        )
        .context("Failed to count active listings")?;
    Ok(count)
}

/// Add a listing to a user's favorites.
///
/// Returns `false` when the per-user cap is reached or the pair already
/// exists.
pub fn add_favorite(conn: &Connection, telegram_id: i64, listing_id: i64) -> Result<bool> {
    let count = favorite_count(conn, telegram_id)?;
    if count as usize >= MAX_FAVORITES {
        info!(
            "User {} is at the favorites cap ({}), refusing to add",
            telegram_id, MAX_FAVORITES
        );
        return Ok(false);
    }

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO favorites (telegram_id, listing_id) VALUES (?1, ?2)",
            params![telegram_id, listing_id],
        )
        .context("Failed to insert favorite")?;

    Ok(inserted > 0)
}

/// Remove a favorite; returns `true` when a row was deleted.
pub fn remove_favorite(conn: &Connection, telegram_id: i64, listing_id: i64) -> Result<bool> {
    let deleted = conn
        .execute(
            "DELETE FROM favorites WHERE telegram_id = ?1 AND listing_id = ?2",
            params![telegram_id, listing_id],
        )
        .context("Failed to remove favorite")?;
    Ok(deleted > 0)
}

/// Delete all favorites for a user, returning how many were removed.
pub fn clear_favorites(conn: &Connection, telegram_id: i64) -> Result<usize> {
    let deleted = conn
        .execute(
            "DELETE FROM favorites WHERE telegram_id = ?1",
            params![telegram_id],
        )
        .context("Failed to clear favorites")?;
    Ok(deleted)
}

pub fn favorite_count(conn: &Connection, telegram_id: i64) -> Result<i64> {
    let count = conn
        .query_row(
            "SELECT COUNT(*) FROM favorites WHERE telegram_id = ?1",
            params![telegram_id],
            |row| row.get(0),
        )
        .context("Failed to count favorites")?;
    Ok(count)
}

pub fn is_favorite(conn: &Connection, telegram_id: i64, listing_id: i64) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM favorites WHERE telegram_id = ?1 AND listing_id = ?2",
            params![telegram_id, listing_id],
            |row| row.get(0),
        )
        .context("Failed to check favorite")?;
    Ok(count > 0)
}

/// All favorited listings for a user, most recently added first. This is
/// the input set the comparison engine works over.
pub fn favorite_listings(conn: &Connection, telegram_id: i64) -> Result<Vec<Listing>> {
    let sql = format!(
        "SELECT {} FROM listings l
         JOIN favorites f ON f.listing_id = l.id
         WHERE f.telegram_id = ?1
         ORDER BY f.added_at DESC",
        LISTING_COLUMNS
            .split(", ")
            .map(|c| format!("l.{}", c))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare favorites statement")?;
    let rows = stmt
        .query_map(params![telegram_id], row_to_listing)
        .context("Failed to query favorites")?;

    let mut listings = Vec::new();
    for row in rows {
        listings.push(row.context("Failed to read favorite row")?);
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_listing(registry: &str, price: f64, area: f64) -> Listing {
        Listing {
            id: 0,
            name: format!("Земельный участок {}", registry),
            registry_number: registry.to_string(),
            start_price: price,
            deposit_amount: 0.0,
            start_step_amount: 0.0,
            total_square: area,
            address_description: Some("Московская область, г. Ступино".to_string()),
            latitude: None,
            longitude: None,
            district_code: None,
            purchase_kind_name: Some("Аренда".to_string()),
            stage_state_name: Some("Прием заявок".to_string()),
            land_allowed_use_name: Some(
                "Для индивидуального жилищного строительства".to_string(),
            ),
            is_active: true,
            direct_url: None,
            cadastral_number: None,
            photos_json: None,
        }
    }

    fn setup() -> Connection {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_search_scopes_to_active() {
        let conn = setup();
        insert_listing(&conn, &test_listing("A-1", 1_000_000.0, 100.0)).unwrap();
        let mut inactive = test_listing("A-2", 500_000.0, 100.0);
        inactive.is_active = false;
        insert_listing(&conn, &inactive).unwrap();

        let results = search_listings(&conn, &SearchFilters::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registry_number, "A-1");
        assert_eq!(active_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_search_orders_price_asc_area_desc() {
        let conn = setup();
        insert_listing(&conn, &test_listing("B-1", 2_000_000.0, 100.0)).unwrap();
        insert_listing(&conn, &test_listing("B-2", 1_000_000.0, 50.0)).unwrap();
        insert_listing(&conn, &test_listing("B-3", 1_000_000.0, 200.0)).unwrap();

        let results = search_listings(&conn, &SearchFilters::default()).unwrap();
        let order: Vec<&str> = results.iter().map(|l| l.registry_number.as_str()).collect();
        assert_eq!(order, vec!["B-3", "B-2", "B-1"]);
    }

    #[test]
    fn test_search_caps_results() {
        let conn = setup();
        for i in 0..15 {
            insert_listing(
                &conn,
                &test_listing(&format!("C-{}", i), 1_000_000.0 + i as f64, 100.0),
            )
            .unwrap();
        }
        let results = search_listings(&conn, &SearchFilters::default()).unwrap();
        assert_eq!(results.len(), RESULT_LIMIT);
    }

    #[test]
    fn test_cyrillic_case_insensitive_match() {
        let conn = setup();
        insert_listing(&conn, &test_listing("D-1", 1_000_000.0, 100.0)).unwrap();

        let filters = SearchFilters {
            location: Some("СТУПИНО".to_string()),
            ..Default::default()
        };
        assert_eq!(search_listings(&conn, &filters).unwrap().len(), 1);

        let filters = SearchFilters {
            purposes: Some(vec!["для индивидуального жилищного строительства".to_string()]),
            ..Default::default()
        };
        assert_eq!(search_listings(&conn, &filters).unwrap().len(), 1);
    }

    #[test]
    fn test_purpose_list_or_combination() {
        let conn = setup();
        let mut warehouse = test_listing("E-1", 1_000_000.0, 100.0);
        warehouse.land_allowed_use_name = Some("Склад".to_string());
        insert_listing(&conn, &warehouse).unwrap();
        insert_listing(&conn, &test_listing("E-2", 2_000_000.0, 100.0)).unwrap();

        let filters = SearchFilters {
            purposes: Some(vec![
                "Склад".to_string(),
                "Складские площадки".to_string(),
            ]),
            ..Default::default()
        };
        let results = search_listings(&conn, &filters).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registry_number, "E-1");
    }

    #[test]
    fn test_price_and_area_bounds() {
        let conn = setup();
        insert_listing(&conn, &test_listing("F-1", 1_000_000.0, 500.0)).unwrap();
        insert_listing(&conn, &test_listing("F-2", 3_000_000.0, 2000.0)).unwrap();

        let filters = SearchFilters {
            max_price: Some(2_000_000.0),
            ..Default::default()
        };
        assert_eq!(search_listings(&conn, &filters).unwrap().len(), 1);

        let filters = SearchFilters {
            min_area: Some(1000.0),
            max_area: Some(3000.0),
            ..Default::default()
        };
        let results = search_listings(&conn, &filters).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registry_number, "F-2");
    }

    #[test]
    fn test_deal_kind_filter() {
        let conn = setup();
        insert_listing(&conn, &test_listing("G-1", 1_000_000.0, 100.0)).unwrap();
        let mut sale = test_listing("G-2", 1_000_000.0, 100.0);
        sale.purchase_kind_name = Some("Продажа".to_string());
        insert_listing(&conn, &sale).unwrap();

        let filters = SearchFilters {
            deal_kinds: Some(vec!["Продажа".to_string()]),
            ..Default::default()
        };
        let results = search_listings(&conn, &filters).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registry_number, "G-2");
    }

    #[test]
    fn test_stage_filter_substring_case_insensitive() {
        let conn = setup();
        insert_listing(&conn, &test_listing("S-1", 1_000_000.0, 100.0)).unwrap();
        let mut finished = test_listing("S-2", 1_000_000.0, 100.0);
        finished.stage_state_name = Some("Торги завершены".to_string());
        insert_listing(&conn, &finished).unwrap();

        let filters = SearchFilters {
            stage: Some("ПРИЕМ ЗАЯВОК".to_string()),
            ..Default::default()
        };
        let results = search_listings(&conn, &filters).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registry_number, "S-1");

        // Partial stage wording still matches as a substring
        let filters = SearchFilters {
            stage: Some("завершен".to_string()),
            ..Default::default()
        };
        let results = search_listings(&conn, &filters).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registry_number, "S-2");
    }

    #[test]
    fn test_favorites_cap_and_uniqueness() {
        let conn = setup();
        let mut ids = Vec::new();
        for i in 0..12 {
            let id = insert_listing(
                &conn,
                &test_listing(&format!("H-{}", i), 1_000_000.0, 100.0),
            )
            .unwrap();
            ids.push(id);
        }

        for id in ids.iter().take(MAX_FAVORITES) {
            assert!(add_favorite(&conn, 42, *id).unwrap());
        }
        // Duplicate pair and over-cap additions are refused
        assert!(!add_favorite(&conn, 42, ids[0]).unwrap());
        assert!(!add_favorite(&conn, 42, ids[10]).unwrap());

        assert_eq!(favorite_count(&conn, 42).unwrap(), MAX_FAVORITES as i64);
        assert!(is_favorite(&conn, 42, ids[0]).unwrap());
        assert_eq!(favorite_listings(&conn, 42).unwrap().len(), MAX_FAVORITES);

        assert!(remove_favorite(&conn, 42, ids[0]).unwrap());
        assert!(!is_favorite(&conn, 42, ids[0]).unwrap());
        assert_eq!(clear_favorites(&conn, 42).unwrap(), MAX_FAVORITES - 1);
    }
}
