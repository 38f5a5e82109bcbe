//! # Comparison Engine
//!
//! Pure functions over an in-memory listing set: ranked orderings by
//! price, area, price-per-square or distance from a reference point, plus
//! recommendation summaries. Listings without the data a sort key needs
//! (zero area, missing coordinates) sort to the end via an infinite
//! sentinel instead of being dropped.

use log::debug;
use std::cmp::Ordering;

use crate::listing::Listing;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Sort key for listing comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Price,
    Area,
    PricePerSquare,
    Distance,
}

/// A recommended listing with its 1-based position in the input ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    /// 1-based position in the input sequence passed to the recommender.
    pub position: usize,
    pub listing_id: i64,
    /// The metric that won: price, area, price-per-square or distance.
    pub value: f64,
}

/// Best listings by each independent criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendations {
    pub best_price: Pick,
    pub best_area: Pick,
    /// Minimum price-per-square among positive-area listings, if any.
    pub best_value: Option<Pick>,
    /// Nearest listing with coordinates, when a reference point was given.
    pub nearest: Option<Pick>,
}

/// Great-circle distance between two points in kilometers (haversine).
///
/// ```
/// use torgibot::comparison::haversine;
///
/// let d = haversine(55.0, 37.0, 55.0, 37.0);
/// assert_eq!(d, 0.0);
///
/// let moscow_to_spb = haversine(55.7558, 37.6173, 59.9311, 30.3609);
/// assert!((moscow_to_spb - 634.0).abs() < 5.0);
/// ```
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Price per square measure, or infinity when the area is unknown so the
/// listing sorts after every priced-by-area one.
pub fn price_per_square_key(listing: &Listing) -> f64 {
    listing.price_per_square().unwrap_or(f64::INFINITY)
}

/// Distance in kilometers from a reference point, or infinity when the
/// listing has no coordinates.
pub fn distance_km(listing: &Listing, reference: (f64, f64)) -> f64 {
    match (listing.latitude, listing.longitude) {
        (Some(lat), Some(lon)) => haversine(reference.0, reference.1, lat, lon),
        _ => f64::INFINITY,
    }
}

fn sort_by_key<F>(listings: &[Listing], reverse: bool, key: F) -> Vec<Listing>
where
    F: Fn(&Listing) -> f64,
{
    let mut sorted: Vec<Listing> = listings.to_vec();
    sorted.sort_by(|a, b| {
        let ordering = key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal);
        if reverse {
            ordering.reverse()
        } else {
            ordering
        }
    });
    sorted
}

/// Order a listing set by the given key.
///
/// Distance sorting without a reference point is a no-op returning the
/// input unchanged; the caller is expected to have asked the user for a
/// location first.
pub fn compare(
    listings: &[Listing],
    sort_by: SortKey,
    reverse: bool,
    reference: Option<(f64, f64)>,
) -> Vec<Listing> {
    if listings.is_empty() {
        return Vec::new();
    }

    debug!(
        "Comparing {} listings by {:?} (reverse: {})",
        listings.len(),
        sort_by,
        reverse
    );

    match sort_by {
        SortKey::Price => sort_by_key(listings, reverse, |l| l.start_price),
        SortKey::Area => sort_by_key(listings, reverse, |l| l.total_square),
        SortKey::PricePerSquare => sort_by_key(listings, reverse, price_per_square_key),
        SortKey::Distance => match reference {
            Some(point) => sort_by_key(listings, reverse, |l| distance_km(l, point)),
            None => listings.to_vec(),
        },
    }
}

/// Independent best picks over the input set.
///
/// Positions refer to the ordering the caller passed in, not to any sorted
/// ordering; on ties the first occurrence wins. Returns `None` for an
/// empty input.
pub fn recommend(listings: &[Listing], reference: Option<(f64, f64)>) -> Option<Recommendations> {
    if listings.is_empty() {
        return None;
    }

    let pick = |index: usize, value: f64| Pick {
        position: index + 1,
        listing_id: listings[index].id,
        value,
    };

    let mut best_price = 0usize;
    let mut best_area = 0usize;
    for (i, listing) in listings.iter().enumerate() {
        if listing.start_price < listings[best_price].start_price {
            best_price = i;
        }
        if listing.total_square > listings[best_area].total_square {
            best_area = i;
        }
    }

    let best_value = listings
        .iter()
        .enumerate()
        .filter(|(_, l)| l.total_square > 0.0)
        .min_by(|(_, a), (_, b)| {
            price_per_square_key(a)
                .partial_cmp(&price_per_square_key(b))
                .unwrap_or(Ordering::Equal)
        })
        .map(|(i, l)| pick(i, price_per_square_key(l)));

    let nearest = reference.and_then(|point| {
        listings
            .iter()
            .enumerate()
            .filter(|(_, l)| l.latitude.is_some() && l.longitude.is_some())
            .min_by(|(_, a), (_, b)| {
                distance_km(a, point)
                    .partial_cmp(&distance_km(b, point))
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(i, l)| pick(i, distance_km(l, point)))
    });

    Some(Recommendations {
        best_price: pick(best_price, listings[best_price].start_price),
        best_area: pick(best_area, listings[best_area].total_square),
        best_value,
        nearest,
    })
}

/// Plain-text ranked report for display by the chat renderer.
pub fn format_report(
    listings: &[Listing],
    sort_by: SortKey,
    reference: Option<(f64, f64)>,
) -> String {
    if listings.is_empty() {
        return "Нет данных для сравнения".to_string();
    }

    let mut report = String::from("РЕЗУЛЬТАТЫ СРАВНЕНИЯ\n\n");

    for (i, listing) in listings.iter().enumerate() {
        let price_per_square = match listing.price_per_square() {
            Some(v) => format!("{:.0} ₽/м²", v),
            None => "—".to_string(),
        };

        report.push_str(&format!(
            "{}. {}\n   {:.0} ₽ | {:.0} м² | {}\n",
            i + 1,
            listing.name,
            listing.start_price,
            listing.total_square,
            price_per_square,
        ));

        if sort_by == SortKey::Distance {
            if let Some(point) = reference {
                let distance = distance_km(listing, point);
                if distance.is_finite() {
                    report.push_str(&format!("   {:.1} км от вас\n", distance));
                }
            }
        }

        report.push_str(&format!("   {}\n\n", listing.link()));
    }

    let hint = match sort_by {
        SortKey::Price => "Отсортировано по цене",
        SortKey::Area => "Отсортировано по площади",
        SortKey::PricePerSquare => "Отсортировано по цене за м²",
        SortKey::Distance => "Отсортировано по расстоянию",
    };
    report.push_str(hint);
    report
}

/// Plain-text recommendation block appended to the comparison report.
pub fn format_recommendations(listings: &[Listing], reference: Option<(f64, f64)>) -> String {
    let recommendations = match recommend(listings, reference) {
        Some(r) => r,
        None => return String::new(),
    };

    let mut text = String::from("РЕКОМЕНДАЦИИ:\n");
    text.push_str(&format!(
        "Лучшая цена: объявление {} ({:.0} ₽)\n",
        recommendations.best_price.position, recommendations.best_price.value
    ));
    text.push_str(&format!(
        "Самая большая площадь: объявление {} ({:.0} м²)\n",
        recommendations.best_area.position, recommendations.best_area.value
    ));
    if let Some(best_value) = &recommendations.best_value {
        text.push_str(&format!(
            "Лучшее соотношение цена/площадь: объявление {} ({:.0} ₽/м²)\n",
            best_value.position, best_value.value
        ));
    }
    if let Some(nearest) = &recommendations.nearest {
        text.push_str(&format!(
            "Ближе всего к вам: объявление {} ({:.1} км)\n",
            nearest.position, nearest.value
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: i64, price: f64, area: f64, coords: Option<(f64, f64)>) -> Listing {
        Listing {
            id,
            name: format!("Лот {}", id),
            registry_number: format!("T-{}", id),
            start_price: price,
            deposit_amount: 0.0,
            start_step_amount: 0.0,
            total_square: area,
            address_description: None,
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            district_code: None,
            purchase_kind_name: None,
            stage_state_name: None,
            land_allowed_use_name: None,
            is_active: true,
            direct_url: None,
            cadastral_number: None,
            photos_json: None,
        }
    }

    #[test]
    fn test_haversine_symmetry_and_zero() {
        let pairs = [
            ((55.0, 37.0), (56.0, 38.0)),
            ((0.0, 0.0), (-45.0, 90.0)),
            ((55.7558, 37.6173), (59.9311, 30.3609)),
        ];
        for (a, b) in pairs {
            let forward = haversine(a.0, a.1, b.0, b.1);
            let backward = haversine(b.0, b.1, a.0, a.1);
            assert!((forward - backward).abs() < 1e-9);
        }
        assert_eq!(haversine(55.0, 37.0, 55.0, 37.0), 0.0);
    }

    #[test]
    fn test_compare_by_price() {
        let listings = vec![
            listing(1, 3_000_000.0, 100.0, None),
            listing(2, 1_000_000.0, 100.0, None),
            listing(3, 2_000_000.0, 100.0, None),
        ];
        let sorted = compare(&listings, SortKey::Price, false, None);
        let ids: Vec<i64> = sorted.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let reversed = compare(&listings, SortKey::Price, true, None);
        assert_eq!(reversed[0].id, 1);
    }

    #[test]
    fn test_compare_by_area() {
        let listings = vec![
            listing(1, 1_000_000.0, 500.0, None),
            listing(2, 1_000_000.0, 100.0, None),
        ];
        let sorted = compare(&listings, SortKey::Area, false, None);
        assert_eq!(sorted[0].id, 2);
    }

    #[test]
    fn test_price_per_square_zero_area_sorts_last() {
        let listings = vec![
            listing(1, 1_000_000.0, 100.0, None), // 10 000 ₽/м²
            listing(2, 2_000_000.0, 50.0, None),  // 40 000 ₽/м²
            listing(3, 500_000.0, 0.0, None),     // area unknown
        ];
        let sorted = compare(&listings, SortKey::PricePerSquare, false, None);
        let ids: Vec<i64> = sorted.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        // The cheapest raw price still sorts last without an area
        assert_eq!(price_per_square_key(&sorted[2]), f64::INFINITY);
    }

    #[test]
    fn test_distance_sort_and_missing_coords() {
        let reference = (55.0, 37.0);
        let listings = vec![
            listing(1, 1_000_000.0, 100.0, Some((56.0, 38.0))),
            listing(2, 1_000_000.0, 100.0, Some((55.0, 37.0))),
            listing(3, 1_000_000.0, 100.0, None),
        ];
        let sorted = compare(&listings, SortKey::Distance, false, Some(reference));
        let ids: Vec<i64> = sorted.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(distance_km(&sorted[0], reference), 0.0);
    }

    #[test]
    fn test_distance_sort_without_reference_is_noop() {
        let listings = vec![
            listing(1, 2_000_000.0, 100.0, Some((56.0, 38.0))),
            listing(2, 1_000_000.0, 100.0, Some((55.0, 37.0))),
        ];
        let sorted = compare(&listings, SortKey::Distance, false, None);
        let ids: Vec<i64> = sorted.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_recommend_positions_refer_to_input_order() {
        let listings = vec![
            listing(1, 1_000_000.0, 100.0, None),
            listing(2, 2_000_000.0, 50.0, None),
            listing(3, 500_000.0, 0.0, None),
        ];
        let recs = recommend(&listings, None).unwrap();

        assert_eq!(recs.best_price.position, 3);
        assert_eq!(recs.best_area.position, 1);
        // Zero-area listing is excluded from price-per-square
        let best_value = recs.best_value.unwrap();
        assert_eq!(best_value.position, 1);
        assert_eq!(best_value.value, 10_000.0);
        assert!(recs.nearest.is_none());
    }

    #[test]
    fn test_recommend_ties_first_occurrence_wins() {
        let listings = vec![
            listing(1, 1_000_000.0, 100.0, None),
            listing(2, 1_000_000.0, 100.0, None),
        ];
        let recs = recommend(&listings, None).unwrap();
        assert_eq!(recs.best_price.position, 1);
        assert_eq!(recs.best_area.position, 1);
    }

    #[test]
    fn test_recommend_nearest_requires_coordinates() {
        let listings = vec![
            listing(1, 1_000_000.0, 100.0, None),
            listing(2, 2_000_000.0, 100.0, Some((55.1, 37.1))),
        ];
        let recs = recommend(&listings, Some((55.0, 37.0))).unwrap();
        assert_eq!(recs.nearest.unwrap().position, 2);
    }

    #[test]
    fn test_recommend_empty_input() {
        assert!(recommend(&[], None).is_none());
        assert!(compare(&[], SortKey::Price, false, None).is_empty());
    }

    #[test]
    fn test_format_report_contains_values() {
        let listings = vec![listing(1, 1_000_000.0, 100.0, None)];
        let report = format_report(&listings, SortKey::Price, None);
        assert!(report.contains("1000000 ₽"));
        assert!(report.contains("10000 ₽/м²"));
        assert!(report.contains("Отсортировано по цене"));

        assert_eq!(format_report(&[], SortKey::Price, None), "Нет данных для сравнения");
    }

    #[test]
    fn test_format_recommendations_block() {
        let listings = vec![
            listing(1, 1_000_000.0, 100.0, None),
            listing(2, 500_000.0, 0.0, None),
        ];
        let text = format_recommendations(&listings, None);
        assert!(text.contains("объявление 2 (500000 ₽)"));
        assert!(text.contains("объявление 1 (100 м²)"));
        assert!(format_recommendations(&[], None).is_empty());
    }
}
