/// Coordinates for the cities the POI search supports. Lookup keys are
/// lowercase; unknown cities yield `None` and the caller returns an empty
/// result set instead of an error.
pub fn city_coordinates(city: &str) -> Option<(f64, f64)> {
    let (lat, lon) = match city.trim().to_ascii_lowercase().as_str() {
        "athens" => (37.9755, 23.7348),
        "paris" => (48.8566, 2.3522),
        "london" => (51.5074, -0.1278),
        "rome" => (41.9028, 12.4964),
        "madrid" => (40.4168, -3.7038),
        "berlin" => (52.5200, 13.4050),
        "amsterdam" => (52.3676, 4.9041),
        "prague" => (50.0755, 14.4378),
        "vienna" => (48.2082, 16.3738),
        "barcelona" => (41.3851, 2.1734),
        _ => return None,
    };
    Some((lat, lon))
}

/// Maps user-facing POI categories onto OpenTripMap `kinds` identifiers.
/// Unknown categories pass through unchanged so callers can still probe
/// kinds the mapping does not name.
pub fn map_category_to_kinds(category: &str) -> String {
    match category.trim().to_ascii_lowercase().as_str() {
        "museums" => "museums".to_string(),
        "historic" => "historic".to_string(),
        "restaurants" => "foods".to_string(),
        "parks" => "natural".to_string(),
        "attractions" => "tourist_facilities".to_string(),
        "shopping" => "shops".to_string(),
        "entertainment" => "entertainment".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{city_coordinates, map_category_to_kinds};

    #[test]
    fn known_cities_resolve_case_insensitively() {
        assert_eq!(city_coordinates("Athens"), Some((37.9755, 23.7348)));
        assert_eq!(city_coordinates(" BARCELONA "), Some((41.3851, 2.1734)));
    }

    #[test]
    fn unknown_city_yields_none() {
        assert_eq!(city_coordinates("atlantis"), None);
    }

    #[test]
    fn categories_translate_to_kinds() {
        assert_eq!(map_category_to_kinds("restaurants"), "foods");
        assert_eq!(map_category_to_kinds("Parks"), "natural");
        assert_eq!(map_category_to_kinds("architecture"), "architecture");
    }
}
