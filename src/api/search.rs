use super::models::Map;

/// Maps matching `term`: an exact id or a name containing it, ignoring case.
/// A blank term matches everything.
pub fn filter_maps<'m>(maps: &'m [Map], term: &str) -> Vec<&'m Map> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return maps.iter().collect();
    }
    maps.iter()
        .filter(|map| map.id.to_lowercase() == term || map.name.to_lowercase().contains(&term))
        .collect()
}
