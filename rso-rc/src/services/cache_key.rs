//! Cache key derivation
//!
//! Keys are derived, never stored on their own. Three tagged forms exist,
//! in resolution priority order:
//!
//! - `id:<videoId>` — stable platform ID, always wins when supplied
//! - `title_year:<normalizedTitle>_<year4>` — title disambiguated by year
//! - `title:<normalizedTitle>` — title only
//!
//! A fourth form, `imdb:<imdbID>`, is derivable once the provider has
//! resolved a title and is used for aliasing, never for caller lookups.
//!
//! Durable keys additionally carry the `rating:` namespace prefix (see
//! `rating_store`); everything here works in the unprefixed key space.

/// Normalize a display title for key derivation: lower-case, trimmed, every
/// character outside `[a-z0-9]` stripped.
///
/// Empty and whitespace-only titles normalize to the empty string; callers
/// must reject those before keying, or unrelated unresolved titles would
/// collide on `title:`.
pub fn normalize_title(title: &str) -> String {
    title
        .trim()
        .chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            c.is_ascii_alphanumeric().then_some(c)
        })
        .collect()
}

/// First four ASCII digits of a year string ("2010–2012" → "2010")
fn year4(year: &str) -> String {
    year.chars().filter(|c| c.is_ascii_digit()).take(4).collect()
}

/// Derive the request key for an identity, most specific form available:
/// platform ID, else title+year, else title only.
pub fn key_for(video_id: Option<&str>, title: &str, year: Option<&str>) -> String {
    if let Some(id) = video_id {
        return format!("id:{}", id);
    }
    let normalized = normalize_title(title);
    match year.map(year4).filter(|y| !y.is_empty()) {
        Some(y) => format!("title_year:{}_{}", normalized, y),
        None => format!("title:{}", normalized),
    }
}

/// Key for an external-database (IMDb) ID
pub fn imdb_key(imdb_id: &str) -> String {
    format!("imdb:{}", imdb_id)
}

/// Ordered candidate keys for a lookup, most specific first, de-duplicated.
///
/// A caller that knows the platform ID still gets the title-derived
/// fallbacks: an entry may have been cached before the ID was known.
pub fn candidate_keys(video_id: Option<&str>, title: &str, year: Option<&str>) -> Vec<String> {
    let mut keys = Vec::with_capacity(3);
    if let Some(id) = video_id {
        keys.push(format!("id:{}", id));
    }
    let normalized = normalize_title(title);
    if !normalized.is_empty() {
        if let Some(y) = year.map(year4).filter(|y| !y.is_empty()) {
            keys.push(format!("title_year:{}_{}", normalized, y));
        }
        keys.push(format!("title:{}", normalized));
    }
    keys.dedup();
    keys
}

/// Every derivable key for an entry except `master`, for aliasing.
///
/// Includes the IMDb key when the provider resolved one, the title+year key
/// when a year is known, and the bare title key.
pub fn alias_keys(
    master: &str,
    video_id: Option<&str>,
    imdb_id: Option<&str>,
    title: &str,
    year: Option<&str>,
) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(id) = video_id {
        keys.push(format!("id:{}", id));
    }
    if let Some(id) = imdb_id {
        keys.push(imdb_key(id));
    }
    let normalized = normalize_title(title);
    if !normalized.is_empty() {
        if let Some(y) = year.map(year4).filter(|y| !y.is_empty()) {
            keys.push(format!("title_year:{}_{}", normalized, y));
        }
        keys.push(format!("title:{}", normalized));
    }
    keys.retain(|k| k != master);
    keys.dedup();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_everything_but_alphanumerics() {
        assert_eq!(normalize_title("The Matrix"), "thematrix");
        assert_eq!(normalize_title("  Spider-Man: No Way Home  "), "spidermannowayhome");
        assert_eq!(normalize_title("Amélie"), "amlie");
        assert_eq!(normalize_title("   "), "");
    }

    #[test]
    fn key_for_prefers_platform_id() {
        assert_eq!(key_for(Some("81923746"), "Inception", Some("2010")), "id:81923746");
        assert_eq!(key_for(None, "Inception", Some("2010")), "title_year:inception_2010");
        assert_eq!(key_for(None, "Inception", None), "title:inception");
    }

    #[test]
    fn key_for_is_deterministic() {
        let a = key_for(None, "The Matrix", Some("1999"));
        let b = key_for(None, "The Matrix", Some("1999"));
        assert_eq!(a, b);
    }

    #[test]
    fn year_ranges_truncate_to_four_digits() {
        assert_eq!(key_for(None, "Dark", Some("2017–2020")), "title_year:dark_2017");
    }

    #[test]
    fn non_numeric_year_falls_back_to_title_key() {
        assert_eq!(key_for(None, "Dark", Some("n/a")), "title:dark");
    }

    #[test]
    fn candidate_keys_ordered_most_specific_first() {
        let keys = candidate_keys(Some("81923746"), "Inception", Some("2010"));
        assert_eq!(
            keys,
            vec![
                "id:81923746".to_string(),
                "title_year:inception_2010".to_string(),
                "title:inception".to_string(),
            ]
        );
    }

    #[test]
    fn candidate_keys_empty_for_unkeyable_input() {
        assert!(candidate_keys(None, "???", None).is_empty());
    }

    #[test]
    fn alias_keys_exclude_master() {
        let keys = alias_keys("id:81923746", Some("81923746"), Some("tt1375666"), "Inception", Some("2010"));
        assert_eq!(
            keys,
            vec![
                "imdb:tt1375666".to_string(),
                "title_year:inception_2010".to_string(),
                "title:inception".to_string(),
            ]
        );
    }
}
