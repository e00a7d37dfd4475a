//! Workshop detail extraction from free-form event text
//!
//! Providers rarely carry a category or skill level. Adapters fall back to
//! scanning the title and description for well-known keywords.

use once_cell::sync::Lazy;
use regex::Regex;

/// Category keyword table, checked in order. First hit wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("pottery", &["pottery", "ceramic", "wheel throwing"]),
    ("painting", &["paint", "canvas", "watercolor"]),
    ("woodworking", &["wood", "carpentry"]),
    ("jewelry", &["jewelry", "jewellery", "beading"]),
    ("cooking", &["cook", "baking"]),
    ("music", &["music", "guitar", "piano"]),
    ("yoga", &["yoga", "vinyasa", "pilates"]),
    ("dance", &["dance", "salsa", "ballet"]),
];

static PARTICIPANTS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*(?:people|participants|students|spots|max)")
        .expect("PARTICIPANTS_REGEX pattern is valid")
});

/// Details recovered from an event's text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkshopDetails {
    pub category: Option<String>,
    pub skill_level: Option<String>,
    pub max_participants: Option<u32>,
}

/// Scan `title` and `description` for category, skill level and capacity.
///
/// # Examples
///
/// ```
/// use studiosync_domain::utils::workshop::extract_workshop_details;
///
/// let details = extract_workshop_details("Advanced Wheel Throwing", Some("max 8 students"));
/// assert_eq!(details.category.as_deref(), Some("pottery"));
/// assert_eq!(details.skill_level.as_deref(), Some("advanced"));
/// assert_eq!(details.max_participants, Some(8));
/// ```
#[must_use]
pub fn extract_workshop_details(title: &str, description: Option<&str>) -> WorkshopDetails {
    let text = format!("{} {}", title, description.unwrap_or_default()).to_lowercase();

    let category = CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| (*category).to_string());

    let skill_level = if text.contains("advanced") || text.contains("expert") {
        Some("advanced")
    } else if text.contains("intermediate") || text.contains("level 2") {
        Some("intermediate")
    } else if text.contains("all levels") || text.contains("any level") {
        Some("all_levels")
    } else if text.contains("beginner") || text.contains("intro") || text.contains("basics") {
        Some("beginner")
    } else {
        None
    }
    .map(str::to_string);

    let max_participants = PARTICIPANTS_REGEX
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .or_else(|| {
            // "max 8 students" puts the number after the keyword
            MAX_PREFIX_REGEX
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        });

    WorkshopDetails { category, skill_level, max_participants }
}

static MAX_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:max|up to|capacity)\s*:?\s*(\d+)").expect("MAX_PREFIX_REGEX pattern is valid")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_recognised_yields_empty_details() {
        assert_eq!(extract_workshop_details("Team sync", None), WorkshopDetails::default());
    }

    #[test]
    fn first_category_in_table_wins() {
        let details = extract_workshop_details("Paint your pottery", None);
        assert_eq!(details.category.as_deref(), Some("pottery"));
    }

    #[test]
    fn participant_count_suffix_form() {
        let details = extract_workshop_details("Sourdough baking", Some("Limited to 12 people"));
        assert_eq!(details.category.as_deref(), Some("cooking"));
        assert_eq!(details.max_participants, Some(12));
    }

    #[test]
    fn basics_reads_as_beginner() {
        let details = extract_workshop_details("Pottery Basics", None);
        assert_eq!(details.skill_level.as_deref(), Some("beginner"));
    }
}
