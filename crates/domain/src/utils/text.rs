//! Pure string helpers for title comparison

use std::collections::BTreeSet;

/// Lowercase `text`, replace punctuation with spaces and collapse runs of
/// whitespace.
///
/// # Examples
///
/// ```
/// use studiosync_domain::utils::text::normalize;
///
/// assert_eq!(normalize("  Power-Yoga:  FLOW! "), "power yoga flow");
/// ```
#[must_use]
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct normalized tokens of `text`.
#[must_use]
pub fn tokens(text: &str) -> BTreeSet<String> {
    normalize(text).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// Sørensen-Dice coefficient over character bigrams, ignoring spaces.
///
/// # Returns
///
/// A value in `[0, 1]`; `0.0` when either side has fewer than two
/// characters.
///
/// # Examples
///
/// ```
/// use studiosync_domain::utils::text::dice_coefficient;
///
/// assert!((dice_coefficient("night", "nacht") - 0.25).abs() < 1e-9);
/// assert_eq!(dice_coefficient("a", "a"), 0.0);
/// ```
#[must_use]
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    let left = bigrams(a);
    let right = bigrams(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let mut remaining = right.clone();
    let mut shared = 0_usize;
    for pair in &left {
        if let Some(pos) = remaining.iter().position(|p| p == pair) {
            remaining.swap_remove(pos);
            shared += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let score = (2 * shared) as f64 / (left.len() + right.len()) as f64;
    score
}

fn bigrams(text: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = normalize(text).chars().filter(|c| !c.is_whitespace()).collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Similarity of an event title to a class name.
///
/// * `1.0` when the normalized strings are equal
/// * `0.9` when every token of the shorter one appears in the longer one
/// * otherwise the bigram Dice coefficient
///
/// # Examples
///
/// ```
/// use studiosync_domain::utils::text::title_similarity;
///
/// assert_eq!(title_similarity("Power Yoga", "power yoga"), 1.0);
/// assert_eq!(title_similarity("Power Yoga Flow", "Power Yoga"), 0.9);
/// assert!(title_similarity("Random Unrelated Thing", "Power Yoga") < 0.2);
/// ```
#[must_use]
pub fn title_similarity(title: &str, name: &str) -> f64 {
    let left = normalize(title);
    let right = normalize(name);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    if left == right {
        return 1.0;
    }

    let left_tokens = tokens(&left);
    let right_tokens = tokens(&right);
    let (shorter, longer) = if left_tokens.len() <= right_tokens.len() {
        (&left_tokens, &right_tokens)
    } else {
        (&right_tokens, &left_tokens)
    };
    if shorter.is_subset(longer) {
        return 0.9;
    }

    dice_coefficient(&left, &right)
}

/// True when `needle` appears in `haystack` as whole normalized words.
#[must_use]
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let needle = normalize(needle);
    if needle.is_empty() {
        return false;
    }
    format!(" {} ", normalize(haystack)).contains(&format!(" {needle} "))
}
