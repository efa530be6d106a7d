//! Street-name normalization and address parsing helpers.

use std::sync::LazyLock;

use regex::Regex;

/// Suffix spellings folded onto one canonical abbreviation before comparing.
const SUFFIXES: &[(&str, &str)] = &[
    ("street", "st"),
    ("avenue", "ave"),
    ("road", "rd"),
    ("drive", "dr"),
    ("place", "pl"),
    ("court", "ct"),
    ("crescent", "cres"),
    ("lane", "ln"),
    ("parade", "pde"),
    ("close", "cl"),
    ("boulevard", "blvd"),
    ("terrace", "tce"),
    ("highway", "hwy"),
];

static HOUSE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)(?:[\s,]|$)").expect("house number regex"));

/// Filesystem-safe key for a street, e.g. `Elm_St_East_Albury`.
pub fn street_key(street_name: &str, suburb: &str) -> String {
    format!("{}_{}", sanitize(street_name), sanitize(suburb))
}

fn sanitize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// Leading house number of a formatted address (`"232 Wirraway St, ..."` -> 232).
///
/// Returns `None` for unit-style (`2/15 ...`) or lettered (`15A ...`) numbers
/// so they never shadow the plain number.
pub fn leading_house_number(address: &str) -> Option<u32> {
    HOUSE_NUMBER_RE
        .captures(address)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Lowercase, strip punctuation, and fold street-type suffixes.
pub fn normalize_street(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == ',' || c == '.')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            SUFFIXES
                .iter()
                .find(|(long, _)| *long == lower)
                .map(|(_, short)| (*short).to_string())
                .unwrap_or(lower)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when `formatted_address` names the street `street_name`, tolerating
/// abbreviated or expanded suffixes (`Street` vs `St`).
pub fn matches_street(formatted_address: &str, street_name: &str) -> bool {
    let street = normalize_street(street_name);
    if street.is_empty() {
        return false;
    }
    let haystack = format!(" {} ", normalize_street(formatted_address));
    haystack.contains(&format!(" {street} "))
}
