//! Location-hierarchy derivation.
//!
//! Turns a free-form location string like "四川省宜宾市长宁县" into up to
//! three hierarchy levels. The most specific level gets the single
//! "located-in" edge; levels chain with "subordinate-to" edges.

/// One derived hierarchy level, most general first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationLevel {
    pub label: &'static str,
    pub name: String,
}

const PROVINCE_SUFFIXES: &[&str] = &["自治区", "省"];
const CITY_SUFFIXES: &[&str] = &["自治州", "市"];
const COUNTY_SUFFIXES: &[&str] = &["县", "区", "旗"];

/// Derive province/city/county levels from a location string. Returns an
/// empty vec when nothing recognizable is present; builds then skip the
/// location step.
pub fn parse_location_hierarchy(location: &str) -> Vec<LocationLevel> {
    let mut levels = Vec::new();
    let mut rest = location.trim();

    if let Some((name, tail)) = take_segment(rest, PROVINCE_SUFFIXES) {
        levels.push(LocationLevel {
            label: "Province",
            name,
        });
        rest = tail;
    }
    if let Some((name, tail)) = take_segment(rest, CITY_SUFFIXES) {
        levels.push(LocationLevel {
            label: "City",
            name,
        });
        rest = tail;
    }
    if let Some((name, _)) = take_segment(rest, COUNTY_SUFFIXES) {
        levels.push(LocationLevel {
            label: "County",
            name,
        });
    }

    levels
}

/// Split off the leading segment ending in one of `suffixes`, keeping the
/// suffix as part of the name. Segments longer than 10 chars are treated as
/// noise rather than an administrative name.
fn take_segment<'a>(text: &'a str, suffixes: &[&str]) -> Option<(String, &'a str)> {
    for suffix in suffixes {
        if let Some(pos) = text.find(suffix) {
            let end = pos + suffix.len();
            let name = &text[..end];
            let char_count = name.chars().count();
            if char_count >= 2 && char_count <= 10 {
                return Some((name.to_string(), &text[end..]));
            }
        }
    }
    None
}
