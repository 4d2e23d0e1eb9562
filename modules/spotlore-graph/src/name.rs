//! Scenic-spot name normalization.
//!
//! Legacy name-keyed nodes were written by hand and drift between variants
//! like "蜀南竹海" / "蜀南竹海景区" / "蜀南竹海旅游度假区". When no numeric id
//! is available, builds normalize the name so the variants coalesce onto one
//! cluster root.

/// Suffix tokens stripped during normalization, longest first so compound
/// suffixes win over their tails.
const SPOT_SUFFIXES: &[&str] = &[
    "旅游度假区",
    "国家森林公园",
    "风景名胜区",
    "旅游景区",
    "风景区",
    "度假区",
    "景区",
    "公园",
];

/// Strip a known scenic-spot suffix from a name. Only one suffix is removed,
/// and a name that consists of nothing but the suffix stays untouched.
pub fn normalize_spot_name(name: &str) -> String {
    let trimmed = name.trim();
    for suffix in SPOT_SUFFIXES {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Whether two legacy names refer to the same spot once normalized.
pub fn same_spot_name(a: &str, b: &str) -> bool {
    normalize_spot_name(a) == normalize_spot_name(b)
}
