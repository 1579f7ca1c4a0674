use once_cell::sync::Lazy;
use regex::Regex;

static UNSAFE_SEGMENT_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("valid segment regex"));

// Two-character operators first so `>=` does not become `gt_=`.
const OPERATOR_WORDS: [(&str, &str); 6] = [
    (">=", "gte_"),
    ("<=", "lte_"),
    (">", "gt_"),
    ("<", "lt_"),
    ("==", "eq_"),
    ("!=", "ne_"),
];

/// Makes a branch label safe for use as a path segment.
///
/// Comparison operators are spelled out (`>=0.90` → `gte_0.90`), then every
/// character outside `[A-Za-z0-9_.-]` is dropped.
pub fn sanitize_segment(raw: &str) -> String {
    let mut label = raw.to_string();
    for (op, word) in OPERATOR_WORDS {
        if label.contains(op) {
            label = label.replace(op, word);
        }
    }
    UNSAFE_SEGMENT_CHARS.replace_all(&label, "").into_owned()
}
