//! Path matcher (C1).
//!
//! Deliberately narrow: no wildcards, no regex, no optional segments. A
//! pattern segment prefixed with `:` captures the concrete segment under
//! that name; every other segment must match byte-for-byte.

use std::collections::HashMap;

/// Parameters captured while matching a concrete path against a pattern.
pub type PathParams = HashMap<String, String>;

/// Collapse repeated `/` into one, guarantee a leading `/`, and strip any
/// trailing `/` unless the path is exactly `/`.
///
/// Idempotent: `normalize(normalize(p)) == normalize(p)`.
pub fn normalize(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push('/');
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        normalized.push_str(segment);
        normalized.push('/');
    }
    if normalized.len() > 1 {
        normalized.pop();
    }
    normalized
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Match a concrete (already-normalized) path against a pattern, which may
/// itself contain `:name` segments. Returns the captured parameters on a
/// full match.
pub fn match_path(pattern: &str, path: &str) -> Option<PathParams> {
    let pattern_segments = segments(pattern);
    let path_segments = segments(path);

    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = PathParams::new();
    for (pat_seg, path_seg) in pattern_segments.iter().zip(path_segments.iter()) {
        if let Some(name) = pat_seg.strip_prefix(':') {
            params.insert(name.to_string(), (*path_seg).to_string());
        } else if pat_seg != path_seg {
            return None;
        }
    }
    Some(params)
}

/// 2 points per literal segment, 1 per parameter segment. A pure sort key,
/// not a match predicate.
pub fn specificity(pattern: &str) -> u32 {
    segments(pattern)
        .iter()
        .map(|seg| if seg.starts_with(':') { 1 } else { 2 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_pattern_matches_only_root() {
        assert!(match_path("/", "/").is_some());
        assert!(match_path("/", "/x").is_none());
    }

    #[test]
    fn literal_segments_require_exact_match() {
        assert!(match_path("/users/all", "/users/all").is_some());
        assert!(match_path("/users/all", "/users/other").is_none());
    }

    #[test]
    fn param_segments_capture_value() {
        let params = match_path("/users/:id", "/users/42").unwrap();
        assert_eq!(params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn differing_segment_counts_never_match() {
        assert!(match_path("/users/:id", "/users/42/extra").is_none());
    }

    #[test]
    fn duplicate_param_names_keep_the_last_value() {
        let params = match_path("/:a/:a", "/x/y").unwrap();
        assert_eq!(params.get("a"), Some(&"y".to_string()));
    }

    #[test]
    fn normalize_collapses_slashes_and_strips_trailing() {
        assert_eq!(normalize("//a//b/"), "/a/b");
        assert_eq!(normalize("a/b"), "/a/b");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn normalize_is_idempotent() {
        let p = "//a//b///c/";
        assert_eq!(normalize(&normalize(p)), normalize(p));
    }

    #[test]
    fn specificity_prefers_literal_over_param() {
        assert!(specificity("/a/b") > specificity("/a/:x"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(match_path("/Users", "/users").is_none());
    }
}
