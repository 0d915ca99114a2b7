//! Tolerant parsers for completion-service output.
//!
//! The model is instructed to answer in a strict shape, but in practice
//! the text comes back with stray whitespace, blank lines, or the odd
//! unparseable token. These parsers never panic and never error: bad
//! pieces are dropped and the caller decides whether what's left is
//! usable.

use std::collections::HashMap;

/// Delimiter used by the extract-options and extract-categories stages.
pub const PIPE: char = '|';

/// Split a line on `|`, trim each piece, drop empties.
/// Empty input yields an empty vec.
pub fn parse_delimited(text: &str) -> Vec<String> {
    text.split(PIPE)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse rating rows of the form `OPTION_TEXT: n1,n2,...,nk`.
///
/// Split happens at the FIRST colon, so option labels containing colons
/// lose their tail (same as the reference behavior). Lines without a
/// colon are skipped; numbers that fail to parse are dropped; a line
/// whose numeric list ends up empty is skipped entirely. Insertion
/// order of the returned rows follows line order.
pub fn parse_rating_lines(text: &str) -> Vec<(String, Vec<f64>)> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((label, rest)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        let nums: Vec<f64> = rest
            .split(',')
            .filter_map(|tok| tok.trim().parse::<f64>().ok())
            .collect();
        if nums.is_empty() {
            continue;
        }
        out.push((label.to_string(), nums));
    }
    out
}

/// Resolve a model-returned label to one of the canonical options.
///
/// Ordered fallback chain: case-insensitive exact match, then canonical
/// contained in the label, then label contained in the canonical, then
/// the first canonical option. Heuristic by design; lexically
/// overlapping options ("Korea" vs "North Korea") can mis-associate.
pub fn match_option<'a>(canonical: &'a [String], label: &str) -> Option<&'a str> {
    let needle = label.to_lowercase();
    canonical
        .iter()
        .find(|o| o.to_lowercase() == needle)
        .or_else(|| canonical.iter().find(|o| needle.contains(&o.to_lowercase())))
        .or_else(|| canonical.iter().find(|o| o.to_lowercase().contains(&needle)))
        .or_else(|| canonical.first())
        .map(String::as_str)
}

/// Case-insensitive dedup that keeps first occurrence and original
/// casing. Used once, at category suggestion time.
pub fn dedup_case_insensitive(items: Vec<String>) -> Vec<String> {
    let mut seen = HashMap::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let key = item.to_lowercase();
        if seen.insert(key, ()).is_none() {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn delimited_splits_and_trims() {
        assert_eq!(parse_delimited("a | b"), strs(&["a", "b"]));
        assert_eq!(parse_delimited(" a |  | b |"), strs(&["a", "b"]));
    }

    #[test]
    fn delimited_empty_input_is_empty_vec() {
        assert!(parse_delimited("").is_empty());
        assert!(parse_delimited("   ").is_empty());
        assert!(parse_delimited("|||").is_empty());
    }

    #[test]
    fn rating_lines_basic_row() {
        let rows = parse_rating_lines("X: 3,7,2");
        assert_eq!(rows, vec![("X".to_string(), vec![3.0, 7.0, 2.0])]);
    }

    #[test]
    fn rating_lines_skip_garbage() {
        let text = "no colon here\nY: a,b\nZ: 1, 2 ,3\n\n";
        let rows = parse_rating_lines(text);
        assert_eq!(rows, vec![("Z".to_string(), vec![1.0, 2.0, 3.0])]);
    }

    #[test]
    fn rating_lines_split_at_first_colon() {
        let rows = parse_rating_lines("Plan A: phase 1: 4,5");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "Plan A");
        // "phase 1" is not a number and gets dropped from the list.
        assert_eq!(rows[0].1, vec![4.0, 5.0]);
    }

    #[test]
    fn rating_lines_preserve_line_order() {
        let rows = parse_rating_lines("B: 1\nA: 2");
        assert_eq!(rows[0].0, "B");
        assert_eq!(rows[1].0, "A");
    }

    #[test]
    fn option_match_prefers_exact_then_substring() {
        let canon = strs(&["biking to work", "driving to work"]);
        assert_eq!(match_option(&canon, "Biking to Work"), Some("biking to work"));
        assert_eq!(
            match_option(&canon, "option 2, driving to work"),
            Some("driving to work")
        );
        assert_eq!(match_option(&canon, "driving"), Some("driving to work"));
        assert_eq!(match_option(&canon, "walking"), Some("biking to work"));
    }

    #[test]
    fn option_match_empty_canonical_is_none() {
        assert_eq!(match_option(&[], "anything"), None);
    }

    #[test]
    fn dedup_keeps_first_casing() {
        let out = dedup_case_insensitive(strs(&["Cost", "cost", "Time", "COST"]));
        assert_eq!(out, strs(&["Cost", "Time"]));
    }
}
