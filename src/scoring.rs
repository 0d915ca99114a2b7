//! # Scoring Engine
//! Pure, testable logic that maps `(weights, ratings)` → per-option scores.
//! No I/O, suitable for unit tests and for the local fallback path.
//!
//! This is the ONE place the weighted-sum arithmetic lives. The finalize
//! handler and the offline fallback both call into it; the formula is
//! never duplicated elsewhere.

use std::collections::HashMap;

/// Maximum value of the user-facing rating scale. Ratings arrive as 1–5
/// after the pipeline remaps the model's native 1–10 output.
pub const RATING_SCALE_MAX: f64 = 5.0;

/// Per-option final scores in [0, 100], rounded to two decimals.
pub type ScoreResult = HashMap<String, f64>;

/// Normalize raw importance weights so they sum to 1 over the given
/// category order. A category absent from the raw map contributes 0.
/// An all-zero (or empty) map keeps a denominator of 1, so every
/// normalized weight is 0 rather than NaN.
pub fn normalize_weights(
    categories: &[String],
    raw: &HashMap<String, f64>,
) -> HashMap<String, f64> {
    let total: f64 = raw.values().map(|w| w.max(0.0)).sum();
    let denom = if total > 0.0 { total } else { 1.0 };
    categories
        .iter()
        .map(|cat| {
            let w = raw.get(cat).copied().unwrap_or(0.0).max(0.0);
            (cat.clone(), w / denom)
        })
        .collect()
}

/// Compute final scores for every option.
///
/// `score = (Σ_cat normWeight[cat] × rating[option][cat]) / scale_max × 100`
///
/// A missing rating contributes 0 for that category. The result is
/// deterministic: identical inputs always produce bit-identical output.
pub fn compute_scores(
    options: &[String],
    categories: &[String],
    norm_weights: &HashMap<String, f64>,
    ratings: &HashMap<String, HashMap<String, f64>>,
    scale_max: f64,
) -> ScoreResult {
    let mut out = ScoreResult::with_capacity(options.len());
    for opt in options {
        let per_cat = ratings.get(opt);
        let mut total = 0.0f64;
        for cat in categories {
            let w = norm_weights.get(cat).copied().unwrap_or(0.0);
            let r = per_cat
                .and_then(|m| m.get(cat))
                .copied()
                .unwrap_or(0.0);
            total += w * r;
        }
        out.insert(opt.clone(), round2(total / scale_max * 100.0));
    }
    out
}

/// Pick the winning option: strictly greatest score wins; an exact tie
/// resolves to the option that comes first in canonical order.
pub fn pick_winner<'a>(options: &'a [String], scores: &ScoreResult) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for opt in options {
        let s = scores.get(opt).copied().unwrap_or(0.0);
        match best {
            Some((_, bs)) if s <= bs => {}
            _ => best = Some((opt.as_str(), s)),
        }
    }
    best.map(|(o, _)| o)
}

/// Fixed explanation used whenever the explanation stage cannot reach
/// the completion service. Non-committal on purpose.
pub const GENERIC_EXPLANATION: &str =
    "Based on your ratings and priorities, here's how the options compare.";

/// Locally computed result: scores plus winner plus a generic
/// explanation. Used when the network finalize path is unavailable, so
/// the caller always has *some* ranked answer to show.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResult {
    pub scores: ScoreResult,
    pub winner: Option<String>,
    pub explanation: String,
}

/// Same arithmetic as the finalize path, packaged as a pure function.
pub fn fallback_result(
    options: &[String],
    categories: &[String],
    weights: &HashMap<String, f64>,
    ratings: &HashMap<String, HashMap<String, f64>>,
) -> FallbackResult {
    let norm = normalize_weights(categories, weights);
    let scores = compute_scores(options, categories, &norm, ratings, RATING_SCALE_MAX);
    let winner = pick_winner(options, &scores).map(str::to_string);
    FallbackResult {
        scores,
        winner,
        explanation: GENERIC_EXPLANATION.to_string(),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
