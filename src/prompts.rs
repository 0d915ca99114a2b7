//! Prompt builders for the four pipeline stages.
//!
//! Pure functions over module-level templates: identical inputs always
//! yield identical prompt text. No randomness, no wall-clock content.
//! The completion service is asked for strictly machine-parseable
//! output (one pipe-delimited line, or `OPTION: n1,n2,...` rows) so the
//! tolerant parsers in `parse.rs` have an easy job.

use std::collections::HashMap;
use std::fmt::Write as _;

/// Stage 1: extract exactly two options from the user's free text.
pub fn extract_options_prompt(query: &str) -> String {
    format!(
        "You are helping someone weigh a decision.\n\
         Decision question: \"{query}\"\n\n\
         Identify the TWO options being compared. Return ONLY one line with the two \
         options separated by a single pipe character, nothing else.\n\
         If the question names more than two options, return only the first two.\n\
         If the question names fewer than two, infer the implicit alternative \
         (for example \"doing it\" vs \"not doing it\").\n\n\
         Example:\n\
         Question: \"Should I study abroad in Scotland or Korea?\"\n\
         Answer: Scotland | Korea"
    )
}

/// Stage 2: suggest 3–7 comparison categories for the two options.
pub fn extract_categories_prompt(query: &str, options: &[String]) -> String {
    format!(
        "You are helping someone weigh a decision.\n\
         Decision question: \"{query}\"\n\
         The two options are: {a} and {b}.\n\n\
         Suggest between 3 and 7 categories for comparing these options. Return ONLY \
         one line with the category names separated by pipe characters, nothing else.\n\n\
         Example:\n\
         Answer: Cost | Culture | Career Opportunities | Weather",
        a = options.first().map(String::as_str).unwrap_or(""),
        b = options.get(1).map(String::as_str).unwrap_or(""),
    )
}

/// Stage 3: rate every option against every category on a 1–10 scale.
/// The worked example repeats the exact option strings so the model
/// echoes them back verbatim, which keeps label matching unambiguous.
pub fn score_options_prompt(query: &str, options: &[String], categories: &[String]) -> String {
    let cats = categories.join(", ");
    let mut example = String::new();
    for (i, opt) in options.iter().enumerate() {
        let nums: Vec<String> = categories
            .iter()
            .enumerate()
            .map(|(j, _)| (((i + j) % 9) + 1).to_string())
            .collect();
        let _ = writeln!(example, "{}: {}", opt, nums.join(","));
    }
    format!(
        "You are helping someone weigh a decision.\n\
         Decision question: \"{query}\"\n\
         Options: {opts}\n\
         Categories, in this exact order: {cats}\n\n\
         Rate each option against each category with an integer from 1 (worst) to 10 \
         (best). Return ONLY one line per option in the form\n\
         OPTION_TEXT: n1,n2,...,nk\n\
         using the option text exactly as given above, with one number per category \
         in the order listed. No other text.\n\n\
         Example:\n\
         {example}",
        opts = options.join(" | "),
    )
}

/// Stage 4: explain the already-computed result. Scores are final here;
/// the model is asked to narrate, not to re-score.
pub fn final_explanation_prompt(
    query: &str,
    options: &[String],
    categories: &[String],
    scores: &HashMap<String, f64>,
) -> String {
    let mut score_lines = String::new();
    for opt in options {
        let s = scores.get(opt).copied().unwrap_or(0.0);
        let _ = writeln!(score_lines, "- {opt}: {s:.2} out of 100");
    }
    format!(
        "You are helping someone weigh a decision.\n\
         Decision question: \"{query}\"\n\
         The options were compared across these categories: {cats}.\n\
         Final weighted scores (higher is better):\n\
         {score_lines}\n\
         Write 2 to 4 short paragraphs explaining why the highest-scoring option \
         comes out ahead for this person, referring to the categories above. Do not \
         invent real-world facts that are not implied by the question; stay with the \
         scores and categories given. Plain text only.",
        cats = categories.join(", "),
    )
}
