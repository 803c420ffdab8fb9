//! Title normalisation and gestalt string similarity
//!
//! The fuzzy tier compares normalised titles with the Ratcliff/Obershelp
//! ratio: twice the number of matching characters over the total length,
//! where matches are found by recursively taking the longest common
//! substring. Output agrees with Python's `difflib.SequenceMatcher.ratio`
//! for junk-free input, which keeps threshold tests portable.

use once_cell::sync::Lazy;
use regex::Regex;

/// `[320kbps]`, `(Radio Edit)` and friends
static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("bracketed pattern"));

/// Rip-scene noise that says nothing about the recording
const NOISE_TOKENS: &[&str] = &[
    "320", "256", "192", "128", "v0", "v2", "vbr", "cbr", "flac", "mp3", "aac", "m4a",
];

/// Normalise a title for fuzzy comparison.
///
/// Lowercase, bracketed parentheticals stripped, `_`/`-` become spaces,
/// noise tokens dropped, whitespace collapsed.
pub fn normalize_title(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let stripped = BRACKETED.replace_all(&lower, " ");
    let spaced = stripped.replace(['_', '-'], " ");

    spaced
        .split_whitespace()
        .filter(|token| !NOISE_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ratcliff/Obershelp similarity in [0, 1].
pub fn gestalt_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let matches = matching_chars(&a, &b);
    2.0 * matches as f64 / (a.len() + b.len()) as f64
}

/// Total characters covered by recursively-matched common substrings
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_match(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + len..], &b[j + len..])
}

/// Longest common substring of `a` and `b`, earliest occurrence wins ties.
/// Returns (start in a, start in b, length).
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j] = length of the common suffix ending at a[i-1], b[j-1]
    let mut lengths = vec![0usize; b.len() + 1];

    for i in 0..a.len() {
        let mut next = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                let len = lengths[j] + 1;
                next[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        lengths = next;
    }

    best
}
