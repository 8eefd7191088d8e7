//! C2 — glob-to-regex pattern matcher.
//!
//! Used by import-policy admission (prefix match) and env-var masking
//! (full-string match). Deliberately not a general glob engine: the only
//! wildcard is `*`, and every other regex metacharacter in the pattern is
//! escaped literally before translation, so patterns behave the way a
//! non-regex-aware caller expects.

use regex::Regex;

/// Translate a `*`-glob into an anchored regex. `anchor_end` controls
/// whether the match must consume the whole string (env masking) or only a
/// prefix (import specifiers).
fn to_regex(pattern: &str, anchor_end: bool) -> Regex {
    let escaped = regex::escape(pattern);
    // `regex::escape` escapes `*` along with everything else; undo that so
    // the only special character left is the wildcard we want.
    let translated = escaped.replace(r"\*", ".*");
    let anchored = if anchor_end {
        format!("^{translated}$")
    } else {
        format!("^{translated}")
    };
    // `translated` is built entirely from escaped literals plus `.*`, so it
    // is always valid regex syntax.
    Regex::new(&anchored).expect("pattern translation always produces valid regex")
}

/// True iff `pattern` matches `text` under the glob-to-regex translation
/// described in spec §4.2. Pure and deterministic.
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    to_regex(pattern, false).is_match(text)
}

/// True iff `pattern` matches `text` anchored at both ends (used for env
/// variable name masking, where a partial match would over-redact).
pub fn pattern_matches_exact(pattern: &str, text: &str) -> bool {
    to_regex(pattern, true).is_match(text)
}

/// True iff `text` matches any pattern in `patterns` (disjunction, as
/// required by the C2 contract — "matches any pattern" is order-independent).
pub fn matches_any(patterns: &[String], text: &str) -> bool {
    patterns.iter().any(|p| pattern_matches(p, text))
}

/// Same as [`matches_any`] but using the both-ends-anchored match.
pub fn matches_any_exact(patterns: &[String], text: &str) -> bool {
    patterns.iter().any(|p| pattern_matches_exact(p, text))
}
