//! Constancia (process record identifier) handling.
//!
//! A constancia is the dash-separated code identifying one tendering
//! process's detail page: `YY-XX-NNNN` with a 2-digit year, a 1-2 digit
//! middle group and a 4-12 digit sequence (e.g. `25-1-241304`,
//! `25-15-14542595`). Pasted input routinely carries Unicode dash variants
//! and non-breaking spaces, so everything is normalized to ASCII before
//! matching.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ScrapeError;

/// Detail-page URL prefix; the constancia is appended verbatim.
pub const DETAIL_BASE_URL: &str =
    "https://www.contratos.gov.co/consultas/detalleProceso.do?numConstancia=";

/// Unicode dash variants seen in pasted text (U+2010..U+2015, U+2212).
const UNICODE_DASHES: [char; 7] = ['‐', '‑', '‒', '–', '—', '―', '−'];

/// Anchored validation form.
static CONSTANCIA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}-\d{1,2}-\d{4,12}$").expect("valid regex"));

/// Word-boundary detection form, for pulling constancias out of free text.
static CONSTANCIA_DETECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2}-\d{1,2}-\d{4,12})\b").expect("valid regex"));

/// Replace non-breaking spaces and Unicode dashes with their ASCII forms.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c == '\u{00A0}' {
                ' '
            } else if UNICODE_DASHES.contains(&c) {
                '-'
            } else {
                c
            }
        })
        .collect()
}

/// Normalize a single constancia: trim, ASCII dashes, strip all whitespace.
pub fn normalize_constancia(constancia: &str) -> String {
    normalize_text(constancia.trim())
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Validate a constancia, returning its normalized form.
pub fn validate_constancia(constancia: &str) -> Result<String, ScrapeError> {
    let normalized = normalize_constancia(constancia);
    if CONSTANCIA_RE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(ScrapeError::InvalidConstancia {
            input: constancia.to_string(),
        })
    }
}

/// Pull every constancia out of free-form pasted text, normalized and
/// deduplicated, preserving first-seen order. Full detail URLs work too:
/// the word-boundary regex matches the constancia inside the
/// `numConstancia=` query parameter.
pub fn extract_constancias(raw: &str) -> Vec<String> {
    let normalized = normalize_text(raw);
    let mut seen = Vec::new();
    for m in CONSTANCIA_DETECT_RE.find_iter(&normalized) {
        let c = normalize_constancia(m.as_str());
        if !seen.contains(&c) {
            seen.push(c);
        }
    }
    seen
}

/// Detail-page URL for a validated constancia.
pub fn build_url(base_url: &str, constancia: &str) -> String {
    format!("{base_url}{constancia}")
}
