//! Label and text normalization.
//!
//! SECOP detail pages spell the same label a dozen ways: varying accents,
//! case, trailing colons, stray whitespace. Every field lookup goes through
//! one of these normal forms so that map keys and heading comparisons are
//! stable across page revisions.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical key form for field labels: trimmed, lowercased, accents
/// stripped (NFD decomposition, combining marks dropped), whitespace runs
/// collapsed, colons removed. Total and idempotent.
pub fn norm_key(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let collapsed = collapse_whitespace(&stripped);
    collapsed.replace(':', "").trim().to_string()
}

/// Aggressive comparison form: accents stripped (NFKD), lowercased, every
/// non-alphanumeric run replaced by a single space. Used for tolerant
/// substring matching where punctuation differences must not matter.
pub fn norm_text(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let lowered = stripped.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_space = true;
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// A value counts as present only if it is non-blank and not one of the
/// placeholder strings the portal renders for empty cells.
pub fn is_nonempty(v: &str) -> bool {
    let t = v.trim();
    if t.is_empty() {
        return false;
    }
    !matches!(t.to_lowercase().as_str(), "nan" | "none" | "null" | "-")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_key_strips_accents_case_and_colons() {
        assert_eq!(norm_key("  Modalidad de Contratación:  "), "modalidad de contratacion");
        assert_eq!(norm_key("Número   del\tContrato"), "numero del contrato");
    }

    #[test]
    fn norm_key_is_idempotent() {
        for s in ["Información General del Proceso", "  Plazo: ", "ÑÍÁ  é:", ""] {
            let once = norm_key(s);
            assert_eq!(norm_key(&once), once);
        }
    }

    #[test]
    fn norm_key_total_on_empty() {
        assert_eq!(norm_key(""), "");
        assert_eq!(norm_key("   "), "");
    }

    #[test]
    fn norm_text_replaces_punctuation_with_spaces() {
        assert_eq!(norm_text("Identificación del Rep. Legal (C.C.)"), "identificacion del rep legal c c");
        assert_eq!(norm_text("Código"), "codigo");
    }

    #[test]
    fn placeholder_values_count_as_empty() {
        assert!(!is_nonempty(""));
        assert!(!is_nonempty("  "));
        assert!(!is_nonempty("nan"));
        assert!(!is_nonempty("NONE"));
        assert!(!is_nonempty("null"));
        assert!(!is_nonempty("-"));
        assert!(is_nonempty("0"));
        assert!(is_nonempty("ACME S.A."));
    }
}
