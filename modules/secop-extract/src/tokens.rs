//! Numeric token heuristics.
//!
//! The portal embeds codes inside free text with inconsistent surrounding
//! words ("BPIM: 2025 00000003856", "RP No. 123456", "$ 1.200.000,00"),
//! so every numeric field goes through a digit-run heuristic rather than a
//! positional parse.

use std::sync::LazyLock;

use regex::Regex;

use crate::normalize::norm_text;

static DIGIT_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// All maximal digit runs in `s`, in order of appearance.
fn digit_runs(s: &str) -> Vec<&str> {
    DIGIT_RUNS.find_iter(s).map(|m| m.as_str()).collect()
}

/// Strip everything but digits.
pub fn extract_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Identification number, digits only.
pub fn clean_id(s: &str) -> String {
    extract_digits(s)
}

/// Most plausible numeric token in a free-text cell.
///
/// Prefers a 10-digit run (the YYMMDD#### shape of budget-availability
/// codes), then the first 4-9 digit run, then the longest run found.
pub fn pick_numeric_token(s: &str) -> String {
    let tokens = digit_runs(s.trim());
    if tokens.is_empty() {
        return String::new();
    }
    if let Some(t) = tokens.iter().find(|t| t.len() == 10) {
        return (*t).to_string();
    }
    if let Some(t) = tokens.iter().find(|t| (4..=9).contains(&t.len())) {
        return (*t).to_string();
    }
    longest(&tokens).to_string()
}

/// Monetary value as an integer digit string (COP), decimals truncated.
///
/// The portal mixes es-CO (`.` thousands, `,` decimal) and en-US
/// conventions. When both separators appear, the one occurring last is the
/// decimal separator; a lone separator is decimal only when exactly two
/// digits follow it. The rule must never inflate a value by reading a
/// decimal separator as thousands.
pub fn clean_money(s: &str) -> String {
    let raw: String = s
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if raw.is_empty() {
        return String::new();
    }

    let has_comma = raw.contains(',');
    let has_dot = raw.contains('.');

    if has_comma && has_dot {
        let last_comma = raw.rfind(',').unwrap_or(0);
        let last_dot = raw.rfind('.').unwrap_or(0);
        let decimal = if last_comma > last_dot { ',' } else { '.' };
        let int_part = raw.split(decimal).next().unwrap_or("");
        return extract_digits(int_part);
    }

    if has_comma != has_dot {
        let sep = if has_comma { ',' } else { '.' };
        if let Some((left, right)) = raw.split_once(sep) {
            if right.len() == 2 && right.chars().all(|c| c.is_ascii_digit()) {
                return extract_digits(left);
            }
        }
        return extract_digits(&raw);
    }

    extract_digits(&raw)
}

/// Normalize a BPIM/BPIN investment code to a single numeric token.
///
/// Target shape is YYYY + consecutive number (e.g. 20250000003856). The
/// portal may render it already merged, split as year + sequence, or with
/// dots and legends mixed in.
pub fn merge_investment_code(s: &str) -> String {
    let nums = digit_runs(s.trim());
    if nums.is_empty() {
        return String::new();
    }

    // Already-merged token: longest run of 12+ digits starting with "20".
    let mut best: Option<&str> = None;
    for n in &nums {
        if n.len() >= 12 && n.starts_with("20") {
            if best.map_or(true, |b| n.len() > b.len()) {
                best = Some(n);
            }
        }
    }
    if let Some(b) = best {
        return b.to_string();
    }

    // Split shape: a 20xx year token plus the longest other run.
    if let Some(year) = nums.iter().find(|n| n.len() == 4 && n.starts_with("20")) {
        let other = nums
            .iter()
            .filter(|n| *n != year)
            .max_by_key(|n| n.len())
            .copied();
        if let Some(other) = other {
            let merged = format!("{year}{other}");
            if merged.len() >= 12 {
                return merged;
            }
        }
    }

    // Last resort: any long run at all.
    nums.iter()
        .filter(|n| n.len() >= 10)
        .max_by_key(|n| n.len())
        .map(|n| (*n).to_string())
        .unwrap_or_default()
}

/// Identifier-type code (CC, NIT, CE, ...) from a raw identification cell.
///
/// Whole-token vocabulary match first; falls back to a short leading
/// alphabetic prefix, rejecting the generic "No"/"Nro" abbreviations.
pub fn extract_id_type(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    let normalized = norm_text(s);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let has = |t: &str| tokens.iter().any(|x| *x == t);

    if has("nit") {
        return "NIT".into();
    }
    if has("extranjeria") || has("ce") {
        return "CE".into();
    }
    if has("pasaporte") || has("pas") {
        return "PAS".into();
    }
    if has("pep") {
        return "PEP".into();
    }
    if (has("tarjeta") && has("identidad")) || has("ti") {
        return "TI".into();
    }
    if has("cedula") || has("cc") {
        return "CC".into();
    }

    static LEADING_ALPHA: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*([A-Za-z]{1,5})\b").expect("valid regex"));
    if let Some(caps) = LEADING_ALPHA.captures(s) {
        let token = caps[1].to_uppercase();
        if token != "NO" && token != "NRO" {
            return token;
        }
    }
    String::new()
}

/// Normalize an RP/CRP cell to a plain code: first run of 6+ digits, else
/// whatever digits the cell holds.
pub fn extract_code_token(s: &str) -> String {
    let t = s.trim();
    if t.is_empty() {
        return String::new();
    }
    static LONG_RUN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\d{6,}").expect("valid regex"));
    if let Some(m) = LONG_RUN.find(t) {
        return m.as_str().to_string();
    }
    extract_digits(t)
}

fn longest<'a>(tokens: &[&'a str]) -> &'a str {
    tokens
        .iter()
        .max_by_key(|t| t.len())
        .copied()
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_es_co_format() {
        assert_eq!(clean_money("608.603.520.000,00"), "608603520000");
    }

    #[test]
    fn money_en_us_format() {
        assert_eq!(clean_money("608,603,520,000.00"), "608603520000");
    }

    #[test]
    fn money_plain_digits_pass_through() {
        assert_eq!(clean_money("608603520000"), "608603520000");
        assert_eq!(clean_money(""), "");
    }

    #[test]
    fn money_single_separator_is_thousands_unless_two_decimals() {
        assert_eq!(clean_money("1.200.000"), "1200000");
        assert_eq!(clean_money("1,200,000"), "1200000");
        assert_eq!(clean_money("1200000,00"), "1200000");
        assert_eq!(clean_money("$ 1.200.000,00 COP"), "1200000");
    }

    #[test]
    fn numeric_token_prefers_ten_digits() {
        assert_eq!(pick_numeric_token("CDP No. 2515000123 del 2025"), "2515000123");
        assert_eq!(pick_numeric_token("No. 123456"), "123456");
        assert_eq!(pick_numeric_token("cod 123"), "123");
        assert_eq!(pick_numeric_token(""), "");
        assert_eq!(pick_numeric_token("sin datos"), "");
    }

    #[test]
    fn numeric_token_found_in_bpim_text() {
        assert!(!pick_numeric_token("BPIM: 2025 00000003856").is_empty());
    }

    #[test]
    fn investment_code_merges_year_and_sequence() {
        let code = merge_investment_code("BPIM: 2025 00000003856");
        assert!(code.len() >= 12, "short code: {code}");
        assert!(code.starts_with("2025"));
        assert_eq!(code, "202500000003856");
    }

    #[test]
    fn investment_code_prefers_already_merged_token() {
        assert_eq!(
            merge_investment_code("Codigo BPIM Ano 2025 20250000003856"),
            "20250000003856"
        );
    }

    #[test]
    fn investment_code_falls_back_to_long_run() {
        assert_eq!(merge_investment_code("1234567890123"), "1234567890123");
        assert_eq!(merge_investment_code("corto 123"), "");
    }

    #[test]
    fn id_type_vocabulary() {
        assert_eq!(extract_id_type("NIT 900.123.456-7"), "NIT");
        assert_eq!(extract_id_type("Cédula de Ciudadanía 12.345.678"), "CC");
        assert_eq!(extract_id_type("CE 123456"), "CE");
        assert_eq!(extract_id_type("Pasaporte AB12345"), "PAS");
        assert_eq!(extract_id_type("Tarjeta de Identidad 99"), "TI");
    }

    #[test]
    fn id_type_prefix_fallback_rejects_generic_words() {
        assert_eq!(extract_id_type("RUT 12345"), "RUT");
        assert_eq!(extract_id_type("No. 12345"), "");
        assert_eq!(extract_id_type(""), "");
    }

    #[test]
    fn code_token_takes_first_long_run() {
        assert_eq!(extract_code_token("RP No. 123456 del 2025"), "123456");
        assert_eq!(extract_code_token("12-34"), "1234");
    }
}
