//! Tolerant field extraction over a parsed detail page.
//!
//! The portal moves fields between sections, renames headings and nests
//! layout tables across revisions, so extraction is layered: a
//! whole-document key/value baseline as the safety net, section-scoped
//! maps and tables where headings can be located, and targeted
//! label-substring / table-structure lookups for the fields whose section
//! placement is unreliable.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::dom::{Cell, DetailPage, Table};
use crate::normalize::{is_nonempty, norm_key, norm_text};
use crate::tokens::pick_numeric_token;

/// How many tables past a section heading to consider before giving up.
const SECTION_KV_LOOKAHEAD: usize = 12;
const SECTION_TABLE_LOOKAHEAD: usize = 15;

// ---------------------------------------------------------------------------
// FieldMap
// ---------------------------------------------------------------------------

/// Ordered map from normalized label to value. First occurrence of a key
/// wins; later duplicates are discarded. Insertion order is preserved
/// because the substring fallback in [`FieldMap::resolve`] walks entries
/// in order.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = Self::new();
        for (k, v) in pairs {
            map.insert(k.as_ref(), v.as_ref());
        }
        map
    }

    /// Insert under the normalized key; no-op if the key already exists or
    /// normalizes to nothing.
    pub fn insert(&mut self, label: &str, value: &str) {
        let key = norm_key(label);
        if key.is_empty() || self.entries.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.entries.push((key, value.trim().to_string()));
    }

    pub fn get(&self, normalized_key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == normalized_key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolve a field through an ordered alias list. First pass tries each
    /// alias as an exact normalized key with a non-empty value; the second
    /// pass accepts any key that contains the alias as a substring. The two
    /// passes tolerate heading renames and compound headings respectively.
    pub fn resolve(&self, aliases: &[&str]) -> String {
        for alias in aliases {
            let key = norm_key(alias);
            if let Some(v) = self.get(&key) {
                if !v.is_empty() {
                    return v.to_string();
                }
            }
        }
        for alias in aliases {
            let key = norm_key(alias);
            if key.is_empty() {
                continue;
            }
            for (k, v) in self.iter() {
                if !v.is_empty() && k.contains(&key) {
                    return v.to_string();
                }
            }
        }
        String::new()
    }
}

/// Merge maps in priority order: a key's value is taken from the first map
/// where it is present and non-empty; later maps never overwrite an
/// accepted non-empty value.
pub fn merge_keep_first(maps: &[&FieldMap]) -> FieldMap {
    let mut out = FieldMap::new();
    for map in maps {
        for (k, v) in map.iter() {
            if !is_nonempty(v) {
                continue;
            }
            match out.entries.iter_mut().find(|(ek, _)| ek == k) {
                Some((_, existing)) if !is_nonempty(existing) => *existing = v.to_string(),
                Some(_) => {}
                None => out.entries.push((k.to_string(), v.to_string())),
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Document-wide and section-scoped extraction
// ---------------------------------------------------------------------------

/// Whole-document safety-net map: every two-cell row of every table whose
/// label and value both pass the placeholder rule.
pub fn build_baseline(page: &DetailPage) -> FieldMap {
    let mut map = FieldMap::new();
    for table in &page.tables {
        for row in &table.rows {
            let cells: &[Cell] = if row.direct.len() == 2 {
                &row.direct
            } else {
                // Nested layout rows have no direct cells; take the first
                // two descendant cells instead.
                let n = row.all.len().min(2);
                &row.all[..n]
            };
            if cells.len() != 2 {
                continue;
            }
            let (k, v) = (&cells[0].text, &cells[1].text);
            if is_nonempty(k) && is_nonempty(v) {
                map.insert(k, v);
            }
        }
    }
    map
}

/// Heading match: exact normalized equality or containment in either
/// direction, tolerating partially renamed headings.
fn heading_matches(candidate: &str, target: &str) -> bool {
    candidate == target
        || (!target.is_empty() && candidate.contains(target))
        || (!candidate.is_empty() && target.contains(candidate))
}

fn find_heading_order(page: &DetailPage, heading: &str) -> Option<usize> {
    let target = norm_key(heading);
    page.headings
        .iter()
        .find(|h| heading_matches(&norm_key(&h.text), &target))
        .map(|h| h.order)
}

/// Label/value pairs from a two-column table: direct `<td>` cells only,
/// textarea content preferred for the value (long contract objects).
fn kv_pairs_from_table(table: &Table) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for row in &table.rows {
        let tds: Vec<&Cell> = row.direct.iter().filter(|c| !c.header).collect();
        if tds.len() < 2 {
            continue;
        }
        let label = tds[0].text.trim();
        if label.is_empty() {
            continue;
        }
        let value = tds[1]
            .textarea
            .clone()
            .unwrap_or_else(|| tds[1].text.clone());
        pairs.push((label.to_string(), value));
    }
    pairs
}

/// Section-scoped key/value map: locate the heading, then take the first
/// following table that yields at least 3 plausible pairs.
pub fn extract_section_fields(page: &DetailPage, heading: &str) -> FieldMap {
    let Some(order) = find_heading_order(page, heading) else {
        debug!(heading, "Section heading not found; baseline map takes over");
        return FieldMap::new();
    };
    for table in page.tables_after(order, SECTION_KV_LOOKAHEAD) {
        let pairs = kv_pairs_from_table(table);
        if pairs.len() >= 3 {
            return FieldMap::from_pairs(pairs);
        }
    }
    debug!(heading, "No key/value table within lookahead of section heading");
    FieldMap::new()
}

/// Section-scoped structured table: rows verbatim (header row first), from
/// the first following table with at least 2 rows and 2 header columns.
pub fn extract_section_table(page: &DetailPage, heading: &str) -> Option<Vec<Vec<String>>> {
    let order = find_heading_order(page, heading)?;
    for table in page.tables_after(order, SECTION_TABLE_LOOKAHEAD) {
        let rows: Vec<Vec<String>> = table
            .rows
            .iter()
            .filter(|r| !r.direct.is_empty())
            .map(|r| r.direct.iter().map(|c| c.text.clone()).collect())
            .collect();
        if rows.len() >= 2 && rows[0].len() >= 2 {
            return Some(rows);
        }
    }
    None
}

/// Right-hand cell of the first row anywhere in the document whose
/// left-hand cell contains the label substring (normalized comparison).
/// Slower than heading-based lookup, but immune to section reshuffles.
pub fn find_value_by_label(page: &DetailPage, label_substr: &str) -> String {
    let target = norm_text(label_substr);
    if target.is_empty() {
        return String::new();
    }
    for table in &page.tables {
        for row in &table.rows {
            if row.all.len() < 2 {
                continue;
            }
            let left = &row.all[0].text;
            if left.is_empty() {
                continue;
            }
            if norm_text(left).contains(&target) {
                return row.all[1].text.trim().to_string();
            }
        }
    }
    String::new()
}

/// Numeric code from a structured table identified by a pair of column
/// headers (exact normalized match), taking the first data row whose code
/// column yields 6+ digits. Falls back to a document-wide regex for inline
/// "RP No. 123456" shapes when no structured table exists.
pub fn find_structured_code(page: &DetailPage, code_header: &str, value_header: &str) -> String {
    let code_h = norm_text(code_header);
    let value_h = norm_text(value_header);
    for table in &page.tables {
        if table.rows.len() < 2 {
            continue;
        }
        let headers: Vec<String> = table.rows[0].all.iter().map(|c| norm_text(&c.text)).collect();
        if headers.is_empty() {
            continue;
        }
        let Some(code_idx) = headers.iter().position(|h| *h == code_h) else {
            continue;
        };
        if !headers.iter().any(|h| *h == value_h) {
            continue;
        }
        for row in &table.rows[1..] {
            if row.all.len() <= code_idx {
                continue;
            }
            let digits: String = row.all[code_idx]
                .text
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect();
            if digits.len() >= 6 {
                return digits;
            }
        }
    }

    static RP_INLINE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\bRP\b\s*(?:No\.|Nro\.|#|:)?\s*(\d{6,})").expect("valid regex")
    });
    static CRP_INLINE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\bCRP\b\s*(?:No\.|Nro\.|#|:)?\s*(\d{6,})").expect("valid regex")
    });
    debug!(code_header, "No structured code table; trying inline regex shapes");
    for re in [&*RP_INLINE, &*CRP_INLINE] {
        if let Some(caps) = re.captures(&page.text) {
            return caps[1].to_string();
        }
    }
    String::new()
}

// ---------------------------------------------------------------------------
// Targeted extractions with unreliable headings
// ---------------------------------------------------------------------------

/// Funding sources from the "Fuentes de Financiacion" table: the "fuente"
/// column values, deduplicated in order, `; `-joined.
pub fn parse_funding_sources(page: &DetailPage) -> String {
    let Some(rows) = extract_section_table(page, "Fuentes de Financiacion") else {
        return String::new();
    };
    let header: Vec<String> = rows[0].iter().map(|h| norm_key(h)).collect();
    let Some(idx) = header.iter().position(|h| h == "fuente") else {
        return String::new();
    };
    let mut out: Vec<String> = Vec::new();
    for row in &rows[1..] {
        if let Some(val) = row.get(idx) {
            let val = val.trim();
            if !val.is_empty() && !out.iter().any(|o| o == val) {
                out.push(val.to_string());
            }
        }
    }
    out.join("; ")
}

/// First data row of the budget-commitment (RP) section table, by column
/// name. The section heading varies across portal revisions, so several
/// spellings are tried.
#[derive(Debug, Clone, Default)]
pub struct RpInfo {
    pub code: String,
    pub date: String,
    pub value: String,
}

const RP_HEADINGS: &[&str] = &[
    "Registro Presupuestal del Compromiso (R.P.)",
    "Registro Presupuestal del Compromiso (RP)",
    "Registro Presupuestal del Compromiso",
    "Registro Presupuestal (RP)",
    "Registro Presupuestal",
    "Registro Presupuestal del Compromiso - RP",
];

pub fn parse_rp_table(page: &DetailPage) -> RpInfo {
    let mut out = RpInfo::default();
    let rows = RP_HEADINGS
        .iter()
        .find_map(|h| extract_section_table(page, h));
    let Some(rows) = rows else {
        return out;
    };
    let header: Vec<String> = rows[0].iter().map(|h| norm_key(h)).collect();
    let idx_of = |name: &str| header.iter().position(|h| h == name);
    let i_code = idx_of("codigo");
    let i_date = idx_of("fecha");
    let i_value = idx_of("valor");

    for row in &rows[1..] {
        if row.len() < 2 {
            continue;
        }
        let cell = |i: Option<usize>| -> String {
            i.and_then(|i| row.get(i))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        if out.code.is_empty() {
            out.code = cell(i_code);
        }
        if out.date.is_empty() {
            out.date = cell(i_date);
        }
        if out.value.is_empty() {
            out.value = cell(i_value);
        }
        if !out.code.is_empty() || !out.date.is_empty() || !out.value.is_empty() {
            break;
        }
    }
    out
}

/// Budget-availability (CDP) code. A ladder of increasingly desperate
/// lookups: the stable row label, the structured "respaldos" table (a
/// 10-digit token wins outright, else the longest), two label variants,
/// then inline regex shapes over the whole page.
pub fn extract_cdp(page: &DetailPage) -> String {
    let raw = find_value_by_label(page, "Numero del respaldo presupuestal");
    if !raw.is_empty() {
        let token = pick_numeric_token(&raw);
        if !token.is_empty() {
            return token;
        }
    }

    if let Some(rows) = extract_section_table(page, "Respaldos Presupuestales Asociados al Proceso")
    {
        let header: Vec<String> = rows[0].iter().map(|h| norm_text(h)).collect();
        let mut idx_num = None;
        for (i, h) in header.iter().enumerate() {
            if h.contains("numero") && h.contains("respaldo") {
                idx_num = Some(i);
            }
        }
        if let Some(idx) = idx_num {
            let mut candidates: Vec<String> = Vec::new();
            for row in &rows[1..] {
                let Some(val) = row.get(idx) else { continue };
                let token = pick_numeric_token(val.trim());
                if token.is_empty() {
                    continue;
                }
                if token.len() == 10 {
                    return token;
                }
                candidates.push(token);
            }
            if let Some(best) = candidates.iter().max_by_key(|c| c.len()) {
                return best.clone();
            }
        }
    }

    let mut raw = find_value_by_label(page, "Certificado de disponibilidad presupuestal");
    if raw.is_empty() {
        raw = find_value_by_label(page, "CDP");
    }
    if !raw.is_empty() {
        let token = pick_numeric_token(&raw);
        if !token.is_empty() {
            return token;
        }
    }

    static CDP_INLINE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\bCDP\b\s*(?:No\.|Nro\.|#|:)?\s*([A-Za-z0-9\-/]+)").expect("valid regex")
    });
    static RESPALDO_INLINE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)respaldo presupuestal\s*(?:No\.|Nro\.|#|:)?\s*([A-Za-z0-9\-/]+)")
            .expect("valid regex")
    });
    for re in [&*CDP_INLINE, &*RESPALDO_INLINE] {
        if let Some(caps) = re.captures(&page.text) {
            let picked = pick_numeric_token(caps[1].trim());
            if !picked.is_empty() {
                return picked;
            }
        }
    }
    String::new()
}

/// The informational "Detalle del proceso número: ..." line the portal
/// prints above the tables.
pub fn informational_process_number(page: &DetailPage) -> String {
    for line in &page.lines {
        if norm_text(line).contains("detalle del proceso numero") {
            if let Some((_, value)) = line.split_once(':') {
                return value.trim().to_string();
            }
        }
    }
    String::new()
}
