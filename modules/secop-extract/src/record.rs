//! Canonical record assembly.
//!
//! Combines the baseline map, section maps, targeted lookups and token
//! heuristics into one fixed-shape [`ProcessRecord`]. Missing data is
//! never an error here: fields degrade to empty strings and are surfaced
//! through the completeness verdict.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::dom::DetailPage;
use crate::extract::{
    build_baseline, extract_cdp, extract_section_fields, find_structured_code, find_value_by_label,
    informational_process_number, merge_keep_first, parse_funding_sources, parse_rp_table,
    FieldMap,
};
use crate::normalize::{norm_key, norm_text};
use crate::tokens::{clean_id, clean_money, extract_code_token, extract_id_type, merge_investment_code};

// ---------------------------------------------------------------------------
// Column labels (these are the artifact headers, matched via norm_key)
// ---------------------------------------------------------------------------

pub const COL_PROCESS_NUMBER: &str = "Numero de proceso (informativo)";
pub const COL_CONSTANCIA: &str = "Numero de constancia";
pub const COL_PROCESS_TYPE: &str = "Tipo de Gasto";
pub const COL_STATUS: &str = "Estado del proceso";
pub const COL_MODALITY: &str = "Modalidad de contratacion";
pub const COL_FUNDING_SOURCE: &str = "Fuente de financiacion";
pub const COL_RP: &str = "Registro Presupuestal (RP)";
pub const COL_CDP: &str = "Certificado de disponibilidad presupuestal";
pub const COL_CONTRACT_NUMBER: &str = "Numero de contrato";
pub const COL_OBJECT: &str = "Objeto del contrato";
pub const COL_VALUE: &str = "Valor del contrato (COP)";
pub const COL_TERM: &str = "Plazo de ejecucion";
pub const COL_START_DATE: &str = "Fecha de inicio";
pub const COL_END_DATE: &str = "Fecha de terminacion";
pub const COL_CONTRACTOR: &str = "Razon social del proponente/contratista";
pub const COL_ID_TYPE: &str = "Tipo de identificacion";
pub const COL_CONTRACTOR_ID: &str = "Identificacion del proponente/contratista";
pub const COL_LEGAL_REP: &str = "Representante legal";
pub const COL_LEGAL_REP_ID: &str = "Identificacion del representante legal";
pub const COL_INVESTMENT_CODE: &str = "Codigo BPIM";
pub const COL_SOURCE: &str = "Fuente del documento";
pub const COL_VALIDATION: &str = "Estado de validacion";
pub const COL_OBSERVATIONS: &str = "Observaciones";

/// What the record was extracted from.
const SOURCE_LABEL: &str = "SECOP I (detalleProceso)";

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Completeness verdict over the four critical fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationStatus {
    Complete,
    NeedsReview,
    Incomplete,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Complete => "Complete",
            ValidationStatus::NeedsReview => "Needs review",
            ValidationStatus::Incomplete => "Incomplete",
        }
    }
}

/// Canonical output record for one constancia. Immutable after assembly;
/// written exactly once to the artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRecord {
    pub process_number: String,
    pub constancia: String,
    pub process_type: String,
    pub status: String,
    pub modality: String,
    pub funding_source: String,
    pub rp_code: String,
    pub cdp_code: String,
    pub contract_number: String,
    pub object: String,
    pub value_cop: String,
    pub term: String,
    pub start_date: String,
    pub end_date: String,
    pub contractor_name: String,
    pub contractor_id_type: String,
    pub contractor_id: String,
    pub legal_rep_name: String,
    pub legal_rep_id: String,
    pub investment_code: String,
    pub source: String,
    pub validation_status: ValidationStatus,
    pub observations: String,
}

impl ProcessRecord {
    /// (column label, value) pairs in artifact column order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (COL_PROCESS_NUMBER, self.process_number.clone()),
            (COL_CONSTANCIA, self.constancia.clone()),
            (COL_PROCESS_TYPE, self.process_type.clone()),
            (COL_STATUS, self.status.clone()),
            (COL_MODALITY, self.modality.clone()),
            (COL_FUNDING_SOURCE, self.funding_source.clone()),
            (COL_RP, self.rp_code.clone()),
            (COL_CDP, self.cdp_code.clone()),
            (COL_CONTRACT_NUMBER, self.contract_number.clone()),
            (COL_OBJECT, self.object.clone()),
            (COL_VALUE, self.value_cop.clone()),
            (COL_TERM, self.term.clone()),
            (COL_START_DATE, self.start_date.clone()),
            (COL_END_DATE, self.end_date.clone()),
            (COL_CONTRACTOR, self.contractor_name.clone()),
            (COL_ID_TYPE, self.contractor_id_type.clone()),
            (COL_CONTRACTOR_ID, self.contractor_id.clone()),
            (COL_LEGAL_REP, self.legal_rep_name.clone()),
            (COL_LEGAL_REP_ID, self.legal_rep_id.clone()),
            (COL_INVESTMENT_CODE, self.investment_code.clone()),
            (COL_SOURCE, self.source.clone()),
            (COL_VALIDATION, self.validation_status.as_str().to_string()),
            (COL_OBSERVATIONS, self.observations.clone()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Derivation rules
// ---------------------------------------------------------------------------

/// Classify the funding source into a short catalogue. Keyword priority:
/// royalties system, participation system (including exact-token "sgp"),
/// own resources, other resources; unclassified text has common header
/// noise stripped and falls back to the original when stripping empties it.
pub fn classify_funding_source(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    let n = norm_key(s);

    static SGP_TOKEN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\bsgp\b").expect("valid regex"));

    if n.contains("regalia") || n.contains("sgr") {
        return "Sistema General de Regalias".into();
    }
    if n.contains("participacion") || SGP_TOKEN.is_match(&n) {
        return "Sistema General de Participaciones (SGP)".into();
    }
    if n.contains("propio") {
        return "Recursos propios".into();
    }
    if n.contains("otro") {
        return "Otros recursos".into();
    }

    let mut residual = n;
    for junk in ["fuente", "financiacion", "valor", "tipo"] {
        residual = residual.replace(junk, "");
    }
    let residual = residual.trim();
    if residual.is_empty() {
        s.to_string()
    } else {
        residual.to_string()
    }
}

/// Classify the expense-type field. Only two signals are trusted; anything
/// else stays empty rather than guessing.
pub fn classify_process_type(expense_type: &str) -> String {
    let s = norm_text(expense_type);
    if s.contains("inversion") {
        "Inversion".into()
    } else if s.contains("funcionamiento") {
        "Funcionamiento".into()
    } else {
        String::new()
    }
}

/// The four fields a record must carry to be usable downstream.
const CRITICAL_FIELDS: &[(&str, fn(&ProcessRecord) -> &str)] = &[
    (COL_MODALITY, |r| &r.modality),
    (COL_OBJECT, |r| &r.object),
    (COL_VALUE, |r| &r.value_cop),
    (COL_CONTRACTOR, |r| &r.contractor_name),
];

/// Secondary fields flagged into observations without affecting the verdict.
const SOFT_FIELDS: &[(&str, fn(&ProcessRecord) -> &str)] = &[
    (COL_CONTRACT_NUMBER, |r| &r.contract_number),
    (COL_TERM, |r| &r.term),
    (COL_START_DATE, |r| &r.start_date),
];

fn completeness_verdict(record: &ProcessRecord) -> (ValidationStatus, String) {
    let missing: Vec<&str> = CRITICAL_FIELDS
        .iter()
        .filter(|(_, get)| get(record).trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    match missing.len() {
        0 => (ValidationStatus::Complete, String::new()),
        1 => (
            ValidationStatus::NeedsReview,
            format!("Missing: {}", missing[0]),
        ),
        _ => (
            ValidationStatus::Incomplete,
            format!("Missing: {}", missing.join("; ")),
        ),
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Build the canonical record for one constancia from its parsed page.
/// Total: always returns a full record, with empty strings where the page
/// gave nothing.
pub fn assemble_record(page: &DetailPage, constancia: &str) -> ProcessRecord {
    // Targeted lookup independent of section placement; this label is the
    // most stable spelling across portal revisions.
    let rep_id_raw = find_value_by_label(page, "Identificacion del Representante Legal");

    // Baseline safety net, then section maps backed by it.
    let baseline = build_baseline(page);
    let general = merge_keep_first(&[
        &extract_section_fields(page, "Informacion General del Proceso"),
        &baseline,
    ]);
    let contract = merge_keep_first(&[
        &extract_section_fields(page, "Informacion del Contrato"),
        &baseline,
    ]);

    // Budget codes: structured table first, tolerant fallbacks after.
    let rp_code = {
        let from_table = extract_code_token(&parse_rp_table(page).code);
        if from_table.is_empty() {
            find_structured_code(page, "Codigo", "Valor")
        } else {
            from_table
        }
    };
    let cdp_code = extract_cdp(page);

    let process_number = informational_process_number(page);

    let modality = general.resolve(&["Tipo de Proceso", "Modalidad de Contratacion", "Modalidad"]);
    let status = general.resolve(&["Estado del Proceso", "Estado del Contrato", "Estado"]);

    let mut funding = parse_funding_sources(page);
    if funding.is_empty() {
        funding = general.resolve(&[
            "Fuente de Financiacion",
            "Fuentes de Financiacion",
            "Fuente",
        ]);
    }
    let funding_source = classify_funding_source(&funding);

    let contract_number = contract.resolve(&[
        "Numero del Contrato",
        "No. Contrato",
        "Contrato No",
        "Numero de Contrato",
    ]);
    let object = contract.resolve(&["Objeto del Contrato", "Objeto"]);
    let value_raw = contract.resolve(&[
        "Cuantia Definitiva del Contrato",
        "Cuantia del Contrato",
        "Valor del Contrato",
        "Cuantia",
        "Valor",
    ]);
    let value_cop = clean_money(&value_raw);

    let term = contract.resolve(&[
        "Plazo de Ejecucion del Contrato",
        "Plazo de Ejecucion",
        "Plazo",
    ]);
    let start_date = contract.resolve(&[
        "Fecha de Inicio de Ejecucion del Contrato",
        "Fecha de Inicio",
        "Fecha inicio",
    ]);
    let end_date = contract.resolve(&[
        "Fecha de Terminacion del Contrato",
        "Fecha de Terminacion",
        "Fecha fin",
        "Fecha terminacion",
    ]);

    let contractor_name = contract.resolve(&[
        "Nombre o Razon Social del Contratista",
        "Contratista",
        "Adjudicatario",
    ]);
    let mut contractor_id_raw = contract.resolve(&[
        "Identificacion del Contratista",
        "NIT del Contratista",
        "NIT",
        "Cedula",
        "Identificacion",
    ]);
    if contractor_id_raw.is_empty() {
        contractor_id_raw = general.resolve(&["Identificacion", "NIT", "Cedula"]);
    }

    let mut legal_rep_name = contract.resolve(&[
        "Nombre del Representante Legal del Contratista",
        "Representante Legal",
        "Representante",
    ]);
    if legal_rep_name.is_empty() {
        legal_rep_name = general.resolve(&["Representante Legal", "Representante"]);
    }

    let mut rep_id = contract.resolve(&[
        "Identificacion del Representante Legal del Contratista",
        "Identificacion del Representante Legal",
        "Identificacion Representante Legal",
        "Cedula Representante",
        "Identificacion Representante",
    ]);
    if rep_id.is_empty() {
        rep_id = general.resolve(&[
            "Identificacion del Representante Legal",
            "Identificacion Representante Legal",
        ]);
    }
    // The label-scanned value is the more stable of the two when present.
    let legal_rep_id = clean_id(if rep_id_raw.is_empty() {
        &rep_id
    } else {
        &rep_id_raw
    });

    let contractor_id_type = extract_id_type(&contractor_id_raw);
    let contractor_id = clean_id(&contractor_id_raw);

    let mut bpim = contract.resolve(&["BPIM", "BPIN", "Codigo BPIM"]);
    if bpim.is_empty() {
        bpim = general.resolve(&["BPIM", "BPIN", "Codigo BPIM"]);
    }
    let investment_code = merge_investment_code(&bpim);

    let mut expense_type = general.resolve(&["Tipo de Gasto", "Tipo Gasto"]);
    if expense_type.is_empty() {
        expense_type = contract.resolve(&["Tipo de Gasto", "Tipo Gasto"]);
    }
    let process_type = classify_process_type(&expense_type);

    let mut record = ProcessRecord {
        process_number,
        constancia: constancia.to_string(),
        process_type,
        status,
        modality,
        funding_source,
        rp_code,
        cdp_code,
        contract_number,
        object,
        value_cop,
        term,
        start_date,
        end_date,
        contractor_name,
        contractor_id_type,
        contractor_id,
        legal_rep_name,
        legal_rep_id,
        investment_code,
        source: SOURCE_LABEL.to_string(),
        validation_status: ValidationStatus::Complete,
        observations: String::new(),
    };

    let (status_verdict, reason) = completeness_verdict(&record);
    let mut obs_parts = Vec::new();
    if !reason.is_empty() {
        obs_parts.push(reason);
    }
    let missing_soft: Vec<&str> = SOFT_FIELDS
        .iter()
        .filter(|(_, get)| get(&record).trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing_soft.is_empty() {
        obs_parts.push(format!("No data: {}", missing_soft.join(", ")));
    }

    record.validation_status = status_verdict;
    record.observations = obs_parts.join(" | ");
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_record() -> ProcessRecord {
        ProcessRecord {
            process_number: "LP-001".into(),
            constancia: "25-1-241304".into(),
            process_type: "Inversion".into(),
            status: "Celebrado".into(),
            modality: "Licitación Pública".into(),
            funding_source: "Recursos propios".into(),
            rp_code: "123456".into(),
            cdp_code: "654321".into(),
            contract_number: "CT-100".into(),
            object: "Mantenimiento vial".into(),
            value_cop: "1200000".into(),
            term: "6 meses".into(),
            start_date: "2025-01-01".into(),
            end_date: "2025-06-30".into(),
            contractor_name: "ACME S.A.".into(),
            contractor_id_type: "NIT".into(),
            contractor_id: "9001234567".into(),
            legal_rep_name: "Juana Pérez".into(),
            legal_rep_id: "12345678".into(),
            investment_code: "20250000003856".into(),
            source: "SECOP I (detalleProceso)".into(),
            validation_status: ValidationStatus::Complete,
            observations: String::new(),
        }
    }

    #[test]
    fn verdict_complete_when_criticals_present() {
        let (v, reason) = completeness_verdict(&full_record());
        assert_eq!(v, ValidationStatus::Complete);
        assert!(reason.is_empty());
    }

    #[test]
    fn verdict_needs_review_names_single_missing_field() {
        let mut r = full_record();
        r.value_cop.clear();
        let (v, reason) = completeness_verdict(&r);
        assert_eq!(v, ValidationStatus::NeedsReview);
        assert_eq!(reason, format!("Missing: {COL_VALUE}"));
    }

    #[test]
    fn verdict_incomplete_lists_all_missing() {
        let mut r = full_record();
        r.modality.clear();
        r.contractor_name.clear();
        let (v, reason) = completeness_verdict(&r);
        assert_eq!(v, ValidationStatus::Incomplete);
        assert!(reason.contains(COL_MODALITY));
        assert!(reason.contains(COL_CONTRACTOR));
    }

    #[test]
    fn funding_classification_priority() {
        assert_eq!(
            classify_funding_source("Sistema General de Regalías"),
            "Sistema General de Regalias"
        );
        assert_eq!(
            classify_funding_source("recursos del SGP"),
            "Sistema General de Participaciones (SGP)"
        );
        // Royalties outranks participation when both appear.
        assert_eq!(
            classify_funding_source("SGR y participaciones"),
            "Sistema General de Regalias"
        );
        assert_eq!(classify_funding_source("Recursos Propios"), "Recursos propios");
        assert_eq!(classify_funding_source("Otros recursos"), "Otros recursos");
        assert_eq!(classify_funding_source(""), "");
    }

    #[test]
    fn funding_unclassified_strips_noise() {
        assert_eq!(classify_funding_source("Fuente: Crédito BID"), "credito bid");
        // Stripping everything falls back to the original text.
        assert_eq!(classify_funding_source("Fuente"), "Fuente");
    }

    #[test]
    fn process_type_two_signals_only() {
        assert_eq!(classify_process_type("Inversión"), "Inversion");
        assert_eq!(classify_process_type("Gastos de Funcionamiento"), "Funcionamiento");
        assert_eq!(classify_process_type("Otro"), "");
    }

    const FULL_PAGE: &str = r#"
        <p>Detalle del Proceso Número: LP-2025-01</p>
        <table><tr><td class="tttablas">Información General del Proceso</td></tr></table>
        <table>
            <tr><td>Tipo de Proceso</td><td>Licitación Pública</td></tr>
            <tr><td>Estado del Proceso</td><td>Celebrado</td></tr>
            <tr><td>Tipo de Gasto</td><td>Inversión</td></tr>
            <tr><td>Fuente de Financiación</td><td>Recursos propios</td></tr>
        </table>
        <table><tr><td class="tttablas">Información del Contrato</td></tr></table>
        <table>
            <tr><td>Número del Contrato</td><td>CT-100</td></tr>
            <tr><td>Objeto del Contrato</td><td><textarea>Mantenimiento vial</textarea></td></tr>
            <tr><td>Cuantía Definitiva del Contrato</td><td>$ 1.200.000,00</td></tr>
            <tr><td>Nombre o Razón Social del Contratista</td><td>ACME S.A.</td></tr>
            <tr><td>Identificación del Contratista</td><td>NIT 900.123.456</td></tr>
            <tr><td>Plazo de Ejecución del Contrato</td><td>6 meses</td></tr>
            <tr><td>Fecha de Inicio de Ejecución del Contrato</td><td>2025-01-01</td></tr>
            <tr><td>Identificación del Representante Legal</td><td>CC 12.345.678</td></tr>
            <tr><td>Código BPIM</td><td>BPIM: 2025 00000003856</td></tr>
        </table>
        <table><tr><td class="tttablas">Registro Presupuestal del Compromiso (RP)</td></tr></table>
        <table>
            <tr><th>Código</th><th>Fecha</th><th>Valor</th></tr>
            <tr><td>123456</td><td>2025-02-01</td><td>1.200.000</td></tr>
        </table>"#;

    #[test]
    fn assembles_complete_record_from_page() {
        let page = DetailPage::parse(FULL_PAGE);
        let record = assemble_record(&page, "25-1-241304");

        assert_eq!(record.process_number, "LP-2025-01");
        assert_eq!(record.constancia, "25-1-241304");
        assert_eq!(record.modality, "Licitación Pública");
        assert_eq!(record.status, "Celebrado");
        assert_eq!(record.process_type, "Inversion");
        assert_eq!(record.funding_source, "Recursos propios");
        assert_eq!(record.object, "Mantenimiento vial");
        assert_eq!(record.value_cop, "1200000");
        assert_eq!(record.contract_number, "CT-100");
        assert_eq!(record.contractor_name, "ACME S.A.");
        assert_eq!(record.contractor_id_type, "NIT");
        assert_eq!(record.contractor_id, "900123456");
        assert_eq!(record.legal_rep_id, "12345678");
        assert_eq!(record.rp_code, "123456");
        assert_eq!(record.investment_code, "202500000003856");
        assert_eq!(record.validation_status, ValidationStatus::Complete);
    }

    #[test]
    fn assembly_is_total_on_empty_page() {
        let page = DetailPage::parse("<html><body><p>nada</p></body></html>");
        let record = assemble_record(&page, "25-1-241304");
        assert_eq!(record.validation_status, ValidationStatus::Incomplete);
        assert!(record.observations.starts_with("Missing:"));
        assert!(record.observations.contains("No data:"));
        assert_eq!(record.constancia, "25-1-241304");
    }
}
