//! CSV-backed results workbook.
//!
//! The artifact is a results sheet plus a sibling `*_errores.csv` errors
//! sheet. Column headers are the human-readable labels; record fields are
//! resolved to columns through the label normalizer, so a reordered or
//! partially renamed template still lines up. Rows already on disk are
//! never rewritten: appends land at the first row where both identifying
//! columns are blank.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use secop_extract::normalize::norm_key;
use secop_extract::record::{self, ProcessRecord};

/// Column that gets a clickable link back to the portal detail page.
pub const COL_OPEN_DETAIL: &str = "Abrir detalle";

/// Default result-sheet columns, in order.
pub fn result_columns() -> Vec<String> {
    let mut cols = vec![
        record::COL_PROCESS_NUMBER.to_string(),
        record::COL_CONSTANCIA.to_string(),
        record::COL_PROCESS_TYPE.to_string(),
        record::COL_STATUS.to_string(),
        record::COL_MODALITY.to_string(),
        record::COL_FUNDING_SOURCE.to_string(),
        record::COL_RP.to_string(),
        record::COL_CDP.to_string(),
        record::COL_CONTRACT_NUMBER.to_string(),
        record::COL_OBJECT.to_string(),
        record::COL_VALUE.to_string(),
        record::COL_TERM.to_string(),
        record::COL_START_DATE.to_string(),
        record::COL_END_DATE.to_string(),
        record::COL_CONTRACTOR.to_string(),
        record::COL_ID_TYPE.to_string(),
        record::COL_CONTRACTOR_ID.to_string(),
        record::COL_LEGAL_REP.to_string(),
        record::COL_LEGAL_REP_ID.to_string(),
        record::COL_INVESTMENT_CODE.to_string(),
        record::COL_SOURCE.to_string(),
        record::COL_VALIDATION.to_string(),
        record::COL_OBSERVATIONS.to_string(),
    ];
    cols.push(COL_OPEN_DETAIL.to_string());
    cols
}

/// In-memory view of the artifact, flushed to disk by [`Workbook::save`].
pub struct Workbook {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    errors: Vec<(String, String)>,
    /// First unused row index, computed at open and advanced on append.
    next_row: usize,
}

impl Workbook {
    /// Load an existing artifact or start a fresh one with the default
    /// columns. The first unused row is located by scanning the two
    /// identifying columns, so accumulation across runs never clobbers.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        let (headers, rows) = if path.exists() {
            read_sheet(path)?
        } else {
            (result_columns(), Vec::new())
        };
        let errors = {
            let err_path = errors_path(path);
            if err_path.exists() {
                read_sheet(&err_path)?.1
                    .into_iter()
                    .map(|r| {
                        let mut it = r.into_iter();
                        (it.next().unwrap_or_default(), it.next().unwrap_or_default())
                    })
                    .collect()
            } else {
                Vec::new()
            }
        };

        let mut wb = Workbook {
            path: path.to_path_buf(),
            headers,
            rows,
            errors,
            next_row: 0,
        };
        wb.next_row = wb.find_next_row();
        Ok(wb)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First row where both identifying columns are blank (0-based data
    /// row index), else one past the last row. Scanning two columns avoids
    /// being fooled by stray values in formula-style columns.
    pub fn find_next_row(&self) -> usize {
        let col_a = self.column_index(record::COL_PROCESS_NUMBER).unwrap_or(0);
        let col_b = self.column_index(record::COL_CONSTANCIA).unwrap_or(1);
        for (i, row) in self.rows.iter().enumerate() {
            let a = row.get(col_a).map(|s| s.trim()).unwrap_or("");
            let b = row.get(col_b).map(|s| s.trim()).unwrap_or("");
            if a.is_empty() && b.is_empty() {
                return i;
            }
        }
        self.rows.len()
    }

    fn column_index(&self, label: &str) -> Option<usize> {
        let target = norm_key(label);
        self.headers.iter().position(|h| norm_key(h) == target)
    }

    /// Write one record at the current append position, resolving headers
    /// to record fields via the normalizer and filling the detail column
    /// with the portal link.
    pub fn append_record(&mut self, record: &ProcessRecord, constancia: &str, base_url: &str) {
        let by_key: HashMap<String, String> = record
            .fields()
            .into_iter()
            .map(|(label, value)| (norm_key(label), value))
            .collect();
        let detail_key = norm_key(COL_OPEN_DETAIL);

        let row: Vec<String> = self
            .headers
            .iter()
            .map(|h| {
                let key = norm_key(h);
                if key == detail_key {
                    format!("{base_url}{constancia}")
                } else {
                    by_key.get(&key).cloned().unwrap_or_default()
                }
            })
            .collect();

        while self.rows.len() <= self.next_row {
            self.rows.push(vec![String::new(); self.headers.len()]);
        }
        self.rows[self.next_row] = row;
        self.next_row += 1;
        debug!(constancia, row = self.next_row, "Row appended");
    }

    /// Queue (constancia, message) rows for the errors sheet.
    pub fn append_errors(&mut self, errors: &[(String, String)]) {
        self.errors.extend(errors.iter().cloned());
    }

    /// Flush the results sheet and, when there are errors, the sibling
    /// errors sheet.
    pub fn save(&self) -> Result<()> {
        write_sheet(&self.path, &self.headers, &self.rows)?;
        if !self.errors.is_empty() {
            let rows: Vec<Vec<String>> = self
                .errors
                .iter()
                .map(|(c, e)| vec![c.clone(), e.clone()])
                .collect();
            write_sheet(
                &errors_path(&self.path),
                &["numConstancia".to_string(), "error".to_string()],
                &rows,
            )?;
        }
        Ok(())
    }
}

/// `Resultados.csv` → `Resultados_errores.csv`.
fn errors_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!("{stem}_errores.csv"))
}

fn read_sheet(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    let mut records = reader.records();
    let headers = match records.next() {
        Some(first) => first?.iter().map(String::from).collect(),
        None => result_columns(),
    };
    let mut rows = Vec::new();
    for record in records {
        rows.push(record?.iter().map(String::from).collect());
    }
    Ok((headers, rows))
}

fn write_sheet(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let file = File::create(path).with_context(|| format!("writing {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secop_extract::record::ValidationStatus;

    fn sample_record(constancia: &str) -> ProcessRecord {
        ProcessRecord {
            process_number: "LP-01".into(),
            constancia: constancia.into(),
            process_type: String::new(),
            status: "Celebrado".into(),
            modality: "Licitación Pública".into(),
            funding_source: String::new(),
            rp_code: String::new(),
            cdp_code: String::new(),
            contract_number: "CT-1".into(),
            object: "Obra".into(),
            value_cop: "1200000".into(),
            term: String::new(),
            start_date: String::new(),
            end_date: String::new(),
            contractor_name: "ACME S.A.".into(),
            contractor_id_type: String::new(),
            contractor_id: String::new(),
            legal_rep_name: String::new(),
            legal_rep_id: String::new(),
            investment_code: String::new(),
            source: "SECOP I (detalleProceso)".into(),
            validation_status: ValidationStatus::Complete,
            observations: String::new(),
        }
    }

    #[test]
    fn appends_resume_at_first_unused_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultados.csv");

        let mut wb = Workbook::open_or_create(&path).unwrap();
        assert_eq!(wb.find_next_row(), 0);
        wb.append_record(&sample_record("25-1-241304"), "25-1-241304", "https://x?c=");
        wb.save().unwrap();

        // Reopen: the next run lands on row 1, not 0.
        let mut wb = Workbook::open_or_create(&path).unwrap();
        assert_eq!(wb.find_next_row(), 1);
        wb.append_record(&sample_record("25-15-14542595"), "25-15-14542595", "https://x?c=");
        wb.save().unwrap();

        let (headers, rows) = read_sheet(&path).unwrap();
        assert_eq!(rows.len(), 2);
        let c_idx = headers
            .iter()
            .position(|h| norm_key(h) == norm_key(record::COL_CONSTANCIA))
            .unwrap();
        assert_eq!(rows[0][c_idx], "25-1-241304");
        assert_eq!(rows[1][c_idx], "25-15-14542595");
    }

    #[test]
    fn detail_column_holds_portal_link() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultados.csv");
        let mut wb = Workbook::open_or_create(&path).unwrap();
        wb.append_record(&sample_record("25-1-241304"), "25-1-241304", "https://portal?c=");
        wb.save().unwrap();

        let (headers, rows) = read_sheet(&path).unwrap();
        let idx = headers.iter().position(|h| h == COL_OPEN_DETAIL).unwrap();
        assert_eq!(rows[0][idx], "https://portal?c=25-1-241304");
    }

    #[test]
    fn errors_sheet_written_alongside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultados.csv");
        let mut wb = Workbook::open_or_create(&path).unwrap();
        wb.append_errors(&[("invalid".into(), "bad format".into())]);
        wb.save().unwrap();

        let err_path = dir.path().join("resultados_errores.csv");
        let (headers, rows) = read_sheet(&err_path).unwrap();
        assert_eq!(headers, vec!["numConstancia", "error"]);
        assert_eq!(rows[0], vec!["invalid", "bad format"]);
    }

    #[test]
    fn header_resolution_tolerates_renamed_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultados.csv");
        // Template with accents and a different column order.
        write_sheet(
            &path,
            &[
                "Número de constancia:".to_string(),
                "Numero de proceso (informativo)".to_string(),
                "Objeto del contrato".to_string(),
            ],
            &[],
        )
        .unwrap();

        let mut wb = Workbook::open_or_create(&path).unwrap();
        wb.append_record(&sample_record("25-1-241304"), "25-1-241304", "https://x?c=");
        wb.save().unwrap();

        let (_, rows) = read_sheet(&path).unwrap();
        assert_eq!(rows[0], vec!["25-1-241304", "LP-01", "Obra"]);
    }
}
