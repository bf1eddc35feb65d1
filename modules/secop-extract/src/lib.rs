//! Tolerant extraction of SECOP I contract detail pages.
//!
//! One rendered detail page in, one canonical [`record::ProcessRecord`]
//! out, despite inconsistent headings, encodings and cell structures.
//! Extraction never fails on data quality: missing fields degrade to empty
//! strings and surface through the record's completeness verdict.

pub mod block;
pub mod constancia;
pub mod dom;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod record;
pub mod tokens;

pub use block::BlockSignals;
pub use constancia::{
    build_url, extract_constancias, normalize_constancia, validate_constancia, DETAIL_BASE_URL,
};
pub use dom::DetailPage;
pub use error::ScrapeError;
pub use record::{assemble_record, ProcessRecord, ValidationStatus};
