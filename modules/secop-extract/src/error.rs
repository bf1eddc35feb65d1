use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(
        "Invalid constancia: '{input}'. Expected format: YY-XX-NNNN (e.g. 25-1-241304, 25-15-14542595)"
    )]
    InvalidConstancia { input: String },

    #[error("Access blocked by the remote site (possible DDoS/WAF protection); halting the batch")]
    Blocked,

    #[error("Fetch failed: {0}")]
    Fetch(String),
}
