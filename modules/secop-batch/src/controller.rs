//! Sequential batch controller.
//!
//! The portal actively penalizes concurrent or rapid-fire access, so the
//! controller is deliberately single-threaded and paced: one randomized
//! warmup before first contact, a jittered delay before every subsequent
//! fetch, exponential backoff on failures, and an immediate halt on a
//! block signal. Every failure lands in the error ledger keyed by its
//! constancia; the artifact keeps whatever rows were written before a
//! halt.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};

use render_client::RenderClient;
use secop_extract::{
    assemble_record, build_url, validate_constancia, BlockSignals, DetailPage, ScrapeError,
};

use crate::workbook::Workbook;

/// Ledger key for the sentinel entry recorded when a run halts on a block
/// signal.
pub const BLOCK_SENTINEL: &str = "_BLOCKED_";

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Pacing knobs for one run. The two production modes share the state
/// machine and differ only in these constants.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Delay before each fetch after the first; also the reset value after
    /// a success.
    pub base_delay: Duration,
    /// Ceiling for the doubling backoff.
    pub max_backoff: Duration,
    /// One-off randomized delay before first contact, drawn uniformly.
    pub warmup: (Duration, Duration),
    /// Multiplier range applied to each pacing sleep.
    pub jitter: (f64, f64),
}

/// Run-mode presets. `Normal` paces gently; `Cautious` assumes the portal
/// is already suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingMode {
    Normal,
    Cautious,
}

impl PacingMode {
    pub fn config(self) -> PacingConfig {
        let (base, max) = match self {
            PacingMode::Normal => (10, 120),
            PacingMode::Cautious => (30, 600),
        };
        PacingConfig {
            base_delay: Duration::from_secs(base),
            max_backoff: Duration::from_secs(max),
            warmup: (Duration::from_secs(15), Duration::from_secs(30)),
            jitter: (0.8, 1.2),
        }
    }
}

impl PacingConfig {
    /// Zero-delay pacing for tests.
    pub fn immediate() -> Self {
        PacingConfig {
            base_delay: Duration::ZERO,
            max_backoff: Duration::ZERO,
            warmup: (Duration::ZERO, Duration::ZERO),
            jitter: (1.0, 1.0),
        }
    }
}

/// Doubled backoff, capped at the ceiling.
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

fn jittered(delay: Duration, jitter: (f64, f64)) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let factor = if jitter.0 >= jitter.1 {
        jitter.0
    } else {
        rand::rng().random_range(jitter.0..=jitter.1)
    };
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

fn warmup_delay(range: (Duration, Duration)) -> Duration {
    if range.1.is_zero() {
        return Duration::ZERO;
    }
    let (lo, hi) = (range.0.as_secs_f64(), range.1.as_secs_f64());
    Duration::from_secs_f64(rand::rng().random_range(lo..=hi))
}

// ---------------------------------------------------------------------------
// Fetch collaborator seam
// ---------------------------------------------------------------------------

/// Fetches the rendered detail page for one validated constancia. The
/// controller treats any failure here as retryable at the batch level.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(&self, constancia: &str) -> Result<String>;
}

/// Production fetcher: renders the portal detail URL through the
/// Browserless-style service.
pub struct RenderFetcher {
    client: RenderClient,
    detail_base_url: String,
}

impl RenderFetcher {
    pub fn new(client: RenderClient, detail_base_url: String) -> Self {
        Self {
            client,
            detail_base_url,
        }
    }
}

#[async_trait]
impl DetailFetcher for RenderFetcher {
    async fn fetch_detail(&self, constancia: &str) -> Result<String> {
        let url = build_url(&self.detail_base_url, constancia);
        Ok(self.client.content(&url).await?)
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Everything a run needs besides the fetcher and the identifier list.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub pacing: PacingConfig,
    pub detail_base_url: String,
    pub block: BlockSignals,
}

/// What one run produced. The ledger accounts for every identifier that
/// did not yield a row; `blocked` marks the run as halted by the portal.
#[derive(Debug)]
pub struct BatchOutcome {
    pub artifact: PathBuf,
    pub ok_count: usize,
    pub errors: Vec<(String, String)>,
    pub blocked: bool,
}

/// Run one batch sequentially against `artifact`, appending at the first
/// unused row. The artifact may be a fresh path or an accumulating
/// workspace file from a previous run; either way it is saved before this
/// returns, whatever happened mid-run.
pub async fn run_batch(
    fetcher: &dyn DetailFetcher,
    constancias: &[String],
    artifact: &Path,
    opts: &RunOptions,
) -> Result<BatchOutcome> {
    let mut workbook = Workbook::open_or_create(artifact)?;
    let mut errors: Vec<(String, String)> = Vec::new();
    let mut backoff = opts.pacing.base_delay;
    let mut ok_count = 0usize;
    let mut blocked = false;

    let total = constancias.len();
    info!(total, artifact = %artifact.display(), "Starting batch run");

    // A burst signature on first contact is the quickest way to get
    // flagged; small batches skip the warmup.
    if total > 2 {
        let delay = warmup_delay(opts.pacing.warmup);
        if !delay.is_zero() {
            info!(secs = delay.as_secs(), "Warmup delay before first fetch");
            tokio::time::sleep(delay).await;
        }
    }

    for (idx, raw) in constancias.iter().enumerate() {
        match process_one(fetcher, raw, idx, total, backoff, opts).await {
            Ok(record) => {
                let constancia = record.constancia.clone();
                workbook.append_record(&record, &constancia, &opts.detail_base_url);
                ok_count += 1;
                backoff = opts.pacing.base_delay;
                info!(
                    constancia,
                    verdict = record.validation_status.as_str(),
                    "Row appended"
                );
            }
            Err(err @ ScrapeError::Blocked) => {
                warn!(constancia = raw.as_str(), "Block signal detected; halting batch");
                errors.push((raw.clone(), err.to_string()));
                blocked = true;
                break;
            }
            Err(err) => {
                warn!(constancia = raw.as_str(), error = %err, "Constancia failed");
                errors.push((raw.clone(), err.to_string()));
                backoff = next_backoff(backoff, opts.pacing.max_backoff);
            }
        }
    }

    if !errors.is_empty() {
        workbook.append_errors(&errors);
    }
    workbook.save()?;

    if blocked {
        errors.push((
            BLOCK_SENTINEL.to_string(),
            "Batch halted by an anti-DDoS block; wait before starting a new run.".to_string(),
        ));
    }

    info!(ok_count, failed = errors.len(), blocked, "Batch run finished");
    Ok(BatchOutcome {
        artifact: artifact.to_path_buf(),
        ok_count,
        errors,
        blocked,
    })
}

/// Validate, pace, fetch, check for a block page, extract and assemble one
/// constancia. Validation failures never consume pacing budget: the sleep
/// comes after them.
async fn process_one(
    fetcher: &dyn DetailFetcher,
    raw: &str,
    idx: usize,
    total: usize,
    backoff: Duration,
    opts: &RunOptions,
) -> Result<secop_extract::ProcessRecord, ScrapeError> {
    let constancia = validate_constancia(raw)?;

    if total > 2 && idx > 0 {
        let delay = jittered(backoff, opts.pacing.jitter);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    let html = fetcher
        .fetch_detail(&constancia)
        .await
        .map_err(|e| ScrapeError::Fetch(e.to_string()))?;

    if opts.block.is_blocked(&html) {
        return Err(ScrapeError::Blocked);
    }

    let page = DetailPage::parse(&html);
    Ok(assemble_record(&page, &constancia))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let max = Duration::from_secs(120);
        let mut backoff = Duration::from_secs(10);
        let mut seen = Vec::new();
        for _ in 0..6 {
            backoff = next_backoff(backoff, max);
            seen.push(backoff.as_secs());
        }
        assert_eq!(seen, vec![20, 40, 80, 120, 120, 120]);
    }

    #[test]
    fn backoff_strictly_increases_until_ceiling() {
        let max = Duration::from_secs(600);
        let mut backoff = Duration::from_secs(30);
        loop {
            let next = next_backoff(backoff, max);
            assert!(next >= backoff);
            assert!(next <= max);
            if next == backoff {
                assert_eq!(next, max);
                break;
            }
            backoff = next;
        }
    }

    #[test]
    fn jitter_stays_within_range() {
        let base = Duration::from_secs(10);
        for _ in 0..100 {
            let d = jittered(base, (0.8, 1.2)).as_secs_f64();
            assert!((8.0..=12.0).contains(&d), "out of range: {d}");
        }
        assert_eq!(jittered(Duration::ZERO, (0.8, 1.2)), Duration::ZERO);
    }

    #[test]
    fn mode_presets_match_expected_constants() {
        let normal = PacingMode::Normal.config();
        assert_eq!(normal.base_delay, Duration::from_secs(10));
        assert_eq!(normal.max_backoff, Duration::from_secs(120));
        let cautious = PacingMode::Cautious.config();
        assert_eq!(cautious.base_delay, Duration::from_secs(30));
        assert_eq!(cautious.max_backoff, Duration::from_secs(600));
    }
}
