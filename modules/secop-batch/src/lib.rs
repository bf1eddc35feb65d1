//! Batch orchestration for SECOP detail extraction.
//!
//! Drives many sequential detail fetches against a rate-limited,
//! bot-hostile portal: adaptive pacing with jitter, exponential backoff,
//! block detection, a per-run error ledger, and resumable accumulation
//! into a CSV workbook.

pub mod config;
pub mod controller;
pub mod workbook;
pub mod workspace;

pub use config::Config;
pub use controller::{
    next_backoff, run_batch, BatchOutcome, DetailFetcher, PacingConfig, PacingMode, RenderFetcher,
    RunOptions, BLOCK_SENTINEL,
};
pub use workbook::Workbook;
pub use workspace::{Clock, SystemClock, WorkspaceStore, MAX_WORKSPACE_AGE};
