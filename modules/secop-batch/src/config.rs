use std::env;
use std::path::PathBuf;

use secop_extract::{BlockSignals, DETAIL_BASE_URL};

/// Runtime configuration loaded from environment variables. Everything has
/// a sensible local default; nothing panics.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Browserless-style rendering service.
    pub render_url: String,
    /// Optional API token for the rendering service.
    pub render_token: Option<String>,
    /// Directory where artifacts are written.
    pub output_dir: PathBuf,
    /// Detail-page URL prefix the constancia is appended to.
    pub detail_base_url: String,
    /// Override for the block-marker phrase list, comma-separated.
    block_markers: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Self {
        let block_markers = env::var("SECOP_BLOCK_MARKERS").ok().map(|raw| {
            raw.split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect()
        });
        Self {
            render_url: env::var("RENDER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            render_token: env::var("RENDER_TOKEN").ok(),
            output_dir: env::var("SECOP_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("secop_exports")),
            detail_base_url: env::var("SECOP_DETAIL_BASE_URL")
                .unwrap_or_else(|_| DETAIL_BASE_URL.to_string()),
            block_markers,
        }
    }

    /// Block signals from the override list, or the built-in defaults.
    pub fn block_signals(&self) -> BlockSignals {
        match &self.block_markers {
            Some(markers) => BlockSignals::new(markers.iter().cloned()),
            None => BlockSignals::default(),
        }
    }
}
