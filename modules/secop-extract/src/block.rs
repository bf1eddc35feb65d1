//! Anti-automation block detection.
//!
//! The portal fronts a WAF that serves an interstitial instead of the
//! detail page when it decides the client is a bot. Detection is a short
//! phrase list matched against the raw response body; the wording is
//! upstream's to change, so the list is data, not a contract.

/// Phrases whose presence in a response body marks it as a block page.
#[derive(Debug, Clone)]
pub struct BlockSignals {
    markers: Vec<String>,
}

impl Default for BlockSignals {
    fn default() -> Self {
        Self::new(
            [
                "access blocked",
                "acceso bloqueado",
                "possible ddos",
                "denegacion",
                "hic",
                "incident id",
            ]
            .into_iter()
            .map(String::from),
        )
    }
}

impl BlockSignals {
    pub fn new(markers: impl IntoIterator<Item = String>) -> Self {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive substring test over the raw body.
    pub fn is_blocked(&self, html: &str) -> bool {
        let body = html.to_lowercase();
        self.markers.iter().any(|m| body.contains(m))
    }
}
