use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use render_client::RenderClient;
use secop_batch::{run_batch, Config, PacingMode, RenderFetcher, RunOptions};
use secop_extract::extract_constancias;

/// Extract SECOP I contract detail pages into a CSV artifact.
#[derive(Parser, Debug)]
#[command(name = "secop-batch", version, about)]
struct Args {
    /// Free-form text containing constancias (one per line, or pasted
    /// table content). Omit when using --file.
    input: Option<String>,

    /// Read the input text from a file instead.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Pacing mode: normal paces gently, cautious assumes the portal is
    /// already suspicious.
    #[arg(long, value_enum, default_value_t = Mode::Normal)]
    mode: Mode,

    /// Append to an existing artifact instead of starting a fresh one.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Normal,
    Cautious,
}

impl From<Mode> for PacingMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Normal => PacingMode::Normal,
            Mode::Cautious => PacingMode::Cautious,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let raw = match (&args.input, &args.file) {
        (Some(text), None) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        (Some(_), Some(_)) => bail!("pass either input text or --file, not both"),
        (None, None) => bail!("no input: pass constancia text or --file"),
    };

    let constancias = extract_constancias(&raw);
    if constancias.is_empty() {
        bail!("no constancias detected in input");
    }
    info!(detected = constancias.len(), "Constancias detected");

    let artifact = match args.output {
        Some(path) => path,
        None => {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            config.output_dir.join(format!("Resultados_Extraccion_{stamp}.csv"))
        }
    };

    let client = RenderClient::new(&config.render_url, config.render_token.as_deref());
    let fetcher = RenderFetcher::new(client, config.detail_base_url.clone());
    let opts = RunOptions {
        pacing: PacingMode::from(args.mode).config(),
        detail_base_url: config.detail_base_url.clone(),
        block: config.block_signals(),
    };

    let outcome = run_batch(&fetcher, &constancias, &artifact, &opts).await?;

    println!("Artifact: {}", outcome.artifact.display());
    println!("Rows written: {}", outcome.ok_count);
    if !outcome.errors.is_empty() {
        println!("Failures ({}):", outcome.errors.len());
        for (constancia, message) in &outcome.errors {
            println!("  {constancia}: {message}");
        }
    }
    if outcome.blocked {
        bail!("run halted by a block signal; wait before retrying");
    }
    Ok(())
}
