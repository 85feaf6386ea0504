use crate::normalizer::{BracketMode, Normalizer};
use clap::{Args, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Options shared by every front end.
#[derive(Debug, Clone, Args)]
pub struct RuleOptions {
    /// Which bracket tokens collapse into `/`: wildcard, asterisk or spaced.
    #[arg(long, env = "SHEET_SCRUB_MODE", default_value_t = BracketMode::Wildcard)]
    pub mode: BracketMode,
}

impl RuleOptions {
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.mode)
    }
}

/// Normalize text cells of .xlsx workbooks.
#[derive(Debug, Clone, Parser)]
#[command(name = "sheet-scrub", version)]
pub struct CliConfig {
    #[command(flatten)]
    pub rule: RuleOptions,

    /// Directory the processed files are written to.
    #[arg(short, long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Write a zip archive even for a single file. Several files are
    /// always bundled into one archive.
    #[arg(long)]
    pub zip: bool,

    /// Workbooks to process.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Web server settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "website", version)]
pub struct ServerConfig {
    #[command(flatten)]
    pub rule: RuleOptions,

    /// Address to listen on.
    #[arg(long, env = "SHEET_SCRUB_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Largest accepted request body, in megabytes.
    #[arg(long, env = "SHEET_SCRUB_MAX_UPLOAD_MB", default_value_t = 64)]
    pub max_upload_mb: usize,
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            rule: RuleOptions {
                mode: BracketMode::default(),
            },
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_upload_mb: 64,
        }
    }
}

/// Initialise `env_logger` with `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
