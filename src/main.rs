//! tok-lens: engagement & retention dashboard for TikTok data exports
//!
//! Usage:
//!   tok-lens                      # same as `serve`
//!   tok-lens serve --bind 0.0.0.0:8501
//!   tok-lens inspect export.zip --format json
//!   tok-lens paths export.zip

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tok_lens::archive::ArchiveUpload;
use tok_lens::config::Config;
use tok_lens::inspect::{InspectOptions, inspect_archive, paths_table};
use tok_lens::metrics::Bucket;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tok-lens", version)]
#[command(about = "Engagement & Retention Dashboard for TikTok data exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web dashboard
    Serve {
        /// Listen address, overrides config and TOKLENS_HTTP_BIND
        #[arg(long)]
        bind: Option<String>,
    },
    /// Parse an export locally and print the aggregates
    Inspect {
        archive: PathBuf,
        /// Entry holding the watch history (guessed when omitted)
        #[arg(long)]
        watch: Option<String>,
        /// Entry holding the like list (guessed when omitted)
        #[arg(long)]
        likes: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
        /// Table written by `--format csv`
        #[arg(long, value_enum, default_value_t = Log::Watched)]
        log: Log,
        /// IANA time zone for day/hour bucketing
        #[arg(long)]
        tz: Option<String>,
        /// First local day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last local day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value = "day")]
        bucket: Bucket,
        /// Repeated clips to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// List archive entries and the default picks
    Paths { archive: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Table,
    Json,
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
enum Log {
    Watched,
    Liked,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.runtime.log_level)
        .unwrap_or_else(|_| EnvFilter::new("tok_lens=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_archive(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;
    init_tracing(&config);

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.http_bind = bind;
                config.finalize()?;
            }
            info!(
                "Starting tok-lens {} (config: {})",
                env!("CARGO_PKG_VERSION"),
                config
                    .runtime
                    .config_source
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "defaults".to_string())
            );
            tok_lens::http::start_http_server(config).await?;
        }
        Commands::Inspect {
            archive,
            watch,
            likes,
            format,
            log,
            tz,
            from,
            to,
            bucket,
            top,
        } => {
            if let Some(tz) = tz {
                config.display.timezone = tz;
                config.finalize()?;
            }
            let bytes = read_archive(&archive)?;
            let opts = InspectOptions {
                watch,
                likes,
                from,
                to,
                bucket,
                top,
            };
            let inspection = tokio::task::spawn_blocking(move || {
                inspect_archive(bytes, &config, &opts)
            })
            .await??;

            match format {
                Format::Table => println!("{}", inspection.to_table()),
                Format::Json => println!("{}", inspection.to_json()?),
                Format::Csv => {
                    let table = match log {
                        Log::Watched => &inspection.engagement.watched,
                        Log::Liked => &inspection.engagement.liked,
                    };
                    print!("{}", table.to_csv()?);
                }
            }
        }
        Commands::Paths { archive } => {
            let bytes = read_archive(&archive)?;
            let upload = ArchiveUpload::from_bytes(bytes, config.limits())?;
            println!(
                "{} ({} bytes, blake3 {})",
                archive.display(),
                upload.size(),
                upload.fingerprint()
            );
            println!("{}", paths_table(&upload));
        }
    }

    Ok(())
}
