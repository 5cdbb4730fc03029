//! sparkify-etl binary.
//!
//! Reads `etl.toml` (or the path given with `--config`), opens the input and
//! output locations, and runs one or both pipeline phases:
//!
//! ```text
//! sparkify-etl            # songs, then logs
//! sparkify-etl songs      # catalog tables only
//! sparkify-etl logs       # activity tables; needs committed songs/artists
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use sparkify_core::pipeline;
use sparkify_etl::EtlConfig;
use tracing::{Instrument as _, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Sparkify data-lake ETL")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "etl.toml")]
  config: PathBuf,

  #[command(subcommand)]
  phase: Option<Phase>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Phase {
  /// Build every table (default).
  #[default]
  Run,
  /// Build `songs` and `artists` from the song catalog.
  Songs,
  /// Build `users`, `time` and `songplays` from the activity logs.
  Logs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = EtlConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
  let gateway = cfg.gateway().context("failed to open storage locations")?;
  let layout = cfg.layout();

  let phase = cli.phase.unwrap_or_default();
  let run_id = Uuid::new_v4();

  async {
    let summary = match phase {
      Phase::Run => {
        let summary = pipeline::run(&gateway, &layout).await.context("pipeline failed")?;
        serde_json::to_string(&summary)?
      }
      Phase::Songs => {
        let summary = pipeline::process_song_data(&gateway, &layout.song_glob)
          .await
          .context("song data phase failed")?;
        serde_json::to_string(&summary)?
      }
      Phase::Logs => {
        let summary = pipeline::process_log_data(&gateway, &layout.log_glob)
          .await
          .context("log data phase failed")?;
        serde_json::to_string(&summary)?
      }
    };
    tracing::info!(%summary, "finished");
    Ok::<_, anyhow::Error>(())
  }
  .instrument(tracing::info_span!("etl", %run_id, ?phase))
  .await
}
