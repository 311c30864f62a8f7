use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use webm_relay::{Config, config};
use webm_relay::channels::{Channel, TelegramChannel};
use webm_relay::db::{self, ConversionRepo};
use webm_relay::pipeline::{
    ContentDigest, Delivery, FfmpegTranscoder, HttpSource, Intake, Processor, ScratchSpace,
    digest_file, handoff, run_intake,
};

/// WebM relay - replies to WebM links with a playable video
#[derive(Parser)]
#[command(name = "webm-relay", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay (default)
    Run,
    /// Print the cached delivery reference for a content digest
    Lookup {
        /// Hex SHA-256 digest
        digest: String,
    },
    /// Print the content digest of a local file
    Digest {
        /// File to hash
        file: PathBuf,
    },
    /// Show conversion cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, config::resolve_debug()))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `-v` and the debug flag pick the level
fn log_filter(verbose: u8, debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(verbose, debug)))
}

const fn filter_directives(verbose: u8, debug: bool) -> &'static str {
    match (verbose, debug) {
        (0, false) => "info,webm_relay=info",
        (0 | 1, _) => "info,webm_relay=debug",
        (2, _) => "debug",
        _ => "trace",
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => serve().await,
        Command::Lookup { digest } => cmd_lookup(&digest),
        Command::Digest { file } => cmd_digest(&file).await,
        Command::Stats => cmd_stats(),
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    let pool = db::init(config.db_path()).context("failed to open conversion cache")?;

    let scratch = ScratchSpace::new(&config.scratch_dir).with_context(|| {
        format!("failed to create scratch dir {}", config.scratch_dir.display())
    })?;
    match scratch.sweep() {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "removed stale scratch files"),
        Err(e) => tracing::warn!(error = %e, "failed to sweep scratch dir"),
    }

    let transcoder = FfmpegTranscoder::new(&config.transcoder);
    if !transcoder.is_available() {
        tracing::warn!(
            program = transcoder.program(),
            "transcoder not found, conversions will fail until it is installed"
        );
    }

    let source = HttpSource::new(config.probe_timeout)?;

    let (channel, messages) =
        TelegramChannel::with_receiver(config.telegram_token.expose_secret().to_string());
    let mut channel = channel.with_debug(config.debug);
    channel.connect().await?;

    let poller = channel.start_polling(config.poll_interval)?;
    channel.detach_receiver();
    let channel: Arc<dyn Channel> = Arc::new(channel);

    let (requests_tx, requests_rx) = handoff();
    let intake = tokio::spawn(run_intake(
        messages,
        Intake::new(config.allowed_chat_id, requests_tx),
    ));

    let processor = Processor::new(
        Arc::new(source),
        Arc::new(transcoder),
        ConversionRepo::new(pool.clone()),
        Delivery::new(channel),
        scratch,
    );
    let mut processing = tokio::spawn(processor.run(requests_rx));

    tracing::info!(allowed_chat_id = config.allowed_chat_id, "webm relay ready");

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("shutdown requested");
            None
        }
        result = &mut processing => Some(result),
    };

    // Closing intake drops the hand-off sender; the processor then finishes
    // whatever it holds and returns.
    poller.abort();
    intake.abort();
    let _ = intake.await;

    let result = match finished {
        Some(result) => {
            tracing::warn!("processor exited before shutdown");
            result
        }
        None => {
            tracing::info!("waiting for in-flight request");
            processing.await
        }
    };

    drop(pool);
    processor_exit(result)?;

    tracing::info!("webm relay stopped");
    Ok(())
}

/// A panicked processor is fatal; a cancelled one is only logged
fn processor_exit(result: Result<(), tokio::task::JoinError>) -> anyhow::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_panic() => Err(anyhow::anyhow!("processor task panicked: {e}")),
        Err(e) => {
            tracing::warn!(error = %e, "processor task cancelled");
            Ok(())
        }
    }
}

fn cmd_lookup(digest: &str) -> anyhow::Result<()> {
    let digest: ContentDigest = digest.parse().map_err(anyhow::Error::msg)?;
    let repo = ConversionRepo::new(db::init(config::resolve_db_path())?);

    match repo.entry(&digest)? {
        Some(entry) => {
            println!("Reference:   {}", entry.media);
            if let Some(url) = entry.source_url {
                println!("Source:      {url}");
            }
            if let Some(size) = entry.size_bytes {
                println!("Source size: {size} bytes");
            }
            if let Some(at) = entry.created_at {
                println!("Stored:      {at} UTC");
            }
        }
        None => println!("no cached conversion for {digest}"),
    }
    Ok(())
}

async fn cmd_digest(file: &std::path::Path) -> anyhow::Result<()> {
    let digest = digest_file(file)
        .await
        .map_err(|f| anyhow::anyhow!("{}: {}", file.display(), f.detail()))?;
    println!("{digest}");
    Ok(())
}

fn cmd_stats() -> anyhow::Result<()> {
    let path = config::resolve_db_path();
    let repo = ConversionRepo::new(db::init(&path)?);
    let stats = repo.stats()?;

    println!("Database:    {}", path.display());
    println!("Entries:     {}", stats.entries);
    println!("Source size: {} bytes", stats.total_bytes);
    match stats.last_stored {
        Some(at) => println!("Last stored: {at} UTC"),
        None => println!("Last stored: never"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_crate_level() {
        assert_eq!(filter_directives(0, false), "info,webm_relay=info");
        assert_eq!(filter_directives(0, true), "info,webm_relay=debug");
        assert_eq!(filter_directives(1, false), "info,webm_relay=debug");
        assert_eq!(filter_directives(3, true), "trace");
    }

    #[tokio::test]
    async fn panicked_processor_is_fatal() {
        let panicked: Result<(), _> = tokio::spawn(async { panic!("processor crashed") }).await;
        assert!(processor_exit(panicked).is_err());

        let finished = tokio::spawn(async {}).await;
        assert!(processor_exit(finished).is_ok());

        let cancelled = tokio::spawn(std::future::pending::<()>());
        cancelled.abort();
        assert!(processor_exit(cancelled.await).is_ok());
    }

    #[test]
    fn cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["webm-relay", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["webm-relay", "lookup", "abc"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Lookup { ref digest }) if digest == "abc"));
    }
}
