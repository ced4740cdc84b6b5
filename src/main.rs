use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use duo_vodcast::{
    Coordinator, DuoConfig, ParticipantId, SegmentSource, core::backend::status_text,
};

/// Duo Vodcast - plays a diarized two-speaker conversation through two avatars
#[derive(Parser, Debug)]
#[command(name = "duo-vodcast")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set up both avatars, retrying until both are ready
    Start,

    /// Set up any avatar that is not ready, then play both
    Play,

    /// Delete the previous recording, start, wait, record, and play
    Run,

    /// Mux the recording with the source audio on the backend
    Sync,

    /// Upload an audio file for diarization
    Diarize {
        /// WAV or MP3 file
        file: PathBuf,
    },

    /// Print the diarization segments for a speaker label
    Segments {
        /// Speaker label, e.g. SPEAKER_00
        label: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        DuoConfig::from_file(&config_path)?
    } else {
        DuoConfig::from_env()?
    };

    match cli.command {
        Commands::Sync => {
            let coordinator = Coordinator::new(config)?;
            println!("Syncing video and audio...");
            println!("{}", coordinator.sync().await);
        }
        Commands::Diarize { file } => {
            let coordinator = Coordinator::new(config)?;
            let result = coordinator.backend().diarize_audio(&file).await;
            println!("{}", status_text(&result));
        }
        Commands::Segments { label } => {
            let label = match ParticipantId::from_label(&label) {
                Some(participant) => participant.speaker_label().to_string(),
                None => {
                    warn!("{label} is not one of the two vodcast speakers");
                    label
                }
            };
            let http = reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()?;
            let source = SegmentSource::parse(&config.diarization_source);
            let segments = source.segments_for_speaker(&http, &label).await?;
            if segments.is_empty() {
                println!("No segments found for {label}");
            }
            for segment in segments {
                println!(
                    "{:>4}  {:>9.2} to {:>9.2}",
                    segment.index, segment.start_time, segment.end_time
                );
            }
        }
        Commands::Start => {
            let coordinator = Coordinator::new(config)?;
            let report = coordinator.start_both().await;
            println!(
                "Setup finished after {} attempt(s): {}",
                report.attempts,
                if report.all_ready() {
                    "both avatars ready"
                } else {
                    "not all avatars ready"
                }
            );
            print_status(&coordinator);
            if report.all_ready() {
                println!("Press Ctrl-C to close the sessions");
                tokio::signal::ctrl_c().await?;
            }
            coordinator.shutdown().await;
        }
        Commands::Play => {
            let coordinator = Coordinator::new(config)?;
            if coordinator.play_both().await {
                run_until_finished_or_interrupted(&coordinator).await?;
            } else {
                print_status(&coordinator);
            }
            coordinator.shutdown().await;
        }
        Commands::Run => {
            let coordinator = Coordinator::new(config)?;
            let report = coordinator.combined_play().await;
            info!(?report, "Combined play");
            if report.playing {
                run_until_finished_or_interrupted(&coordinator).await?;
            } else {
                print_status(&coordinator);
            }
            // Cancel saves the recording before closing the sessions.
            coordinator.shutdown().await;
        }
    }

    Ok(())
}

async fn run_until_finished_or_interrupted(coordinator: &Coordinator) -> anyhow::Result<()> {
    tokio::select! {
        states = coordinator.wait_for_playback() => {
            for (participant, state) in states {
                println!("{}: {:?}", participant.display_name(), state);
            }
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            println!("Interrupted, stopping playback");
        }
    }
    Ok(())
}

fn print_status(coordinator: &Coordinator) {
    for status in coordinator.status() {
        println!(
            "{}: {} (control channel {}, event stream {})",
            status.participant.display_name(),
            if status.ready { "Ready" } else { "Not Ready" },
            if status.control_channel_open { "open" } else { "closed" },
            if status.event_stream_open { "open" } else { "closed" },
        );
    }
}
