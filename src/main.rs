//! scribed - transcription job service with diarization and speaker naming
//!
//! Entry point for the scribed CLI.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scribed::cli::{Cli, Commands};
use scribed::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            scribed::cli::completions::print(shell);
        }
        command => {
            // Load configuration only for runtime commands.
            let settings = Settings::load()?;

            // Execute command
            match command {
                Commands::Submit {
                    audio,
                    file,
                    language,
                    model,
                    no_diarization,
                    speakers,
                } => {
                    scribed::cli::commands::submit_job(
                        &settings,
                        audio,
                        file,
                        language,
                        model,
                        no_diarization,
                        speakers,
                    )
                    .await?;
                }
                Commands::List { limit } => {
                    scribed::cli::commands::list_jobs(&settings, limit).await?;
                }
                Commands::View { id } => {
                    scribed::cli::commands::view_job(&settings, &id).await?;
                }
                Commands::Retry { id } => {
                    scribed::cli::commands::retry_job(&settings, &id).await?;
                }
                Commands::Cancel { id } => {
                    scribed::cli::commands::cancel_job(&settings, &id).await?;
                }
                Commands::Export { id, format, output } => {
                    scribed::cli::commands::export_job(&settings, &id, &format, output).await?;
                }
                Commands::Worker(worker_cmd) => {
                    scribed::cli::commands::worker_command(&settings, worker_cmd).await?;
                }
                Commands::Doctor { json } => {
                    scribed::cli::commands::run_doctor(&settings, json).await?;
                }
                Commands::Config(config_cmd) => {
                    scribed::cli::commands::config_command(&settings, config_cmd)?;
                }
                Commands::Completions { .. } => unreachable!(),
            }
        }
    }

    Ok(())
}
