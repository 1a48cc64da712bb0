use anyhow::Result;
use chapter_audiobook::core::config::Config;
use chapter_audiobook::core::io::NativeStorage;
use chapter_audiobook::core::stage::{stage_help, RunOptions};
use chapter_audiobook::services::llm::LazyLlm;
use chapter_audiobook::services::tts::LazyTts;
use chapter_audiobook::services::workflow::WorkflowManager;
use chapter_audiobook::utils::audio::Ffmpeg;
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

/// Turns a novel chapter into a multi-voice audiobook.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = stage_help())]
struct Cli {
    /// Step to start from (1-8); earlier steps only load their previous results
    #[arg(short, long, default_value = "1")]
    start_from: String,

    /// Comma-separated steps to recompute even if a checkpoint exists
    #[arg(short, long = "force-rerun", default_value = "")]
    force_rerun: String,

    /// Comma-separated steps to skip
    #[arg(short = 'k', long, default_value = "")]
    skip: String,

    /// Path to the YAML configuration
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Overlay the generated sound effects on a copy of the audiobook
    #[arg(long)]
    mix_effects: bool,
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    config.ensure_directories()?;

    let mut options = RunOptions::parse(&cli.start_from, &cli.force_rerun, &cli.skip);
    options.mix_effects = cli.mix_effects;
    info!(
        "Starting from step {}, forcing {:?}, skipping {:?}",
        options.start_from.number(),
        options.force.iter().map(|s| s.number()).collect::<Vec<_>>(),
        options.skip.iter().map(|s| s.number()).collect::<Vec<_>>()
    );

    // Clients are built on first use; cached stages need no credentials.
    let llm = LazyLlm::new(config.llm.clone());
    let tts = LazyTts::new(config.audio.clone());
    let ffmpeg = Ffmpeg::new(&config.audio.ffmpeg_path);

    let manager = WorkflowManager::new(
        config,
        Box::new(llm),
        Box::new(tts),
        Box::new(ffmpeg),
        Arc::new(NativeStorage::new()),
    );
    manager.run(&options).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
