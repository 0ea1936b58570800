//! `pcu-distortion`: run a PCU distortion calibration sequence.
//!
//! Exit status: 0 on success, 1 when the run fails on the hardware side
//! (stage fault, move timeout, failed command, I/O) and 2 for configuration
//! errors, including a dither grid outside the safety envelope.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use pcu_distortion::camera::CommandImager;
use pcu_distortion::hardware::build_stage;
use pcu_distortion::hardware::keyword::KeywordClient;
use pcu_distortion::process::{CommandRunner, SystemRunner};
use pcu_distortion::tracing_setup::{self, TracingConfig};
use pcu_distortion::{DistortionSequence, PcuError, SequenceConfig, SequencePlan};

#[derive(Parser, Debug)]
#[command(name = "pcu-distortion", version, about = "PCU distortion calibration sequencer")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config/pcu.toml")]
    config: PathBuf,

    /// Print the grid and the planned steps, check the envelope and exit
    #[arg(long)]
    dry_run: bool,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PcuError>() {
        Some(e) if e.is_configuration() => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SequenceConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let tracing_config = match &cli.log_level {
        Some(level) => TracingConfig::new(tracing_setup::parse_log_level(level)?),
        None => TracingConfig::from_config(&config)?,
    };
    tracing_setup::init(tracing_config)?;

    if cli.dry_run {
        return dry_run(&config);
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let stage = build_stage(&config.backend, runner.clone());
    let keywords = KeywordClient::new(
        &config.backend.keyword.read_command,
        &config.backend.keyword.write_command,
        runner.clone(),
    );
    let imager = Arc::new(CommandImager::new(config.camera.clone(), runner, keywords));

    info!(
        application = %config.application.name,
        backend = stage.name(),
        frames = config.total_frames(),
        "Starting distortion sequence"
    );
    let sequence = DistortionSequence::new(config, stage, imager);
    let summary = sequence.run().await?;

    println!(
        "Took {} frames and {} darks, log written to {}",
        summary.frames,
        summary.darks,
        summary.log_path.display()
    );
    Ok(())
}

fn dry_run(config: &SequenceConfig) -> anyhow::Result<()> {
    let plan = SequencePlan::build(config);
    println!("X steps: {:?}", plan.grid.xs);
    println!("Y steps: {:?}", plan.grid.ys);
    for step in plan.setup.iter().chain(plan.steps.iter()) {
        println!("  {}", step);
    }
    println!(
        "{} frames, {} darks, {} moves",
        plan.frames,
        plan.darks,
        plan.moves()
    );
    plan.check_envelope()?;
    println!("All grid positions within {}mm of the centre", plan.safety_radius);
    Ok(())
}
