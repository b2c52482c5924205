//! Command-line arguments, logging setup and run glue

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use zero_pipeline::{
    Device, GameCodec, NetFactory, PipelineConfig, RunOptions, RunReport, SearchEngine,
    TrainableNet, TrainingRun,
};

/// Train a challenger on self-play records and promote it if it beats the champion
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "zero-trainer")]
#[command(about = "Train a challenger network and gate its promotion", long_about = None)]
pub struct TrainArgs {
    /// Place networks on the accelerator
    #[arg(long, default_value_t = false)]
    pub cuda: bool,

    /// Grow the architecture by one residual block
    #[arg(long, default_value_t = false)]
    pub inc: bool,

    /// Champion checkpoint
    #[arg(short = 'm', long)]
    pub model: PathBuf,

    /// Checkpoint to resume the challenger from (same lineage as --model)
    #[arg(long, visible_alias = "tm")]
    pub tmodel: Option<PathBuf>,

    /// TOML file overriding the default pipeline settings
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl TrainArgs {
    pub fn to_options(&self) -> RunOptions {
        RunOptions {
            device: if self.cuda {
                Device::Accelerator
            } else {
                Device::Cpu
            },
            increment: self.inc,
            base_model: self.model.clone(),
            challenger_model: self.tmodel.clone(),
        }
    }

    pub fn load_config(&self) -> anyhow::Result<PipelineConfig> {
        match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)
                .with_context(|| format!("loading config {}", path.display())),
            None => Ok(PipelineConfig::default()),
        }
    }
}

/// Install the fmt subscriber; `RUST_LOG` overrides the default `info` filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

/// Prepare and execute one training run over the configured data file.
pub fn run<G, E, N, F>(
    args: &TrainArgs,
    codec: &G,
    engine: &mut E,
    factory: &F,
) -> anyhow::Result<RunReport>
where
    G: GameCodec,
    N: TrainableNet,
    E: SearchEngine<G, N>,
    F: NetFactory<N>,
{
    let options = args.to_options();
    options.check().context("invalid arguments")?;
    let config = args.load_config()?;
    let data = config.paths.train_data.clone();

    let run = TrainingRun::prepare(config, &options, factory)
        .with_context(|| format!("preparing run from {}", options.base_model.display()))?;
    let report = run
        .execute_from_data_file(codec, engine)
        .with_context(|| format!("training on {}", data.display()))?;

    info!(
        steps = report.stats.steps,
        win_ratio = %format!("{:.2}", report.win_ratio),
        working = %report.working_checkpoint.display(),
        "run complete"
    );
    Ok(report)
}
