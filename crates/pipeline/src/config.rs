//! Pipeline configuration
//!
//! Every field has a default, so a TOML file only needs the values it overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{PipelineError, Result};

/// Configuration for record ingestion and gradient descent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Replay buffer capacity
    pub replay_capacity: usize,

    /// Minibatch size for one gradient step
    pub batch_size: usize,

    /// Learning rate for SGD
    pub learning_rate: f32,

    /// SGD momentum
    pub momentum: f32,

    /// Self-play records ingested per step
    pub episodes_per_step: usize,

    /// Gradient steps run after each ingested batch once the buffer is warm
    pub train_rounds: usize,

    /// Minimum replay occupancy before any gradient step is taken
    pub min_replay_to_train: usize,

    /// Emit a grouped telemetry summary every this many steps
    pub telemetry_group: usize,

    /// RNG seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            replay_capacity: 30_000,
            batch_size: 256,
            learning_rate: 0.01,
            momentum: 0.9,
            episodes_per_step: 25,
            train_rounds: 20,
            min_replay_to_train: 10_000,
            telemetry_group: 5,
            seed: None,
        }
    }
}

impl TrainerConfig {
    /// Reject settings under which warm-up or minibatch sampling could stall.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfiguration(msg));

        if self.batch_size == 0 || self.episodes_per_step == 0 {
            return invalid("batch_size and episodes_per_step must be positive".into());
        }
        if self.min_replay_to_train < self.batch_size {
            return invalid(format!(
                "min_replay_to_train ({}) must be at least batch_size ({})",
                self.min_replay_to_train, self.batch_size
            ));
        }
        if self.replay_capacity < self.min_replay_to_train {
            return invalid(format!(
                "replay_capacity ({}) must be at least min_replay_to_train ({})",
                self.replay_capacity, self.min_replay_to_train
            ));
        }
        Ok(())
    }
}

/// Configuration for the promotion tournament.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Games played; must be even so both colour assignments get equal halves
    pub rounds: usize,

    /// MCTS simulations per evaluation move
    pub mcts_searches: usize,

    /// Leaves per network call during evaluation search
    pub mcts_batch_size: usize,

    /// Plies played with proportional sampling before moves become greedy.
    /// `None` uses the codec's ply cap.
    pub greedy_after_plies: Option<usize>,

    /// Minimum challenger win ratio for promotion
    pub promote_threshold: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            rounds: 20,
            mcts_searches: 40,
            mcts_batch_size: 40,
            greedy_after_plies: None,
            promote_threshold: 0.55,
        }
    }
}

/// File locations used by a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Self-play records, one JSON object per line
    pub train_data: PathBuf,

    /// Directory receiving promoted champion checkpoints
    pub saves_dir: PathBuf,

    /// Directory receiving the working (challenger) checkpoint
    pub work_dir: PathBuf,

    /// Cumulative step ledger
    pub ledger: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            train_data: PathBuf::from("./train.dat"),
            saves_dir: PathBuf::from("saves"),
            work_dir: PathBuf::from("."),
            ledger: PathBuf::from("./count.txt"),
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub trainer: TrainerConfig,
    pub evaluation: EvalConfig,
    pub paths: PathsConfig,

    /// Architecture revision assumed for checkpoints that do not record one
    pub default_res_blocks: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            trainer: TrainerConfig::default(),
            evaluation: EvalConfig::default(),
            paths: PathsConfig::default(),
            default_res_blocks: 6,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.trainer.validate()?;

        let e = &self.evaluation;
        let invalid = |msg: String| Err(PipelineError::InvalidConfiguration(msg));

        if e.rounds == 0 || e.rounds % 2 != 0 {
            return invalid(format!("evaluation rounds must be even and positive, got {}", e.rounds));
        }
        if !(e.promote_threshold > 0.0 && e.promote_threshold <= 1.0) {
            return invalid(format!(
                "promote_threshold must be in (0, 1], got {}",
                e.promote_threshold
            ));
        }
        if self.default_res_blocks == 0 {
            return invalid("default_res_blocks must be positive".into());
        }
        Ok(())
    }
}
