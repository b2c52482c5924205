//! AlphaZero training loop
//!
//! This module provides:
//! - Batch assembly from sampled replay examples
//! - The policy (cross-entropy) and value (MSE) losses every network minimises
//! - `Trainer`: record ingestion, warm-up gating and SGD rounds

use std::time::Instant;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use tracing::{debug, info};

use super::{expand_record, ReplayBuffer, SelfPlayRecord, TrainingExample};
use crate::{
    GameCodec, PipelineError, Ply, Result, SgdSettings, TrainableNet, TrainerConfig,
};

/// One decoded minibatch.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingBatch {
    /// Network input [B, input_size]
    pub input: Array2<f32>,

    /// Target policies [B, action_count]
    pub policy: Array2<f32>,

    /// Target values [B]
    pub value: Array1<f32>,
}

impl TrainingBatch {
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Build a training batch from a slice of training examples.
pub fn build_training_batch<G: GameCodec + ?Sized>(
    codec: &G,
    examples: &[&TrainingExample<G::State>],
) -> Result<TrainingBatch> {
    if examples.is_empty() {
        return Err(PipelineError::ShapeMismatch(
            "cannot build a batch from zero examples".into(),
        ));
    }

    let states: Vec<&G::State> = examples.iter().map(|ex| &ex.state).collect();
    let plies: Vec<Ply> = examples.iter().map(|ex| ex.ply).collect();
    let input = codec.encode_batch(&states, &plies)?;
    if input.nrows() != examples.len() {
        return Err(PipelineError::ShapeMismatch(format!(
            "codec encoded {} rows for {} states",
            input.nrows(),
            examples.len()
        )));
    }

    let action_count = codec.action_count();
    let mut policy = Array2::<f32>::zeros((examples.len(), action_count));
    for (mut row, ex) in policy.rows_mut().into_iter().zip(examples) {
        if ex.policy.len() != action_count {
            return Err(PipelineError::ShapeMismatch(format!(
                "policy of length {} for action table of size {action_count}",
                ex.policy.len()
            )));
        }
        row.assign(&ArrayView1::from(ex.policy.as_slice()));
    }

    let value = examples.iter().map(|ex| ex.value).collect::<Array1<f32>>();

    Ok(TrainingBatch {
        input,
        policy,
        value,
    })
}

/// Row-wise log-softmax, stabilised by subtracting each row's maximum.
pub fn log_softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        let ln_sum = row.mapv(|x| (x - max).exp()).sum().ln();
        row.mapv_inplace(|x| (x - max) - ln_sum);
    }
    out
}

/// Cross-entropy against the target distribution: summed over actions, averaged over the batch.
pub fn policy_loss(logits: &Array2<f32>, target: &Array2<f32>) -> f32 {
    let per_sample = (&log_softmax(logits) * target).sum_axis(Axis(1));
    -per_sample.mean().unwrap_or(0.0)
}

/// Mean squared error between predicted and target values.
pub fn value_loss(pred: &Array1<f32>, target: &Array1<f32>) -> f32 {
    (pred - target).mapv(|d| d * d).mean().unwrap_or(0.0)
}

/// Loss components for one minibatch.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LossBreakdown {
    pub policy: f32,
    pub value: f32,

    /// Unweighted sum of both terms.
    pub total: f32,
}

impl LossBreakdown {
    /// Losses of network outputs against `batch`'s targets.
    pub fn compute(logits: &Array2<f32>, values: &Array1<f32>, batch: &TrainingBatch) -> Result<Self> {
        if logits.dim() != batch.policy.dim() || values.len() != batch.value.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "logits {:?} vs policy target {:?}, values {} vs value target {}",
                logits.dim(),
                batch.policy.dim(),
                values.len(),
                batch.value.len()
            )));
        }
        let policy = policy_loss(logits, &batch.policy);
        let value = value_loss(values, &batch.value);
        Ok(Self {
            policy,
            value,
            total: policy + value,
        })
    }
}

/// Summary of one `Trainer::run`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainStats {
    /// Record batches processed, warm or not.
    pub steps: usize,

    /// Records ingested.
    pub records: usize,

    /// Gradient steps taken.
    pub train_rounds: usize,

    /// Loss of the most recent gradient step.
    pub last_loss: Option<LossBreakdown>,

    /// Mean total loss over all gradient steps.
    pub mean_loss: Option<f32>,
}

/// Trainer state for the ingestion and gradient-descent loop.
pub struct Trainer<N, S>
where
    N: TrainableNet,
{
    /// The challenger network being trained
    pub net: N,

    /// Replay buffer for storing training examples
    pub replay: ReplayBuffer<TrainingExample<S>>,

    /// Training configuration
    pub cfg: TrainerConfig,

    /// Random number generator for minibatch sampling
    pub rng: StdRng,

    /// Optimizer settings handed to the network each step
    pub sgd: SgdSettings,
}

impl<N, S> Trainer<N, S>
where
    N: TrainableNet,
{
    /// Create a new trainer, rejecting settings that would stall mid-run.
    pub fn new(net: N, cfg: TrainerConfig, rng: StdRng) -> Result<Self> {
        cfg.validate()?;
        let replay = ReplayBuffer::new(cfg.replay_capacity);
        let sgd = SgdSettings {
            learning_rate: cfg.learning_rate,
            momentum: cfg.momentum,
        };
        Ok(Self {
            net,
            replay,
            cfg,
            rng,
            sgd,
        })
    }

    /// Hand back the trained network.
    pub fn into_net(self) -> N {
        self.net
    }

    /// Ingest `records` until they run out, training whenever the buffer is warm.
    ///
    /// Records are consumed `episodes_per_step` at a time. A short final batch is
    /// still processed; an empty batch ends the loop.
    pub fn run<G, I>(&mut self, codec: &G, records: I) -> Result<TrainStats>
    where
        G: GameCodec<State = S>,
        I: IntoIterator<Item = Result<SelfPlayRecord>>,
    {
        self.net.set_training(true);

        let mut records = records.into_iter().fuse();
        let mut stats = TrainStats::default();
        let mut loss_sum = 0.0f32;
        let mut group_loss = 0.0f32;
        let mut group_rounds = 0usize;
        let mut last_tick = Instant::now();

        loop {
            let mut ingested = 0usize;
            for record in records.by_ref().take(self.cfg.episodes_per_step) {
                let record = record?;
                self.replay.extend(expand_record(codec, &record)?);
                ingested += 1;
            }
            if ingested == 0 {
                break;
            }

            let step = stats.steps;
            stats.steps += 1;
            stats.records += ingested;

            if self.replay.len() < self.cfg.min_replay_to_train {
                debug!(
                    step,
                    replay = self.replay.len(),
                    needed = self.cfg.min_replay_to_train,
                    "replay buffer warming up"
                );
                continue;
            }

            let now = Instant::now();
            let elapsed = now.duration_since(last_tick).as_secs_f32();
            last_tick = now;

            let mut step_loss = 0.0f32;
            for _ in 0..self.cfg.train_rounds {
                let loss = self.training_step(codec)?;
                step_loss += loss.total;
                stats.train_rounds += 1;
                stats.last_loss = Some(loss);
            }
            loss_sum += step_loss;
            group_loss += step_loss;
            group_rounds += self.cfg.train_rounds;

            let mean_step_loss = step_loss / self.cfg.train_rounds.max(1) as f32;
            info!(
                step,
                elapsed = %format!("{elapsed:.2}s"),
                replay = self.replay.len(),
                loss = %format!("{mean_step_loss:.4}"),
                "training step"
            );

            if self.cfg.telemetry_group > 0 && stats.steps % self.cfg.telemetry_group == 0 {
                let mean = group_loss / group_rounds.max(1) as f32;
                info!(
                    steps = stats.steps,
                    records = stats.records,
                    loss = %format!("{mean:.4}"),
                    "training progress"
                );
                group_loss = 0.0;
                group_rounds = 0;
            }
        }

        if stats.train_rounds > 0 {
            stats.mean_loss = Some(loss_sum / stats.train_rounds as f32);
        }
        info!(
            steps = stats.steps,
            records = stats.records,
            train_rounds = stats.train_rounds,
            "record stream exhausted"
        );

        Ok(stats)
    }

    /// Run a single gradient step on a freshly sampled minibatch.
    pub fn training_step<G>(&mut self, codec: &G) -> Result<LossBreakdown>
    where
        G: GameCodec<State = S>,
    {
        let examples = self.replay.sample(&mut self.rng, self.cfg.batch_size)?;
        let batch = build_training_batch(codec, &examples)?;
        let loss = self.net.train_step(&batch, &self.sgd)?;

        debug!(
            policy = loss.policy,
            value = loss.value,
            total = loss.total,
            "gradient step"
        );
        Ok(loss)
    }
}
