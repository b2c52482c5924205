//! Policy/value network interface
//!
//! The network architecture and its training framework are external. The
//! trainer hands `TrainableNet` a prepared minibatch and the SGD settings; the
//! network runs the loss, autodiff and momentum update in its own framework.
//! Named parameter access serves checkpoints.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayD};
use tracing::warn;

use crate::{Device, LossBreakdown, PipelineError, Result, TrainingBatch};

/// Named parameter tensors (the network's state dict).
pub type ParamState = BTreeMap<String, ArrayD<f32>>;

/// Stochastic gradient descent with momentum, PyTorch semantics:
/// `v = momentum * v + g; p -= learning_rate * v`, velocity starting at the first gradient.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SgdSettings {
    pub learning_rate: f32,
    pub momentum: f32,
}

/// How strictly a parameter state must match the network it is loaded into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Every parameter must be present on both sides.
    Strict,
    /// Missing and unexpected names are tolerated; shapes of shared names must match.
    Lenient,
}

/// Outcome of loading a parameter state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,

    /// Network parameters absent from the loaded state (left at their current values).
    pub missing: Vec<String>,

    /// Loaded names the network does not have.
    pub unexpected: Vec<String>,
}

/// Inference-only view of a network: input batch -> (move logits, values).
///
/// Shapes:
/// - input: [B, input_size]
/// - logits: [B, action_count]
/// - values: [B]
pub trait PolicyValueNet {
    fn forward(&self, input: &Array2<f32>) -> Result<(Array2<f32>, Array1<f32>)>;
}

/// A network the trainer can update.
pub trait TrainableNet: PolicyValueNet + Clone {
    /// Architecture revision (residual-block count) this instance was built with.
    fn res_blocks(&self) -> usize;

    /// Switch between training mode and inference mode.
    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;

    /// One optimizer step minimising `policy_loss + value_loss` on `batch`.
    ///
    /// The optimizer state (momentum buffers) lives with the network and
    /// persists across calls. Returns the loss measured before the update.
    fn train_step(&mut self, batch: &TrainingBatch, sgd: &SgdSettings) -> Result<LossBreakdown>;

    fn param_names(&self) -> Vec<String>;

    fn param(&self, name: &str) -> Option<&ArrayD<f32>>;

    fn param_mut(&mut self, name: &str) -> Option<&mut ArrayD<f32>>;

    /// Snapshot of all parameters.
    fn state(&self) -> ParamState {
        self.param_names()
            .into_iter()
            .filter_map(|name| self.param(&name).cloned().map(|p| (name, p)))
            .collect()
    }

    /// Copy matching parameters from `state` into this network.
    fn load_state(&mut self, state: &ParamState, mode: LoadMode) -> Result<LoadReport> {
        let own = self.param_names();
        let mut report = LoadReport::default();

        for name in &own {
            let Some(src) = state.get(name) else {
                report.missing.push(name.clone());
                continue;
            };
            let dst = self
                .param_mut(name)
                .ok_or_else(|| PipelineError::Network(format!("parameter {name} vanished")))?;
            if dst.shape() != src.shape() {
                return Err(PipelineError::ShapeMismatch(format!(
                    "parameter {name}: network {:?}, state {:?}",
                    dst.shape(),
                    src.shape()
                )));
            }
            dst.assign(src);
            report.loaded += 1;
        }

        report.unexpected = state
            .keys()
            .filter(|name| !own.contains(name))
            .cloned()
            .collect();

        if mode == LoadMode::Strict && (!report.missing.is_empty() || !report.unexpected.is_empty())
        {
            return Err(PipelineError::Network(format!(
                "strict load failed: missing {:?}, unexpected {:?}",
                report.missing, report.unexpected
            )));
        }
        if !report.missing.is_empty() {
            warn!(missing = ?report.missing, "parameters kept at their initial values");
        }

        Ok(report)
    }
}

/// Builds networks of a given architecture revision.
pub trait NetFactory<N> {
    fn build(&self, res_blocks: usize, device: Device) -> Result<N>;
}

impl<N, F> NetFactory<N> for F
where
    F: Fn(usize, Device) -> Result<N>,
{
    fn build(&self, res_blocks: usize, device: Device) -> Result<N> {
        self(res_blocks, device)
    }
}
