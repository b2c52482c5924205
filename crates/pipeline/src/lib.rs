//! Training and promotion pipeline for AlphaZero-style self-play learning
//!
//! This crate provides:
//! - Collaborator traits for the game codec, network and search engine
//! - Replay buffer, record ingestion and the SGD trainer
//! - Checkpoint versioning (champion lineage, architecture revision, step ledger)
//! - The paired-colour evaluation tournament that gates promotion

pub mod alphazero;
mod codec;
mod config;
mod error;
mod net;
pub mod pipeline;
mod search;
#[cfg(test)]
pub(crate) mod testing;
mod types;
pub mod versioning;

pub use alphazero::*;
pub use codec::*;
pub use config::*;
pub use error::{PipelineError, Result};
pub use net::*;
pub use pipeline::{RunReport, TrainingRun};
pub use search::*;
pub use types::*;
pub use versioning::{Checkpoint, CheckpointMeta, RunOptions, RunPlan, StepLedger};
