//! AlphaZero training pipeline
//!
//! This module provides:
//! - `ReplayBuffer` for storing training examples
//! - Self-play record decoding and expansion into `TrainingExample`s
//! - `Trainer` for the ingestion and gradient-descent loop
//! - `Evaluator` for the promotion tournament

pub mod evaluation;
pub mod examples;
pub mod records;
pub mod replay_buffer;
pub mod training;

pub use evaluation::{decide_promotion, EvalTally, Evaluator, GameSummary, PromotionDecision};
pub use examples::TrainingExample;
pub use records::{dense_policy, expand_record, PlyRecord, RecordStream, SelfPlayRecord};
pub use replay_buffer::ReplayBuffer;
pub use training::{
    build_training_batch, log_softmax, policy_loss, value_loss, LossBreakdown, TrainStats,
    Trainer, TrainingBatch,
};
