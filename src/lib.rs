//! AlphaZero-style training and champion promotion
//!
//! The pipeline itself lives in `zero-pipeline` and is re-exported here.
//! This crate adds the command-line surface a game integration wires into
//! its own binary:
//!
//! ```ignore
//! let args = TrainArgs::parse();
//! cli::init_logging();
//! cli::run(&args, &codec, &mut engine, &factory)?;
//! ```

pub mod cli;

pub use zero_pipeline::*;
