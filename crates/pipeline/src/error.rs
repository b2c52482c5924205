use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("challenger checkpoint belongs to lineage {challenger}, base is {base}")]
    LineageMismatch { base: u32, challenger: u32 },

    #[error("challenger architecture revision {challenger} is older than base revision {base}")]
    ArchitectureMismatch { base: usize, challenger: usize },

    #[error("requested {requested} examples but the replay buffer holds {available}")]
    InsufficientData { requested: usize, available: usize },

    #[error("action index {index} outside action table of size {size}")]
    ActionOutOfRange { index: usize, size: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("game codec error: {0}")]
    Codec(String),

    #[error("checkpoint {path:?}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("step ledger {path:?}: {reason}")]
    Ledger { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed self-play record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
