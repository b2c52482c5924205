//! Checkpoints, run planning and the cumulative step ledger
//!
//! Checkpoints are safetensors files: every parameter is stored as an f32
//! tensor named `model.<param>`, and the header metadata carries the champion
//! index (`best_idx`) and the architecture revision (`resBlockNum`).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use tracing::{debug, info};

use crate::{Device, ParamState, PathsConfig, PipelineError, Result, TrainableNet};

const PARAM_PREFIX: &str = "model.";
const BEST_IDX_KEY: &str = "best_idx";
const RES_BLOCKS_KEY: &str = "resBlockNum";

/// Marks a first-generation checkpoint of a larger architecture.
const INCREMENT_MARKER: &str = "_1.";

/// Header fields of a checkpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CheckpointMeta {
    /// Champion lineage index.
    pub best_idx: u32,

    /// Residual-block count. `None` means the caller's default applies.
    pub res_blocks: Option<usize>,
}

/// Network parameters plus lineage metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub params: ParamState,
    pub meta: CheckpointMeta,
}

fn checkpoint_err(path: &Path, reason: impl ToString) -> PipelineError {
    PipelineError::Checkpoint {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl Checkpoint {
    pub fn from_net<N: TrainableNet>(net: &N, best_idx: u32) -> Self {
        Self {
            params: net.state(),
            meta: CheckpointMeta {
                best_idx,
                res_blocks: Some(net.res_blocks()),
            },
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = self
            .params
            .iter()
            .map(|(name, p)| {
                let bytes = p.iter().flat_map(|x| x.to_le_bytes()).collect();
                (format!("{PARAM_PREFIX}{name}"), p.shape().to_vec(), bytes)
            })
            .collect();

        let views = buffers
            .iter()
            .map(|(name, shape, bytes)| {
                TensorView::new(Dtype::F32, shape.clone(), bytes)
                    .map(|view| (name.clone(), view))
                    .map_err(|e| checkpoint_err(path, format!("{e:?}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut metadata = HashMap::new();
        metadata.insert(BEST_IDX_KEY.to_string(), self.meta.best_idx.to_string());
        if let Some(res_blocks) = self.meta.res_blocks {
            metadata.insert(RES_BLOCKS_KEY.to_string(), res_blocks.to_string());
        }

        safetensors::serialize_to_file(views, &Some(metadata), path)
            .map_err(|e| checkpoint_err(path, format!("{e:?}")))?;

        debug!(path = %path.display(), params = self.params.len(), "checkpoint saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let meta = parse_meta(path, &bytes)?;
        let tensors =
            SafeTensors::deserialize(&bytes).map_err(|e| checkpoint_err(path, format!("{e:?}")))?;

        let mut params = ParamState::new();
        for (name, view) in tensors.tensors() {
            let Some(param) = name.strip_prefix(PARAM_PREFIX) else {
                continue;
            };
            if view.dtype() != Dtype::F32 {
                return Err(checkpoint_err(
                    path,
                    format!("tensor {name} has dtype {:?}, expected F32", view.dtype()),
                ));
            }
            let data: Vec<f32> = view
                .data()
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            let array = ArrayD::from_shape_vec(IxDyn(view.shape()), data)
                .map_err(|e| checkpoint_err(path, format!("tensor {name}: {e}")))?;
            params.insert(param.to_string(), array);
        }

        Ok(Self { params, meta })
    }

    /// Read only the header metadata.
    pub fn read_meta(path: &Path) -> Result<CheckpointMeta> {
        parse_meta(path, &fs::read(path)?)
    }
}

fn parse_meta(path: &Path, bytes: &[u8]) -> Result<CheckpointMeta> {
    let (_, header) =
        SafeTensors::read_metadata(bytes).map_err(|e| checkpoint_err(path, format!("{e:?}")))?;
    let fields = header.metadata().clone().unwrap_or_default();

    let best_idx = fields
        .get(BEST_IDX_KEY)
        .ok_or_else(|| checkpoint_err(path, "missing best_idx"))?
        .parse::<u32>()
        .map_err(|e| checkpoint_err(path, format!("best_idx: {e}")))?;
    let res_blocks = fields
        .get(RES_BLOCKS_KEY)
        .map(|s| s.parse::<usize>())
        .transpose()
        .map_err(|e| checkpoint_err(path, format!("{RES_BLOCKS_KEY}: {e}")))?;

    Ok(CheckpointMeta {
        best_idx,
        res_blocks,
    })
}

/// How a training run was requested.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub device: Device,

    /// Grow the architecture by one residual block.
    pub increment: bool,

    /// Champion checkpoint.
    pub base_model: PathBuf,

    /// Checkpoint to resume the challenger from.
    pub challenger_model: Option<PathBuf>,
}

impl RunOptions {
    /// Flag combinations that are invalid before any checkpoint is read.
    pub fn check(&self) -> Result<()> {
        if self.increment && self.challenger_model.is_some() {
            return Err(PipelineError::InvalidConfiguration(
                "architecture increment cannot be combined with an explicit challenger checkpoint"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Everything a run needs to know about lineage and output locations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunPlan {
    pub best_idx: u32,

    /// Architecture revision both networks are built with.
    pub res_blocks: usize,

    pub increment: bool,

    /// Challenger resumed from its own checkpoint.
    pub resumed: bool,

    /// Where the trained challenger is written.
    pub working_path: PathBuf,

    /// Whether this run's steps are added to the ledger.
    pub fold_into_ledger: bool,
}

impl RunPlan {
    /// Check options and checkpoint headers; touches no files.
    pub fn validate(
        options: &RunOptions,
        paths: &PathsConfig,
        default_res_blocks: usize,
        base: &CheckpointMeta,
        challenger: Option<&CheckpointMeta>,
    ) -> Result<Self> {
        options.check()?;

        let base_blocks = base.res_blocks.unwrap_or(default_res_blocks);
        let res_blocks = match challenger {
            Some(ch) => {
                if ch.best_idx != base.best_idx {
                    return Err(PipelineError::LineageMismatch {
                        base: base.best_idx,
                        challenger: ch.best_idx,
                    });
                }
                let ch_blocks = ch.res_blocks.unwrap_or(base_blocks);
                if ch_blocks < base_blocks {
                    return Err(PipelineError::ArchitectureMismatch {
                        base: base_blocks,
                        challenger: ch_blocks,
                    });
                }
                ch_blocks
            }
            None if options.increment => base_blocks + 1,
            None => base_blocks,
        };

        let working_path = match &options.challenger_model {
            Some(path) => path.clone(),
            None => working_checkpoint_path(&paths.work_dir, base.best_idx, options.increment),
        };
        let fold_into_ledger = !options.increment
            && !options
                .challenger_model
                .as_ref()
                .is_some_and(|p| p.to_string_lossy().contains(INCREMENT_MARKER));

        Ok(Self {
            best_idx: base.best_idx,
            res_blocks,
            increment: options.increment,
            resumed: challenger.is_some(),
            working_path,
            fold_into_ledger,
        })
    }

    pub fn promoted_path(&self, saves_dir: &Path) -> PathBuf {
        promoted_checkpoint_path(saves_dir, self.best_idx + 1)
    }
}

/// `best_<idx>.pth`, or `best_<idx>_1.pth` for an architecture increment.
pub fn working_checkpoint_path(work_dir: &Path, best_idx: u32, increment: bool) -> PathBuf {
    let suffix = if increment { "_1" } else { "" };
    work_dir.join(format!("best_{best_idx}{suffix}.pth"))
}

pub fn promoted_checkpoint_path(saves_dir: &Path, best_idx: u32) -> PathBuf {
    saves_dir.join(format!("best_{best_idx}.pth"))
}

/// Total training steps across a lineage, kept as one decimal line.
#[derive(Clone, Debug)]
pub struct StepLedger {
    path: PathBuf,
}

impl StepLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored count; a missing ledger reads as zero.
    pub fn read(&self) -> Result<u64> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let first = text.lines().next().unwrap_or("").trim();
        first.parse::<u64>().map_err(|e| PipelineError::Ledger {
            path: self.path.clone(),
            reason: format!("{first:?}: {e}"),
        })
    }

    /// Count this run builds on: the stored value when resumed, zero for a fresh run.
    pub fn prior(&self, resumed: bool) -> Result<u64> {
        if resumed {
            self.read()
        } else {
            Ok(0)
        }
    }

    /// Store `prior + run_steps` and return it.
    pub fn commit(&self, prior: u64, run_steps: u64) -> Result<u64> {
        let total = prior + run_steps;
        fs::write(&self.path, format!("{total}\n"))?;
        info!(path = %self.path.display(), run_steps, total, "step ledger updated");
        Ok(total)
    }
}
