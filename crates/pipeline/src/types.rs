//! Core scalar types shared by the training pipeline

/// Index into the action table (0..action_count).
pub type ActionId = usize;

/// Zero-based ply index within a game.
pub type Ply = usize;

/// Sparse visit share for one action: (action, probability).
pub type VisitShare = (ActionId, f32);

/// Device the networks are placed on.
///
/// Interpreted by the network factory; the pipeline itself only forwards it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Accelerator,
}
