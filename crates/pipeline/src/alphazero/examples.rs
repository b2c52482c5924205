//! Training example type

use crate::Ply;

/// One training example: (s, π, z) in AlphaZero notation.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingExample<S> {
    /// Compact encoded position, decoded only when batched.
    pub state: S,

    /// Ply at which `state` was reached; selects the input perspective.
    pub ply: Ply,

    /// Search policy π, dense over the action table.
    pub policy: Vec<f32>,

    /// Game outcome from the perspective of the side to move in `state`.
    pub value: f32,
}
