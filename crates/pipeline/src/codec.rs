//! Game state codec interface
//!
//! The rules engine lives outside this crate. The pipeline only needs to replay
//! recorded moves, turn compact states into network input, and detect game end
//! while playing evaluation games.

use ndarray::Array2;

use crate::{ActionId, Ply, Result};

/// How a game ended after a move.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GameEnd {
    /// The player who just moved won.
    MoverWins,
    Draw,
}

/// Successor state produced by applying a move.
#[derive(Clone, Debug)]
pub struct Applied<S> {
    pub state: S,

    /// `Some` once the move ended the game.
    pub end: Option<GameEnd>,
}

/// Encodes, decodes and advances positions of the game being learned.
pub trait GameCodec {
    /// Compact position representation stored in the replay buffer.
    type State: Clone;

    /// The fixed starting position.
    fn initial_state(&self) -> Self::State;

    /// Size of the action table (length of every dense policy vector).
    fn action_count(&self) -> usize;

    /// Hard cap on plies per game; a game reaching it is a draw.
    fn max_plies(&self) -> usize;

    /// Apply `action` to `state`, played at ply `ply`.
    fn apply_move(&self, state: &Self::State, action: ActionId, ply: Ply)
        -> Result<Applied<Self::State>>;

    /// Decode compact states into the network's input batch `[B, input_size]`.
    ///
    /// `plies[i]` is the ply at which `states[i]` was reached; the input encoding
    /// depends on whose perspective that ply represents.
    fn encode_batch(&self, states: &[&Self::State], plies: &[Ply]) -> Result<Array2<f32>>;

    /// True for the ply slot whose encoding already matches the next mover's
    /// perspective. The value target is not negated after such a ply.
    fn is_second_mover_slot(&self, ply: Ply) -> bool {
        ply == 1
    }
}

/// Whether the running value target changes sign after the move at `ply`.
pub fn value_flips_after<G: GameCodec + ?Sized>(codec: &G, ply: Ply) -> bool {
    !codec.is_second_mover_slot(ply)
}
