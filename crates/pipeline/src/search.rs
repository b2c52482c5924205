//! Search engine interface and move selection

use rand::Rng;

use crate::{ActionId, GameCodec, Ply, PolicyValueNet, Result, VisitShare};

/// Simulation budget for one search call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SearchBudget {
    /// Number of MCTS simulations.
    pub searches: usize,

    /// Leaves evaluated per network call.
    pub batch_size: usize,
}

/// Root visit distribution produced by a search.
#[derive(Clone, Debug, Default)]
pub struct SearchOutput {
    /// Sparse (action, probability) pairs over the moves the search considered.
    /// Empty when the side to move has no legal move.
    pub visits: Vec<VisitShare>,
}

/// Monte-Carlo tree search driven by a policy/value network.
///
/// `Tree` is the per-seat cache that survives between moves of one game.
pub trait SearchEngine<G: GameCodec, N: PolicyValueNet> {
    type Tree: Default;

    fn search(
        &mut self,
        tree: &mut Self::Tree,
        codec: &G,
        state: &G::State,
        ply: Ply,
        net: &N,
        budget: &SearchBudget,
    ) -> Result<SearchOutput>;

    /// Drop everything cached in `tree`.
    fn reset(&mut self, tree: &mut Self::Tree) {
        *tree = Self::Tree::default();
    }
}

/// Pick a move from a visit distribution.
///
/// Greedy selection takes the most visited action (first on ties); otherwise the
/// action is sampled proportionally to its share. Returns `None` for an empty
/// distribution.
pub fn select_move(visits: &[VisitShare], greedy: bool, rng: &mut impl Rng) -> Option<ActionId> {
    let most_visited = visits
        .iter()
        .fold(None::<VisitShare>, |best, &(action, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((action, p)),
        })
        .map(|(action, _)| action);

    if greedy {
        return most_visited;
    }

    let total: f32 = visits.iter().map(|&(_, p)| p.max(0.0)).sum();
    if total <= 0.0 {
        return most_visited;
    }

    let threshold = rng.random::<f32>() * total;
    let mut cumulative = 0.0f32;
    for &(action, p) in visits {
        cumulative += p.max(0.0);
        if cumulative > threshold {
            return Some(action);
        }
    }
    visits.last().map(|&(action, _)| action)
}
