//! Head-to-head evaluation of a trained challenger against the current champion

use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::{
    select_move, EvalConfig, GameCodec, GameEnd, PolicyValueNet, Result, SearchBudget,
    SearchEngine,
};

/// Outcome of one evaluation game.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GameSummary {
    /// +1 if the first seat won, -1 if the second seat won, 0 for a draw.
    pub result: i8,

    /// Plies actually played.
    pub plies: usize,
}

/// Running tally from the challenger's point of view.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EvalTally {
    pub games: usize,
    pub challenger_wins: usize,
    pub decisive: usize,
}

impl EvalTally {
    /// Fold a game in, given the seat-0 result and whether the challenger sat first.
    pub fn record(&mut self, result: i8, challenger_first: bool) {
        self.games += 1;
        if result == 0 {
            return;
        }
        self.decisive += 1;
        if (result > 0) == challenger_first {
            self.challenger_wins += 1;
        }
    }

    pub fn draws(&self) -> usize {
        self.games - self.decisive
    }

    /// Challenger wins over decisive games, or 0.5 when every game was drawn.
    pub fn win_ratio(&self) -> f64 {
        if self.decisive == 0 {
            0.5
        } else {
            self.challenger_wins as f64 / self.decisive as f64
        }
    }
}

/// What to do with the challenger after the tournament.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PromotionDecision {
    /// Save the challenger as champion `new_best_idx`.
    Promote { new_best_idx: u32 },
    Keep,
}

/// Promote when the challenger's win ratio reaches `threshold`.
pub fn decide_promotion(win_ratio: f64, threshold: f64, best_idx: u32) -> PromotionDecision {
    if win_ratio >= threshold {
        PromotionDecision::Promote {
            new_best_idx: best_idx + 1,
        }
    } else {
        PromotionDecision::Keep
    }
}

/// Plays evaluation games between two networks through a search engine.
pub struct Evaluator {
    pub cfg: EvalConfig,

    /// Random number generator for non-greedy move sampling
    pub rng: StdRng,
}

impl Evaluator {
    pub fn new(cfg: EvalConfig, rng: StdRng) -> Self {
        Self { cfg, rng }
    }

    pub fn budget(&self) -> SearchBudget {
        SearchBudget {
            searches: self.cfg.mcts_searches,
            batch_size: self.cfg.mcts_batch_size,
        }
    }

    /// Play one game, `first` moving on even plies.
    ///
    /// Both trees are reset before the first move. A seat whose search yields
    /// no moves loses; reaching the ply limit is a draw.
    pub fn play_game<G, N, E>(
        &mut self,
        codec: &G,
        engine: &mut E,
        trees: &mut [E::Tree; 2],
        first: &N,
        second: &N,
    ) -> Result<GameSummary>
    where
        G: GameCodec,
        N: PolicyValueNet,
        E: SearchEngine<G, N>,
    {
        for tree in trees.iter_mut() {
            engine.reset(tree);
        }

        let budget = self.budget();
        let greedy_after = self.cfg.greedy_after_plies.unwrap_or(codec.max_plies());
        let nets = [first, second];
        let mut state = codec.initial_state();

        for ply in 0..codec.max_plies() {
            let seat = ply % 2;
            // +1 when seat 0 is to move
            let mover_sign: i8 = if seat == 0 { 1 } else { -1 };

            let out = engine.search(&mut trees[seat], codec, &state, ply, nets[seat], &budget)?;
            let Some(action) = select_move(&out.visits, ply >= greedy_after, &mut self.rng) else {
                debug!(ply, seat, "no moves available");
                return Ok(GameSummary {
                    result: -mover_sign,
                    plies: ply,
                });
            };

            let applied = codec.apply_move(&state, action, ply)?;
            match applied.end {
                Some(GameEnd::MoverWins) => {
                    return Ok(GameSummary {
                        result: mover_sign,
                        plies: ply + 1,
                    })
                }
                Some(GameEnd::Draw) => {
                    return Ok(GameSummary {
                        result: 0,
                        plies: ply + 1,
                    })
                }
                None => state = applied.state,
            }
        }

        Ok(GameSummary {
            result: 0,
            plies: codec.max_plies(),
        })
    }

    /// Play `cfg.rounds` games; the challenger moves first in the first half.
    pub fn run_tournament<G, N, E>(
        &mut self,
        codec: &G,
        engine: &mut E,
        challenger: &N,
        champion: &N,
    ) -> Result<EvalTally>
    where
        G: GameCodec,
        N: PolicyValueNet,
        E: SearchEngine<G, N>,
    {
        let mut trees = [E::Tree::default(), E::Tree::default()];
        let mut tally = EvalTally::default();
        let half = self.cfg.rounds / 2;

        for round in 0..self.cfg.rounds {
            let challenger_first = round < half;
            let game = if challenger_first {
                self.play_game(codec, engine, &mut trees, challenger, champion)?
            } else {
                self.play_game(codec, engine, &mut trees, champion, challenger)?
            };
            tally.record(game.result, challenger_first);

            info!(
                round,
                challenger_first,
                result = game.result,
                plies = game.plies,
                wins = tally.challenger_wins,
                decisive = tally.decisive,
                "evaluation game"
            );
        }

        Ok(tally)
    }
}
