//! Small deterministic stand-ins for a game, a network and a search, used by unit tests.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayD, Axis, Ix1, Ix2, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alphazero::{log_softmax, LossBreakdown, TrainingBatch};
use crate::{
    ActionId, Applied, GameCodec, GameEnd, PipelineError, PlyRecord, PolicyValueNet, Result,
    SearchBudget, SearchEngine, SearchOutput, SelfPlayRecord, SgdSettings, TrainableNet,
};

/// Toy game: the state is the list of moves played so far.
///
/// Playing `winning_action` (when set) wins on the spot. Inputs are a one-hot
/// of the last move plus a side-to-move bit.
#[derive(Clone, Debug)]
pub struct FakeCodec {
    action_count: usize,
    max_plies: usize,
    winning_action: Option<ActionId>,
}

impl FakeCodec {
    pub fn new(action_count: usize, max_plies: usize) -> Self {
        Self {
            action_count,
            max_plies,
            winning_action: None,
        }
    }

    pub fn with_winning_action(mut self, action: ActionId) -> Self {
        self.winning_action = Some(action);
        self
    }

    pub fn input_size(&self) -> usize {
        self.action_count + 1
    }
}

impl GameCodec for FakeCodec {
    type State = Vec<ActionId>;

    fn initial_state(&self) -> Self::State {
        Vec::new()
    }

    fn action_count(&self) -> usize {
        self.action_count
    }

    fn max_plies(&self) -> usize {
        self.max_plies
    }

    fn apply_move(
        &self,
        state: &Self::State,
        action: ActionId,
        _ply: usize,
    ) -> Result<Applied<Self::State>> {
        if action >= self.action_count {
            return Err(PipelineError::Codec(format!("illegal move {action}")));
        }
        let mut next = state.clone();
        next.push(action);
        let end = (self.winning_action == Some(action)).then_some(GameEnd::MoverWins);
        Ok(Applied { state: next, end })
    }

    fn encode_batch(&self, states: &[&Self::State], plies: &[usize]) -> Result<Array2<f32>> {
        if states.len() != plies.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "{} states but {} plies",
                states.len(),
                plies.len()
            )));
        }
        let mut out = Array2::zeros((states.len(), self.input_size()));
        for (i, (state, &ply)) in states.iter().zip(plies).enumerate() {
            if let Some(&last) = state.last() {
                out[[i, last]] = 1.0;
            }
            out[[i, self.action_count]] = (ply % 2) as f32;
        }
        Ok(out)
    }
}

/// `count` identical records of `plies` moves each: move `ply % 2`, one-hot visits, first mover wins.
pub fn records_with_plies(count: usize, plies: usize) -> Vec<Result<SelfPlayRecord>> {
    (0..count)
        .map(|_| {
            Ok(SelfPlayRecord {
                result: 1,
                action: (0..plies)
                    .map(|ply| PlyRecord(ply % 2, vec![(ply % 2, 1.0)]))
                    .collect(),
            })
        })
        .collect()
}

/// Linear policy and value heads over the raw input.
///
/// `blocks.{i}.scale` parameters only mark the architecture revision; they do
/// not take part in the forward pass.
#[derive(Clone, Debug)]
pub struct LinearNet {
    res_blocks: usize,
    training: bool,
    params: BTreeMap<String, ArrayD<f32>>,
    pub last_sgd: Option<SgdSettings>,
    pub steps_taken: usize,
}

impl LinearNet {
    pub fn new(input_dim: usize, action_count: usize, res_blocks: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut init = |shape: &[usize]| -> ArrayD<f32> {
            let len = shape.iter().product();
            let data: Vec<f32> = (0..len).map(|_| rng.random_range(-0.1f32..0.1)).collect();
            ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
        };

        let mut params = BTreeMap::new();
        params.insert("policy.weight".to_string(), init(&[action_count, input_dim]));
        params.insert("policy.bias".to_string(), init(&[action_count]));
        params.insert("value.weight".to_string(), init(&[input_dim]));
        params.insert("value.bias".to_string(), init(&[1]));
        for i in 0..res_blocks {
            params.insert(format!("blocks.{i}.scale"), ArrayD::ones(IxDyn(&[1])));
        }

        Self {
            res_blocks,
            training: false,
            params,
            last_sgd: None,
            steps_taken: 0,
        }
    }

    /// Zero the policy weights and push the logit of `action` far above the rest.
    pub fn favouring(mut self, action: ActionId) -> Self {
        self.params.get_mut("policy.weight").unwrap().fill(0.0);
        let bias = self.params.get_mut("policy.bias").unwrap();
        bias.fill(0.0);
        bias.as_slice_mut().unwrap()[action] = 10.0;
        self
    }

    fn heads(&self) -> Result<(Array2<f32>, Array1<f32>, Array1<f32>, f32)> {
        let get = |name: &str| {
            self.params
                .get(name)
                .ok_or_else(|| PipelineError::Network(format!("missing {name}")))
        };
        let to_net = |e: ndarray::ShapeError| PipelineError::Network(e.to_string());
        let w = get("policy.weight")?.clone().into_dimensionality::<Ix2>().map_err(to_net)?;
        let b = get("policy.bias")?.clone().into_dimensionality::<Ix1>().map_err(to_net)?;
        let v = get("value.weight")?.clone().into_dimensionality::<Ix1>().map_err(to_net)?;
        let vb = get("value.bias")?.iter().copied().next().unwrap_or(0.0);
        Ok((w, b, v, vb))
    }
}

impl PolicyValueNet for LinearNet {
    fn forward(&self, input: &Array2<f32>) -> Result<(Array2<f32>, Array1<f32>)> {
        let (w, b, v, vb) = self.heads()?;
        if input.ncols() != w.ncols() {
            return Err(PipelineError::ShapeMismatch(format!(
                "input width {} for a net expecting {}",
                input.ncols(),
                w.ncols()
            )));
        }
        let logits = input.dot(&w.t()) + &b;
        let values = input.dot(&v) + vb;
        Ok((logits, values))
    }
}

impl TrainableNet for LinearNet {
    fn res_blocks(&self) -> usize {
        self.res_blocks
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    /// Plain SGD on the closed-form linear gradients; `momentum` is only recorded.
    fn train_step(&mut self, batch: &TrainingBatch, sgd: &SgdSettings) -> Result<LossBreakdown> {
        let (logits, values) = self.forward(&batch.input)?;
        let loss = LossBreakdown::compute(&logits, &values, batch)?;

        let n = batch.len().max(1) as f32;
        let mass = batch.policy.sum_axis(Axis(1)).insert_axis(Axis(1));
        let grad_logits = (log_softmax(&logits).mapv(f32::exp) * &mass - &batch.policy) / n;
        let grad_values = (&values - &batch.value) * (2.0 / n);

        let updates = [
            ("policy.weight", grad_logits.t().dot(&batch.input).into_dyn()),
            ("policy.bias", grad_logits.sum_axis(Axis(0)).into_dyn()),
            ("value.weight", batch.input.t().dot(&grad_values).into_dyn()),
            ("value.bias", ArrayD::from_elem(IxDyn(&[1]), grad_values.sum())),
        ];
        for (name, grad) in updates {
            let param = self
                .params
                .get_mut(name)
                .ok_or_else(|| PipelineError::Network(format!("missing {name}")))?;
            param.scaled_add(-sgd.learning_rate, &grad);
        }

        self.last_sgd = Some(*sgd);
        self.steps_taken += 1;
        Ok(loss)
    }

    fn param_names(&self) -> Vec<String> {
        self.params.keys().cloned().collect()
    }

    fn param(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.params.get(name)
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut ArrayD<f32>> {
        self.params.get_mut(name)
    }
}

/// "Search" that returns the network's softmax prior over every action.
///
/// The tree counts searches since its last reset. With `resign_at` set, the
/// engine reports no legal moves from that ply on.
#[derive(Clone, Debug, Default)]
pub struct PriorEngine {
    pub resign_at: Option<usize>,
    pub searches: usize,
    pub resets: usize,
}

impl<N: PolicyValueNet> SearchEngine<FakeCodec, N> for PriorEngine {
    type Tree = usize;

    fn search(
        &mut self,
        tree: &mut usize,
        codec: &FakeCodec,
        state: &Vec<ActionId>,
        ply: usize,
        net: &N,
        budget: &SearchBudget,
    ) -> Result<SearchOutput> {
        if budget.searches == 0 {
            return Err(PipelineError::Search("zero search budget".into()));
        }
        self.searches += 1;
        *tree += 1;
        if self.resign_at.is_some_and(|at| ply >= at) {
            return Ok(SearchOutput::default());
        }

        let input = codec.encode_batch(&[state], &[ply])?;
        let (logits, _) = net.forward(&input)?;
        let row = logits.row(0);
        let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        let exp = row.mapv(|x| (x - max).exp());
        let total = exp.sum();
        let visits = exp.iter().enumerate().map(|(a, &e)| (a, e / total)).collect();
        Ok(SearchOutput { visits })
    }

    fn reset(&mut self, tree: &mut usize) {
        self.resets += 1;
        *tree = 0;
    }
}
