//! End-to-end training run: load, train, checkpoint, evaluate, promote

use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::versioning::promoted_checkpoint_path;
use crate::{
    decide_promotion, Checkpoint, EvalTally, Evaluator, GameCodec, LoadMode, NetFactory,
    PipelineConfig, PromotionDecision, RecordStream, Result, RunOptions, RunPlan, SearchEngine,
    SelfPlayRecord, StepLedger, TrainStats, Trainer, TrainableNet,
};

/// Outcome of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub stats: TrainStats,
    pub tally: EvalTally,
    pub win_ratio: f64,
    pub decision: PromotionDecision,
    pub working_checkpoint: PathBuf,
    pub promoted_checkpoint: Option<PathBuf>,

    /// Ledger total after this run, if the run was folded in.
    pub ledger_total: Option<u64>,
}

fn seeded_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_os_rng(),
    }
}

/// A validated run with both networks instantiated.
pub struct TrainingRun<N: TrainableNet> {
    pub config: PipelineConfig,
    pub plan: RunPlan,

    /// Frozen reference network, inference mode
    pub champion: N,

    /// Network being trained
    pub challenger: N,

    /// Ledger count this run adds to, read up front; `None` when the run is not folded in.
    pub ledger_prior: Option<u64>,
}

impl<N: TrainableNet> TrainingRun<N> {
    /// Validate configuration, lineage and the step ledger, then build both networks.
    ///
    /// Nothing is written to disk here.
    pub fn prepare<F: NetFactory<N>>(
        config: PipelineConfig,
        options: &RunOptions,
        factory: &F,
    ) -> Result<Self> {
        config.validate()?;
        options.check()?;

        let base = Checkpoint::load(&options.base_model)?;
        let resume = options
            .challenger_model
            .as_deref()
            .map(Checkpoint::load)
            .transpose()?;
        let plan = RunPlan::validate(
            options,
            &config.paths,
            config.default_res_blocks,
            &base.meta,
            resume.as_ref().map(|c| &c.meta),
        )?;

        let ledger_prior = if plan.fold_into_ledger {
            Some(StepLedger::new(&config.paths.ledger).prior(plan.resumed)?)
        } else {
            None
        };

        let mut champion = factory.build(plan.res_blocks, options.device)?;
        champion.load_state(&base.params, LoadMode::Lenient)?;
        champion.set_training(false);

        let mut challenger = match resume {
            Some(ckpt) => {
                let mut net = factory.build(plan.res_blocks, options.device)?;
                net.load_state(&ckpt.params, LoadMode::Lenient)?;
                net
            }
            None => champion.clone(),
        };
        challenger.set_training(true);

        info!(
            best_idx = plan.best_idx,
            res_blocks = plan.res_blocks,
            resumed = plan.resumed,
            increment = plan.increment,
            "run prepared"
        );

        Ok(Self {
            config,
            plan,
            champion,
            challenger,
            ledger_prior,
        })
    }

    /// Train on `records`, write the working checkpoint, then run the promotion tournament.
    pub fn execute<G, E, I>(self, codec: &G, engine: &mut E, records: I) -> Result<RunReport>
    where
        G: GameCodec,
        E: SearchEngine<G, N>,
        I: IntoIterator<Item = Result<SelfPlayRecord>>,
    {
        let Self {
            config,
            plan,
            champion,
            challenger,
            ledger_prior,
        } = self;

        let seed = config.trainer.seed;
        let mut trainer = Trainer::new(challenger, config.trainer.clone(), seeded_rng(seed, 0))?;
        let stats = trainer.run(codec, records)?;
        let mut challenger = trainer.into_net();

        Checkpoint::from_net(&challenger, plan.best_idx).save(&plan.working_path)?;
        info!(path = %plan.working_path.display(), "working checkpoint saved");

        let ledger_total = ledger_prior
            .map(|prior| StepLedger::new(&config.paths.ledger).commit(prior, stats.steps as u64))
            .transpose()?;

        info!("evaluation started");
        challenger.set_training(false);
        let mut evaluator = Evaluator::new(config.evaluation.clone(), seeded_rng(seed, 1));
        let tally = evaluator.run_tournament(codec, engine, &challenger, &champion)?;
        let win_ratio = tally.win_ratio();
        info!(win_ratio = %format!("{win_ratio:.2}"), "evaluation finished");

        let decision =
            decide_promotion(win_ratio, config.evaluation.promote_threshold, plan.best_idx);
        let promoted_checkpoint = match decision {
            PromotionDecision::Promote { new_best_idx } => {
                fs::create_dir_all(&config.paths.saves_dir)?;
                let path = promoted_checkpoint_path(&config.paths.saves_dir, new_best_idx);
                Checkpoint::from_net(&challenger, new_best_idx).save(&path)?;
                info!(new_best_idx, path = %path.display(), "challenger promoted");
                Some(path)
            }
            PromotionDecision::Keep => {
                info!(best_idx = plan.best_idx, "champion kept");
                None
            }
        };

        Ok(RunReport {
            stats,
            tally,
            win_ratio,
            decision,
            working_checkpoint: plan.working_path,
            promoted_checkpoint,
            ledger_total,
        })
    }

    /// `execute` over the configured self-play data file.
    pub fn execute_from_data_file<G, E>(self, codec: &G, engine: &mut E) -> Result<RunReport>
    where
        G: GameCodec,
        E: SearchEngine<G, N>,
    {
        let records = RecordStream::open(&self.config.paths.train_data)?;
        self.execute(codec, engine, records)
    }
}
