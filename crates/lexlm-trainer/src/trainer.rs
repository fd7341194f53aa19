//! Training loop for the lexical language models.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use candle_core::{Device, Var};
use lexlm_core::{
    BatchIterator, CompositeModel, CorpusSplits, Example, HiddenState, LexicalObjective,
    ModelVariant, ParamStore, PretrainedVectors, Relation, Vocabulary, build_model, load_corpus,
};
use tracing::{info, warn};

use crate::checkpoint::BestCheckpoint;
use crate::config::TrainConfig;
use crate::export::{export_embeddings, write_embeddings_binary};
use crate::metrics::{LossAccumulator, LossAverages};
use crate::optim::{LexOptimizer, clip_grad_norm};
use crate::scheduler::MultiStepLr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Valid,
    Test,
}

/// How the epoch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainOutcome {
    Completed,
    Interrupted,
    EarlyStopped,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: TrainOutcome,
    pub epochs_completed: usize,
    pub best_valid: Option<f64>,
    /// `None` for retrofit runs.
    pub test: Option<LossAverages>,
}

/// Fixed-point with enough places that decayed rates stay readable.
fn format_lr(lr: f64) -> String {
    format!("{lr:.10}")
}

pub struct Trainer {
    config: TrainConfig,
    device: Device,
    vocab: Vocabulary,
    corpus: CorpusSplits,
    params: ParamStore,
    vars: Vec<Var>,
    model: Box<dyn CompositeModel>,
    objective: LexicalObjective,
    optimizer: LexOptimizer,
    scheduler: MultiStepLr,
    checkpoint: BestCheckpoint,
    interrupt: Arc<AtomicBool>,
}

impl Trainer {
    /// Loads the corpus (and pretrained vectors for retrofitting) named by
    /// `config` and builds the model.
    pub fn new(config: TrainConfig, interrupt: Arc<AtomicBool>) -> Result<Self> {
        let corpus = load_corpus(&config.splits, config.reparse).with_context(|| {
            format!("Failed to load corpus from {}", config.splits.dir.display())
        })?;
        info!(
            train = corpus.train.len(),
            valid = corpus.valid.len(),
            test = corpus.test.len(),
            "Loaded annotated corpus"
        );

        let vectors = match &config.vectors {
            Some(path) => Some(PretrainedVectors::load(path).with_context(|| {
                format!("Failed to load pretrained vectors {}", path.display())
            })?),
            None => None,
        };

        Self::with_corpus(config, corpus, vectors, interrupt)
    }

    /// Builds a trainer over an already loaded corpus.
    pub fn with_corpus(
        mut config: TrainConfig,
        corpus: CorpusSplits,
        vectors: Option<PretrainedVectors>,
        interrupt: Arc<AtomicBool>,
    ) -> Result<Self> {
        let device = config.device()?;

        let vocab = Vocabulary::build(
            corpus
                .train
                .iter()
                .flat_map(|e| e.text.iter().chain(&e.target))
                .map(String::as_str),
        );
        vocab
            .save(&config.artifacts.vocab)
            .with_context(|| format!("Failed to save {}", config.artifacts.vocab.display()))?;
        info!(tokens = vocab.len(), path = %config.artifacts.vocab.display(), "Built vocabulary");

        config.model.ntokens = vocab.len();
        config.objective.pad_id = vocab.pad_id();

        let pretrained = match (&vectors, config.model.variant) {
            (Some(vectors), ModelVariant::Retrofit) => {
                Some(vectors.table_for(&vocab, config.model.emsize, &device)?)
            }
            _ => None,
        };

        let mut params = ParamStore::new(config.seed, device.clone());
        let model = build_model(&config.model, &mut params, pretrained.as_ref())?;
        let vars = params.all_vars();
        info!(
            variant = %config.model.variant,
            cell = %config.model.cell,
            tensors = vars.len(),
            "Built model"
        );

        let objective = LexicalObjective::new(config.objective);
        let optimizer = LexOptimizer::new(config.optimizer, vars.clone(), config.lr)?;
        let scheduler = MultiStepLr::new(config.lr, config.milestones.clone(), config.gamma);
        let checkpoint = BestCheckpoint::new(&config.artifacts.model);

        Ok(Self {
            config,
            device,
            vocab,
            corpus,
            params,
            vars,
            model,
            objective,
            optimizer,
            scheduler,
            checkpoint,
            interrupt,
        })
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn checkpoint(&self) -> &BestCheckpoint {
        &self.checkpoint
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    fn examples(&self, split: Split) -> &[Example] {
        match split {
            Split::Train => &self.corpus.train,
            Split::Valid => &self.corpus.valid,
            Split::Test => &self.corpus.test,
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// One pass over the training split. Returns `false` if the interrupt
    /// flag cut the epoch short.
    pub fn train_epoch(&mut self, epoch: usize) -> Result<bool> {
        let relations = self.config.objective.relations;
        let batches = BatchIterator::new(
            &self.corpus.train,
            &self.vocab,
            &self.device,
            self.config.batch_size,
        );
        let num_batches = batches.num_batches();

        let mut hidden: Option<HiddenState> = self.model.init_hidden(self.config.batch_size)?;
        let mut window = LossAccumulator::default();
        let mut window_start = Instant::now();

        for (idx, batch) in batches.enumerate() {
            if self.interrupt.load(Ordering::Relaxed) {
                return Ok(false);
            }
            let batch = batch?;

            let output = self.model.forward(&batch, hidden.as_ref(), relations, true)?;
            let (loss, breakdown) = self.objective.compose(&output, &batch)?;
            // Truncated BPTT: the next window starts from a detached state.
            hidden = output.hidden.as_ref().map(HiddenState::detach);

            // Each backward pass yields a fresh gradient store.
            let mut grads = loss.backward()?;
            clip_grad_norm(&self.vars, &mut grads, self.config.clip)?;
            self.optimizer.step(&grads)?;
            window.add(&breakdown);

            if idx % self.config.log_interval == 0 && idx > 0 {
                let avg = window.averages();
                let ms_per_batch =
                    window_start.elapsed().as_secs_f64() * 1000.0 / window.batches() as f64;
                info!(
                    "| epoch {:3} | {:5}/{:5} batches | lr {} | ms/batch {:5.2} | loss {:5.2} | ppl {:8.2} | syn {:5.4} | ant {:5.4} | hyp {:5.4} | mer {:5.4} | reg {:5.4}",
                    epoch,
                    idx,
                    num_batches,
                    format_lr(self.optimizer.learning_rate()),
                    ms_per_batch,
                    avg.primary,
                    avg.perplexity(),
                    avg.relation(Relation::Synonym),
                    avg.relation(Relation::Antonym),
                    avg.relation(Relation::Hypernym),
                    avg.relation(Relation::Meronym),
                    avg.regularizer,
                );
                window.reset();
                window_start = Instant::now();
            }
        }
        Ok(true)
    }

    /// Mean losses over `split` with dropout off and no parameter updates.
    pub fn evaluate(&self, split: Split) -> Result<LossAverages> {
        let relations = self.config.objective.relations;
        let mut totals = LossAccumulator::default();
        let mut hidden = self.model.init_hidden(self.config.batch_size)?;

        for batch in BatchIterator::new(
            self.examples(split),
            &self.vocab,
            &self.device,
            self.config.batch_size,
        ) {
            let batch = batch?;
            let output = self.model.forward(&batch, hidden.as_ref(), relations, false)?;
            let (_, breakdown) = self.objective.compose(&output, &batch)?;
            hidden = output.hidden.as_ref().map(HiddenState::detach);
            totals.add(&breakdown);
        }

        let mut averages = totals.averages();
        averages.regularizer = 0.0;
        Ok(averages)
    }

    fn save_epoch_embeddings(&self) -> Result<()> {
        write_embeddings_binary(&self.config.artifacts.embeddings_bin, self.model.embeddings())
    }

    /// Saves `varmap` if `loss` improves on the best validation loss.
    pub fn observe_validation(&mut self, loss: f64) -> Result<bool> {
        let improved = self.checkpoint.observe(loss, self.params.varmap())?;
        if improved {
            self.save_epoch_embeddings()?;
        }
        Ok(improved)
    }

    /// Runs every epoch, then reloads the best parameters, evaluates on the
    /// test split, and exports the embeddings.
    pub fn run(&mut self) -> Result<RunSummary> {
        let has_lm = self.config.model.variant.has_language_model();
        let mut outcome = TrainOutcome::Completed;
        let mut epochs_completed = 0;

        for epoch in 1..=self.config.epochs {
            let epoch_start = Instant::now();
            if !self.train_epoch(epoch)? {
                warn!(epoch, "Exiting from training early");
                outcome = TrainOutcome::Interrupted;
                break;
            }
            epochs_completed = epoch;

            if !has_lm {
                self.checkpoint.save(self.params.varmap())?;
                self.save_epoch_embeddings()?;
                info!(
                    epoch,
                    secs = epoch_start.elapsed().as_secs_f64(),
                    "End of retrofit epoch"
                );
                continue;
            }

            let valid = self.evaluate(Split::Valid)?;
            info!(
                "| end of epoch {:3} | time: {:5.2}s | valid loss {:5.2} | valid ppl {:8.2} | syn {:5.4} | ant {:5.4} | hyp {:5.4} | mer {:5.4}",
                epoch,
                epoch_start.elapsed().as_secs_f64(),
                valid.primary,
                valid.perplexity(),
                valid.relation(Relation::Synonym),
                valid.relation(Relation::Antonym),
                valid.relation(Relation::Hypernym),
                valid.relation(Relation::Meronym),
            );

            if !self.observe_validation(valid.primary)? {
                info!(patience = self.checkpoint.patience(), "No improvement on validation");
                if self
                    .config
                    .early_stop
                    .is_some_and(|limit| self.checkpoint.patience() >= limit)
                {
                    warn!(epoch, "Early stopping");
                    outcome = TrainOutcome::EarlyStopped;
                    break;
                }
            }
            self.scheduler.step(&mut self.optimizer);

            if self.interrupted() {
                outcome = TrainOutcome::Interrupted;
                break;
            }
        }

        let test = self.finish()?;
        Ok(RunSummary {
            outcome,
            epochs_completed,
            best_valid: self.checkpoint.best(),
            test,
        })
    }

    /// Reloads the best checkpoint, evaluates the test split for LM
    /// variants, and exports the final embeddings.
    pub fn finish(&mut self) -> Result<Option<LossAverages>> {
        if !self.checkpoint.restore(self.params.varmap_mut())? {
            warn!(
                path = %self.checkpoint.path().display(),
                "No checkpoint was written; keeping current weights"
            );
        }

        let test = if self.config.model.variant.has_language_model() {
            let test = self.evaluate(Split::Test)?;
            info!(
                "| End of training | test loss {:5.2} | test ppl {:8.2} | syn {:5.4} | ant {:5.4} | hyp {:5.4} | mer {:5.4}",
                test.primary,
                test.perplexity(),
                test.relation(Relation::Synonym),
                test.relation(Relation::Antonym),
                test.relation(Relation::Hypernym),
                test.relation(Relation::Meronym),
            );
            Some(test)
        } else {
            None
        };

        let artifacts = &self.config.artifacts;
        export_embeddings(
            &artifacts.embeddings_bin,
            &artifacts.embeddings_txt,
            self.model.embeddings(),
            &self.vocab,
        )?;
        Ok(test)
    }
}
