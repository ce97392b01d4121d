//! Core training loop turning word frequencies into a vocabulary and merge list.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::{PretokenizeConfig, TrainerBuilder, TrainerConfig, BYTE_VOCAB_SIZE};
use crate::error::{Result, TbpeError};
use crate::metrics::{sample_rss_kb, IterationMetrics, StopReason, TrainingMetrics};
use crate::model::{BpeModel, Pair, TokenId};
use crate::pretokenize::{pretokenize_file, pretokenize_texts, WordCounts};
use crate::segmentation::RegexSegmenter;

mod index;
mod word;

use index::{MergeStats, PairIndex, WordTable};
pub use word::Word;

/// High-level façade configuring and executing BPE training runs.
#[derive(Debug, Clone)]
pub struct Trainer {
    cfg: TrainerConfig,
}

/// Artifacts returned after a training session completes.
#[must_use]
#[derive(Debug, Clone)]
pub struct TrainerArtifacts {
    /// Trained BPE model.
    pub model: BpeModel,
    /// Detailed metrics captured during training.
    pub metrics: TrainingMetrics,
}

impl Trainer {
    /// Creates a new trainer for the supplied configuration.
    #[must_use]
    pub fn new(cfg: TrainerConfig) -> Self {
        Self { cfg }
    }

    /// Returns a [`TrainerBuilder`] with default settings.
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerConfig::builder()
    }

    /// Returns an immutable reference to the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }

    /// Trains a model on a corpus file, pre-tokenizing it in parallel first.
    ///
    /// The trainer's special tokens are stripped from documents in addition to any configured in
    /// `pretokenize`, so they never take part in merges.
    pub fn train_from_path<P: AsRef<Path>>(
        &self,
        path: P,
        pretokenize: &PretokenizeConfig,
    ) -> Result<TrainerArtifacts> {
        self.cfg.validate()?;
        let pretokenize = self.with_special_delimiters(pretokenize);
        let start = Instant::now();
        let counts = pretokenize_file(path, &pretokenize)?;
        let elapsed = start.elapsed();
        let mut artifacts = self.train_from_word_counts(&counts)?;
        artifacts.metrics.pretokenize_duration = Some(elapsed);
        Ok(artifacts)
    }

    /// Trains a model on in-memory documents, one pre-tokenization task per document.
    pub fn train_from_texts<T>(
        &self,
        texts: &[T],
        pretokenize: &PretokenizeConfig,
    ) -> Result<TrainerArtifacts>
    where
        T: AsRef<[u8]> + Sync,
    {
        self.cfg.validate()?;
        let pretokenize = self.with_special_delimiters(pretokenize);
        let segmenter = RegexSegmenter::from_config(&pretokenize)?;
        let start = Instant::now();
        let counts = pretokenize_texts(texts, &segmenter)?;
        let elapsed = start.elapsed();
        let mut artifacts = self.train_from_word_counts(&counts)?;
        artifacts.metrics.pretokenize_duration = Some(elapsed);
        Ok(artifacts)
    }

    /// Runs the merge loop on an aggregated word frequency table.
    ///
    /// Stops after `target_vocab_size - 256 - special_tokens` merges, or earlier with
    /// [`StopReason::CandidatesExhausted`] once no adjacent pair remains.
    pub fn train_from_word_counts(&self, counts: &WordCounts) -> Result<TrainerArtifacts> {
        self.cfg.validate()?;
        let num_merges = self.cfg.num_merges();

        let mut session = MergeSession::new(&self.cfg, counts)?;
        let mut metrics = TrainingMetrics::new(num_merges);
        metrics.distinct_words = session.table.len();
        metrics.total_words = session.table.total_occurrences();
        info!(
            "training {} merges over {} distinct words ({} occurrences), {} initial pairs",
            num_merges,
            metrics.distinct_words,
            metrics.total_words,
            session.index.len()
        );

        let log_every = (num_merges / 20).max(1);
        let training_start = Instant::now();
        while metrics.iterations.len() < num_merges {
            let iteration_start = Instant::now();
            let Some(round) = session.step()? else {
                metrics.stop_reason = StopReason::CandidatesExhausted;
                break;
            };
            let iteration = metrics.iterations.len() + 1;
            let checkpoint = iteration % log_every == 0 || iteration == num_merges;

            debug!(
                "merge {iteration}: {:?} -> {} (freq {}, words {})",
                round.pair, round.token, round.frequency, round.stats.words_touched
            );
            if self.cfg.show_progress && checkpoint {
                info!(
                    "iter {:>6} freq {:>8} words {:>8} distinct_pairs {:>8} vocab {:>8}",
                    iteration,
                    round.frequency,
                    round.stats.words_touched,
                    session.index.len(),
                    session.vocab.len()
                );
            }

            metrics.iterations.push(IterationMetrics {
                iteration,
                best_frequency: round.frequency,
                words_touched: round.stats.words_touched,
                replacements: round.stats.replacements,
                distinct_pairs: session.index.len(),
                elapsed_iteration: iteration_start.elapsed(),
                elapsed_total: training_start.elapsed(),
                rss_kb: if checkpoint { sample_rss_kb() } else { None },
            });
        }
        metrics.total_duration = training_start.elapsed();

        if metrics.stopped_early() {
            warn!(
                "candidate pairs exhausted after {} of {} merges; vocabulary holds {} of {} tokens",
                metrics.merges_applied(),
                num_merges,
                session.vocab.len(),
                self.cfg.target_vocab_size
            );
        } else if self.cfg.show_progress {
            info!(
                "completed {} merges in {:.2?}; vocab size {}",
                metrics.merges_applied(),
                metrics.total_duration,
                session.vocab.len()
            );
        }

        let model = session.into_model(self.cfg.special_tokens.clone())?;
        Ok(TrainerArtifacts { model, metrics })
    }

    fn with_special_delimiters(&self, pretokenize: &PretokenizeConfig) -> PretokenizeConfig {
        let mut cfg = pretokenize.clone();
        for token in &self.cfg.special_tokens {
            if !cfg.special_tokens.contains(token) {
                cfg.special_tokens.push(token.clone());
            }
        }
        cfg
    }
}

/// Result of one applied merge round.
#[derive(Debug, Clone, Copy)]
struct Round {
    pair: Pair,
    token: TokenId,
    frequency: u64,
    stats: MergeStats,
}

/// Mutable state of one training run. The word table, candidate counts and index are owned here
/// and lent to the updater one round at a time.
struct MergeSession {
    vocab: Vec<Vec<u8>>,
    merge_ids: Vec<Pair>,
    table: WordTable,
    index: PairIndex,
    next_token_id: TokenId,
}

impl MergeSession {
    fn new(cfg: &TrainerConfig, counts: &WordCounts) -> Result<Self> {
        let mut vocab: Vec<Vec<u8>> = (0u8..=u8::MAX).map(|b| vec![b]).collect();
        vocab.extend(cfg.special_tokens.iter().map(|token| token.as_bytes().to_vec()));
        let next_token_id = TokenId::try_from(vocab.len())
            .map_err(|_| TbpeError::Internal("vocabulary size exceeded u32::MAX".into()))?;
        debug_assert_eq!(vocab.len(), BYTE_VOCAB_SIZE + cfg.special_tokens.len());

        let table = WordTable::from_counts(counts);
        let index = PairIndex::build(&table);
        Ok(Self {
            vocab,
            merge_ids: Vec::with_capacity(cfg.num_merges()),
            table,
            index,
            next_token_id,
        })
    }

    /// Selects the best pair, allocates its token, records the merge and applies it.
    /// Returns `None` when no candidate pair is left.
    fn step(&mut self) -> Result<Option<Round>> {
        let Some((pair, frequency)) = self.index.select_best(&self.vocab) else {
            return Ok(None);
        };

        let token = self.next_token_id;
        let mut bytes = self.vocab[pair.0 as usize].clone();
        bytes.extend_from_slice(&self.vocab[pair.1 as usize]);
        self.vocab.push(bytes);
        self.merge_ids.push(pair);

        let stats = self.index.apply_merge(&mut self.table, pair, token)?;
        self.next_token_id = token
            .checked_add(1)
            .ok_or_else(|| TbpeError::Internal("vocabulary size exceeded u32::MAX".into()))?;

        Ok(Some(Round {
            pair,
            token,
            frequency,
            stats,
        }))
    }

    fn into_model(self, special_tokens: Vec<String>) -> Result<BpeModel> {
        BpeModel::new(self.vocab, self.merge_ids, special_tokens)
    }
}

impl fmt::Display for TrainerArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BPE model with vocab size {}", self.model.vocab_size())?;
        writeln!(
            f,
            "Merges: {} of {} requested",
            self.metrics.merges_applied(),
            self.metrics.requested_merges
        )?;
        writeln!(f, "Stop reason: {:?}", self.metrics.stop_reason)?;
        writeln!(f, "Total duration: {:?}", self.metrics.total_duration)?;
        Ok(())
    }
}
