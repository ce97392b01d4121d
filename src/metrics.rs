//! Metrics describing the evolution of the training process.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reason a training run terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Every requested merge was applied.
    TargetVocabReached,
    /// No adjacent pair was left to merge before the target vocabulary size was reached.
    CandidatesExhausted,
}

/// Metrics captured for each merge iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationMetrics {
    /// Sequential iteration number (1-indexed).
    pub iteration: usize,
    /// Aggregate frequency of the merged pair.
    pub best_frequency: u64,
    /// Distinct words rewritten by the merge.
    pub words_touched: usize,
    /// Pair occurrences replaced across those words.
    pub replacements: usize,
    /// Count of distinct candidate pairs remaining after the iteration.
    pub distinct_pairs: usize,
    /// Execution time for the iteration.
    pub elapsed_iteration: Duration,
    /// Total time elapsed since the merge loop started.
    pub elapsed_total: Duration,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

/// Aggregate metrics produced by a training session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    /// Per-iteration snapshots accrued during training.
    pub iterations: Vec<IterationMetrics>,
    /// Merges implied by the configured vocabulary size.
    pub requested_merges: usize,
    /// Distinct words in the training corpus.
    pub distinct_words: usize,
    /// Word occurrences in the training corpus.
    pub total_words: u64,
    /// Time spent pre-tokenizing, when training started from raw text.
    pub pretokenize_duration: Option<Duration>,
    /// Total duration of the merge loop.
    pub total_duration: Duration,
    /// Reason training terminated.
    pub stop_reason: StopReason,
}

impl TrainingMetrics {
    /// Creates an empty metrics container with pre-allocated capacity.
    #[must_use]
    pub fn new(requested_merges: usize) -> Self {
        Self {
            iterations: Vec::with_capacity(requested_merges.min(16_384)),
            requested_merges,
            distinct_words: 0,
            total_words: 0,
            pretokenize_duration: None,
            total_duration: Duration::ZERO,
            stop_reason: StopReason::TargetVocabReached,
        }
    }

    /// Number of merges actually applied.
    #[must_use]
    pub fn merges_applied(&self) -> usize {
        self.iterations.len()
    }

    /// Returns true when training stopped short of the requested vocabulary size.
    #[must_use]
    pub fn stopped_early(&self) -> bool {
        self.stop_reason == StopReason::CandidatesExhausted
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let value = rest
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok());
            return value;
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}
