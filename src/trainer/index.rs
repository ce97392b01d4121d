//! Word table, pair counts and the pair→words index kept in lock-step by the merge loop.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;

use rustc_hash::{FxHashMap, FxHashSet};

use super::word::Word;
use crate::error::{Result, TbpeError};
use crate::model::{Pair, TokenId};
use crate::pretokenize::WordCounts;

/// Deduplicated corpus: one slot per distinct word with its occurrence count.
///
/// Slots are stable for the lifetime of a training run. Merging rewrites the word stored in a
/// slot, which is how an old word key is replaced by its merged form.
#[derive(Debug, Clone, Default)]
pub(crate) struct WordTable {
    words: Vec<Word>,
    counts: Vec<u64>,
}

impl WordTable {
    /// Builds the table from pre-tokenized byte words, dropping empty words and zero counts.
    ///
    /// Slots are assigned in byte order so repeated runs see identical layouts.
    pub(crate) fn from_counts(counts: &WordCounts) -> Self {
        let mut entries: Vec<(&Vec<u8>, u64)> = counts
            .iter()
            .filter(|(word, count)| !word.is_empty() && **count > 0)
            .map(|(word, &count)| (word, count))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut table = Self {
            words: Vec::with_capacity(entries.len()),
            counts: Vec::with_capacity(entries.len()),
        };
        for (bytes, count) in entries {
            table.words.push(Word::from_bytes(bytes));
            table.counts.push(count);
        }
        table
    }

    pub(crate) fn len(&self) -> usize {
        self.words.len()
    }

    #[cfg(test)]
    pub(crate) fn word(&self, slot: usize) -> &Word {
        &self.words[slot]
    }

    /// Total number of word occurrences represented by the table.
    pub(crate) fn total_occurrences(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Current table as a `Word → count` map.
    #[cfg(test)]
    pub(crate) fn word_counts(&self) -> FxHashMap<Word, u64> {
        self.words
            .iter()
            .cloned()
            .zip(self.counts.iter().copied())
            .collect()
    }
}

/// Summary of a single applied merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MergeStats {
    /// Distinct words rewritten.
    pub(crate) words_touched: usize,
    /// Pair occurrences replaced across those words, not weighted by word counts.
    pub(crate) replacements: usize,
}

/// Aggregate pair frequencies plus, for every pair, the word slots that contain it.
///
/// Invariants between rounds:
/// * `pair_counts[p]` equals the sum over words of (occurrences of `p` × word count) and only
///   positive entries are stored;
/// * slot `s` is in `pair_words[p]` iff word `s` contains `p` at least once.
#[derive(Debug, Clone, Default)]
pub(crate) struct PairIndex {
    pair_counts: FxHashMap<Pair, i64>,
    pair_words: FxHashMap<Pair, FxHashSet<usize>>,
}

impl PairIndex {
    /// Scans every word once, accumulating weighted pair counts and the pair→words index.
    pub(crate) fn build(table: &WordTable) -> Self {
        let mut index = Self::default();
        for (slot, word) in table.words.iter().enumerate() {
            let count = weight(table.counts[slot]);
            for pair in word.pairs() {
                *index.pair_counts.entry(pair).or_insert(0) += count;
                index.pair_words.entry(pair).or_default().insert(slot);
            }
        }
        index
    }

    /// Number of candidate pairs with a positive frequency.
    pub(crate) fn len(&self) -> usize {
        self.pair_counts.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.pair_counts.is_empty()
    }

    /// Aggregate frequency of `pair`, if it is still a candidate.
    #[cfg(test)]
    pub(crate) fn frequency(&self, pair: Pair) -> Option<u64> {
        self.pair_counts
            .get(&pair)
            .and_then(|&count| u64::try_from(count).ok())
    }

    /// Word slots containing `pair`, if any.
    #[cfg(test)]
    pub(crate) fn words_with(&self, pair: Pair) -> Option<&FxHashSet<usize>> {
        self.pair_words.get(&pair)
    }

    /// Returns the most frequent pair and its frequency.
    ///
    /// Ties go to the pair whose `(bytes(left), bytes(right))` is lexicographically greatest. Two
    /// distinct tokens may share the same bytes; such residual ties go to the smaller id pair.
    pub(crate) fn select_best(&self, vocab: &[Vec<u8>]) -> Option<(Pair, u64)> {
        let mut best: Option<(Pair, i64)> = None;
        for (&pair, &count) in &self.pair_counts {
            if count <= 0 {
                continue;
            }
            let replace = match best {
                None => true,
                Some((best_pair, best_count)) => {
                    rank(pair, count, best_pair, best_count, vocab) == Ordering::Greater
                }
            };
            if replace {
                best = Some((pair, count));
            }
        }
        best.and_then(|(pair, count)| u64::try_from(count).ok().map(|count| (pair, count)))
    }

    /// Merges `pair` into `new_token` inside every word that contains it and repairs the counts
    /// and the index by delta. Words outside `pair_words[pair]` are never visited.
    ///
    /// Fails with [`TbpeError::InvariantViolation`] when the bookkeeping disagrees with the
    /// words: an indexed word that lacks the pair, a count driven below zero, or a non-zero
    /// residual frequency for `pair` once every affected word has been rewritten.
    pub(crate) fn apply_merge(
        &mut self,
        table: &mut WordTable,
        pair: Pair,
        new_token: TokenId,
    ) -> Result<MergeStats> {
        let Some(affected) = self.pair_words.remove(&pair) else {
            return Err(TbpeError::InvariantViolation(format!(
                "pair {pair:?} selected for merging has no indexed words"
            )));
        };
        let mut slots: Vec<usize> = affected.into_iter().collect();
        slots.sort_unstable();

        let mut stats = MergeStats::default();
        let mut deltas: FxHashMap<Pair, i64> = FxHashMap::default();
        for slot in slots {
            let count = weight(table.counts[slot]);
            let word = &mut table.words[slot];
            let old_pairs = word.distinct_pairs();
            let outcome = word.merge(pair, new_token);
            if outcome.replacements == 0 {
                return Err(TbpeError::InvariantViolation(format!(
                    "word slot {slot} is indexed under {pair:?} but does not contain it"
                )));
            }
            for (changed, delta) in outcome.deltas {
                *deltas.entry(changed).or_insert(0) += delta * count;
            }

            let new_pairs = word.distinct_pairs();
            for lost in old_pairs.difference(&new_pairs) {
                if *lost == pair {
                    continue;
                }
                if let Entry::Occupied(mut occupied) = self.pair_words.entry(*lost) {
                    occupied.get_mut().remove(&slot);
                    if occupied.get().is_empty() {
                        occupied.remove();
                    }
                }
            }
            for gained in new_pairs {
                self.pair_words.entry(gained).or_default().insert(slot);
            }

            stats.words_touched += 1;
            stats.replacements += outcome.replacements;
        }

        for (changed, delta) in deltas {
            self.apply_delta(changed, delta, pair)?;
        }

        self.pair_words.remove(&pair);
        match self.pair_counts.remove(&pair) {
            None | Some(0) => Ok(stats),
            Some(residue) => Err(TbpeError::InvariantViolation(format!(
                "pair {pair:?} retains frequency {residue} after merging"
            ))),
        }
    }

    fn apply_delta(&mut self, pair: Pair, delta: i64, merged: Pair) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let entry = self.pair_counts.entry(pair).or_insert(0);
        *entry += delta;
        if *entry < 0 {
            return Err(TbpeError::InvariantViolation(format!(
                "frequency of {pair:?} dropped to {} while merging {merged:?}",
                *entry
            )));
        }
        // The merged pair is checked and removed by the caller.
        if *entry == 0 && pair != merged {
            self.pair_counts.remove(&pair);
        }
        Ok(())
    }
}

fn weight(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn rank(pair: Pair, count: i64, other: Pair, other_count: i64, vocab: &[Vec<u8>]) -> Ordering {
    count
        .cmp(&other_count)
        .then_with(|| vocab[pair.0 as usize].cmp(&vocab[other.0 as usize]))
        .then_with(|| vocab[pair.1 as usize].cmp(&vocab[other.1 as usize]))
        .then_with(|| other.cmp(&pair))
}
