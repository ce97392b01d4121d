use rustc_hash::FxHashSet;

use crate::model::{Pair, TokenId};

/// Outcome of merging a specific pair within a [`Word`].
#[derive(Debug, Default)]
pub(crate) struct MergeOutcome {
    /// Number of pair occurrences replaced inside the word.
    pub(crate) replacements: usize,
    /// Pair count deltas emitted by the merge, per single occurrence of the word. Negative values
    /// represent broken adjacencies, positive values newly formed ones.
    pub(crate) deltas: Vec<(Pair, i64)>,
}

/// A distinct pre-token represented as its current token sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Word {
    tokens: Vec<TokenId>,
}

impl Word {
    /// Builds a word whose tokens are the raw byte values of `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            tokens: bytes.iter().map(|&b| TokenId::from(b)).collect(),
        }
    }

    /// Builds a word from an owned token sequence.
    #[must_use]
    pub fn from_tokens(tokens: Vec<TokenId>) -> Self {
        Self { tokens }
    }

    /// Returns the current token sequence.
    #[must_use]
    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    /// Number of tokens in the word.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true when the word holds no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterates over adjacent token pairs, including repeats.
    pub fn pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.tokens.windows(2).map(|window| (window[0], window[1]))
    }

    /// Collects the set of adjacent pairs present at least once.
    #[must_use]
    pub fn distinct_pairs(&self) -> FxHashSet<Pair> {
        self.pairs().collect()
    }

    /// Replaces every non-overlapping occurrence of `pair`, scanning left to right, with
    /// `replacement` and reports the adjacency deltas caused by each replacement.
    ///
    /// The left neighbour of a replacement is read from the already rewritten prefix, so a run
    /// such as `A B A B` yields `T T` with a single `(T, T)` adjacency.
    pub(crate) fn merge(&mut self, pair: Pair, replacement: TokenId) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let original_len = self.tokens.len();
        if original_len < 2 {
            return outcome;
        }

        let (left, right) = pair;
        let mut read = 0usize;
        let mut write = 0usize;
        while read < original_len {
            let matches = read + 1 < original_len
                && self.tokens[read] == left
                && self.tokens[read + 1] == right;
            if !matches {
                self.tokens[write] = self.tokens[read];
                write += 1;
                read += 1;
                continue;
            }

            if write > 0 {
                let prev = self.tokens[write - 1];
                outcome.deltas.push(((prev, left), -1));
                outcome.deltas.push(((prev, replacement), 1));
            }
            outcome.deltas.push((pair, -1));
            if read + 2 < original_len {
                let next = self.tokens[read + 2];
                outcome.deltas.push(((right, next), -1));
                outcome.deltas.push(((replacement, next), 1));
            }

            self.tokens[write] = replacement;
            write += 1;
            read += 2;
            outcome.replacements += 1;
        }

        self.tokens.truncate(write);
        outcome
    }
}
