//! Model types and helpers for working with trained BPE vocabularies.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::config::BYTE_VOCAB_SIZE;
use crate::error::{Result, TbpeError};
use crate::trainer::Word;

/// Token identifier used throughout the crate.
pub type TokenId = u32;
/// Merge pair encoded as `(left, right)` token identifiers.
pub type Pair = (TokenId, TokenId);
/// Merge rule recorded as the byte strings of its two constituents.
pub type MergeRule = (Vec<u8>, Vec<u8>);

/// Trained BPE model containing the learned vocabulary and merge list.
///
/// Ids `0..256` are the raw bytes, the next ids hold the special tokens in declaration order and
/// every further id is the product of the merge with the same offset in [`BpeModel::merges`].
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpeModel {
    vocab: Vec<Vec<u8>>,
    merges: Vec<MergeRule>,
    merge_ids: Vec<Pair>,
    special_tokens: Vec<String>,
    ranks: FxHashMap<Pair, (usize, TokenId)>,
}

impl BpeModel {
    /// Constructs a model from its vocabulary, merge pairs and special tokens, checking that the
    /// layout and every merged token's bytes are consistent.
    pub fn new(
        vocab: Vec<Vec<u8>>,
        merge_ids: Vec<Pair>,
        special_tokens: Vec<String>,
    ) -> Result<Self> {
        let first_merge = BYTE_VOCAB_SIZE + special_tokens.len();
        if vocab.len() != first_merge + merge_ids.len() {
            return Err(TbpeError::Internal(format!(
                "vocabulary holds {} tokens but 256 bytes + {} specials + {} merges were expected",
                vocab.len(),
                special_tokens.len(),
                merge_ids.len()
            )));
        }
        for (idx, bytes) in vocab.iter().take(BYTE_VOCAB_SIZE).enumerate() {
            if bytes.as_slice() != [idx as u8] {
                return Err(TbpeError::Internal(format!(
                    "token {idx} does not hold its raw byte"
                )));
            }
        }
        for (offset, special) in special_tokens.iter().enumerate() {
            if vocab[BYTE_VOCAB_SIZE + offset] != special.as_bytes() {
                return Err(TbpeError::Internal(format!(
                    "special token {special:?} is not stored at id {}",
                    BYTE_VOCAB_SIZE + offset
                )));
            }
        }

        let mut merges = Vec::with_capacity(merge_ids.len());
        let mut ranks = FxHashMap::default();
        for (rank, &(left, right)) in merge_ids.iter().enumerate() {
            let id = first_merge + rank;
            let (Some(left_bytes), Some(right_bytes)) =
                (vocab.get(left as usize), vocab.get(right as usize))
            else {
                return Err(TbpeError::Internal(format!(
                    "merge {rank} references unknown token ids ({left}, {right})"
                )));
            };
            if left as usize >= id || right as usize >= id {
                return Err(TbpeError::Internal(format!(
                    "merge {rank} references a token created after it"
                )));
            }
            if vocab[id].len() != left_bytes.len() + right_bytes.len()
                || !vocab[id].starts_with(left_bytes)
                || !vocab[id].ends_with(right_bytes)
            {
                return Err(TbpeError::Internal(format!(
                    "token {id} is not the concatenation of tokens {left} and {right}"
                )));
            }
            merges.push((left_bytes.clone(), right_bytes.clone()));
            let token = TokenId::try_from(id)
                .map_err(|_| TbpeError::Internal("vocabulary size exceeded u32::MAX".into()))?;
            ranks.insert((left, right), (rank, token));
        }

        Ok(Self {
            vocab,
            merges,
            merge_ids,
            special_tokens,
            ranks,
        })
    }

    /// Returns the byte string of every token, indexed by id.
    #[must_use]
    pub fn vocab(&self) -> &[Vec<u8>] {
        &self.vocab
    }

    /// Returns the vocabulary as an `id → bytes` map.
    #[must_use]
    pub fn vocab_map(&self) -> BTreeMap<TokenId, Vec<u8>> {
        self.vocab
            .iter()
            .enumerate()
            .map(|(id, bytes)| (id as TokenId, bytes.clone()))
            .collect()
    }

    /// Returns the bytes backing `id`, if it exists.
    #[must_use]
    pub fn token_bytes(&self, id: TokenId) -> Option<&[u8]> {
        self.vocab.get(id as usize).map(Vec::as_slice)
    }

    /// Returns the merge rules as byte strings, in application order.
    #[must_use]
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    /// Returns the merge rules as token id pairs, in application order.
    #[must_use]
    pub fn merge_ids(&self) -> &[Pair] {
        &self.merge_ids
    }

    /// Returns the special tokens stored directly after the byte alphabet.
    #[must_use]
    pub fn special_tokens(&self) -> &[String] {
        &self.special_tokens
    }

    /// Returns the total vocabulary size including bytes and special tokens.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Id assigned to the first merge-created token.
    #[must_use]
    pub fn first_merge_id(&self) -> usize {
        BYTE_VOCAB_SIZE + self.special_tokens.len()
    }

    /// Returns the longest learned token, preferring the lowest id among equals.
    #[must_use]
    pub fn longest_token(&self) -> Option<(TokenId, &[u8])> {
        self.vocab
            .iter()
            .enumerate()
            .skip(self.first_merge_id())
            .fold(None, |best: Option<(usize, &Vec<u8>)>, (id, bytes)| match best {
                Some((_, current)) if current.len() >= bytes.len() => best,
                _ => Some((id, bytes)),
            })
            .map(|(id, bytes)| (id as TokenId, bytes.as_slice()))
    }

    /// Replays the merge list over one pre-token, returning its token ids.
    ///
    /// Merges are applied in rank order, each one greedily left to right without overlap, which is
    /// exactly how the trainer rewrote words while learning them.
    #[must_use]
    pub fn encode_word(&self, bytes: &[u8]) -> Vec<TokenId> {
        let mut word = Word::from_bytes(bytes);
        loop {
            let next = word
                .pairs()
                .filter_map(|pair| self.ranks.get(&pair).map(|&(rank, id)| (rank, pair, id)))
                .min_by_key(|&(rank, _, _)| rank);
            let Some((_, pair, id)) = next else {
                break;
            };
            word.merge(pair, id);
        }
        word.tokens().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_vocab() -> Vec<Vec<u8>> {
        (0u8..=u8::MAX).map(|b| vec![b]).collect()
    }

    fn sample_model() -> BpeModel {
        let a = TokenId::from(b'a');
        let b = TokenId::from(b'b');
        let mut vocab = byte_vocab();
        vocab.push(b"<|endoftext|>".to_vec()); // 256
        vocab.push(b"aa".to_vec()); // 257
        vocab.push(b"aaa".to_vec()); // 258
        vocab.push(b"ab".to_vec()); // 259
        BpeModel::new(
            vocab,
            vec![(a, a), (257, a), (a, b)],
            vec!["<|endoftext|>".into()],
        )
        .expect("valid model")
    }

    #[test]
    fn merges_are_recorded_as_bytes() {
        let model = sample_model();
        assert_eq!(model.vocab_size(), 260);
        assert_eq!(model.first_merge_id(), 257);
        assert_eq!(
            model.merges()[1],
            (b"aa".to_vec(), b"a".to_vec()),
            "second merge joins `aa` and `a`"
        );
        assert_eq!(model.vocab_map()[&258], b"aaa".to_vec());
        assert_eq!(model.token_bytes(256), Some(&b"<|endoftext|>"[..]));
    }

    #[test]
    fn encode_word_replays_merges_in_rank_order() {
        let model = sample_model();
        // (a,a) outranks (a,b): "aab" becomes [aa, b] rather than [a, ab].
        assert_eq!(model.encode_word(b"aab"), vec![257, u32::from(b'b')]);
        assert_eq!(model.encode_word(b"aaaa"), vec![257, 257]);
        assert_eq!(model.encode_word(b"aaab"), vec![258, u32::from(b'b')]);
        assert_eq!(model.encode_word(b"ab"), vec![259]);
        assert_eq!(model.encode_word(b""), Vec::<TokenId>::new());
    }

    #[test]
    fn longest_token_reports_first_longest() {
        let model = sample_model();
        assert_eq!(model.longest_token(), Some((258, &b"aaa"[..])));
    }

    #[test]
    fn inconsistent_merges_are_rejected() {
        let mut vocab = byte_vocab();
        vocab.push(b"xy".to_vec());
        let err = BpeModel::new(vocab, vec![(u32::from(b'a'), u32::from(b'b'))], Vec::new())
            .expect_err("bytes do not match");
        assert!(matches!(err, TbpeError::Internal(_)));
    }
}
