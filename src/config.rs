//! Configuration builders controlling training and corpus pre-tokenization.

use crate::error::{Result, TbpeError};
use serde::{Deserialize, Serialize};

/// Number of raw byte tokens occupying the lowest ids of every vocabulary.
pub const BYTE_VOCAB_SIZE: usize = 256;

/// Document separator used when none is configured.
pub const DEFAULT_SEPARATOR: &str = "<|endoftext|>";

/// GPT-2 pre-tokenizer pattern splitting text into contractions, letter runs, digit runs,
/// punctuation runs and whitespace.
pub const GPT2_PATTERN: &str =
    r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// Read-ahead window used while scanning for document boundaries.
pub const DEFAULT_READ_AHEAD: usize = 4096;

/// Configuration for the BPE merge loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrainerConfig {
    /// Target vocabulary size including the 256 base byte tokens and special tokens.
    pub target_vocab_size: usize,
    /// Special tokens placed directly after the byte alphabet, in order.
    pub special_tokens: Vec<String>,
    /// Enables periodic progress logging through the `log` facade.
    pub show_progress: bool,
}

impl TrainerConfig {
    /// Returns a builder initialised with [`TrainerConfig::default`].
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::default()
    }

    /// Number of merges required to reach the target vocabulary size.
    ///
    /// Saturates at zero; [`TrainerConfig::validate`] rejects such configurations.
    #[must_use]
    pub fn num_merges(&self) -> usize {
        self.target_vocab_size
            .saturating_sub(BYTE_VOCAB_SIZE + self.special_tokens.len())
    }

    /// Validates the invariants required for training.
    pub fn validate(&self) -> Result<()> {
        let floor = BYTE_VOCAB_SIZE + self.special_tokens.len();
        if self.target_vocab_size <= floor {
            return Err(TbpeError::InvalidConfig(format!(
                "target_vocab_size ({}) must exceed 256 + special tokens ({}) to allow any merge",
                self.target_vocab_size,
                self.special_tokens.len()
            )));
        }
        let max_vocab = usize::try_from(u32::MAX).unwrap_or(usize::MAX);
        if self.target_vocab_size > max_vocab {
            return Err(TbpeError::InvalidConfig(format!(
                "target_vocab_size ({}) exceeds {max_vocab}, the maximum representable TokenId",
                self.target_vocab_size
            )));
        }
        if self.special_tokens.iter().any(String::is_empty) {
            return Err(TbpeError::InvalidConfig(
                "special tokens must not be empty strings".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            target_vocab_size: 10_000,
            special_tokens: vec![DEFAULT_SEPARATOR.into()],
            show_progress: true,
        }
    }
}

/// Builder for [`TrainerConfig`].
#[derive(Debug, Default, Clone)]
pub struct TrainerBuilder {
    cfg: TrainerConfig,
}

impl TrainerBuilder {
    /// Creates a builder with [`TrainerConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the desired vocabulary size (including base byte tokens).
    #[must_use]
    pub fn target_vocab_size(mut self, value: usize) -> Self {
        self.cfg.target_vocab_size = value;
        self
    }

    /// Enables or disables progress logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Overrides the special tokens reserved after the byte alphabet.
    #[must_use]
    pub fn special_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg.special_tokens = tokens.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Finalises the builder, returning a validated [`TrainerConfig`].
    pub fn build(mut self) -> Result<TrainerConfig> {
        dedup_in_place(&mut self.cfg.special_tokens);
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration controlling how a corpus file is split and segmented.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PretokenizeConfig {
    /// Desired number of parallel ranges; `None` uses the Rayon pool size.
    pub num_workers: Option<usize>,
    /// Byte string separating documents; ranges never split inside a document.
    pub document_separator: String,
    /// Word segmentation pattern compiled with `fancy-regex`.
    pub pattern: String,
    /// Additional strings removed before segmentation (normally the special tokens).
    pub special_tokens: Vec<String>,
    /// Window size used while scanning forward for the separator.
    pub read_ahead: usize,
}

impl Default for PretokenizeConfig {
    fn default() -> Self {
        Self {
            num_workers: None,
            document_separator: DEFAULT_SEPARATOR.into(),
            pattern: GPT2_PATTERN.into(),
            special_tokens: Vec::new(),
            read_ahead: DEFAULT_READ_AHEAD,
        }
    }
}

impl PretokenizeConfig {
    /// Returns a builder initialised with [`PretokenizeConfig::default`].
    #[must_use]
    pub fn builder() -> PretokenizeBuilder {
        PretokenizeBuilder::default()
    }

    /// Validates the pre-tokenization settings.
    pub fn validate(&self) -> Result<()> {
        if self.document_separator.is_empty() {
            return Err(TbpeError::InvalidConfig(
                "document_separator must not be empty".into(),
            ));
        }
        if self.num_workers == Some(0) {
            return Err(TbpeError::InvalidConfig(
                "num_workers must be greater than zero".into(),
            ));
        }
        if self.read_ahead == 0 {
            return Err(TbpeError::InvalidConfig(
                "read_ahead must be greater than zero".into(),
            ));
        }
        if self.pattern.is_empty() {
            return Err(TbpeError::InvalidConfig("pattern must not be empty".into()));
        }
        Ok(())
    }

    /// Strings that terminate a document: the separator followed by every special token.
    #[must_use]
    pub fn delimiters(&self) -> Vec<String> {
        let mut delimiters = Vec::with_capacity(self.special_tokens.len() + 1);
        delimiters.push(self.document_separator.clone());
        delimiters.extend(self.special_tokens.iter().cloned());
        delimiters.retain(|token| !token.is_empty());
        dedup_in_place(&mut delimiters);
        delimiters
    }
}

/// Builder for [`PretokenizeConfig`].
#[derive(Debug, Default, Clone)]
pub struct PretokenizeBuilder {
    cfg: PretokenizeConfig,
}

impl PretokenizeBuilder {
    /// Creates a new builder with [`PretokenizeConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of parallel ranges requested from the boundary finder.
    #[must_use]
    pub fn num_workers(mut self, workers: Option<usize>) -> Self {
        self.cfg.num_workers = workers;
        self
    }

    /// Sets the document separator.
    #[must_use]
    pub fn document_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.cfg.document_separator = separator.into();
        self
    }

    /// Overrides the word segmentation pattern.
    #[must_use]
    pub fn pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.cfg.pattern = pattern.into();
        self
    }

    /// Sets the special tokens stripped out of documents before segmentation.
    #[must_use]
    pub fn special_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg.special_tokens = tokens.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Sets the boundary scan window in bytes.
    #[must_use]
    pub fn read_ahead(mut self, bytes: usize) -> Self {
        self.cfg.read_ahead = bytes;
        self
    }

    /// Finalises the builder, returning a validated [`PretokenizeConfig`].
    pub fn build(self) -> Result<PretokenizeConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Deduplicates tokens in-place while preserving the first occurrence ordering.
pub fn dedup_in_place(tokens: &mut Vec<String>) {
    let mut seen = rustc_hash::FxHashSet::default();
    tokens.retain(|token| seen.insert(token.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_deduplicates_special_tokens() {
        let cfg = TrainerConfig::builder()
            .target_vocab_size(300)
            .special_tokens(["<|a|>", "<|b|>", "<|a|>"])
            .show_progress(false)
            .build()
            .expect("config should be valid");
        assert_eq!(cfg.special_tokens, vec!["<|a|>", "<|b|>"]);
        assert_eq!(cfg.num_merges(), 42);
    }

    #[test]
    fn validate_rejects_vocab_without_room_for_merges() {
        let err = TrainerConfig::builder()
            .target_vocab_size(257)
            .special_tokens(["<|endoftext|>"])
            .build()
            .expect_err("validation should fail");
        assert!(matches!(
            err,
            TbpeError::InvalidConfig(message) if message.contains("must exceed 256")
        ));
    }

    #[test]
    fn validate_rejects_exact_floor() {
        let cfg = TrainerConfig {
            target_vocab_size: 256,
            special_tokens: Vec::new(),
            show_progress: false,
        };
        assert!(cfg.validate().is_err());
        assert_eq!(cfg.num_merges(), 0);
    }

    #[test]
    fn pretokenize_builder_overrides_defaults() {
        let cfg = PretokenizeConfig::builder()
            .num_workers(Some(3))
            .document_separator("\n\n")
            .read_ahead(16)
            .special_tokens(["<|pad|>", "\n\n"])
            .build()
            .expect("valid config");
        assert_eq!(cfg.num_workers, Some(3));
        assert_eq!(cfg.read_ahead, 16);
        assert_eq!(cfg.delimiters(), vec!["\n\n".to_string(), "<|pad|>".into()]);
    }

    #[test]
    fn pretokenize_rejects_empty_separator_and_zero_workers() {
        assert!(PretokenizeConfig::builder()
            .document_separator("")
            .build()
            .is_err());
        assert!(PretokenizeConfig::builder()
            .num_workers(Some(0))
            .build()
            .is_err());
    }
}
