//! Word segmentation applied to decoded documents before counting.
//!
//! The merge engine never looks inside the word pattern: it only consumes the words a
//! [`Segmenter`] hands back.  [`RegexSegmenter`] is the stock implementation built on
//! `fancy-regex`, which supports the negative look-ahead used by the GPT-2 pattern.

use fancy_regex::Regex;

use crate::config::PretokenizeConfig;
use crate::error::{Result, TbpeError};

/// Splits text into documents and documents into words.
///
/// Implementations are shared by reference across pre-tokenization workers.
pub trait Segmenter: Sync {
    /// Invokes `emit` for every document found between delimiters, in order.
    fn split_documents<'t>(
        &self,
        text: &'t str,
        emit: &mut dyn FnMut(&'t str) -> Result<()>,
    ) -> Result<()>;

    /// Invokes `emit` for every word the pattern produces from `document`, in order.
    fn segment<'t>(&self, document: &'t str, emit: &mut dyn FnMut(&'t str)) -> Result<()>;
}

/// Segmenter driven by a word pattern and an escaped alternation of document delimiters.
#[derive(Debug, Clone)]
pub struct RegexSegmenter {
    word_re: Regex,
    delimiter_re: Option<Regex>,
}

impl RegexSegmenter {
    /// Compiles `pattern` and a delimiter matcher for `delimiters`.
    ///
    /// Empty delimiters are ignored; longer delimiters are tried first so a delimiter that is a
    /// prefix of another never shadows it.
    pub fn new<S: AsRef<str>>(pattern: &str, delimiters: &[S]) -> Result<Self> {
        let word_re = Regex::new(pattern)?;
        let mut escaped: Vec<&str> = delimiters
            .iter()
            .map(AsRef::as_ref)
            .filter(|d| !d.is_empty())
            .collect();
        escaped.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        escaped.dedup();
        let delimiter_re = if escaped.is_empty() {
            None
        } else {
            let alternation = escaped
                .iter()
                .map(|d| fancy_regex::escape(d))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&alternation)?)
        };
        Ok(Self {
            word_re,
            delimiter_re,
        })
    }

    /// Builds a segmenter from the pattern and delimiters of a [`PretokenizeConfig`].
    pub fn from_config(cfg: &PretokenizeConfig) -> Result<Self> {
        cfg.validate()?;
        Self::new(&cfg.pattern, &cfg.delimiters())
    }

    /// Collects the words of `text`, skipping across delimiters. Convenience for tests and tools.
    pub fn words<'t>(&self, text: &'t str) -> Result<Vec<&'t str>> {
        let mut words = Vec::new();
        self.split_documents(text, &mut |document| {
            self.segment(document, &mut |word| words.push(word))
        })?;
        Ok(words)
    }
}

impl Segmenter for RegexSegmenter {
    fn split_documents<'t>(
        &self,
        text: &'t str,
        emit: &mut dyn FnMut(&'t str) -> Result<()>,
    ) -> Result<()> {
        let Some(delimiter_re) = &self.delimiter_re else {
            return emit(text);
        };
        let mut start = 0usize;
        for found in delimiter_re.find_iter(text) {
            let found = found.map_err(|err| TbpeError::Segmentation(err.to_string()))?;
            if found.start() > start {
                emit(&text[start..found.start()])?;
            }
            start = found.end();
        }
        if start < text.len() {
            emit(&text[start..])?;
        }
        Ok(())
    }

    fn segment<'t>(&self, document: &'t str, emit: &mut dyn FnMut(&'t str)) -> Result<()> {
        for found in self.word_re.find_iter(document) {
            let found = found.map_err(|err| TbpeError::Segmentation(err.to_string()))?;
            if !found.as_str().is_empty() {
                emit(found.as_str());
            }
        }
        Ok(())
    }
}
