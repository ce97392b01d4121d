//! Parallel pre-tokenization of corpus files into word frequency tables.

use std::ops::Range;
use std::path::Path;
use std::time::Instant;

use bstr::ByteSlice;
use log::{debug, info};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashMap;

use crate::config::PretokenizeConfig;
use crate::corpus::{chunk_ranges, file_chunk_boundaries, read_range};
use crate::error::{Result, TbpeError};
use crate::segmentation::{RegexSegmenter, Segmenter};

/// Frequency table mapping each distinct word (as raw UTF-8 bytes) to its occurrence count.
pub type WordCounts = FxHashMap<Vec<u8>, u64>;

/// Segments an in-memory byte range and counts its words.
///
/// Invalid UTF-8 is replaced with U+FFFD rather than rejected.  Documents are split on the
/// segmenter's delimiters first, so no word ever spans two documents and delimiters themselves
/// are never counted.
pub fn pretokenize_bytes<S>(bytes: &[u8], segmenter: &S) -> Result<WordCounts>
where
    S: Segmenter + ?Sized,
{
    let text = bytes.to_str_lossy();
    let mut counts = WordCounts::default();
    segmenter.split_documents(&text, &mut |document| {
        segmenter.segment(document, &mut |word| {
            if let Some(count) = counts.get_mut(word.as_bytes()) {
                *count += 1;
            } else {
                counts.insert(word.as_bytes().to_vec(), 1);
            }
        })
    })?;
    Ok(counts)
}

/// Reads `range` from `path` and counts its words with [`pretokenize_bytes`].
///
/// Only read-only state is shared, so any number of ranges may run concurrently.
pub fn pretokenize_range<P, S>(path: P, range: Range<u64>, segmenter: &S) -> Result<WordCounts>
where
    P: AsRef<Path>,
    S: Segmenter + ?Sized,
{
    let bytes = read_range(path, range.clone())?;
    let counts = pretokenize_bytes(&bytes, segmenter)?;
    debug!(
        "range {}..{} produced {} distinct words",
        range.start,
        range.end,
        counts.len()
    );
    Ok(counts)
}

/// Sums per-range tables into one global table.
///
/// The result does not depend on the order in which tables are supplied.
pub fn aggregate_counts<I>(tables: I) -> WordCounts
where
    I: IntoIterator<Item = WordCounts>,
{
    tables.into_iter().fold(WordCounts::default(), merge_counts)
}

/// Folds `right` into `left`, iterating over the smaller of the two tables.
#[must_use]
pub fn merge_counts(mut left: WordCounts, mut right: WordCounts) -> WordCounts {
    if left.len() < right.len() {
        std::mem::swap(&mut left, &mut right);
    }
    for (word, count) in right {
        *left.entry(word).or_insert(0) += count;
    }
    left
}

/// Pre-tokenizes a corpus file in parallel using a [`RegexSegmenter`] built from `cfg`.
pub fn pretokenize_file<P: AsRef<Path>>(path: P, cfg: &PretokenizeConfig) -> Result<WordCounts> {
    let segmenter = RegexSegmenter::from_config(cfg)?;
    pretokenize_file_with(path, cfg, &segmenter)
}

/// Pre-tokenizes a corpus file in parallel with a caller supplied segmenter.
///
/// The file is split into at most `cfg.num_workers` document-aligned ranges (the Rayon pool
/// size when unset); each range is counted on its own task and the tables are reduced with
/// [`merge_counts`].
pub fn pretokenize_file_with<P, S>(
    path: P,
    cfg: &PretokenizeConfig,
    segmenter: &S,
) -> Result<WordCounts>
where
    P: AsRef<Path>,
    S: Segmenter + ?Sized,
{
    cfg.validate()?;
    let path = path.as_ref();
    let start = Instant::now();
    let workers = cfg
        .num_workers
        .unwrap_or_else(rayon::current_num_threads)
        .max(1);
    let boundaries = file_chunk_boundaries(
        path,
        workers,
        cfg.document_separator.as_bytes(),
        cfg.read_ahead,
    )?;
    let ranges = chunk_ranges(&boundaries);

    let count_ranges = || {
        ranges
            .par_iter()
            .map(|range| pretokenize_range(path, range.clone(), segmenter))
            .try_reduce(WordCounts::default, |left, right| Ok(merge_counts(left, right)))
    };
    let counts = match cfg.num_workers {
        Some(threads) => ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| TbpeError::Internal(format!("unable to build thread pool: {err}")))?
            .install(count_ranges)?,
        None => count_ranges()?,
    };

    info!(
        "pre-tokenized {} across {} ranges: {} distinct words, {} occurrences in {:.2?}",
        path.display(),
        ranges.len(),
        counts.len(),
        counts.values().sum::<u64>(),
        start.elapsed()
    );
    Ok(counts)
}

/// Pre-tokenizes in-memory texts in parallel, one task per text.
pub fn pretokenize_texts<T, S>(texts: &[T], segmenter: &S) -> Result<WordCounts>
where
    T: AsRef<[u8]> + Sync,
    S: Segmenter + ?Sized,
{
    texts
        .par_iter()
        .map(|text| pretokenize_bytes(text.as_ref(), segmenter))
        .try_reduce(WordCounts::default, |left, right| Ok(merge_counts(left, right)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GPT2_PATTERN;
    use std::fs;
    use tempfile::tempdir;

    fn segmenter() -> RegexSegmenter {
        RegexSegmenter::new(GPT2_PATTERN, &["<|endoftext|>"]).expect("segmenter")
    }

    fn word(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    fn sample_corpus() -> String {
        let docs = [
            "Once upon a time there was a cat.",
            "The cat sat on the mat. The mat was red!",
            "It's 2024 and the cat's still there.",
            "",
            "tiny",
            "Another story about a dog, a cat and 42 mice.",
            "The end.",
        ];
        docs.join("<|endoftext|>")
    }

    #[test]
    fn counts_words_per_document() {
        let counts = pretokenize_bytes(b"aaab aaab", &segmenter()).expect("counts");
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&word("aaab")], 1);
        assert_eq!(counts[&word(" aaab")], 1);
    }

    #[test]
    fn separators_are_not_counted() {
        let counts =
            pretokenize_bytes(b"hi<|endoftext|>hi<|endoftext|>", &segmenter()).expect("counts");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&word("hi")], 2);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let counts = pretokenize_bytes(b"ab\xFFcd", &segmenter()).expect("lossy decode");
        assert_eq!(counts[&word("ab")], 1);
        assert_eq!(counts[&word("\u{FFFD}")], 1);
        assert_eq!(counts[&word("cd")], 1);
    }

    #[test]
    fn aggregation_is_order_independent() {
        let seg = segmenter();
        let tables: Vec<WordCounts> = sample_corpus()
            .split("<|endoftext|>")
            .map(|doc| pretokenize_bytes(doc.as_bytes(), &seg).expect("counts"))
            .collect();
        let forward = aggregate_counts(tables.clone());
        let backward = aggregate_counts(tables.into_iter().rev());
        let whole = pretokenize_bytes(sample_corpus().as_bytes(), &seg).expect("counts");
        assert_eq!(forward, backward);
        assert_eq!(forward, whole);
    }

    #[test]
    fn file_counts_do_not_depend_on_worker_count() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("corpus.txt");
        fs::write(&path, sample_corpus()).expect("write corpus");

        let seg = segmenter();
        let expected = pretokenize_bytes(sample_corpus().as_bytes(), &seg).expect("counts");
        for workers in 1..=8 {
            let cfg = PretokenizeConfig::builder()
                .num_workers(Some(workers))
                .read_ahead(8)
                .build()
                .expect("config");
            let counts = pretokenize_file(&path, &cfg).expect("pretokenize file");
            assert_eq!(counts, expected, "workers = {workers}");
        }
    }

    #[test]
    fn texts_are_counted_in_parallel() {
        let counts = pretokenize_texts(&["low lower", "low"], &segmenter()).expect("counts");
        assert_eq!(counts[&word("low")], 2);
        assert_eq!(counts[&word(" lower")], 1);
    }
}
