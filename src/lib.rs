//! Byte-level byte pair encoding (BPE) tokenizer training library and CLI.
//!
//! The crate exposes both a library API and a `tbpe` command line interface. Training splits a
//! text corpus into document-aligned ranges, pre-tokenizes them in parallel with a GPT-2 style
//! pattern, and then learns merges over the aggregated word frequencies with an incrementally
//! maintained pair index.
//!
//! ```no_run
//! use tbpe::{PretokenizeConfig, Trainer, TrainerConfig};
//!
//! # fn main() -> tbpe::Result<()> {
//! let trainer_cfg = TrainerConfig::builder()
//!     .target_vocab_size(10_000)
//!     .special_tokens(["<|endoftext|>"])
//!     .show_progress(false)
//!     .build()?;
//! let trainer = Trainer::new(trainer_cfg);
//! let pretokenize = PretokenizeConfig::builder().num_workers(Some(8)).build()?;
//! let artifacts = trainer.train_from_path("/path/to/corpus.txt", &pretokenize)?;
//! tbpe::serialization::save_vocab_and_merges(&artifacts.model, "out", "")?;
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature. Users targeting the library portion
//! only can disable default features to avoid the CLI dependencies:
//! `tbpe = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod bytes;
pub mod config;
pub mod corpus;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pretokenize;
pub mod segmentation;
pub mod serialization;
pub mod trainer;

pub use config::{PretokenizeBuilder, PretokenizeConfig, TrainerBuilder, TrainerConfig};
pub use error::{Result, TbpeError};
pub use metrics::{IterationMetrics, StopReason, TrainingMetrics};
pub use model::{BpeModel, MergeRule, Pair, TokenId};
pub use pretokenize::WordCounts;
pub use segmentation::{RegexSegmenter, Segmenter};
pub use trainer::{Trainer, TrainerArtifacts, Word};
