//! Helpers for persisting trained vocabularies and merge lists.

pub mod gpt2;
pub mod model_file;

pub use gpt2::{merges_txt, save_vocab_and_merges, vocab_json};
pub use model_file::{load_model_json, model_json, save_model_json, ModelFile};
