//! Lossless JSON dump of a trained model.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TbpeError};
use crate::model::{BpeModel, MergeRule, Pair, TokenId};

/// On-disk shape of a model: raw bytes for every token plus both views of the merge list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelFile {
    /// Special tokens in id order, starting at 256.
    pub special_tokens: Vec<String>,
    /// Every token's bytes keyed by id.
    pub vocab: BTreeMap<TokenId, Vec<u8>>,
    /// Merge rules as byte strings, in rank order.
    pub merges: Vec<MergeRule>,
    /// Merge rules as id pairs, in rank order.
    pub merge_ids: Vec<Pair>,
}

impl From<&BpeModel> for ModelFile {
    fn from(model: &BpeModel) -> Self {
        Self {
            special_tokens: model.special_tokens().to_vec(),
            vocab: model.vocab_map(),
            merges: model.merges().to_vec(),
            merge_ids: model.merge_ids().to_vec(),
        }
    }
}

impl ModelFile {
    /// Rebuilds the model, rejecting dumps whose ids are not dense or whose merges disagree.
    pub fn into_model(self) -> Result<BpeModel> {
        let mut vocab = Vec::with_capacity(self.vocab.len());
        for (expected, (id, bytes)) in self.vocab.into_iter().enumerate() {
            if id as usize != expected {
                return Err(TbpeError::Serialization(format!(
                    "vocabulary ids must be contiguous from 0, found {id} at position {expected}"
                )));
            }
            vocab.push(bytes);
        }
        let model = BpeModel::new(vocab, self.merge_ids, self.special_tokens)
            .map_err(|err| TbpeError::Serialization(err.to_string()))?;
        if model.merges() != self.merges.as_slice() {
            return Err(TbpeError::Serialization(
                "merge byte strings do not match merge ids".into(),
            ));
        }
        Ok(model)
    }
}

/// Serialises `model` to JSON.
pub fn model_json(model: &BpeModel, pretty: bool) -> Result<String> {
    let file = ModelFile::from(model);
    let json = if pretty {
        serde_json::to_string_pretty(&file)?
    } else {
        serde_json::to_string(&file)?
    };
    Ok(json)
}

/// Writes the JSON dump of `model` to `path`.
pub fn save_model_json<P: AsRef<Path>>(model: &BpeModel, path: P, pretty: bool) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| TbpeError::io(err, Some(parent.to_path_buf())))?;
    }
    fs::write(path, model_json(model, pretty)?)
        .map_err(|err| TbpeError::io(err, Some(path.to_path_buf())))
}

/// Loads a model previously written by [`save_model_json`].
pub fn load_model_json<P: AsRef<Path>>(path: P) -> Result<BpeModel> {
    let path = path.as_ref();
    let text =
        fs::read_to_string(path).map_err(|err| TbpeError::io(err, Some(path.to_path_buf())))?;
    let file: ModelFile = serde_json::from_str(&text)?;
    file.into_model()
}
