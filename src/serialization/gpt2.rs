//! GPT-2 style `vocab.json` / `merges.txt` export.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::{Map, Value};

use crate::bytes::bytes_to_unicode;
use crate::error::{Result, TbpeError};
use crate::model::BpeModel;

/// Header line written at the top of `merges.txt`.
pub const MERGES_HEADER: &str = "#version: 0.2";

/// Serialises the vocabulary as a JSON object mapping byte-level token strings to ids.
///
/// Special tokens are written verbatim. When two ids share the same bytes only the lowest id is
/// kept, since the format cannot represent duplicates.
pub fn vocab_json(model: &BpeModel, pretty: bool) -> Result<String> {
    let specials_start = model.first_merge_id() - model.special_tokens().len();
    let mut map = Map::with_capacity(model.vocab_size());
    let mut duplicates = 0usize;
    for (id, bytes) in model.vocab().iter().enumerate() {
        let key = if id >= specials_start && id < model.first_merge_id() {
            model.special_tokens()[id - specials_start].clone()
        } else {
            bytes_to_unicode(bytes)
        };
        if map.contains_key(&key) {
            duplicates += 1;
            continue;
        }
        map.insert(key, Value::from(id));
    }
    if duplicates > 0 {
        warn!("{duplicates} tokens share bytes with an earlier id and were left out of vocab.json");
    }
    let value = Value::Object(map);
    let json = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    Ok(json)
}

/// Renders the merge list as `merges.txt`, one `left right` line per merge in rank order.
#[must_use]
pub fn merges_txt(model: &BpeModel) -> String {
    let mut out = String::from(MERGES_HEADER);
    out.push('\n');
    for (left, right) in model.merges() {
        out.push_str(&bytes_to_unicode(left));
        out.push(' ');
        out.push_str(&bytes_to_unicode(right));
        out.push('\n');
    }
    out
}

/// Writes `<prefix>vocab.json` and `<prefix>merges.txt` into `dir`, returning both paths.
pub fn save_vocab_and_merges<P: AsRef<Path>>(
    model: &BpeModel,
    dir: P,
    prefix: &str,
) -> Result<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|err| TbpeError::io(err, Some(dir.to_path_buf())))?;
    let vocab_path = dir.join(format!("{prefix}vocab.json"));
    let merges_path = dir.join(format!("{prefix}merges.txt"));
    fs::write(&vocab_path, vocab_json(model, true)?)
        .map_err(|err| TbpeError::io(err, Some(vocab_path.clone())))?;
    fs::write(&merges_path, merges_txt(model))
        .map_err(|err| TbpeError::io(err, Some(merges_path.clone())))?;
    Ok((vocab_path, merges_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TokenId;
    use tempfile::tempdir;

    fn model() -> BpeModel {
        let mut vocab: Vec<Vec<u8>> = (0u8..=u8::MAX).map(|b| vec![b]).collect();
        vocab.push(b"<|endoftext|>".to_vec());
        vocab.push(b" t".to_vec());
        vocab.push(b" th".to_vec());
        let space = TokenId::from(b' ');
        BpeModel::new(
            vocab,
            vec![(space, TokenId::from(b't')), (257, TokenId::from(b'h'))],
            vec!["<|endoftext|>".into()],
        )
        .expect("model")
    }

    #[test]
    fn merges_use_byte_level_strings() {
        let text = merges_txt(&model());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![MERGES_HEADER, "\u{0120} t", "\u{0120}t h"]);
    }

    #[test]
    fn vocab_maps_strings_to_ids() {
        let json = vocab_json(&model(), false).expect("json");
        let value: Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["<|endoftext|>"], 256);
        assert_eq!(value["\u{0120}th"], 258);
        assert_eq!(value["a"], u64::from(b'a'));
        assert_eq!(value.as_object().map(Map::len), Some(259));
    }

    #[test]
    fn files_are_written_with_prefix() {
        let dir = tempdir().expect("tempdir");
        let (vocab, merges) =
            save_vocab_and_merges(&model(), dir.path().join("out"), "tiny-").expect("save");
        assert!(vocab.ends_with("tiny-vocab.json"));
        assert!(fs::read_to_string(merges)
            .expect("merges")
            .starts_with(MERGES_HEADER));
    }
}
