//! GPT-2 byte-level alphabet used when token byte strings are written as text.
//!
//! Every byte maps to a printable code point, so tokens containing spaces, control bytes or
//! partial UTF-8 sequences survive in `vocab.json` and `merges.txt`.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Result, TbpeError};

fn byte_level_tables() -> &'static ([char; 256], HashMap<char, u8>) {
    static TABLES: OnceLock<([char; 256], HashMap<char, u8>)> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut forward = ['\0'; 256];
        let mut reverse = HashMap::with_capacity(256);
        let mut printable = [false; 256];
        for byte in (b'!'..=b'~').chain(0xA1..=0xAC).chain(0xAE..=0xFF) {
            printable[byte as usize] = true;
        }
        let mut shifted = 0u32;
        for byte in 0u8..=u8::MAX {
            let codepoint = if printable[byte as usize] {
                u32::from(byte)
            } else {
                shifted += 1;
                255 + shifted
            };
            // Both ranges are valid scalar values below the surrogate block.
            let ch = char::from_u32(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER);
            forward[byte as usize] = ch;
            reverse.insert(ch, byte);
        }
        (forward, reverse)
    })
}

/// Converts raw bytes into their byte-level string form.
#[must_use]
pub fn bytes_to_unicode(bytes: &[u8]) -> String {
    let (forward, _) = byte_level_tables();
    bytes.iter().map(|&b| forward[b as usize]).collect()
}

/// Converts a byte-level string produced by [`bytes_to_unicode`] back to raw bytes.
pub fn unicode_to_bytes(text: &str) -> Result<Vec<u8>> {
    let (_, reverse) = byte_level_tables();
    text.chars()
        .map(|c| {
            reverse.get(&c).copied().ok_or_else(|| {
                TbpeError::Serialization(format!(
                    "unknown byte-level code point: U+{:04X}",
                    c as u32
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_level_round_trip() {
        let bytes: Vec<u8> = (0..=u8::MAX).collect();
        let text = bytes_to_unicode(&bytes);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(unicode_to_bytes(&text).expect("decode"), bytes);
    }

    #[test]
    fn gpt2_alphabet_landmarks() {
        assert_eq!(bytes_to_unicode(b" "), "\u{0120}");
        assert_eq!(bytes_to_unicode(b"\n"), "\u{010A}");
        assert_eq!(bytes_to_unicode(b"hi"), "hi");
        assert!(!bytes_to_unicode(b"a b").contains(' '));
    }

    #[test]
    fn unknown_code_points_are_rejected() {
        assert!(matches!(
            unicode_to_bytes("\u{4E2D}"),
            Err(TbpeError::Serialization(_))
        ));
    }
}
