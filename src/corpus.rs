//! Facilities for splitting corpus files into document-aligned byte ranges.
//!
//! Boundaries are placed on the first byte of a document separator, so every range except the
//! first starts with a separator and no range ends inside a document.  Ranges can then be
//! pre-tokenized independently without a pre-token ever straddling two workers.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use bstr::ByteSlice;
use log::debug;

use crate::error::{Result, TbpeError};

/// Computes sorted, deduplicated byte offsets `[0, .., len]` splitting the reader into at most
/// `desired_chunks` ranges whose interior boundaries sit on a `separator` occurrence.
///
/// Each interior guess is advanced in `read_ahead` sized windows until the separator is found or
/// the end of input is reached, in which case it collapses onto the input length.  Fewer ranges
/// than requested are returned when the input holds fewer documents than chunks.
pub fn find_chunk_boundaries<R: Read + Seek>(
    reader: &mut R,
    desired_chunks: usize,
    separator: &[u8],
    read_ahead: usize,
) -> Result<Vec<u64>> {
    validate_request(desired_chunks, separator, read_ahead)?;
    scan_boundaries(reader, desired_chunks, separator, read_ahead)
        .map_err(|err| TbpeError::io(err, None))
}

/// Opens `path` and resolves its chunk boundaries with [`find_chunk_boundaries`].
pub fn file_chunk_boundaries<P: AsRef<Path>>(
    path: P,
    desired_chunks: usize,
    separator: &[u8],
    read_ahead: usize,
) -> Result<Vec<u64>> {
    let path = path.as_ref();
    validate_request(desired_chunks, separator, read_ahead)?;
    let mut file = File::open(path).map_err(|err| TbpeError::io(err, Some(path.to_path_buf())))?;
    let boundaries = scan_boundaries(&mut file, desired_chunks, separator, read_ahead)
        .map_err(|err| TbpeError::io(err, Some(path.to_path_buf())))?;
    debug!(
        "resolved {} ranges (requested {desired_chunks}) for {}",
        boundaries.len().saturating_sub(1),
        path.display()
    );
    Ok(boundaries)
}

/// Pairs consecutive boundaries into half-open ranges.
#[must_use]
pub fn chunk_ranges(boundaries: &[u64]) -> Vec<Range<u64>> {
    boundaries
        .windows(2)
        .map(|window| window[0]..window[1])
        .collect()
}

/// Reads the bytes of `range` from the file at `path`.
pub fn read_range<P: AsRef<Path>>(path: P, range: Range<u64>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let len = usize::try_from(range.end.saturating_sub(range.start))
        .map_err(|_| TbpeError::Internal(format!("range {range:?} does not fit in memory")))?;
    let mut file = File::open(path).map_err(|err| TbpeError::io(err, Some(path.to_path_buf())))?;
    file.seek(SeekFrom::Start(range.start))
        .map_err(|err| TbpeError::io(err, Some(path.to_path_buf())))?;
    let mut buffer = vec![0u8; len];
    file.read_exact(&mut buffer)
        .map_err(|err| TbpeError::io(err, Some(path.to_path_buf())))?;
    Ok(buffer)
}

fn validate_request(desired_chunks: usize, separator: &[u8], read_ahead: usize) -> Result<()> {
    if desired_chunks == 0 {
        return Err(TbpeError::InvalidConfig(
            "desired chunk count must be greater than zero".into(),
        ));
    }
    if separator.is_empty() {
        return Err(TbpeError::InvalidConfig(
            "document separator must not be empty".into(),
        ));
    }
    if read_ahead == 0 {
        return Err(TbpeError::InvalidConfig(
            "read-ahead window must be greater than zero".into(),
        ));
    }
    Ok(())
}

fn scan_boundaries<R: Read + Seek>(
    reader: &mut R,
    desired_chunks: usize,
    separator: &[u8],
    read_ahead: usize,
) -> io::Result<Vec<u64>> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    let chunk_size = file_size / desired_chunks as u64;

    let mut boundaries: Vec<u64> = (0..=desired_chunks as u64)
        .map(|i| i * chunk_size)
        .collect();
    if let Some(last) = boundaries.last_mut() {
        *last = file_size;
    }

    // Consecutive windows overlap so a separator straddling two reads is still found.
    let mut window = vec![0u8; read_ahead + separator.len() - 1];
    for boundary in boundaries.iter_mut().take(desired_chunks).skip(1) {
        let mut position = *boundary;
        *boundary = loop {
            reader.seek(SeekFrom::Start(position))?;
            let read = fill_window(reader, &mut window)?;
            if let Some(found) = window[..read].find(separator) {
                break position + found as u64;
            }
            if read < window.len() {
                break file_size;
            }
            position += read_ahead as u64;
        };
    }

    boundaries.sort_unstable();
    boundaries.dedup();
    Ok(boundaries)
}

fn fill_window<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0usize;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    const SEP: &[u8] = b"<|endoftext|>";

    fn corpus(documents: &[&str]) -> Vec<u8> {
        let mut data = Vec::new();
        for (idx, doc) in documents.iter().enumerate() {
            if idx > 0 {
                data.extend_from_slice(SEP);
            }
            data.extend_from_slice(doc.as_bytes());
        }
        data
    }

    fn document_spans(data: &[u8]) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut start = 0usize;
        for found in data.find_iter(SEP) {
            spans.push(start..found);
            start = found + SEP.len();
        }
        spans.push(start..data.len());
        spans
    }

    #[test]
    fn boundaries_never_fall_inside_a_document() {
        let docs = [
            "the quick brown fox",
            "jumps over",
            "the lazy dog and keeps running for a while",
            "",
            "short",
            "a somewhat longer closing document with trailing text",
        ];
        let data = corpus(&docs);
        let spans = document_spans(&data);
        for chunks in 1..=12 {
            for read_ahead in [1usize, 3, 7, 64, 4096] {
                let boundaries =
                    find_chunk_boundaries(&mut Cursor::new(&data), chunks, SEP, read_ahead)
                        .expect("boundaries");
                assert_eq!(boundaries.first(), Some(&0));
                assert_eq!(boundaries.last(), Some(&(data.len() as u64)));
                assert!(boundaries.len() <= chunks + 1);
                assert!(boundaries.windows(2).all(|w| w[0] < w[1]));
                for &boundary in &boundaries {
                    let b = boundary as usize;
                    assert!(
                        !spans.iter().any(|span| span.start < b && b < span.end),
                        "boundary {b} splits a document (chunks={chunks}, read_ahead={read_ahead})"
                    );
                }
            }
        }
    }

    #[test]
    fn interior_boundaries_start_on_separator() {
        let data = corpus(&["alpha beta", "gamma delta", "epsilon"]);
        let boundaries =
            find_chunk_boundaries(&mut Cursor::new(&data), 3, SEP, 4).expect("boundaries");
        for &boundary in &boundaries[1..boundaries.len() - 1] {
            assert!(data[boundary as usize..].starts_with(SEP));
        }
    }

    #[test]
    fn fewer_ranges_when_documents_are_scarce() {
        let data = corpus(&["only", "two"]);
        let boundaries =
            find_chunk_boundaries(&mut Cursor::new(&data), 8, SEP, 4096).expect("boundaries");
        assert_eq!(boundaries, vec![0, 4, data.len() as u64]);
    }

    #[test]
    fn single_document_yields_single_range() {
        let data = b"no separator anywhere in this text".to_vec();
        let boundaries =
            find_chunk_boundaries(&mut Cursor::new(&data), 4, SEP, 8).expect("boundaries");
        assert_eq!(boundaries, vec![0, data.len() as u64]);
        assert_eq!(chunk_ranges(&boundaries), vec![0..data.len() as u64]);
    }

    #[test]
    fn empty_input_has_no_ranges() {
        let boundaries =
            find_chunk_boundaries(&mut Cursor::new(Vec::<u8>::new()), 4, SEP, 8).expect("empty");
        assert_eq!(boundaries, vec![0]);
        assert!(chunk_ranges(&boundaries).is_empty());
    }

    #[test]
    fn rejects_degenerate_requests() {
        let mut cursor = Cursor::new(b"abc".to_vec());
        assert!(matches!(
            find_chunk_boundaries(&mut cursor, 0, SEP, 8),
            Err(TbpeError::InvalidConfig(_))
        ));
        assert!(matches!(
            find_chunk_boundaries(&mut cursor, 2, b"", 8),
            Err(TbpeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn file_boundaries_and_range_reads_cover_the_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("corpus.txt");
        let data = corpus(&["one two", "three four", "five six", "seven"]);
        fs::write(&path, &data).expect("write corpus");

        let boundaries = file_chunk_boundaries(&path, 3, SEP, 5).expect("boundaries");
        let mut rebuilt = Vec::new();
        for range in chunk_ranges(&boundaries) {
            rebuilt.extend(read_range(&path, range).expect("read range"));
        }
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("missing.txt");
        match file_chunk_boundaries(&path, 2, SEP, 16) {
            Err(TbpeError::Io { path: Some(p), .. }) => assert_eq!(p, path),
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
