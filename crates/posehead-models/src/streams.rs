// SPDX-License-Identifier: AGPL-3.0-only

//! Plain-text sample streams
//!
//! Exported weights, biases and backbone features arrive as whitespace
//! separated integers. The PLIO form used by stream-fed simulation writes
//! eight samples per line, zero-padded to a whole line.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use posehead_chip::SAMPLES_PER_WORD;

use crate::error::{ModelError, Result};
use crate::loading::write_atomic;

/// Parse whitespace-separated integers into Q15 samples.
///
/// `origin` labels parse errors.
///
/// # Errors
///
/// Returns error on a token that is not an integer in `i16` range.
pub fn parse_q15_text(origin: &Path, text: &str) -> Result<Vec<i16>> {
    text.split_whitespace()
        .enumerate()
        .map(|(i, token)| {
            token.parse::<i16>().map_err(|e| {
                ModelError::parse_error(origin, format!("token {i} '{token}': {e}"))
            })
        })
        .collect()
}

/// Read a text stream file.
///
/// # Errors
///
/// Returns [`ModelError::FileNotFound`] if the file is missing, or a parse
/// error on a malformed token.
pub fn read_q15_text(path: impl AsRef<Path>) -> Result<Vec<i16>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ModelError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => e.into(),
    })?;
    let samples = parse_q15_text(path, &text)?;
    tracing::debug!("{}: {} samples", path.display(), samples.len());
    Ok(samples)
}

/// Render samples as PLIO text: eight per line, last line zero-padded.
pub fn format_plio(samples: &[i16]) -> String {
    let mut text = String::with_capacity(samples.len() * 7);
    for chunk in samples.chunks(SAMPLES_PER_WORD) {
        let mut line = [0i16; SAMPLES_PER_WORD];
        line[..chunk.len()].copy_from_slice(chunk);
        let mut sep = "";
        for s in line {
            let _ = write!(text, "{sep}{s}");
            sep = " ";
        }
        text.push('\n');
    }
    text
}

/// Write samples as a PLIO text file.
///
/// # Errors
///
/// Returns error if the file cannot be written.
pub fn write_plio_txt(path: impl AsRef<Path>, samples: &[i16]) -> Result<()> {
    write_atomic(path.as_ref(), format_plio(samples).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_whitespace() {
        let s = parse_q15_text(Path::new("<memory>"), " 1\t-2\n\n32767 -32768\r\n").unwrap();
        assert_eq!(s, vec![1, -2, 32767, -32768]);
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        let origin = Path::new("w.txt");
        let err = parse_q15_text(origin, "1 32768").unwrap_err();
        assert!(err.to_string().contains("token 1 '32768'"), "{err}");
        assert!(parse_q15_text(origin, "1 x").is_err());
        assert!(parse_q15_text(origin, "1.5").is_err());
    }

    #[test]
    fn plio_pads_last_line() {
        let samples: Vec<i16> = (1..=10).collect();
        assert_eq!(format_plio(&samples), "1 2 3 4 5 6 7 8\n9 10 0 0 0 0 0 0\n");
        assert_eq!(format_plio(&[]), "");
    }

    #[test]
    fn plio_file_reads_back_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flag_feat.txt");
        write_plio_txt(&path, &[7, -7, 3]).unwrap();
        assert_eq!(read_q15_text(&path).unwrap(), vec![7, -7, 3, 0, 0, 0, 0, 0]);
    }
}
