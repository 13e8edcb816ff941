// SPDX-License-Identifier: AGPL-3.0-only

//! Q15 blob and text I/O
//!
//! Binary artifacts are flat little-endian `i16` arrays with no header.
//! Result files are one decimal sample per line. Every write goes to a
//! hidden sibling first and is renamed into place, so a reader never sees a
//! truncated artifact under its final name.

use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{ModelError, Result};

/// Read a whole artifact file.
///
/// # Errors
///
/// Returns [`ModelError::FileNotFound`] if the file does not exist, or an
/// I/O error if it cannot be read.
pub fn read_blob(path: impl AsRef<Path>) -> Result<Bytes> {
    let path = path.as_ref();
    match fs::read(path) {
        Ok(data) => {
            debug!("Read {} ({} bytes)", path.display(), data.len());
            Ok(Bytes::from(data))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ModelError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Decode `elems` little-endian samples from the front of `data`.
///
/// Returns `None` if `data` is too short.
pub fn decode_q15(data: &[u8], elems: usize) -> Option<Vec<i16>> {
    let mut buf = data.get(..elems.checked_mul(2)?)?;
    Some((0..elems).map(|_| buf.get_i16_le()).collect())
}

/// Encode samples as a flat little-endian blob.
pub fn encode_q15(samples: &[i16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &s in samples {
        buf.put_i16_le(s);
    }
    buf.freeze()
}

/// Load the first `elems` samples of a Q15 blob. Trailing bytes are ignored.
///
/// # Errors
///
/// Returns [`ModelError::FileNotFound`] or [`ModelError::FileTooSmall`].
pub fn load_q15_bin(path: impl AsRef<Path>, elems: usize) -> Result<Vec<i16>> {
    let path = path.as_ref();
    let data = read_blob(path)?;
    decode_q15(&data, elems).ok_or_else(|| ModelError::FileTooSmall {
        path: path.to_path_buf(),
        have: data.len(),
        need: elems.saturating_mul(2),
    })
}

/// Write samples as a Q15 blob.
///
/// # Errors
///
/// Returns error if the file cannot be written.
pub fn write_q15_bin(path: impl AsRef<Path>, samples: &[i16]) -> Result<()> {
    write_atomic(path.as_ref(), &encode_q15(samples))
}

/// Write samples as text, one decimal per line.
///
/// # Errors
///
/// Returns error if the file cannot be written.
pub fn save_q15_txt(path: impl AsRef<Path>, samples: &[i16]) -> Result<()> {
    let mut text = String::with_capacity(samples.len() * 7);
    for s in samples {
        let _ = writeln!(text, "{s}");
    }
    write_atomic(path.as_ref(), text.as_bytes())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".partial");
    path.with_file_name(name)
}

/// Write `contents` to a hidden sibling, then rename it over `path`.
///
/// # Errors
///
/// Returns error if either step fails; the sibling is removed on failure.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let partial = partial_path(path);
    let result = fs::write(&partial, contents).and_then(|()| fs::rename(&partial, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    debug!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_round_trip_ignores_trailing_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_q15.bin");
        write_q15_bin(&path, &[1, -2, 32767, -32768, 5]).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 10);
        assert_eq!(load_q15_bin(&path, 4).unwrap(), vec![1, -2, 32767, -32768]);
    }

    #[test]
    fn blob_is_little_endian() {
        assert_eq!(&encode_q15(&[0x0102, -1])[..], &[0x02, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn missing_file_is_reported_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        match load_q15_bin(&path, 1).unwrap_err() {
            ModelError::FileNotFound { path: p } => assert_eq!(p, path),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn short_file_reports_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        fs::write(&path, [0u8; 7]).unwrap();
        let err = load_q15_bin(&path, 4).unwrap_err();
        assert!(matches!(err, ModelError::FileTooSmall { have: 7, need: 8, .. }), "{err}");
    }

    #[test]
    fn text_is_one_sample_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        save_q15_txt(&path, &[20, -3, 0]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "20\n-3\n0\n");
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("out.txt");
        assert!(save_q15_txt(&path, &[1]).is_err());
        assert!(!path.exists());
    }
}
