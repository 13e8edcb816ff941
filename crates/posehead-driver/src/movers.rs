// SPDX-License-Identifier: AGPL-3.0-only

//! Word transducers between linear memory and word streams
//!
//! Three transducers, identical except for direction:
//!
//! | Transducer | Direction | Carries |
//! |------------|-----------|---------|
//! | [`feat_mover`] | memory → stream | feature vector |
//! | [`weight_mover`] | memory → stream | packed FC weight rows |
//! | [`output_mover`] | stream → memory | padded output frame |
//!
//! Word `i` read is word `i` written. The `(start_addr, num_words)` window
//! is checked against the memory region before the first word moves, so
//! an out-of-range request fails with [`PoseHeadError::BoundsViolation`]
//! and leaves memory and stream untouched.

use posehead_chip::Word;
use tracing::trace;

use crate::error::{PoseHeadError, Result};
use crate::stream::{StreamReader, StreamWriter};

fn checked_window(
    op: &'static str,
    len: usize,
    num_words: usize,
    start_addr: usize,
) -> Result<std::ops::Range<usize>> {
    match start_addr.checked_add(num_words) {
        Some(end) if end <= len => Ok(start_addr..end),
        _ => Err(PoseHeadError::BoundsViolation {
            op,
            start: start_addr,
            count: num_words,
            len,
        }),
    }
}

fn memory_to_stream(
    op: &'static str,
    mem: &[Word],
    out: &mut StreamWriter,
    num_words: usize,
    start_addr: usize,
) -> Result<()> {
    let window = checked_window(op, mem.len(), num_words, start_addr)?;
    trace!("{op}: {num_words} words from @{start_addr} → {}", out.name());
    for &word in &mem[window] {
        out.write(word)?;
    }
    Ok(())
}

/// Stream `num_words` feature words starting at `mem[start_addr]`.
///
/// # Errors
///
/// Returns error if the window exceeds `mem`, the reader goes away, or the
/// pass deadline passes.
pub fn feat_mover(
    mem: &[Word],
    out: &mut StreamWriter,
    num_words: usize,
    start_addr: usize,
) -> Result<()> {
    memory_to_stream("feat_mover", mem, out, num_words, start_addr)
}

/// Stream `num_words` weight words starting at `mem[start_addr]`.
///
/// # Errors
///
/// Returns error if the window exceeds `mem`, the reader goes away, or the
/// pass deadline passes.
pub fn weight_mover(
    mem: &[Word],
    out: &mut StreamWriter,
    num_words: usize,
    start_addr: usize,
) -> Result<()> {
    memory_to_stream("weight_mover", mem, out, num_words, start_addr)
}

/// Drain `num_words` words from `input` into `mem[start_addr..]`.
///
/// Words received before a failure are already written to memory; the
/// caller must treat the region as incomplete.
///
/// # Errors
///
/// Returns error if the window exceeds `mem`, the stream runs dry before
/// `num_words` words, or the pass deadline passes.
pub fn output_mover(
    input: &mut StreamReader,
    mem: &mut [Word],
    num_words: usize,
    start_addr: usize,
) -> Result<()> {
    let window = checked_window("output_mover", mem.len(), num_words, start_addr)?;
    trace!("output_mover: {num_words} words {} → @{start_addr}", input.name());
    for slot in &mut mem[window] {
        *slot = input.read()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ChannelSpec, Deadline};
    use std::time::Duration;

    const MEM_SIZE: usize = 64;

    fn open(depth: usize) -> (StreamWriter, StreamReader) {
        ChannelSpec::new("test.movers")
            .with_depth(depth)
            .open(Deadline::after(Duration::from_secs(5)))
    }

    #[test]
    fn feat_mover_streams_window() {
        let mem: Vec<Word> = (0..MEM_SIZE as u128).collect();
        let (mut tx, mut rx) = open(MEM_SIZE);
        feat_mover(&mem, &mut tx, 16, 4).unwrap();
        for i in 0..16u128 {
            assert_eq!(rx.read().unwrap(), 4 + i);
        }
        assert_eq!(rx.pending(), 0);
    }

    #[test]
    fn weight_mover_streams_window() {
        let mem: Vec<Word> = (0..MEM_SIZE as u128).map(|i| 1000 + i).collect();
        let (mut tx, mut rx) = open(MEM_SIZE);
        weight_mover(&mem, &mut tx, 16, 2).unwrap();
        for i in 0..16u128 {
            assert_eq!(rx.read().unwrap(), 1000 + 2 + i);
        }
    }

    #[test]
    fn output_mover_fills_window() {
        let mut mem = vec![0 as Word; MEM_SIZE];
        let (mut tx, mut rx) = open(MEM_SIZE);
        for i in 0..16u128 {
            tx.write(2000 + i).unwrap();
        }
        output_mover(&mut rx, &mut mem, 16, 8).unwrap();
        for i in 0..16 {
            assert_eq!(mem[8 + i], 2000 + i as u128);
        }
        assert!(mem[..8].iter().all(|&w| w == 0));
        assert!(mem[24..].iter().all(|&w| w == 0));
    }

    #[test]
    fn round_trip_through_both_directions() {
        let src: Vec<Word> = (0..MEM_SIZE as u128).map(|i| i * 0x1_0001 + (i << 100)).collect();
        for (n, s, d) in [(0, 0, 0), (1, 63, 0), (16, 5, 40), (64, 0, 0), (10, 54, 3)] {
            let mut dst = vec![0 as Word; MEM_SIZE];
            let (mut tx, mut rx) = open(MEM_SIZE);
            feat_mover(&src, &mut tx, n, s).unwrap();
            output_mover(&mut rx, &mut dst, n, d).unwrap();
            assert_eq!(&dst[d..d + n], &src[s..s + n], "N={n} S={s} D={d}");
            assert_eq!(rx.pending(), 0);
        }
    }

    #[test]
    fn zero_words_is_a_no_op() {
        let mut mem = vec![9 as Word; 4];
        let (mut tx, mut rx) = open(1);
        feat_mover(&mem.clone(), &mut tx, 0, 4).unwrap();
        output_mover(&mut rx, &mut mem, 0, 4).unwrap();
        assert_eq!(tx.moved(), 0);
        assert_eq!(mem, vec![9; 4]);
    }

    #[test]
    fn out_of_range_window_is_rejected_before_moving() {
        let mem = vec![1 as Word; 8];
        let (mut tx, rx) = open(16);
        let err = weight_mover(&mem, &mut tx, 4, 6).unwrap_err();
        assert!(matches!(
            err,
            PoseHeadError::BoundsViolation { op: "weight_mover", start: 6, count: 4, len: 8 }
        ));
        assert_eq!(rx.pending(), 0);

        let err = feat_mover(&mem, &mut tx, usize::MAX, 2).unwrap_err();
        assert!(matches!(err, PoseHeadError::BoundsViolation { .. }));
    }

    #[test]
    fn output_mover_rejects_window_past_end() {
        let mut mem = vec![0 as Word; 8];
        let (_tx, mut rx) = open(1);
        let err = output_mover(&mut rx, &mut mem, 9, 0).unwrap_err();
        assert!(matches!(err, PoseHeadError::BoundsViolation { op: "output_mover", .. }));
    }

    #[test]
    fn output_mover_reports_underflow() {
        let mut mem = vec![0 as Word; 8];
        let (mut tx, mut rx) = open(8);
        tx.write(5).unwrap();
        drop(tx);
        let err = output_mover(&mut rx, &mut mem, 4, 0).unwrap_err();
        assert!(err.is_secondary());
        assert_eq!(mem[0], 5);
    }
}
