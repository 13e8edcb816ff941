// SPDX-License-Identifier: AGPL-3.0-only

//! Bounded word channels
//!
//! Every edge of the overlay graph is a bounded single-producer,
//! single-consumer FIFO of 128-bit words:
//!
//! ```text
//! host memory ──feat_mover──► [feature ch] ──SampleReader──► LinearHead
//! host memory ──weight_mover─► [weight ch]  ──SampleReader──►    │
//! host memory ◄─output_mover── [output ch]  ◄─SampleWriter───────┘
//! ```
//!
//! Reads block until a word arrives, writes block until there is capacity.
//! Both give up at the pass deadline, so a stalled pipeline surfaces as
//! [`PoseHeadError::Timeout`] instead of hanging the host. A dropped peer
//! surfaces as [`PoseHeadError::StreamClosed`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use posehead_chip::word::{unpack_word, with_lane};
use posehead_chip::{Word, SAMPLES_PER_WORD, WORD_BITS};

use crate::error::{PoseHeadError, Result, StreamFault};

/// Default channel depth in words (matches the reference GMIO depth).
pub const DEFAULT_DEPTH: usize = 1000;

/// Absolute point in time after which blocking channel operations fail.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        // Durations too large to represent collapse to one day.
        let at = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + Duration::from_secs(86_400));
        Self { started, at }
    }

    /// The instant at which the deadline expires.
    pub const fn instant(&self) -> Instant {
        self.at
    }

    /// Milliseconds since the deadline was armed.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Declared shape of one channel.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    /// Channel name (`<head>.<port>`), used in errors and logs
    pub name: String,
    /// Capacity in words
    pub depth: usize,
}

impl ChannelSpec {
    /// Channel with the default depth.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depth: DEFAULT_DEPTH,
        }
    }

    /// Override the capacity.
    #[must_use]
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Element width in bits.
    pub const fn width_bits(&self) -> u32 {
        WORD_BITS
    }

    /// Create both ends of the channel, bound to `deadline`.
    pub fn open(&self, deadline: Deadline) -> (StreamWriter, StreamReader) {
        let (tx, rx) = bounded(self.depth);
        let name: Arc<str> = Arc::from(self.name.as_str());
        tracing::trace!("Opened channel {} ({} × {}b)", name, self.depth, self.width_bits());
        (
            StreamWriter {
                name: Arc::clone(&name),
                tx,
                deadline,
                moved: 0,
            },
            StreamReader {
                name,
                rx,
                deadline,
                moved: 0,
            },
        )
    }
}

/// Producer end of a word channel.
#[derive(Debug)]
pub struct StreamWriter {
    name: Arc<str>,
    tx: Sender<Word>,
    deadline: Deadline,
    moved: usize,
}

impl StreamWriter {
    /// Push one word, blocking until there is capacity.
    ///
    /// # Errors
    ///
    /// Returns error if the reader is gone or the deadline passes.
    pub fn write(&mut self, word: Word) -> Result<()> {
        match self.tx.send_deadline(word, self.deadline.instant()) {
            Ok(()) => {
                self.moved += 1;
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                Err(PoseHeadError::timeout(&*self.name, self.deadline.elapsed_ms()))
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(PoseHeadError::stream_closed(
                &*self.name,
                StreamFault::Overflow,
                self.moved,
            )),
        }
    }

    /// Words written so far.
    pub const fn moved(&self) -> usize {
        self.moved
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Consumer end of a word channel.
#[derive(Debug)]
pub struct StreamReader {
    name: Arc<str>,
    rx: Receiver<Word>,
    deadline: Deadline,
    moved: usize,
}

impl StreamReader {
    /// Pop one word, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns error if the stream is drained and its writer gone, or the
    /// deadline passes.
    pub fn read(&mut self) -> Result<Word> {
        match self.rx.recv_deadline(self.deadline.instant()) {
            Ok(word) => {
                self.moved += 1;
                Ok(word)
            }
            Err(RecvTimeoutError::Timeout) => {
                Err(PoseHeadError::timeout(&*self.name, self.deadline.elapsed_ms()))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PoseHeadError::stream_closed(
                &*self.name,
                StreamFault::Underflow,
                self.moved,
            )),
        }
    }

    /// Words read so far.
    pub const fn moved(&self) -> usize {
        self.moved
    }

    /// Words queued and not yet read.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Unpacks a word stream into Q15 samples with a monotonic cursor.
#[derive(Debug)]
pub struct SampleReader {
    words: StreamReader,
    lanes: [i16; SAMPLES_PER_WORD],
    next_lane: usize,
    consumed: usize,
}

impl SampleReader {
    /// Wrap a word reader.
    pub fn new(words: StreamReader) -> Self {
        Self {
            words,
            lanes: [0; SAMPLES_PER_WORD],
            next_lane: SAMPLES_PER_WORD,
            consumed: 0,
        }
    }

    /// Read the next sample, pulling a new word when the current one is spent.
    ///
    /// # Errors
    ///
    /// Propagates the underlying word read error.
    pub fn read(&mut self) -> Result<i16> {
        if self.next_lane == SAMPLES_PER_WORD {
            self.lanes = unpack_word(self.words.read()?);
            self.next_lane = 0;
        }
        let sample = self.lanes[self.next_lane];
        self.next_lane += 1;
        self.consumed += 1;
        Ok(sample)
    }

    /// Samples consumed so far (the cursor position).
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// Underlying word reader.
    pub const fn words(&self) -> &StreamReader {
        &self.words
    }
}

/// Packs Q15 samples into words, flushing a zero-filled tail on [`finish`](Self::finish).
#[derive(Debug)]
pub struct SampleWriter {
    words: StreamWriter,
    pending: Word,
    filled: usize,
    produced: usize,
}

impl SampleWriter {
    /// Wrap a word writer.
    pub fn new(words: StreamWriter) -> Self {
        Self {
            words,
            pending: 0,
            filled: 0,
            produced: 0,
        }
    }

    /// Append one sample; a full word is pushed immediately.
    ///
    /// # Errors
    ///
    /// Propagates the underlying word write error.
    pub fn write(&mut self, sample: i16) -> Result<()> {
        self.pending = with_lane(self.pending, self.filled, sample);
        self.filled += 1;
        self.produced += 1;
        if self.filled == SAMPLES_PER_WORD {
            self.push_pending()?;
        }
        Ok(())
    }

    /// Push a partially filled word, zero-filling the unused lanes.
    ///
    /// # Errors
    ///
    /// Propagates the underlying word write error.
    pub fn finish(&mut self) -> Result<()> {
        if self.filled > 0 {
            self.push_pending()?;
        }
        Ok(())
    }

    fn push_pending(&mut self) -> Result<()> {
        let word = std::mem::take(&mut self.pending);
        self.filled = 0;
        self.words.write(word)
    }

    /// Samples accepted so far.
    pub const fn produced(&self) -> usize {
        self.produced
    }

    /// Underlying word writer.
    pub const fn words(&self) -> &StreamWriter {
        &self.words
    }
}
