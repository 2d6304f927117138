//! Frame encoding and incremental frame extraction
//!
//! On the wire a frame is:
//!
//! | Field    | Bytes    | Notes                                  |
//! | -------- | -------- | -------------------------------------- |
//! | SOF      | 1        | never escaped                          |
//! | payload  | variable | escaped                                |
//! | checksum | 2        | Fletcher-16 of the payload, low first, escaped |
//! | EOF      | 1        | never escaped                          |
//!
//! Any payload or checksum byte equal to SOF, EOF or ESC is sent as `ESC, byte ^ 0x20`.
use defmt_or_log::{debug, trace};
use snafu::Snafu;

use crate::{
    constants::{is_reserved, EOF, ESC, ESC_XOR, SOF},
    fletcher::fletcher16,
};

/// Reasons a frame is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum FrameError {
    /// The received checksum does not match the one computed over the payload
    #[snafu(display("Checksum mismatch: received 0x{received:04x}, computed 0x{computed:04x}"))]
    ChecksumMismatch {
        /// Checksum carried by the frame
        received: u16,
        /// Checksum computed over the unescaped payload
        computed: u16,
    },
    /// An ESC byte was the last byte before EOF
    MalformedEscape,
    /// A new SOF arrived before the EOF of the frame in progress
    Truncated,
    /// The frame is too short to contain a checksum
    TooShort,
    /// The frame does not fit in the provided buffer
    #[snafu(display("Frame of {len} bytes does not fit in {capacity} bytes"))]
    Oversize {
        /// Number of bytes required
        len: usize,
        /// Number of bytes available
        capacity: usize,
    },
    /// The accumulation buffer filled up without a complete frame and was discarded
    Overrun,
}

/// One transmit unit of a frame
///
/// The framer waits for transport space before each unit, so a unit is never split across a
/// full transmit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUnit {
    /// An unescaped SOF or EOF delimiter
    Delimiter(u8),
    /// A payload or checksum byte, escaped if necessary
    Data(Stuffed),
}

impl FrameUnit {
    /// The bytes to put on the wire for this unit
    pub fn bytes(&self) -> &[u8] {
        match self {
            FrameUnit::Delimiter(b) => core::slice::from_ref(b),
            FrameUnit::Data(stuffed) => stuffed.as_slice(),
        }
    }

    /// Transmit space to wait for before emitting this unit
    ///
    /// Data bytes always reserve room for an escape pair.
    pub fn reserve(&self) -> usize {
        match self {
            FrameUnit::Delimiter(_) => 1,
            FrameUnit::Data(_) => 2,
        }
    }
}

/// A byte after escaping: either itself, or an ESC pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stuffed {
    bytes: [u8; 2],
    len: u8,
}

impl Stuffed {
    /// Escape `byte` if it collides with a reserved marker
    pub const fn new(byte: u8) -> Self {
        if is_reserved(byte) {
            Self {
                bytes: [ESC, byte ^ ESC_XOR],
                len: 2,
            }
        } else {
            Self {
                bytes: [byte, 0],
                len: 1,
            }
        }
    }

    /// The one or two bytes to transmit
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Iterate over the transmit units of the frame carrying `payload`
pub fn frame_units(payload: &[u8]) -> impl Iterator<Item = FrameUnit> + '_ {
    let checksum = fletcher16(payload).to_le_bytes();
    core::iter::once(FrameUnit::Delimiter(SOF))
        .chain(
            payload
                .iter()
                .copied()
                .chain(checksum)
                .map(|b| FrameUnit::Data(Stuffed::new(b))),
        )
        .chain(core::iter::once(FrameUnit::Delimiter(EOF)))
}

/// Worst case encoded size of a frame carrying `payload_len` bytes
pub const fn max_frame_len(payload_len: usize) -> usize {
    2 * (payload_len + 2) + 2
}

/// Encode a complete frame for `payload` into `out`, returning the number of bytes written
pub fn encode_frame(payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    let len: usize = frame_units(payload).map(|u| u.bytes().len()).sum();
    if len > out.len() {
        return OversizeSnafu {
            len,
            capacity: out.len(),
        }
        .fail();
    }
    let mut pos = 0;
    for unit in frame_units(payload) {
        let bytes = unit.bytes();
        out[pos..pos + bytes.len()].copy_from_slice(bytes);
        pos += bytes.len();
    }
    Ok(pos)
}

/// Counters describing what a [`FrameAccumulator`] has seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames which passed the checksum
    pub frames: u32,
    /// Frames dropped because of a checksum mismatch
    pub checksum_errors: u32,
    /// Frames dropped because they were truncated, too short, badly escaped or too large
    pub malformed: u32,
    /// Times the accumulation buffer filled without a complete frame
    pub overruns: u32,
    /// Bytes discarded while searching for SOF
    pub noise_bytes: u32,
}

/// Bounded receive buffer which reassembles frames from arbitrarily split reads
///
/// Bytes are appended with [`extend`](Self::extend) (or [`spare_mut`](Self::spare_mut) +
/// [`commit`](Self::commit) to read a transport directly into the buffer), and complete frames
/// are extracted with [`next_frame`](Self::next_frame).
#[derive(Debug, Clone)]
pub struct FrameAccumulator<const N: usize> {
    buf: [u8; N],
    len: usize,
    stats: FrameStats,
}

impl<const N: usize> Default for FrameAccumulator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameAccumulator<N> {
    /// Create an empty accumulator
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            stats: FrameStats {
                frames: 0,
                checksum_errors: 0,
                malformed: 0,
                overruns: 0,
                noise_bytes: 0,
            },
        }
    }

    /// Number of bytes which can still be appended
    pub fn free(&self) -> usize {
        N - self.len
    }

    /// The bytes received but not yet consumed
    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The unused tail of the buffer. Call [`commit`](Self::commit) after filling part of it.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Mark `n` bytes of the spare area as received
    pub fn commit(&mut self, n: usize) {
        self.len = (self.len + n).min(N);
    }

    /// Append as many of `bytes` as fit, returning the number appended
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.free());
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        n
    }

    /// Drop everything received so far
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Counters accumulated since creation
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Extract the next complete frame, writing its unescaped payload into `out`
    ///
    /// Returns `Ok(None)` while no complete frame is buffered. A frame which is rejected is
    /// still consumed, and the error is returned so the caller can count it; bytes following
    /// it stay buffered for the next call.
    pub fn next_frame(&mut self, out: &mut [u8]) -> Result<Option<usize>, FrameError> {
        // Discard everything ahead of the first SOF
        let Some(sof) = self.pending().iter().position(|b| *b == SOF) else {
            if self.len > 0 {
                trace!("Discarding {} noise bytes", self.len);
                self.stats.noise_bytes = self.stats.noise_bytes.wrapping_add(self.len as u32);
                self.len = 0;
            }
            return Ok(None);
        };
        if sof > 0 {
            trace!("Discarding {} noise bytes", sof);
            self.stats.noise_bytes = self.stats.noise_bytes.wrapping_add(sof as u32);
            self.consume(sof);
        }

        // Find the end of the frame which starts at index 0
        let end = self.pending()[1..]
            .iter()
            .position(|b| *b == SOF || *b == EOF)
            .map(|i| i + 1);

        match end {
            Some(i) if self.buf[i] == SOF => {
                // A frame was cut short and a new one started. Drop the partial one and
                // resynchronize on the new SOF.
                debug!("Dropping truncated frame of {} bytes", i);
                self.stats.malformed = self.stats.malformed.wrapping_add(1);
                self.consume(i);
                Err(FrameError::Truncated)
            }
            Some(eof) => {
                let result = unescape(&self.buf[1..eof], out).and_then(|n| verify(out, n));
                self.consume(eof + 1);
                match result {
                    Ok(_) => self.stats.frames = self.stats.frames.wrapping_add(1),
                    Err(FrameError::ChecksumMismatch { .. }) => {
                        debug!("Dropping frame with bad checksum");
                        self.stats.checksum_errors = self.stats.checksum_errors.wrapping_add(1);
                    }
                    Err(_) => {
                        debug!("Dropping malformed frame");
                        self.stats.malformed = self.stats.malformed.wrapping_add(1);
                    }
                }
                result.map(Some)
            }
            None if self.len == N => {
                // Full, and the frame can never complete
                debug!("Receive buffer overrun, discarding {} bytes", N);
                self.stats.overruns = self.stats.overruns.wrapping_add(1);
                self.len = 0;
                Err(FrameError::Overrun)
            }
            None => Ok(None),
        }
    }

    /// Remove the first `n` bytes, sliding the remainder to the start of the buffer
    fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.buf.copy_within(n..self.len, 0);
        self.len -= n;
    }
}

/// Unescape the bytes between SOF and EOF into `out`
fn unescape(span: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    let mut n = 0;
    let mut bytes = span.iter();
    while let Some(&b) = bytes.next() {
        let value = if b == ESC {
            match bytes.next() {
                Some(&escaped) => escaped ^ ESC_XOR,
                None => return Err(FrameError::MalformedEscape),
            }
        } else {
            b
        };
        if n == out.len() {
            return OversizeSnafu {
                len: n + 1,
                capacity: out.len(),
            }
            .fail();
        }
        out[n] = value;
        n += 1;
    }
    Ok(n)
}

/// Split off and check the trailing checksum, returning the payload length
fn verify(out: &[u8], n: usize) -> Result<usize, FrameError> {
    if n < 2 {
        return Err(FrameError::TooShort);
    }
    let payload_len = n - 2;
    let received = u16::from_le_bytes([out[payload_len], out[payload_len + 1]]);
    let computed = fletcher16(&out[..payload_len]);
    if received != computed {
        return ChecksumMismatchSnafu { received, computed }.fail();
    }
    Ok(payload_len)
}
