//! Frame transmit and receive over a [`Transport`]
use defmt_or_log::{debug, warn};
use dispatch_common::{
    constants::RX_FRAME_LEN,
    frame::{frame_units, FrameAccumulator, FrameError, FrameStats},
};

use crate::transport::Transport;

/// Sends and receives checksummed frames on a byte stream
///
/// `RX` is the size of the receive accumulation buffer, which bounds the longest frame (after
/// escaping) that can be received.
#[allow(missing_debug_implementations)]
pub struct Framer<T, const RX: usize = RX_FRAME_LEN> {
    transport: T,
    accumulator: FrameAccumulator<RX>,
    read_errors: u32,
}

impl<T: Transport, const RX: usize> Framer<T, RX> {
    /// Create a framer on `transport`
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            accumulator: FrameAccumulator::new(),
            read_errors: 0,
        }
    }

    /// Access the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably access the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the framer, returning the transport
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send `payload` as one frame
    ///
    /// Blocks until the whole frame has been handed to the transport. Before each unit the framer
    /// waits for enough transmit space for it: one byte for a delimiter, two for any data byte so
    /// that an escape pair is never split.
    pub fn push(&mut self, payload: &[u8]) -> Result<(), T::Error> {
        for unit in frame_units(payload) {
            while self.transport.writeable() < unit.reserve() {
                core::hint::spin_loop();
            }
            self.transport.write_all(unit.bytes())?;
        }
        Ok(())
    }

    /// Receive the next valid frame into `out`
    ///
    /// Returns the payload length, or 0 if no valid frame is available. Corrupt frames are
    /// consumed and counted in [`stats`](Self::stats). `out` also receives the two checksum bytes,
    /// so it must be two bytes longer than the longest expected payload.
    pub fn pull(&mut self, out: &mut [u8]) -> usize {
        loop {
            match self.try_pull(out) {
                Ok(Some(n)) => return n,
                Ok(None) => return 0,
                // A bad frame may be followed by a good one already buffered
                Err(_) => continue,
            }
        }
    }

    /// Receive the next frame into `out`, reporting why a frame was dropped
    ///
    /// Returns `Ok(None)` if no complete frame is available yet.
    pub fn try_pull(&mut self, out: &mut [u8]) -> Result<Option<usize>, FrameError> {
        self.fill();
        self.accumulator.next_frame(out)
    }

    /// Framing counters
    pub fn stats(&self) -> FrameStats {
        self.accumulator.stats()
    }

    /// Number of failed transport reads
    pub fn read_errors(&self) -> u32 {
        self.read_errors
    }

    /// Move readable bytes from the transport into the accumulation buffer
    fn fill(&mut self) {
        loop {
            let available = self.transport.readable();
            if available == 0 {
                return;
            }
            if self.accumulator.free() == 0 {
                // Let next_frame extract a frame or declare an overrun first
                return;
            }
            let spare = self.accumulator.spare_mut();
            let want = available.min(spare.len());
            match self.transport.read(&mut spare[..want]) {
                Ok(0) => return,
                Ok(n) => {
                    self.accumulator.commit(n);
                    debug!("Received {} bytes", n);
                }
                Err(_) => {
                    warn!("Transport read failed");
                    self.read_errors = self.read_errors.wrapping_add(1);
                    return;
                }
            }
        }
    }
}
