//! A simulated serial link between a device and a host
//!
//! The device side is a [`SerialBuffers`], exactly as firmware would use it, with its
//! [`SerialPort`] handed to a `Framer` or `Dispatcher`. The host side plays the part of the PC
//! tooling: it frames and injects messages into the device's receive queue, and drains the
//! device's transmit queue into its own frame accumulator.
use std::cell::RefCell;

use dispatch_common::{
    encode_frame, encode_spec, frame::max_frame_len, Field, FrameAccumulator, FrameStats, Message,
};
use dispatch_node::{SerialBuffers, SerialPort};

/// Size of the host's receive buffer, large enough for any device message
const HOST_RX_LEN: usize = 1024;

/// A message received by the host, owning its bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMessage {
    payload: Vec<u8>,
}

impl HostMessage {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode the payload. Panics if it is not a valid message.
    pub fn decode(&self) -> Message<'_> {
        Message::decode(&self.payload).expect("device sent an invalid message")
    }
}

pub struct SimLink<const RX: usize = 64, const TX: usize = 256> {
    uart: SerialBuffers<RX, TX>,
    host_rx: RefCell<FrameAccumulator<HOST_RX_LEN>>,
    wire_log: RefCell<Vec<u8>>,
}

impl<const RX: usize, const TX: usize> Default for SimLink<RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const RX: usize, const TX: usize> SimLink<RX, TX> {
    pub fn new() -> Self {
        Self {
            uart: SerialBuffers::new(),
            host_rx: RefCell::new(FrameAccumulator::new()),
            wire_log: RefCell::new(Vec::new()),
        }
    }

    /// The device's end of the link
    pub fn port(&self) -> SerialPort<'_, RX, TX> {
        self.uart.port()
    }

    /// The device's UART buffers
    pub fn uart(&self) -> &SerialBuffers<RX, TX> {
        &self.uart
    }

    /// Deliver raw bytes to the device, as its receive interrupt would
    ///
    /// Returns the number of bytes which fit in the device's receive queue.
    pub fn host_send_raw(&self, bytes: &[u8]) -> usize {
        bytes.iter().filter(|b| self.uart.on_receive(**b)).count()
    }

    /// Frame `payload` and deliver it to the device
    ///
    /// Panics if the frame does not fit in the device's receive queue.
    pub fn host_send_frame(&self, payload: &[u8]) {
        let mut wire = vec![0u8; max_frame_len(payload.len())];
        let n = encode_frame(payload, &mut wire).unwrap();
        assert_eq!(n, self.host_send_raw(&wire[..n]), "device receive queue overflowed");
    }

    /// Encode a message and deliver it to the device
    pub fn host_publish(&self, spec: &str, fields: &[Field<'_>]) {
        let mut msg = [0u8; 512];
        let n = encode_spec(spec, fields, &mut msg).unwrap();
        self.host_send_frame(&msg[..n]);
    }

    /// Run the device's transmit interrupt until its queue is empty
    ///
    /// Returns the bytes which went out on the wire.
    pub fn drain_device_tx(&self) -> Vec<u8> {
        let bytes: Vec<u8> = std::iter::from_fn(|| self.uart.next_transmit()).collect();
        self.wire_log.borrow_mut().extend_from_slice(&bytes);
        self.host_rx.borrow_mut().extend(&bytes);
        bytes
    }

    /// Collect every valid frame the device has sent since the last call
    pub fn host_receive(&self) -> Vec<HostMessage> {
        self.drain_device_tx();
        let mut acc = self.host_rx.borrow_mut();
        let mut out = [0u8; HOST_RX_LEN];
        let mut messages = Vec::new();
        loop {
            match acc.next_frame(&mut out) {
                Ok(Some(n)) => messages.push(HostMessage {
                    payload: out[..n].to_vec(),
                }),
                Ok(None) => break,
                Err(_) => continue,
            }
        }
        messages
    }

    /// Counters from the host's frame accumulator
    pub fn host_stats(&self) -> FrameStats {
        self.host_rx.borrow().stats()
    }

    /// Every byte the device has transmitted
    pub fn wire_log(&self) -> Vec<u8> {
        self.wire_log.borrow().clone()
    }
}
