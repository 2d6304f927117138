//! Byte transports and interrupt-fed serial buffers
//!
//! The [`Framer`](crate::Framer) needs a byte stream it can poll without blocking: it checks
//! [`Transport::readable`] before reading and [`Transport::writeable`] before each write. On a
//! microcontroller that stream is usually a UART whose interrupt handlers move bytes in and out
//! of a pair of queues. [`SerialBuffers`] provides those queues as a `static`, and
//! [`SerialPort`] is the foreground handle onto them.
//!
//! ```
//! use dispatch_node::{SerialBuffers, Transport};
//! use embedded_io::Write;
//!
//! static SERIAL: SerialBuffers<64, 256> = SerialBuffers::new();
//!
//! // RX interrupt
//! SERIAL.on_receive(0x55);
//!
//! let mut port = SERIAL.port();
//! assert_eq!(1, port.readable());
//! port.write_all(b"hi").unwrap();
//!
//! // TX interrupt
//! assert_eq!(Some(b'h'), SERIAL.next_transmit());
//! ```
use core::{cell::RefCell, convert::Infallible};

use critical_section::Mutex;
use defmt_or_log::trace;
use dispatch_common::AtomicCell;
use heapless::Deque;

/// A non-blocking-pollable byte stream
pub trait Transport: embedded_io::Read + embedded_io::Write {
    /// Number of received bytes which can be read without blocking
    fn readable(&self) -> usize;

    /// Number of bytes which can be written without blocking
    fn writeable(&self) -> usize;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn readable(&self) -> usize {
        T::readable(self)
    }

    fn writeable(&self) -> usize {
        T::writeable(self)
    }
}

/// Receive and transmit queues shared between UART interrupt handlers and the foreground
///
/// `RX` and `TX` are the queue capacities in bytes.
#[allow(missing_debug_implementations)]
pub struct SerialBuffers<const RX: usize = 64, const TX: usize = 256> {
    rx: Mutex<RefCell<Deque<u8, RX>>>,
    tx: Mutex<RefCell<Deque<u8, TX>>>,
    rx_dropped: AtomicCell<u32>,
    transmit_notify_cb: AtomicCell<Option<&'static (dyn Fn() + Sync)>>,
}

impl<const RX: usize, const TX: usize> Default for SerialBuffers<RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const RX: usize, const TX: usize> SerialBuffers<RX, TX> {
    /// Create empty buffers
    pub const fn new() -> Self {
        Self {
            rx: Mutex::new(RefCell::new(Deque::new())),
            tx: Mutex::new(RefCell::new(Deque::new())),
            rx_dropped: AtomicCell::new(0),
            transmit_notify_cb: AtomicCell::new(None),
        }
    }

    /// Set a callback to run whenever bytes are queued for transmit
    ///
    /// Typically this enables the UART's transmit-empty interrupt. It must be static. Usually this
    /// will be a static fn, but a leaked closure also works.
    pub fn set_transmit_notify_callback(&self, callback: &'static (dyn Fn() + Sync)) {
        self.transmit_notify_cb.store(Some(callback));
    }

    /// Store a received byte. Call from the receive interrupt.
    ///
    /// Returns false, and counts the byte as dropped, if the receive queue is full.
    pub fn on_receive(&self, byte: u8) -> bool {
        let stored = critical_section::with(|cs| self.rx.borrow_ref_mut(cs).push_back(byte).is_ok());
        if !stored {
            self.rx_dropped.increment();
        }
        stored
    }

    /// Take the next byte to transmit. Call from the transmit interrupt.
    ///
    /// Returns None when the queue is empty, at which point the interrupt can be disabled.
    pub fn next_transmit(&self) -> Option<u8> {
        critical_section::with(|cs| self.tx.borrow_ref_mut(cs).pop_front())
    }

    /// Returns true if bytes are waiting to be transmitted
    pub fn tx_pending(&self) -> bool {
        critical_section::with(|cs| !self.tx.borrow_ref(cs).is_empty())
    }

    /// Number of received bytes dropped because the receive queue was full
    pub fn rx_dropped(&self) -> u32 {
        self.rx_dropped.load()
    }

    /// Get a foreground handle to the buffers
    pub fn port(&self) -> SerialPort<'_, RX, TX> {
        SerialPort { buffers: self }
    }

    fn rx_len(&self) -> usize {
        critical_section::with(|cs| self.rx.borrow_ref(cs).len())
    }

    fn tx_free(&self) -> usize {
        critical_section::with(|cs| TX - self.tx.borrow_ref(cs).len())
    }

    fn read_into(&self, buf: &mut [u8]) -> usize {
        critical_section::with(|cs| {
            let mut rx = self.rx.borrow_ref_mut(cs);
            let mut n = 0;
            while n < buf.len() {
                match rx.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            n
        })
    }

    fn write_from(&self, buf: &[u8]) -> usize {
        let n = critical_section::with(|cs| {
            let mut tx = self.tx.borrow_ref_mut(cs);
            let mut n = 0;
            for b in buf {
                if tx.push_back(*b).is_err() {
                    break;
                }
                n += 1;
            }
            n
        });
        if n > 0 {
            if let Some(cb) = self.transmit_notify_cb.load() {
                cb();
            }
        }
        n
    }
}

/// Foreground handle to a [`SerialBuffers`]
///
/// Reads block until at least one byte has been received, and writes block until there is room
/// for at least one byte. Poll [`Transport::readable`] and [`Transport::writeable`] first to
/// avoid blocking.
#[allow(missing_debug_implementations)]
#[derive(Clone, Copy)]
pub struct SerialPort<'a, const RX: usize, const TX: usize> {
    buffers: &'a SerialBuffers<RX, TX>,
}

impl<const RX: usize, const TX: usize> embedded_io::ErrorType for SerialPort<'_, RX, TX> {
    type Error = Infallible;
}

impl<const RX: usize, const TX: usize> embedded_io::Read for SerialPort<'_, RX, TX> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.buffers.read_into(buf);
            if n > 0 {
                return Ok(n);
            }
            core::hint::spin_loop();
        }
    }
}

impl<const RX: usize, const TX: usize> embedded_io::Write for SerialPort<'_, RX, TX> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.buffers.write_from(buf);
            if n > 0 {
                trace!("Queued {} bytes for transmit", n);
                return Ok(n);
            }
            core::hint::spin_loop();
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        while self.buffers.tx_pending() {
            core::hint::spin_loop();
        }
        Ok(())
    }
}

impl<const RX: usize, const TX: usize> Transport for SerialPort<'_, RX, TX> {
    fn readable(&self) -> usize {
        self.buffers.rx_len()
    }

    fn writeable(&self) -> usize {
        self.buffers.tx_free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use embedded_io::{Read, Write};

    #[test]
    fn test_receive_and_read() {
        let buffers = SerialBuffers::<4, 4>::new();
        for b in [1, 2, 3] {
            assert!(buffers.on_receive(b));
        }
        let mut port = buffers.port();
        assert_eq!(3, port.readable());

        let mut buf = [0u8; 2];
        assert_eq!(Ok(2), port.read(&mut buf));
        assert_eq!([1, 2], buf);
        assert_eq!(1, port.readable());
        assert_eq!(Ok(1), port.read(&mut buf));
        assert_eq!(3, buf[0]);
        assert_eq!(0, port.readable());
    }

    #[test]
    fn test_receive_overflow_counts_drops() {
        let buffers = SerialBuffers::<2, 2>::new();
        assert!(buffers.on_receive(1));
        assert!(buffers.on_receive(2));
        assert!(!buffers.on_receive(3));
        assert!(!buffers.on_receive(4));
        assert_eq!(2, buffers.rx_dropped());
        assert_eq!(2, buffers.port().readable());
    }

    #[test]
    fn test_partial_write() {
        let buffers = SerialBuffers::<2, 3>::new();
        let mut port = buffers.port();
        assert_eq!(3, port.writeable());
        assert_eq!(Ok(3), port.write(&[1, 2, 3, 4, 5]));
        assert_eq!(0, port.writeable());
        assert!(buffers.tx_pending());

        assert_eq!(Some(1), buffers.next_transmit());
        assert_eq!(1, port.writeable());
        assert_eq!(Some(2), buffers.next_transmit());
        assert_eq!(Some(3), buffers.next_transmit());
        assert_eq!(None, buffers.next_transmit());
        assert!(!buffers.tx_pending());
        assert_eq!(Ok(()), port.flush());
    }

    #[test]
    fn test_transmit_notify() {
        static SERIAL: SerialBuffers<2, 8> = SerialBuffers::new();
        static NOTIFIED: AtomicUsize = AtomicUsize::new(0);

        SERIAL.set_transmit_notify_callback(Box::leak(Box::new(|| {
            NOTIFIED.fetch_add(1, Ordering::Relaxed);
        })));
        let mut port = SERIAL.port();
        port.write_all(b"abc").unwrap();
        assert_eq!(Ok(0), port.write(&[]));
        assert_eq!(1, NOTIFIED.load(Ordering::Relaxed));
    }
}
