//! A `Copy` value shared between interrupt handlers and the foreground loop
//!
//! Every access is wrapped in a `critical_section`, so this works on cores without
//! compare-and-swap (e.g. thumbv6m) at the cost of briefly masking interrupts.

use core::cell::Cell;
use critical_section::Mutex;

/// Interior mutable cell whose loads and stores are atomic with respect to interrupts
#[derive(Debug)]
pub struct AtomicCell<T: Copy> {
    inner: Mutex<Cell<T>>,
}

impl<T: Copy> AtomicCell<T> {
    /// Create a new cell holding `value`
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    /// Read the current value
    pub fn load(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    /// Replace the current value
    pub fn store(&self, value: T) {
        critical_section::with(|cs| self.inner.borrow(cs).set(value));
    }
}

impl AtomicCell<u32> {
    /// Increment a counter, wrapping on overflow. Returns the previous value.
    pub fn increment(&self) -> u32 {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let old = cell.get();
            cell.set(old.wrapping_add(1));
            old
        })
    }
}
