//! Tick counter shared with the timer interrupt
//!
//! The counter is 32 bits wide but is stored as two 16-bit halves, so that it works on cores
//! whose widest atomic access is 16 bits. The timer interrupt is the only writer during normal
//! operation, and a foreground read samples the whole value twice, retrying until both samples
//! agree, so a tick landing between the two half reads is never observed as a torn value.
use core::sync::atomic::{AtomicU16, Ordering};

/// A 32-bit tick counter advanced by a timer interrupt
#[derive(Debug, Default)]
pub struct TimeBase {
    lo: AtomicU16,
    hi: AtomicU16,
}

impl TimeBase {
    /// Create a time base at zero
    pub const fn new() -> Self {
        Self {
            lo: AtomicU16::new(0),
            hi: AtomicU16::new(0),
        }
    }

    /// Advance the counter by one tick
    ///
    /// Call from the timer interrupt. There must be only one caller at a time.
    pub fn tick(&self) {
        let lo = self.lo.load(Ordering::Relaxed).wrapping_add(1);
        self.lo.store(lo, Ordering::Release);
        if lo == 0 {
            let hi = self.hi.load(Ordering::Relaxed).wrapping_add(1);
            self.hi.store(hi, Ordering::Release);
        }
    }

    /// Read the current tick count
    pub fn now(&self) -> u32 {
        read_consistent(|| self.sample())
    }

    /// Replace the tick count
    ///
    /// Both halves are written inside a critical section, so the timer interrupt cannot tick
    /// between them.
    pub fn set(&self, ticks: u32) {
        critical_section::with(|_| self.store(ticks));
    }

    /// Read both halves once, without any consistency check
    fn sample(&self) -> u32 {
        let hi = self.hi.load(Ordering::Acquire);
        let lo = self.lo.load(Ordering::Acquire);
        ((hi as u32) << 16) | lo as u32
    }

    /// Read while the timer interrupt is masked
    pub(crate) fn now_in_cs(&self, _cs: critical_section::CriticalSection<'_>) -> u32 {
        self.sample()
    }

    /// Write while the timer interrupt is masked
    pub(crate) fn set_in_cs(&self, _cs: critical_section::CriticalSection<'_>, ticks: u32) {
        self.store(ticks);
    }

    fn store(&self, ticks: u32) {
        self.lo.store(ticks as u16, Ordering::Release);
        self.hi.store((ticks >> 16) as u16, Ordering::Release);
    }
}

/// Take samples until two in a row agree
fn read_consistent(mut sample: impl FnMut() -> u32) -> u32 {
    loop {
        let first = sample();
        let second = sample();
        if first == second {
            return first;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_carries() {
        let time = TimeBase::new();
        time.set(0xFFFE);
        time.tick();
        assert_eq!(0xFFFF, time.now());
        time.tick();
        assert_eq!(0x1_0000, time.now());
        time.tick();
        assert_eq!(0x1_0001, time.now());
    }

    #[test]
    fn test_tick_wraps_at_u32_max() {
        let time = TimeBase::new();
        time.set(u32::MAX);
        time.tick();
        assert_eq!(0, time.now());
    }

    #[test]
    fn test_set() {
        let time = TimeBase::new();
        time.set(0x1234_5678);
        assert_eq!(0x1234_5678, time.now());
    }

    #[test]
    fn test_torn_read_is_retried() {
        let time = TimeBase::new();
        time.set(0x0000_FFFF);

        // The tick interrupt fires in the middle of the first sample: hi is read before the
        // carry, lo after it, so the sample is 0x0000_0000.
        let mut calls = 0;
        let value = read_consistent(|| {
            calls += 1;
            if calls == 1 {
                let hi = time.hi.load(Ordering::Acquire);
                time.tick();
                let lo = time.lo.load(Ordering::Acquire);
                ((hi as u32) << 16) | lo as u32
            } else {
                time.sample()
            }
        });
        assert_eq!(0x0001_0000, value);
        assert_eq!(4, calls);
    }
}
