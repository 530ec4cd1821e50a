//! Millisecond time sources

use core::sync::atomic::{AtomicU16, Ordering};

/// Wrapping millisecond counter
pub trait Clock {
    fn now_ms(&mut self) -> u32;

    /// Milliseconds since `start`, tolerant of counter wrap
    fn elapsed_since(&mut self, start: u32) -> u32 {
        self.now_ms().wrapping_sub(start)
    }
}

impl<F> Clock for F
where
    F: FnMut() -> u32,
{
    fn now_ms(&mut self) -> u32 {
        self()
    }
}

/// Tick counter driven from a 1 ms timer interrupt
///
/// `tick` is called from the ISR; the counter is 16 bits wide so it stays
/// lock-free on 8-bit targets and `TickClock` widens it on read.
pub struct TickCounter {
    ticks: AtomicU16,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU16::new(0),
        }
    }

    #[inline]
    pub fn tick(&self) {
        let count = self.ticks.load(Ordering::Relaxed);
        self.ticks.store(count.wrapping_add(1), Ordering::Relaxed);
    }

    #[inline]
    pub fn get_ticks(&self) -> u16 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn clock(&self) -> TickClock<'_> {
        TickClock {
            counter: self,
            last: self.get_ticks(),
            high: 0,
        }
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// `Clock` view over a `TickCounter`
///
/// Must be read at least once per 65 s to catch every wrap of the counter.
pub struct TickClock<'a> {
    counter: &'a TickCounter,
    last: u16,
    high: u32,
}

impl Clock for TickClock<'_> {
    fn now_ms(&mut self) -> u32 {
        let ticks = self.counter.get_ticks();
        if ticks < self.last {
            self.high = self.high.wrapping_add(1 << 16);
        }
        self.last = ticks;
        self.high | u32::from(ticks)
    }
}

/// Host clock backed by `std::time::Instant`
#[cfg(feature = "std")]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&mut self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}
