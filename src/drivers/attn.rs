//! Attention line (ATTN) wake signal
//!
//! The peripheral raises ATTN on events it was armed for. The firmware's
//! edge interrupt calls `post`; the application loop calls `take`. Nothing
//! here touches the bus, so a post never disturbs an in-flight request.

use core::sync::atomic::{AtomicBool, Ordering};

pub struct AttnSignal {
    pending: AtomicBool,
}

impl AttnSignal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Called from the edge interrupt; never blocks
    #[inline]
    pub fn post(&self) {
        self.pending.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume the pending wake, if any. Edges posted before `take` coalesce;
    /// an edge posted while `take` runs is reported by the next call.
    #[cfg(target_has_atomic = "8")]
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Consume the pending wake, if any. Edges posted before `take` coalesce;
    /// an edge posted while `take` runs is reported by the next call.
    #[cfg(all(not(target_has_atomic = "8"), target_arch = "avr", feature = "atmega128"))]
    pub fn take(&self) -> bool {
        // No swap on AVR: keep the ISR out between the load and the clear
        avr_device::interrupt::free(|_| {
            let pending = self.pending.load(Ordering::Acquire);
            self.pending.store(false, Ordering::Release);
            pending
        })
    }

    /// Consume the pending wake, if any.
    ///
    /// Without swap or a critical section an edge landing between the load
    /// and the clear is lost; enable `atmega128` on AVR to close that window.
    #[cfg(all(
        not(target_has_atomic = "8"),
        not(all(target_arch = "avr", feature = "atmega128"))
    ))]
    pub fn take(&self) -> bool {
        let pending = self.pending.load(Ordering::Acquire);
        self.pending.store(false, Ordering::Release);
        pending
    }
}

impl Default for AttnSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ATTN: AttnSignal = AttnSignal::new();

    #[test]
    fn edges_coalesce_until_taken() {
        assert!(!ATTN.take());
        ATTN.post();
        ATTN.post();
        assert!(ATTN.is_pending());
        assert!(ATTN.take());
        assert!(!ATTN.take());
        assert!(!ATTN.is_pending());
    }

    #[test]
    fn post_from_another_thread_is_observed() {
        let signal = std::sync::Arc::new(AttnSignal::new());
        let isr = signal.clone();
        std::thread::spawn(move || isr.post()).join().unwrap();
        assert!(signal.take());
    }

    #[test]
    fn racing_posts_are_never_lost() {
        use std::sync::atomic::{AtomicBool, AtomicU32};
        use std::sync::Arc;

        const POSTS: u32 = 20_000;
        let signal = Arc::new(AttnSignal::new());
        let posted = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let isr = {
            let (signal, posted, finished) = (signal.clone(), posted.clone(), finished.clone());
            std::thread::spawn(move || {
                for n in 1..=POSTS {
                    posted.store(n, Ordering::Release);
                    signal.post();
                }
                finished.store(true, Ordering::Release);
            })
        };

        // Last post number known to be covered by a successful take
        let mut covered = 0;
        loop {
            let done = finished.load(Ordering::Acquire);
            if signal.take() {
                covered = posted.load(Ordering::Acquire);
            }
            if done {
                break;
            }
        }
        isr.join().unwrap();

        assert_eq!(covered, POSTS);
        assert!(!signal.is_pending());
    }
}
