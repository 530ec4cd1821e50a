//! Watchdog-driven device restart

use avr_device::atmega128a::WDT;

use crate::diagnostics::Restart;

/// WDP2..0 prescaler settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchdogTimeout {
    Ms16 = 0,
    Ms32 = 1,
    Ms64 = 2,
    Ms125 = 3,
    Ms250 = 4,
    Ms500 = 5,
    Ms1000 = 6,
    Ms2000 = 7,
}

// WDCE | WDE, opens the four-cycle change window
const CHANGE_ENABLE: u8 = 0x18;
const ENABLE: u8 = 0x08;

/// Restart sink that lets the watchdog bite.
///
/// The main loop feeds it while the link is healthy; `restart` stops
/// feeding and waits for the reset.
pub struct Watchdog {
    timeout: WatchdogTimeout,
}

impl Watchdog {
    pub fn new(timeout: WatchdogTimeout) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> WatchdogTimeout {
        self.timeout
    }

    fn arm(&mut self, timeout: WatchdogTimeout) {
        avr_device::interrupt::free(|_| unsafe {
            let wdt = &*WDT::ptr();
            wdt.wdtcr.write(|w| w.bits(CHANGE_ENABLE));
            wdt.wdtcr.write(|w| w.bits(ENABLE | timeout as u8));
        });
    }

    pub fn start(&mut self) {
        self.arm(self.timeout);
    }

    #[inline]
    pub fn feed(&mut self) {
        avr_device::asm::wdr();
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(WatchdogTimeout::Ms2000)
    }
}

impl Restart for Watchdog {
    fn restart(&mut self) {
        avr_device::interrupt::disable();
        self.arm(WatchdogTimeout::Ms16);
        loop {
            core::hint::spin_loop();
        }
    }
}
