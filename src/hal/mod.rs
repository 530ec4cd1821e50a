pub mod bus;
pub mod clock;

#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub mod twi;
#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub mod watchdog;

// Re-export commonly used types
pub use bus::{Bus, BusFault, HalBus};
pub use clock::{Clock, TickClock, TickCounter};

#[cfg(feature = "std")]
pub use clock::StdClock;
#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub use twi::{Twi, TwiSpeed};
#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub use watchdog::{Watchdog, WatchdogTimeout};
