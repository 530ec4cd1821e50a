//! Configuration constants for the Notecard link

use crate::protocol::{LinkError, Result};

/// Default 7-bit I2C address of the Notecard
pub const NOTECARD_ADDR: u8 = 0x17;

/// Largest payload carried by one bus transaction
pub const SEGMENT_MAX: usize = 32;

/// Bytes sent in one burst before the long pacing pause
pub const BURST_BYTES: usize = 250;

/// Delay before each outgoing segment and each poll, in milliseconds
pub const SEGMENT_LEAD_MS: u32 = 6;

/// Delay after each outgoing segment, in milliseconds
pub const SEGMENT_SETTLE_MS: u32 = 20;

/// Pause after a full burst, in milliseconds
pub const BURST_PAUSE_MS: u32 = 250;

/// Delay between the read probe and the bus read, in milliseconds
pub const RX_SETTLE_MS: u32 = 2;

/// Sleep between idle polls while the peripheral is processing
pub const POLL_INTERVAL_MS: u32 = 50;

/// Wall-clock ceiling for one reply
pub const READ_TIMEOUT_MS: u32 = 30_000;

/// Transfer buffer growth increment
pub const BUFFER_GROW: usize = 128;

/// Hard capacity of the transfer buffer
pub const BUFFER_LIMIT: usize = 4096;

/// Largest "available" count the peripheral may report
pub const AVAILABLE_MAX: usize = 255 - 2;

/// End-of-message byte
pub const TERMINATOR: u8 = b'\n';

/// Runtime settings for one link, defaulting to the constants above
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub address: u8,
    pub segment_max: usize,
    pub burst_bytes: usize,
    pub segment_lead_ms: u32,
    pub segment_settle_ms: u32,
    pub burst_pause_ms: u32,
    pub rx_settle_ms: u32,
    pub poll_interval_ms: u32,
    pub read_timeout_ms: u32,
    pub buffer_grow: usize,
    pub buffer_limit: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: NOTECARD_ADDR,
            segment_max: SEGMENT_MAX,
            burst_bytes: BURST_BYTES,
            segment_lead_ms: SEGMENT_LEAD_MS,
            segment_settle_ms: SEGMENT_SETTLE_MS,
            burst_pause_ms: BURST_PAUSE_MS,
            rx_settle_ms: RX_SETTLE_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            read_timeout_ms: READ_TIMEOUT_MS,
            buffer_grow: BUFFER_GROW,
            buffer_limit: BUFFER_LIMIT,
        }
    }
}

impl LinkConfig {
    /// Same timing as the default but with every delay set to zero
    pub fn without_delays() -> Self {
        Self {
            segment_lead_ms: 0,
            segment_settle_ms: 0,
            burst_pause_ms: 0,
            rx_settle_ms: 0,
            poll_interval_ms: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        // The segment length travels in a single byte and must fit the
        // peripheral's availability window.
        if self.segment_max == 0 || self.segment_max > AVAILABLE_MAX {
            return Err(LinkError::InvalidConfig("segment_max out of range"));
        }
        if self.address > 0x7F {
            return Err(LinkError::InvalidConfig("address is not 7-bit"));
        }
        if self.buffer_limit == 0 || self.buffer_grow == 0 {
            return Err(LinkError::InvalidConfig("buffer sizes must be nonzero"));
        }
        if self.buffer_grow > self.buffer_limit {
            return Err(LinkError::InvalidConfig("buffer_grow exceeds buffer_limit"));
        }
        Ok(())
    }
}
