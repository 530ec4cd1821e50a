//! Frame writer and frame reader

use embedded_hal::blocking::delay::DelayMs;
use log::{debug, trace, warn};

use super::{LinkError, Result, TransferBuffer};
use crate::config::{LinkConfig, AVAILABLE_MAX};
use crate::hal::{Bus, BusFault, Clock};

/// Largest single bus transaction: two header bytes plus a full window
const FRAME_MAX: usize = AVAILABLE_MAX + 2;

/// Owns the bus and its time sources; moves whole messages across it
pub struct Transport<B, D, C> {
    bus: B,
    delay: D,
    clock: C,
    config: LinkConfig,
}

impl<B, D, C> Transport<B, D, C>
where
    B: Bus,
    D: DelayMs<u32>,
    C: Clock,
{
    /// Fails with `InvalidConfig` when `config` does not validate
    pub fn new(bus: B, delay: D, clock: C, config: LinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            bus,
            delay,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn release(self) -> (B, D, C) {
        (self.bus, self.delay, self.clock)
    }

    /// Bus Reset: reinitialize the bus handle
    pub fn reset(&mut self) {
        self.bus.reset();
    }

    fn fail(&mut self, direction: &str, fault: BusFault) -> LinkError {
        warn!("{} {} (code {})", direction, fault, fault.code());
        self.bus.reset();
        LinkError::Bus(fault)
    }

    /// Send `message` (body plus terminator) in length-prefixed segments.
    ///
    /// A bus fault resets the bus and abandons the message; the peripheral
    /// keeps whatever segments arrived before it.
    pub fn write_message(&mut self, message: &[u8]) -> Result<()> {
        let address = self.config.address;
        let mut frame = [0u8; FRAME_MAX];
        let mut sent_in_burst = 0usize;

        for segment in message.chunks(self.config.segment_max) {
            self.delay.delay_ms(self.config.segment_lead_ms);

            frame[0] = segment.len() as u8;
            frame[1..=segment.len()].copy_from_slice(segment);
            if let Err(fault) = self.bus.write(address, &frame[..=segment.len()]) {
                return Err(self.fail("TX", fault));
            }

            // Pace bursts so the peripheral's receive interrupt keeps up
            sent_in_burst += segment.len();
            if sent_in_burst > self.config.burst_bytes {
                sent_in_burst = 0;
                self.delay.delay_ms(self.config.burst_pause_ms);
            }
            self.delay.delay_ms(self.config.segment_settle_ms);
        }

        trace!("TX {} bytes", message.len());
        Ok(())
    }

    /// Ask for `count` bytes.
    ///
    /// Returns the number of bytes still pending in the peripheral and the
    /// bytes delivered by this poll.
    fn poll<'f>(
        &mut self,
        count: usize,
        frame: &'f mut [u8; FRAME_MAX],
    ) -> Result<(usize, &'f [u8])> {
        let address = self.config.address;

        if let Err(fault) = self.bus.write(address, &[0x00, count as u8]) {
            return Err(self.fail("RX", fault));
        }

        // Let the peripheral stage the data for its I2C ISR
        self.delay.delay_ms(self.config.rx_settle_ms);

        let frame = &mut frame[..count + 2];
        if let Err(fault) = self.bus.read(address, frame) {
            return Err(self.fail("RX", fault));
        }

        let available = usize::from(frame[0]);
        if available > AVAILABLE_MAX {
            warn!("RX available byte count {} greater than max allowed", available);
            return Err(LinkError::Mismatch("available count out of range"));
        }
        if usize::from(frame[1]) != count {
            warn!("RX unexpected protocol byte count {} (asked {})", frame[1], count);
            return Err(LinkError::Mismatch("echoed length differs from request"));
        }

        Ok((available, &frame[2..]))
    }

    /// Accumulate one reply into `buffer`.
    ///
    /// The reply is complete once the buffer ends with the terminator and the
    /// peripheral reports nothing more pending. Fails with `Timeout` when
    /// that has not happened within `read_timeout_ms`. After `Overflow` or
    /// `Mismatch` the rest of the reply is read and dropped so the next
    /// request starts clean.
    pub fn read_message(&mut self, buffer: &mut TransferBuffer) -> Result<()> {
        buffer.clear();
        let start = self.clock.now_ms();

        let result = self.collect(buffer, start);
        if let Err(LinkError::Overflow | LinkError::Mismatch(_)) = result {
            self.drain(start);
        }
        result
    }

    fn collect(&mut self, buffer: &mut TransferBuffer, start: u32) -> Result<()> {
        let mut frame = [0u8; FRAME_MAX];
        let mut chunk_len = 0usize;

        loop {
            buffer.reserve_for(chunk_len)?;
            self.delay.delay_ms(self.config.segment_lead_ms);

            let (available, data) = self.poll(chunk_len, &mut frame)?;
            buffer.append(data)?;
            chunk_len = available.min(self.config.segment_max);

            if chunk_len == 0 && buffer.ends_with_terminator() {
                trace!("RX {} bytes", buffer.len());
                return Ok(());
            }

            let elapsed = self.clock.elapsed_since(start);
            if elapsed >= self.config.read_timeout_ms {
                warn!("no response after {} ms", self.config.read_timeout_ms);
                return Err(LinkError::Timeout);
            }

            if chunk_len == 0 {
                // Peripheral is still processing the request; never sleep past the deadline
                let remaining = self.config.read_timeout_ms - elapsed;
                self.delay.delay_ms(self.config.poll_interval_ms.min(remaining));
            }
        }
    }

    /// Read and discard until the peripheral reports nothing pending.
    ///
    /// Bounded by the read deadline of the failed reply; any error ends it.
    fn drain(&mut self, start: u32) {
        let mut frame = [0u8; FRAME_MAX];
        let mut count = 0usize;
        let mut dropped = 0usize;

        loop {
            self.delay.delay_ms(self.config.segment_lead_ms);
            let available = match self.poll(count, &mut frame) {
                Ok((available, data)) => {
                    dropped += data.len();
                    available
                }
                Err(_) => break,
            };
            if available == 0 || self.clock.elapsed_since(start) >= self.config.read_timeout_ms {
                break;
            }
            count = available.min(self.config.segment_max);
        }

        debug!("RX dropped {} bytes of an abandoned reply", dropped);
    }
}
