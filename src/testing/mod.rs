//! Simulated peripheral and time sources for host-side tests
//!
//! `SimNotecard` speaks the segment/poll protocol on the `Bus` trait and
//! answers each request from a script. `sim_time` returns a delay and a clock
//! sharing one counter, so every delay the driver issues advances time.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;

use embedded_hal::blocking::delay::DelayMs;
use serde_json::Value;

use crate::config::{AVAILABLE_MAX, NOTECARD_ADDR, TERMINATOR};
use crate::diagnostics::Restart;
use crate::hal::{Bus, BusFault, Clock};

/// Delay half of the simulated timebase
#[derive(Clone)]
pub struct SimDelay {
    now: Rc<Cell<u32>>,
    calls: Rc<Cell<u32>>,
}

impl SimDelay {
    /// Number of `delay_ms` calls so far
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl DelayMs<u32> for SimDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls.set(self.calls.get() + 1);
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl DelayMs<u16> for SimDelay {
    fn delay_ms(&mut self, ms: u16) {
        DelayMs::<u32>::delay_ms(self, u32::from(ms));
    }
}

/// Clock half of the simulated timebase
#[derive(Clone)]
pub struct SimClock {
    now: Rc<Cell<u32>>,
}

impl SimClock {
    pub fn now(&self) -> u32 {
        self.now.get()
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for SimClock {
    fn now_ms(&mut self) -> u32 {
        self.now.get()
    }
}

pub fn sim_time() -> (SimDelay, SimClock) {
    let now = Rc::new(Cell::new(0));
    (
        SimDelay {
            now: now.clone(),
            calls: Rc::new(Cell::new(0)),
        },
        SimClock { now },
    )
}

/// Restart sink that only counts
#[derive(Clone, Default)]
pub struct RestartCounter {
    count: Rc<Cell<u32>>,
}

impl RestartCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.count.get()
    }
}

impl Restart for RestartCounter {
    fn restart(&mut self) {
        self.count.set(self.count.get() + 1);
    }
}

/// How the simulated peripheral answers one request
#[derive(Debug, Clone)]
pub enum Script {
    /// Reply with these bytes at once
    Reply(Vec<u8>),
    /// Stay silent for `polls` empty polls, then reply
    ReplyAfter { polls: u32, bytes: Vec<u8> },
    /// Send the request line straight back
    Echo,
    /// Never answer
    Silent,
    /// Report one byte pending forever and never finish the message
    Trickle,
}

/// Scripted peripheral on the simulated bus
pub struct SimNotecard {
    address: u8,
    script: VecDeque<Script>,
    inbox: Vec<u8>,
    requests: Vec<Vec<u8>>,
    outgoing: VecDeque<u8>,
    held: Option<(u32, Vec<u8>)>,
    trickle: bool,
    probe: Option<usize>,
    segments: u32,
    fail_segment: Option<(u32, BusFault)>,
    fail_probe: Option<(u32, BusFault)>,
    probes: u32,
    resets: u32,
}

impl SimNotecard {
    pub fn new() -> Self {
        Self {
            address: NOTECARD_ADDR,
            script: VecDeque::new(),
            inbox: Vec::new(),
            requests: Vec::new(),
            outgoing: VecDeque::new(),
            held: None,
            trickle: false,
            probe: None,
            segments: 0,
            fail_segment: None,
            fail_probe: None,
            probes: 0,
            resets: 0,
        }
    }

    pub fn with_address(address: u8) -> Self {
        Self {
            address,
            ..Self::new()
        }
    }

    /// Queue the answer for the next unanswered request.
    /// With nothing queued the peripheral answers `{}`.
    pub fn push(&mut self, script: Script) -> &mut Self {
        self.script.push_back(script);
        self
    }

    pub fn reply(&mut self, bytes: &[u8]) -> &mut Self {
        self.push(Script::Reply(bytes.to_vec()))
    }

    /// Fail the `nth` data segment (1-based, counted across the session)
    pub fn fail_segment(&mut self, nth: u32, fault: BusFault) -> &mut Self {
        self.fail_segment = Some((nth, fault));
        self
    }

    /// Fail the `nth` read probe (1-based)
    pub fn fail_probe(&mut self, nth: u32, fault: BusFault) -> &mut Self {
        self.fail_probe = Some((nth, fault));
        self
    }

    /// Complete request lines received so far, terminator stripped
    pub fn requests(&self) -> &[Vec<u8>] {
        &self.requests
    }

    pub fn last_request(&self) -> Option<Value> {
        serde_json::from_slice(self.requests.last()?).ok()
    }

    /// Bytes of an unfinished request line
    pub fn partial(&self) -> &[u8] {
        &self.inbox
    }

    pub fn segments(&self) -> u32 {
        self.segments
    }

    pub fn probes(&self) -> u32 {
        self.probes
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    fn accept_line(&mut self, line: Vec<u8>) {
        let is_command = serde_json::from_slice::<Value>(&line)
            .ok()
            .map_or(false, |doc| doc.get("cmd").is_some());

        if !is_command {
            match self
                .script
                .pop_front()
                .unwrap_or_else(|| Script::Reply(b"{}\n".to_vec()))
            {
                Script::Reply(bytes) => self.outgoing.extend(bytes),
                Script::ReplyAfter { polls, bytes } => self.held = Some((polls, bytes)),
                Script::Echo => {
                    self.outgoing.extend(line.iter().copied());
                    self.outgoing.push_back(TERMINATOR);
                }
                Script::Silent => {}
                Script::Trickle => self.trickle = true,
            }
        }
        self.requests.push(line);
    }

    fn receive_segment(&mut self, bytes: &[u8]) -> Result<(), BusFault> {
        self.segments += 1;
        if let Some((nth, fault)) = self.fail_segment {
            if nth == self.segments {
                return Err(fault);
            }
        }

        let (len, payload) = bytes.split_first().ok_or(BusFault::Other)?;
        if usize::from(*len) != payload.len() {
            return Err(BusFault::DataNack);
        }
        self.inbox.extend_from_slice(payload);

        while let Some(end) = self.inbox.iter().position(|&b| b == TERMINATOR) {
            let line: Vec<u8> = self.inbox.drain(..=end).take(end).collect();
            self.accept_line(line);
        }
        Ok(())
    }

    fn available(&self) -> usize {
        if self.trickle {
            1
        } else {
            self.outgoing.len().min(AVAILABLE_MAX)
        }
    }
}

impl Default for SimNotecard {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimNotecard {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusFault> {
        if address != self.address {
            return Err(BusFault::AddressNack);
        }

        match bytes {
            [0x00, count] => {
                self.probes += 1;
                if let Some((nth, fault)) = self.fail_probe {
                    if nth == self.probes {
                        return Err(fault);
                    }
                }
                self.probe = Some(usize::from(*count));
                Ok(())
            }
            _ => self.receive_segment(bytes),
        }
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusFault> {
        if address != self.address {
            return Err(BusFault::AddressNack);
        }
        let count = self.probe.take().ok_or(BusFault::Other)?;
        if buffer.len() != count + 2 {
            return Err(BusFault::Other);
        }

        if count == 0 && self.outgoing.is_empty() {
            // Release a delayed reply once enough empty polls went by
            if let Some((polls, bytes)) = self.held.take() {
                if polls == 0 {
                    self.outgoing.extend(bytes);
                } else {
                    self.held = Some((polls - 1, bytes));
                }
            }
        }

        for slot in buffer[2..].iter_mut() {
            *slot = if self.trickle {
                b'x'
            } else {
                self.outgoing.pop_front().unwrap_or(0)
            };
        }
        buffer[0] = self.available() as u8;
        buffer[1] = count as u8;
        Ok(())
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.probe = None;
    }
}

#[cfg(test)]
impl From<embedded_hal_mock::MockError> for BusFault {
    fn from(err: embedded_hal_mock::MockError) -> Self {
        use embedded_hal_mock::MockError;
        use std::io::ErrorKind;

        match err {
            MockError::Io(ErrorKind::InvalidInput) => BusFault::TooLong,
            MockError::Io(ErrorKind::AddrNotAvailable) => BusFault::AddressNack,
            MockError::Io(ErrorKind::InvalidData) => BusFault::DataNack,
            MockError::Io(ErrorKind::TimedOut) => BusFault::Timeout,
            _ => BusFault::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_line(sim: &mut SimNotecard, line: &[u8]) {
        for chunk in line.chunks(32) {
            let mut frame = vec![chunk.len() as u8];
            frame.extend_from_slice(chunk);
            sim.write(NOTECARD_ADDR, &frame).unwrap();
        }
    }

    fn poll(sim: &mut SimNotecard, count: u8) -> Vec<u8> {
        sim.write(NOTECARD_ADDR, &[0x00, count]).unwrap();
        let mut frame = vec![0u8; usize::from(count) + 2];
        sim.read(NOTECARD_ADDR, &mut frame).unwrap();
        frame
    }

    #[test]
    fn delays_advance_the_clock() {
        let (mut delay, mut clock) = sim_time();
        delay.delay_ms(25u32);
        delay.delay_ms(5u16);
        assert_eq!(clock.now_ms(), 30);
        assert_eq!(delay.calls(), 2);
        clock.advance(10);
        assert_eq!(clock.now(), 40);
    }

    #[test]
    fn reassembles_requests_and_answers() {
        let mut sim = SimNotecard::new();
        sim.reply(b"{\"ok\":true}\n");
        send_line(&mut sim, b"{\"req\":\"hub.get\"}\n");

        assert_eq!(sim.requests().len(), 1);
        assert_eq!(sim.last_request().unwrap()["req"], "hub.get");
        assert_eq!(poll(&mut sim, 0), vec![12, 0]);

        let frame = poll(&mut sim, 12);
        assert_eq!(&frame[..2], &[0, 12]);
        assert_eq!(&frame[2..], b"{\"ok\":true}\n");
    }

    #[test]
    fn delayed_reply_waits_for_empty_polls() {
        let mut sim = SimNotecard::new();
        sim.push(Script::ReplyAfter {
            polls: 2,
            bytes: b"{}\n".to_vec(),
        });
        send_line(&mut sim, b"{\"req\":\"card.version\"}\n");

        assert_eq!(poll(&mut sim, 0)[0], 0);
        assert_eq!(poll(&mut sim, 0)[0], 0);
        assert_eq!(poll(&mut sim, 0)[0], 3);
    }

    #[test]
    fn commands_get_no_reply() {
        let mut sim = SimNotecard::new();
        send_line(&mut sim, b"{\"cmd\":\"card.attn\"}\n");
        assert_eq!(poll(&mut sim, 0), vec![0, 0]);
        assert_eq!(sim.requests().len(), 1);
    }

    #[test]
    fn injected_segment_fault() {
        let mut sim = SimNotecard::new();
        sim.fail_segment(2, BusFault::DataNack);
        assert!(sim.write(NOTECARD_ADDR, &[1, b'{']).is_ok());
        assert_eq!(
            sim.write(NOTECARD_ADDR, &[1, b'}']),
            Err(BusFault::DataNack)
        );
        assert_eq!(sim.partial(), b"{");
        assert_eq!(
            sim.write(0x42, &[1, b'}']),
            Err(BusFault::AddressNack)
        );
    }
}
