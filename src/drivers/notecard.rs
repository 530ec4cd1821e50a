//! Notecard request lifecycle
//!
//! One `Notecard` per physical bus. It owns the transfer buffer, the single
//! in-flight request slot and the last response, and drives
//! `Idle → Building → Sending → AwaitingReply → Idle`.
//!
//! ```ignore
//! card.begin("hub.set")?;
//! card.add_string("product", PRODUCT_UID)?;
//! card.add_bool("heartbeat", true)?;
//! let response = card.send()?;
//! ```

use embedded_hal::blocking::delay::DelayMs;
use log::{debug, error, warn};
use serde_json::Value;

use crate::config::LinkConfig;
use crate::diagnostics::{classify, LinkStats, Restart};
use crate::hal::{Bus, Clock};
use crate::protocol::{
    ErrorKind, LinkError, Request, Response, Result, TransferBuffer, Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Building,
    Sending,
    AwaitingReply,
}

/// How the last request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(ErrorKind),
}

pub struct Notecard<B, D, C, R> {
    transport: Transport<B, D, C>,
    restart: R,
    buffer: TransferBuffer,
    request: Option<Request>,
    response: Response,
    state: State,
    last_outcome: Option<Outcome>,
    restart_pending: bool,
    stats: LinkStats,
}

fn printable(bytes: &[u8]) -> &str {
    core::str::from_utf8(bytes).unwrap_or("<non-utf8>").trim_end()
}

impl<B, D, C, R> Notecard<B, D, C, R>
where
    B: Bus,
    D: DelayMs<u32>,
    C: Clock,
    R: Restart,
{
    pub fn new(bus: B, delay: D, clock: C, restart: R, config: LinkConfig) -> Result<Self> {
        Ok(Self {
            transport: Transport::new(bus, delay, clock, config)?,
            restart,
            buffer: TransferBuffer::new(config.buffer_grow, config.buffer_limit),
            request: None,
            response: Response::default(),
            state: State::Idle,
            last_outcome: None,
            restart_pending: false,
            stats: LinkStats::default(),
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Request-Active: true from `begin` until the request resolves
    pub fn is_active(&self) -> bool {
        self.state != State::Idle
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_pending
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    /// Reply to the last request that produced one
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn config(&self) -> &LinkConfig {
        self.transport.config()
    }

    pub fn buffer(&self) -> &TransferBuffer {
        &self.buffer
    }

    pub fn bus(&self) -> &B {
        self.transport.bus()
    }

    pub fn bus_mut(&mut self) -> &mut B {
        self.transport.bus_mut()
    }

    pub fn release(self) -> (B, D, C, R) {
        let (bus, delay, clock) = self.transport.release();
        (bus, delay, clock, self.restart)
    }

    /// Start a new request named `name`
    pub fn begin(&mut self, name: &str) -> Result<()> {
        if self.restart_pending {
            return Err(LinkError::RestartPending);
        }
        if self.is_active() {
            return Err(LinkError::AlreadyActive);
        }
        self.request = Some(Request::new(name));
        self.state = State::Building;
        Ok(())
    }

    /// The request being built
    pub fn request_mut(&mut self) -> Result<&mut Request> {
        match (self.state, self.request.as_mut()) {
            (State::Building, Some(request)) => Ok(request),
            _ => Err(LinkError::NoActiveRequest),
        }
    }

    pub fn add_string(&mut self, field: &str, value: &str) -> Result<()> {
        self.request_mut()?.add_string(field, value)
    }

    pub fn add_bool(&mut self, field: &str, value: bool) -> Result<()> {
        self.request_mut()?.add_bool(field, value)
    }

    pub fn add_integer(&mut self, field: &str, value: i64) -> Result<()> {
        self.request_mut()?.add_integer(field, value)
    }

    pub fn add_nested_string(&mut self, field: &str, nested: &str, value: &str) -> Result<()> {
        self.request_mut()?.add_nested_string(field, nested, value)
    }

    pub fn add_binary(&mut self, field: &str, payload: &[u8]) -> Result<()> {
        self.request_mut()?.add_binary(field, payload)
    }

    pub fn add_value(&mut self, field: &str, value: Value) -> Result<()> {
        self.request_mut()?.add_value(field, value)
    }

    /// Drop a request that has not been sent yet
    pub fn discard(&mut self) -> bool {
        if self.state != State::Building {
            return false;
        }
        self.request = None;
        self.state = State::Idle;
        true
    }

    fn take_request(&mut self) -> Result<Request> {
        if self.state != State::Building {
            return Err(LinkError::NoActiveRequest);
        }
        self.request.take().ok_or(LinkError::NoActiveRequest)
    }

    /// Send the request and wait for the reply
    pub fn send(&mut self) -> Result<&Response> {
        let request = self.take_request()?;
        self.stats.requests += 1;

        let result = self.exchange(&request);
        self.finish(result)?;
        Ok(&self.response)
    }

    /// Send the request as a command: the peripheral does not reply
    pub fn send_command(&mut self) -> Result<()> {
        let request = self.take_request()?;
        self.stats.requests += 1;

        let result = request
            .to_command_bytes()
            .and_then(|body| self.transmit(request.name(), &body));
        self.finish(result)
    }

    fn transmit(&mut self, name: &str, body: &[u8]) -> Result<()> {
        self.state = State::Sending;
        debug!("{} request: {}", name, printable(body));

        self.buffer.load_request(body)?;
        self.transport.write_message(self.buffer.as_slice())
    }

    fn exchange(&mut self, request: &Request) -> Result<()> {
        self.response = Response::default();
        let body = request.to_bytes()?;
        self.transmit(request.name(), &body)?;

        self.state = State::AwaitingReply;
        self.transport.read_message(&mut self.buffer)?;

        let response = Response::parse(self.buffer.as_slice()).map_err(|err| {
            warn!("unparseable reply: {}", printable(self.buffer.as_slice()));
            err
        })?;
        debug!("{} response: {}", request.name(), printable(self.buffer.as_slice()));

        let failure = response.err().map(classify);
        self.response = response;
        match failure {
            Some(err) if err.requires_restart() => Err(LinkError::ResourceExhausted(err)),
            Some(err) => Err(LinkError::Protocol(err)),
            None => Ok(()),
        }
    }

    /// Every terminal path ends here: release the slot, record the outcome
    fn finish(&mut self, result: Result<()>) -> Result<()> {
        self.request = None;
        self.state = State::Idle;

        match result {
            Ok(()) => {
                self.stats.successes += 1;
                self.last_outcome = Some(Outcome::Success);
                Ok(())
            }
            Err(err) => {
                match &err {
                    LinkError::Bus(_) => {
                        self.stats.bus_faults += 1;
                        self.stats.resets += 1;
                    }
                    LinkError::Timeout => self.stats.timeouts += 1,
                    LinkError::Parse => self.stats.parse_errors += 1,
                    LinkError::Protocol(peripheral) => {
                        self.stats.protocol_errors += 1;
                        warn!("peripheral error: {}", peripheral.text());
                    }
                    LinkError::ResourceExhausted(_) => {
                        self.stats.protocol_errors += 1;
                        self.escalate();
                    }
                    _ => {}
                }
                self.last_outcome = Some(Outcome::Failure(err.kind()));
                Err(err)
            }
        }
    }

    /// Peripheral and local state can no longer be trusted: restart the device
    fn escalate(&mut self) {
        if self.restart_pending {
            return;
        }
        self.restart_pending = true;
        self.stats.restarts += 1;
        error!("peripheral out of memory, requesting device restart");
        self.restart.restart();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sim_time, RestartCounter, SimClock, SimDelay, SimNotecard};

    type SimCard<'a> = Notecard<&'a mut SimNotecard, SimDelay, SimClock, RestartCounter>;

    fn card(sim: &mut SimNotecard) -> SimCard<'_> {
        let (delay, clock) = sim_time();
        Notecard::new(
            sim,
            delay,
            clock,
            RestartCounter::new(),
            LinkConfig::without_delays(),
        )
        .unwrap()
    }

    #[test]
    fn second_begin_fails_without_touching_bus() {
        let mut sim = SimNotecard::new();
        let mut card = card(&mut sim);

        card.begin("hub.get").unwrap();
        assert_eq!(card.state(), State::Building);
        assert_eq!(card.begin("hub.set"), Err(LinkError::AlreadyActive));
        assert_eq!(card.request_mut().unwrap().name(), "hub.get");
        drop(card);

        assert_eq!(sim.segments(), 0);
        assert_eq!(sim.probes(), 0);
    }

    #[test]
    fn fields_need_begin() {
        let mut sim = SimNotecard::new();
        let mut card = card(&mut sim);

        assert_eq!(card.add_bool("sync", true), Err(LinkError::NoActiveRequest));
        assert_eq!(card.add_binary("payload", b"abc"), Err(LinkError::NoActiveRequest));
        assert_eq!(card.send().err(), Some(LinkError::NoActiveRequest));
        assert_eq!(card.send_command(), Err(LinkError::NoActiveRequest));
        assert!(!card.is_active());
        assert_eq!(card.stats().requests, 0);
    }

    #[test]
    fn reserved_field_leaves_request_intact() {
        let mut sim = SimNotecard::new();
        let mut card = card(&mut sim);

        card.begin("hub.get").unwrap();
        assert_eq!(card.add_string("req", "hub.set"), Err(LinkError::ReservedField));
        assert!(card.is_active());
        card.send().unwrap();
        drop(card);

        assert_eq!(sim.last_request().unwrap()["req"], "hub.get");
    }

    #[test]
    fn discard_releases_the_slot() {
        let mut sim = SimNotecard::new();
        let mut card = card(&mut sim);

        assert!(!card.discard());
        card.begin("card.time").unwrap();
        assert!(card.discard());
        assert!(!card.is_active());
        card.begin("card.version").unwrap();
        assert!(card.is_active());
    }

    #[test]
    fn send_returns_reply_and_goes_idle() {
        let mut sim = SimNotecard::new();
        sim.reply(b"{\"version\":\"notecard-7.2.2\"}\n");
        let mut card = card(&mut sim);

        card.begin("card.version").unwrap();
        let version = card.send().unwrap().get_str("version").map(str::to_owned);
        assert_eq!(version.as_deref(), Some("notecard-7.2.2"));
        assert_eq!(card.state(), State::Idle);
        assert_eq!(card.last_outcome(), Some(Outcome::Success));
        assert_eq!(card.stats().successes, 1);
    }

    #[test]
    fn command_skips_the_reply() {
        let mut sim = SimNotecard::new();
        let mut card = card(&mut sim);

        card.begin("card.location.mode").unwrap();
        card.add_bool("delete", true).unwrap();
        card.send_command().unwrap();
        assert!(!card.is_active());
        drop(card);

        assert_eq!(sim.probes(), 0);
        let sent = sim.last_request().unwrap();
        assert_eq!(sent["cmd"], "card.location.mode");
        assert_eq!(sent["delete"], true);
    }

    #[test]
    fn oversized_request_fails_before_the_bus() {
        let mut sim = SimNotecard::new();
        let (delay, clock) = sim_time();
        let config = LinkConfig {
            buffer_grow: 32,
            buffer_limit: 64,
            ..LinkConfig::without_delays()
        };
        let mut card = Notecard::new(&mut sim, delay, clock, RestartCounter::new(), config).unwrap();

        card.begin("note.add").unwrap();
        card.add_string("body", &"x".repeat(80)).unwrap();
        assert_eq!(card.send().err(), Some(LinkError::Overflow));
        assert!(!card.is_active());
        assert_eq!(card.last_outcome(), Some(Outcome::Failure(ErrorKind::Transport)));
        drop(card);

        assert_eq!(sim.segments(), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut sim = SimNotecard::new();
        let (delay, clock) = sim_time();
        let config = LinkConfig {
            segment_max: 0,
            ..LinkConfig::default()
        };
        assert!(Notecard::new(&mut sim, delay, clock, RestartCounter::new(), config).is_err());
    }
}
