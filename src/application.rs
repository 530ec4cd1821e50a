//! Common Notecard requests used by the sensor firmware
//! Each helper runs one or more complete request cycles on the caller's
//! `Notecard` and refuses to start while another request is in flight.

use embedded_hal::blocking::delay::DelayMs;
use log::info;

use crate::diagnostics::Restart;
use crate::drivers::Notecard;
use crate::hal::{Bus, Clock};
use crate::protocol::{Response, Result};

/// Notehub synchronisation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubMode {
    Continuous,
    Periodic,
}

impl HubMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HubMode::Continuous => "continuous",
            HubMode::Periodic => "periodic",
        }
    }
}

/// Attach the card to a Notehub project with heartbeats enabled
pub fn hub_set<B, D, C, R>(
    card: &mut Notecard<B, D, C, R>,
    product: &str,
    mode: HubMode,
    sync_seconds: u32,
) -> Result<()>
where
    B: Bus,
    D: DelayMs<u32>,
    C: Clock,
    R: Restart,
{
    info!("set product ID and connection mode");
    card.begin("hub.set")?;
    card.add_string("product", product)?;
    card.add_string("mode", mode.as_str())?;
    card.add_integer("seconds", i64::from(sync_seconds))?;
    card.add_bool("heartbeat", true)?;
    card.send()?;
    Ok(())
}

/// Notehub connection status, mainly for debugging
pub fn hub_status<B, D, C, R>(card: &mut Notecard<B, D, C, R>) -> Result<&Response>
where
    B: Bus,
    D: DelayMs<u32>,
    C: Clock,
    R: Restart,
{
    card.begin("hub.status")?;
    card.send()
}

fn attn_mode<B, D, C, R>(card: &mut Notecard<B, D, C, R>, mode: &str) -> Result<()>
where
    B: Bus,
    D: DelayMs<u32>,
    C: Clock,
    R: Restart,
{
    card.begin("card.attn")?;
    card.add_string("mode", mode)?;
    card.send()?;
    Ok(())
}

/// Have the card raise ATTN on motion, then arm the line.
///
/// The firmware attaches its edge interrupt (posting to an `AttnSignal`)
/// between the two requests; `on_motion_enabled` is that hook.
pub fn enable_attn<B, D, C, R, F>(card: &mut Notecard<B, D, C, R>, on_motion_enabled: F) -> Result<()>
where
    B: Bus,
    D: DelayMs<u32>,
    C: Clock,
    R: Restart,
    F: FnOnce(),
{
    info!("enable ATTN on motion");
    attn_mode(card, "motion")?;
    on_motion_enabled();
    info!("arm ATTN on motion");
    attn_mode(card, "arm")
}

pub fn disarm_attn<B, D, C, R>(card: &mut Notecard<B, D, C, R>) -> Result<()>
where
    B: Bus,
    D: DelayMs<u32>,
    C: Clock,
    R: Restart,
{
    attn_mode(card, "disarm")
}

/// Queue a note carrying a binary payload
pub fn add_note<'a, B, D, C, R>(
    card: &'a mut Notecard<B, D, C, R>,
    file: &str,
    payload: &[u8],
    sync: bool,
) -> Result<&'a Response>
where
    B: Bus,
    D: DelayMs<u32>,
    C: Clock,
    R: Restart,
{
    card.begin("note.add")?;
    card.add_string("file", file)?;
    card.add_binary("payload", payload)?;
    card.add_bool("sync", sync)?;
    card.send()
}
