//! JSON request/response protocol stack

pub mod buffer;
pub mod document;
pub mod transport;

use core::fmt;

use crate::diagnostics::PeripheralError;
use crate::hal::BusFault;

pub use buffer::TransferBuffer;
pub use document::{Request, Response};
pub use transport::Transport;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// A request is already in flight
    AlreadyActive,
    /// Field added or send attempted without `begin`
    NoActiveRequest,
    /// `req` and `cmd` carry the request name and cannot be set as fields
    ReservedField,
    /// The peripheral ran out of memory; only a device restart recovers
    RestartPending,
    /// Bus transaction failed
    Bus(BusFault),
    /// Reply framing did not match the poll protocol
    Mismatch(&'static str),
    /// Message exceeded the transfer buffer's hard capacity
    Overflow,
    /// No complete reply within the read ceiling
    Timeout,
    /// Reply bytes were not a JSON object
    Parse,
    /// The peripheral reported an error in a well-formed reply
    Protocol(PeripheralError),
    /// The peripheral reported it is out of memory
    ResourceExhausted(PeripheralError),
    InvalidConfig(&'static str),
}

/// Caller-facing failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Protocol,
    ResourceExhausted,
    Timeout,
    Parse,
    /// API misuse: wrong state or invalid configuration
    Usage,
}

impl LinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::Bus(_) | LinkError::Mismatch(_) | LinkError::Overflow => {
                ErrorKind::Transport
            }
            LinkError::Timeout => ErrorKind::Timeout,
            LinkError::Parse => ErrorKind::Parse,
            LinkError::Protocol(_) => ErrorKind::Protocol,
            LinkError::ResourceExhausted(_) | LinkError::RestartPending => {
                ErrorKind::ResourceExhausted
            }
            LinkError::AlreadyActive
            | LinkError::NoActiveRequest
            | LinkError::ReservedField
            | LinkError::InvalidConfig(_) => ErrorKind::Usage,
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::AlreadyActive => write!(f, "a request is already active"),
            LinkError::NoActiveRequest => write!(f, "no request has been started"),
            LinkError::ReservedField => write!(f, "field name is reserved for the request name"),
            LinkError::RestartPending => write!(f, "device restart pending"),
            LinkError::Bus(fault) => write!(f, "bus error: {}", fault),
            LinkError::Mismatch(what) => write!(f, "protocol mismatch: {}", what),
            LinkError::Overflow => write!(f, "transfer buffer overflow"),
            LinkError::Timeout => write!(f, "no response"),
            LinkError::Parse => write!(f, "reply is not a JSON object"),
            LinkError::Protocol(err) => write!(f, "peripheral error: {}", err.text()),
            LinkError::ResourceExhausted(err) => {
                write!(f, "peripheral out of memory: {}", err.text())
            }
            LinkError::InvalidConfig(what) => write!(f, "invalid configuration: {}", what),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LinkError {}

impl From<BusFault> for LinkError {
    fn from(fault: BusFault) -> Self {
        LinkError::Bus(fault)
    }
}

impl ErrorKind {
    fn name(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Parse => "parse",
            ErrorKind::Usage => "usage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ufmt::uDisplay for ErrorKind {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> core::result::Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.write_str(self.name())
    }
}

pub type Result<T> = core::result::Result<T, LinkError>;
