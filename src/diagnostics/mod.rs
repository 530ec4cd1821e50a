//! Peripheral error classification, restart escalation and link counters

use alloc::string::String;

/// Failure class reported by the peripheral inside a well-formed reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralErrorKind {
    /// Out of memory; escalated to a device restart
    InsufficientMemory,
    Io,
    Busy,
    NotSupported,
    BadBinary,
    Other,
}

/// Known markers, matched case-insensitively against the `err` text.
/// The first match wins.
const MARKERS: &[(&str, PeripheralErrorKind)] = &[
    ("insufficient memory", PeripheralErrorKind::InsufficientMemory),
    ("{heap}", PeripheralErrorKind::InsufficientMemory),
    ("{mem}", PeripheralErrorKind::InsufficientMemory),
    ("{io}", PeripheralErrorKind::Io),
    ("{busy}", PeripheralErrorKind::Busy),
    ("{not-supported}", PeripheralErrorKind::NotSupported),
    ("{bad-bin}", PeripheralErrorKind::BadBinary),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralError {
    text: String,
    kind: PeripheralErrorKind,
}

impl PeripheralError {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> PeripheralErrorKind {
        self.kind
    }

    pub fn requires_restart(&self) -> bool {
        self.kind == PeripheralErrorKind::InsufficientMemory
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    needle.len() <= haystack.len()
        && haystack
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle))
}

/// Classify the text of a peripheral `err` field
pub fn classify(text: &str) -> PeripheralError {
    let kind = MARKERS
        .iter()
        .find(|(marker, _)| contains_ignore_case(text, marker))
        .map(|&(_, kind)| kind)
        .unwrap_or(PeripheralErrorKind::Other);

    PeripheralError {
        text: String::from(text),
        kind,
    }
}

/// Receiver of the device restart escalation
pub trait Restart {
    fn restart(&mut self);
}

impl<F> Restart for F
where
    F: FnMut(),
{
    fn restart(&mut self) {
        self()
    }
}

/// Running counters for one link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub requests: u32,
    pub successes: u32,
    pub bus_faults: u32,
    pub resets: u32,
    pub timeouts: u32,
    pub protocol_errors: u32,
    pub parse_errors: u32,
    pub restarts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_markers_require_restart() {
        let err = classify("insufficient memory");
        assert_eq!(err.kind(), PeripheralErrorKind::InsufficientMemory);
        assert!(err.requires_restart());

        let err = classify("cannot allocate note {heap}");
        assert!(err.requires_restart());

        let err = classify("Insufficient Memory to process request");
        assert!(err.requires_restart());
    }

    #[test]
    fn recognizes_enumerated_markers() {
        assert_eq!(classify("{io} i2c timeout").kind(), PeripheralErrorKind::Io);
        assert_eq!(classify("modem {busy}").kind(), PeripheralErrorKind::Busy);
        assert_eq!(
            classify("{not-supported} wifi").kind(),
            PeripheralErrorKind::NotSupported
        );
        assert_eq!(
            classify("payload {bad-bin}").kind(),
            PeripheralErrorKind::BadBinary
        );
    }

    #[test]
    fn unknown_text_is_other_and_kept_verbatim() {
        let err = classify("unknown request: card.nope");
        assert_eq!(err.kind(), PeripheralErrorKind::Other);
        assert_eq!(err.text(), "unknown request: card.nope");
        assert!(!err.requires_restart());
        assert_eq!(classify("").kind(), PeripheralErrorKind::Other);
    }

    #[test]
    fn closures_receive_restart() {
        let mut fired = 0;
        {
            let mut sink = || fired += 1;
            sink.restart();
        }
        assert_eq!(fired, 1);
    }
}
