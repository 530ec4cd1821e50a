//! Bus transaction primitive shared by every back-end

use core::fmt;

use embedded_hal::blocking::i2c;

/// Classified bus transaction failure
///
/// The numeric codes follow the Wire `endTransmission()` convention so that
/// firmware logs line up with vendor documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BusFault {
    /// Data too long to fit in the transmit buffer
    TooLong = 1,
    /// NACK on transmit of the address
    AddressNack = 2,
    /// NACK on transmit of data
    DataNack = 3,
    /// Any other bus error
    Other = 4,
    /// Bus-level timeout
    Timeout = 5,
}

impl BusFault {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(BusFault::TooLong),
            2 => Some(BusFault::AddressNack),
            3 => Some(BusFault::DataNack),
            5 => Some(BusFault::Timeout),
            _ => Some(BusFault::Other),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    fn describe(self) -> &'static str {
        match self {
            BusFault::TooLong => "data too long to fit in transmit buffer",
            BusFault::AddressNack => "received NACK on transmit of address",
            BusFault::DataNack => "received NACK on transmit of data",
            BusFault::Other => "unknown bus error",
            BusFault::Timeout => "bus timeout",
        }
    }
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

impl ufmt::uDisplay for BusFault {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> core::result::Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.write_str(self.describe())
    }
}

/// Addressable byte bus
///
/// Implementations perform one complete transaction per call. Only one owner
/// may drive a bus instance at a time.
pub trait Bus {
    /// START - ADDR(W) - bytes - STOP
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusFault>;

    /// START - ADDR(R) - buffer.len() bytes - STOP
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusFault>;

    /// Tear down and reinitialize the bus handle.
    ///
    /// Must be safe to call on a healthy bus.
    fn reset(&mut self);
}

impl<T: Bus + ?Sized> Bus for &mut T {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusFault> {
        (**self).write(address, bytes)
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusFault> {
        (**self).read(address, buffer)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// `Bus` over any blocking embedded-hal I2C implementation
pub struct HalBus<I> {
    i2c: I,
    reset_hook: Option<fn(&mut I)>,
    resets: u32,
}

impl<I, E> HalBus<I>
where
    I: i2c::Write<Error = E> + i2c::Read<Error = E>,
    BusFault: From<E>,
{
    pub fn new(i2c: I) -> Self {
        Self {
            i2c,
            reset_hook: None,
            resets: 0,
        }
    }

    /// Run `hook` on every bus reset, e.g. to re-run the peripheral's init
    pub fn with_reset(i2c: I, hook: fn(&mut I)) -> Self {
        Self {
            i2c,
            reset_hook: Some(hook),
            resets: 0,
        }
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I, E> Bus for HalBus<I>
where
    I: i2c::Write<Error = E> + i2c::Read<Error = E>,
    BusFault: From<E>,
{
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusFault> {
        self.i2c.write(address, bytes).map_err(BusFault::from)
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusFault> {
        self.i2c.read(address, buffer).map_err(BusFault::from)
    }

    fn reset(&mut self) {
        self.resets = self.resets.wrapping_add(1);
        if let Some(hook) = self.reset_hook {
            hook(&mut self.i2c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use embedded_hal_mock::MockError;
    use std::io::ErrorKind;

    #[test]
    fn wire_codes_round_trip() {
        assert_eq!(BusFault::from_code(0), None);
        assert_eq!(BusFault::from_code(2), Some(BusFault::AddressNack));
        assert_eq!(BusFault::from_code(4), Some(BusFault::Other));
        assert_eq!(BusFault::from_code(9), Some(BusFault::Other));
        assert_eq!(BusFault::DataNack.code(), 3);
    }

    #[test]
    fn fault_text_is_available_through_ufmt() {
        let mut out = String::new();
        ufmt::uDisplay::fmt(&BusFault::AddressNack, &mut ufmt::Formatter::new(&mut out)).unwrap();
        assert_eq!(out, "received NACK on transmit of address");
        assert_eq!(format!("{}", BusFault::Timeout), "bus timeout");
    }

    #[test]
    fn hal_bus_forwards_transactions() {
        let expectations = [
            I2cTransaction::write(0x17, vec![0x00, 0x00]),
            I2cTransaction::read(0x17, vec![0x05, 0x00]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bus = HalBus::new(i2c.clone());

        bus.write(0x17, &[0x00, 0x00]).unwrap();
        let mut header = [0u8; 2];
        bus.read(0x17, &mut header).unwrap();
        assert_eq!(header, [0x05, 0x00]);

        i2c.done();
    }

    #[test]
    fn hal_bus_maps_errors_and_counts_resets() {
        let expectations = [I2cTransaction::write(0x17, vec![0x01, b'{'])
            .with_error(MockError::Io(ErrorKind::AddrNotAvailable))];
        let mut i2c = I2cMock::new(&expectations);
        let mut bus = HalBus::with_reset(i2c.clone(), |_| {});

        assert_eq!(bus.write(0x17, &[0x01, b'{']), Err(BusFault::AddressNack));
        bus.reset();
        bus.reset();
        assert_eq!(bus.resets(), 2);

        i2c.done();
    }
}
