//! ATmega128A TWI (I2C) master implementing `Bus`

use avr_device::atmega128a::TWI;
use core::marker::PhantomData;

use super::bus::{Bus, BusFault};

/// Status polls before a TWI step is declared hung
const SPIN_LIMIT: u16 = 20_000;

/// TWI speed modes
#[derive(Clone, Copy)]
pub enum TwiSpeed {
    Standard100k,
    Fast400k,
}

/// TWI status codes
#[derive(Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum TwiStatus {
    StartTransmitted = 0x08,
    RepStartTransmitted = 0x10,
    AddrWriteAck = 0x18,
    AddrWriteNack = 0x20,
    DataWriteAck = 0x28,
    DataWriteNack = 0x30,
    ArbitrationLost = 0x38,
    AddrReadAck = 0x40,
    AddrReadNack = 0x48,
    DataReadAck = 0x50,
    DataReadNack = 0x58,
}

fn fault_for(status: u8) -> BusFault {
    match status {
        s if s == TwiStatus::AddrWriteNack as u8 || s == TwiStatus::AddrReadNack as u8 => {
            BusFault::AddressNack
        }
        s if s == TwiStatus::DataWriteNack as u8 => BusFault::DataNack,
        _ => BusFault::Other,
    }
}

/// TWI peripheral driver
pub struct Twi {
    speed: TwiSpeed,
    _twi: PhantomData<TWI>,
}

impl Twi {
    /// Create new TWI instance
    pub fn new(speed: TwiSpeed) -> Self {
        let mut twi = Self {
            speed,
            _twi: PhantomData,
        };
        twi.enable();
        twi
    }

    fn enable(&mut self) {
        unsafe {
            let p = TWI::ptr();
            // Enable TWI with internal pullups
            (*p).twcr.write(|w| w.bits(0x44));
        }
        self.set_speed(self.speed);
    }

    /// Set TWI speed
    pub fn set_speed(&mut self, speed: TwiSpeed) {
        self.speed = speed;
        unsafe {
            let p = TWI::ptr();
            match speed {
                TwiSpeed::Standard100k => {
                    (*p).twbr.write(|w| w.bits(72)); // 100kHz @ 16MHz
                    (*p).twsr.write(|w| w.bits(0));
                }
                TwiSpeed::Fast400k => {
                    (*p).twbr.write(|w| w.bits(12)); // 400kHz @ 16MHz
                    (*p).twsr.write(|w| w.bits(0));
                }
            }
        }
    }

    fn wait(&mut self) -> Result<u8, BusFault> {
        unsafe {
            let p = TWI::ptr();
            let mut spins = 0u16;
            while (*p).twcr.read().bits() & 0x80 == 0 {
                spins += 1;
                if spins >= SPIN_LIMIT {
                    return Err(BusFault::Timeout);
                }
            }
            Ok((*p).twsr.read().bits() & 0xF8)
        }
    }

    fn start(&mut self) -> Result<(), BusFault> {
        unsafe {
            (*TWI::ptr()).twcr.write(|w| w.bits(0xA4));
        }
        match self.wait()? {
            s if s == TwiStatus::StartTransmitted as u8
                || s == TwiStatus::RepStartTransmitted as u8 =>
            {
                Ok(())
            }
            s => Err(fault_for(s)),
        }
    }

    fn stop(&mut self) {
        unsafe {
            let p = TWI::ptr();
            (*p).twcr.write(|w| w.bits(0x94));
            let mut spins = 0u16;
            while (*p).twcr.read().bits() & 0x10 != 0 && spins < SPIN_LIMIT {
                spins += 1;
            }
        }
    }

    fn send(&mut self, byte: u8, ok: TwiStatus) -> Result<(), BusFault> {
        unsafe {
            let p = TWI::ptr();
            (*p).twdr.write(|w| w.bits(byte));
            (*p).twcr.write(|w| w.bits(0x84));
        }
        match self.wait()? {
            s if s == ok as u8 => Ok(()),
            s => Err(fault_for(s)),
        }
    }

    fn receive(&mut self, ack: bool) -> Result<u8, BusFault> {
        unsafe {
            (*TWI::ptr()).twcr.write(|w| w.bits(if ack { 0xC4 } else { 0x84 }));
        }
        match self.wait()? {
            s if s == TwiStatus::DataReadAck as u8 || s == TwiStatus::DataReadNack as u8 => unsafe {
                Ok((*TWI::ptr()).twdr.read().bits())
            },
            s => Err(fault_for(s)),
        }
    }

    fn write_frame(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusFault> {
        self.start()?;
        self.send(address << 1, TwiStatus::AddrWriteAck)?;
        for &byte in bytes {
            self.send(byte, TwiStatus::DataWriteAck)?;
        }
        Ok(())
    }

    fn read_frame(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusFault> {
        self.start()?;
        self.send((address << 1) | 1, TwiStatus::AddrReadAck)?;
        let last = buffer.len().saturating_sub(1);
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.receive(i < last)?;
        }
        Ok(())
    }
}

impl Bus for Twi {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusFault> {
        let result = self.write_frame(address, bytes);
        self.stop();
        result
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), BusFault> {
        let result = self.read_frame(address, buffer);
        self.stop();
        result
    }

    fn reset(&mut self) {
        unsafe {
            // TWEN off releases SDA/SCL and drops any half-finished transfer
            (*TWI::ptr()).twcr.write(|w| w.bits(0));
        }
        self.enable();
    }
}
