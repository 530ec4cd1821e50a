//! Transfer buffer shared by the frame writer and reader

use alloc::vec::Vec;

use super::{LinkError, Result};
use crate::config::TERMINATOR;

/// Byte arena with a logical length and a bounded, stepwise allocation
///
/// The allocation starts at one growth step and grows by at least one step
/// at a time, never past `limit`.
#[derive(Debug)]
pub struct TransferBuffer {
    data: Vec<u8>,
    alloc_len: usize,
    grow: usize,
    limit: usize,
    growths: u32,
}

impl TransferBuffer {
    pub fn new(grow: usize, limit: usize) -> Self {
        let alloc_len = grow.min(limit);
        Self {
            data: Vec::with_capacity(alloc_len),
            alloc_len,
            grow,
            limit,
            growths: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes the buffer may hold before the next growth step
    pub fn allocated(&self) -> usize {
        self.alloc_len
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Growth steps taken since creation
    pub fn growths(&self) -> u32 {
        self.growths
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn last(&self) -> Option<u8> {
        self.data.last().copied()
    }

    pub fn ends_with_terminator(&self) -> bool {
        self.last() == Some(TERMINATOR)
    }

    /// Drop the content, keeping the current allocation
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Make room for `additional` more bytes, growing in one step if needed
    pub fn reserve_for(&mut self, additional: usize) -> Result<()> {
        let needed = self.data.len() + additional;
        if needed <= self.alloc_len {
            return Ok(());
        }
        if needed > self.limit {
            return Err(LinkError::Overflow);
        }

        let step = additional.max(self.grow);
        let alloc_len = (self.alloc_len + step).min(self.limit).max(needed);

        let mut grown = Vec::with_capacity(alloc_len);
        grown.extend_from_slice(&self.data);
        self.data = grown;
        self.alloc_len = alloc_len;
        self.growths += 1;

        log::trace!("transfer buffer grown to {} bytes", alloc_len);
        Ok(())
    }

    /// Append `bytes` whole; grows first, never splits the append
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve_for(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Replace the content with a serialized request plus terminator
    pub fn load_request(&mut self, body: &[u8]) -> Result<()> {
        if body.len() + 1 > self.limit {
            return Err(LinkError::Overflow);
        }
        self.clear();
        self.append(body)?;
        self.append(&[TERMINATOR])
    }
}
