use crate::address;
use crate::memory::{Backing, OutOfRange, TimedMemory};

/// Per-core scratchpad addressed by offset from the start of the local window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scratchpad {
    data: Box<[u8]>,
}

impl Scratchpad {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size].into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn range(&self, addr: address, size: usize) -> Result<std::ops::Range<usize>, OutOfRange> {
        let err = OutOfRange {
            addr,
            size,
            capacity: self.data.len() as u64,
        };
        let start = usize::try_from(addr).map_err(|_| err)?;
        let end = start.checked_add(size).ok_or(err)?;
        if end > self.data.len() {
            return Err(err);
        }
        Ok(start..end)
    }
}

impl Backing for Scratchpad {
    fn read(&self, addr: address, buf: &mut [u8]) -> Result<(), OutOfRange> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, addr: address, data: &[u8]) -> Result<(), OutOfRange> {
        let range = self.range(addr, data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }
}

/// A core's local memory with its timing front end.
pub type LocalMem = TimedMemory<Scratchpad>;
