use super::dcr::StatusPolicy;
use crate::address;
use crate::mem_fetch::MemorySpace;
use serde::{Deserialize, Serialize};

/// Base address of the local memory window (see `VX_config.h` of the device).
pub const LMEM_BASE_ADDR: address = 0xFFFF_0000;

/// Default local memory size per core.
pub const LMEM_SIZE: u64 = 16 * 1024;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("dma engine needs at least one channel")]
    NoChannels,
    #[error("descriptor queue capacity must be non-zero")]
    NoQueueCapacity,
    #[error("transfer size must be non-zero")]
    ZeroTransferSize,
    #[error("alignment {0} is not a power of two")]
    Alignment(u64),
    #[error("channels need at least one outstanding read and one outstanding write")]
    NoOutstanding,
    #[error("socket has no cores")]
    NoCores,
    #[error("local memory window at {base:#x} of {size} bytes wraps around the address space")]
    LocalWindow { base: address, size: u64 },
}

/// DMA engine configuration.
///
/// Immutable for the lifetime of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub socket_id: usize,
    /// Number of cores in the socket (valid target core ids)
    pub num_cores: usize,
    pub num_channels: usize,
    pub queue_capacity: usize,
    /// Bytes moved per sub-transaction (one cache line)
    pub transfer_size: u32,
    /// Cycles between claiming a descriptor and issuing the first request
    pub startup_latency: u64,
    pub max_outstanding_reads: usize,
    pub max_outstanding_writes: usize,
    /// Required address alignment in bytes, `0` means `transfer_size`
    pub alignment: u64,
    pub local_mem_base: address,
    pub local_mem_size: u64,
    pub status_policy: StatusPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_id: 0,
            num_cores: 4,
            num_channels: 4,
            queue_capacity: 16,
            transfer_size: 64,
            startup_latency: 2,
            max_outstanding_reads: 4,
            max_outstanding_writes: 4,
            alignment: 0,
            local_mem_base: LMEM_BASE_ADDR,
            local_mem_size: LMEM_SIZE,
            status_policy: StatusPolicy::ClearOnRead,
        }
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} channels, queue {}, {} byte units, startup {} cycles, {}/{} outstanding",
            self.num_channels,
            self.queue_capacity,
            self.transfer_size,
            self.startup_latency,
            self.max_outstanding_reads,
            self.max_outstanding_writes,
        )
    }
}

impl Config {
    /// Single-shot configuration.
    ///
    /// One channel, one queue slot and no startup latency.
    #[must_use]
    pub fn synchronous() -> Self {
        Self {
            num_channels: 1,
            queue_capacity: 1,
            startup_latency: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn alignment(&self) -> u64 {
        if self.alignment == 0 {
            u64::from(self.transfer_size)
        } else {
            self.alignment
        }
    }

    #[must_use]
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding_reads + self.max_outstanding_writes
    }

    /// Resolve the address space an address belongs to.
    #[must_use]
    pub fn space_of(&self, addr: address) -> MemorySpace {
        if self.in_local_window(addr) {
            MemorySpace::Local
        } else {
            MemorySpace::Global
        }
    }

    #[must_use]
    pub fn in_local_window(&self, addr: address) -> bool {
        addr >= self.local_mem_base && addr - self.local_mem_base < self.local_mem_size
    }

    /// Whether any byte of `[addr, addr + size)` falls into the local window.
    #[must_use]
    pub fn overlaps_local_window(&self, addr: address, size: u64) -> bool {
        let window_end = self.local_mem_base + self.local_mem_size;
        let end = addr.saturating_add(size);
        addr < window_end && end > self.local_mem_base
    }

    /// Offset of a local address within a core's scratchpad.
    #[must_use]
    pub fn local_offset(&self, addr: address) -> address {
        debug_assert!(self.in_local_window(addr));
        addr - self.local_mem_base
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.num_channels == 0 {
            return Err(Error::NoChannels);
        }
        if self.queue_capacity == 0 {
            return Err(Error::NoQueueCapacity);
        }
        if self.transfer_size == 0 {
            return Err(Error::ZeroTransferSize);
        }
        if !self.alignment().is_power_of_two() {
            return Err(Error::Alignment(self.alignment()));
        }
        if self.max_outstanding_reads == 0 || self.max_outstanding_writes == 0 {
            return Err(Error::NoOutstanding);
        }
        if self.num_cores == 0 {
            return Err(Error::NoCores);
        }
        if self
            .local_mem_base
            .checked_add(self.local_mem_size)
            .is_none()
        {
            return Err(Error::LocalWindow {
                base: self.local_mem_base,
                size: self.local_mem_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, Error};
    use crate::mem_fetch::MemorySpace;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.alignment(), 64);
        assert_eq!(config.max_outstanding(), 8);
        assert_eq!(Config::synchronous().validate(), Ok(()));
    }

    #[test]
    fn test_invalid_configs() {
        let config = Config {
            num_channels: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(Error::NoChannels));

        let config = Config {
            alignment: 48,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(Error::Alignment(48)));

        let config = Config {
            local_mem_base: u64::MAX,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::LocalWindow { .. })));
    }

    #[test]
    fn test_address_spaces() {
        let config = Config::default();
        assert_eq!(config.space_of(0x1000), MemorySpace::Global);
        assert_eq!(config.space_of(0xFFFF_0000), MemorySpace::Local);
        assert_eq!(config.space_of(0xFFFF_3FFF), MemorySpace::Local);
        assert_eq!(config.space_of(0xFFFF_4000), MemorySpace::Global);
        assert_eq!(config.local_offset(0xFFFF_0040), 0x40);
    }

    #[test]
    fn test_deserialize_partial_yaml() -> color_eyre::eyre::Result<()> {
        let config: Config = serde_yaml::from_str("num_channels: 2\nstartup_latency: 0\n")?;
        assert_eq!(config.num_channels, 2);
        assert_eq!(config.startup_latency, 0);
        assert_eq!(config.transfer_size, 64);
        Ok(())
    }
}
