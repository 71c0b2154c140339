use super::config::Config;
use crate::address;
use crate::mem_fetch::MemorySpace;
use serde::{Deserialize, Serialize};

/// Opaque, monotonically increasing transfer id.
pub type TransferId = u64;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum Direction {
    #[strum(serialize = "g2l")]
    GlobalToLocal,
    #[strum(serialize = "l2g")]
    LocalToGlobal,
}

impl Direction {
    /// Decode the CTRL direction bit (`0` is global to local).
    #[must_use]
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Self::LocalToGlobal
        } else {
            Self::GlobalToLocal
        }
    }

    #[must_use]
    pub fn bit(self) -> bool {
        self == Self::LocalToGlobal
    }

    #[must_use]
    pub fn src_space(self) -> MemorySpace {
        match self {
            Self::GlobalToLocal => MemorySpace::Global,
            Self::LocalToGlobal => MemorySpace::Local,
        }
    }

    #[must_use]
    pub fn dst_space(self) -> MemorySpace {
        match self {
            Self::GlobalToLocal => MemorySpace::Local,
            Self::LocalToGlobal => MemorySpace::Global,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum State {
    Idle,
    Startup,
    Transferring,
    Complete,
    Error,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transfer size is zero")]
    ZeroSize,
    #[error("core {core_id} does not exist (have {num_cores} cores)")]
    InvalidCore { core_id: usize, num_cores: usize },
    #[error("address {addr:#x} is not aligned to {alignment} bytes")]
    Misaligned { addr: address, alignment: u64 },
    #[error("{direction} transfer from {src} to {dst} memory")]
    DirectionMismatch {
        direction: Direction,
        src: MemorySpace,
        dst: MemorySpace,
    },
    #[error("{size} bytes at {addr:#x} exceed the {space} address space")]
    OutOfBounds {
        addr: address,
        size: u64,
        space: MemorySpace,
    },
}

/// A transfer as requested by software, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferRequest {
    pub dst_addr: address,
    pub src_addr: address,
    pub size: u64,
    pub direction: Direction,
    /// Socket-local id of the core whose scratchpad is the local side
    pub core_id: usize,
}

impl std::fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:#x} -> {:#x} ({} bytes, core {})",
            self.direction, self.src_addr, self.dst_addr, self.size, self.core_id
        )
    }
}

impl TransferRequest {
    /// The address on the local side of the transfer.
    #[must_use]
    pub fn local_addr(&self) -> address {
        match self.direction {
            Direction::GlobalToLocal => self.dst_addr,
            Direction::LocalToGlobal => self.src_addr,
        }
    }

    /// Check the request against the engine configuration.
    ///
    /// Checks run in a fixed order and the first failing one is reported.
    pub fn validate(&self, config: &Config) -> Result<(), ValidationError> {
        if self.size == 0 {
            return Err(ValidationError::ZeroSize);
        }
        if self.core_id >= config.num_cores {
            return Err(ValidationError::InvalidCore {
                core_id: self.core_id,
                num_cores: config.num_cores,
            });
        }
        let alignment = config.alignment();
        for addr in [self.src_addr, self.dst_addr] {
            if addr % alignment != 0 {
                return Err(ValidationError::Misaligned { addr, alignment });
            }
        }
        let (src, dst) = (config.space_of(self.src_addr), config.space_of(self.dst_addr));
        if src != self.direction.src_space() || dst != self.direction.dst_space() {
            return Err(ValidationError::DirectionMismatch {
                direction: self.direction,
                src,
                dst,
            });
        }

        let local = self.local_addr();
        let fits_local = config
            .local_offset(local)
            .checked_add(self.size)
            .is_some_and(|end| end <= config.local_mem_size);
        if !fits_local {
            return Err(ValidationError::OutOfBounds {
                addr: local,
                size: self.size,
                space: MemorySpace::Local,
            });
        }
        let global = match self.direction {
            Direction::GlobalToLocal => self.src_addr,
            Direction::LocalToGlobal => self.dst_addr,
        };
        // the whole global range has to stay clear of the local window
        if global.checked_add(self.size).is_none()
            || config.overlaps_local_window(global, self.size)
        {
            return Err(ValidationError::OutOfBounds {
                addr: global,
                size: self.size,
                space: MemorySpace::Global,
            });
        }
        Ok(())
    }
}

/// One admitted copy.
///
/// Owned by the descriptor queue, then by exactly one channel, and finally
/// summarized into the completion table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferDescriptor {
    pub id: TransferId,
    pub src_addr: address,
    pub dst_addr: address,
    pub size: u64,
    pub direction: Direction,
    pub core_id: usize,
    /// Cycle the descriptor was admitted
    pub issue_cycle: u64,
    /// Bytes acknowledged by the destination
    pub progress: u64,
    pub state: State,
    /// Whether the transfer was started through the control registers
    pub from_registers: bool,
}

impl std::fmt::Display for TransferDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Transfer#{}[{} {:#x} -> {:#x}, {}/{} bytes, {}]",
            self.id,
            self.direction,
            self.src_addr,
            self.dst_addr,
            self.progress,
            self.size,
            self.state
        )
    }
}

impl TransferDescriptor {
    #[must_use]
    pub fn new(id: TransferId, req: &TransferRequest, cycle: u64) -> Self {
        Self {
            id,
            src_addr: req.src_addr,
            dst_addr: req.dst_addr,
            size: req.size,
            direction: req.direction,
            core_id: req.core_id,
            issue_cycle: cycle,
            progress: 0,
            state: State::Idle,
            from_registers: false,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.size - self.progress
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.progress == self.size
    }
}
