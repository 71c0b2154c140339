//! Device control registers of the DMA engine.
//!
//! 64-bit values are split across two 32-bit registers (`*0` holds the low half).

use super::descriptor::{Direction, TransferId, TransferRequest};
use serde::{Deserialize, Serialize};

pub const SRC_ADDR0: u32 = 0x006;
pub const SRC_ADDR1: u32 = 0x007;
pub const DST_ADDR0: u32 = 0x008;
pub const DST_ADDR1: u32 = 0x009;
pub const SIZE0: u32 = 0x00A;
pub const SIZE1: u32 = 0x00B;
pub const CORE_ID: u32 = 0x00C;
pub const CTRL: u32 = 0x00D;
pub const STATUS: u32 = 0x00E;

pub const CTRL_START: u32 = 1 << 0;
pub const CTRL_DIRECTION: u32 = 1 << 1;

/// Whether `addr` is a register of the DMA engine.
#[must_use]
pub fn is_dma_dcr(addr: u32) -> bool {
    (SRC_ADDR0..=STATUS).contains(&addr)
}

/// One-hot status register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum Status {
    Idle = 1 << 0,
    Busy = 1 << 1,
    Done = 1 << 2,
    Error = 1 << 3,
}

impl Status {
    #[must_use]
    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// When the status register returns to `Idle` after `Done` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusPolicy {
    /// The outcome stays visible until software reads the status register once.
    ClearOnRead,
    /// The engine returns to `Idle` as soon as the outcome is recorded,
    /// including a `START` that was rejected.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    pub src_addr: u64,
    pub dst_addr: u64,
    pub size: u64,
    pub core_id: u32,
    pub ctrl: u32,
    status: Status,
    /// Transfer started through the registers whose outcome the status reports
    transfer: Option<TransferId>,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            src_addr: 0,
            dst_addr: 0,
            size: 0,
            core_id: 0,
            ctrl: 0,
            status: Status::Idle,
            transfer: None,
        }
    }
}

fn set_low(value: &mut u64, low: u32) {
    *value = (*value & !0xFFFF_FFFF) | u64::from(low);
}

fn set_high(value: &mut u64, high: u32) {
    *value = (*value & 0xFFFF_FFFF) | (u64::from(high) << 32);
}

impl Registers {
    /// Store a register value.
    ///
    /// Returns `true` if the write set the START bit.
    pub fn write(&mut self, addr: u32, value: u32) -> bool {
        match addr {
            SRC_ADDR0 => set_low(&mut self.src_addr, value),
            SRC_ADDR1 => set_high(&mut self.src_addr, value),
            DST_ADDR0 => set_low(&mut self.dst_addr, value),
            DST_ADDR1 => set_high(&mut self.dst_addr, value),
            SIZE0 => set_low(&mut self.size, value),
            SIZE1 => set_high(&mut self.size, value),
            CORE_ID => self.core_id = value,
            CTRL => {
                self.ctrl = value;
                return value & CTRL_START != 0;
            }
            STATUS => log::warn!("dma: ignoring write to read-only status register"),
            other => log::warn!("dma: ignoring write to unknown register {other:#x}"),
        }
        false
    }

    #[must_use]
    pub fn read(&self, addr: u32) -> u32 {
        match addr {
            SRC_ADDR0 => self.src_addr as u32,
            SRC_ADDR1 => (self.src_addr >> 32) as u32,
            DST_ADDR0 => self.dst_addr as u32,
            DST_ADDR1 => (self.dst_addr >> 32) as u32,
            SIZE0 => self.size as u32,
            SIZE1 => (self.size >> 32) as u32,
            CORE_ID => self.core_id,
            CTRL => self.ctrl,
            STATUS => self.status.bits(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        Direction::from_bit(self.ctrl & CTRL_DIRECTION != 0)
    }

    /// The transfer described by the current register contents.
    #[must_use]
    pub fn request(&self) -> TransferRequest {
        TransferRequest {
            dst_addr: self.dst_addr,
            src_addr: self.src_addr,
            size: self.size,
            direction: self.direction(),
            core_id: self.core_id as usize,
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn transfer(&self) -> Option<TransferId> {
        self.transfer
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.status == Status::Busy
    }

    /// START self-clears one engine step after it was written.
    pub fn clear_start(&mut self) {
        self.ctrl &= !CTRL_START;
    }

    pub fn started(&mut self, id: TransferId) {
        self.status = Status::Busy;
        self.transfer = Some(id);
    }

    pub fn rejected(&mut self) {
        self.status = Status::Error;
        self.transfer = None;
    }

    /// Record the outcome of the register-started transfer.
    pub fn finished(&mut self, success: bool) {
        self.status = if success {
            Status::Done
        } else {
            Status::Error
        };
    }

    /// Return to idle after the outcome was observed.
    ///
    /// Returns the transfer the observed outcome belonged to.
    pub fn observed(&mut self) -> Option<TransferId> {
        match self.status {
            Status::Done | Status::Error => {
                self.status = Status::Idle;
                self.transfer.take()
            }
            Status::Idle | Status::Busy => None,
        }
    }
}
