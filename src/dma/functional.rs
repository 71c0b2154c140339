//! Synchronous single-shot copy.
//!
//! Behaves like a one-channel engine without startup latency that completes
//! within the cycle it was started.

use super::config::Config;
use super::descriptor::{Direction, TransferRequest, ValidationError};
use crate::memory::{Backing, OutOfRange};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Memory(#[from] OutOfRange),
}

/// Copy `req.size` bytes between `global` and the `local` scratchpad of `req.core_id`.
///
/// Counts as one transfer of latency one in `stats`.
pub fn copy<G, L>(
    config: &Config,
    req: &TransferRequest,
    global: &mut G,
    local: &mut L,
    stats: &mut stats::DMA,
) -> Result<(), Error>
where
    G: Backing + ?Sized,
    L: Backing + ?Sized,
{
    if let Err(err) = req.validate(config) {
        stats.errors += 1;
        return Err(err.into());
    }
    let mut buf = vec![0; req.size as usize];
    let result = match req.direction {
        Direction::GlobalToLocal => global
            .read(req.src_addr, &mut buf)
            .and_then(|()| local.write(config.local_offset(req.dst_addr), &buf)),
        Direction::LocalToGlobal => local
            .read(config.local_offset(req.src_addr), &mut buf)
            .and_then(|()| global.write(req.dst_addr, &buf)),
    };
    stats.transfers += 1;
    stats.transfer_latency += 1;
    if let Err(err) = result {
        stats.errors += 1;
        return Err(err.into());
    }
    stats.bytes_read += req.size;
    stats.bytes_written += req.size;
    log::debug!("dma: synchronous copy {}", req);
    Ok(())
}
