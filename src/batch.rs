use crate::dma::Direction;
use crate::memory::Backing;
use crate::Simulation;
use color_eyre::eyre;
use itertools::Itertools;

/// Global memory the batch copies from or into.
pub const GLOBAL_BASE: u64 = 0x1000_0000;

/// A batch of equally sized transfers rotating over the cores of one socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Bytes per transfer
    pub size: u64,
    pub direction: Direction,
    pub transfers: usize,
    /// Global id of the first target core
    pub first_core: usize,
    pub max_cycles: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub index: usize,
    pub socket: usize,
    pub global_core: usize,
    /// Core id within `socket`
    pub core: usize,
    pub global_addr: u64,
}

#[must_use]
pub fn pattern(seed: usize, len: u64) -> Vec<u8> {
    (0..len).map(|i| (i as usize * 7 + seed * 13) as u8).collect()
}

/// Assign a core and a global buffer to every transfer.
pub fn plan(sim: &Simulation, options: &Options) -> eyre::Result<Vec<Transfer>> {
    let num_cores = sim.cores_per_socket();
    let socket = options.first_core / num_cores;
    let Some(config) = sim.sockets.get(socket).map(|socket| &socket.config) else {
        eyre::bail!("core {} does not exist", options.first_core);
    };
    let stride = options
        .size
        .next_multiple_of(config.dma_config().alignment());
    (0..options.transfers)
        .map(|index| -> eyre::Result<Transfer> {
            let global_core = socket * num_cores + (options.first_core + index) % num_cores;
            let core = config
                .local_core_id(global_core)
                .ok_or_else(|| eyre::eyre!("core {global_core} is not on socket {socket}"))?;
            Ok(Transfer {
                index,
                socket,
                global_core,
                core,
                global_addr: GLOBAL_BASE + index as u64 * stride,
            })
        })
        .collect()
}

/// Fill the source side of every transfer with its pattern.
pub fn prepare(sim: &mut Simulation, options: &Options, plan: &[Transfer]) -> eyre::Result<()> {
    for transfer in plan {
        let socket = &mut sim.sockets[transfer.socket];
        match options.direction {
            Direction::GlobalToLocal => socket
                .ram
                .backing
                .write(transfer.global_addr, &pattern(transfer.index, options.size))?,
            Direction::LocalToGlobal => socket.local_mems[transfer.core]
                .backing
                .write(0, &pattern(transfer.core, options.size))?,
        }
    }
    Ok(())
}

/// Submit all transfers and run until the simulation is idle.
///
/// The queue applies backpressure, a rejected transfer is retried every
/// cycle until it is admitted.
pub fn submit(sim: &mut Simulation, options: &Options, plan: &[Transfer]) -> eyre::Result<()> {
    for transfer in plan {
        let local_base = sim.sockets[transfer.socket].config.dma.local_mem_base;
        let (dst, src) = match options.direction {
            Direction::GlobalToLocal => (local_base, transfer.global_addr),
            Direction::LocalToGlobal => (transfer.global_addr, local_base),
        };
        while sim
            .trigger_dma_transfer(dst, src, options.size, options.direction, transfer.global_core)
            .is_none()
        {
            if sim.stats().dma.errors > 0 {
                eyre::bail!("transfer to core {} was rejected as invalid", transfer.global_core);
            }
            if sim.cycle_count() >= options.max_cycles {
                eyre::bail!(
                    "transfer to core {} not admitted within {} cycles",
                    transfer.global_core,
                    options.max_cycles
                );
            }
            sim.step()?;
        }
    }
    let remaining = options.max_cycles.saturating_sub(sim.cycle_count());
    sim.run_until_idle(remaining)?;
    Ok(())
}

/// Check the destination of every transfer holds its source bytes.
pub fn verify(sim: &Simulation, options: &Options, plan: &[Transfer]) -> eyre::Result<()> {
    // a scratchpad holds the data of the last transfer targeting its core
    let checked: Vec<&Transfer> = match options.direction {
        Direction::GlobalToLocal => plan.iter().rev().unique_by(|t| t.global_core).collect(),
        Direction::LocalToGlobal => plan.iter().collect(),
    };
    for transfer in checked {
        let socket = &sim.sockets[transfer.socket];
        let (have, want) = match options.direction {
            Direction::GlobalToLocal => {
                let lmem = socket.local_mems[transfer.core].backing.as_slice();
                (
                    lmem[..options.size as usize].to_vec(),
                    pattern(transfer.index, options.size),
                )
            }
            Direction::LocalToGlobal => {
                let mut buf = vec![0; options.size as usize];
                socket.ram.backing.read(transfer.global_addr, &mut buf)?;
                (buf, pattern(transfer.core, options.size))
            }
        };
        if have != want {
            eyre::bail!(
                "transfer {} to core {} copied wrong bytes",
                transfer.index,
                transfer.global_core
            );
        }
    }
    Ok(())
}

/// Prepare, submit and verify a batch.
pub fn run(sim: &mut Simulation, options: &Options) -> eyre::Result<Vec<Transfer>> {
    let plan = plan(sim, options)?;
    prepare(sim, options, &plan)?;
    submit(sim, options, &plan)?;
    verify(sim, options, &plan)?;
    Ok(plan)
}
