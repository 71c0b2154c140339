use crate::config;
use crate::dma::{dcr, Direction, ProtocolError};
use crate::socket::Socket;
use console::style;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("socket {socket} failed at cycle {cycle}")]
    Protocol {
        socket: usize,
        cycle: u64,
        #[source]
        source: ProtocolError,
    },
    #[error("still busy after {cycles} cycles")]
    CycleLimit { cycles: u64 },
}

/// Owns the simulation clock and steps all sockets once per cycle.
#[derive(Debug)]
pub struct Simulation {
    pub sockets: Vec<Socket>,
    cycle: u64,
    /// Socket owning the most recently programmed `CORE_ID`
    dcr_target: usize,
}

impl Simulation {
    pub fn new(config: &config::Socket, num_sockets: usize) -> Result<Self, config::Error> {
        assert!(num_sockets > 0, "simulation needs at least one socket");
        let sockets = (0..num_sockets)
            .map(|socket_id| {
                Socket::new(config::Socket {
                    socket_id,
                    ..config.clone()
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            sockets,
            cycle: 0,
            dcr_target: 0,
        })
    }

    #[must_use]
    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn cores_per_socket(&self) -> usize {
        self.sockets[0].config.num_cores
    }

    #[must_use]
    pub fn total_cores(&self) -> usize {
        self.cores_per_socket() * self.sockets.len()
    }

    fn owner(&self, global_core_id: usize) -> Option<usize> {
        let socket = global_core_id / self.cores_per_socket();
        (socket < self.sockets.len()).then_some(socket)
    }

    /// Write a DMA control register.
    ///
    /// `CORE_ID` is seen by every socket, all other registers go to the
    /// socket owning the programmed core.
    pub fn dcr_write(&mut self, addr: u32, value: u32) {
        let cycle = self.cycle;
        if addr == dcr::CORE_ID {
            match self.owner(value as usize) {
                Some(owner) => self.dcr_target = owner,
                None => log::warn!("dcr: core {} does not exist", value),
            }
            for socket in &mut self.sockets {
                socket.dcr_write(addr, value, cycle);
            }
            return;
        }
        self.sockets[self.dcr_target].dcr_write(addr, value, cycle);
    }

    pub fn dcr_read(&mut self, addr: u32) -> u32 {
        self.sockets[self.dcr_target].dcr_read(addr)
    }

    /// Queue a transfer on the socket owning `global_core_id`.
    ///
    /// Returns the socket and the transfer id, or `None` if it was not admitted.
    pub fn trigger_dma_transfer(
        &mut self,
        dst_addr: u64,
        src_addr: u64,
        size: u64,
        direction: Direction,
        global_core_id: usize,
    ) -> Option<(usize, u64)> {
        let cycle = self.cycle;
        let owner = self.owner(global_core_id)?;
        let socket = &mut self.sockets[owner];
        let core = socket.config.local_core_id(global_core_id)?;
        let id = socket.trigger_dma_transfer(dst_addr, src_addr, size, direction, core, cycle);
        u64::try_from(id).ok().map(|id| (owner, id))
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.sockets.iter().any(Socket::is_busy)
    }

    /// Advance all sockets by one cycle.
    pub fn step(&mut self) -> Result<(), Error> {
        let cycle = self.cycle;
        log::debug!("{}", style(format!("======== cycle {cycle} ========")).dim());
        for socket in &mut self.sockets {
            socket.cycle(cycle).map_err(|source| Error::Protocol {
                socket: socket.id(),
                cycle,
                source,
            })?;
        }
        self.cycle += 1;
        Ok(())
    }

    /// Step until no socket has work left.
    ///
    /// Returns the number of cycles simulated.
    pub fn run_until_idle(&mut self, max_cycles: u64) -> Result<u64, Error> {
        let start = self.cycle;
        while self.is_busy() {
            if self.cycle - start >= max_cycles {
                return Err(Error::CycleLimit {
                    cycles: self.cycle - start,
                });
            }
            self.step()?;
        }
        Ok(self.cycle - start)
    }

    #[must_use]
    pub fn stats(&self) -> stats::Stats {
        let mut total = stats::Stats::default();
        for socket in &self.sockets {
            total += socket.perf_stats();
        }
        total.sim.cycles = self.cycle;
        total
    }

    pub fn reset(&mut self) {
        for socket in &mut self.sockets {
            socket.reset();
        }
        self.cycle = 0;
        self.dcr_target = 0;
    }
}
