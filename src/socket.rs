use crate::arbitration::MemArbiter;
use crate::config;
use crate::dma::{self, dcr, DmaEngine, ProtocolError, TransferId, TransferRequest};
use crate::dram::{MainMemory, Ram};
use crate::engine::cycle::Component;
use crate::local_mem::{LocalMem, Scratchpad};
use crate::port::PortPair;
use console::style;

/// Arbiter inputs in front of main memory.
pub const ICACHE_PORT: usize = 0;
pub const DCACHE_PORT: usize = 1;
pub const DMA_PORT: usize = 2;

/// A group of cores sharing main memory and one DMA engine.
///
/// The DMA engine competes with the cores' instruction and data caches for
/// main memory through a round-robin arbiter. Its local port reaches the
/// scratchpad of whichever core it is currently bound to.
#[derive(Debug)]
pub struct Socket {
    pub config: config::Socket,
    pub dma: DmaEngine,
    pub ram: MainMemory,
    pub local_mems: Vec<LocalMem>,
    pub arbiter: MemArbiter,
    /// Request port of the instruction caches
    pub icache: PortPair,
    /// Request port of the data caches
    pub dcache: PortPair,
    /// Counters of synchronous copies, which bypass the engine
    sync_stats: stats::DMA,
}

impl Socket {
    pub fn new(config: config::Socket) -> Result<Self, config::Error> {
        let dma = DmaEngine::new(config.dma_config())?;
        let lmem_size = config.dma.local_mem_size as usize;
        let local_mems = (0..config.num_cores)
            .map(|core| {
                LocalMem::new(
                    format!("lmem[{}.{}]", config.socket_id, core),
                    Scratchpad::new(lmem_size),
                    config.local_mem_latency,
                    config.local_mem_queue_size,
                )
            })
            .collect();
        let ram = MainMemory::new(
            format!("dram[{}]", config.socket_id),
            Ram::new(),
            config.dram_latency,
            config.dram_queue_size,
        );
        Ok(Self {
            dma,
            ram,
            local_mems,
            arbiter: MemArbiter::round_robin(format!("mem_arb[{}]", config.socket_id), DMA_PORT + 1),
            icache: PortPair::new(config.cache_queue_size, None),
            dcache: PortPair::new(config.cache_queue_size, None),
            sync_stats: stats::DMA::default(),
            config,
        })
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.config.socket_id
    }

    /// Write a DMA control register.
    ///
    /// `CORE_ID` holds a global core id. Sockets ignore ids of cores they
    /// do not own and hand the socket-local id to their engine.
    pub fn dcr_write(&mut self, addr: u32, value: u32, cycle: u64) {
        if !dcr::is_dma_dcr(addr) {
            log::warn!("socket {}: ignoring write to dcr {:#x}", self.id(), addr);
            return;
        }
        if addr == dcr::CORE_ID {
            match self.config.local_core_id(value as usize) {
                Some(core) => self.dma.dcr_write(addr, core as u32, cycle),
                None => log::trace!(
                    "socket {}: core {} belongs to another socket",
                    self.id(),
                    value
                ),
            }
            return;
        }
        self.dma.dcr_write(addr, value, cycle);
    }

    pub fn dcr_read(&mut self, addr: u32) -> u32 {
        if dcr::is_dma_dcr(addr) {
            self.dma.dcr_read(addr)
        } else {
            0
        }
    }

    /// Queue a transfer on behalf of a core.
    ///
    /// Returns the transfer id or `-1` if the request was not admitted.
    pub fn trigger_dma_transfer(
        &mut self,
        dst_addr: u64,
        src_addr: u64,
        size: u64,
        direction: dma::Direction,
        core_id: usize,
        cycle: u64,
    ) -> i64 {
        let req = TransferRequest {
            dst_addr,
            src_addr,
            size,
            direction,
            core_id,
        };
        match self.dma.request_transfer(req, cycle) {
            Ok(id) => i64::try_from(id).unwrap_or(-1),
            Err(err) => {
                log::debug!("socket {}: dma transfer rejected: {}", self.id(), err);
                -1
            }
        }
    }

    /// Copy immediately, bypassing the engine's queue and channels.
    pub fn dma_copy_sync(&mut self, req: &TransferRequest) -> Result<(), dma::functional::Error> {
        let config = self.dma.config.clone();
        let Some(lmem) = self.local_mems.get_mut(req.core_id) else {
            return Err(dma::ValidationError::InvalidCore {
                core_id: req.core_id,
                num_cores: self.config.num_cores,
            }
            .into());
        };
        let mut stats = stats::DMA::default();
        let result = dma::functional::copy(
            &config,
            req,
            &mut self.ram.backing,
            &mut lmem.backing,
            &mut stats,
        );
        self.sync_stats += stats;
        result
    }

    #[must_use]
    pub fn is_completed(&self, id: TransferId) -> bool {
        self.dma.is_completed(id)
    }

    /// Whether any request is still travelling between the components.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.dma.is_busy()
            || self.ram.busy()
            || self.local_mems.iter().any(LocalMem::busy)
            || !self.icache.req.is_empty()
            || !self.dcache.req.is_empty()
    }

    #[must_use]
    pub fn perf_stats(&self) -> stats::Stats {
        let mut dma = self.dma.perf_stats();
        dma += self.sync_stats;
        stats::Stats {
            sim: stats::Sim::default(),
            dma,
            accesses: self.dma.accesses().clone(),
        }
    }

    pub fn reset(&mut self) {
        self.dma.reset();
        self.ram.reset();
        for lmem in &mut self.local_mems {
            lmem.reset();
        }
        self.icache.clear();
        self.dcache.clear();
        self.sync_stats.reset();
    }

    /// Forward the engine's local requests to the scratchpad it is bound to.
    fn route_local_requests(&mut self, cycle: u64) -> Result<(), ProtocolError> {
        while let Some(req) = self.dma.lmem_port.req.front(cycle) {
            let core = self
                .dma
                .local_binding()
                .core()
                .ok_or(ProtocolError::LocalPortUnbound)?;
            debug_assert_eq!(req.core_id, Some(core));
            let lmem = self
                .local_mems
                .get_mut(core)
                .ok_or(ProtocolError::UnroutableRequest { core_id: core })?;
            if lmem.port.req.full() {
                break;
            }
            let Some(req) = self.dma.lmem_port.req.pop(cycle) else {
                break;
            };
            lmem.port.req.push(req, cycle, 0);
        }
        Ok(())
    }

    fn route_local_responses(&mut self, cycle: u64) {
        for lmem in &mut self.local_mems {
            while let Some(rsp) = lmem.port.rsp.pop(cycle) {
                self.dma.lmem_port.rsp.push(rsp, cycle, 0);
            }
        }
    }

    #[tracing::instrument(skip_all, name = "socket_cycle")]
    pub fn cycle(&mut self, cycle: u64) -> Result<(), ProtocolError> {
        log::trace!("{} {}", style(format!("socket {}", self.id())).bold(), cycle);
        self.dma.cycle(cycle)?;

        self.route_local_requests(cycle)?;
        self.arbiter.cycle(
            cycle,
            &mut [&mut self.icache, &mut self.dcache, &mut self.dma.mem_port],
            &mut self.ram.port,
        );

        self.ram.cycle(cycle);
        for lmem in &mut self.local_mems {
            lmem.cycle(cycle);
        }
        self.route_local_responses(cycle);
        Ok(())
    }
}
