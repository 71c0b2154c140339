pub mod channel;
pub mod completion;
pub mod config;
pub mod dcr;
pub mod descriptor;
pub mod functional;
pub mod queue;

pub use completion::{Callback, Completion};
pub use config::Config;
pub use descriptor::{Direction, State, TransferDescriptor, TransferId, TransferRequest, ValidationError};

use crate::mem_fetch::{MemRsp, Tag};
use crate::port::{LocalBinding, PortPair};
use channel::{Channel, Context};
use completion::CompletionTable;
use console::style;
use dcr::{Registers, StatusPolicy};
use queue::DescriptorQueue;

/// A transfer request that was not admitted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("descriptor queue is full")]
    QueueFull,
    #[error("invalid transfer: {0}")]
    Invalid(#[from] ValidationError),
}

/// The engine was wired incorrectly.
///
/// Not recoverable, the simulation must stop.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("response with tag {tag} matches no outstanding sub-transaction")]
    UnknownTag { tag: Tag },
    #[error("local memory request issued while the local port is unbound")]
    LocalPortUnbound,
    #[error("no local memory for core {core_id}")]
    UnroutableRequest { core_id: usize },
}

/// Multi-channel DMA engine of one socket.
///
/// Software describes a transfer through the control registers or the direct
/// API. Admitted descriptors wait in a bounded queue until one of the channels
/// claims them, and finished ones stay in the completion table until they
/// are acknowledged.
pub struct DmaEngine {
    pub config: Config,
    /// Requests toward global memory, shared with the caches
    pub mem_port: PortPair,
    /// Requests toward the scratchpad of the bound core
    pub lmem_port: PortPair,
    channels: Vec<Channel>,
    queue: DescriptorQueue,
    completions: CompletionTable,
    registers: Registers,
    binding: LocalBinding,
    callback: Option<Callback>,
    next_id: TransferId,
    next_uid: u64,
    stats: stats::DMA,
    accesses: stats::mem::Accesses,
}

impl std::fmt::Debug for DmaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaEngine")
            .field("socket_id", &self.config.socket_id)
            .field("channels", &self.channels.iter().map(Channel::state).collect::<Vec<_>>())
            .field("queued", &self.queue.len())
            .field("completed", &self.completions.len())
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}

impl DmaEngine {
    pub fn new(config: Config) -> Result<Self, config::Error> {
        config.validate()?;
        log::debug!("dma[{}]: {}", config.socket_id, config);
        let channels = (0..config.num_channels).map(Channel::new).collect();
        let queue = DescriptorQueue::new(config.queue_capacity);
        Ok(Self {
            mem_port: PortPair::default(),
            lmem_port: PortPair::default(),
            channels,
            queue,
            completions: CompletionTable::default(),
            registers: Registers::default(),
            binding: LocalBinding::default(),
            callback: None,
            next_id: 0,
            next_uid: 0,
            stats: stats::DMA::default(),
            accesses: stats::mem::Accesses::default(),
            config,
        })
    }

    pub fn set_completion_callback(&mut self, callback: impl FnMut(bool, u64) + Send + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn clear_completion_callback(&mut self) {
        self.callback = None;
    }

    fn notify(&mut self, success: bool, bytes: u64) {
        if let Some(callback) = self.callback.as_mut() {
            callback(success, bytes);
        }
    }

    /// Validate and enqueue a transfer.
    ///
    /// Never blocks: a full queue rejects the request and the caller has to retry.
    pub fn request_transfer(
        &mut self,
        req: TransferRequest,
        cycle: u64,
    ) -> Result<TransferId, RequestError> {
        self.admit(&req, cycle, false)
    }

    fn admit(
        &mut self,
        req: &TransferRequest,
        cycle: u64,
        from_registers: bool,
    ) -> Result<TransferId, RequestError> {
        if let Err(err) = req.validate(&self.config) {
            log::warn!("dma[{}]: rejecting {}: {}", self.config.socket_id, req, err);
            self.stats.errors += 1;
            return Err(err.into());
        }
        if self.queue.is_full() {
            log::debug!(
                "dma[{}]: queue full ({}/{} descriptors), rejecting {}",
                self.config.socket_id,
                self.queue.len(),
                self.queue.capacity(),
                req
            );
            self.stats.queue_full_rejections += 1;
            return Err(RequestError::QueueFull);
        }
        let mut desc = TransferDescriptor::new(self.next_id, req, cycle);
        desc.from_registers = from_registers;
        log::debug!(
            "{}[{}]: admitted {} at cycle {}",
            style("DMA").cyan(),
            self.config.socket_id,
            desc,
            cycle
        );
        if let Err(desc) = self.queue.push(desc) {
            unreachable!("admitting {desc} into a full queue");
        }
        self.next_id += 1;
        Ok(self.next_id - 1)
    }

    /// Whether the transfer finished and was not yet acknowledged.
    #[must_use]
    pub fn is_completed(&self, id: TransferId) -> bool {
        self.completions.contains(id)
    }

    /// Non-blocking poll for completion.
    ///
    /// Every unsuccessful poll counts as a wait stall.
    pub fn wait_for_completion(&mut self, id: TransferId) -> bool {
        let completed = self.is_completed(id);
        if !completed {
            self.stats.wait_stalls += 1;
        }
        completed
    }

    #[must_use]
    pub fn completion(&self, id: TransferId) -> Option<&Completion> {
        self.completions.get(id)
    }

    /// Drop a finished transfer from the completion table.
    ///
    /// Acknowledging twice is a no-op and returns `false`.
    pub fn acknowledge_completion(&mut self, id: TransferId) -> bool {
        self.completions.acknowledge(id)
    }

    /// Current state of a transfer that was not yet acknowledged.
    #[must_use]
    pub fn transfer_state(&self, id: TransferId) -> Option<State> {
        if self.queue.contains(id) {
            return Some(State::Idle);
        }
        if let Some(completion) = self.completions.get(id) {
            return Some(if completion.success {
                State::Complete
            } else {
                State::Error
            });
        }
        self.channels
            .iter()
            .filter_map(Channel::descriptor)
            .find(|desc| desc.id == id)
            .map(|desc| desc.state)
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        !self.queue.is_empty() || self.channels.iter().any(|channel| !channel.is_idle())
    }

    #[must_use]
    pub fn is_queue_full(&self) -> bool {
        self.queue.is_full()
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Number of channels in `Startup` or `Transferring`.
    #[must_use]
    pub fn active_channels(&self) -> usize {
        self.channels.iter().filter(|c| c.is_active()).count()
    }

    #[must_use]
    pub fn local_binding(&self) -> &LocalBinding {
        &self.binding
    }

    /// Request binding the local port pair to `core`.
    ///
    /// Takes effect at the start of a cycle once the local pair is drained.
    pub fn bind_local(&mut self, core: usize) -> bool {
        let accepted = self.binding.bind(core);
        if !accepted {
            log::warn!(
                "dma[{}]: rebind to core {} while another rebind is pending",
                self.config.socket_id,
                core
            );
        }
        accepted
    }

    pub fn dcr_write(&mut self, addr: u32, value: u32, cycle: u64) {
        log::trace!("dma[{}]: dcr[{:#x}] = {:#x}", self.config.socket_id, addr, value);
        let start = self.registers.write(addr, value);
        if addr == dcr::CORE_ID {
            if (value as usize) < self.config.num_cores {
                self.bind_local(value as usize);
            } else {
                log::warn!("dma[{}]: core id {} out of range", self.config.socket_id, value);
            }
        }
        if !start {
            return;
        }
        if self.registers.is_busy() {
            log::warn!(
                "dma[{}]: ignoring START while transfer {:?} is busy",
                self.config.socket_id,
                self.registers.transfer()
            );
            return;
        }
        // a new start overwrites an outcome that was never read
        if let Some(previous) = self.registers.observed() {
            self.completions.acknowledge(previous);
        }
        let req = self.registers.request();
        match self.admit(&req, cycle, true) {
            Ok(id) => self.registers.started(id),
            Err(err) => {
                log::warn!("dma[{}]: START failed: {}", self.config.socket_id, err);
                self.registers.rejected();
                if self.config.status_policy == StatusPolicy::Immediate {
                    self.registers.observed();
                }
                self.notify(false, 0);
            }
        }
    }

    pub fn dcr_read(&mut self, addr: u32) -> u32 {
        let value = self.registers.read(addr);
        if addr == dcr::STATUS && self.config.status_policy == StatusPolicy::ClearOnRead {
            if let Some(id) = self.registers.observed() {
                self.completions.acknowledge(id);
            }
        }
        value
    }

    /// Status register value without the read side effect.
    #[must_use]
    pub fn status(&self) -> dcr::Status {
        self.registers.status()
    }

    #[must_use]
    pub fn perf_stats(&self) -> stats::DMA {
        self.stats
    }

    #[must_use]
    pub fn accesses(&self) -> &stats::mem::Accesses {
        &self.accesses
    }

    /// Drop all transfers and zero the counters.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.queue.clear();
        self.completions.clear();
        self.registers = Registers::default();
        self.binding.reset();
        self.mem_port.clear();
        self.lmem_port.clear();
        self.next_id = 0;
        self.next_uid = 0;
        self.stats.reset();
        self.accesses = stats::mem::Accesses::default();
    }

    fn route(&mut self, rsp: MemRsp) -> Result<(), ProtocolError> {
        log::trace!("{}: {}", style("DMA RESPONSE").blue(), rsp);
        let tag = rsp.tag;
        let channel = self
            .channels
            .get_mut(tag.channel)
            .ok_or(ProtocolError::UnknownTag { tag })?;
        channel.deliver(rsp)
    }

    fn complete(&mut self, desc: &TransferDescriptor, cycle: u64) {
        let completion = Completion::from_descriptor(desc, cycle);
        log::debug!(
            "{}[{}]: {} finished after {} cycles",
            style("DMA").cyan(),
            self.config.socket_id,
            desc,
            completion.latency()
        );
        self.stats.transfers += 1;
        self.stats.transfer_latency += completion.latency();
        if !completion.success {
            self.stats.errors += 1;
        }
        self.completions.record(completion);

        if desc.from_registers && self.registers.transfer() == Some(desc.id) {
            self.registers.finished(completion.success);
            if self.config.status_policy == StatusPolicy::Immediate {
                self.registers.observed();
                self.completions.acknowledge(desc.id);
            }
        }
        self.notify(completion.success, completion.bytes);
    }

    #[tracing::instrument(skip_all, name = "dma_cycle")]
    pub fn cycle(&mut self, cycle: u64) -> Result<(), ProtocolError> {
        if let Some(core) = self.binding.commit() {
            log::debug!("dma[{}]: local port bound to {:?}", self.config.socket_id, core);
        }
        self.registers.clear_start();

        while let Some(rsp) = self.mem_port.rsp.pop(cycle) {
            self.route(rsp)?;
        }
        while let Some(rsp) = self.lmem_port.rsp.pop(cycle) {
            self.route(rsp)?;
        }

        for channel in &mut self.channels {
            if self.queue.is_empty() {
                break;
            }
            if channel.is_idle() {
                if let Some(desc) = self.queue.pop() {
                    channel.assign(desc);
                }
            }
        }

        let mut active = false;
        for channel in &mut self.channels {
            let mut ctx = Context {
                config: &self.config,
                global: &mut self.mem_port,
                local: &mut self.lmem_port,
                binding: &mut self.binding,
                stats: &mut self.stats,
                accesses: &mut self.accesses,
                next_uid: &mut self.next_uid,
            };
            channel.cycle(&mut ctx, cycle)?;
            active |= !channel.is_idle();
        }

        let finished: Vec<TransferDescriptor> = self
            .channels
            .iter_mut()
            .filter_map(Channel::retire)
            .collect();
        for desc in &finished {
            self.complete(desc, cycle);
        }

        if active {
            self.stats.cycles_active += 1;
        } else {
            self.stats.cycles_idle += 1;
        }
        Ok(())
    }
}
