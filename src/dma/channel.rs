use super::config::Config;
use super::descriptor::{State, TransferDescriptor};
use super::ProtocolError;
use crate::address;
use crate::mem_fetch::{Kind, MemReq, MemRsp, MemorySpace, Tag};
use crate::port::{LocalBinding, PortPair};
use console::style;
use indexmap::IndexMap;

/// A read sub-transaction waiting for its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRead {
    pub dst: address,
    pub size: u32,
    pub issue_cycle: u64,
}

/// A chunk held in the bounce buffer until the destination acknowledged it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub dst: address,
    pub data: Vec<u8>,
    /// Cycle the write was issued, `None` while still buffered
    pub issue_cycle: Option<u64>,
}

impl PendingWrite {
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.issue_cycle.is_some()
    }
}

/// Everything a channel touches outside of itself during a cycle.
pub struct Context<'a> {
    pub config: &'a Config,
    pub global: &'a mut PortPair,
    pub local: &'a mut PortPair,
    pub binding: &'a mut LocalBinding,
    pub stats: &'a mut stats::DMA,
    pub accesses: &'a mut stats::mem::Accesses,
    pub next_uid: &'a mut u64,
}

impl<'a> Context<'a> {
    /// Push a request on the port pair of its address space.
    ///
    /// Returns the request back if it could not be issued this cycle.
    fn issue(&mut self, req: MemReq, cycle: u64) -> Result<(), MemReq> {
        let port = match req.space {
            MemorySpace::Global => &mut *self.global,
            MemorySpace::Local => {
                let core = req.core_id.unwrap_or_default();
                if !self.binding.can_issue(core) {
                    self.binding.bind(core);
                    self.stats.port_stalls += 1;
                    return Err(req);
                }
                &mut *self.local
            }
        };
        if port.req.full() {
            self.stats.port_stalls += 1;
            return Err(req);
        }
        if req.space == MemorySpace::Local {
            self.binding.issued();
        }
        if req.is_write() {
            self.stats.write_requests += 1;
        } else {
            self.stats.read_requests += 1;
        }
        self.accesses.inc(req.access_kind(), 1);
        log::trace!("{}: {}", style("DMA ISSUE").blue(), req);
        port.req.push(req, cycle, 0);
        Ok(())
    }
}

/// One independent transfer context of the engine.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: usize,
    state: State,
    startup_counter: u64,
    desc: Option<TransferDescriptor>,
    /// Bytes for which a read has been issued
    issued: u64,
    next_tag: u32,
    pending_reads: IndexMap<u32, PendingRead>,
    pending_writes: IndexMap<u32, PendingWrite>,
    inbox: Vec<MemRsp>,
    faulted: bool,
}

impl Channel {
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            state: State::Idle,
            startup_counter: 0,
            desc: None,
            issued: 0,
            next_tag: 0,
            pending_reads: IndexMap::new(),
            pending_writes: IndexMap::new(),
            inbox: Vec::new(),
            faulted: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Whether the channel is in `Startup` or `Transferring`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Startup | State::Transferring)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Complete | State::Error)
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&TransferDescriptor> {
        self.desc.as_ref()
    }

    #[must_use]
    pub fn pending_reads(&self) -> &IndexMap<u32, PendingRead> {
        &self.pending_reads
    }

    #[must_use]
    pub fn pending_writes(&self) -> &IndexMap<u32, PendingWrite> {
        &self.pending_writes
    }

    #[must_use]
    pub fn writes_in_flight(&self) -> usize {
        self.pending_writes.values().filter(|w| w.in_flight()).count()
    }

    /// Take ownership of a descriptor and start counting down the startup latency.
    pub fn assign(&mut self, mut desc: TransferDescriptor) {
        assert!(self.is_idle(), "channel {} is already busy", self.id);
        debug_assert!(self.pending_reads.is_empty() && self.pending_writes.is_empty());
        log::debug!(
            "{}[{}]: assigned {}",
            style("DMA CHANNEL").green(),
            self.id,
            desc
        );
        desc.state = State::Startup;
        self.state = State::Startup;
        self.startup_counter = 0;
        self.issued = 0;
        self.faulted = false;
        self.desc = Some(desc);
    }

    /// Hand over a response addressed to this channel.
    pub fn deliver(&mut self, rsp: MemRsp) -> Result<(), ProtocolError> {
        if !self.is_active() {
            return Err(ProtocolError::UnknownTag { tag: rsp.tag });
        }
        self.inbox.push(rsp);
        Ok(())
    }

    /// Give up the finished descriptor and return to `Idle`.
    pub fn retire(&mut self) -> Option<TransferDescriptor> {
        if !self.is_finished() {
            return None;
        }
        self.state = State::Idle;
        self.pending_writes.clear();
        self.desc.take()
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.id);
    }

    fn alloc_tag(&mut self) -> u32 {
        loop {
            let id = self.next_tag;
            self.next_tag = self.next_tag.wrapping_add(1);
            if !self.pending_reads.contains_key(&id) && !self.pending_writes.contains_key(&id) {
                return id;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn request(
        &self,
        kind: Kind,
        space: MemorySpace,
        addr: address,
        size: u32,
        tag: u32,
        data: Vec<u8>,
        core_id: usize,
        ctx: &Context<'_>,
        cycle: u64,
    ) -> MemReq {
        let (addr, core_id) = match space {
            MemorySpace::Global => (addr, None),
            MemorySpace::Local => (ctx.config.local_offset(addr), Some(core_id)),
        };
        MemReq {
            addr,
            size,
            kind,
            space,
            data,
            tag: Tag {
                channel: self.id,
                id: tag,
            },
            uid: *ctx.next_uid,
            core_id,
            source: None,
            issue_cycle: cycle,
        }
    }

    fn process_responses(&mut self, ctx: &mut Context<'_>, cycle: u64) -> Result<(), ProtocolError> {
        for rsp in std::mem::take(&mut self.inbox) {
            if rsp.space == MemorySpace::Local {
                ctx.binding.retired();
            }
            match rsp.kind {
                Kind::READ_REPLY => {
                    let read = self
                        .pending_reads
                        .shift_remove(&rsp.tag.id)
                        .ok_or(ProtocolError::UnknownTag { tag: rsp.tag })?;
                    if rsp.is_fault() {
                        log::warn!("dma channel {}: read {} faulted", self.id, rsp.tag);
                        self.faulted = true;
                        continue;
                    }
                    debug_assert_eq!(rsp.data.len(), read.size as usize);
                    ctx.stats.bytes_read += u64::from(read.size);
                    ctx.stats.read_latency += cycle - read.issue_cycle;
                    self.pending_writes.insert(
                        rsp.tag.id,
                        PendingWrite {
                            dst: read.dst,
                            data: rsp.data,
                            issue_cycle: None,
                        },
                    );
                }
                Kind::WRITE_ACK => {
                    let write = self
                        .pending_writes
                        .shift_remove(&rsp.tag.id)
                        .filter(PendingWrite::in_flight)
                        .ok_or(ProtocolError::UnknownTag { tag: rsp.tag })?;
                    if rsp.is_fault() {
                        log::warn!("dma channel {}: write {} faulted", self.id, rsp.tag);
                        self.faulted = true;
                        continue;
                    }
                    let bytes = write.data.len() as u64;
                    ctx.stats.bytes_written += bytes;
                    ctx.stats.write_latency += cycle - write.issue_cycle.unwrap_or(cycle);
                    if let Some(desc) = self.desc.as_mut() {
                        desc.progress += bytes;
                        debug_assert!(desc.progress <= desc.size);
                    }
                }
                Kind::READ_REQUEST | Kind::WRITE_REQUEST => {
                    return Err(ProtocolError::UnknownTag { tag: rsp.tag });
                }
            }
        }
        Ok(())
    }

    fn issue_read(&mut self, ctx: &mut Context<'_>, cycle: u64) {
        let Some(desc) = self.desc.as_ref() else {
            return;
        };
        let remaining = desc.size - self.issued;
        let buffered = self.pending_reads.len() + self.pending_writes.len();
        if self.faulted
            || remaining == 0
            || self.pending_reads.len() >= ctx.config.max_outstanding_reads
            || buffered >= ctx.config.max_outstanding()
        {
            return;
        }
        let size = u64::from(ctx.config.transfer_size).min(remaining) as u32;
        let (src, dst) = (desc.src_addr + self.issued, desc.dst_addr + self.issued);
        let (space, core_id) = (desc.direction.src_space(), desc.core_id);
        let tag = self.alloc_tag();
        let req = self.request(
            Kind::READ_REQUEST,
            space,
            src,
            size,
            tag,
            Vec::new(),
            core_id,
            ctx,
            cycle,
        );
        if ctx.issue(req, cycle).is_ok() {
            *ctx.next_uid += 1;
            self.issued += u64::from(size);
            self.pending_reads.insert(
                tag,
                PendingRead {
                    dst,
                    size,
                    issue_cycle: cycle,
                },
            );
        }
    }

    fn issue_write(&mut self, ctx: &mut Context<'_>, cycle: u64) {
        let Some((space, core_id)) = self
            .desc
            .as_ref()
            .map(|desc| (desc.direction.dst_space(), desc.core_id))
        else {
            return;
        };
        let in_flight = self.writes_in_flight();
        if in_flight >= ctx.config.max_outstanding_writes
            || self.pending_reads.len() + in_flight >= ctx.config.max_outstanding()
        {
            return;
        }
        let Some((&tag, write)) = self.pending_writes.iter().find(|(_, w)| !w.in_flight()) else {
            return;
        };
        let req = self.request(
            Kind::WRITE_REQUEST,
            space,
            write.dst,
            write.data.len() as u32,
            tag,
            write.data.clone(),
            core_id,
            ctx,
            cycle,
        );
        if ctx.issue(req, cycle).is_ok() {
            *ctx.next_uid += 1;
            if let Some(write) = self.pending_writes.get_mut(&tag) {
                write.issue_cycle = Some(cycle);
            }
        }
    }

    fn set_state(&mut self, state: State) {
        log::debug!(
            "{}[{}]: {} => {}",
            style("DMA CHANNEL").green(),
            self.id,
            self.state,
            state
        );
        self.state = state;
        if let Some(desc) = self.desc.as_mut() {
            desc.state = state;
        }
    }

    pub fn cycle(&mut self, ctx: &mut Context<'_>, cycle: u64) -> Result<(), ProtocolError> {
        match self.state {
            State::Idle | State::Complete | State::Error => return Ok(()),
            State::Startup => {
                if self.startup_counter < ctx.config.startup_latency {
                    self.startup_counter += 1;
                    return Ok(());
                }
                self.set_state(State::Transferring);
            }
            State::Transferring => {}
        }

        self.process_responses(ctx, cycle)?;

        if self.faulted {
            // buffered data is never written once the transfer failed
            self.pending_writes.retain(|_, write| write.in_flight());
            if self.pending_reads.is_empty() && self.pending_writes.is_empty() {
                self.set_state(State::Error);
            }
            return Ok(());
        }

        self.issue_read(ctx, cycle);
        self.issue_write(ctx, cycle);

        let done = self.desc.as_ref().is_some_and(TransferDescriptor::is_done);
        if done && self.pending_reads.is_empty() && self.pending_writes.is_empty() {
            self.set_state(State::Complete);
        }
        Ok(())
    }
}
