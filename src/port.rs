use crate::fifo::Fifo;
use crate::mem_fetch::{MemReq, MemRsp};
use console::style;

/// A value in flight on a port together with the cycle it becomes visible.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Packet<T> {
    pub data: T,
    pub time: u64,
}

impl<T> std::fmt::Display for Packet<T>
where
    T: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.data, self.time)
    }
}

impl<T> Packet<T> {
    pub fn into_inner(self) -> T {
        self.data
    }
}

/// Simulated one-directional port.
///
/// Values are delivered in push order. A value pushed with a delay is not
/// visible to `front` or `pop` before `cycle + delay`, and it holds back every
/// value pushed after it.
#[derive(Clone, Debug)]
pub struct SimPort<T> {
    queue: Fifo<Packet<T>>,
}

impl<T> Default for SimPort<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> SimPort<T> {
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            queue: Fifo::new(capacity),
        }
    }

    #[must_use]
    pub fn full(&self) -> bool {
        self.queue.full()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Push `data` at `cycle`, visible after `delay` cycles.
    pub fn push(&mut self, data: T, cycle: u64, delay: u64) {
        assert!(!self.queue.full(), "push into full port");
        self.queue.enqueue(Packet {
            data,
            time: cycle + delay,
        });
    }

    /// The oldest value, if it is visible at `cycle`.
    #[must_use]
    pub fn front(&self, cycle: u64) -> Option<&T> {
        self.queue
            .first()
            .filter(|packet| packet.time <= cycle)
            .map(|packet| &packet.data)
    }

    /// Remove the oldest value, if it is visible at `cycle`.
    pub fn pop(&mut self, cycle: u64) -> Option<T> {
        self.front(cycle)?;
        self.queue.dequeue().map(Packet::into_inner)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// A request port and its matching response port.
#[derive(Clone, Debug)]
pub struct PortPair<Req = MemReq, Rsp = MemRsp> {
    pub req: SimPort<Req>,
    pub rsp: SimPort<Rsp>,
}

impl<Req, Rsp> Default for PortPair<Req, Rsp> {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl<Req, Rsp> PortPair<Req, Rsp> {
    #[must_use]
    pub fn new(req_capacity: Option<usize>, rsp_capacity: Option<usize>) -> Self {
        Self {
            req: SimPort::new(req_capacity),
            rsp: SimPort::new(rsp_capacity),
        }
    }

    pub fn clear(&mut self) {
        self.req.clear();
        self.rsp.clear();
    }
}

/// Binding of the local memory port pair to one core's scratchpad.
///
/// Rebinding is requested at any time but only takes effect at a cycle
/// boundary once no sub-transaction is in flight on the local pair.
/// While a rebind is pending no new local request may be issued, so the
/// pair always drains.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalBinding {
    core: Option<usize>,
    requested: Option<Option<usize>>,
    in_flight: usize,
}

impl LocalBinding {
    #[must_use]
    pub fn core(&self) -> Option<usize> {
        self.core
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.requested.is_some()
    }

    /// Request binding to `core`.
    ///
    /// Returns `false` if another rebind is already pending.
    pub fn bind(&mut self, core: usize) -> bool {
        self.request(Some(core))
    }

    /// Request detaching the local pair from any core.
    pub fn unbind(&mut self) -> bool {
        self.request(None)
    }

    fn request(&mut self, target: Option<usize>) -> bool {
        match self.requested {
            Some(pending) => pending == target,
            None if self.core == target => true,
            None => {
                self.requested = Some(target);
                true
            }
        }
    }

    /// Apply a pending rebind if the local pair is drained.
    ///
    /// Returns the new binding when it changed.
    pub fn commit(&mut self) -> Option<Option<usize>> {
        if self.in_flight > 0 {
            return None;
        }
        let target = self.requested.take()?;
        log::debug!(
            "{}: {:?} => {:?}",
            style("LOCAL PORT REBIND").magenta(),
            self.core,
            target
        );
        self.core = target;
        Some(target)
    }

    /// Whether a request targeting `core` may be issued now.
    #[must_use]
    pub fn can_issue(&self, core: usize) -> bool {
        self.core == Some(core) && self.requested.is_none()
    }

    pub fn issued(&mut self) {
        self.in_flight += 1;
    }

    pub fn retired(&mut self) {
        self.in_flight = self
            .in_flight
            .checked_sub(1)
            .expect("local port: retiring more requests than issued");
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
