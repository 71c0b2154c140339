use crate::mem_fetch::{MemReq, MemRsp};
use crate::port::PortPair;
use console::style;

/// Grants a shared resource to one of several requesters per cycle.
pub trait Arbiter: std::fmt::Debug + Send + Sync + 'static {
    /// Pick one of the requesters for which `ready` is set.
    #[must_use]
    fn grant(&mut self, ready: &[bool]) -> Option<usize>;

    /// Return the requester that was granted last.
    #[must_use]
    fn last_granted(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRobin {
    num_inputs: usize,
    last_granted: usize,
}

impl RoundRobin {
    #[must_use]
    pub fn new(num_inputs: usize) -> Self {
        assert!(num_inputs > 0);
        Self {
            num_inputs,
            last_granted: num_inputs - 1,
        }
    }
}

impl Arbiter for RoundRobin {
    fn grant(&mut self, ready: &[bool]) -> Option<usize> {
        debug_assert_eq!(ready.len(), self.num_inputs);
        let granted = (1..=self.num_inputs)
            .map(|offset| (self.last_granted + offset) % self.num_inputs)
            .find(|&input| ready[input])?;
        self.last_granted = granted;
        Some(granted)
    }

    fn last_granted(&self) -> usize {
        self.last_granted
    }
}

/// N:1 memory request arbiter.
///
/// Forwards at most one request per cycle from the input port pairs to the
/// output and routes responses back to the input that issued the request.
#[derive(Debug)]
pub struct MemArbiter<A = RoundRobin> {
    pub name: String,
    pub num_inputs: usize,
    arbiter: A,
    pub num_grants: Vec<u64>,
}

impl MemArbiter<RoundRobin> {
    #[must_use]
    pub fn round_robin(name: impl Into<String>, num_inputs: usize) -> Self {
        Self::new(name, RoundRobin::new(num_inputs), num_inputs)
    }
}

impl<A> MemArbiter<A>
where
    A: Arbiter,
{
    pub fn new(name: impl Into<String>, arbiter: A, num_inputs: usize) -> Self {
        Self {
            name: name.into(),
            num_inputs,
            arbiter,
            num_grants: vec![0; num_inputs],
        }
    }

    pub fn cycle(
        &mut self,
        cycle: u64,
        inputs: &mut [&mut PortPair<MemReq, MemRsp>],
        output: &mut PortPair<MemReq, MemRsp>,
    ) {
        assert_eq!(inputs.len(), self.num_inputs);

        // responses
        while !output.rsp.is_empty() {
            let Some(source) = output.rsp.front(cycle).map(|rsp| rsp.source) else {
                break;
            };
            let source = source.expect("arbiter: response without source");
            if inputs[source].rsp.full() {
                break;
            }
            let Some(rsp) = output.rsp.pop(cycle) else {
                break;
            };
            inputs[source].rsp.push(rsp, cycle, 0);
        }

        // requests
        if output.req.full() {
            return;
        }
        let ready: Vec<bool> = inputs
            .iter()
            .map(|input| input.req.front(cycle).is_some())
            .collect();
        let Some(granted) = self.arbiter.grant(&ready) else {
            return;
        };
        let Some(mut req) = inputs[granted].req.pop(cycle) else {
            return;
        };
        log::trace!(
            "{}: grant input {} for {}",
            style(&self.name).yellow(),
            granted,
            req
        );
        req.source = Some(granted);
        self.num_grants[granted] += 1;
        output.req.push(req, cycle, 0);
    }
}
