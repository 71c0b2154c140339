use crate::address;
use crate::engine::cycle::Component;
use crate::mem_fetch::{MemReq, Status};
use crate::port::PortPair;
use console::style;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("access of {size} bytes at {addr:#x} exceeds memory of {capacity} bytes")]
pub struct OutOfRange {
    pub addr: address,
    pub size: usize,
    pub capacity: u64,
}

/// Functional storage behind a timed memory.
pub trait Backing: std::fmt::Debug {
    fn read(&self, addr: address, buf: &mut [u8]) -> Result<(), OutOfRange>;

    fn write(&mut self, addr: address, data: &[u8]) -> Result<(), OutOfRange>;
}

/// Fixed latency memory front end.
///
/// Accepts at most one request per cycle from `port.req`, performs it on the
/// backing store and answers on `port.rsp` after `latency` cycles.
/// Responses leave in the order requests were accepted.
#[derive(Debug)]
pub struct TimedMemory<B> {
    pub name: String,
    pub backing: B,
    pub latency: u64,
    pub port: PortPair,
    pub num_accesses: u64,
}

impl<B> TimedMemory<B>
where
    B: Backing,
{
    pub fn new(name: impl Into<String>, backing: B, latency: u64, queue_size: Option<usize>) -> Self {
        Self {
            name: name.into(),
            backing,
            latency,
            port: PortPair::new(queue_size, queue_size),
            num_accesses: 0,
        }
    }

    #[must_use]
    pub fn busy(&self) -> bool {
        !self.port.req.is_empty() || !self.port.rsp.is_empty()
    }

    fn serve(&mut self, mut req: MemReq, cycle: u64) {
        let result = if req.is_write() {
            let data = std::mem::take(&mut req.data);
            self.backing.write(req.addr, &data).map(|()| Vec::new())
        } else {
            let mut buf = vec![0; req.size as usize];
            self.backing.read(req.addr, &mut buf).map(|()| buf)
        };
        let rsp = match result {
            Ok(data) => req.into_response(Status::Ok, data),
            Err(err) => {
                log::warn!("{}: {}", self.name, err);
                req.into_response(Status::Fault, Vec::new())
            }
        };
        log::trace!(
            "{}: {} ready at cycle {}",
            style(&self.name).cyan(),
            rsp,
            cycle + self.latency
        );
        self.port.rsp.push(rsp, cycle, self.latency);
    }

    pub fn reset(&mut self) {
        self.port.clear();
    }
}

impl<B> Component for TimedMemory<B>
where
    B: Backing,
{
    fn cycle(&mut self, cycle: u64) {
        if self.port.rsp.full() {
            return;
        }
        if let Some(req) = self.port.req.pop(cycle) {
            self.num_accesses += 1;
            self.serve(req, cycle);
        }
    }
}
