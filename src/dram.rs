use crate::address;
use crate::memory::{Backing, OutOfRange, TimedMemory};
use std::collections::HashMap;

pub const PAGE_SIZE: u64 = 4096;

/// Sparse main memory.
///
/// Pages are allocated on first write, unwritten memory reads as zero.
#[derive(Debug, Default, Clone)]
pub struct Ram {
    pages: HashMap<u64, Box<[u8]>>,
}

impl Ram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Iterate over the page-sized pieces of `[addr, addr + len)`.
    fn chunks(addr: address, len: usize) -> impl Iterator<Item = (u64, usize, std::ops::Range<usize>)> {
        let mut offset = 0;
        std::iter::from_fn(move || {
            if offset >= len {
                return None;
            }
            let current = addr + offset as u64;
            let page = current / PAGE_SIZE;
            let page_offset = (current % PAGE_SIZE) as usize;
            let n = (PAGE_SIZE as usize - page_offset).min(len - offset);
            let range = offset..offset + n;
            offset += n;
            Some((page, page_offset, range))
        })
    }
}

impl Backing for Ram {
    fn read(&self, addr: address, buf: &mut [u8]) -> Result<(), OutOfRange> {
        if addr.checked_add(buf.len() as u64).is_none() {
            return Err(OutOfRange {
                addr,
                size: buf.len(),
                capacity: u64::MAX,
            });
        }
        for (page, page_offset, range) in Self::chunks(addr, buf.len()) {
            let n = range.len();
            let dest = &mut buf[range];
            match self.pages.get(&page) {
                Some(data) => dest.copy_from_slice(&data[page_offset..page_offset + n]),
                None => dest.fill(0),
            }
        }
        Ok(())
    }

    fn write(&mut self, addr: address, data: &[u8]) -> Result<(), OutOfRange> {
        if addr.checked_add(data.len() as u64).is_none() {
            return Err(OutOfRange {
                addr,
                size: data.len(),
                capacity: u64::MAX,
            });
        }
        for (page, page_offset, range) in Self::chunks(addr, data.len()) {
            let src = &data[range];
            let page = self
                .pages
                .entry(page)
                .or_insert_with(|| vec![0; PAGE_SIZE as usize].into_boxed_slice());
            page[page_offset..page_offset + src.len()].copy_from_slice(src);
        }
        Ok(())
    }
}

/// Main memory with its timing front end.
pub type MainMemory = TimedMemory<Ram>;

#[cfg(test)]
mod tests {
    use super::{MainMemory, Ram, PAGE_SIZE};
    use crate::engine::cycle::Component;
    use crate::mem_fetch::{Kind, MemReq, MemorySpace, Status, Tag};
    use crate::memory::Backing;
    use color_eyre::eyre;

    #[test]
    fn test_ram_cross_page_access() -> eyre::Result<()> {
        let mut ram = Ram::new();
        let data: Vec<u8> = (0..=255).collect();
        let addr = PAGE_SIZE - 100;
        ram.write(addr, &data)?;
        assert_eq!(ram.num_pages(), 2);

        let mut buf = vec![0; data.len()];
        ram.read(addr, &mut buf)?;
        assert_eq!(buf, data);

        let mut untouched = vec![0xff; 8];
        ram.read(16 * PAGE_SIZE, &mut untouched)?;
        assert_eq!(untouched, vec![0; 8]);
        Ok(())
    }

    #[test]
    fn test_ram_address_overflow() {
        let ram = Ram::new();
        let mut buf = [0; 4];
        assert!(ram.read(u64::MAX - 1, &mut buf).is_err());
    }

    #[test]
    fn test_main_memory_latency() -> eyre::Result<()> {
        let mut ram = Ram::new();
        ram.write(0x100, &[1, 2, 3, 4])?;
        let mut mem = MainMemory::new("dram", ram, 5, Some(4));
        mem.port.req.push(
            MemReq {
                addr: 0x100,
                size: 4,
                kind: Kind::READ_REQUEST,
                space: MemorySpace::Global,
                data: vec![],
                tag: Tag { channel: 0, id: 0 },
                uid: 0,
                core_id: None,
                source: Some(0),
                issue_cycle: 0,
            },
            0,
            0,
        );
        mem.cycle(0);
        for cycle in 1..5 {
            mem.cycle(cycle);
            assert!(mem.port.rsp.pop(cycle).is_none());
        }
        let rsp = mem.port.rsp.pop(5).expect("response after latency");
        assert_eq!(rsp.status, Status::Ok);
        assert_eq!(rsp.data, vec![1, 2, 3, 4]);
        assert_eq!(rsp.source, Some(0));
        assert_eq!(mem.num_accesses, 1);
        Ok(())
    }
}
