use super::descriptor::{TransferDescriptor, TransferId};
use crate::fifo::Fifo;

/// Bounded queue of admitted descriptors waiting for a free channel.
#[derive(Debug, Clone)]
pub struct DescriptorQueue {
    inner: Fifo<TransferDescriptor>,
}

impl DescriptorQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "descriptor queue needs capacity");
        Self {
            inner: Fifo::new(Some(capacity)),
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.inner.full()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.max_size().unwrap_or(usize::MAX)
    }

    /// Admit a descriptor.
    ///
    /// Never blocks: a full queue hands the descriptor back.
    pub fn push(&mut self, desc: TransferDescriptor) -> Result<(), TransferDescriptor> {
        if self.inner.full() {
            return Err(desc);
        }
        self.inner.enqueue(desc);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<TransferDescriptor> {
        self.inner.dequeue()
    }

    #[must_use]
    pub fn contains(&self, id: TransferId) -> bool {
        self.inner.iter().any(|desc| desc.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransferDescriptor> {
        self.inner.iter()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::DescriptorQueue;
    use crate::dma::descriptor::{Direction, TransferDescriptor, TransferRequest};

    fn desc(id: u64) -> TransferDescriptor {
        let req = TransferRequest {
            dst_addr: 0xFFFF_0000,
            src_addr: 0x1000,
            size: 64,
            direction: Direction::GlobalToLocal,
            core_id: 0,
        };
        TransferDescriptor::new(id, &req, 0)
    }

    #[test]
    fn test_rejects_when_full() {
        let mut queue = DescriptorQueue::new(2);
        assert_eq!(queue.capacity(), 2);
        assert!(queue.push(desc(0)).is_ok());
        assert!(!queue.is_full());
        assert!(queue.push(desc(1)).is_ok());
        assert!(queue.is_full());

        let rejected = queue.push(desc(2)).unwrap_err();
        assert_eq!(rejected.id, 2);
        assert_eq!(queue.len(), 2);
        assert!(queue.contains(1));
        assert!(!queue.contains(2));
    }

    #[test]
    fn test_in_order_dequeue() {
        let mut queue = DescriptorQueue::new(4);
        for id in 0..3 {
            assert!(queue.push(desc(id)).is_ok());
        }
        let ids: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|d| d.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(queue.is_empty());
    }
}
