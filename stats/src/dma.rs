use serde::{Deserialize, Serialize};

/// DMA engine performance counters.
///
/// All counters are monotonic for the lifetime of an engine and only
/// go back to zero on an explicit reset.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DMA {
    /// Number of transfers that ran to completion (including failed ones)
    pub transfers: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Cumulative enqueue-to-completion latency of all transfers
    pub transfer_latency: u64,
    pub cycles_active: u64,
    pub cycles_idle: u64,
    pub read_requests: u64,
    pub write_requests: u64,
    /// Cumulative issue-to-response latency of read sub-transactions
    pub read_latency: u64,
    /// Cumulative issue-to-ack latency of write sub-transactions
    pub write_latency: u64,
    /// Requests rejected because the descriptor queue was full
    pub queue_full_rejections: u64,
    /// Polls of an incomplete transfer
    pub wait_stalls: u64,
    /// Cycles a channel could not issue because its port was full
    pub port_stalls: u64,
    pub errors: u64,
}

impl DMA {
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_written
    }

    #[must_use]
    pub fn mean_transfer_latency(&self) -> Option<f64> {
        if self.transfers == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.transfer_latency as f64 / self.transfers as f64)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl std::ops::AddAssign for DMA {
    fn add_assign(&mut self, other: Self) {
        self.transfers += other.transfers;
        self.bytes_read += other.bytes_read;
        self.bytes_written += other.bytes_written;
        self.transfer_latency += other.transfer_latency;
        self.cycles_active += other.cycles_active;
        self.cycles_idle += other.cycles_idle;
        self.read_requests += other.read_requests;
        self.write_requests += other.write_requests;
        self.read_latency += other.read_latency;
        self.write_latency += other.write_latency;
        self.queue_full_rejections += other.queue_full_rejections;
        self.wait_stalls += other.wait_stalls;
        self.port_stalls += other.port_stalls;
        self.errors += other.errors;
    }
}

#[cfg(test)]
mod tests {
    use super::DMA;

    #[test]
    fn test_accumulate_and_reset() {
        let mut total = DMA::default();
        let socket = DMA {
            transfers: 2,
            bytes_read: 128,
            bytes_written: 128,
            transfer_latency: 30,
            ..DMA::default()
        };
        total += socket;
        total += socket;
        assert_eq!(total.transfers, 4);
        assert_eq!(total.bytes_transferred(), 256);
        assert_eq!(total.mean_transfer_latency(), Some(15.0));

        total.reset();
        assert_eq!(total, DMA::default());
        assert_eq!(total.mean_transfer_latency(), None);
    }
}
