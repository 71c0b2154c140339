use crate::dma;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] utils::fs::Error),
    #[error("failed to parse config")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid dma config")]
    Dma(#[from] dma::config::Error),
}

/// Configuration of one socket: its cores' scratchpads, main memory timing
/// and the DMA engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Socket {
    pub socket_id: usize,
    /// Cores per socket
    pub num_cores: usize,
    /// Cycles from accepting a request to its response
    pub dram_latency: u64,
    pub dram_queue_size: Option<usize>,
    pub local_mem_latency: u64,
    pub local_mem_queue_size: Option<usize>,
    /// Queue size of the instruction and data cache request ports
    pub cache_queue_size: Option<usize>,
    pub dma: dma::Config,
}

impl Default for Socket {
    fn default() -> Self {
        Self {
            socket_id: 0,
            num_cores: 4,
            dram_latency: 100,
            dram_queue_size: Some(32),
            local_mem_latency: 2,
            local_mem_queue_size: Some(8),
            cache_queue_size: Some(8),
            dma: dma::Config::default(),
        }
    }
}

impl Socket {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let reader = utils::fs::open_readable(path.as_ref())?;
        let config: Self = serde_yaml::from_reader(reader)?;
        config.dma_config().validate()?;
        log::debug!("loaded socket config from {}", path.as_ref().display());
        Ok(config)
    }

    /// DMA configuration matching this socket.
    #[must_use]
    pub fn dma_config(&self) -> dma::Config {
        dma::Config {
            socket_id: self.socket_id,
            num_cores: self.num_cores,
            ..self.dma.clone()
        }
    }

    /// Map a global core id to the id within this socket.
    ///
    /// Returns `None` if the core belongs to another socket.
    #[must_use]
    pub fn local_core_id(&self, global_core_id: usize) -> Option<usize> {
        if self.num_cores == 0 || global_core_id / self.num_cores != self.socket_id {
            return None;
        }
        Some(global_core_id % self.num_cores)
    }

    #[must_use]
    pub fn global_core_id(&self, core_id: usize) -> usize {
        self.socket_id * self.num_cores + core_id
    }
}
