#![allow(non_camel_case_types, clippy::upper_case_acronyms)]

pub mod dma;
pub mod mem;
pub mod sim;

pub use dma::DMA;
pub use mem::Accesses;
pub use sim::Sim;

use serde::{Deserialize, Serialize};

#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub sim: Sim,
    pub dma: DMA,
    pub accesses: Accesses,
}

impl std::ops::AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.sim += other.sim;
        self.dma += other.dma;
        self.accesses += other.accesses;
    }
}
