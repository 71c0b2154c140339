#![allow(
    clippy::upper_case_acronyms,
    non_camel_case_types,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::too_many_lines,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::module_name_repetitions
)]

pub mod arbitration;
pub mod batch;
pub mod config;
pub mod dma;
pub mod dram;
pub mod engine;
pub mod fifo;
pub mod local_mem;
pub mod mem_fetch;
pub mod memory;
pub mod port;
pub mod sim;
pub mod socket;

#[cfg(test)]
pub mod testing;

pub use dma::DmaEngine;
pub use sim::Simulation;
pub use socket::Socket;

pub type address = u64;
