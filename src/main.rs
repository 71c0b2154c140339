use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use console::style;
use dmasim::dma::Direction;
use dmasim::{batch, config, Simulation};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run DMA transfers through a simulated socket", long_about = None)]
struct Options {
    /// Socket configuration (YAML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// Bytes per transfer
    #[arg(short, long, default_value_t = 4096)]
    size: u64,
    /// Transfer direction (g2l or l2g)
    #[arg(short, long, default_value = "g2l")]
    direction: Direction,
    /// Number of transfers
    #[arg(short, long, default_value_t = 8)]
    transfers: usize,
    /// First target core (global id), transfers rotate through the socket's cores
    #[arg(long, default_value_t = 0)]
    core: usize,
    #[arg(long, default_value_t = 1_000_000)]
    max_cycles: u64,
    /// Write statistics to this file (json or yaml)
    #[arg(long, value_name = "STATS")]
    stats_out: Option<PathBuf>,
}

fn write_stats(path: &std::path::Path, stats: &stats::Stats) -> eyre::Result<()> {
    let writer = utils::fs::open_writable(path)?;
    match path.extension().and_then(std::ffi::OsStr::to_str) {
        Some("yml" | "yaml") => serde_yaml::to_writer(writer, stats)?,
        _ => serde_json::to_writer_pretty(writer, stats)?,
    }
    Ok(())
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let options = Options::parse();
    let config = match options.config {
        Some(ref path) => config::Socket::from_file(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => config::Socket::default(),
    };
    let num_sockets = options.core / config.num_cores + 1;
    let mut sim = Simulation::new(&config, num_sockets)?;
    let batch = batch::Options {
        size: options.size,
        direction: options.direction,
        transfers: options.transfers,
        first_core: options.core,
        max_cycles: options.max_cycles,
    };

    let start = Instant::now();
    batch::run(&mut sim, &batch)?;
    let elapsed = start.elapsed();

    let stats = sim.stats();
    eprintln!(
        "{} {} transfers ({}) in {} cycles ({:?})",
        style("DONE").green().bold(),
        options.transfers,
        human_bytes::human_bytes(stats.dma.bytes_transferred() as f64),
        stats.sim.cycles,
        elapsed,
    );
    if let Some(latency) = stats.dma.mean_transfer_latency() {
        eprintln!("mean transfer latency: {latency:.1} cycles");
    }
    eprintln!("{:#?}", stats.dma);
    if let Some(ref path) = options.stats_out {
        write_stats(path, &stats).wrap_err_with(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}
