use crate::config;
use crate::dma::{self, dcr, Direction, RequestError, State, TransferRequest, ValidationError};
use crate::local_mem::Scratchpad;
use crate::mem_fetch::{Kind, MemReq, MemorySpace, Tag};
use crate::memory::Backing;
use crate::socket::{Socket, DCACHE_PORT, DMA_PORT, ICACHE_PORT};
use color_eyre::eyre;
use pretty_assertions_sorted as diff;
use stats::mem::AccessKind;
use std::sync::{Arc, Mutex};

fn new_socket(dma: dma::Config) -> eyre::Result<Socket> {
    super::init_logging();
    let config = config::Socket {
        dram_latency: 8,
        local_mem_latency: 2,
        dma,
        ..config::Socket::default()
    };
    Ok(Socket::new(config)?)
}

fn run_until_idle(socket: &mut Socket, cycle: &mut u64, max_cycles: u64) -> eyre::Result<()> {
    let end = *cycle + max_cycles;
    while socket.is_busy() {
        eyre::ensure!(*cycle < end, "socket still busy at cycle {}", cycle);
        socket.cycle(*cycle)?;
        *cycle += 1;
    }
    Ok(())
}

fn pattern(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(3).wrapping_add(seed)).collect()
}

fn g2l(socket: &Socket, src_addr: u64, offset: u64, size: u64, core_id: usize) -> TransferRequest {
    TransferRequest {
        dst_addr: socket.config.dma.local_mem_base + offset,
        src_addr,
        size,
        direction: Direction::GlobalToLocal,
        core_id,
    }
}

#[test]
fn test_single_channel_256_bytes() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config {
        num_channels: 1,
        transfer_size: 64,
        startup_latency: 2,
        max_outstanding_reads: 4,
        max_outstanding_writes: 4,
        local_mem_base: 0x2000,
        local_mem_size: 0x1000,
        ..dma::Config::default()
    })?;
    let data = pattern(1, 256);
    socket.ram.backing.write(0x1000, &data)?;

    let id = socket.trigger_dma_transfer(0x2000, 0x1000, 256, Direction::GlobalToLocal, 0, 0);
    assert_eq!(id, 0);

    // two startup cycles without memory traffic
    for cycle in 0..2 {
        socket.cycle(cycle)?;
        assert_eq!(socket.dma.channels()[0].state(), State::Startup);
        assert_eq!(socket.dma.perf_stats().read_requests, 0);
    }
    socket.cycle(2)?;
    assert_eq!(socket.dma.channels()[0].state(), State::Transferring);
    assert_eq!(socket.dma.perf_stats().read_requests, 1);

    let mut cycle = 3;
    run_until_idle(&mut socket, &mut cycle, 1_000)?;

    let completion = socket.dma.completion(0).copied().expect("completed");
    assert!(completion.success);
    assert_eq!(completion.bytes, 256);
    assert_eq!(socket.dma.transfer_state(0), Some(State::Complete));

    let stats = socket.dma.perf_stats();
    assert_eq!(stats.read_requests, 4);
    assert_eq!(stats.write_requests, 4);
    assert_eq!(stats.bytes_read, 256);
    assert_eq!(stats.bytes_written, 256);
    assert_eq!(stats.transfers, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(socket.dma.accesses().num_accesses(AccessKind::GLOBAL_ACC_R), 4);
    assert_eq!(socket.dma.accesses().num_accesses(AccessKind::LOCAL_ACC_W), 4);
    assert_eq!(&socket.local_mems[0].backing.as_slice()[..256], data.as_slice());
    Ok(())
}

#[test]
fn test_queue_backpressure() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config {
        queue_capacity: 2,
        ..dma::Config::default()
    })?;
    let base = socket.config.dma.local_mem_base;
    let mut ids = Vec::new();
    for i in 0..3 {
        assert_eq!(socket.dma.is_queue_full(), i == 2);
        ids.push(socket.trigger_dma_transfer(base, 0x1000, 64, Direction::GlobalToLocal, 0, 0));
    }
    diff::assert_eq!(ids, vec![0, 1, -1]);
    assert_eq!(socket.dma.perf_stats().queue_full_rejections, 1);
    assert_eq!(socket.dma.queue_len(), 2);

    // a free slot admits the retry
    socket.cycle(0)?;
    assert!(!socket.dma.is_queue_full());
    assert_eq!(
        socket.trigger_dma_transfer(base, 0x1000, 64, Direction::GlobalToLocal, 0, 1),
        2
    );
    Ok(())
}

#[test]
fn test_channel_occupancy() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config {
        num_channels: 2,
        ..dma::Config::default()
    })?;
    let mut ids = Vec::new();
    for i in 0..3 {
        let req = g2l(&socket, 0x1_0000 * (i + 1), 0x400 * i, 512, 0);
        ids.push(socket.dma.request_transfer(req, 0)?);
    }

    let mut max_active = 0;
    let mut cycle = 0;
    while socket.is_busy() {
        eyre::ensure!(cycle < 10_000, "transfers did not finish");
        socket.cycle(cycle)?;
        let active = socket.dma.active_channels();
        assert!(active <= 2, "{active} channels active at cycle {cycle}");
        max_active = max_active.max(active);
        cycle += 1;
    }
    assert_eq!(max_active, 2);
    assert!(ids.iter().all(|&id| socket.dma.is_completed(id)));
    assert_eq!(socket.dma.perf_stats().transfers, 3);
    Ok(())
}

#[test]
fn test_acknowledge_is_idempotent() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config::default())?;
    let req = g2l(&socket, 0x1000, 0, 128, 1);
    let id = socket.dma.request_transfer(req, 0)?;
    let mut cycle = 0;
    while !socket.dma.wait_for_completion(id) {
        eyre::ensure!(cycle < 1_000, "transfer did not finish");
        socket.cycle(cycle)?;
        cycle += 1;
    }
    assert!(socket.dma.perf_stats().wait_stalls > 0);
    assert!(socket.is_completed(id));
    assert!(socket.dma.acknowledge_completion(id));
    assert!(!socket.is_completed(id));
    assert!(!socket.dma.acknowledge_completion(id));
    assert!(!socket.is_completed(id));
    Ok(())
}

#[test]
fn test_invalid_requests_never_transfer() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config::default())?;
    let valid = g2l(&socket, 0x1000, 0, 64, 0);
    let invalid = [
        TransferRequest { size: 0, ..valid },
        TransferRequest { core_id: 4, ..valid },
        TransferRequest {
            src_addr: 0x1020,
            ..valid
        },
        TransferRequest {
            direction: Direction::LocalToGlobal,
            ..valid
        },
    ];
    for req in invalid {
        assert!(matches!(
            socket.dma.request_transfer(req, 0),
            Err(RequestError::Invalid(_))
        ));
    }
    assert!(!socket.dma.is_busy());
    for cycle in 0..10 {
        socket.cycle(cycle)?;
        assert!(socket.dma.channels().iter().all(|c| c.is_idle()));
    }
    let stats = socket.dma.perf_stats();
    assert_eq!(stats.errors, 4);
    assert_eq!(stats.read_requests, 0);
    assert_eq!(stats.transfers, 0);

    // the engine is ready for the next request
    assert_eq!(socket.dma.request_transfer(valid, 10), Ok(0));
    Ok(())
}

#[test]
fn test_global_range_bordering_local_window() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config {
        local_mem_base: 0x2000,
        local_mem_size: 0x1000,
        ..dma::Config::default()
    })?;
    let data = pattern(5, 128);
    socket.ram.backing.write(0x1F80, &data)?;

    // ends exactly where the local window begins
    let bordering = g2l(&socket, 0x1F80, 0x400, 128, 0);
    assert_eq!(socket.dma.request_transfer(bordering, 0), Ok(0));
    let mut cycle = 0;
    run_until_idle(&mut socket, &mut cycle, 10_000)?;
    assert!(socket.dma.completion(0).is_some_and(|c| c.success));
    diff::assert_eq!(
        &socket.local_mems[0].backing.as_slice()[0x400..0x480],
        data.as_slice()
    );
    let accesses = socket.dma.accesses();
    assert_eq!(accesses.num_accesses(AccessKind::GLOBAL_ACC_R), 2);
    assert_eq!(accesses.num_accesses(AccessKind::LOCAL_ACC_R), 0);

    // the second half of the source would be read from the scratchpad
    let crossing = g2l(&socket, 0x1FC0, 0x400, 128, 0);
    let want = Err(RequestError::Invalid(ValidationError::OutOfBounds {
        addr: 0x1FC0,
        size: 128,
        space: MemorySpace::Global,
    }));
    assert_eq!(socket.dma.request_transfer(crossing, cycle), want);
    let crossing_l2g = TransferRequest {
        dst_addr: 0x1FC0,
        src_addr: socket.config.dma.local_mem_base,
        size: 128,
        direction: Direction::LocalToGlobal,
        core_id: 0,
    };
    assert!(matches!(
        socket.dma.request_transfer(crossing_l2g, cycle),
        Err(RequestError::Invalid(ValidationError::OutOfBounds { .. }))
    ));
    assert!(socket.dma_copy_sync(&crossing).is_err());
    assert!(!socket.dma.is_busy());
    assert_eq!(socket.dma.perf_stats().errors, 2);
    Ok(())
}

#[test]
fn test_local_to_global_copies_exact_bytes() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config {
        num_channels: 3,
        ..dma::Config::default()
    })?;
    let base = socket.config.dma.local_mem_base;
    // sizes that are not a multiple of the transfer unit
    let transfers = [(0, 200_u64, 0x8000_u64), (1, 1000, 0x9000), (2, 8, 0xA000)];
    for &(core, size, dst) in &transfers {
        socket.local_mems[core]
            .backing
            .write(0x100, &pattern(core as u8, size as usize))?;
        let req = TransferRequest {
            dst_addr: dst,
            src_addr: base + 0x100,
            size,
            direction: Direction::LocalToGlobal,
            core_id: core,
        };
        socket.dma.request_transfer(req, 0)?;
    }
    let mut cycle = 0;
    run_until_idle(&mut socket, &mut cycle, 10_000)?;

    for &(core, size, dst) in &transfers {
        let mut have = vec![0; size as usize + 4];
        socket.ram.backing.read(dst, &mut have)?;
        let mut want = pattern(core as u8, size as usize);
        want.extend([0; 4]);
        diff::assert_eq!(have, want);
    }
    assert_eq!(socket.dma.perf_stats().bytes_written, 1208);
    assert_eq!(socket.dma.local_binding().in_flight(), 0);
    Ok(())
}

#[test]
fn test_transfers_to_different_cores_rebind_local_port() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config {
        num_channels: 2,
        ..dma::Config::default()
    })?;
    for core in 0..2 {
        let src = 0x10_0000 * (core as u64 + 1);
        socket.ram.backing.write(src, &pattern(core as u8 + 10, 1024))?;
        let req = g2l(&socket, src, 0x800, 1024, core);
        socket.dma.request_transfer(req, 0)?;
    }
    let mut cycle = 0;
    run_until_idle(&mut socket, &mut cycle, 20_000)?;

    for core in 0..2 {
        let lmem = socket.local_mems[core].backing.as_slice();
        assert_eq!(&lmem[0x800..0xC00], pattern(core as u8 + 10, 1024).as_slice());
    }
    assert!(socket.dma.is_completed(0) && socket.dma.is_completed(1));
    assert!(socket.dma.perf_stats().port_stalls > 0);
    assert_eq!(socket.dma.local_binding().in_flight(), 0);
    Ok(())
}

#[test]
fn test_faulting_transfer_reports_error() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config::default())?;
    // core 0 only backs the first 64 bytes of its window
    socket.local_mems[0].backing = Scratchpad::new(64);

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    socket
        .dma
        .set_completion_callback(move |success, bytes| sink.lock().unwrap().push((success, bytes)));

    let failing = socket.dma.request_transfer(g2l(&socket, 0x1000, 0, 256, 0), 0)?;
    let mut cycle = 0;
    run_until_idle(&mut socket, &mut cycle, 1_000)?;

    assert_eq!(socket.dma.transfer_state(failing), Some(State::Error));
    let completion = socket.dma.completion(failing).copied().expect("completed");
    assert!(!completion.success);
    assert!(completion.bytes < 256);
    assert_eq!(socket.dma.perf_stats().errors, 1);
    assert!(socket.dma.channels().iter().all(|c| c.is_idle()));

    // the engine recovers for the next transfer
    let next = socket.dma.request_transfer(g2l(&socket, 0x1000, 0, 256, 1), cycle)?;
    run_until_idle(&mut socket, &mut cycle, 1_000)?;
    assert_eq!(socket.dma.transfer_state(next), Some(State::Complete));

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].0);
    assert_eq!(outcomes[1], (true, 256));
    Ok(())
}

fn cache_read(uid: u64) -> MemReq {
    MemReq {
        addr: 0x80_0000 + uid * 64,
        size: 64,
        kind: Kind::READ_REQUEST,
        space: MemorySpace::Global,
        data: vec![],
        tag: Tag { channel: 0, id: 0 },
        uid,
        core_id: None,
        source: None,
        issue_cycle: 0,
    }
}

/// Cycles until transfer 0 completes, with the data cache optionally
/// issuing a read every cycle.
fn cycles_to_complete(with_cache_traffic: bool) -> eyre::Result<(u64, Socket)> {
    let mut socket = new_socket(dma::Config::default())?;
    let req = g2l(&socket, 0x1000, 0, 4096, 0);
    socket.dma.request_transfer(req, 0)?;
    let mut uid = 0;
    for cycle in 0..10_000 {
        if with_cache_traffic && !socket.dcache.req.full() {
            socket.dcache.req.push(cache_read(uid), cycle, 0);
            uid += 1;
        }
        while socket.dcache.rsp.pop(cycle).is_some() {}
        socket.cycle(cycle)?;
        if socket.is_completed(0) {
            return Ok((cycle, socket));
        }
    }
    eyre::bail!("transfer did not finish")
}

#[test]
fn test_contention_with_cache_traffic() -> eyre::Result<()> {
    let (alone, _) = cycles_to_complete(false)?;
    let (shared, socket) = cycles_to_complete(true)?;
    assert!(shared > alone, "contended {shared} <= uncontended {alone}");
    assert_eq!(socket.arbiter.num_grants[DMA_PORT], 64);
    assert!(socket.arbiter.num_grants[DCACHE_PORT] > 0);
    assert_eq!(socket.arbiter.num_grants[ICACHE_PORT], 0);
    Ok(())
}

#[test]
fn test_register_programmed_transfer() -> eyre::Result<()> {
    let mut socket = new_socket(dma::Config::default())?;
    let base = socket.config.dma.local_mem_base;
    let data = pattern(42, 192);
    socket.ram.backing.write(0x1_0000_0000, &data)?;

    socket.dcr_write(dcr::SRC_ADDR0, 0, 0);
    socket.dcr_write(dcr::SRC_ADDR1, 1, 0);
    socket.dcr_write(dcr::DST_ADDR0, (base + 0x40) as u32, 0);
    socket.dcr_write(dcr::DST_ADDR1, (base >> 32) as u32, 0);
    socket.dcr_write(dcr::SIZE0, 192, 0);
    socket.dcr_write(dcr::SIZE1, 0, 0);
    socket.dcr_write(dcr::CORE_ID, 2, 0);
    socket.dcr_write(dcr::CTRL, dcr::CTRL_START, 0);

    let mut status = socket.dcr_read(dcr::STATUS);
    assert_eq!(status, dcr::Status::Busy.bits());
    let mut cycle = 0;
    while status == dcr::Status::Busy.bits() {
        eyre::ensure!(cycle < 1_000, "transfer did not finish");
        socket.cycle(cycle)?;
        status = socket.dcr_read(dcr::STATUS);
        cycle += 1;
    }
    assert_eq!(status, dcr::Status::Done.bits());
    assert_eq!(socket.dcr_read(dcr::STATUS), dcr::Status::Idle.bits());
    assert!(!socket.is_completed(0));
    assert_eq!(&socket.local_mems[2].backing.as_slice()[0x40..0x100], data.as_slice());

    // a direction that does not match the addresses is an error
    socket.dcr_write(dcr::CTRL, dcr::CTRL_START | dcr::CTRL_DIRECTION, cycle);
    assert_eq!(socket.dcr_read(dcr::STATUS), dcr::Status::Error.bits());
    assert_eq!(socket.dcr_read(dcr::STATUS), dcr::Status::Idle.bits());
    assert!(matches!(
        g2l(&socket, 0x1004, 0, 64, 0).validate(&socket.dma.config),
        Err(ValidationError::Misaligned { .. })
    ));
    Ok(())
}
