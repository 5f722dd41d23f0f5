use anyhow::Context as _;
use clap::Parser as _;
use std::net::SocketAddrV4;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use std::thread;
use xdp_client::{Args, Endpoint, parse_udp, write_udp_packet};
use xdp_engine::{
    Engine, EngineConfig, EngineError, ProgramSpec, XdpProgram, check_privileges,
    if_index_by_name, ipv4_by_name, mac_by_ifindex, raise_memlock_limit,
};

const DEFAULT_PORT: u16 = 40000;
// sleep between ticks while nothing is due
const IDLE: Duration = Duration::from_millis(1);

struct Client {
    engine: Engine,
    src: Endpoint,
    dst: Endpoint,
}

fn init(args: &Args) -> anyhow::Result<Client> {
    check_privileges()?;
    let if_index = if_index_by_name(&args.interface)?;
    log::info!("found network interface '{}' ({if_index})", args.interface);

    let src_addr = match args.src()? {
        Some(addr) => addr,
        None => SocketAddrV4::new(ipv4_by_name(&args.interface)?, DEFAULT_PORT),
    };
    let src = Endpoint {
        mac: mac_by_ifindex(if_index)
            .with_context(|| format!("cannot read MAC address of {}", args.interface))?,
        addr: src_addr,
    };
    let dst = Endpoint {
        mac: args.dst_mac()?,
        addr: args.dst()?,
    };

    raise_memlock_limit()?;

    let spec = match &args.program {
        Some(path) => ProgramSpec {
            path: path.clone(),
            ..ProgramSpec::default()
        },
        None => ProgramSpec::bundled().unwrap_or_default(),
    };
    let program = XdpProgram::load(&spec)?;

    let config = EngineConfig {
        frame_count: args.frames,
        frame_size: args.frame_size,
        queue_id: args.queue,
        ..EngineConfig::default()
    };
    let engine = Engine::start(config, program, if_index)?;
    Ok(Client { engine, src, dst })
}

/// Writes one packet into a fresh frame and queues it. A full pool or backlog
/// only costs this packet.
fn send_one(engine: &mut Engine, src: &Endpoint, dst: &Endpoint, payload: &[u8]) -> bool {
    let Some(frame) = engine.alloc_frame() else {
        log::warn!("no free frame, packet skipped");
        return false;
    };
    let len = match write_udp_packet(engine.frame_mut(frame), src, dst, payload) {
        Ok(len) => len as u32,
        Err(e) => {
            log::error!("{e}");
            engine.free_frame(frame);
            return false;
        }
    };
    if let Err(frame) = engine.queue_tx(frame, len) {
        log::warn!("transmit backlog full, packet dropped");
        engine.free_frame(frame);
        return false;
    }
    true
}

fn run(client: &mut Client, args: &Args, shutdown: &AtomicBool) -> anyhow::Result<()> {
    let delay = args.delay()?;
    let payload = args.text.as_bytes();
    let (src, dst) = (client.src, client.dst);
    log::info!("sending to {} from {}", dst.addr, src.addr);

    let mut next_send = Instant::now();
    let mut sent = 0u32;
    let totals = client.engine.run(
        shutdown,
        |engine| {
            let now = Instant::now();
            if now >= next_send {
                if args.count != 0 && sent >= args.count {
                    // one more delay for the replies, then stop
                    shutdown.store(true, Ordering::Relaxed);
                } else if send_one(engine, &src, &dst, payload) {
                    sent += 1;
                }
                next_send = now + delay;
            }
            thread::sleep(IDLE);
            Ok::<(), EngineError>(())
        },
        |frame, data| match parse_udp(data) {
            Some((from, payload)) => log::info!(
                "received {} bytes from {from}: {}",
                payload.len(),
                String::from_utf8_lossy(payload)
            ),
            None => log::debug!("received {} bytes in {frame:?}", data.len()),
        },
    )?;
    log::info!(
        "sent {} packets, {} completed, {} received",
        totals.submitted,
        totals.completed,
        totals.received
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        log::error!("cannot install signal handler: {e}");
        return ExitCode::FAILURE;
    }

    let mut client = match init(&args) {
        Ok(client) => client,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    match run(&mut client, &args, &shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
