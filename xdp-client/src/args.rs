use clap::Parser;
use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Sends UDP packets through an AF_XDP socket and logs the replies")]
pub struct Args {
    /// network interface to bind
    #[clap(default_value = "enp8s0f0")]
    pub interface: String,

    /// source ip:port, the interface address with port 40000 if omitted
    #[clap(short, long)]
    pub src: Option<String>,

    /// destination ip:port
    #[clap(short = 'D', long, default_value = "192.168.183.124:40000")]
    pub dst: String,

    /// destination (or next hop) MAC address
    #[clap(short = 'm', long, default_value = "ff:ff:ff:ff:ff:ff")]
    pub dst_mac: String,

    /// payload
    #[clap(short, long, default_value = "hello")]
    pub text: String,

    /// delay between packets like 1s or 100ms
    #[clap(short, long, default_value = "1s")]
    pub delay: String,

    /// number of packets to send, 0 sends until interrupted
    #[clap(short, long, default_value_t = 0)]
    pub count: u32,

    /// number of frames in the shared memory region
    #[clap(long, default_value_t = xdp_engine::config::DEFAULT_FRAME_COUNT)]
    pub frames: u32,

    /// frame size in bytes
    #[clap(long, default_value_t = xdp_engine::config::DEFAULT_FRAME_SIZE)]
    pub frame_size: u32,

    /// interface queue to bind
    #[clap(short, long, default_value_t = 0)]
    pub queue: u32,

    /// BPF object holding the redirect program
    #[clap(short, long)]
    pub program: Option<PathBuf>,
}

impl Args {
    pub fn delay(&self) -> anyhow::Result<Duration> {
        humantime::parse_duration(&self.delay)
            .map_err(|e| anyhow::anyhow!("invalid delay '{}': {e}", self.delay))
    }

    pub fn dst(&self) -> anyhow::Result<SocketAddrV4> {
        self.dst
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid destination '{}': {e}", self.dst))
    }

    /// The source address, if given on the command line.
    pub fn src(&self) -> anyhow::Result<Option<SocketAddrV4>> {
        self.src
            .as_deref()
            .map(|src| {
                src.parse()
                    .map_err(|e| anyhow::anyhow!("invalid source '{src}': {e}"))
            })
            .transpose()
    }

    pub fn dst_mac(&self) -> anyhow::Result<[u8; 6]> {
        let mac = self
            .dst_mac
            .parse::<eui48::MacAddress>()
            .map_err(|e| anyhow::anyhow!("invalid MAC address '{}': {e}", self.dst_mac))?;
        Ok(mac.to_array())
    }
}
