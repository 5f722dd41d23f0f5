//! # Engine Configuration
//!
//! ## Purpose
//!
//! Holds the shape of the shared memory region (frame count and size), the
//! ring sizes, the queue to bind, and the socket knobs. Defaults follow the
//! values libxdp uses for its default UMEM and socket configuration.
//!
//! ## Main components
//!
//! - `EngineConfig`: everything needed to bring an engine to `SOCKET_READY`.
//! - `Direction`: which of the transmit and receive paths are in use.
//! - `ProgramSpec`: where to find the redirect program and its map.

use crate::error::EngineError;
use std::path::PathBuf;

/// Default number of frames in the shared memory region.
pub const DEFAULT_FRAME_COUNT: u32 = 4096;
/// Default frame size, `XSK_UMEM__DEFAULT_FRAME_SIZE`.
pub const DEFAULT_FRAME_SIZE: u32 = 4096;
/// Smallest frame size the kernel accepts for aligned chunks.
pub const MIN_FRAME_SIZE: u32 = 2048;
/// `XSK_RING_CONS__DEFAULT_NUM_DESCS`, used for the Receive and Submit rings.
pub const DEFAULT_SOCKET_RING_SIZE: u32 = 2048;
/// `XSK_RING_PROD__DEFAULT_NUM_DESCS`, used for the Fill and Completion rings.
pub const DEFAULT_UMEM_RING_SIZE: u32 = 2048;
/// Default depth of the application's transmit backlog.
pub const DEFAULT_TX_BACKLOG: usize = 1024;

/// Specifies which packet paths an engine drives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    /// Transmit only: no Receive ring, Fill ring kept at its minimum size.
    Tx,
    /// Receive only: no Submit ring, Completion ring kept at its minimum size.
    Rx,
    /// Both paths share one frame pool.
    #[default]
    Both,
}

impl Direction {
    pub fn transmits(self) -> bool {
        self != Direction::Rx
    }

    pub fn receives(self) -> bool {
        self != Direction::Tx
    }
}

/// Configuration of a single-queue engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of frames in the shared memory region. Power of two.
    pub frame_count: u32,
    /// Size of one frame in bytes. Power of two, `2048..=page size`.
    pub frame_size: u32,
    /// Receive/transmit queue pair of the interface to bind.
    pub queue_id: u32,
    pub direction: Direction,
    /// Receive ring slots. Power of two.
    pub rx_size: u32,
    /// Submit ring slots. Power of two.
    pub tx_size: u32,
    /// Fill ring slots. Power of two.
    pub fill_size: u32,
    /// Completion ring slots. Power of two.
    pub comp_size: u32,
    /// How many transmit descriptors the engine holds back when the Submit
    /// ring is full before `queue_tx` refuses more.
    pub tx_backlog: usize,
    /// Enables or disables zero-copy mode.
    ///
    /// - `Some(true)`: binds with `XDP_ZEROCOPY`.
    /// - `Some(false)`: binds with `XDP_COPY`.
    /// - `None`: lets the kernel pick.
    pub zero_copy: Option<bool>,
    /// Backs the shared memory region with 2MB huge pages.
    ///
    /// - `None`: uses huge pages only if `/proc/meminfo` reports free ones.
    pub huge_page: Option<bool>,
    /// Binds with `XDP_USE_NEED_WAKEUP`. `None` means `true`.
    pub need_wakeup: Option<bool>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            frame_count: DEFAULT_FRAME_COUNT,
            frame_size: DEFAULT_FRAME_SIZE,
            queue_id: 0,
            direction: Direction::default(),
            rx_size: DEFAULT_SOCKET_RING_SIZE,
            tx_size: DEFAULT_SOCKET_RING_SIZE,
            fill_size: DEFAULT_UMEM_RING_SIZE,
            comp_size: DEFAULT_UMEM_RING_SIZE,
            tx_backlog: DEFAULT_TX_BACKLOG,
            zero_copy: None,
            huge_page: None,
            need_wakeup: None,
        }
    }
}

impl EngineConfig {
    /// Total size of the shared memory region in bytes.
    pub fn umem_len(&self) -> usize {
        self.frame_count as usize * self.frame_size as usize
    }

    pub fn need_wakeup(&self) -> bool {
        self.need_wakeup.unwrap_or(true)
    }

    /// Checks the constraints the kernel and the ring arithmetic rely on.
    pub fn validate(&self) -> Result<(), EngineError> {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u32;
        if self.frame_count == 0 || !self.frame_count.is_power_of_two() {
            return Err(EngineError::InvalidConfig(format!(
                "frame count {} is not a power of two",
                self.frame_count
            )));
        }
        if !self.frame_size.is_power_of_two()
            || self.frame_size < MIN_FRAME_SIZE
            || self.frame_size > page_size.max(MIN_FRAME_SIZE)
        {
            return Err(EngineError::InvalidConfig(format!(
                "frame size {} must be a power of two in {MIN_FRAME_SIZE}..={page_size}",
                self.frame_size
            )));
        }
        for (name, size) in [
            ("rx", self.rx_size),
            ("tx", self.tx_size),
            ("fill", self.fill_size),
            ("completion", self.comp_size),
        ] {
            if size == 0 || !size.is_power_of_two() {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} ring size {size} is not a power of two"
                )));
            }
        }
        if self.tx_backlog == 0 {
            return Err(EngineError::InvalidConfig(
                "transmit backlog must hold at least one frame".into(),
            ));
        }
        Ok(())
    }
}

/// Location of the redirect program inside a compiled BPF object.
#[derive(Debug, Clone)]
pub struct ProgramSpec {
    /// Path of the BPF object file.
    pub path: PathBuf,
    /// Name of the XDP entry point.
    pub name: String,
    /// Name of the `BPF_MAP_TYPE_XSKMAP` used to redirect to sockets.
    pub map_name: String,
}

impl Default for ProgramSpec {
    fn default() -> Self {
        ProgramSpec {
            path: PathBuf::from("client_xdp.o"),
            name: "client_xdp".to_string(),
            map_name: "xsks_map".to_string(),
        }
    }
}

impl ProgramSpec {
    /// The redirect program compiled along with this crate, if `clang` was
    /// available at build time.
    pub fn bundled() -> Option<Self> {
        let path = env!("XDP_REDIRECT_OBJ");
        (!path.is_empty()).then(|| ProgramSpec {
            path: PathBuf::from(path),
            ..ProgramSpec::default()
        })
    }
}
