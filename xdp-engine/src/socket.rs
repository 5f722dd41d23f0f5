//! # Socket Binding
//!
//! ## Purpose
//!
//! Binds the AF_XDP socket that registered a `Umem` to one queue of a network
//! interface, maps its Receive and Submit rings, and registers the socket in
//! the redirect program's `XSKMAP` under the queue index so that the program
//! can steer that queue's traffic to it.
//!
//! ## How it works
//!
//! The socket is the descriptor the UMEM was registered on (the first socket
//! of a UMEM always reuses it), so binding sizes the socket rings on that
//! descriptor, maps them, and calls `bind` with a `sockaddr_xdp`. Teardown
//! removes the `XSKMAP` entry and unmaps the rings; the descriptor itself is
//! closed with the `Umem`.
//!
//! The kick is a zero-length non-blocking `sendto`. When the socket is bound
//! with `XDP_USE_NEED_WAKEUP`, it is only issued if the kernel raised
//! `XDP_RING_NEED_WAKEUP` on the Submit ring.

use crate::channel::{Consumer, Producer};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::program::XskMap;
use crate::ring::{RingType, XdpDesc, ring_offsets};
use crate::umem::Umem;
use std::mem::size_of;
use std::os::fd::RawFd;
use std::{io, ptr};

pub struct XskSocket {
    rx: Option<Consumer<XdpDesc>>,
    tx: Option<Producer<XdpDesc>>,
    raw_fd: RawFd,
    if_index: u32,
    queue_id: u32,
    need_wakeup: bool,
    xsk_map: Option<XskMap>,
}

impl XskSocket {
    /// Binds the socket of `umem` to (`if_index`, `config.queue_id`) and,
    /// if given, registers it in `xsk_map`.
    pub fn bind(
        umem: &Umem,
        if_index: u32,
        config: &EngineConfig,
        xsk_map: Option<XskMap>,
    ) -> Result<Self, EngineError> {
        let raw_fd = umem.raw_fd().ok_or_else(|| {
            EngineError::bind(
                "UMEM is not registered with the kernel",
                io::Error::from(io::ErrorKind::NotConnected),
            )
        })?;
        let direction = config.direction;

        let map_rings = || -> io::Result<(Option<Consumer<XdpDesc>>, Option<Producer<XdpDesc>>)> {
            if direction.receives() {
                RingType::Rx.set_size(raw_fd, config.rx_size)?;
            }
            if direction.transmits() {
                RingType::Tx.set_size(raw_fd, config.tx_size)?;
            }
            let offsets = ring_offsets(raw_fd)?;
            let rx = if direction.receives() {
                Some(Consumer::new(RingType::Rx.mmap(raw_fd, &offsets, config.rx_size)?))
            } else {
                None
            };
            let tx = if direction.transmits() {
                Some(Producer::new(RingType::Tx.mmap(raw_fd, &offsets, config.tx_size)?))
            } else {
                None
            };
            Ok((rx, tx))
        };
        let (rx, tx) =
            map_rings().map_err(|e| EngineError::bind("Failed to map rx/tx rings", e))?;

        let zero_copy = match config.zero_copy {
            Some(true) => libc::XDP_ZEROCOPY,
            Some(false) => libc::XDP_COPY,
            None => 0,
        };
        let need_wakeup = config.need_wakeup();
        let sxdp = libc::sockaddr_xdp {
            sxdp_family: libc::AF_XDP as libc::sa_family_t,
            sxdp_flags: zero_copy | if need_wakeup { libc::XDP_USE_NEED_WAKEUP } else { 0 },
            sxdp_ifindex: if_index,
            sxdp_queue_id: config.queue_id,
            sxdp_shared_umem_fd: 0,
        };
        let rc = unsafe {
            libc::bind(
                raw_fd,
                &sxdp as *const _ as *const libc::sockaddr,
                size_of::<libc::sockaddr_xdp>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(EngineError::bind(
                format!("Failed to bind to interface {if_index} queue {}", config.queue_id),
                io::Error::last_os_error(),
            ));
        }
        log::info!(
            "AF_XDP socket bound to interface {if_index} queue {} ({direction:?})",
            config.queue_id
        );

        let mut socket = XskSocket {
            rx,
            tx,
            raw_fd,
            if_index,
            queue_id: config.queue_id,
            need_wakeup,
            xsk_map: None,
        };
        if let Some(map) = xsk_map {
            map.insert(config.queue_id, raw_fd).map_err(|e| {
                EngineError::bind(
                    format!("Failed to register socket in XSKMAP for queue {}", config.queue_id),
                    e,
                )
            })?;
            socket.xsk_map = Some(map);
        }
        Ok(socket)
    }

    /// Assembles a socket from rings that are not bound to a kernel queue.
    #[cfg(test)]
    pub(crate) fn from_parts(
        rx: Option<Consumer<XdpDesc>>,
        tx: Option<Producer<XdpDesc>>,
        queue_id: u32,
    ) -> Self {
        XskSocket {
            rx,
            tx,
            raw_fd: -1,
            if_index: 0,
            queue_id,
            need_wakeup: true,
            xsk_map: None,
        }
    }

    pub fn rx(&mut self) -> Option<&mut Consumer<XdpDesc>> {
        self.rx.as_mut()
    }

    pub fn tx(&mut self) -> Option<&mut Producer<XdpDesc>> {
        self.tx.as_mut()
    }

    pub fn if_index(&self) -> u32 {
        self.if_index
    }

    pub fn queue_id(&self) -> u32 {
        self.queue_id
    }

    /// Prompts the kernel to drain the Submit ring. Never blocks.
    pub fn kick(&self) -> Result<(), io::Error> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        if self.need_wakeup && !tx.needs_wakeup() {
            return Ok(());
        }
        let rc = unsafe {
            libc::sendto(
                self.raw_fd,
                ptr::null(),
                0,
                libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL,
                ptr::null(),
                0,
            )
        };
        if rc < 0 {
            wakeup_error()?;
        }
        Ok(())
    }

    /// Prompts the kernel to pick up new Fill ring entries, if it asked for it.
    pub fn wake_rx(&self, fill: &Producer<u64>) -> Result<(), io::Error> {
        if self.rx.is_none() || !self.need_wakeup || !fill.needs_wakeup() {
            return Ok(());
        }
        let rc = unsafe {
            libc::recvfrom(
                self.raw_fd,
                ptr::null_mut(),
                0,
                libc::MSG_DONTWAIT,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if rc < 0 {
            wakeup_error()?;
        }
        Ok(())
    }
}

fn wakeup_error() -> Result<(), io::Error> {
    match io::Error::last_os_error().raw_os_error() {
        None | Some(libc::EBUSY | libc::ENOBUFS | libc::EAGAIN) => Ok(()),
        Some(libc::ENETDOWN) => {
            log::warn!("network interface is down, cannot wake up");
            Ok(())
        }
        Some(e) => Err(io::Error::from_raw_os_error(e)),
    }
}

impl Drop for XskSocket {
    fn drop(&mut self) {
        if let Some(map) = self.xsk_map.take() {
            if let Err(e) = map.remove(self.queue_id) {
                log::error!("Failed to remove XSKMAP entry for queue {}: {e}", self.queue_id);
            }
        }
        log::debug!("AF_XDP socket on queue {} deleted", self.queue_id);
    }
}
