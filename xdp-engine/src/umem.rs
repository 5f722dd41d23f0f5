//! # UMEM: the Shared Memory Region
//!
//! ## Purpose
//!
//! Allocates the page-aligned region that backs every frame, registers it
//! with the kernel on a fresh AF_XDP socket, and maps the two rings that
//! belong to the region rather than to a socket: Fill and Completion.
//!
//! ## How it works
//!
//! 1. Creates a raw `AF_XDP` socket. Its descriptor is the registration
//!    handle of the region, and the first socket bound on the region reuses it.
//! 2. Maps `frame_count * frame_size` bytes of anonymous memory, optionally on
//!    huge pages.
//! 3. Registers the memory with `XDP_UMEM_REG`, one chunk per frame.
//! 4. Sizes and maps the Fill and Completion rings.
//!
//! Dropping a `Umem` unmaps the two rings, closes the socket descriptor and
//! frees the memory, in that order.

use crate::channel::{Consumer, Producer};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::mmap::OwnedMmap;
use crate::pool::Frame;
use crate::ring::{RingType, ring_offsets};
use std::mem::size_of;
use std::os::fd::{AsRawFd as _, FromRawFd as _, OwnedFd, RawFd};
use std::{io, slice};

pub struct Umem {
    // field order is teardown order
    fill: Producer<u64>,
    completion: Consumer<u64>,
    fd: Option<OwnedFd>,
    area: OwnedMmap,
    frame_size: u32,
    frame_count: u32,
}

impl Umem {
    /// Allocates and registers the shared memory region described by `config`.
    pub fn create(config: &EngineConfig) -> Result<Self, EngineError> {
        let fd = unsafe {
            let fd = libc::socket(libc::AF_XDP, libc::SOCK_RAW | libc::SOCK_CLOEXEC, 0);
            if fd < 0 {
                return Err(EngineError::resource(
                    "Failed to create AF_XDP socket",
                    io::Error::last_os_error(),
                ));
            }
            OwnedFd::from_raw_fd(fd)
        };
        let raw_fd = fd.as_raw_fd();

        let area = OwnedMmap::anonymous(config.umem_len(), config.huge_page)
            .map_err(|e| EngineError::resource("Failed to allocate UMEM", e))?;
        log::debug!(
            "allocated UMEM of {} bytes at {:p} (huge pages: {})",
            area.len(),
            area.as_void_ptr(),
            area.is_huge()
        );

        register(raw_fd, &area, config)
            .map_err(|e| EngineError::resource("Failed to register UMEM", e))?;

        let fill_size = if config.direction.receives() { config.fill_size } else { 1 };
        let comp_size = if config.direction.transmits() { config.comp_size } else { 1 };
        let map_rings = || -> io::Result<(Producer<u64>, Consumer<u64>)> {
            RingType::Fill.set_size(raw_fd, fill_size)?;
            RingType::Completion.set_size(raw_fd, comp_size)?;
            let offsets = ring_offsets(raw_fd)?;
            Ok((
                Producer::new(RingType::Fill.mmap(raw_fd, &offsets, fill_size)?),
                Consumer::new(RingType::Completion.mmap(raw_fd, &offsets, comp_size)?),
            ))
        };
        let (fill, completion) = map_rings()
            .map_err(|e| EngineError::resource("Failed to map fill/completion rings", e))?;

        Ok(Umem {
            fill,
            completion,
            fd: Some(fd),
            area,
            frame_size: config.frame_size,
            frame_count: config.frame_count,
        })
    }

    /// Assembles a region from parts that are not registered with a kernel.
    #[cfg(test)]
    pub(crate) fn from_parts(
        area: OwnedMmap,
        fill: Producer<u64>,
        completion: Consumer<u64>,
        frame_size: u32,
        frame_count: u32,
    ) -> Self {
        Umem {
            fill,
            completion,
            fd: None,
            area,
            frame_size,
            frame_count,
        }
    }

    /// Descriptor the region was registered on, if it was registered.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd())
    }

    pub fn fill(&mut self) -> &mut Producer<u64> {
        &mut self.fill
    }

    pub fn completion(&mut self) -> &mut Consumer<u64> {
        &mut self.completion
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    fn check(&self, frame: Frame, len: usize) {
        assert!(
            frame.offset() < self.frame_count as u64 * self.frame_size as u64,
            "{frame:?} lies outside the UMEM"
        );
        assert!(
            len <= self.frame_size as usize,
            "length {len} exceeds frame size {}",
            self.frame_size
        );
    }

    /// The first `len` bytes of a frame.
    pub fn frame(&self, frame: Frame, len: usize) -> &[u8] {
        self.check(frame, len);
        unsafe { slice::from_raw_parts(self.area.as_u8_ptr().add(frame.offset() as usize), len) }
    }

    /// Packet bytes the kernel described by address and length. The address
    /// may point past the frame base when the driver reserved headroom.
    pub(crate) fn packet(&self, addr: u64, len: usize) -> &[u8] {
        let frame_size = self.frame_size as u64;
        let within = addr % frame_size;
        assert!(
            addr < self.frame_count as u64 * frame_size && within + len as u64 <= frame_size,
            "descriptor {addr:#x}+{len} crosses a frame boundary"
        );
        unsafe { slice::from_raw_parts(self.area.as_u8_ptr().add(addr as usize), len) }
    }

    /// The whole frame, for writing.
    pub fn frame_mut(&mut self, frame: Frame) -> &mut [u8] {
        let len = self.frame_size as usize;
        self.check(frame, len);
        unsafe {
            slice::from_raw_parts_mut(self.area.as_u8_ptr().add(frame.offset() as usize), len)
        }
    }
}

fn register(raw_fd: RawFd, area: &OwnedMmap, config: &EngineConfig) -> io::Result<()> {
    let reg = unsafe {
        libc::xdp_umem_reg {
            addr: area.as_void_ptr() as u64,
            len: config.umem_len() as u64,
            chunk_size: config.frame_size,
            headroom: 0,
            ..std::mem::zeroed()
        }
    };
    let rc = unsafe {
        libc::setsockopt(
            raw_fd,
            libc::SOL_XDP,
            libc::XDP_UMEM_REG,
            &reg as *const _ as *const libc::c_void,
            size_of::<libc::xdp_umem_reg>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
