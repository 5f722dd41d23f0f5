//! # Ring Memory
//!
//! ## Purpose
//!
//! A ring is a power-of-two array of descriptors plus a producer cursor, a
//! consumer cursor and a flags word, all living in memory shared with the
//! other endpoint. This module maps that memory and gives typed, atomic access
//! to it. The reserve/submit/peek/release protocol on top of it lives in
//! `channel`.
//!
//! ## How it works
//!
//! For a kernel ring, the sizes are set with `setsockopt` (`RingType::set_size`),
//! the field offsets are queried with `XDP_MMAP_OFFSETS` (`ring_offsets`), and
//! the ring is mapped from the socket at the page offset of its type
//! (`RingType::mmap`). `Ring::anonymous` lays out the same fields in private
//! anonymous memory so that a `peer()` view can play the kernel's part.
//!
//! ## Main components
//!
//! - `Ring<T>`: typed view on one ring mapping.
//! - `RingType`: the four AF_XDP rings and their socket options.
//! - `XdpDesc`: the Receive/Submit descriptor, `struct xdp_desc`.

use crate::mmap::OwnedMmap;
use std::mem::size_of;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::{io, ptr};

/// Descriptor of the Receive and Submit rings. The Fill and Completion rings
/// carry bare `u64` frame addresses.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XdpDesc {
    pub addr: u64,
    pub len: u32,
    pub options: u32,
}

impl XdpDesc {
    pub fn new(addr: u64, len: u32) -> Self {
        XdpDesc {
            addr,
            len,
            options: 0,
        }
    }
}

/// Typed view on the shared memory of one ring.
pub struct Ring<T> {
    mmap: Arc<OwnedMmap>,
    producer: *const AtomicU32,
    consumer: *const AtomicU32,
    flags: *const AtomicU32,
    desc: *mut T,
    size: u32,
}

// field layout of anonymous rings, one cache line per cursor
const ANON_PRODUCER: usize = 0;
const ANON_CONSUMER: usize = 64;
const ANON_FLAGS: usize = 128;
const ANON_DESC: usize = 192;

impl<T: Copy> Ring<T> {
    /// Maps a kernel ring of `size` descriptors from the socket `fd`.
    pub fn mmap(
        fd: libc::c_int,
        size: u32,
        pgoff: libc::off_t,
        offsets: &libc::xdp_ring_offset,
    ) -> io::Result<Self> {
        debug_assert!(size.is_power_of_two());
        let map_size = (offsets.desc as usize).saturating_add(size as usize * size_of::<T>());
        let map_addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                fd,
                pgoff,
            )
        };
        if map_addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let mmap = unsafe { OwnedMmap::from_raw(map_addr, map_size) };
        Ok(Ring::from_layout(
            Arc::new(mmap),
            offsets.producer as usize,
            offsets.consumer as usize,
            offsets.flags as usize,
            offsets.desc as usize,
            size,
        ))
    }

    /// Creates a ring of `size` descriptors in private anonymous memory.
    ///
    /// Nothing but `peer()` views of the same ring can see it; it exists to
    /// drive the ring protocol without a kernel on the other side.
    pub fn anonymous(size: u32) -> io::Result<Self> {
        debug_assert!(size.is_power_of_two());
        let mmap = OwnedMmap::anonymous(ANON_DESC + size as usize * size_of::<T>(), Some(false))?;
        Ok(Ring::from_layout(
            Arc::new(mmap),
            ANON_PRODUCER,
            ANON_CONSUMER,
            ANON_FLAGS,
            ANON_DESC,
            size,
        ))
    }

    /// Another view of the same ring memory, for the opposite endpoint.
    pub fn peer(&self) -> Self {
        Ring {
            mmap: self.mmap.clone(),
            producer: self.producer,
            consumer: self.consumer,
            flags: self.flags,
            desc: self.desc,
            size: self.size,
        }
    }

    fn from_layout(
        mmap: Arc<OwnedMmap>,
        producer: usize,
        consumer: usize,
        flags: usize,
        desc: usize,
        size: u32,
    ) -> Self {
        let base = mmap.as_u8_ptr();
        unsafe {
            Ring {
                producer: base.add(producer) as *const AtomicU32,
                consumer: base.add(consumer) as *const AtomicU32,
                flags: base.add(flags) as *const AtomicU32,
                desc: base.add(desc) as *mut T,
                size,
                mmap,
            }
        }
    }

    /// Number of descriptor slots.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn producer(&self) -> u32 {
        unsafe { (*self.producer).load(Ordering::Acquire) }
    }

    pub fn consumer(&self) -> u32 {
        unsafe { (*self.consumer).load(Ordering::Acquire) }
    }

    pub fn flags(&self) -> u32 {
        unsafe { (*self.flags).load(Ordering::Relaxed) }
    }

    pub(crate) fn store_producer(&self, value: u32) {
        unsafe { (*self.producer).store(value, Ordering::Release) }
    }

    pub(crate) fn store_consumer(&self, value: u32) {
        unsafe { (*self.consumer).store(value, Ordering::Release) }
    }

    #[cfg(test)]
    pub(crate) fn store_flags(&self, value: u32) {
        unsafe { (*self.flags).store(value, Ordering::Relaxed) }
    }

    /// Reads the descriptor at cursor value `index`, wrapped by the ring size.
    pub(crate) fn desc_at(&self, index: u32) -> T {
        unsafe { ptr::read_volatile(self.desc.add((index & (self.size - 1)) as usize)) }
    }

    /// Writes the descriptor at cursor value `index`, wrapped by the ring size.
    pub(crate) fn set_desc_at(&mut self, index: u32, value: T) {
        unsafe { ptr::write_volatile(self.desc.add((index & (self.size - 1)) as usize), value) }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RingType {
    Tx,
    Rx,
    Fill,
    Completion,
}

impl RingType {
    fn as_sockopt(self) -> libc::c_int {
        match self {
            RingType::Tx => libc::XDP_TX_RING,
            RingType::Rx => libc::XDP_RX_RING,
            RingType::Fill => libc::XDP_UMEM_FILL_RING,
            RingType::Completion => libc::XDP_UMEM_COMPLETION_RING,
        }
    }

    fn as_pgoff(self) -> libc::off_t {
        match self {
            RingType::Tx => libc::XDP_PGOFF_TX_RING as libc::off_t,
            RingType::Rx => libc::XDP_PGOFF_RX_RING as libc::off_t,
            RingType::Fill => libc::XDP_UMEM_PGOFF_FILL_RING as libc::off_t,
            RingType::Completion => libc::XDP_UMEM_PGOFF_COMPLETION_RING as libc::off_t,
        }
    }

    /// Tells the kernel how many slots this ring of the socket has.
    pub fn set_size(self, raw_fd: libc::c_int, size: u32) -> io::Result<()> {
        let rc = unsafe {
            libc::setsockopt(
                raw_fd,
                libc::SOL_XDP,
                self.as_sockopt(),
                &size as *const u32 as *const libc::c_void,
                size_of::<u32>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Maps this ring of the socket. `set_size` must have been called first.
    pub fn mmap<T: Copy>(
        self,
        raw_fd: libc::c_int,
        offsets: &libc::xdp_mmap_offsets,
        size: u32,
    ) -> io::Result<Ring<T>> {
        let ring_offs = match self {
            RingType::Tx => &offsets.tx,
            RingType::Rx => &offsets.rx,
            RingType::Fill => &offsets.fr,
            RingType::Completion => &offsets.cr,
        };
        Ring::mmap(raw_fd, size, self.as_pgoff(), ring_offs)
    }
}

/// Queries the kernel for the field offsets of all four rings of the socket.
pub fn ring_offsets(raw_fd: libc::c_int) -> io::Result<libc::xdp_mmap_offsets> {
    let mut offsets: libc::xdp_mmap_offsets = unsafe { std::mem::zeroed() };
    let mut optlen = size_of::<libc::xdp_mmap_offsets>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            raw_fd,
            libc::SOL_XDP,
            libc::XDP_MMAP_OFFSETS,
            &mut offsets as *mut _ as *mut libc::c_void,
            &mut optlen,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(offsets)
}
