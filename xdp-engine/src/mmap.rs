//! # Memory Mappings
//!
//! ## Purpose
//!
//! Owns every mapping the engine creates: the shared memory region that backs
//! all frames, and the ring mappings handed out by the kernel. Each mapping is
//! released with `munmap` exactly once, when its owner is dropped.
//!
//! ## How it works
//!
//! `OwnedMmap::anonymous` allocates page-aligned private anonymous memory,
//! optionally backed by 2MB huge pages. Whether huge pages are used when the
//! caller does not decide is answered by `get_hugepage_info()`, which parses
//! `/proc/meminfo`. `OwnedMmap::from_raw` adopts a mapping created elsewhere
//! (the ring mappings of an AF_XDP socket).
//!
//! ## Main components
//!
//! - `OwnedMmap`: owner of one mapping.
//! - `get_hugepage_info()`: huge page availability probe.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::{io, ptr};

const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Owner of one memory mapping; unmaps it on drop.
#[derive(Debug)]
pub struct OwnedMmap {
    ptr: *mut libc::c_void,
    len: usize,
    huge: bool,
}

impl OwnedMmap {
    /// Adopts a mapping of `len` bytes starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must come from a successful `mmap` of exactly `len` bytes that
    /// nothing else will unmap.
    pub unsafe fn from_raw(ptr: *mut libc::c_void, len: usize) -> Self {
        OwnedMmap {
            ptr,
            len,
            huge: false,
        }
    }

    /// Allocates `size` bytes of zeroed, page-aligned anonymous memory.
    ///
    /// If `huge_page` is `None`, huge pages are used when `/proc/meminfo`
    /// reports free 2MB pages. The length is rounded up to the page size in
    /// use.
    pub fn anonymous(size: usize, huge_page: Option<bool>) -> io::Result<Self> {
        let huge = match huge_page {
            Some(yes) => yes,
            None => get_hugepage_info()
                .map(|info| matches!((info.free, info.size_kb), (Some(x), Some(2048)) if x > 0))
                .unwrap_or(false),
        };
        let page_size = if huge {
            HUGE_PAGE_SIZE
        } else {
            unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
        };
        let len = size.max(1).div_ceil(page_size) * page_size;
        let flags = libc::MAP_PRIVATE
            | libc::MAP_ANONYMOUS
            | if huge {
                libc::MAP_HUGETLB | libc::MAP_HUGE_2MB
            } else {
                0
            };
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            if huge && huge_page.is_none() {
                // the probe saw free huge pages but another process got them first
                log::debug!("huge page mapping failed ({err}), retrying with regular pages");
                return OwnedMmap::anonymous(size, Some(false));
            }
            return Err(err);
        }
        Ok(OwnedMmap { ptr, len, huge })
    }

    pub fn as_void_ptr(&self) -> *mut libc::c_void {
        self.ptr
    }

    pub fn as_u8_ptr(&self) -> *mut u8 {
        self.ptr as *mut u8
    }

    /// Size of the mapping in bytes, after page rounding.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is backed by huge pages.
    pub fn is_huge(&self) -> bool {
        self.huge
    }
}

impl Drop for OwnedMmap {
    fn drop(&mut self) {
        if self.ptr != libc::MAP_FAILED && !self.ptr.is_null() {
            let res = unsafe { libc::munmap(self.ptr, self.len) };
            if res < 0 {
                log::error!("Failed to unmap memory: {}", io::Error::last_os_error());
            }
        }
    }
}

/// Contains information about the system's huge page configuration.
#[derive(Debug, Default)]
pub struct HugePageInfo {
    /// The size of a huge page in kilobytes.
    pub size_kb: Option<u64>,
    /// The total number of huge pages configured in the system.
    pub total: Option<u64>,
    /// The number of free huge pages.
    pub free: Option<u64>,
}

/// Parses `/proc/meminfo` for the `Hugepagesize`, `HugePages_Total` and
/// `HugePages_Free` keys.
pub fn get_hugepage_info() -> io::Result<HugePageInfo> {
    let file = File::open("/proc/meminfo")?;
    parse_hugepage_info(BufReader::new(file))
}

pub(crate) fn parse_hugepage_info(reader: impl BufRead) -> io::Result<HugePageInfo> {
    let mut info = HugePageInfo::default();
    for line in reader.lines() {
        let line = line?;
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_end_matches(" kB");
        let slot = match key.trim() {
            "Hugepagesize" => &mut info.size_kb,
            "HugePages_Total" => &mut info.total,
            "HugePages_Free" => &mut info.free,
            _ => continue,
        };
        *slot = Some(value.parse().map_err(io::Error::other)?);
    }
    Ok(info)
}
