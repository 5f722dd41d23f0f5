//! Process and interface prerequisites checked before the engine starts.

use crate::error::EngineError;
use caps::{CapSet, Capability};
use std::ffi::{CStr, CString};
use std::io;
use std::net::Ipv4Addr;

/// Capabilities needed to load BPF programs, create AF_XDP sockets and pin
/// the shared memory region.
pub const REQUIRED_CAPS: &[Capability] = &[
    Capability::CAP_NET_ADMIN,
    Capability::CAP_NET_RAW,
    Capability::CAP_BPF,
    Capability::CAP_IPC_LOCK,
];

/// Fails with `EngineError::Privilege` naming every missing capability.
pub fn check_privileges() -> Result<(), EngineError> {
    let mut missing = Vec::new();
    for cap in REQUIRED_CAPS {
        let has = caps::has_cap(None, CapSet::Effective, *cap)
            .map_err(|e| EngineError::Privilege(format!("cannot read capabilities: {e}")))?;
        if !has {
            missing.push(cap.to_string());
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Privilege(format!(
            "missing {} (run as root)",
            missing.join(", ")
        )))
    }
}

/// Removes the locked memory limit so the whole UMEM can be pinned.
pub fn raise_memlock_limit() -> Result<(), EngineError> {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) } != 0 {
        return Err(EngineError::resource(
            "could not lift RLIMIT_MEMLOCK",
            io::Error::last_os_error(),
        ));
    }
    Ok(())
}

/// Resolves an interface name to its index.
pub fn if_index_by_name(name: &str) -> Result<u32, EngineError> {
    let c_name =
        CString::new(name).map_err(|_| EngineError::InterfaceNotFound(name.to_string()))?;
    match unsafe { libc::if_nametoindex(c_name.as_ptr()) } {
        0 => Err(EngineError::InterfaceNotFound(name.to_string())),
        if_index => Ok(if_index),
    }
}

/// First IPv4 address of an interface that is up.
pub fn ipv4_by_name(name: &str) -> Result<Ipv4Addr, EngineError> {
    let mut addrs: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut addrs) } != 0 {
        return Err(EngineError::Io(io::Error::last_os_error()));
    }
    let mut found = None;
    let mut cursor = addrs;
    while !cursor.is_null() {
        let ifa = unsafe { &*cursor };
        cursor = ifa.ifa_next;
        if ifa.ifa_addr.is_null() || ifa.ifa_flags & libc::IFF_UP as libc::c_uint == 0 {
            continue;
        }
        if unsafe { (*ifa.ifa_addr).sa_family } != libc::AF_INET as libc::sa_family_t {
            continue;
        }
        if unsafe { CStr::from_ptr(ifa.ifa_name) }.to_bytes() != name.as_bytes() {
            continue;
        }
        let sin = unsafe { &*(ifa.ifa_addr as *const libc::sockaddr_in) };
        found = Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)));
        break;
    }
    unsafe { libc::freeifaddrs(addrs) };
    found.ok_or_else(|| EngineError::InterfaceNotFound(format!("{name} (no IPv4 address or down)")))
}

/// Reads the hardware address of an interface.
pub fn mac_by_ifindex(if_index: u32) -> io::Result<[u8; 6]> {
    let socket_fd =
        unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
    if socket_fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let result = unsafe {
        let mut if_req: libc::ifreq = std::mem::zeroed();
        if_req.ifr_ifru.ifru_ifindex = if_index as libc::c_int;
        if libc::ioctl(socket_fd, libc::SIOCGIFNAME, &mut if_req) < 0 {
            Err(io::Error::last_os_error())
        } else if libc::ioctl(socket_fd, libc::SIOCGIFHWADDR, &mut if_req) < 0 {
            Err(io::Error::last_os_error())
        } else {
            let mut mac = [0u8; 6];
            for (octet, byte) in mac.iter_mut().zip(&if_req.ifr_ifru.ifru_hwaddr.sa_data[..6]) {
                *octet = *byte as u8;
            }
            Ok(mac)
        }
    };
    unsafe { libc::close(socket_fd) };
    result
}
