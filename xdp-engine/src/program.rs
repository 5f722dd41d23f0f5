//! # Redirect Program Lifecycle
//!
//! ## Purpose
//!
//! Loads the prebuilt XDP redirect program from a BPF object file, attaches
//! it to a network interface, and detaches it again on shutdown.
//!
//! ## How it works
//!
//! `XdpProgram::load` opens and loads the object with `libbpf-sys`, then looks
//! up the entry point and the `XSKMAP` by name. `Attachment::attach` tries the
//! native (driver) mode first and falls back to the generic (skb) mode. The
//! mode that succeeded is kept, because a detach must name the same mode the
//! program was attached with. Dropping an `Attachment` detaches it; dropping
//! the program closes the BPF object.
//!
//! The attach/detach calls go through the `RedirectProgram` trait so the
//! lifecycle can be driven by something other than a kernel-loaded program.
//!
//! ## Main components
//!
//! - `RedirectProgram`: attach/detach/map seam.
//! - `XdpProgram`: a program loaded through libbpf.
//! - `Attachment`: the `UNATTACHED -> NATIVE | SKB -> DETACHED` state machine.
//! - `XskMap`: the redirection table the socket registers in.

use crate::config::ProgramSpec;
use crate::error::EngineError;
use std::ffi::CString;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt as _;
use std::{io, ptr};

/// How an XDP program is hooked into the interface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttachMode {
    /// In the driver, before an skb is allocated.
    Native,
    /// Generic XDP, after the skb is built. Works on every interface.
    Skb,
}

impl AttachMode {
    pub fn xdp_flags(self) -> u32 {
        match self {
            AttachMode::Native => libbpf_sys::XDP_FLAGS_DRV_MODE,
            AttachMode::Skb => libbpf_sys::XDP_FLAGS_SKB_MODE,
        }
    }
}

/// A redirect program that can be attached to and detached from interfaces.
pub trait RedirectProgram {
    fn attach(&mut self, if_index: u32, mode: AttachMode) -> io::Result<()>;
    fn detach(&mut self, if_index: u32, mode: AttachMode) -> io::Result<()>;
    /// The redirection table sockets register in, if the program has one.
    fn xsk_map(&self) -> Option<XskMap>;
}

/// An XDP program loaded from a BPF object file.
pub struct XdpProgram {
    bpf_obj: *mut libbpf_sys::bpf_object,
    prog_fd: RawFd,
    map_fd: RawFd,
}

impl XdpProgram {
    /// Opens and loads the object at `spec.path` and resolves the entry point
    /// and the redirection map.
    pub fn load(spec: &ProgramSpec) -> Result<Self, EngineError> {
        let path = CString::new(spec.path.as_os_str().as_bytes())
            .map_err(|_| EngineError::load("object path contains a NUL byte", None))?;
        let prog_name = CString::new(spec.name.as_str())
            .map_err(|_| EngineError::load("program name contains a NUL byte", None))?;
        let map_name = CString::new(spec.map_name.as_str())
            .map_err(|_| EngineError::load("map name contains a NUL byte", None))?;

        let bpf_obj = unsafe { libbpf_sys::bpf_object__open_file(path.as_ptr(), ptr::null()) };
        if bpf_obj.is_null() {
            return Err(EngineError::load(
                format!("could not open {}", spec.path.display()),
                Some(io::Error::last_os_error()),
            ));
        }
        // from here on the object is closed by Drop on every error path
        let mut program = XdpProgram {
            bpf_obj,
            prog_fd: -1,
            map_fd: -1,
        };

        let rc = unsafe { libbpf_sys::bpf_object__load(bpf_obj) };
        if rc != 0 {
            return Err(EngineError::load(
                format!("could not load {}", spec.path.display()),
                Some(io::Error::from_raw_os_error(-rc)),
            ));
        }

        let bpf_prog =
            unsafe { libbpf_sys::bpf_object__find_program_by_name(bpf_obj, prog_name.as_ptr()) };
        if bpf_prog.is_null() {
            return Err(EngineError::load(
                format!("no program '{}' in {}", spec.name, spec.path.display()),
                None,
            ));
        }
        program.prog_fd = unsafe { libbpf_sys::bpf_program__fd(bpf_prog) };
        if program.prog_fd < 0 {
            return Err(EngineError::load(
                format!("program '{}' has no descriptor", spec.name),
                None,
            ));
        }

        let map = unsafe { libbpf_sys::bpf_object__find_map_by_name(bpf_obj, map_name.as_ptr()) };
        program.map_fd = if map.is_null() {
            -1
        } else {
            unsafe { libbpf_sys::bpf_map__fd(map) }
        };
        if program.map_fd < 0 {
            return Err(EngineError::load(
                format!("no map '{}' in {}", spec.map_name, spec.path.display()),
                None,
            ));
        }

        log::info!("loaded redirect program '{}' from {}", spec.name, spec.path.display());
        Ok(program)
    }
}

impl RedirectProgram for XdpProgram {
    fn attach(&mut self, if_index: u32, mode: AttachMode) -> io::Result<()> {
        let rc = unsafe {
            libbpf_sys::bpf_xdp_attach(
                if_index as libc::c_int,
                self.prog_fd,
                mode.xdp_flags() | libbpf_sys::XDP_FLAGS_UPDATE_IF_NOEXIST,
                ptr::null(),
            )
        };
        if rc < 0 {
            return Err(io::Error::from_raw_os_error(-rc));
        }
        Ok(())
    }

    fn detach(&mut self, if_index: u32, mode: AttachMode) -> io::Result<()> {
        let rc = unsafe {
            libbpf_sys::bpf_xdp_detach(if_index as libc::c_int, mode.xdp_flags(), ptr::null())
        };
        if rc < 0 {
            return Err(io::Error::from_raw_os_error(-rc));
        }
        Ok(())
    }

    fn xsk_map(&self) -> Option<XskMap> {
        Some(XskMap { fd: self.map_fd })
    }
}

impl Drop for XdpProgram {
    fn drop(&mut self) {
        if !self.bpf_obj.is_null() {
            unsafe { libbpf_sys::bpf_object__close(self.bpf_obj) };
        }
    }
}

/// Where the redirect program currently stands on its interface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttachState {
    Attached(AttachMode),
    Detached,
}

/// A redirect program attached to one interface.
pub struct Attachment<P: RedirectProgram> {
    program: P,
    if_index: u32,
    state: AttachState,
}

impl<P: RedirectProgram> Attachment<P> {
    /// Attaches `program` to `if_index` in native mode, or in skb mode if the
    /// driver refuses native mode.
    pub fn attach(mut program: P, if_index: u32) -> Result<Self, EngineError> {
        log::info!("attaching redirect program to interface {if_index}");
        let mode = match program.attach(if_index, AttachMode::Native) {
            Ok(()) => AttachMode::Native,
            Err(native) => {
                log::warn!("native attach failed ({native}), falling back to skb mode");
                program
                    .attach(if_index, AttachMode::Skb)
                    .map_err(|source| EngineError::Attach { if_index, source })?;
                AttachMode::Skb
            }
        };
        log::info!("redirect program attached to interface {if_index} in {mode:?} mode");
        Ok(Attachment {
            program,
            if_index,
            state: AttachState::Attached(mode),
        })
    }

    pub fn state(&self) -> AttachState {
        self.state
    }

    /// The mode the program was attached with, until it is detached.
    pub fn mode(&self) -> Option<AttachMode> {
        match self.state {
            AttachState::Attached(mode) => Some(mode),
            AttachState::Detached => None,
        }
    }

    pub fn if_index(&self) -> u32 {
        self.if_index
    }

    pub fn program(&self) -> &P {
        &self.program
    }

    /// Detaches with the recorded mode. Later calls do nothing.
    pub fn detach(&mut self) -> io::Result<()> {
        let AttachState::Attached(mode) = self.state else {
            return Ok(());
        };
        self.state = AttachState::Detached;
        self.program.detach(self.if_index, mode)?;
        log::info!("redirect program detached from interface {} ({mode:?})", self.if_index);
        Ok(())
    }
}

impl<P: RedirectProgram> Drop for Attachment<P> {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            log::error!(
                "Failed to detach redirect program from interface {}: {e}",
                self.if_index
            );
        }
    }
}

/// Handle on a `BPF_MAP_TYPE_XSKMAP` owned by a loaded program.
#[derive(Debug, Clone, Copy)]
pub struct XskMap {
    fd: RawFd,
}

impl XskMap {
    /// Points `queue_id` at the AF_XDP socket `socket_fd`.
    pub fn insert(&self, queue_id: u32, socket_fd: RawFd) -> io::Result<()> {
        let key = queue_id;
        let value: u32 = socket_fd as u32;
        let rc = unsafe {
            libbpf_sys::bpf_map_update_elem(
                self.fd,
                &key as *const u32 as *const std::ffi::c_void,
                &value as *const u32 as *const std::ffi::c_void,
                0,
            )
        };
        if rc < 0 {
            return Err(io::Error::from_raw_os_error(-rc));
        }
        Ok(())
    }

    pub fn remove(&self, queue_id: u32) -> io::Result<()> {
        let key = queue_id;
        let rc = unsafe {
            libbpf_sys::bpf_map_delete_elem(self.fd, &key as *const u32 as *const std::ffi::c_void)
        };
        if rc < 0 {
            return Err(io::Error::from_raw_os_error(-rc));
        }
        Ok(())
    }
}
