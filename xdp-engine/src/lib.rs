//! Single-queue AF_XDP packet engine.
//!
//! An [`Engine`] attaches a redirect program to an interface, registers a
//! shared memory region with the kernel, binds one AF_XDP socket to one queue
//! and then moves frames between the application and the kernel through the
//! Fill, Receive, Submit and Completion rings, one non-blocking `tick` at a
//! time.

// Public modules and re-exports
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod mmap;
pub mod pool;
pub mod program;
pub mod ring;
pub mod socket;
pub mod sys;
pub mod umem;

pub use config::{Direction, EngineConfig, ProgramSpec};
pub use engine::{Engine, EngineState, TickStats};
pub use error::EngineError;
pub use pool::{Frame, FramePool};
pub use program::{AttachMode, AttachState, Attachment, RedirectProgram, XdpProgram, XskMap};
pub use sys::{
    check_privileges, if_index_by_name, ipv4_by_name, mac_by_ifindex, raise_memlock_limit,
};

#[cfg(test)]
mod tests;
