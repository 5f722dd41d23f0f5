//! # Engine Errors
//!
//! Every initialization failure of the engine maps to exactly one variant of
//! `EngineError`. Steady-state backpressure (full Submit ring, empty
//! Completion ring, temporarily empty frame pool) is never an error, and
//! frame ownership violations panic instead of being returned.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The process lacks a capability required for AF_XDP and BPF.
    #[error("insufficient privileges: {0}")]
    Privilege(String),

    /// No network interface carries the requested name.
    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    /// The redirect program object is missing, invalid, or lacks the
    /// requested entry point or map.
    #[error("failed to load redirect program: {context}")]
    Load {
        context: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Both native and generic attach attempts failed.
    #[error("failed to attach redirect program to interface {if_index}")]
    Attach {
        if_index: u32,
        #[source]
        source: io::Error,
    },

    /// Memory-lock limit, shared memory allocation, or UMEM registration.
    #[error("{context}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Socket creation, queue binding, or redirection map update.
    #[error("{context}")]
    Bind {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The frame pool is empty and the kernel holds no receive buffers.
    #[error("frame pool exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EngineError {
    pub(crate) fn resource(context: impl Into<String>, source: io::Error) -> Self {
        EngineError::Resource {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn bind(context: impl Into<String>, source: io::Error) -> Self {
        EngineError::Bind {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn load(context: impl Into<String>, source: Option<io::Error>) -> Self {
        EngineError::Load {
            context: context.into(),
            source,
        }
    }
}
