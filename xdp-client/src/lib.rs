// Public modules and re-exports
pub mod args;
pub mod packet;

pub use args::Args;
pub use packet::{Endpoint, parse_udp, write_udp_packet};

#[cfg(test)]
mod tests;
