pub mod command;
pub mod runner;
pub mod udp_pong;
pub mod veth;
