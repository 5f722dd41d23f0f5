use crate::suite::veth;
use std::future::Future;
use std::io::{ErrorKind, Result};

pub const DEV_PREFIX: &str = "xdpEng";
pub const IP_PREFIX: &str = "192.168.78.";

pub struct Host {
    pub if_dev: String,
    pub ip: String,
}

pub struct HostPair {
    pub host0: Host,
    pub host1: Host,
}

impl HostPair {
    pub fn from_prefixes(dev_prefix: &str, ip_prefix: &str) -> Self {
        HostPair {
            host0: Host {
                if_dev: format!("{}0", dev_prefix),
                ip: format!("{}100", ip_prefix),
            },
            host1: Host {
                if_dev: format!("{}1", dev_prefix),
                ip: format!("{}101", ip_prefix),
            },
        }
    }
}

/// Runs `test` against a fresh veth pair and removes the pair afterwards,
/// whether the test passed or not.
pub async fn run_test_with_pair<F, Fut>(test: F) -> Result<()>
where
    F: FnOnce(HostPair) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match veth::check_pair(DEV_PREFIX) {
        Ok(()) => veth::teardown_pair(DEV_PREFIX)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    veth::setup_pair(DEV_PREFIX, IP_PREFIX)?;
    let result = test(HostPair::from_prefixes(DEV_PREFIX, IP_PREFIX)).await;
    veth::teardown_pair(DEV_PREFIX)?;
    result
}
