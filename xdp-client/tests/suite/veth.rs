use crate::suite::command::execute_command;
use std::io::{Error, ErrorKind, Result};

pub fn setup_pair(dev_prefix: &str, ip_prefix: &str) -> Result<()> {
    log::info!("creating new veth pair {0}0 + {0}1", dev_prefix);
    execute_command(&format!("ip link add {0}0 type veth peer {0}1", dev_prefix))?;
    for (side, host) in [(0, 100), (1, 101)] {
        let dev = format!("{dev_prefix}{side}");
        execute_command(&format!("ip addr add {ip_prefix}{host}/24 dev {dev}"))?;
        execute_command(&format!("ip link set {dev} up"))?;
    }
    Ok(())
}

pub fn teardown_pair(prefix: &str) -> Result<()> {
    log::info!("tearing down veth pair {0}0", prefix);
    execute_command(&format!("ip link del {0}0", prefix))
}

pub fn check_pair(prefix: &str) -> Result<()> {
    let output = std::process::Command::new("ip")
        .arg("link")
        .arg("show")
        .arg(format!("{}0", prefix))
        .output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::new(
            ErrorKind::NotFound,
            format!("Pair {}0 does not exist", prefix),
        ))
    }
}
