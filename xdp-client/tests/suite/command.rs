use std::io::{Error, Result};
use std::process::{Command, Stdio};

pub fn execute_command(command: &str) -> Result<()> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        return Err(Error::other(format!(
            "Command failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    log::info!("Command succeeded: {}", command);
    log::debug!("Output: {}", String::from_utf8_lossy(&output.stdout));
    Ok(())
}

/// Whether the process holds every capability in `required`.
pub fn has_capabilities(required: &[caps::Capability]) -> bool {
    required.iter().all(|cap| {
        caps::has_cap(None, caps::CapSet::Effective, *cap).unwrap_or_else(|e| {
            log::warn!("cannot read capability {cap}: {e}");
            false
        })
    })
}
