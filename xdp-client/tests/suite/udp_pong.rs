use std::io;
use std::net::UdpSocket;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Answers every `PING` with a `PONG` until cancelled.
pub fn run_ponger(local_addr: &str, token: CancellationToken) -> io::Result<u32> {
    let socket = UdpSocket::bind(local_addr)?;
    log::debug!("[UDP_Ponger] Listening on {}...", local_addr);
    socket.set_read_timeout(Some(Duration::from_millis(100)))?;
    let mut buffer = [0u8; 1024];
    let mut answered = 0;
    loop {
        match socket.recv_from(&mut buffer) {
            Ok((number_of_bytes, src_addr)) => {
                if &buffer[..number_of_bytes] == b"PING" {
                    log::debug!("[UDP_Ponger] Received 'PING' from {}. Responding...", src_addr);
                    socket.send_to(b"PONG", src_addr)?;
                    answered += 1;
                }
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                if token.is_cancelled() {
                    break;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(answered)
}
