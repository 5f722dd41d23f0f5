use etherparse::{NetSlice, PacketBuilder, SlicedPacket, TransportSlice};
use std::io;
use std::net::SocketAddrV4;

/// Ethernet, IPv4 and UDP headers without options.
pub const UDP_HEADER_LEN: usize = 42;

/// One end of a UDP flow, down to its hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub mac: [u8; 6],
    pub addr: SocketAddrV4,
}

/// Writes an Ethernet/IPv4/UDP packet carrying `payload` at the start of
/// `buf` and returns its length.
pub fn write_udp_packet(
    buf: &mut [u8],
    src: &Endpoint,
    dst: &Endpoint,
    payload: &[u8],
) -> io::Result<usize> {
    let builder = PacketBuilder::ethernet2(src.mac, dst.mac)
        .ipv4(src.addr.ip().octets(), dst.addr.ip().octets(), 64) // 64 is a common TTL
        .udp(src.addr.port(), dst.addr.port());
    let len = builder.size(payload.len());
    if len > buf.len() {
        return Err(io::Error::other(format!(
            "packet of {len} bytes does not fit into {} bytes",
            buf.len()
        )));
    }
    let mut out = &mut buf[..len];
    builder
        .write(&mut out, payload)
        .map_err(|e| io::Error::other(format!("Error writing packet: {e}")))?;
    Ok(len)
}

/// Source address and payload of an Ethernet/IPv4/UDP packet, or `None` for
/// anything else.
pub fn parse_udp(data: &[u8]) -> Option<(SocketAddrV4, &[u8])> {
    let packet = SlicedPacket::from_ethernet(data).ok()?;
    let Some(NetSlice::Ipv4(ipv4)) = packet.net else {
        return None;
    };
    let Some(TransportSlice::Udp(udp)) = packet.transport else {
        return None;
    };
    let src = SocketAddrV4::new(ipv4.header().source_addr(), udp.source_port());
    Some((src, udp.payload()))
}
