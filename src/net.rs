use std::net::{IpAddr, SocketAddr, UdpSocket};

use crate::error::ServeError;

/// Returns the source address the OS would pick to reach `target`.
///
/// Connecting a UDP socket only fixes its route, no datagram leaves the host,
/// so this works without actual connectivity to `target`.
pub fn discover_local_ip(target: SocketAddr) -> Result<IpAddr, ServeError> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(ServeError::Discovery)?;
    socket.connect(target).map_err(ServeError::Discovery)?;
    let ip = socket.local_addr().map_err(ServeError::Discovery)?.ip();
    tracing::debug!(%target, %ip, "discovered local address");
    Ok(ip)
}
