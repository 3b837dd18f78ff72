//! Addressing helpers: free ports, advertised host, server ids.

use std::io;
use std::net::{IpAddr, Ipv4Addr, TcpListener, UdpSocket};

use md5::{Digest, Md5};

/// Longest service-name prefix kept in a server id.
const ID_PREFIX_LEN: usize = 31;

/// Ask the OS for a free TCP port.
pub fn free_port() -> io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

/// Host to advertise for a server bound at `host`.
///
/// A concrete address is returned as-is. An unspecified one (`""`, `0.0.0.0`,
/// `::`) is replaced with the address of the outbound interface, falling back
/// to `127.0.0.1`.
#[must_use]
pub fn extract_host(host: &str) -> String {
    if !is_unspecified(host) {
        return host.to_string();
    }
    outbound_ip()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .to_string()
}

pub(crate) fn is_unspecified(host: &str) -> bool {
    host.is_empty()
        || host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_unspecified())
}

// No packet is sent; connecting a UDP socket only picks the route.
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// `host:port`, bracketing IPv6 literals.
#[must_use]
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Server id: up to 31 characters of the name, a dash, and the hex md5 of
/// the name plus a random uuid. Not guaranteed collision-free.
#[must_use]
pub fn generate_id(service_name: &str) -> String {
    let prefix: String = service_name.chars().take(ID_PREFIX_LEN).collect();
    let hash = Md5::digest(format!("{service_name}-{}", uuid::Uuid::new_v4()).as_bytes());
    format!("{prefix}-{}", hex::encode(hash))
}
