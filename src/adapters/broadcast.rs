//! UDP discovery broadcast.
//!
//! The home server finds the bin by listening for a datagram on
//! `pi_broadcast_port` whose payload is the bin's IPv4 address as text.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use log::debug;

const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

pub struct UdpBroadcaster;

impl UdpBroadcaster {
    /// Address of the interface that routes to the LAN.
    ///
    /// A connected UDP socket sends nothing; it only makes the kernel pick
    /// a source address.
    pub fn local_ipv4() -> io::Result<Ipv4Addr> {
        let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        probe.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        match probe.local_addr()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
            _ => Ok(Ipv4Addr::LOCALHOST),
        }
    }

    /// Send one discovery datagram.  Returns the address announced.
    pub fn announce(port: u16) -> io::Result<Ipv4Addr> {
        let ip = Self::local_ipv4().unwrap_or(Ipv4Addr::LOCALHOST);
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_broadcast(true)?;
        socket.set_write_timeout(Some(WRITE_TIMEOUT))?;
        let target = SocketAddr::from((Ipv4Addr::BROADCAST, port));
        socket.send_to(ip.to_string().as_bytes(), target)?;
        debug!("BCAST | announced {} on port {}", ip, port);
        Ok(ip)
    }
}
