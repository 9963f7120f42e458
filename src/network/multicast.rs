use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use nix::ifaddrs::getifaddrs;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::core::{Error, Result};
use super::Transport;

/// IPv4 multicast group membership on one interface
///
/// Sending and receiving use independent sockets. The receive socket joins the
/// group with loopback enabled, so a station also hears its own transmissions.
#[derive(Debug)]
pub struct MulticastTransport {
    send_socket: UdpSocket,
    recv_socket: UdpSocket,
    group: SocketAddr,
}

impl MulticastTransport {
    /// Joins `group:port` on the named interface (empty name for any interface)
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(interface: &str, group: Ipv4Addr, port: u16) -> Result<Self> {
        if !group.is_multicast() {
            return Err(Error::transport(format!("{} is not a multicast address", group)));
        }
        let iface = interface_addr(interface)?;
        debug!("using interface address {} for '{}'", iface, interface);

        let recv_socket = reuse_socket()?;
        recv_socket
            .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())
            .map_err(|e| Error::transport(format!("failed to bind port {}: {}", port, e)))?;
        recv_socket
            .join_multicast_v4(&group, &iface)
            .map_err(|e| {
                Error::transport(format!("failed to join {} on {}: {}", group, iface, e))
            })?;
        recv_socket
            .set_multicast_loop_v4(true)
            .map_err(|e| Error::transport(format!("failed to enable loopback: {}", e)))?;

        let send_socket = reuse_socket()?;
        send_socket
            .bind(&SocketAddrV4::new(iface, 0).into())
            .map_err(|e| {
                Error::transport(format!("failed to bind send socket on {}: {}", iface, e))
            })?;
        send_socket
            .set_multicast_if_v4(&iface)
            .map_err(|e| Error::transport(format!("failed to select interface {}: {}", iface, e)))?;
        send_socket
            .set_multicast_loop_v4(true)
            .map_err(|e| Error::transport(format!("failed to enable loopback: {}", e)))?;

        info!("joined multicast group {}:{} on {}", group, port, iface);

        Ok(MulticastTransport {
            send_socket: into_tokio(send_socket)?,
            recv_socket: into_tokio(recv_socket)?,
            group: SocketAddrV4::new(group, port).into(),
        })
    }
}

impl Transport for MulticastTransport {
    async fn send(&self, datagram: &[u8]) -> Result<()> {
        let sent = self
            .send_socket
            .send_to(datagram, self.group)
            .await
            .map_err(Error::Transmit)?;
        if sent != datagram.len() {
            return Err(Error::Transmit(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("sent {} of {} bytes", sent, datagram.len()),
            )));
        }
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let (len, _from) = self.recv_socket.recv_from(buf).await.map_err(Error::Receive)?;
        Ok(len)
    }
}

fn reuse_socket() -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| Error::transport(format!("failed to create socket: {}", e)))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| Error::transport(format!("failed to set SO_REUSEADDR: {}", e)))?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket
        .set_reuse_port(true)
        .map_err(|e| Error::transport(format!("failed to set SO_REUSEPORT: {}", e)))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| Error::transport(format!("failed to set non-blocking: {}", e)))?;
    Ok(socket)
}

fn into_tokio(socket: Socket) -> Result<UdpSocket> {
    UdpSocket::from_std(socket.into())
        .map_err(|e| Error::transport(format!("failed to register socket: {}", e)))
}

/// First IPv4 address of the named interface
fn interface_addr(name: &str) -> Result<Ipv4Addr> {
    if name.is_empty() {
        return Ok(Ipv4Addr::UNSPECIFIED);
    }

    let addrs = getifaddrs()
        .map_err(|e| Error::transport(format!("failed to list interfaces: {}", e)))?;

    addrs
        .filter(|ifaddr| ifaddr.interface_name == name)
        .find_map(|ifaddr| {
            ifaddr
                .address
                .as_ref()
                .and_then(|addr| addr.as_sockaddr_in())
                .map(|sin| *SocketAddrV4::from(*sin).ip())
        })
        .ok_or_else(|| Error::transport(format!("interface '{}' has no IPv4 address", name)))
}
