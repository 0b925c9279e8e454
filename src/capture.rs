use crate::error::{Error, Result};
use crate::packet::{
    RouterSolicitation, ALL_NODES, ALL_ROUTERS, ICMPV6_PKT_MAX_LEN, ICMPV6_ROUTER_ADVERTISEMENT,
    ND_HOP_LIMIT,
};
use crate::types::Interface;
use slog::{debug, info, trace, warn, Logger};
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    io::ErrorKind,
    net::{Ipv6Addr, SocketAddr, SocketAddrV6, UdpSocket},
    time::Duration,
};

/// One ICMPv6 message as received: the sender and the ICMPv6 bytes, starting
/// at the type field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Captured {
    pub src: Ipv6Addr,
    pub payload: Vec<u8>,
}

/// Source of captured Router Advertisements.
pub trait Capture {
    /// Blocks until a message arrives or the poll interval passes. `Ok(None)`
    /// means nothing arrived and the caller may check for cancellation.
    fn next_message(&mut self) -> Result<Option<Captured>>;
}

/// Raw ICMPv6 socket bound to one interface.
pub struct Icmp6Capture {
    sock: UdpSocket,
    ifindex: u32,
    buf: Vec<u8>,
    log: Logger,
}

impl Icmp6Capture {
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

    pub fn open(iface: &Interface, log: Logger) -> Result<Self> {
        let open_err = |source| Error::CaptureOpen {
            interface: iface.name().to_string(),
            source,
        };

        let sock =
            Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6)).map_err(open_err)?;
        sock.bind_device(Some(iface.name().as_bytes()))
            .map_err(open_err)?;
        // routers only accept solicitations with a hop limit of 255
        sock.set_multicast_hops_v6(ND_HOP_LIMIT).map_err(open_err)?;
        sock.set_multicast_if_v6(iface.index()).map_err(open_err)?;
        if let Err(e) = sock.join_multicast_v6(&ALL_NODES, iface.index()) {
            warn!(log, "failed to join all-nodes group"; "group" => %ALL_NODES, "error" => %e);
        }
        sock.set_read_timeout(Some(Self::POLL_INTERVAL))
            .map_err(open_err)?;

        info!(log, "capturing router advertisements"; "interface" => %iface);
        Ok(Self {
            sock: sock.into(),
            ifindex: iface.index(),
            buf: vec![0u8; ICMPV6_PKT_MAX_LEN],
            log,
        })
    }

    /// Send a single Router Solicitation to all routers on the link.
    pub fn solicit(&self) -> Result<()> {
        let dst = SocketAddrV6::new(ALL_ROUTERS, 0, 0, self.ifindex);
        let rs = RouterSolicitation::default().to_byte_vec();
        let sent = self.sock.send_to(&rs, dst).map_err(Error::Solicit)?;
        info!(self.log, "router solicitation sent"; "bytes" => sent, "dst" => %ALL_ROUTERS);
        Ok(())
    }
}

impl Capture for Icmp6Capture {
    fn next_message(&mut self) -> Result<Option<Captured>> {
        self.buf.fill(0);
        match self.sock.recv_from(&mut self.buf) {
            Ok((rx_bytes, SocketAddr::V6(src))) => {
                let payload = &self.buf[..rx_bytes];
                if payload.first() != Some(&ICMPV6_ROUTER_ADVERTISEMENT) {
                    trace!(self.log, "ignoring non-RA ICMPv6 message";
                        "src" => %src.ip(), "type" => payload.first().copied());
                    return Ok(None);
                }
                debug!(self.log, "rx {rx_bytes} bytes"; "src" => %src.ip());
                Ok(Some(Captured {
                    src: *src.ip(),
                    payload: payload.to_vec(),
                }))
            }
            Ok((_, SocketAddr::V4(src))) => {
                warn!(self.log, "unexpected IPv4 source on ICMPv6 socket"; "src" => %src);
                Ok(None)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(Error::Capture(e)),
        }
    }
}
