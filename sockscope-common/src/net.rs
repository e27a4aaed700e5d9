use core::cmp::Ordering;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

#[inline(always)]
fn ipv4_mapped(addr: [u8; 4]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..12].copy_from_slice(&IPV4_MAPPED_PREFIX);
    out[12..].copy_from_slice(&addr);
    out
}

#[inline(always)]
fn to_ip(addr: &[u8; 16]) -> IpAddr {
    if addr[..12] == IPV4_MAPPED_PREFIX {
        return IpAddr::V4(Ipv4Addr::new(addr[12], addr[13], addr[14], addr[15]));
    }
    IpAddr::V6(Ipv6Addr::from(*addr))
}

#[inline(always)]
fn from_ip(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => ipv4_mapped(v4.octets()),
        IpAddr::V6(v6) => v6.octets(),
    }
}

/// TCP 4-tuple of a socket. IPv4 addresses are stored IPv4-mapped so that
/// both families share the same fixed layout.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionInfo {
    pub s_addr: [u8; 16],
    pub d_addr: [u8; 16],
    pub s_port: u16,
    pub d_port: u16,
}

impl ConnectionInfo {
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        Self {
            s_addr: from_ip(src.ip()),
            d_addr: from_ip(dst.ip()),
            s_port: src.port(),
            d_port: dst.port(),
        }
    }

    pub fn src(&self) -> SocketAddr {
        SocketAddr::new(to_ip(&self.s_addr), self.s_port)
    }

    pub fn dst(&self) -> SocketAddr {
        SocketAddr::new(to_ip(&self.d_addr), self.d_port)
    }

    #[inline(always)]
    fn endpoint_order(&self) -> Ordering {
        self.s_port
            .cmp(&self.d_port)
            .then_with(|| self.s_addr.cmp(&self.d_addr))
    }

    #[inline(always)]
    pub fn is_sorted(&self) -> bool {
        self.endpoint_order() != Ordering::Greater
    }

    /// Puts the endpoints in canonical order: the endpoint with the lower
    /// port becomes the source (the server view of a connection), address
    /// bytes break ties. Both sides of a connection sort to the same key.
    #[inline(always)]
    pub fn sort(&mut self) {
        if !self.is_sorted() {
            core::mem::swap(&mut self.s_addr, &mut self.d_addr);
            core::mem::swap(&mut self.s_port, &mut self.d_port);
        }
    }

    #[inline(always)]
    pub fn sorted(mut self) -> Self {
        self.sort();
        self
    }
}

/// Connection identity: a canonical 4-tuple owned by a process
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PidConnectionInfo {
    pub conn: ConnectionInfo,
    pub pid: u32,
}

impl PidConnectionInfo {
    #[inline(always)]
    pub fn new(conn: ConnectionInfo, pid: u32) -> Self {
        Self { conn, pid }
    }
}

/// Connection identity remembered together with the destination port the
/// tuple had before sorting, needed to tell client from server later on.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SslPidConnectionInfo {
    pub p_conn: PidConnectionInfo,
    pub orig_dport: u16,
}

/// Key of the cross-interface trace cache. The destination address is
/// left out, it is what changes when a connection gets relayed onto
/// another interface. The destination port stays, it tells apart the
/// clients of a same server.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartialConnectionInfo {
    pub s_addr: [u8; 16],
    pub s_port: u16,
    pub d_port: u16,
    pub tcp_seq: u32,
}

impl PartialConnectionInfo {
    /// Derives the partial key of a (sorted) packet tuple
    #[inline(always)]
    pub fn from_packet(conn: &ConnectionInfo, tcp_seq: u32) -> Self {
        Self {
            s_addr: conn.s_addr,
            s_port: conn.s_port,
            d_port: conn.d_port,
            tcp_seq,
        }
    }
}
