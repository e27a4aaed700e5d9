use sockscope_macros::StrEnum;

use crate::net::PidConnectionInfo;

#[repr(u8)]
#[derive(StrEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    #[str("recv")]
    Recv = 0,
    #[str("send")]
    Send = 1,
}

#[repr(u8)]
#[derive(StrEnum, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsFlag {
    #[str("plain")]
    NoSsl = 0,
    #[str("tls")]
    WithSsl = 1,
}

/// Classification of a buffer prefix by the HTTP sniffer
#[repr(u8)]
#[derive(StrEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    #[default]
    #[str("unknown")]
    Unknown = 0,
    #[str("request")]
    Request = 1,
    #[str("response")]
    Response = 2,
}

impl PacketType {
    #[inline(always)]
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request)
    }
}

/// Pending accept/connect operation, keyed by pid_tgid
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SockArgs {
    pub addr: u64,
    pub accept_time: u64,
}

/// Pending receive operation, keyed by pid_tgid. The message descriptor
/// is captured at entry since the kernel consumes it while copying.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecvArgs {
    pub sock_ptr: u64,
    pub iovec_ptr: u64,
}

/// Outstanding send, registered under both the thread and the socket
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendArgs {
    pub p_conn: PidConnectionInfo,
    pub size: u64,
}

/// Arguments of an in-flight TLS library read/write
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SslArgs {
    pub ssl: u64,
    pub buf: u64,
    // address of the out length for the *_ex variants, 0 otherwise
    pub len_ptr: u64,
}

#[cfg(test)]
mod test {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn test_str_enums() {
        assert_eq!(Direction::Send.as_str(), "send");
        assert_eq!(TlsFlag::from_str("tls"), Ok(TlsFlag::WithSsl));
        assert_eq!(PacketType::try_from_uint(2u8), Ok(PacketType::Response));
        assert!(PacketType::Request.is_request());
        assert!(!PacketType::default().is_request());
    }
}
