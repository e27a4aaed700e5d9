use crate::consts::{TCPHDR_ACK, TCPHDR_FIN, TCPHDR_RST};
use crate::net::ConnectionInfo;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolInfo {
    // offset of the tcp payload in the packet
    pub hdr_len: u32,
    pub seq: u32,
    pub flags: u8,
}

impl ProtocolInfo {
    /// Pure acknowledgement, carries nothing worth classifying
    #[inline(always)]
    pub fn is_ack(&self) -> bool {
        self.flags == TCPHDR_ACK
    }

    #[inline(always)]
    pub fn is_close(&self) -> bool {
        self.flags & (TCPHDR_FIN | TCPHDR_RST) != 0
    }
}

/// What the socket filter extracts from a raw packet sample
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SkbInfo {
    pub tcp: ProtocolInfo,
    pub conn: ConnectionInfo,
    // full packet length
    pub len: u32,
}

impl SkbInfo {
    #[inline(always)]
    pub fn payload_len(&self) -> u32 {
        self.len.saturating_sub(self.tcp.hdr_len)
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.payload_len() == 0
    }
}
