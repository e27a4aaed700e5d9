pub const EINPROGRESS: i64 = 115;

/// Shortest prefix the HTTP/1.x sniffer needs to classify a buffer. Also
/// the threshold under which a sent chunk is considered to terminate a
/// response.
pub const MIN_HTTP_SIZE: usize = 12;

/// Bytes copied out of a message descriptor by tcp_sendmsg/tcp_recvmsg
pub const IOVEC_BUF_SIZE: usize = 512;

/// Bytes copied out of a packet by the socket filter fallback
pub const FULL_BUF_SIZE: usize = 160;

pub const MAX_CONCURRENT_REQUESTS: usize = 10000;
pub const MAX_PARTIAL_CONNECTIONS: usize = 1024;

/// 100ms buckets bounding how long a cross-interface match is honored
pub const NANOSECONDS_PER_IMM_EPOCH: u64 = 100_000_000;

/// Thread nesting levels walked when looking for a parent server trace
pub const MAX_CLONE_DEPTH: usize = 3;

// tcp header flags
pub const TCPHDR_FIN: u8 = 0x01;
pub const TCPHDR_SYN: u8 = 0x02;
pub const TCPHDR_RST: u8 = 0x04;
pub const TCPHDR_PSH: u8 = 0x08;
pub const TCPHDR_ACK: u8 = 0x10;
