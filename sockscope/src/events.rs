use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use sockscope_common::pid::{pid_tgid, PidKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Task an event fired in. `ns_tid` is the thread id as seen from inside
/// its pid namespace, it defaults to `tid`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub pid: u32,
    pub tid: u32,
    #[serde(default)]
    pub ns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns_tid: Option<u32>,
}

impl Task {
    #[inline]
    pub fn pid_tgid(&self) -> u64 {
        pid_tgid(self.pid, self.tid)
    }

    #[inline]
    pub fn pid_key(&self) -> PidKey {
        PidKey::new(self.ns_tid.unwrap_or(self.tid), self.ns)
    }
}

/// Bytes of a memory area or packet, either plain text or hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Hex { hex: String },
}

impl Default for Payload {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Payload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        match self {
            Self::Text(s) => Ok(s.as_bytes().to_vec()),
            Self::Hex { hex } => Ok(hex::decode(hex)?),
        }
    }
}

/// One kernel notification of a recorded trace. Variants without a task
/// describe kernel state (sockets, memory, packets) the handlers will read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KernelEvent {
    /// socket tuple as the owning socket sees it
    Socket {
        sock: u64,
        src: SocketAddr,
        dst: SocketAddr,
    },
    Memory {
        ptr: u64,
        data: Payload,
    },
    Packet {
        skb: u64,
        src: SocketAddr,
        dst: SocketAddr,
        #[serde(default)]
        seq: u32,
        flags: u8,
        #[serde(default)]
        payload: Payload,
        #[serde(default)]
        cookie: u64,
    },
    SockAlloc {
        task: Task,
        sock: u64,
    },
    Accept {
        task: Task,
        fd: i64,
    },
    TcpConnect {
        task: Task,
        sock: u64,
    },
    Connect {
        task: Task,
        ret: i64,
    },
    RcvEstablished {
        task: Task,
        sock: u64,
    },
    SendMsg {
        task: Task,
        sock: u64,
        msg: u64,
        size: u64,
    },
    SendMsgRet {
        task: Task,
        sent: i32,
    },
    RecvMsg {
        task: Task,
        sock: u64,
        msg: u64,
    },
    RecvMsgRet {
        task: Task,
        copied: i32,
    },
    Close {
        task: Task,
        sock: u64,
    },
    Clone {
        task: Task,
        child: i64,
    },
    Exit {
        task: Task,
        #[serde(default)]
        status: i32,
    },
    SslHandshake {
        task: Task,
        ssl: u64,
    },
    SslHandshakeRet {
        task: Task,
    },
    SslRead {
        task: Task,
        ssl: u64,
        buf: u64,
        #[serde(default)]
        len_ptr: Option<u64>,
    },
    SslReadRet {
        task: Task,
        ret: i32,
    },
    SslWrite {
        task: Task,
        ssl: u64,
        buf: u64,
        #[serde(default)]
        len_ptr: Option<u64>,
    },
    SslWriteRet {
        task: Task,
        ret: i32,
    },
    SslShutdown {
        task: Task,
        ssl: u64,
    },
}

impl KernelEvent {
    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::Socket { .. } | Self::Memory { .. } | Self::Packet { .. } => None,
            Self::SockAlloc { task, .. }
            | Self::Accept { task, .. }
            | Self::TcpConnect { task, .. }
            | Self::Connect { task, .. }
            | Self::RcvEstablished { task, .. }
            | Self::SendMsg { task, .. }
            | Self::SendMsgRet { task, .. }
            | Self::RecvMsg { task, .. }
            | Self::RecvMsgRet { task, .. }
            | Self::Close { task, .. }
            | Self::Clone { task, .. }
            | Self::Exit { task, .. }
            | Self::SslHandshake { task, .. }
            | Self::SslHandshakeRet { task }
            | Self::SslRead { task, .. }
            | Self::SslReadRet { task, .. }
            | Self::SslWrite { task, .. }
            | Self::SslWriteRet { task, .. }
            | Self::SslShutdown { task, .. } => Some(task),
        }
    }
}

/// Line of a recorded trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// monotonic time of the event in ns
    #[serde(default)]
    pub ts: u64,
    #[serde(flatten)]
    pub event: KernelEvent,
}
