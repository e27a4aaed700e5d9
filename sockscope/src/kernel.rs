use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use sockscope_common::{
    http::{Direction, PacketType, TlsFlag},
    net::{ConnectionInfo, PidConnectionInfo},
    pid::PidKey,
    tcp::{ProtocolInfo, SkbInfo},
    trace::TpInfoPid,
};
use sockscope_probes::Helpers;

use crate::{
    events::Task,
    export::{Exporter, Record},
    sniffer,
};

// ethernet + ipv4 + tcp headers without options
pub const DEFAULT_HDR_LEN: u32 = 14 + 20 + 20;

#[derive(Debug, Clone)]
struct Packet {
    info: SkbInfo,
    bytes: Vec<u8>,
    cookie: u64,
}

/// Kernel state rebuilt from a recorded event stream, exposed to the
/// probes through [`Helpers`]. Captured data ends up in an [`Exporter`].
#[derive(Default)]
pub struct ReplayKernel {
    task: Cell<Task>,
    clock: Cell<u64>,
    socks: RefCell<HashMap<u64, ConnectionInfo>>,
    memory: RefCell<HashMap<u64, Vec<u8>>>,
    packets: RefCell<HashMap<u64, Packet>>,
    exporter: RefCell<Exporter>,
}

impl ReplayKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kernel whose exporter tracks at most `max` requests at once
    pub fn with_max_pending(max: usize) -> Self {
        Self {
            exporter: RefCell::new(Exporter::with_max_pending(max)),
            ..Default::default()
        }
    }

    pub fn set_task(&self, task: Task) {
        self.task.set(task);
    }

    pub fn set_clock(&self, ns: u64) {
        self.clock.set(ns);
    }

    pub fn add_socket(&self, sock: u64, conn: ConnectionInfo) {
        self.socks.borrow_mut().insert(sock, conn);
    }

    pub fn add_memory(&self, ptr: u64, data: Vec<u8>) {
        self.memory.borrow_mut().insert(ptr, data);
    }

    pub fn add_packet(&self, skb: u64, conn: ConnectionInfo, seq: u32, flags: u8, payload: &[u8], cookie: u64) {
        let mut bytes = vec![0u8; DEFAULT_HDR_LEN as usize];
        bytes.extend_from_slice(payload);

        let info = SkbInfo {
            tcp: ProtocolInfo {
                hdr_len: DEFAULT_HDR_LEN,
                seq,
                flags,
            },
            conn,
            len: bytes.len() as u32,
        };

        self.packets
            .borrow_mut()
            .insert(skb, Packet { info, bytes, cookie });
    }

    /// Records exported since the last call
    pub fn drain_records(&self) -> Vec<Record> {
        self.exporter.borrow_mut().drain()
    }

    pub fn trace_of(&self, conn: &ConnectionInfo) -> Option<TpInfoPid> {
        self.exporter.borrow_mut().traces().get(conn)
    }

    pub fn pending_requests(&self) -> usize {
        self.exporter.borrow().pending_len()
    }
}

#[inline]
fn copy_from(src: &[u8], offset: usize, dst: &mut [u8]) -> usize {
    let Some(src) = src.get(offset..) else {
        return 0;
    };
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

impl Helpers for ReplayKernel {
    fn current_pid_tgid(&self) -> u64 {
        self.task.get().pid_tgid()
    }

    fn ktime_get_ns(&self) -> u64 {
        self.clock.get()
    }

    fn task_tid(&self) -> PidKey {
        self.task.get().pid_key()
    }

    fn parse_sock_info(&self, sock: u64) -> Option<ConnectionInfo> {
        self.socks.borrow().get(&sock).copied()
    }

    fn read_msghdr_buf(&self, msg: u64, buf: &mut [u8]) -> usize {
        self.read_user_buf(msg, buf)
    }

    fn read_user_buf(&self, ptr: u64, buf: &mut [u8]) -> usize {
        self.memory
            .borrow()
            .get(&ptr)
            .map(|m| copy_from(m, 0, buf))
            .unwrap_or_default()
    }

    fn read_sk_buff(&self, skb: u64) -> Option<SkbInfo> {
        self.packets.borrow().get(&skb).map(|p| p.info)
    }

    fn skb_load_bytes(&self, skb: u64, offset: u32, buf: &mut [u8]) -> usize {
        self.packets
            .borrow()
            .get(&skb)
            .map(|p| copy_from(&p.bytes, offset as usize, buf))
            .unwrap_or_default()
    }

    fn socket_cookie(&self, skb: u64) -> u64 {
        self.packets
            .borrow()
            .get(&skb)
            .map(|p| p.cookie)
            .unwrap_or_default()
    }

    fn is_http(&self, buf: &[u8]) -> PacketType {
        sniffer::classify(buf)
    }

    fn handle_buf_with_connection(
        &self,
        p_conn: &PidConnectionInfo,
        buf: &[u8],
        ssl: TlsFlag,
        direction: Direction,
        orig_dport: u16,
        parent: Option<&TpInfoPid>,
    ) -> Option<TpInfoPid> {
        self.exporter.borrow_mut().capture(
            p_conn,
            buf,
            ssl,
            direction,
            orig_dport,
            parent,
            self.clock.get(),
        )
    }

    fn handle_fallback_request(&self, conn: &ConnectionInfo, buf: &[u8], full_len: u32) {
        self.exporter
            .borrow_mut()
            .fallback_request(conn, buf, full_len)
    }

    fn trace_info_for_connection(&self, conn: &ConnectionInfo) -> Option<TpInfoPid> {
        self.trace_of(conn)
    }

    fn set_trace_info_for_connection(&self, conn: &ConnectionInfo, tp: &TpInfoPid) {
        self.exporter.borrow_mut().link_trace(conn, tp)
    }

    fn update_http_sent_len(&self, p_conn: &PidConnectionInfo, sent_len: i32) {
        self.exporter.borrow_mut().update_sent_len(p_conn, sent_len)
    }

    fn finish_possible_delayed_http_request(&self, p_conn: &PidConnectionInfo) {
        self.exporter.borrow_mut().finish(p_conn, self.clock.get())
    }

    fn finish_possible_delayed_tls_http_request(&self, p_conn: &PidConnectionInfo, ssl: u64) {
        self.exporter
            .borrow_mut()
            .finish_tls(p_conn, ssl, self.clock.get())
    }

    fn delete_ongoing_request(&self, p_conn: &PidConnectionInfo) {
        self.exporter.borrow_mut().delete_ongoing(p_conn)
    }
}
