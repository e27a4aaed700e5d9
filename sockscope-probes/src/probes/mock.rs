//! Recording [`Helpers`] used by the handler tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use sockscope_common::{
    config::{Loader, ProbeConfig},
    http::{Direction, PacketType, SslArgs, TlsFlag},
    net::{ConnectionInfo, PidConnectionInfo},
    tcp::{ProtocolInfo, SkbInfo},
    trace::{TpInfo, TpInfoPid},
};

use crate::{Helpers, Probes};

pub(crate) use sockscope_common::pid::{pid_tgid, PidKey};

pub(crate) const LOADER_PID: u32 = 1;
pub(crate) const NS: u32 = 4026531836;
pub(crate) const SOCK: u64 = 0xffff_8880_0000_1000;
pub(crate) const MSG: u64 = 0xffff_c900_0000_2000;
pub(crate) const SKB: u64 = 0xffff_8880_0000_3000;
pub(crate) const SSL: u64 = 0x5555_0000_4000;

const TCP_HDR_LEN: u32 = 66;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Forward {
        p_conn: PidConnectionInfo,
        buf: Vec<u8>,
        ssl: TlsFlag,
        direction: Direction,
        orig_dport: u16,
        parent: Option<TpInfoPid>,
    },
    Fallback {
        conn: ConnectionInfo,
        buf: Vec<u8>,
        full_len: u32,
    },
    SentLen(PidConnectionInfo, i32),
    Finish(PidConnectionInfo),
    FinishTls(PidConnectionInfo, u64),
    DeleteOngoing(PidConnectionInfo),
}

struct Packet {
    info: SkbInfo,
    bytes: Vec<u8>,
    cookie: u64,
}

#[derive(Default)]
pub(crate) struct MockHelpers {
    id: Cell<u64>,
    now: Cell<u64>,
    task: Cell<PidKey>,
    socks: RefCell<HashMap<u64, ConnectionInfo>>,
    mem: RefCell<HashMap<u64, Vec<u8>>>,
    packets: RefCell<HashMap<u64, Packet>>,
    traces: RefCell<HashMap<ConnectionInfo, TpInfoPid>>,
    classified: Cell<usize>,
    server_trace: Cell<Option<TpInfoPid>>,
    calls: RefCell<Vec<Call>>,
}

pub(crate) fn probes() -> Probes<MockHelpers> {
    Probes::with_config(
        MockHelpers::default(),
        ProbeConfig::default().with_loader(Loader { tgid: LOADER_PID }),
    )
}

pub(crate) fn conn(src: &str, dst: &str) -> ConnectionInfo {
    ConnectionInfo::new(src.parse().unwrap(), dst.parse().unwrap())
}

/// identity expected once a tuple has been canonicalized
pub(crate) fn p_conn(pid: u32, src: &str, dst: &str) -> PidConnectionInfo {
    PidConnectionInfo::new(conn(src, dst), pid)
}

pub(crate) fn ssl_args(ssl: u64) -> SslArgs {
    SslArgs {
        ssl,
        ..Default::default()
    }
}

pub(crate) fn trace_at(span: u8, ts: u64) -> TpInfoPid {
    TpInfoPid {
        tp: TpInfo {
            trace_id: [0xab; 16],
            span_id: [span; 8],
            ts,
            flags: 1,
            ..Default::default()
        },
        pid: 42,
        valid: 1,
    }
}

impl MockHelpers {
    pub(crate) fn id(&self) -> u64 {
        self.id.get()
    }

    /// Sets the current thread, its namespaced view defaults to the host one
    pub(crate) fn set_thread(&self, pid: u32, tid: u32) {
        self.id.set(pid_tgid(pid, tid));
        self.task.set(PidKey::new(tid, NS));
    }

    pub(crate) fn set_task(&self, task: PidKey) {
        self.task.set(task);
    }

    pub(crate) fn set_now(&self, ns: u64) {
        self.now.set(ns);
    }

    pub(crate) fn set_server_trace(&self, tp: Option<TpInfoPid>) {
        self.server_trace.set(tp);
    }

    pub(crate) fn add_sock(&self, sock: u64, src: &str, dst: &str) {
        self.socks.borrow_mut().insert(sock, conn(src, dst));
    }

    pub(crate) fn add_mem(&self, ptr: u64, data: &[u8]) {
        self.mem.borrow_mut().insert(ptr, data.to_vec());
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_packet(
        &self,
        skb: u64,
        src: &str,
        dst: &str,
        seq: u32,
        flags: u8,
        payload: &[u8],
        cookie: u64,
    ) {
        let mut bytes = vec![0u8; TCP_HDR_LEN as usize];
        bytes.extend_from_slice(payload);

        let info = SkbInfo {
            tcp: ProtocolInfo {
                hdr_len: TCP_HDR_LEN,
                seq,
                flags,
            },
            conn: conn(src, dst),
            len: bytes.len() as u32,
        };

        self.packets
            .borrow_mut()
            .insert(skb, Packet { info, bytes, cookie });
    }

    pub(crate) fn set_trace(&self, conn: &ConnectionInfo, tp: TpInfoPid) {
        self.traces.borrow_mut().insert(*conn, tp);
    }

    pub(crate) fn trace(&self, conn: &ConnectionInfo) -> Option<TpInfoPid> {
        self.traces.borrow().get(conn).copied()
    }

    pub(crate) fn classified(&self) -> usize {
        self.classified.get()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// buffers handed over to the span building stage
    pub(crate) fn forwards(&self) -> Vec<Vec<u8>> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Forward { buf, .. } => Some(buf.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, c: Call) {
        self.calls.borrow_mut().push(c);
    }
}

fn copy_into(src: &[u8], offset: usize, dst: &mut [u8]) -> usize {
    let Some(src) = src.get(offset..) else {
        return 0;
    };
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

impl Helpers for MockHelpers {
    fn current_pid_tgid(&self) -> u64 {
        self.id.get()
    }

    fn ktime_get_ns(&self) -> u64 {
        self.now.get()
    }

    fn task_tid(&self) -> PidKey {
        self.task.get()
    }

    fn parse_sock_info(&self, sock: u64) -> Option<ConnectionInfo> {
        self.socks.borrow().get(&sock).copied()
    }

    fn read_msghdr_buf(&self, msg: u64, buf: &mut [u8]) -> usize {
        self.mem
            .borrow()
            .get(&msg)
            .map(|m| copy_into(m, 0, buf))
            .unwrap_or_default()
    }

    fn read_user_buf(&self, ptr: u64, buf: &mut [u8]) -> usize {
        self.read_msghdr_buf(ptr, buf)
    }

    fn read_sk_buff(&self, skb: u64) -> Option<SkbInfo> {
        self.packets.borrow().get(&skb).map(|p| p.info)
    }

    fn skb_load_bytes(&self, skb: u64, offset: u32, buf: &mut [u8]) -> usize {
        self.packets
            .borrow()
            .get(&skb)
            .map(|p| copy_into(&p.bytes, offset as usize, buf))
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
        self.classified.set(self.classified.get() + 1);
        if buf.starts_with(b"HTTP/") {
            return PacketType::Response;
        }
        for method in ["GET ", "POST ", "PUT ", "DELETE ", "HEAD "] {
            if buf.starts_with(method.as_bytes()) {
                return PacketType::Request;
            }
        }
        PacketType::Unknown
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
        self.record(Call::Forward {
            p_conn: *p_conn,
            buf: buf.to_vec(),
            ssl,
            direction,
            orig_dport,
            parent: parent.copied(),
        });
        self.server_trace.take()
    }

    fn handle_fallback_request(&self, conn: &ConnectionInfo, buf: &[u8], full_len: u32) {
        self.record(Call::Fallback {
            conn: *conn,
            buf: buf.to_vec(),
            full_len,
        });
    }

    fn trace_info_for_connection(&self, conn: &ConnectionInfo) -> Option<TpInfoPid> {
        self.trace(conn)
    }

    fn set_trace_info_for_connection(&self, conn: &ConnectionInfo, tp: &TpInfoPid) {
        self.set_trace(conn, *tp);
    }

    fn update_http_sent_len(&self, p_conn: &PidConnectionInfo, sent_len: i32) {
        self.record(Call::SentLen(*p_conn, sent_len));
    }

    fn finish_possible_delayed_http_request(&self, p_conn: &PidConnectionInfo) {
        self.record(Call::Finish(*p_conn));
    }

    fn finish_possible_delayed_tls_http_request(&self, p_conn: &PidConnectionInfo, ssl: u64) {
        self.record(Call::FinishTls(*p_conn, ssl));
    }

    fn delete_ongoing_request(&self, p_conn: &PidConnectionInfo) {
        self.record(Call::DeleteOngoing(*p_conn));
    }
}
