use std::net::SocketAddr;

use log::debug;
use lru_st::collections::LruHashMap;
use serde::{Deserialize, Serialize};
use sockscope_common::{
    consts::MAX_CONCURRENT_REQUESTS,
    http::{Direction, PacketType, TlsFlag},
    net::{ConnectionInfo, PidConnectionInfo},
    trace::TpInfoPid,
};

use crate::{
    sniffer,
    trace::{self, TraceStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Server,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub kind: SpanKind,
    pub pid: u32,
    // canonical endpoints, lower port first
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub orig_dport: u16,
    pub tls: bool,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
    pub request_len: u64,
    pub response_len: u64,
    pub start_ns: u64,
    pub end_ns: u64,
    pub traceparent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
}

/// Output line of the exporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    /// buffer handed over by a probe
    Capture {
        pid: u32,
        src: SocketAddr,
        dst: SocketAddr,
        direction: String,
        tls: bool,
        orig_dport: u16,
        packet_type: String,
        len: usize,
    },
    /// completed request/response pair
    Span(Span),
    /// request only seen at packet level
    FallbackRequest {
        src: SocketAddr,
        dst: SocketAddr,
        method: Option<String>,
        path: Option<String>,
        len: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        traceparent: Option<String>,
    },
    /// trace context carried over to a connection seen on another interface
    TraceLink {
        src: SocketAddr,
        dst: SocketAddr,
        traceparent: String,
    },
}

#[derive(Debug, Clone)]
struct Pending {
    kind: SpanKind,
    tls: bool,
    orig_dport: u16,
    method: Option<String>,
    path: Option<String>,
    status: Option<u16>,
    responded: bool,
    request_len: u64,
    response_len: u64,
    start_ns: u64,
    tp: TpInfoPid,
}

/// Turns captured buffers into spans. A request stays pending on its
/// connection until a response was seen and a probe asks for it to be
/// finished. Pending requests are bounded, the least recently touched
/// one is dropped first.
pub struct Exporter {
    pending: LruHashMap<PidConnectionInfo, Pending>,
    traces: TraceStore,
    records: Vec<Record>,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::with_max_pending(MAX_CONCURRENT_REQUESTS)
    }
}

impl Exporter {
    pub fn with_max_pending(cap: usize) -> Self {
        Self {
            pending: LruHashMap::with_max_entries(cap),
            traces: TraceStore::default(),
            records: vec![],
        }
    }

    #[inline]
    fn update_pending<F: FnOnce(&mut Pending)>(&mut self, p_conn: &PidConnectionInfo, f: F) {
        if let Some(mut p) = self.pending.remove(p_conn) {
            f(&mut p);
            self.pending.insert(*p_conn, p);
        }
    }

    #[inline]
    pub fn traces(&mut self) -> &mut TraceStore {
        &mut self.traces
    }

    /// Records produced since the last call
    pub fn drain(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Handles a captured buffer and returns the trace context when the
    /// buffer starts a server request
    #[allow(clippy::too_many_arguments)]
    pub fn capture(
        &mut self,
        p_conn: &PidConnectionInfo,
        buf: &[u8],
        ssl: TlsFlag,
        direction: Direction,
        orig_dport: u16,
        parent: Option<&TpInfoPid>,
        now: u64,
    ) -> Option<TpInfoPid> {
        let packet_type = sniffer::classify(buf);
        let tls = ssl == TlsFlag::WithSsl;

        self.records.push(Record::Capture {
            pid: p_conn.pid,
            src: p_conn.conn.src(),
            dst: p_conn.conn.dst(),
            direction: direction.as_str().into(),
            tls,
            orig_dport,
            packet_type: packet_type.as_str().into(),
            len: buf.len(),
        });

        match packet_type {
            PacketType::Request => {
                // a new request on a connection completes the previous one
                self.finish(p_conn, now);

                let kind = match direction {
                    Direction::Recv => SpanKind::Server,
                    Direction::Send => SpanKind::Client,
                };

                let tp = match kind {
                    SpanKind::Server => {
                        let incoming = sniffer::traceparent(buf);
                        let mut tp = trace::new_span(incoming.as_ref(), p_conn.pid, now);
                        if let Some(incoming) = incoming {
                            tp.tp.parent_id = incoming.parent_id;
                        }
                        self.traces.set(&p_conn.conn, tp);
                        tp
                    }
                    SpanKind::Client => {
                        self.traces
                            .lookup_or_create(&p_conn.conn, p_conn.pid, now, parent)
                    }
                };

                self.pending.insert(
                    *p_conn,
                    Pending {
                        kind,
                        tls,
                        orig_dport,
                        method: sniffer::method(buf).map(String::from),
                        path: sniffer::path(buf),
                        status: None,
                        responded: false,
                        request_len: buf.len() as u64,
                        response_len: 0,
                        start_ns: now,
                        tp,
                    },
                );

                (kind == SpanKind::Server).then_some(tp)
            }
            PacketType::Response => {
                self.update_pending(p_conn, |p| {
                    p.responded = true;
                    p.status = sniffer::status(buf);
                    // plaintext sends get their length from the send return
                    if direction == Direction::Recv || tls {
                        p.response_len += buf.len() as u64;
                    }
                });
                None
            }
            PacketType::Unknown => {
                self.update_pending(p_conn, |p| {
                    if p.responded && (direction == Direction::Recv || tls) {
                        p.response_len += buf.len() as u64;
                    }
                });
                None
            }
        }
    }

    pub fn update_sent_len(&mut self, p_conn: &PidConnectionInfo, sent_len: i32) {
        self.update_pending(p_conn, |p| {
            if p.responded && sent_len > 0 {
                p.response_len += sent_len as u64;
            }
        });
    }

    /// Emits the span pending on a connection if it got a response,
    /// nothing otherwise
    pub fn finish(&mut self, p_conn: &PidConnectionInfo, now: u64) {
        if !self.pending.get(p_conn).is_some_and(|p| p.responded) {
            return;
        }

        let Some(p) = self.pending.remove(p_conn) else {
            return;
        };

        // next request on a kept alive client connection is a new span
        if p.kind == SpanKind::Client {
            self.traces.remove(&p_conn.conn);
        }

        self.records.push(Record::Span(Span {
            kind: p.kind,
            pid: p_conn.pid,
            src: p_conn.conn.src(),
            dst: p_conn.conn.dst(),
            orig_dport: p.orig_dport,
            tls: p.tls,
            method: p.method,
            path: p.path,
            status: p.status,
            request_len: p.request_len,
            response_len: p.response_len,
            start_ns: p.start_ns,
            end_ns: now,
            traceparent: trace::traceparent(&p.tp.tp),
            parent_span_id: (p.tp.tp.parent_id != [0; 8]).then(|| hex::encode(p.tp.tp.parent_id)),
        }));
    }

    /// Same as [`Exporter::finish`], for requests running over a TLS session
    pub fn finish_tls(&mut self, p_conn: &PidConnectionInfo, ssl: u64, now: u64) {
        if self.pending.get(p_conn).is_some_and(|p| p.tls) {
            debug!("finishing tls request on ssl={ssl:x}");
            self.finish(p_conn, now);
        }
    }

    /// Drops the request pending on a closed connection
    pub fn delete_ongoing(&mut self, p_conn: &PidConnectionInfo) {
        if self.pending.remove(p_conn).is_some() {
            debug!("dropping unanswered request of pid={}", p_conn.pid);
        }
    }

    pub fn fallback_request(&mut self, conn: &ConnectionInfo, buf: &[u8], full_len: u32) {
        let traceparent = self.traces.get(conn).map(|tp| trace::traceparent(&tp.tp));
        self.records.push(Record::FallbackRequest {
            src: conn.src(),
            dst: conn.dst(),
            method: sniffer::method(buf).map(String::from),
            path: sniffer::path(buf),
            len: full_len,
            traceparent,
        });
    }

    pub fn link_trace(&mut self, conn: &ConnectionInfo, tp: &TpInfoPid) {
        self.traces.set(conn, *tp);
        self.records.push(Record::TraceLink {
            src: conn.src(),
            dst: conn.dst(),
            traceparent: trace::traceparent(&tp.tp),
        });
    }
}
