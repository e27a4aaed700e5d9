use lru_st::collections::LruHashMap;
use sockscope_common::{
    net::ConnectionInfo,
    trace::{TpInfo, TpInfoPid},
};
use uuid::Uuid;

pub const DEFAULT_MAX_TRACES: usize = 10000;

/// W3C `traceparent` header value of a trace context
pub fn traceparent(tp: &TpInfo) -> String {
    format!(
        "00-{}-{}-{:02x}",
        hex::encode(tp.trace_id),
        hex::encode(tp.span_id),
        tp.flags
    )
}

/// Fresh span. It joins the trace of `parent` when given, otherwise it
/// starts a new trace.
pub fn new_span(parent: Option<&TpInfo>, pid: u32, now: u64) -> TpInfoPid {
    let mut tp = TpInfo {
        ts: now,
        flags: 1,
        ..Default::default()
    };

    match parent {
        Some(parent) => {
            tp.trace_id = parent.trace_id;
            tp.parent_id = parent.span_id;
            tp.flags = parent.flags;
        }
        None => tp.trace_id = *Uuid::new_v4().as_bytes(),
    }

    tp.span_id.copy_from_slice(&Uuid::new_v4().as_bytes()[..8]);

    TpInfoPid { tp, pid, valid: 1 }
}

/// Trace context attached to each connection
pub struct TraceStore {
    traces: LruHashMap<ConnectionInfo, TpInfoPid>,
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_TRACES)
    }
}

impl TraceStore {
    pub fn with_max_entries(cap: usize) -> Self {
        Self {
            traces: LruHashMap::with_max_entries(cap),
        }
    }

    pub fn get(&mut self, conn: &ConnectionInfo) -> Option<TpInfoPid> {
        self.traces.get(conn).copied()
    }

    pub fn set(&mut self, conn: &ConnectionInfo, tp: TpInfoPid) {
        self.traces.insert(*conn, tp);
    }

    pub fn remove(&mut self, conn: &ConnectionInfo) -> Option<TpInfoPid> {
        self.traces.remove(conn)
    }

    /// Trace context of a connection, created as a child of `parent` if
    /// the connection has none yet
    pub fn lookup_or_create(
        &mut self,
        conn: &ConnectionInfo,
        pid: u32,
        now: u64,
        parent: Option<&TpInfoPid>,
    ) -> TpInfoPid {
        if let Some(tp) = self.get(conn) {
            return tp;
        }

        let tp = new_span(parent.map(|p| &p.tp), pid, now);
        self.set(conn, tp);
        tp
    }
}
