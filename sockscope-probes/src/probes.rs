use core::cmp::min;

use log::debug;
use sockscope_common::{
    buffer::Buffer,
    config::ProbeConfig,
    consts::*,
    http::{Direction, SockArgs, TlsFlag},
    net::{PidConnectionInfo, SslPidConnectionInfo},
    pid::{pid_from_pid_tgid, TraceKey},
    trace::TpInfoPid,
};

use crate::error::{self, log_result_err, prog_rc, ProbeError, ProbeResult};
use crate::helpers::Helpers;
use crate::maps::Maps;

#[cfg(test)]
pub(crate) mod mock;

mod accept;
mod clone;
mod close;
mod connect;
mod exit;
mod recv;
mod send;
mod socket_filter;
mod tls;

/// macro to track ignored results
macro_rules! ignore_result {
    ($res:expr) => {{
        let _ = $res;
    }};
}

use ignore_result;

/// The correlation engine. One method per attach point, each returning
/// [`error::BPF_PROG_SUCCESS`] or [`error::BPF_PROG_FAILURE`]. Handlers
/// only ever touch one map entry at a time and never block on each other
/// beyond a single map lock.
pub struct Probes<H: Helpers> {
    helpers: H,
    maps: Maps,
    config: ProbeConfig,
}

impl<H: Helpers> Probes<H> {
    pub fn new(helpers: H) -> Self {
        Self::with_config(helpers, ProbeConfig::default())
    }

    pub fn with_config(helpers: H, config: ProbeConfig) -> Self {
        Self {
            helpers,
            maps: Maps::new(&config),
            config,
        }
    }

    #[inline(always)]
    pub fn helpers(&self) -> &H {
        &self.helpers
    }

    #[inline(always)]
    pub fn maps(&self) -> &Maps {
        &self.maps
    }

    #[inline(always)]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Whether events of this task must be processed. Idle/kernel context
    /// and the loader itself are never traced.
    #[inline(always)]
    pub fn valid_pid(&self, id: u64) -> bool {
        let pid = pid_from_pid_tgid(id);
        pid != 0 && pid != self.config.loader.tgid
    }

    /// Canonical identity of a socket for the process behind `id`, along
    /// with the destination port the socket had before canonicalization
    #[inline(always)]
    fn connection_of(&self, id: u64, sock: u64) -> Option<(PidConnectionInfo, u16)> {
        let conn = self.helpers.parse_sock_info(sock)?;
        let orig_dport = conn.d_port;
        Some((
            PidConnectionInfo::new(conn.sorted(), pid_from_pid_tgid(id)),
            orig_dport,
        ))
    }

    /// Shared by accept and connect returns: associates the connection of
    /// a pending operation to the calling thread.
    fn remember_thread_conn(&self, id: u64, args: &SockArgs) -> ProbeResult<()> {
        let Some((p_conn, orig_dport)) = self.connection_of(id, args.addr) else {
            debug!("cannot parse sock info of {:x}", args.addr);
            return Ok(());
        };

        self.maps
            .pid_tid_to_conn
            .insert(id, SslPidConnectionInfo { p_conn, orig_dport })?;
        Ok(())
    }

    /// TLS handle of the library call the thread is currently inside of,
    /// handshake first then read then write.
    #[inline(always)]
    pub fn is_ssl_connection(&self, id: u64) -> Option<u64> {
        if let Some(ssl) = self.maps.active_ssl_handshakes.get(&id) {
            return Some(ssl);
        }

        self.maps
            .active_ssl_read_args
            .get(&id)
            .or_else(|| self.maps.active_ssl_write_args.get(&id))
            .map(|args| args.ssl)
    }

    #[inline(always)]
    pub fn is_active_ssl(&self, p_conn: &PidConnectionInfo) -> bool {
        self.maps.active_ssl_connections.contains_key(p_conn)
    }

    /// Finishes whatever send is outstanding for the thread and for the
    /// socket, the later covering a response flushed by another thread.
    fn ensure_sent_event(&self, id: u64, sock: u64) {
        if let Some(s_args) = self.maps.send_args.by_thread(id) {
            debug!("checking if we need to finish the request per thread id");
            self.helpers
                .finish_possible_delayed_http_request(&s_args.p_conn);
        }

        if let Some(s_args) = self.maps.send_args.by_sock(sock) {
            debug!("checking if we need to finish the request per socket");
            self.helpers
                .finish_possible_delayed_http_request(&s_args.p_conn);
        }
    }

    /// Server trace the current thread is working for. Threads spawned to
    /// serve a request are resolved through their ancestors, up to
    /// MAX_CLONE_DEPTH levels.
    pub fn find_parent_trace(&self) -> Option<TpInfoPid> {
        let mut t_key = TraceKey::new(self.helpers.task_tid());

        for _ in 0..=MAX_CLONE_DEPTH {
            if let Some(tp) = self.maps.server_traces.get(&t_key) {
                return Some(tp);
            }

            t_key.p_key = self.maps.clone_map.get(&t_key.p_key)?;
        }

        None
    }

    /// Remembers the server trace started by the current thread
    pub fn record_server_trace(&self, tp: &TpInfoPid) -> ProbeResult<()> {
        let t_key = TraceKey::new(self.helpers.task_tid());
        self.maps.server_traces.insert(t_key, *tp)?;
        Ok(())
    }

    /// Copies at most `len` bytes with `reader` into a capture buffer and
    /// runs `f` on the captured bytes if anything was copied.
    #[inline(always)]
    fn with_capture<R, F>(&self, len: usize, reader: R, f: F) -> bool
    where
        R: FnOnce(&mut [u8]) -> usize,
        F: FnOnce(&[u8]),
    {
        let mut buf = Buffer::<IOVEC_BUF_SIZE>::new();
        if buf.fill_with(min(len, self.config.iovec_capture), reader) == 0 {
            return false;
        }
        f(buf.as_slice());
        true
    }

    /// Hands a captured buffer over, this must be the last thing a handler
    /// does with the connection.
    fn handle_buf(
        &self,
        p_conn: &PidConnectionInfo,
        buf: &[u8],
        ssl: TlsFlag,
        direction: Direction,
        orig_dport: u16,
    ) {
        let parent = self.find_parent_trace();

        if let Some(tp) = self.helpers.handle_buf_with_connection(
            p_conn,
            buf,
            ssl,
            direction,
            orig_dport,
            parent.as_ref(),
        ) {
            log_result_err!("server trace", self.record_server_trace(&tp));
        }
    }
}
