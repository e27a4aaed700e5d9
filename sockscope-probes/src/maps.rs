use core::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use log::debug;
use lru_st::collections::LruHashMap;
use sockscope_common::{
    config::ProbeConfig,
    errors::MapError,
    http::{RecvArgs, SendArgs, SockArgs, SslArgs},
    net::{ConnectionInfo, PartialConnectionInfo, PidConnectionInfo, SslPidConnectionInfo},
    pid::{PidKey, TraceKey},
    trace::TpInfoPid,
};

/// Bounded map with least recently used eviction. Every operation takes
/// the map lock for the duration of a single key access, there is no way
/// to hold it across operations.
pub struct LruMap<K, V> {
    name: &'static str,
    max_entries: usize,
    inner: Mutex<LruHashMap<K, V>>,
}

impl<K, V> LruMap<K, V>
where
    K: Hash + Eq + Copy + core::fmt::Debug,
    V: Copy,
{
    pub fn with_max_entries(name: &'static str, max_entries: usize) -> Self {
        Self {
            name,
            max_entries,
            inner: Mutex::new(LruHashMap::with_max_entries(max_entries)),
        }
    }

    #[inline(always)]
    fn lock(&self) -> Result<MutexGuard<'_, LruHashMap<K, V>>, MapError> {
        self.inner.lock().map_err(|_| MapError::Poisoned)
    }

    #[inline(always)]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline(always)]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Copy of the value stored at `k`, marks the entry as recently used
    #[inline]
    pub fn get(&self, k: &K) -> Option<V> {
        let mut map = self.lock().ok()?;
        map.get(k).copied()
    }

    /// Inserts or overwrites `k`. When the map is full and `k` is new the
    /// least recently used entry goes away. A map sized to zero entries
    /// cannot hold anything.
    #[inline]
    pub fn insert(&self, k: K, v: V) -> Result<(), MapError> {
        if self.max_entries == 0 {
            return Err(MapError::InsertFailure);
        }

        let mut map = self.lock()?;
        if map.len() >= self.max_entries && !map.contains_key(&k) {
            debug!("{}: full, evicting lru entry to make room for {:?}", self.name, k);
        }
        map.insert(k, v);
        Ok(())
    }

    #[inline]
    pub fn remove(&self, k: &K) -> Option<V> {
        let mut map = self.lock().ok()?;
        map.remove(k)
    }

    #[inline]
    pub fn contains_key(&self, k: &K) -> bool {
        self.lock()
            .map(|mut map| map.contains_key(k))
            .unwrap_or(false)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lock().map(|map| map.len()).unwrap_or_default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lookup path of the send bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendKey {
    // pid_tgid of the sending thread
    Thread(u64),
    // address of the kernel sock
    Sock(u64),
}

/// Outstanding sends, reachable both from the thread that issued them and
/// from the socket they were issued on. A response may be flushed by a
/// different thread than the one that started it, hence the second path.
pub struct SendTable {
    inner: LruMap<SendKey, SendArgs>,
}

impl SendTable {
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            // each send occupies one slot per index
            inner: LruMap::with_max_entries("active_send_args", max_entries.saturating_mul(2)),
        }
    }

    #[inline]
    pub fn record(&self, id: u64, sock: u64, args: SendArgs) -> Result<(), MapError> {
        self.inner.insert(SendKey::Thread(id), args)?;
        self.inner.insert(SendKey::Sock(sock), args)
    }

    #[inline]
    pub fn by_thread(&self, id: u64) -> Option<SendArgs> {
        self.inner.get(&SendKey::Thread(id))
    }

    #[inline]
    pub fn by_sock(&self, sock: u64) -> Option<SendArgs> {
        self.inner.get(&SendKey::Sock(sock))
    }

    #[inline]
    pub fn forget_thread(&self, id: u64) -> Option<SendArgs> {
        self.inner.remove(&SendKey::Thread(id))
    }

    #[inline]
    pub fn forget_sock(&self, sock: u64) -> Option<SendArgs> {
        self.inner.remove(&SendKey::Sock(sock))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// State shared by all the probe handlers
pub struct Maps {
    // pid_tgid -> socket allocated before accept returns
    pub active_accept_args: LruMap<u64, SockArgs>,
    // pid_tgid -> sock passed to tcp_connect
    pub active_connect_args: LruMap<u64, SockArgs>,
    pub active_recv_args: LruMap<u64, RecvArgs>,
    pub send_args: SendTable,
    // last connection accepted/connected by a thread
    pub pid_tid_to_conn: LruMap<u64, SslPidConnectionInfo>,
    // TLS handle -> connection it is running over
    pub ssl_to_conn: LruMap<u64, SslPidConnectionInfo>,
    // connections known to carry TLS -> TLS handle
    pub active_ssl_connections: LruMap<PidConnectionInfo, u64>,
    // pid_tgid -> TLS handle
    pub active_ssl_handshakes: LruMap<u64, u64>,
    pub active_ssl_read_args: LruMap<u64, SslArgs>,
    pub active_ssl_write_args: LruMap<u64, SslArgs>,
    pub tcp_connection_map: LruMap<PartialConnectionInfo, ConnectionInfo>,
    // child thread -> parent thread
    pub clone_map: LruMap<PidKey, PidKey>,
    pub server_traces: LruMap<TraceKey, TpInfoPid>,
}

impl Maps {
    pub fn new(config: &ProbeConfig) -> Self {
        let max = config.max_concurrent_requests;
        Self {
            active_accept_args: LruMap::with_max_entries("active_accept_args", max),
            active_connect_args: LruMap::with_max_entries("active_connect_args", max),
            active_recv_args: LruMap::with_max_entries("active_recv_args", max),
            send_args: SendTable::with_max_entries(max),
            pid_tid_to_conn: LruMap::with_max_entries("pid_tid_to_conn", max),
            ssl_to_conn: LruMap::with_max_entries("ssl_to_conn", max),
            active_ssl_connections: LruMap::with_max_entries("active_ssl_connections", max),
            active_ssl_handshakes: LruMap::with_max_entries("active_ssl_handshakes", max),
            active_ssl_read_args: LruMap::with_max_entries("active_ssl_read_args", max),
            active_ssl_write_args: LruMap::with_max_entries("active_ssl_write_args", max),
            tcp_connection_map: LruMap::with_max_entries(
                "tcp_connection_map",
                config.max_partial_connections,
            ),
            clone_map: LruMap::with_max_entries("clone_map", max),
            server_traces: LruMap::with_max_entries("server_traces", max),
        }
    }
}
