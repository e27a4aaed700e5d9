use sockscope_common::{
    http::{Direction, PacketType, TlsFlag},
    net::{ConnectionInfo, PidConnectionInfo},
    pid::PidKey,
    tcp::SkbInfo,
    trace::TpInfoPid,
};

/// Everything the probe handlers need from the outside world: reading
/// task, socket and packet state, and handing captured data over to the
/// span building stage.
///
/// Readers never fail loudly, they return `None` or a zero length when the
/// data cannot be obtained and the calling handler drops the event.
pub trait Helpers {
    /// pid (high 32 bits) and thread id (low 32 bits) of the current task
    fn current_pid_tgid(&self) -> u64;

    /// monotonic clock in nanoseconds
    fn ktime_get_ns(&self) -> u64;

    /// Namespaced thread id of the current task and its pid namespace
    fn task_tid(&self) -> PidKey;

    /// 4-tuple of a kernel socket, from the socket point of view (local
    /// endpoint as source). Works with both `struct socket` and
    /// `struct sock` addresses.
    fn parse_sock_info(&self, sock: u64) -> Option<ConnectionInfo>;

    /// Copies the head of the data described by a message header into
    /// `buf`, returns the number of bytes copied.
    fn read_msghdr_buf(&self, msg: u64, buf: &mut [u8]) -> usize;

    /// Copies user memory at `ptr` into `buf`, returns the number of bytes
    /// copied.
    fn read_user_buf(&self, ptr: u64, buf: &mut [u8]) -> usize;

    /// TCP header information and 4-tuple of a packet
    fn read_sk_buff(&self, skb: u64) -> Option<SkbInfo>;

    /// Copies packet bytes starting at `offset`, returns the number of
    /// bytes copied.
    fn skb_load_bytes(&self, skb: u64, offset: u32, buf: &mut [u8]) -> usize;

    /// Cookie of the socket owning the packet, 0 when the packet is not
    /// attributable to a local socket
    fn socket_cookie(&self, skb: u64) -> u64;

    /// Classifies the first bytes of a buffer
    fn is_http(&self, buf: &[u8]) -> PacketType;

    /// Hands a captured buffer to the span building stage. `parent` is the
    /// server trace the current thread (or one of its ancestors) is
    /// serving, if any. Returns the trace context when the buffer started
    /// a new server request on this thread.
    #[allow(clippy::too_many_arguments)]
    fn handle_buf_with_connection(
        &self,
        p_conn: &PidConnectionInfo,
        buf: &[u8],
        ssl: TlsFlag,
        direction: Direction,
        orig_dport: u16,
        parent: Option<&TpInfoPid>,
    ) -> Option<TpInfoPid>;

    /// Request seen only by the packet filter. `full_len` is the payload
    /// length of the packet, `buf` a capped copy of it.
    fn handle_fallback_request(&self, conn: &ConnectionInfo, buf: &[u8], full_len: u32);

    fn trace_info_for_connection(&self, conn: &ConnectionInfo) -> Option<TpInfoPid>;

    fn set_trace_info_for_connection(&self, conn: &ConnectionInfo, tp: &TpInfoPid);

    fn update_http_sent_len(&self, p_conn: &PidConnectionInfo, sent_len: i32);

    /// Completes the request pending on the connection, if any. Must be a
    /// no-op when nothing is pending.
    fn finish_possible_delayed_http_request(&self, p_conn: &PidConnectionInfo);

    fn finish_possible_delayed_tls_http_request(&self, p_conn: &PidConnectionInfo, ssl: u64);

    /// Drops the outstanding request marker of a connection
    fn delete_ongoing_request(&self, p_conn: &PidConnectionInfo);
}
