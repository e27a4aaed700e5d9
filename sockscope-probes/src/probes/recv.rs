use super::*;
use sockscope_common::http::RecvArgs;

impl<H: Helpers> Probes<H> {
    /// Entry of tcp_recvmsg. The message header is saved right away, the
    /// kernel may alter it irreversibly while filling a large message.
    pub fn kprobe_tcp_recvmsg(&self, sk: u64, msg: u64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== tcp_recvmsg id={id:x} sock={sk:x} ===");

        // reading from a socket means we are done writing a response
        self.ensure_sent_event(id, sk);

        let args = RecvArgs {
            sock_ptr: sk,
            iovec_ptr: msg,
        };

        prog_rc(
            "tcp_recvmsg",
            self.maps
                .active_recv_args
                .insert(id, args)
                .map_err(ProbeError::from),
        )
    }

    pub fn kretprobe_tcp_recvmsg(&self, copied_len: i32) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        // consumed whatever happens next
        let Some(args) = self.maps.active_recv_args.remove(&id) else {
            return error::BPF_PROG_SUCCESS;
        };

        if copied_len <= 0 {
            return error::BPF_PROG_SUCCESS;
        }

        debug!(
            "=== tcp_recvmsg ret id={id:x} sock={:x} copied_len {copied_len} ===",
            args.sock_ptr
        );

        if args.iovec_ptr == 0 {
            debug!("iovec_ptr found in kprobe is NULL, ignoring this tcp_recvmsg");
            return error::BPF_PROG_SUCCESS;
        }

        self.exit_tcp_recvmsg(id, &args, copied_len as usize);
        error::BPF_PROG_SUCCESS
    }

    #[inline(always)]
    fn exit_tcp_recvmsg(&self, id: u64, args: &RecvArgs, copied_len: usize) {
        let Some((p_conn, orig_dport)) = self.connection_of(id, args.sock_ptr) else {
            return;
        };

        if self.is_ssl_connection(id).is_some() || self.is_active_ssl(&p_conn) {
            debug!("tcp_recvmsg for an identified SSL connection, ignoring...");
            return;
        }

        let captured = self.with_capture(
            copied_len,
            |dst| self.helpers.read_msghdr_buf(args.iovec_ptr, dst),
            // must be the last statement
            |buf| self.handle_buf(&p_conn, buf, TlsFlag::NoSsl, Direction::Recv, orig_dport),
        );

        if !captured {
            debug!("not copied anything");
        }
    }
}
