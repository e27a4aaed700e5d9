use super::*;

impl<H: Helpers> Probes<H> {
    /// Return of sock_alloc. The socket is not usable until accept
    /// returns, so only its address is remembered here.
    pub fn kretprobe_sock_alloc(&self, sock: u64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== sock alloc {id:x} ===");

        let args = SockArgs {
            addr: sock,
            accept_time: self.helpers.ktime_get_ns(),
        };

        prog_rc(
            "sock_alloc",
            self.maps
                .active_accept_args
                .insert(id, args)
                .map_err(ProbeError::from),
        )
    }

    pub fn kretprobe_sys_accept4(&self, fd: i64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        let rc = prog_rc("sys_accept4", self.try_exit_accept4(id, fd));
        // pending record never outlives the syscall
        ignore_result!(self.maps.active_accept_args.remove(&id));
        rc
    }

    #[inline(always)]
    fn try_exit_accept4(&self, id: u64, fd: i64) -> ProbeResult<()> {
        // no connection was accepted
        if fd < 0 {
            return Ok(());
        }

        let Some(args) = self.maps.active_accept_args.get(&id) else {
            return Ok(());
        };

        debug!("=== accept4 ret id={id:x} sock={:x} fd={fd} ===", args.addr);

        self.remember_thread_conn(id, &args)
    }
}

#[cfg(test)]
mod test {
    use super::super::mock::*;
    use super::*;

    #[test]
    fn test_accept_records_thread_connection() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(42, 43);
        h.add_sock(SOCK, "10.0.0.2:5000", "10.0.0.1:80");

        p.kretprobe_sock_alloc(SOCK);
        assert!(p.maps().active_accept_args.contains_key(&h.id()));
        assert_eq!(p.kretprobe_sys_accept4(3), error::BPF_PROG_SUCCESS);

        let info = p.maps().pid_tid_to_conn.get(&h.id()).unwrap();
        assert_eq!(info.p_conn, p_conn(42, "10.0.0.1:80", "10.0.0.2:5000"));
        assert_eq!(info.orig_dport, 80);
        assert!(!p.maps().active_accept_args.contains_key(&h.id()));
    }

    #[test]
    fn test_failed_accept() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(42, 43);
        h.add_sock(SOCK, "10.0.0.1:80", "10.0.0.2:5000");

        p.kretprobe_sock_alloc(SOCK);
        p.kretprobe_sys_accept4(-11);

        assert!(p.maps().pid_tid_to_conn.get(&h.id()).is_none());
        assert!(p.maps().active_accept_args.is_empty());
    }

    #[test]
    fn test_accept_without_pending_record() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(42, 43);
        h.add_sock(SOCK, "10.0.0.1:80", "10.0.0.2:5000");

        p.kretprobe_sys_accept4(3);
        assert!(p.maps().pid_tid_to_conn.is_empty());
    }

    #[test]
    fn test_accept_unparsable_socket() {
        let p = probes();
        p.helpers().set_thread(42, 43);

        // socket not known to the helpers
        p.kretprobe_sock_alloc(SOCK);
        p.kretprobe_sys_accept4(3);

        assert!(p.maps().pid_tid_to_conn.is_empty());
        assert!(p.maps().active_accept_args.is_empty());
    }

    #[test]
    fn test_loader_is_ignored() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(LOADER_PID, LOADER_PID);
        h.add_sock(SOCK, "10.0.0.1:80", "10.0.0.2:5000");

        p.kretprobe_sock_alloc(SOCK);
        p.kretprobe_sys_accept4(3);

        assert!(p.maps().active_accept_args.is_empty());
        assert!(p.maps().pid_tid_to_conn.is_empty());
    }
}
