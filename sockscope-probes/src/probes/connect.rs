use super::*;

impl<H: Helpers> Probes<H> {
    pub fn kprobe_tcp_connect(&self, sk: u64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== tcp connect {id:x} ===");

        let args = SockArgs {
            addr: sk,
            accept_time: self.helpers.ktime_get_ns(),
        };

        prog_rc(
            "tcp_connect",
            self.maps
                .active_connect_args
                .insert(id, args)
                .map_err(ProbeError::from),
        )
    }

    pub fn kretprobe_sys_connect(&self, ret: i64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        let rc = prog_rc("sys_connect", self.try_exit_connect(id, ret));
        ignore_result!(self.maps.active_connect_args.remove(&id));
        rc
    }

    #[inline(always)]
    fn try_exit_connect(&self, id: u64, ret: i64) -> ProbeResult<()> {
        // a non blocking connect still in progress is a connection
        if ret < 0 && ret != -EINPROGRESS {
            return Ok(());
        }

        let Some(args) = self.maps.active_connect_args.get(&id) else {
            debug!("no sock info for {id:x}");
            return Ok(());
        };

        debug!(
            "=== connect ret id={id:x} pid={} ===",
            pid_from_pid_tgid(id)
        );

        self.remember_thread_conn(id, &args)
    }

    /// Associates a thread to an already established connection, for the
    /// servers that short-circuit the accept path.
    ///
    /// Connections recorded here are assumed to be server side: the lower
    /// port of the pair is taken as the original destination port. A
    /// client whose local port is lower than the remote one is thus
    /// recorded with the wrong direction.
    pub fn kprobe_tcp_rcv_established(&self, sk: u64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== tcp_rcv_established id={id:x} ===");

        prog_rc("tcp_rcv_established", self.try_tcp_rcv_established(id, sk))
    }

    #[inline(always)]
    fn try_tcp_rcv_established(&self, id: u64, sk: u64) -> ProbeResult<()> {
        let Some((p_conn, _)) = self.connection_of(id, sk) else {
            return Ok(());
        };

        let info = SslPidConnectionInfo {
            p_conn,
            orig_dport: p_conn.conn.s_port,
        };

        self.maps.pid_tid_to_conn.insert(id, info)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::super::mock::*;
    use super::*;

    #[test]
    fn test_connect() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(42, 44);
        h.add_sock(SOCK, "10.0.0.2:41000", "10.0.0.1:8080");

        p.kprobe_tcp_connect(SOCK);
        p.kretprobe_sys_connect(0);

        let info = p.maps().pid_tid_to_conn.get(&h.id()).unwrap();
        assert_eq!(info.p_conn, p_conn(42, "10.0.0.1:8080", "10.0.0.2:41000"));
        assert_eq!(info.orig_dport, 8080);
        assert!(p.maps().active_connect_args.is_empty());
    }

    #[test]
    fn test_connect_in_progress() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(42, 44);
        h.add_sock(SOCK, "10.0.0.2:41000", "10.0.0.1:8080");

        p.kprobe_tcp_connect(SOCK);
        p.kretprobe_sys_connect(-EINPROGRESS);

        assert!(p.maps().pid_tid_to_conn.contains_key(&h.id()));
    }

    #[test]
    fn test_connect_failure() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(42, 44);
        h.add_sock(SOCK, "10.0.0.2:41000", "10.0.0.1:8080");

        p.kprobe_tcp_connect(SOCK);
        // ECONNREFUSED
        p.kretprobe_sys_connect(-111);

        assert!(p.maps().pid_tid_to_conn.is_empty());
        assert!(p.maps().active_connect_args.is_empty());
    }

    #[test]
    fn test_rcv_established_assumes_server() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(42, 45);

        // server side
        h.add_sock(SOCK, "10.0.0.1:80", "10.0.0.2:5000");
        p.kprobe_tcp_rcv_established(SOCK);
        let info = p.maps().pid_tid_to_conn.get(&h.id()).unwrap();
        assert_eq!(info.orig_dport, 80);

        // client with a local port lower than the remote one gets the
        // server direction as well
        h.add_sock(SOCK + 1, "10.0.0.2:1000", "10.0.0.1:8080");
        p.kprobe_tcp_rcv_established(SOCK + 1);
        let info = p.maps().pid_tid_to_conn.get(&h.id()).unwrap();
        assert_eq!(info.orig_dport, 1000);
    }
}
