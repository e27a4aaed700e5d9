use super::*;

impl<H: Helpers> Probes<H> {
    /// Thread exit. A thread may go away without ever closing the socket
    /// it was responding on, the pending request is finished here.
    pub fn kprobe_sys_exit(&self, status: i32) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        let task = TraceKey::new(self.helpers.task_tid());

        debug!(
            "sys_exit {id:x}, pid={} status={status}",
            pid_from_pid_tgid(id)
        );

        if let Some(s_args) = self.maps.send_args.by_thread(id) {
            debug!("checking if we need to finish the request per thread id");
            self.helpers
                .finish_possible_delayed_http_request(&s_args.p_conn);
            ignore_result!(self.maps.active_ssl_connections.remove(&s_args.p_conn));
        }

        ignore_result!(self.maps.send_args.forget_thread(id));
        ignore_result!(self.maps.clone_map.remove(&task.p_key));
        // traces keyed with an extra id (event loop runtimes) are left
        // behind, their thread is not expected to exit
        ignore_result!(self.maps.server_traces.remove(&task));

        error::BPF_PROG_SUCCESS
    }
}

#[cfg(test)]
mod test {
    use super::super::mock::*;
    use super::*;
    use sockscope_common::pid::PidKey;

    #[test]
    fn test_exit_with_outstanding_send() {
        let p = probes();
        let h = p.helpers();
        let conn = p_conn(42, "10.0.0.1:80", "10.0.0.2:5000");
        let task = PidKey::new(43, NS);
        h.set_thread(42, 43);
        h.set_task(task);
        h.add_sock(SOCK, "10.0.0.1:80", "10.0.0.2:5000");
        h.add_mem(MSG, b"HTTP/1.1 200 OK\r\n");

        p.kprobe_tcp_sendmsg(SOCK, MSG, 17);
        p.maps().active_ssl_connections.insert(conn, SSL).unwrap();
        p.maps()
            .clone_map
            .insert(task, PidKey::new(1, NS))
            .unwrap();
        p.maps()
            .server_traces
            .insert(TraceKey::new(task), trace_at(3, 0))
            .unwrap();
        h.clear_calls();

        p.kprobe_sys_exit(0);

        assert_eq!(h.calls(), vec![Call::Finish(conn)]);
        assert!(p.maps().send_args.by_thread(h.id()).is_none());
        assert!(p.maps().active_ssl_connections.is_empty());
        assert!(p.maps().clone_map.is_empty());
        assert!(p.maps().server_traces.is_empty());
    }

    #[test]
    fn test_exit_without_send() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(42, 43);
        h.set_task(PidKey::new(43, NS));
        p.maps()
            .clone_map
            .insert(PidKey::new(43, NS), PidKey::new(1, NS))
            .unwrap();
        // another namespace, same tid
        p.maps()
            .clone_map
            .insert(PidKey::new(43, NS + 1), PidKey::new(1, NS + 1))
            .unwrap();

        p.kprobe_sys_exit(0);

        assert!(h.calls().is_empty());
        assert_eq!(p.maps().clone_map.len(), 1);
        assert!(p.maps().clone_map.contains_key(&PidKey::new(43, NS + 1)));
    }
}
