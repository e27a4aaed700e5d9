use super::*;
use sockscope_common::http::SendArgs;

impl<H: Helpers> Probes<H> {
    /// Entry of tcp_sendmsg. `size` is the total size of the message,
    /// the return probe tells how much of it actually went out.
    pub fn kprobe_tcp_sendmsg(&self, sk: u64, msg: u64, size: u64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== kprobe tcp_sendmsg={id:x} sock={sk:x} size {size} ===");

        prog_rc("tcp_sendmsg", self.try_enter_tcp_sendmsg(id, sk, msg, size))
    }

    #[inline(always)]
    fn try_enter_tcp_sendmsg(&self, id: u64, sk: u64, msg: u64, size: u64) -> ProbeResult<()> {
        let Some((p_conn, orig_dport)) = self.connection_of(id, sk) else {
            return Ok(());
        };

        let ssl = self.is_ssl_connection(id);

        if size > 0 && ssl.is_none() {
            if self.is_active_ssl(&p_conn) {
                debug!("tcp_sendmsg for identified SSL connection, ignoring...");
                return Ok(());
            }

            let captured = self.with_capture(
                size as usize,
                |dst| self.helpers.read_msghdr_buf(msg, dst),
                |buf| {
                    log_result_err!(
                        "tcp_sendmsg",
                        self.maps.send_args.record(id, sk, SendArgs { p_conn, size })
                    );
                    // logically last for plaintext
                    self.handle_buf(&p_conn, buf, TlsFlag::NoSsl, Direction::Send, orig_dport);
                },
            );

            if !captured {
                debug!("can't find iovec ptr in msghdr, not tracking sendmsg");
            }
            return Ok(());
        }

        let Some(ssl) = ssl else {
            return Ok(());
        };

        debug!("=== kprobe SSL tcp_sendmsg={id:x} sock={sk:x} ssl={ssl:x} ===");

        // a new write on the same TLS session means the previous request
        // over it is over
        if let Some(prev) = self.maps.ssl_to_conn.get(&ssl) {
            self.helpers
                .finish_possible_delayed_tls_http_request(&prev.p_conn, ssl);
        }

        self.maps
            .ssl_to_conn
            .insert(ssl, SslPidConnectionInfo { p_conn, orig_dport })?;

        Ok(())
    }

    /// Return of tcp_sendmsg. Large responses get sent in chunks, a short
    /// write terminates the response even when the server never closes.
    pub fn kretprobe_tcp_sendmsg(&self, sent_len: i32) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== kretprobe tcp_sendmsg={id:x} sent {sent_len} ===");

        if let Some(s_args) = self.maps.send_args.by_thread(id) {
            if sent_len > 0 {
                self.helpers.update_http_sent_len(&s_args.p_conn, sent_len);
            }

            if sent_len < MIN_HTTP_SIZE as i32 {
                self.helpers
                    .finish_possible_delayed_http_request(&s_args.p_conn);
            }
        }

        error::BPF_PROG_SUCCESS
    }
}

#[cfg(test)]
mod test {
    use super::super::mock::*;
    use super::*;

    const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";

    fn server() -> Probes<MockHelpers> {
        let p = probes();
        let h = p.helpers();
        h.set_thread(42, 43);
        h.add_sock(SOCK, "10.0.0.1:80", "10.0.0.2:5000");
        h.add_mem(MSG, RESPONSE);
        p
    }

    #[test]
    fn test_plaintext_send() {
        let p = server();
        let h = p.helpers();
        let expect = p_conn(42, "10.0.0.1:80", "10.0.0.2:5000");

        p.kprobe_tcp_sendmsg(SOCK, MSG, RESPONSE.len() as u64);

        assert_eq!(
            h.calls(),
            vec![Call::Forward {
                p_conn: expect,
                buf: RESPONSE.to_vec(),
                ssl: TlsFlag::NoSsl,
                direction: Direction::Send,
                orig_dport: 5000,
                parent: None,
            }]
        );

        let s_args = p.maps().send_args.by_thread(h.id()).unwrap();
        assert_eq!(s_args.p_conn, expect);
        assert_eq!(s_args.size, RESPONSE.len() as u64);
        assert_eq!(p.maps().send_args.by_sock(SOCK), Some(s_args));
    }

    #[test]
    fn test_send_capture_is_capped() {
        let p = server();
        let h = p.helpers();
        let big = vec![b'a'; IOVEC_BUF_SIZE * 4];
        h.add_mem(MSG + 1, &big);

        p.kprobe_tcp_sendmsg(SOCK, MSG + 1, big.len() as u64);

        let forwards = h.forwards();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].len(), IOVEC_BUF_SIZE);
        // the announced size is kept untouched
        assert_eq!(
            p.maps().send_args.by_thread(h.id()).unwrap().size,
            big.len() as u64
        );
    }

    #[test]
    fn test_empty_or_unreadable_send() {
        let p = server();
        let h = p.helpers();

        p.kprobe_tcp_sendmsg(SOCK, MSG, 0);
        // descriptor not readable
        p.kprobe_tcp_sendmsg(SOCK, 0xdead, 10);

        assert!(h.calls().is_empty());
        assert!(p.maps().send_args.is_empty());
    }

    #[test]
    fn test_send_on_known_tls_connection() {
        let p = server();
        let h = p.helpers();
        let conn = p_conn(42, "10.0.0.1:80", "10.0.0.2:5000");
        p.maps().active_ssl_connections.insert(conn, SSL).unwrap();

        p.kprobe_tcp_sendmsg(SOCK, MSG, RESPONSE.len() as u64);

        assert!(h.calls().is_empty());
        assert!(p.maps().send_args.is_empty());
        assert!(p.maps().ssl_to_conn.is_empty());
    }

    #[test]
    fn test_send_inside_tls_write() {
        let p = server();
        let h = p.helpers();
        let conn = p_conn(42, "10.0.0.1:80", "10.0.0.2:5000");
        let prev = p_conn(42, "10.0.0.1:80", "10.0.0.3:6000");

        p.maps()
            .active_ssl_write_args
            .insert(h.id(), ssl_args(SSL))
            .unwrap();
        p.maps()
            .ssl_to_conn
            .insert(
                SSL,
                SslPidConnectionInfo {
                    p_conn: prev,
                    orig_dport: 6000,
                },
            )
            .unwrap();

        p.kprobe_tcp_sendmsg(SOCK, MSG, RESPONSE.len() as u64);

        // ciphertext is never forwarded
        assert_eq!(h.calls(), vec![Call::FinishTls(prev, SSL)]);
        assert_eq!(
            p.maps().ssl_to_conn.get(&SSL),
            Some(SslPidConnectionInfo {
                p_conn: conn,
                orig_dport: 5000
            })
        );
        assert!(p.maps().send_args.is_empty());
    }

    #[test]
    fn test_short_send_return_finishes_once() {
        let p = server();
        let h = p.helpers();
        let conn = p_conn(42, "10.0.0.1:80", "10.0.0.2:5000");

        p.kprobe_tcp_sendmsg(SOCK, MSG, RESPONSE.len() as u64);
        h.clear_calls();

        p.kretprobe_tcp_sendmsg(5);
        assert_eq!(
            h.calls(),
            vec![Call::SentLen(conn, 5), Call::Finish(conn)]
        );

        h.clear_calls();
        p.kretprobe_tcp_sendmsg(-32);
        assert_eq!(h.calls(), vec![Call::Finish(conn)]);

        h.clear_calls();
        p.kretprobe_tcp_sendmsg(RESPONSE.len() as i32);
        assert_eq!(h.calls(), vec![Call::SentLen(conn, RESPONSE.len() as i32)]);
    }

    #[test]
    fn test_send_return_without_record() {
        let p = server();
        p.kretprobe_tcp_sendmsg(0);
        assert!(p.helpers().calls().is_empty());
    }
}
