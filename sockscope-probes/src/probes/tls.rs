use super::*;
use sockscope_common::http::SslArgs;

// SSL_read_ex/SSL_write_ex report the processed length through a size_t
const EX_LEN_SIZE: usize = core::mem::size_of::<u64>();

impl<H: Helpers> Probes<H> {
    pub fn uprobe_ssl_do_handshake(&self, ssl: u64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== uprobe SSL_do_handshake={id:x} ssl={ssl:x} ===");

        prog_rc("SSL_do_handshake", self.try_enter_ssl_do_handshake(id, ssl))
    }

    #[inline(always)]
    fn try_enter_ssl_do_handshake(&self, id: u64, ssl: u64) -> ProbeResult<()> {
        if ssl == 0 {
            return Err(ProbeError::NullSslHandle);
        }
        self.maps.active_ssl_handshakes.insert(id, ssl)?;
        Ok(())
    }

    /// Return of SSL_do_handshake. The handshake runs right after accept or
    /// connect on the same thread, which is how a TLS session gets tied to
    /// its socket.
    pub fn uretprobe_ssl_do_handshake(&self) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        let Some(ssl) = self.maps.active_ssl_handshakes.remove(&id) else {
            return error::BPF_PROG_SUCCESS;
        };

        debug!("=== uretprobe SSL_do_handshake={id:x} ssl={ssl:x} ===");

        prog_rc("SSL_do_handshake", self.try_exit_ssl_do_handshake(id, ssl))
    }

    #[inline(always)]
    fn try_exit_ssl_do_handshake(&self, id: u64, ssl: u64) -> ProbeResult<()> {
        if let Some(info) = self.maps.pid_tid_to_conn.get(&id) {
            self.maps.ssl_to_conn.insert(ssl, info)?;
        }
        Ok(())
    }

    pub fn uprobe_ssl_read(&self, ssl: u64, buf: u64) -> u32 {
        self.enter_ssl_rw("SSL_read", Direction::Recv, ssl, buf, 0)
    }

    pub fn uprobe_ssl_read_ex(&self, ssl: u64, buf: u64, readbytes: u64) -> u32 {
        self.enter_ssl_rw("SSL_read_ex", Direction::Recv, ssl, buf, readbytes)
    }

    pub fn uprobe_ssl_write(&self, ssl: u64, buf: u64) -> u32 {
        self.enter_ssl_rw("SSL_write", Direction::Send, ssl, buf, 0)
    }

    pub fn uprobe_ssl_write_ex(&self, ssl: u64, buf: u64, written: u64) -> u32 {
        self.enter_ssl_rw("SSL_write_ex", Direction::Send, ssl, buf, written)
    }

    /// Return of SSL_read, `ret` is the number of plaintext bytes read
    pub fn uretprobe_ssl_read(&self, ret: i32) -> u32 {
        self.exit_ssl_rw("SSL_read", Direction::Recv, |_| {
            (ret > 0).then_some(ret as usize)
        })
    }

    /// Return of SSL_read_ex, 1 on success with the length stored at the
    /// address given on entry
    pub fn uretprobe_ssl_read_ex(&self, ret: i32) -> u32 {
        self.exit_ssl_rw("SSL_read_ex", Direction::Recv, |args| {
            self.ex_len(ret, args)
        })
    }

    pub fn uretprobe_ssl_write(&self, ret: i32) -> u32 {
        self.exit_ssl_rw("SSL_write", Direction::Send, |_| {
            (ret > 0).then_some(ret as usize)
        })
    }

    pub fn uretprobe_ssl_write_ex(&self, ret: i32) -> u32 {
        self.exit_ssl_rw("SSL_write_ex", Direction::Send, |args| {
            self.ex_len(ret, args)
        })
    }

    /// SSL_shutdown: the session is over, whatever request was running on
    /// it is finished and the association dropped.
    pub fn uprobe_ssl_shutdown(&self, ssl: u64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== uprobe SSL_shutdown={id:x} ssl={ssl:x} ===");

        prog_rc("SSL_shutdown", self.try_ssl_shutdown(ssl))
    }

    #[inline(always)]
    fn try_ssl_shutdown(&self, ssl: u64) -> ProbeResult<()> {
        if ssl == 0 {
            return Err(ProbeError::NullSslHandle);
        }

        if let Some(info) = self.maps.ssl_to_conn.remove(&ssl) {
            self.helpers
                .finish_possible_delayed_tls_http_request(&info.p_conn, ssl);
            ignore_result!(self.maps.active_ssl_connections.remove(&info.p_conn));
        }

        Ok(())
    }

    #[inline(always)]
    fn ssl_args_map(&self, direction: Direction) -> &crate::maps::LruMap<u64, SslArgs> {
        match direction {
            Direction::Recv => &self.maps.active_ssl_read_args,
            Direction::Send => &self.maps.active_ssl_write_args,
        }
    }

    #[inline(always)]
    fn enter_ssl_rw(&self, name: &str, direction: Direction, ssl: u64, buf: u64, len_ptr: u64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== uprobe {name}={id:x} ssl={ssl:x} ===");

        let res = if ssl == 0 {
            Err(ProbeError::NullSslHandle)
        } else {
            self.ssl_args_map(direction)
                .insert(id, SslArgs { ssl, buf, len_ptr })
                .map_err(ProbeError::from)
        };

        prog_rc(name, res)
    }

    #[inline(always)]
    fn exit_ssl_rw<F>(&self, name: &str, direction: Direction, len: F) -> u32
    where
        F: FnOnce(&SslArgs) -> Option<usize>,
    {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        let Some(args) = self.ssl_args_map(direction).remove(&id) else {
            return error::BPF_PROG_SUCCESS;
        };

        let Some(len) = len(&args).filter(|&l| l > 0) else {
            return error::BPF_PROG_SUCCESS;
        };

        debug!("=== uretprobe {name}={id:x} ssl={:x} len={len} ===", args.ssl);

        prog_rc(name, self.handle_ssl_buf(id, &args, len, direction))
    }

    #[inline(always)]
    fn ex_len(&self, ret: i32, args: &SslArgs) -> Option<usize> {
        if ret != 1 || args.len_ptr == 0 {
            return None;
        }

        let mut raw = [0u8; EX_LEN_SIZE];
        if self.helpers.read_user_buf(args.len_ptr, &mut raw) != EX_LEN_SIZE {
            return None;
        }

        Some(u64::from_ne_bytes(raw) as usize)
    }

    /// Forwards the plaintext of a TLS read/write on the connection the
    /// session runs over, falling back to the last connection the thread
    /// accepted or connected when the session has not been seen yet.
    fn handle_ssl_buf(
        &self,
        id: u64,
        args: &SslArgs,
        len: usize,
        direction: Direction,
    ) -> ProbeResult<()> {
        let info = match self.maps.ssl_to_conn.get(&args.ssl) {
            Some(info) => info,
            None => {
                let Some(info) = self.maps.pid_tid_to_conn.get(&id) else {
                    debug!("no connection info for ssl={:x}", args.ssl);
                    return Ok(());
                };
                self.maps.ssl_to_conn.insert(args.ssl, info)?;
                info
            }
        };

        // plaintext of this connection is now seen here, the tcp probes
        // must stay away from its ciphertext
        self.maps
            .active_ssl_connections
            .insert(info.p_conn, args.ssl)?;

        self.with_capture(
            len,
            |dst| self.helpers.read_user_buf(args.buf, dst),
            |buf| {
                self.handle_buf(
                    &info.p_conn,
                    buf,
                    TlsFlag::WithSsl,
                    direction,
                    info.orig_dport,
                )
            },
        );

        Ok(())
    }
}
