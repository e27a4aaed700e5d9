use super::*;
use sockscope_common::net::{ConnectionInfo, PartialConnectionInfo};

impl<H: Helpers> Probes<H> {
    /// Packet level fallback for requests the tcp_recvmsg return probe
    /// missed. Also bridges trace context between the two sides of a
    /// connection relayed onto another interface.
    pub fn socket_http_filter(&self, skb: u64) -> u32 {
        prog_rc("socket_http_filter", self.try_socket_http_filter(skb))
    }

    #[inline(always)]
    fn try_socket_http_filter(&self, skb: u64) -> ProbeResult<()> {
        let Some(info) = self.helpers.read_sk_buff(skb) else {
            return Ok(());
        };

        if info.tcp.is_ack() {
            return Ok(());
        }

        // empty packets only matter when they close the connection
        if !info.tcp.is_close() && info.is_empty() {
            return Ok(());
        }

        // only a prefix is needed to classify the payload
        let mut head = Buffer::<MIN_HTTP_SIZE>::new();
        head.fill_with(info.payload_len() as usize, |dst| {
            self.helpers.skb_load_bytes(skb, info.tcp.hdr_len, dst)
        });

        if !self.helpers.is_http(head.as_slice()).is_request() {
            return Ok(());
        }

        let conn = info.conn.sorted();
        let full_len = info.payload_len();

        let mut full = Buffer::<FULL_BUF_SIZE>::new();
        full.fill_with(
            min(full_len as usize, self.config.packet_capture),
            |dst| self.helpers.skb_load_bytes(skb, info.tcp.hdr_len, dst),
        );

        let cookie = self.helpers.socket_cookie(skb);
        self.helpers
            .handle_fallback_request(&conn, full.as_slice(), full_len);

        let partial = PartialConnectionInfo::from_packet(&conn, info.tcp.seq);

        match self.helpers.trace_info_for_connection(&conn) {
            // packet leaving a real socket, remember it for its relayed copy
            Some(_) if cookie != 0 => {
                self.maps.tcp_connection_map.insert(partial, conn)?;
            }
            // relayed copy of a packet seen on another interface
            None if cookie == 0 => self.inherit_relayed_trace(&conn, &partial),
            _ => {}
        }

        Ok(())
    }

    #[inline(always)]
    fn inherit_relayed_trace(&self, conn: &ConnectionInfo, partial: &PartialConnectionInfo) {
        let Some(prev_conn) = self.maps.tcp_connection_map.get(partial) else {
            return;
        };

        let Some(trace_info) = self.helpers.trace_info_for_connection(&prev_conn) else {
            return;
        };

        if !trace_info.same_epoch(self.helpers.ktime_get_ns()) {
            debug!("stale trace info found on another interface, ignoring");
            return;
        }

        debug!("found trace info on another interface, setting it up for this connection");
        self.helpers.set_trace_info_for_connection(conn, &trace_info);
    }
}
