use super::*;

impl<H: Helpers> Probes<H> {
    pub fn kprobe_tcp_close(&self, sk: u64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) {
            return error::BPF_PROG_SUCCESS;
        }

        debug!("=== kprobe tcp_close {id:x} sock={sk:x} ===");

        self.ensure_sent_event(id, sk);

        if let Some((p_conn, _)) = self.connection_of(id, sk) {
            self.helpers.delete_ongoing_request(&p_conn);
        }

        ignore_result!(self.maps.send_args.forget_thread(id));
        ignore_result!(self.maps.send_args.forget_sock(sk));

        error::BPF_PROG_SUCCESS
    }
}
