use super::*;
use sockscope_common::pid::PidKey;

impl<H: Helpers> Probes<H> {
    /// Return of clone in the parent. Container runtimes give the parent
    /// the namespaced tid of its child, so the hierarchy is kept with
    /// namespaced ids only.
    pub fn kretprobe_sys_clone(&self, tid: i64) -> u32 {
        let id = self.helpers.current_pid_tgid();
        if !self.valid_pid(id) || tid < 0 {
            return error::BPF_PROG_SUCCESS;
        }

        let parent = self.helpers.task_tid();
        let child = PidKey::new(tid as u32, parent.ns);

        debug!("sys_clone_ret {id:x} -> {tid}");

        prog_rc(
            "sys_clone",
            self.maps
                .clone_map
                .insert(child, parent)
                .map_err(ProbeError::from),
        )
    }
}

#[cfg(test)]
mod test {
    use super::super::mock::*;
    use super::*;

    #[test]
    fn test_clone_records_namespaced_parent() {
        let p = probes();
        let h = p.helpers();
        h.set_thread(4242, 4242);
        // namespaced view of the task
        h.set_task(PidKey::new(1, NS));

        p.kretprobe_sys_clone(7);
        assert_eq!(
            p.maps().clone_map.get(&PidKey::new(7, NS)),
            Some(PidKey::new(1, NS))
        );

        // clone failure
        p.kretprobe_sys_clone(-1);
        assert_eq!(p.maps().clone_map.len(), 1);
    }
}
