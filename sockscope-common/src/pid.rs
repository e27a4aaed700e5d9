/// Process id (tgid) half of a `bpf_get_current_pid_tgid` like value
#[inline(always)]
pub const fn pid_from_pid_tgid(id: u64) -> u32 {
    (id >> 32) as u32
}

/// Thread id half of a `bpf_get_current_pid_tgid` like value
#[inline(always)]
pub const fn tid_from_pid_tgid(id: u64) -> u32 {
    id as u32
}

#[inline(always)]
pub const fn pid_tgid(pid: u32, tid: u32) -> u64 {
    ((pid as u64) << 32) | tid as u64
}

/// Thread identity as seen from inside its pid namespace. Container
/// runtimes expose virtualized ids, so every thread keyed structure uses
/// the namespaced id plus the namespace inode.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PidKey {
    pub pid: u32,
    pub ns: u32,
}

impl PidKey {
    #[inline(always)]
    pub fn new(pid: u32, ns: u32) -> Self {
        Self { pid, ns }
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceKey {
    pub p_key: PidKey,
    // runtime specific id (event loop, goroutine ...), 0 when unused
    pub extra_id: u64,
}

impl TraceKey {
    #[inline(always)]
    pub fn new(p_key: PidKey) -> Self {
        Self { p_key, extra_id: 0 }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pid_tgid() {
        let id = pid_tgid(4242, 4250);
        assert_eq!(pid_from_pid_tgid(id), 4242);
        assert_eq!(tid_from_pid_tgid(id), 4250);
    }
}
