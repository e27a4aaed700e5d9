use crate::consts::NANOSECONDS_PER_IMM_EPOCH;

/// W3C trace context attached to a connection
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TpInfo {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub parent_id: [u8; 8],
    // monotonic creation time in ns
    pub ts: u64,
    pub flags: u8,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TpInfoPid {
    pub tp: TpInfo,
    pub pid: u32,
    pub valid: u8,
}

#[inline(always)]
pub const fn current_immediate_epoch(ns: u64) -> u64 {
    ns / NANOSECONDS_PER_IMM_EPOCH
}

impl TpInfoPid {
    /// Whether the context was created in the same epoch as `now_ns`
    #[inline(always)]
    pub fn same_epoch(&self, now_ns: u64) -> bool {
        current_immediate_epoch(self.tp.ts) == current_immediate_epoch(now_ns)
    }
}
