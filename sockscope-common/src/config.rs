use std::process;

use crate::consts::{
    FULL_BUF_SIZE, IOVEC_BUF_SIZE, MAX_CONCURRENT_REQUESTS, MAX_PARTIAL_CONNECTIONS,
};

/// Process that loaded the probes, never traced
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Loader {
    pub tgid: u32,
}

impl Loader {
    pub fn from_own_pid() -> Self {
        Loader { tgid: process::id() }
    }
}

/// Sizing of the probe side maps and capture buffers. There is no user
/// facing way to change it, the loader builds it once from constants.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub loader: Loader,
    pub max_concurrent_requests: usize,
    pub max_partial_connections: usize,
    // bytes captured from a message descriptor
    pub iovec_capture: usize,
    // bytes captured from a raw packet
    pub packet_capture: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            loader: Loader::default(),
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            max_partial_connections: MAX_PARTIAL_CONNECTIONS,
            iovec_capture: IOVEC_BUF_SIZE,
            packet_capture: FULL_BUF_SIZE,
        }
    }
}

impl ProbeConfig {
    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }
}
