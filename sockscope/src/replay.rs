use std::collections::HashSet;
use std::io::{self, BufRead, BufReader, Read, Write};

use log::{debug, warn};
use serde::Serialize;
use sockscope_common::{
    config::{Loader, ProbeConfig},
    errors::BPF_PROG_SUCCESS,
    net::ConnectionInfo,
};
use sockscope_probes::Probes;
use thiserror::Error;

use crate::{
    events::{self, KernelEvent, TimedEvent},
    export::Record,
    kernel::ReplayKernel,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Event(#[from] events::Error),
}

/// Counters of a replay run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub events: u64,
    pub failures: u64,
    pub skipped: u64,
    pub records: u64,
}

/// Feeds recorded kernel events to the probe handlers, in order
pub struct Replayer {
    probes: Probes<ReplayKernel>,
    // threads inside SSL_read_ex / SSL_write_ex
    ex_reads: HashSet<u64>,
    ex_writes: HashSet<u64>,
    stats: Stats,
}

impl Default for Replayer {
    fn default() -> Self {
        Self::with_config(ProbeConfig::default().with_loader(Loader::from_own_pid()))
    }
}

impl Replayer {
    pub fn with_config(config: ProbeConfig) -> Self {
        Self {
            probes: Probes::with_config(
                ReplayKernel::with_max_pending(config.max_concurrent_requests),
                config,
            ),
            ex_reads: HashSet::new(),
            ex_writes: HashSet::new(),
            stats: Stats::default(),
        }
    }

    #[inline]
    pub fn kernel(&self) -> &ReplayKernel {
        self.probes.helpers()
    }

    #[inline]
    pub fn probes(&self) -> &Probes<ReplayKernel> {
        &self.probes
    }

    #[inline]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Records produced since the last call
    pub fn drain(&mut self) -> Vec<Record> {
        let records = self.kernel().drain_records();
        self.stats.records += records.len() as u64;
        records
    }

    pub fn feed(&mut self, e: TimedEvent) -> Result<(), Error> {
        self.stats.events += 1;

        let k = self.probes.helpers();
        // the clock only moves forward
        if e.ts > 0 {
            k.set_clock(e.ts);
        }
        if let Some(task) = e.event.task() {
            k.set_task(*task);
        }

        let p = &self.probes;
        let rc = match e.event {
            KernelEvent::Socket { sock, src, dst } => {
                k.add_socket(sock, ConnectionInfo::new(src, dst));
                BPF_PROG_SUCCESS
            }
            KernelEvent::Memory { ptr, data } => {
                k.add_memory(ptr, data.to_bytes()?);
                BPF_PROG_SUCCESS
            }
            KernelEvent::Packet {
                skb,
                src,
                dst,
                seq,
                flags,
                payload,
                cookie,
            } => {
                k.add_packet(
                    skb,
                    ConnectionInfo::new(src, dst),
                    seq,
                    flags,
                    &payload.to_bytes()?,
                    cookie,
                );
                p.socket_http_filter(skb)
            }
            KernelEvent::SockAlloc { sock, .. } => p.kretprobe_sock_alloc(sock),
            KernelEvent::Accept { fd, .. } => p.kretprobe_sys_accept4(fd),
            KernelEvent::TcpConnect { sock, .. } => p.kprobe_tcp_connect(sock),
            KernelEvent::Connect { ret, .. } => p.kretprobe_sys_connect(ret),
            KernelEvent::RcvEstablished { sock, .. } => p.kprobe_tcp_rcv_established(sock),
            KernelEvent::SendMsg { sock, msg, size, .. } => p.kprobe_tcp_sendmsg(sock, msg, size),
            KernelEvent::SendMsgRet { sent, .. } => p.kretprobe_tcp_sendmsg(sent),
            KernelEvent::RecvMsg { sock, msg, .. } => p.kprobe_tcp_recvmsg(sock, msg),
            KernelEvent::RecvMsgRet { copied, .. } => p.kretprobe_tcp_recvmsg(copied),
            KernelEvent::Close { sock, .. } => p.kprobe_tcp_close(sock),
            KernelEvent::Clone { child, .. } => p.kretprobe_sys_clone(child),
            KernelEvent::Exit { status, .. } => p.kprobe_sys_exit(status),
            KernelEvent::SslHandshake { ssl, .. } => p.uprobe_ssl_do_handshake(ssl),
            KernelEvent::SslHandshakeRet { .. } => p.uretprobe_ssl_do_handshake(),
            KernelEvent::SslRead {
                task,
                ssl,
                buf,
                len_ptr,
            } => match len_ptr {
                Some(len_ptr) => {
                    self.ex_reads.insert(task.pid_tgid());
                    p.uprobe_ssl_read_ex(ssl, buf, len_ptr)
                }
                None => p.uprobe_ssl_read(ssl, buf),
            },
            KernelEvent::SslReadRet { task, ret } => {
                if self.ex_reads.remove(&task.pid_tgid()) {
                    p.uretprobe_ssl_read_ex(ret)
                } else {
                    p.uretprobe_ssl_read(ret)
                }
            }
            KernelEvent::SslWrite {
                task,
                ssl,
                buf,
                len_ptr,
            } => match len_ptr {
                Some(len_ptr) => {
                    self.ex_writes.insert(task.pid_tgid());
                    p.uprobe_ssl_write_ex(ssl, buf, len_ptr)
                }
                None => p.uprobe_ssl_write(ssl, buf),
            },
            KernelEvent::SslWriteRet { task, ret } => {
                if self.ex_writes.remove(&task.pid_tgid()) {
                    p.uretprobe_ssl_write_ex(ret)
                } else {
                    p.uretprobe_ssl_write(ret)
                }
            }
            KernelEvent::SslShutdown { ssl, .. } => p.uprobe_ssl_shutdown(ssl),
        };

        if rc != BPF_PROG_SUCCESS {
            self.stats.failures += 1;
        }

        Ok(())
    }

    /// Replays json lines events, writing every record produced as a json
    /// line into `out`. Lines that do not parse are skipped.
    pub fn replay<R: Read, W: Write>(&mut self, reader: R, mut out: W) -> Result<Stats, Error> {
        for (i, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let e: TimedEvent = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(err) => {
                    warn!("skipping line {}: {err}", i + 1);
                    self.stats.skipped += 1;
                    continue;
                }
            };

            self.feed(e)?;

            for r in self.drain() {
                serde_json::to_writer(&mut out, &r)?;
                out.write_all(b"\n")?;
            }
        }

        out.flush()?;
        debug!("replay stats: {:?}", self.stats);
        Ok(self.stats)
    }
}
