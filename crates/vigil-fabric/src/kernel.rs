use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vigil_config::EbpfConfig;
use vigil_types::{EventType, Value};

use crate::bus::EventBus;
use crate::error::RecordDecodeError;
use crate::record::EventRecord;

/// Fixed width of a kernel syscall record: 4 x u32 + 4 x u64 + 16 bytes comm.
pub const RECORD_LEN: usize = 64;

/// Raw fixed-layout syscall records as the kernel probe emits them. The
/// probe program and its attach/detach lifecycle are out of scope here —
/// this trait is the entire contract the reader needs from it.
pub trait RawRecordSource: Send {
    /// Drain whatever complete records are currently available; may return
    /// an empty vec if none are ready yet.
    fn poll_records(&mut self) -> Vec<[u8; RECORD_LEN]>;

    /// Cumulative count of records the kernel overwrote before user-space
    /// could read them (ring buffer wraparound). Monotonically increasing.
    fn lost_count(&self) -> u64;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodedSyscall {
    pub pid: u32,
    pub tid: u32,
    pub syscall_nr: u32,
    pub ts_enter_ns: u64,
    pub ts_exit_ns: u64,
    pub latency_ns: u64,
    pub ret: i64,
}

/// Decode one 64-byte little-endian kernel record. Returns the decoded
/// fixed fields plus the NUL-trimmed `comm` string.
pub fn decode_record(bytes: &[u8]) -> Result<(DecodedSyscall, String), RecordDecodeError> {
    if bytes.len() != RECORD_LEN {
        return Err(RecordDecodeError::WrongLength {
            expected: RECORD_LEN,
            actual: bytes.len(),
        });
    }
    let pid = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let tid = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let syscall_nr = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let ts_enter_ns = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
    let ts_exit_ns = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
    let latency_ns = u64::from_le_bytes(bytes[32..40].try_into().unwrap());
    let ret = i64::from_le_bytes(bytes[40..48].try_into().unwrap());
    let comm_raw = &bytes[48..64];
    let nul_at = comm_raw.iter().position(|&b| b == 0).unwrap_or(comm_raw.len());
    let comm = std::str::from_utf8(&comm_raw[..nul_at])
        .map_err(|_| RecordDecodeError::InvalidComm)?
        .to_string();
    Ok((
        DecodedSyscall {
            pid,
            tid,
            syscall_nr,
            ts_enter_ns,
            ts_exit_ns,
            latency_ns,
            ret,
        },
        comm,
    ))
}

/// x86_64 syscall numbers for the handful of calls common in general
/// tracing workloads. Unknown numbers fall back to `syscall_<nr>`.
const SYSCALL_TABLE: &[(u32, &str)] = &[
    (0, "read"),
    (1, "write"),
    (2, "open"),
    (3, "close"),
    (4, "stat"),
    (5, "fstat"),
    (6, "lstat"),
    (7, "poll"),
    (8, "lseek"),
    (9, "mmap"),
    (10, "mprotect"),
    (11, "munmap"),
    (12, "brk"),
    (21, "access"),
    (22, "pipe"),
    (23, "select"),
    (32, "dup"),
    (33, "dup2"),
    (39, "getpid"),
    (41, "socket"),
    (42, "connect"),
    (43, "accept"),
    (44, "sendto"),
    (45, "recvfrom"),
    (49, "bind"),
    (50, "listen"),
    (56, "clone"),
    (57, "fork"),
    (59, "execve"),
    (60, "exit"),
    (61, "wait4"),
    (62, "kill"),
    (63, "uname"),
    (79, "getcwd"),
    (80, "chdir"),
    (82, "rename"),
    (83, "mkdir"),
    (84, "rmdir"),
    (87, "unlink"),
    (89, "readlink"),
    (90, "chmod"),
    (92, "chown"),
    (96, "gettimeofday"),
    (102, "getuid"),
    (257, "openat"),
    (258, "mkdirat"),
    (262, "newfstatat"),
];

pub fn syscall_name(nr: u32) -> String {
    SYSCALL_TABLE
        .iter()
        .find(|(known, _)| *known == nr)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("syscall_{nr}"))
}

pub fn decoded_to_record(decoded: DecodedSyscall, comm: String) -> EventRecord {
    let mut payload = BTreeMap::new();
    payload.insert("syscall_nr".into(), Value::Int(decoded.syscall_nr as i64));
    payload.insert("syscall_name".into(), Value::Str(syscall_name(decoded.syscall_nr)));
    payload.insert("latency_ns".into(), Value::Int(decoded.latency_ns as i64));
    payload.insert("latency_us".into(), Value::Float(decoded.latency_ns as f64 / 1000.0));
    payload.insert("ret".into(), Value::Int(decoded.ret));
    payload.insert("ts_enter_ns".into(), Value::Int(decoded.ts_enter_ns as i64));
    payload.insert("ts_exit_ns".into(), Value::Int(decoded.ts_exit_ns as i64));

    EventRecord::new(EventType::Syscall, "ebpf::syscall_tracer", payload)
        .with_pid(decoded.pid)
        .with_comm(comm)
        .with_timestamp(decoded.ts_exit_ns as f64 / 1e9)
}

#[derive(Clone, Debug, Default)]
pub struct ReaderMetrics {
    pub records_decoded: u64,
    pub records_dropped_decode_error: u64,
    pub records_filtered_latency: u64,
    pub records_lost_kernel_side: u64,
}

pub struct KernelReaderHandle {
    task: JoinHandle<()>,
    stop: mpsc::Sender<()>,
    metrics: Arc<Mutex<ReaderMetrics>>,
}

impl KernelReaderHandle {
    pub fn metrics(&self) -> ReaderMetrics {
        self.metrics.lock().expect("reader metrics lock poisoned").clone()
    }

    pub async fn stop(self) {
        let _ = self.stop.send(()).await;
        let _ = self.task.await;
    }
}

/// Spawn the reader on its own task. Polls `source` on a fixed tick,
/// decodes and publishes each record, and applies the source-side
/// `min_latency_ns` filter before publication.
pub fn spawn<S>(mut source: S, bus: EventBus, config: EbpfConfig) -> KernelReaderHandle
where
    S: RawRecordSource + 'static,
{
    let metrics = Arc::new(Mutex::new(ReaderMetrics::default()));
    let metrics_task = metrics.clone();
    let (stop_tx, mut stop_rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(10));
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = ticker.tick() => {
                    let raw = source.poll_records();
                    {
                        let mut m = metrics_task.lock().expect("reader metrics lock poisoned");
                        m.records_lost_kernel_side = source.lost_count();
                    }
                    for bytes in raw {
                        match decode_record(&bytes) {
                            Ok((decoded, comm)) => {
                                if decoded.latency_ns < config.min_latency_ns {
                                    metrics_task.lock().expect("reader metrics lock poisoned").records_filtered_latency += 1;
                                    continue;
                                }
                                let record = decoded_to_record(decoded, comm);
                                metrics_task.lock().expect("reader metrics lock poisoned").records_decoded += 1;
                                if let Err(err) = bus.publish(record) {
                                    warn!(error = %err, "kernel reader failed to publish decoded record");
                                }
                            }
                            Err(err) => {
                                warn!(error = %err, "dropping malformed kernel record");
                                metrics_task.lock().expect("reader metrics lock poisoned").records_dropped_decode_error += 1;
                            }
                        }
                    }
                }
            }
        }
        debug!("kernel reader stopped");
    });

    KernelReaderHandle { task, stop: stop_tx, metrics }
}
