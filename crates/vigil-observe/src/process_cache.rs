use std::num::NonZeroUsize;

use lru::LruCache;

/// Resolved process identity, cached by pid.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessInfo {
    pub comm: String,
    pub cmdline: String,
    pub user: String,
    pub first_seen_ts: f64,
    pub last_seen_ts: f64,
}

/// Looks a pid up in the operating system's process table. The real
/// implementation (`ProcTableLookup`) reads `/proc`; tests substitute a
/// fake so enrichment can be exercised without a live process table.
pub trait ProcessTableLookup: Send + Sync {
    /// Returns `None` if the pid is gone or unreadable — enrichment is
    /// best-effort and must never raise.
    fn lookup(&self, pid: u32) -> Option<(String, String, String)>;
}

/// Reads `comm`, `cmdline` and the owning user from `/proc/<pid>/*` on Linux.
/// Any I/O failure (process exited, permission denied) resolves to `None`.
pub struct ProcTableLookup;

impl ProcessTableLookup for ProcTableLookup {
    fn lookup(&self, pid: u32) -> Option<(String, String, String)> {
        let comm = std::fs::read_to_string(format!("/proc/{pid}/comm"))
            .ok()?
            .trim_end()
            .to_string();
        let cmdline_raw = std::fs::read_to_string(format!("/proc/{pid}/cmdline")).ok()?;
        let cmdline = cmdline_raw.replace('\0', " ").trim().to_string();
        let user = proc_owner(pid).unwrap_or_else(|| "unknown".to_string());
        Some((comm, cmdline, user))
    }
}

fn proc_owner(pid: u32) -> Option<String> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    let uid_line = status.lines().find(|l| l.starts_with("Uid:"))?;
    let uid = uid_line.split_whitespace().nth(1)?;
    Some(uid.to_string())
}

/// LRU-bounded cache of process identity, keyed by pid. Entries older than
/// `cache_ttl` are refreshed (not just reused) on next access.
pub struct ProcessCache {
    inner: LruCache<u32, ProcessInfo>,
    ttl_secs: f64,
}

impl ProcessCache {
    pub fn new(capacity: usize, ttl_secs: f64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: LruCache::new(capacity),
            ttl_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Resolve `pid`, consulting `lookup` only when the entry is absent or
    /// has exceeded `cache_ttl`. Returns `(info, resolved)` where `resolved`
    /// is false when the process-table lookup itself failed (the entry, if
    /// any, is still returned so callers can keep using the stale identity).
    pub fn resolve(
        &mut self,
        pid: u32,
        now: f64,
        lookup: &dyn ProcessTableLookup,
    ) -> (Option<ProcessInfo>, bool) {
        let needs_refresh = match self.inner.get(&pid) {
            Some(info) => now - info.last_seen_ts > self.ttl_secs,
            None => true,
        };

        if !needs_refresh {
            let info = self.inner.get_mut(&pid).unwrap();
            info.last_seen_ts = now;
            return (Some(info.clone()), true);
        }

        match lookup.lookup(pid) {
            Some((comm, cmdline, user)) => {
                let first_seen_ts = self.inner.peek(&pid).map(|i| i.first_seen_ts).unwrap_or(now);
                let info = ProcessInfo {
                    comm,
                    cmdline,
                    user,
                    first_seen_ts,
                    last_seen_ts: now,
                };
                self.inner.put(pid, info.clone());
                (Some(info), true)
            }
            None => {
                // Lookup failed; keep whatever stale entry we had, marked unresolved.
                (self.inner.peek(&pid).cloned(), false)
            }
        }
    }
}
