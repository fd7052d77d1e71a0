// Process/socket source trait for platform-specific enumeration
//
// The correlator consumes this interface and never touches the OS
// directly, so tests can run against an in-memory implementation.

use crate::tunnel::{SockFamily, SockState};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The process existed at enumeration time but is gone by inspection
    /// time. Expected race with process exit; callers skip the candidate.
    #[error("process {0} vanished during inspection")]
    ProcessVanished(i32),

    /// The OS cannot be queried at all. Fatal to the current scan; the
    /// previous tunnel table stays in place.
    #[error("cannot query the operating system: {0}")]
    Unavailable(String),
}

/// One process as seen at enumeration time.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: i32,
    pub ppid: i32,
    pub name: String,
    pub cmdline: Vec<String>,
}

/// One open socket attributed to a process.
#[derive(Debug, Clone)]
pub struct SocketRecord {
    pub local_address: String,
    pub local_port: u16,
    pub remote: Option<(String, u16)>,
    pub state: SockState,
    pub family: SockFamily,
}

/// All sockets of one snapshot, keyed by owning pid. Per-pid order is
/// discovery order.
#[derive(Debug, Clone, Default)]
pub struct SocketTable {
    by_pid: HashMap<i32, Vec<SocketRecord>>,
}

impl SocketTable {
    pub fn push(&mut self, pid: i32, socket: SocketRecord) {
        self.by_pid.entry(pid).or_default().push(socket);
    }

    /// Remove and return the sockets of one pid (empty if none were seen).
    pub fn take(&mut self, pid: i32) -> Vec<SocketRecord> {
        self.by_pid.remove(&pid).unwrap_or_default()
    }
}

/// Platform-agnostic process/socket enumeration interface
pub trait ProcessSource: Send + Sync {
    /// Source name (e.g. "procfs")
    fn name(&self) -> &'static str;

    /// Enumerate all running processes. Entries that exit mid-scan are
    /// dropped; total failure is `SourceError::Unavailable`.
    fn list_processes(&self) -> Result<Vec<ProcessRecord>, SourceError>;

    /// Executable name of one pid, queried live. Distinguishes
    /// `ProcessVanished` so the race with process exit can be tolerated.
    fn process_name(&self, pid: i32) -> Result<String, SourceError>;

    /// Snapshot of all open sockets, keyed by owning pid.
    fn socket_table(&self) -> Result<SocketTable, SourceError>;
}

// Platform-specific implementations
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::ProcfsSource;

/// Factory function to create the platform's ProcessSource
pub fn create_process_source() -> Box<dyn ProcessSource> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcfsSource::new())
    }

    #[cfg(not(target_os = "linux"))]
    {
        compile_error!("Unsupported platform - only Linux is currently supported");
    }
}
