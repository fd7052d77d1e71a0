// Linux process/socket source using procfs
//
// Socket attribution reads:
// - /proc/[pid]/fd/ - for socket inodes
// - /proc/net/tcp, /proc/net/tcp6 - TCP connections
// - /proc/net/udp, /proc/net/udp6 - UDP sockets

use super::{ProcessRecord, ProcessSource, SocketRecord, SocketTable, SourceError};
use crate::tunnel::{SockFamily, SockState};
use procfs::process::{FDTarget, Process, all_processes};
use std::collections::HashMap;
use std::net::SocketAddr;

pub struct ProcfsSource;

impl ProcfsSource {
    pub fn new() -> Self {
        Self
    }
}

/// Fold a procfs state label (its Debug name) into the fixed vocabulary.
fn fold_state(label: &str) -> SockState {
    match label {
        "Established" => SockState::Established,
        "Listen" => SockState::Listen,
        "SynSent" => SockState::SynSent,
        "SynRecv" => SockState::SynRecv,
        "FinWait1" => SockState::FinWait1,
        "FinWait2" => SockState::FinWait2,
        "TimeWait" => SockState::TimeWait,
        "CloseWait" => SockState::CloseWait,
        "LastAck" => SockState::LastAck,
        "Closing" => SockState::Closing,
        "Close" => SockState::Closed,
        _ => SockState::Unknown,
    }
}

fn push_socket(
    table: &mut SocketTable,
    inode_to_pid: &HashMap<u64, i32>,
    inode: u64,
    local: SocketAddr,
    remote: SocketAddr,
    state_label: &str,
    family: SockFamily,
) {
    // Sockets whose owning process we could not read stay unattributed.
    let Some(&pid) = inode_to_pid.get(&inode) else {
        return;
    };
    // A zero remote port marks a listening/unconnected socket.
    let remote = (remote.port() != 0).then(|| (remote.ip().to_string(), remote.port()));
    table.push(
        pid,
        SocketRecord {
            local_address: local.ip().to_string(),
            local_port: local.port(),
            remote,
            state: fold_state(state_label),
            family,
        },
    );
}

impl ProcessSource for ProcfsSource {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn list_processes(&self) -> Result<Vec<ProcessRecord>, SourceError> {
        let all_procs = all_processes().map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let mut entries = Vec::new();

        for proc_result in all_procs {
            let Ok(process) = proc_result else { continue };
            let pid = process.pid();
            // stat and cmdline reads race with process exit; losers are
            // dropped from the snapshot.
            let Ok(stat) = process.stat() else { continue };
            let cmdline = process.cmdline().unwrap_or_default();
            entries.push(ProcessRecord {
                pid,
                ppid: stat.ppid,
                name: stat.comm,
                cmdline,
            });
        }

        Ok(entries)
    }

    fn process_name(&self, pid: i32) -> Result<String, SourceError> {
        let process = Process::new(pid).map_err(|_| SourceError::ProcessVanished(pid))?;
        let stat = process
            .stat()
            .map_err(|_| SourceError::ProcessVanished(pid))?;
        Ok(stat.comm)
    }

    fn socket_table(&self) -> Result<SocketTable, SourceError> {
        // Build socket inode -> PID map by scanning all processes
        let all_procs = all_processes().map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let mut inode_to_pid: HashMap<u64, i32> = HashMap::new();

        for proc_result in all_procs {
            let Ok(process) = proc_result else { continue };
            let pid = process.pid();
            // fd() fails for processes we lack privileges over; their
            // sockets are simply not attributed (non-root sees tunnels
            // without connections).
            let Ok(fds) = process.fd() else { continue };
            for fd_result in fds {
                let Ok(fd_info) = fd_result else { continue };
                if let FDTarget::Socket(inode) = fd_info.target {
                    inode_to_pid.insert(inode, pid);
                }
            }
        }

        let mut table = SocketTable::default();

        // /proc/net/tcp being unreadable means the whole socket side of the
        // snapshot is gone; that is fatal to the scan.
        let tcp_entries = procfs::net::tcp().map_err(|e| SourceError::Unavailable(e.to_string()))?;
        for entry in tcp_entries {
            push_socket(
                &mut table,
                &inode_to_pid,
                entry.inode,
                entry.local_address,
                entry.remote_address,
                &format!("{:?}", entry.state),
                SockFamily::Inet,
            );
        }

        // The v6 and UDP tables can be absent on trimmed-down kernels.
        if let Ok(tcp6_entries) = procfs::net::tcp6() {
            for entry in tcp6_entries {
                push_socket(
                    &mut table,
                    &inode_to_pid,
                    entry.inode,
                    entry.local_address,
                    entry.remote_address,
                    &format!("{:?}", entry.state),
                    SockFamily::Inet6,
                );
            }
        }

        if let Ok(udp_entries) = procfs::net::udp() {
            for entry in udp_entries {
                push_socket(
                    &mut table,
                    &inode_to_pid,
                    entry.inode,
                    entry.local_address,
                    entry.remote_address,
                    &format!("{:?}", entry.state),
                    SockFamily::Inet,
                );
            }
        }

        if let Ok(udp6_entries) = procfs::net::udp6() {
            for entry in udp6_entries {
                push_socket(
                    &mut table,
                    &inode_to_pid,
                    entry.inode,
                    entry.local_address,
                    entry.remote_address,
                    &format!("{:?}", entry.state),
                    SockFamily::Inet6,
                );
            }
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_state_labels() {
        assert_eq!(fold_state("Established"), SockState::Established);
        assert_eq!(fold_state("Listen"), SockState::Listen);
        assert_eq!(fold_state("TimeWait"), SockState::TimeWait);
        // procfs calls the closed state "Close"
        assert_eq!(fold_state("Close"), SockState::Closed);
        assert_eq!(fold_state("NewSynRecv"), SockState::Unknown);
    }

    #[test]
    fn test_push_socket_splits_remote_endpoint() {
        let mut table = SocketTable::default();
        let mut inode_to_pid = HashMap::new();
        inode_to_pid.insert(7u64, 100);

        push_socket(
            &mut table,
            &inode_to_pid,
            7,
            "127.0.0.1:8080".parse().unwrap(),
            "0.0.0.0:0".parse().unwrap(),
            "Listen",
            SockFamily::Inet,
        );
        // Unknown inode: dropped, not misattributed.
        push_socket(
            &mut table,
            &inode_to_pid,
            8,
            "127.0.0.1:9090".parse().unwrap(),
            "0.0.0.0:0".parse().unwrap(),
            "Listen",
            SockFamily::Inet,
        );

        let sockets = table.take(100);
        assert_eq!(sockets.len(), 1);
        assert_eq!(sockets[0].local_port, 8080);
        assert!(sockets[0].remote.is_none());
        assert_eq!(sockets[0].state, SockState::Listen);
        assert!(table.take(100).is_empty());
    }
}
