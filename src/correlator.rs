use crate::backends::process::{ProcessSource, SourceError};
use crate::config::Config;
use crate::parser::{self, ParseError};
use crate::tunnel::{Connection, Tunnel, TunnelKind, TunnelTable};

/// Correlates SSH processes with their forwarding specs and open sockets
/// into the current tunnel table.
pub struct Correlator {
    source: Box<dyn ProcessSource>,
    table: TunnelTable,
    ssh_name: String,
    supervisor_name: String,
}

impl Correlator {
    pub fn new(source: Box<dyn ProcessSource>, config: &Config) -> Self {
        log::debug!("using process source: {}", source.name());
        Self {
            source,
            table: TunnelTable::new(),
            ssh_name: config.ssh_name.clone(),
            supervisor_name: config.supervisor_name.clone(),
        }
    }

    /// The table built by the last successful `update()`.
    pub fn table(&self) -> &TunnelTable {
        &self.table
    }

    /// Rebuild the tunnel table from a fresh OS snapshot.
    ///
    /// Per-candidate failures (no forwarding flag, malformed spec, process
    /// exit races) degrade that candidate only. A failure to enumerate
    /// processes or sockets at all aborts the scan and leaves the previous
    /// table in place; stale-but-valid beats empty.
    pub fn update(&mut self) -> Result<(), SourceError> {
        let processes = self.source.list_processes()?;
        let mut sockets = self.source.socket_table()?;

        let mut next = TunnelTable::new();

        for process in processes.iter().filter(|p| p.name == self.ssh_name) {
            let spec = match parser::parse_forwarding(&process.cmdline) {
                Ok(spec) => spec,
                // Not a forwarding tunnel (interactive shell, scp transport).
                Err(ParseError::NotATunnel) => continue,
                Err(err) => {
                    log::warn!("pid {}: {}; excluded from this scan", process.pid, err);
                    continue;
                }
            };

            // An ssh child of the supervisor is keyed by the supervisor pid,
            // which stays stable across restarts of the ssh process.
            let kind = match self.source.process_name(process.ppid) {
                Ok(name) if name == self.supervisor_name => TunnelKind::Auto {
                    supervisor_pid: process.ppid,
                },
                Ok(_) => TunnelKind::Raw,
                Err(SourceError::ProcessVanished(pid)) => {
                    log::debug!(
                        "pid {}: parent {} vanished mid-scan, skipping",
                        process.pid,
                        pid
                    );
                    continue;
                }
                Err(err) => {
                    log::warn!(
                        "pid {}: parent inspection failed ({}); excluded from this scan",
                        process.pid,
                        err
                    );
                    continue;
                }
            };

            let connections: Vec<Connection> = sockets
                .take(process.pid)
                .into_iter()
                .map(|rec| {
                    Connection::new(
                        rec.local_address,
                        rec.local_port,
                        rec.remote,
                        rec.state,
                        rec.family,
                    )
                })
                .collect();

            next.insert(Tunnel {
                ssh_pid: process.pid,
                in_port: spec.in_port,
                via_host: spec.via_host,
                target_host: spec.target_host,
                out_port: spec.out_port,
                kind,
                connections,
            });
        }

        self.table = next;
        log::debug!("scan complete: {} tunnel(s)", self.table.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::process::{ProcessRecord, SocketRecord, SocketTable};
    use crate::tunnel::{SockFamily, SockState};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockSource {
        processes: Vec<ProcessRecord>,
        names: HashMap<i32, String>,
        sockets: HashMap<i32, Vec<SocketRecord>>,
        fail_enumeration: Arc<AtomicBool>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                processes: Vec::new(),
                names: HashMap::new(),
                sockets: HashMap::new(),
                fail_enumeration: Arc::new(AtomicBool::new(false)),
            }
        }

        fn with_process(mut self, pid: i32, ppid: i32, name: &str, cmdline: &[&str]) -> Self {
            self.processes.push(ProcessRecord {
                pid,
                ppid,
                name: name.to_string(),
                cmdline: cmdline.iter().map(|s| s.to_string()).collect(),
            });
            self.names.insert(pid, name.to_string());
            self
        }

        fn with_parent(mut self, pid: i32, name: &str) -> Self {
            self.names.insert(pid, name.to_string());
            self
        }

        fn with_socket(mut self, pid: i32, socket: SocketRecord) -> Self {
            self.sockets.entry(pid).or_default().push(socket);
            self
        }
    }

    impl ProcessSource for MockSource {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn list_processes(&self) -> Result<Vec<ProcessRecord>, SourceError> {
            if self.fail_enumeration.load(Ordering::SeqCst) {
                return Err(SourceError::Unavailable("mock enumeration failure".into()));
            }
            Ok(self.processes.clone())
        }

        fn process_name(&self, pid: i32) -> Result<String, SourceError> {
            self.names
                .get(&pid)
                .cloned()
                .ok_or(SourceError::ProcessVanished(pid))
        }

        fn socket_table(&self) -> Result<SocketTable, SourceError> {
            let mut table = SocketTable::default();
            for (pid, sockets) in &self.sockets {
                for socket in sockets {
                    table.push(*pid, socket.clone());
                }
            }
            Ok(table)
        }
    }

    const SSH_ARGS: &[&str] = &["ssh", "-L", "8080:example.com:80", "jump.example.org"];

    fn listen_socket() -> SocketRecord {
        SocketRecord {
            local_address: "127.0.0.1".to_string(),
            local_port: 8080,
            remote: None,
            state: SockState::Listen,
            family: SockFamily::Inet,
        }
    }

    fn correlator(source: MockSource) -> Correlator {
        Correlator::new(Box::new(source), &Config::default())
    }

    #[test]
    fn test_supervised_ssh_classified_auto_keyed_by_parent() {
        let source = MockSource::new()
            .with_process(100, 99, "ssh", SSH_ARGS)
            .with_parent(99, "autossh");
        let mut correlator = correlator(source);
        correlator.update().unwrap();

        assert_eq!(correlator.table().len(), 1);
        let tunnel = correlator.table().get(0).unwrap();
        assert_eq!(tunnel.key(), 99);
        assert_eq!(tunnel.kind, TunnelKind::Auto { supervisor_pid: 99 });
        assert_eq!(tunnel.ssh_pid, 100);
        assert_eq!(tunnel.in_port, 8080);
        assert_eq!(tunnel.via_host, "jump.example.org");
        assert_eq!(tunnel.target_host, "example.com");
        assert_eq!(tunnel.out_port, 80);
    }

    #[test]
    fn test_unsupervised_ssh_classified_raw_keyed_by_own_pid() {
        let source = MockSource::new()
            .with_process(100, 50, "ssh", SSH_ARGS)
            .with_parent(50, "bash");
        let mut correlator = correlator(source);
        correlator.update().unwrap();

        assert_eq!(correlator.table().len(), 1);
        let tunnel = correlator.table().get(0).unwrap();
        assert_eq!(tunnel.key(), 100);
        assert_eq!(tunnel.kind, TunnelKind::Raw);
        assert_eq!(tunnel.ssh_pid, 100);
        assert_eq!(tunnel.in_port, 8080);
    }

    #[test]
    fn test_ssh_without_forwarding_excluded() {
        let source = MockSource::new()
            .with_process(100, 50, "ssh", &["ssh", "user@jump.example.org"])
            .with_parent(50, "bash");
        let mut correlator = correlator(source);
        correlator.update().unwrap();
        assert!(correlator.table().is_empty());
    }

    #[test]
    fn test_malformed_spec_excluded() {
        let source = MockSource::new()
            .with_process(
                100,
                50,
                "ssh",
                &["ssh", "-L", "8080:a:80", "-L", "9090:b:90", "jump"],
            )
            .with_parent(50, "bash");
        let mut correlator = correlator(source);
        correlator.update().unwrap();
        assert!(correlator.table().is_empty());
    }

    #[test]
    fn test_non_ssh_processes_ignored() {
        let source = MockSource::new().with_process(200, 1, "nginx", &["nginx", "-g", "daemon"]);
        let mut correlator = correlator(source);
        correlator.update().unwrap();
        assert!(correlator.table().is_empty());
    }

    #[test]
    fn test_listening_socket_attached_without_remote_endpoint() {
        let source = MockSource::new()
            .with_process(100, 50, "ssh", SSH_ARGS)
            .with_parent(50, "bash")
            .with_socket(100, listen_socket());
        let mut correlator = correlator(source);
        correlator.update().unwrap();

        let tunnel = correlator.table().get(0).unwrap();
        assert_eq!(tunnel.connections.len(), 1);
        let conn = &tunnel.connections[0];
        assert!(conn.foreign_address().is_none());
        assert!(conn.out_port().is_none());
        assert_eq!(conn.status, SockState::Listen);
    }

    #[test]
    fn test_sockets_kept_in_discovery_order() {
        let established = SocketRecord {
            local_address: "127.0.0.1".to_string(),
            local_port: 8080,
            remote: Some(("10.0.0.2".to_string(), 443)),
            state: SockState::Established,
            family: SockFamily::Inet,
        };
        let source = MockSource::new()
            .with_process(100, 50, "ssh", SSH_ARGS)
            .with_parent(50, "bash")
            .with_socket(100, listen_socket())
            .with_socket(100, established);
        let mut correlator = correlator(source);
        correlator.update().unwrap();

        let tunnel = correlator.table().get(0).unwrap();
        assert_eq!(tunnel.connections.len(), 2);
        assert_eq!(tunnel.connections[0].status, SockState::Listen);
        assert_eq!(tunnel.connections[1].status, SockState::Established);
    }

    #[test]
    fn test_update_is_idempotent_against_unchanged_state() {
        let source = MockSource::new()
            .with_process(100, 99, "ssh", SSH_ARGS)
            .with_parent(99, "autossh")
            .with_socket(100, listen_socket());
        let mut correlator = correlator(source);

        correlator.update().unwrap();
        let first = correlator.table().clone();
        correlator.update().unwrap();
        assert_eq!(&first, correlator.table());
    }

    #[test]
    fn test_enumeration_failure_keeps_previous_table() {
        let source = MockSource::new()
            .with_process(100, 50, "ssh", SSH_ARGS)
            .with_parent(50, "bash");
        let fail = source.fail_enumeration.clone();
        let mut correlator = correlator(source);

        correlator.update().unwrap();
        assert_eq!(correlator.table().len(), 1);

        fail.store(true, Ordering::SeqCst);
        assert!(correlator.update().is_err());
        assert_eq!(correlator.table().len(), 1);
    }

    #[test]
    fn test_vanished_parent_skips_candidate() {
        // ppid 99 is not answerable at inspection time.
        let source = MockSource::new().with_process(100, 99, "ssh", SSH_ARGS);
        let mut correlator = correlator(source);
        correlator.update().unwrap();
        assert!(correlator.table().is_empty());
    }
}
