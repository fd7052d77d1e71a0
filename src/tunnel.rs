use std::fmt;

/// Socket connection states, folded into a fixed vocabulary so the UI and
/// the textual feed never depend on platform-specific spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SockState {
    Established,
    Listen,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    CloseWait,
    LastAck,
    Closing,
    Closed,
    Unknown,
}

impl SockState {
    pub fn as_str(self) -> &'static str {
        match self {
            SockState::Established => "ESTABLISHED",
            SockState::Listen => "LISTEN",
            SockState::SynSent => "SYN_SENT",
            SockState::SynRecv => "SYN_RECV",
            SockState::FinWait1 => "FIN_WAIT1",
            SockState::FinWait2 => "FIN_WAIT2",
            SockState::TimeWait => "TIME_WAIT",
            SockState::CloseWait => "CLOSE_WAIT",
            SockState::LastAck => "LAST_ACK",
            SockState::Closing => "CLOSING",
            SockState::Closed => "CLOSED",
            SockState::Unknown => "UNKNOWN",
        }
    }

    /// States that keep the normal color in the dashboard; everything else
    /// is drawn with the alarm color.
    pub fn is_healthy(self) -> bool {
        matches!(self, SockState::Established | SockState::Listen)
    }
}

impl fmt::Display for SockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SockFamily {
    Inet,
    Inet6,
    // Part of the status vocabulary; the inet-only socket scan never emits it.
    #[allow(dead_code)]
    Unix,
}

impl SockFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            SockFamily::Inet => "INET",
            SockFamily::Inet6 => "INET6",
            SockFamily::Unix => "UNIX",
        }
    }
}

impl fmt::Display for SockFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One socket held open by a tunnel-bearing SSH process.
///
/// The remote endpoint is absent for listening/unconnected sockets;
/// `foreign_address` and `out_port` are set together or not at all, which
/// the constructor enforces by taking them as one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub local_address: String,
    pub in_port: u16,
    foreign_address: Option<String>,
    out_port: Option<u16>,
    pub status: SockState,
    pub family: SockFamily,
}

impl Connection {
    pub fn new(
        local_address: String,
        in_port: u16,
        remote: Option<(String, u16)>,
        status: SockState,
        family: SockFamily,
    ) -> Self {
        let (foreign_address, out_port) = match remote {
            Some((addr, port)) => (Some(addr), Some(port)),
            None => (None, None),
        };
        Self {
            local_address,
            in_port,
            foreign_address,
            out_port,
            status,
            family,
        }
    }

    pub fn foreign_address(&self) -> Option<&str> {
        self.foreign_address.as_deref()
    }

    pub fn out_port(&self) -> Option<u16> {
        self.out_port
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.foreign_address, self.out_port) {
            (Some(addr), Some(port)) => write!(
                f,
                "{}\t{}\t{}:{} → {}:{}",
                self.family, self.status, self.local_address, self.in_port, addr, port
            ),
            _ => write!(
                f,
                "{}\t{}\t{}:{}",
                self.family, self.status, self.local_address, self.in_port
            ),
        }
    }
}

/// How the SSH process behind a tunnel is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelKind {
    /// Spawned and restarted by a supervising autossh process.
    Auto { supervisor_pid: i32 },
    /// Runs unmanaged.
    Raw,
}

impl TunnelKind {
    pub fn label(self) -> &'static str {
        match self {
            TunnelKind::Auto { .. } => "auto",
            TunnelKind::Raw => "ssh",
        }
    }
}

/// One SSH local/remote/dynamic port forward and the sockets currently
/// open by the SSH process enacting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunnel {
    pub ssh_pid: i32,
    pub in_port: u16,
    pub via_host: String,
    pub target_host: String,
    pub out_port: u16,
    pub kind: TunnelKind,
    pub connections: Vec<Connection>,
}

impl Tunnel {
    /// The pid this tunnel is keyed by in the table. An Auto tunnel keys by
    /// its supervisor, which stays stable across SSH restarts; a Raw tunnel
    /// keys by the SSH process itself.
    pub fn key(&self) -> i32 {
        match self.kind {
            TunnelKind::Auto { supervisor_pid } => supervisor_pid,
            TunnelKind::Raw => self.ssh_pid,
        }
    }

    /// Tab-separated row matching the table header.
    pub fn render_row(&self) -> String {
        TunnelField::ALL
            .iter()
            .map(|field| field.extract(self))
            .collect::<Vec<_>>()
            .join("\t")
    }

    /// One indented line per attached connection.
    pub fn render_connections(&self) -> String {
        let mut rep = String::new();
        for conn in &self.connections {
            rep.push_str(&format!("\n\t↳ {}", conn));
        }
        rep
    }
}

/// Displayable tunnel columns: a fixed accessor table so that the listing
/// modes and the dashboard render the same fields without looking anything
/// up by name at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelField {
    Kind,
    SshPid,
    InPort,
    ViaHost,
    TargetHost,
    OutPort,
}

impl TunnelField {
    pub const ALL: [TunnelField; 6] = [
        TunnelField::Kind,
        TunnelField::SshPid,
        TunnelField::InPort,
        TunnelField::ViaHost,
        TunnelField::TargetHost,
        TunnelField::OutPort,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TunnelField::Kind => "TYPE",
            TunnelField::SshPid => "SSH_PID",
            TunnelField::InPort => "IN_PORT",
            TunnelField::ViaHost => "VIA_HOST",
            TunnelField::TargetHost => "TARGET_HOST",
            TunnelField::OutPort => "OUT_PORT",
        }
    }

    pub fn extract(self, tunnel: &Tunnel) -> String {
        match self {
            TunnelField::Kind => tunnel.kind.label().to_string(),
            TunnelField::SshPid => tunnel.ssh_pid.to_string(),
            TunnelField::InPort => tunnel.in_port.to_string(),
            TunnelField::ViaHost => tunnel.via_host.clone(),
            TunnelField::TargetHost => tunnel.target_host.clone(),
            TunnelField::OutPort => tunnel.out_port.to_string(),
        }
    }
}

/// Insertion-ordered mapping from identifying pid to tunnel, rebuilt
/// wholesale on every scan. Positional indices are only meaningful within
/// one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelTable {
    tunnels: Vec<Tunnel>,
}

impl TunnelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keyed by `tunnel.key()`. A duplicate key overwrites the
    /// earlier entry in place, keeping its discovery position.
    pub fn insert(&mut self, tunnel: Tunnel) {
        let key = tunnel.key();
        match self.tunnels.iter_mut().find(|t| t.key() == key) {
            Some(slot) => *slot = tunnel,
            None => self.tunnels.push(tunnel),
        }
    }

    /// Tunnel at a positional index in discovery order.
    pub fn get(&self, position: usize) -> Option<&Tunnel> {
        self.tunnels.get(position)
    }

    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tunnel> {
        self.tunnels.iter()
    }

    pub fn connection_count(&self) -> usize {
        self.tunnels.iter().map(|t| t.connections.len()).sum()
    }

    /// Tab-separated column header shared by the listing modes.
    pub fn header() -> String {
        TunnelField::ALL
            .iter()
            .map(|field| field.label())
            .collect::<Vec<_>>()
            .join("\t")
    }

    /// Full textual feed: header, one row per tunnel, indented connection
    /// lines underneath each.
    pub fn render_listing(&self) -> String {
        let mut reps = vec![Self::header()];
        for tunnel in &self.tunnels {
            reps.push(format!(
                "{}{}",
                tunnel.render_row(),
                tunnel.render_connections()
            ));
        }
        reps.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_tunnel(pid: i32) -> Tunnel {
        Tunnel {
            ssh_pid: pid,
            in_port: 8080,
            via_host: "jump.example.org".to_string(),
            target_host: "example.com".to_string(),
            out_port: 80,
            kind: TunnelKind::Raw,
            connections: Vec::new(),
        }
    }

    #[test]
    fn test_auto_tunnel_keyed_by_supervisor() {
        let mut tunnel = raw_tunnel(100);
        tunnel.kind = TunnelKind::Auto { supervisor_pid: 99 };
        assert_eq!(tunnel.key(), 99);
        assert_eq!(raw_tunnel(100).key(), 100);
    }

    #[test]
    fn test_insert_overwrites_duplicate_key_in_place() {
        let mut table = TunnelTable::new();
        let mut first = raw_tunnel(100);
        first.kind = TunnelKind::Auto { supervisor_pid: 99 };
        table.insert(first);
        table.insert(raw_tunnel(50));

        // Restarted ssh child under the same supervisor: same key, new pid.
        let mut second = raw_tunnel(101);
        second.kind = TunnelKind::Auto { supervisor_pid: 99 };
        table.insert(second);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().ssh_pid, 101);
        assert_eq!(table.get(1).unwrap().ssh_pid, 50);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn test_connection_remote_endpoint_set_together() {
        let listening = Connection::new(
            "127.0.0.1".to_string(),
            8080,
            None,
            SockState::Listen,
            SockFamily::Inet,
        );
        assert!(listening.foreign_address().is_none());
        assert!(listening.out_port().is_none());

        let established = Connection::new(
            "127.0.0.1".to_string(),
            8080,
            Some(("93.184.216.34".to_string(), 443)),
            SockState::Established,
            SockFamily::Inet,
        );
        assert_eq!(
            established.foreign_address().is_some(),
            established.out_port().is_some()
        );
    }

    #[test]
    fn test_connection_display() {
        let conn = Connection::new(
            "127.0.0.1".to_string(),
            8080,
            Some(("10.0.0.2".to_string(), 443)),
            SockState::Established,
            SockFamily::Inet,
        );
        assert_eq!(
            conn.to_string(),
            "INET\tESTABLISHED\t127.0.0.1:8080 → 10.0.0.2:443"
        );

        let listen = Connection::new(
            "::1".to_string(),
            8080,
            None,
            SockState::Listen,
            SockFamily::Inet6,
        );
        assert_eq!(listen.to_string(), "INET6\tLISTEN\t::1:8080");
    }

    #[test]
    fn test_render_row_matches_header_columns() {
        let mut tunnel = raw_tunnel(100);
        tunnel.kind = TunnelKind::Auto { supervisor_pid: 99 };
        assert_eq!(
            TunnelTable::header(),
            "TYPE\tSSH_PID\tIN_PORT\tVIA_HOST\tTARGET_HOST\tOUT_PORT"
        );
        assert_eq!(
            tunnel.render_row(),
            "auto\t100\t8080\tjump.example.org\texample.com\t80"
        );
        assert_eq!(
            tunnel.render_row().split('\t').count(),
            TunnelTable::header().split('\t').count()
        );
    }

    #[test]
    fn test_unhealthy_states_flagged() {
        assert!(SockState::Established.is_healthy());
        assert!(SockState::Listen.is_healthy());
        assert!(!SockState::TimeWait.is_healthy());
        assert!(!SockState::Unknown.is_healthy());
    }
}
