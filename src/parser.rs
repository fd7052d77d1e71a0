use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Sentinel used when no destination argument can be found on the command
/// line (e.g. the host comes from an ssh_config alias we cannot see).
pub const UNKNOWN_HOST: &str = "unknown";

/// Short ssh flags that take no argument. Any other two-character flag is
/// assumed to consume the following token. This is a heuristic: ssh's real
/// flag grammar is not recovered here, and unusual combinations can
/// misidentify the destination.
const NO_ARG_FLAGS: &str = "46AaCfGgKkMNnqsTtVvXxYy";

/// Matches a local/remote/dynamic forwarding flag, possibly combined with
/// other short flags in the same token, followed by port:host:port.
static RE_FORWARDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\w*[LRD]\w*\s*(\d+):(\S+):(\d+)").unwrap());

/// Forwarding data recovered from an SSH command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingSpec {
    pub in_port: u16,
    pub via_host: String,
    pub target_host: String,
    pub out_port: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The command line carries no forwarding flag: an interactive shell,
    /// scp transport, etc. Expected and frequent; callers skip silently.
    #[error("command line carries no forwarding flag")]
    NotATunnel,

    /// More than one forwarding spec on a single command line. Exactly one
    /// is expected; surfaced rather than silently disambiguated.
    #[error("{0} forwarding specs on one command line, expected exactly one")]
    MultipleSpecs(usize),

    /// A captured port does not fit a 16-bit port number.
    #[error("forwarding port out of range: {0}")]
    PortOutOfRange(String),
}

fn parse_port(capture: &str) -> Result<u16, ParseError> {
    capture
        .parse::<u16>()
        .map_err(|_| ParseError::PortOutOfRange(capture.to_string()))
}

/// Recover the forwarding specification from the full argument vector of an
/// SSH client process. Pure function, no I/O.
pub fn parse_forwarding(cmd: &[String]) -> Result<ForwardingSpec, ParseError> {
    let cmdline = cmd.join(" ");
    log::debug!("ssh cmd line: {}", cmdline);

    let mut matches = RE_FORWARDING.captures_iter(&cmdline);
    let captures = matches.next().ok_or(ParseError::NotATunnel)?;
    let extra = matches.count();
    if extra > 0 {
        return Err(ParseError::MultipleSpecs(extra + 1));
    }

    let in_port = parse_port(&captures[1])?;
    let target_host = captures[2].to_string();
    let out_port = parse_port(&captures[3])?;

    Ok(ForwardingSpec {
        in_port,
        via_host: find_via_host(cmd),
        target_host,
        out_port,
    })
}

/// Find the ssh destination argument: the first token after the program
/// name that is neither a flag nor a flag's argument. Falls back to
/// `UNKNOWN_HOST` rather than failing the whole parse.
fn find_via_host(cmd: &[String]) -> String {
    let mut i = 1;
    while i < cmd.len() {
        let token = &cmd[i];
        match token.strip_prefix('-') {
            Some(rest) => {
                if rest.chars().next().is_some_and(|c| NO_ARG_FLAGS.contains(c)) {
                    // flag without argument
                } else if token.len() == 2
                    && i + 1 < cmd.len()
                    && !cmd[i + 1].starts_with('-')
                {
                    // the argument is likely the next token; skip it too
                    i += 1;
                }
                i += 1;
            }
            None => return token.clone(),
        }
    }
    UNKNOWN_HOST.to_string()
}
