// Process-control actions: reload and terminate tunnels via signals

use crate::tunnel::{Tunnel, TunnelKind};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    /// The targeted pid already exited. Recoverable; the next scan will
    /// drop the tunnel from the table.
    #[error("no such process: {0}")]
    NoSuchProcess(i32),

    #[error("signal delivery to pid {0} failed: {1}")]
    Failed(i32, Errno),
}

fn send(pid: i32, signal: Signal) -> Result<(), ControlError> {
    kill(Pid::from_raw(pid), signal).map_err(|errno| match errno {
        Errno::ESRCH => ControlError::NoSuchProcess(pid),
        other => ControlError::Failed(pid, other),
    })
}

/// Ask the supervisor to tear down and re-establish its tunnel (SIGUSR1 is
/// autossh's reload signal). Raw tunnels have no supervisor to ask; the
/// request is a no-op, not an error. Returns whether a signal was sent.
pub fn reload(tunnel: &Tunnel) -> Result<bool, ControlError> {
    match tunnel.kind {
        TunnelKind::Auto { supervisor_pid } => {
            log::debug!("SIGUSR1 to supervisor pid {}", supervisor_pid);
            send(supervisor_pid, Signal::SIGUSR1)?;
            Ok(true)
        }
        TunnelKind::Raw => {
            log::debug!("cannot reload raw tunnel (ssh pid {})", tunnel.ssh_pid);
            Ok(false)
        }
    }
}

/// Kill the tunnel: the supervisor first, so it cannot respawn the ssh
/// child, then the ssh process itself. Both deliveries are attempted even
/// if the first fails; the first error is reported.
pub fn terminate(tunnel: &Tunnel) -> Result<(), ControlError> {
    let mut first_err = None;

    if let TunnelKind::Auto { supervisor_pid } = tunnel.kind {
        log::debug!("SIGKILL to supervisor pid {}", supervisor_pid);
        if let Err(err) = send(supervisor_pid, Signal::SIGKILL) {
            log::error!("{}", err);
            first_err = Some(err);
        }
    }

    log::debug!("SIGKILL to ssh pid {}", tunnel.ssh_pid);
    if let Err(err) = send(tunnel.ssh_pid, Signal::SIGKILL) {
        log::error!("{}", err);
        first_err.get_or_insert(err);
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
