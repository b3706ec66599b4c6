// src/exec/process.rs

//! Process-group signalling.
//!
//! Scripts are spawned as the leader of a fresh process group
//! (`process_group(0)`), so the group id equals the leader's pid and every
//! descendant that does not explicitly leave the group can be signalled as a
//! unit. On platforms without process groups the handle is inert and the
//! executor falls back to killing the direct child.

use std::io;

use tokio::process::Child;

/// Capability to terminate a spawned script together with its descendants.
#[derive(Debug, Clone, Copy)]
pub struct ProcessHandle {
    pid: Option<u32>,
}

impl ProcessHandle {
    pub fn from_child(child: &Child) -> Self {
        Self { pid: child.id() }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[cfg(unix)]
impl ProcessHandle {
    fn pgid(&self) -> Option<nix::unistd::Pid> {
        let pid = i32::try_from(self.pid?).ok()?;
        // Reject 0 and 1: signalling those groups would hit ourselves or init.
        (pid > 1).then(|| nix::unistd::Pid::from_raw(pid))
    }

    /// Send SIGTERM to the whole group. A group that is already gone is not
    /// an error.
    pub fn terminate_gracefully(&self) -> io::Result<()> {
        self.signal(nix::sys::signal::Signal::SIGTERM)
    }

    /// Send SIGKILL to the whole group. A group that is already gone is not
    /// an error.
    pub fn kill(&self) -> io::Result<()> {
        self.signal(nix::sys::signal::Signal::SIGKILL)
    }

    /// True while any member of the group still exists.
    pub fn group_alive(&self) -> bool {
        match self.pgid() {
            Some(pgid) => nix::sys::signal::killpg(pgid, None).is_ok(),
            None => false,
        }
    }

    fn signal(&self, signal: nix::sys::signal::Signal) -> io::Result<()> {
        let Some(pgid) = self.pgid() else {
            return Ok(());
        };
        match nix::sys::signal::killpg(pgid, signal) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

#[cfg(not(unix))]
impl ProcessHandle {
    /// No graceful signal exists here; the executor escalates straight to
    /// killing the child.
    pub fn terminate_gracefully(&self) -> io::Result<()> {
        Ok(())
    }

    pub fn kill(&self) -> io::Result<()> {
        Ok(())
    }

    pub fn group_alive(&self) -> bool {
        false
    }
}
