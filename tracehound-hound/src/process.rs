//! Process adapter: spawn, feed and kill sandboxed hound children
//!
//! Constraints are declarative defense-in-depth, not a trust boundary.
//! The memory cap is enforced through `RLIMIT_AS` where the platform
//! allows; everything else is recorded on the handle and logged as an
//! advisory. Startup never fails on an unsupported constraint field.

use crate::error::{HoundError, HoundResult};
use crate::ipc::encode_frame;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Declarative execution constraints for a hound child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConstraints {
    /// Address-space cap in bytes; applied via rlimit on Unix
    pub max_memory_bytes: Option<u64>,
    /// Advisory: the child must not open network connections
    pub deny_network: bool,
    /// Advisory: the child must not write to the filesystem
    pub deny_fs_write: bool,
    /// Advisory: the child must not spawn further processes
    pub deny_child_spawn: bool,
}

impl Default for ProcessConstraints {
    fn default() -> Self {
        Self {
            max_memory_bytes: Some(512 * 1024 * 1024),
            deny_network: true,
            deny_fs_write: true,
            deny_child_spawn: true,
        }
    }
}

/// A running hound child with its stdin channel
#[derive(Debug)]
pub struct HoundProcess {
    pid: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    constraints: ProcessConstraints,
}

impl HoundProcess {
    /// Spawn a hound, applying what the platform supports of `constraints`
    pub fn spawn(
        program: &Path,
        args: &[String],
        constraints: &ProcessConstraints,
    ) -> HoundResult<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // stderr is reserved for out-of-band diagnostics and not parsed.
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        apply_memory_cap(&mut cmd, constraints.max_memory_bytes);
        advise_unenforced(constraints);

        let mut child = cmd
            .spawn()
            .map_err(|e| HoundError::SpawnFailed(format!("{}: {}", program.display(), e)))?;
        let pid = child
            .id()
            .ok_or_else(|| HoundError::SpawnFailed("child exited before observation".to_string()))?;
        let stdin = child.stdin.take();

        info!(pid, program = %program.display(), "hound spawned");
        Ok(Self {
            pid,
            child,
            stdin,
            constraints: constraints.clone(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn constraints(&self) -> &ProcessConstraints {
        &self.constraints
    }

    /// Take the stdout pipe for frame observation; yields once
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Write one framed message to the child
    pub async fn send(&mut self, payload: &[u8]) -> HoundResult<()> {
        let frame = encode_frame(payload)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| HoundError::Ipc("child stdin already closed".to_string()))?;
        stdin
            .write_all(&frame)
            .await
            .map_err(|e| HoundError::Ipc(format!("write to pid {}: {}", self.pid, e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| HoundError::Ipc(format!("flush to pid {}: {}", self.pid, e)))?;
        debug!(pid = self.pid, bytes = frame.len(), "frame sent to hound");
        Ok(())
    }

    /// Immediate, unmaskable termination
    pub async fn kill(&mut self) -> HoundResult<()> {
        self.child
            .kill()
            .await
            .map_err(|e| HoundError::Ipc(format!("kill pid {}: {}", self.pid, e)))?;
        info!(pid = self.pid, "hound killed");
        Ok(())
    }

    /// Reap the child if it has exited; `None` while still running
    pub fn try_exit_code(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code().unwrap_or(-1)),
            _ => None,
        }
    }

    /// Wait for the child to exit and return its code
    pub async fn wait(&mut self) -> HoundResult<i32> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| HoundError::Crashed(format!("wait on pid {}: {}", self.pid, e)))?;
        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(unix)]
fn apply_memory_cap(cmd: &mut Command, max_memory_bytes: Option<u64>) {
    let Some(cap) = max_memory_bytes else {
        return;
    };
    // Applied between fork and exec in the child.
    unsafe {
        cmd.pre_exec(move || {
            let limit = libc::rlimit {
                rlim_cur: cap as libc::rlim_t,
                rlim_max: cap as libc::rlim_t,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_memory_cap(_cmd: &mut Command, max_memory_bytes: Option<u64>) {
    if max_memory_bytes.is_some() {
        warn!("memory cap requested but not enforceable on this platform; advisory only");
    }
}

fn advise_unenforced(constraints: &ProcessConstraints) {
    if constraints.deny_network {
        warn!("deny_network is advisory; no platform enforcement is applied");
    }
    if constraints.deny_fs_write {
        warn!("deny_fs_write is advisory; no platform enforcement is applied");
    }
    if constraints.deny_child_spawn {
        warn!("deny_child_spawn is advisory; no platform enforcement is applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constraints_are_defensive() {
        let constraints = ProcessConstraints::default();
        assert_eq!(constraints.max_memory_bytes, Some(512 * 1024 * 1024));
        assert!(constraints.deny_network);
        assert!(constraints.deny_fs_write);
        assert!(constraints.deny_child_spawn);
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let err = HoundProcess::spawn(
            Path::new("/nonexistent/hound-worker"),
            &[],
            &ProcessConstraints::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "PROCESS_SPAWN_FAILED");
    }
}
