//! Subprocess execution for the external tools Orbit drives
//!
//! Every invocation goes through [`CommandExecutor`] so orchestration code
//! never touches `tokio::process` directly and tests can swap in a scripted
//! executor. Arguments are passed as discrete tokens; nothing is run through
//! a shell.

use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orbit_core::prelude::*;
use orbit_core::ExecError;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::tools::ToolPaths;

/// Default ceiling for read-only queries (`adb devices`, `arp -a`)
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default ceiling for `adb pair` / `adb connect`
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// External binaries Orbit knows how to invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Android debugging bridge (`adb`)
    Bridge,
    /// Screen mirroring (`scrcpy`)
    Mirror,
    /// Neighbor table (`arp`)
    Arp,
}

impl Tool {
    /// Default program name looked up on `PATH`
    pub fn program_name(&self) -> &'static str {
        match self {
            Tool::Bridge => "adb",
            Tool::Mirror => "scrcpy",
            Tool::Arp => "arp",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program_name())
    }
}

/// Runs external tools on behalf of the orchestrator
///
/// Implementations must enforce `timeout` and must not retry.
#[trait_variant::make(CommandExecutor: Send)]
pub trait LocalCommandExecutor {
    /// Run `tool` to completion and return its trimmed stdout.
    async fn run(
        &self,
        tool: Tool,
        args: &[String],
        timeout: Duration,
    ) -> std::result::Result<String, ExecError>;

    /// Start `tool` in the background without waiting for it.
    async fn spawn(
        &self,
        tool: Tool,
        args: &[String],
    ) -> std::result::Result<SpawnedProcess, ExecError>;
}

// ─────────────────────────────────────────────────────────────────
// Spawned (fire-and-forget) processes
// ─────────────────────────────────────────────────────────────────

/// Handle to a background process started with [`CommandExecutor::spawn`].
///
/// The `Child` is owned by a wait task; this handle keeps a kill channel and an
/// exit flag. Dropping the handle does not stop the process.
#[derive(Debug)]
pub struct SpawnedProcess {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: Arc<AtomicBool>,
}

impl SpawnedProcess {
    /// Hand `child` to a background wait task and return its handle.
    pub fn from_child(child: Child, tool: Tool) -> Self {
        let pid = child.id();
        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(child, tool, kill_rx, Arc::clone(&exited)));

        Self {
            pid,
            kill_tx: Some(kill_tx),
            exited,
        }
    }

    /// Build a handle from explicit parts (used by non-process executors).
    pub fn from_parts(
        pid: Option<u32>,
        kill_tx: Option<oneshot::Sender<()>>,
        exited: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pid,
            kill_tx,
            exited,
        }
    }

    async fn wait_for_exit(
        mut child: Child,
        tool: Tool,
        kill_rx: oneshot::Receiver<()>,
        exited: Arc<AtomicBool>,
    ) {
        tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => debug!("{} exited with status: {:?}", tool, status),
                    Err(e) => warn!("Error waiting for {}: {}", tool, e),
                }
            }
            signal = kill_rx => {
                match signal {
                    Ok(()) => {
                        info!("Kill requested, stopping {}", tool);
                        if let Err(e) = child.kill().await {
                            error!("Failed to kill {}: {}", tool, e);
                        }
                    }
                    // Handle dropped: leave the process running.
                    Err(_) => {
                        let _ = child.wait().await;
                    }
                }
            }
        }

        exited.store(true, Ordering::Release);
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Ask the wait task to kill the process. Idempotent.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Real executor
// ─────────────────────────────────────────────────────────────────

/// [`CommandExecutor`] backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    paths: ToolPaths,
}

impl ProcessExecutor {
    pub fn new(paths: ToolPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    fn map_spawn_error(tool: Tool, e: std::io::Error) -> ExecError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExecError::NotFound {
                tool: tool.to_string(),
            }
        } else {
            ExecError::Spawn {
                tool: tool.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl CommandExecutor for ProcessExecutor {
    async fn run(
        &self,
        tool: Tool,
        args: &[String],
        timeout: Duration,
    ) -> std::result::Result<String, ExecError> {
        let program = self.paths.program(tool);
        debug!("Running {} {}", program.display(), args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // reaps the child when the timeout drops the future
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Self::map_spawn_error(tool, e)),
            Err(_) => {
                warn!("{} {} timed out after {:?}", tool, args.join(" "), timeout);
                return Err(ExecError::Timeout {
                    tool: tool.to_string(),
                    timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        trace!("{} stdout: {}", tool, stdout);
        if !stderr.is_empty() {
            trace!("{} stderr: {}", tool, stderr);
        }

        if !output.status.success() {
            // adb reports most failures on stdout
            let stderr = if stderr.is_empty() { stdout } else { stderr };
            return Err(ExecError::NonZeroExit {
                tool: tool.to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(stdout)
    }

    async fn spawn(
        &self,
        tool: Tool,
        args: &[String],
    ) -> std::result::Result<SpawnedProcess, ExecError> {
        let program = self.paths.program(tool);
        info!("Spawning {} {}", program.display(), args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Self::map_spawn_error(tool, e))?;

        info!("{} started with PID: {:?}", tool, child.id());
        Ok(SpawnedProcess::from_child(child, tool))
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandExecutor, ProcessExecutor, Tool, ToolPaths, QUERY_TIMEOUT};
    use orbit_core::ExecError;
    use std::path::PathBuf;
    use std::time::Duration;

    fn executor_with_bridge(program: &str) -> ProcessExecutor {
        ProcessExecutor::new(ToolPaths {
            adb: PathBuf::from(program),
            ..ToolPaths::default()
        })
    }

    #[test]
    fn test_tool_program_names() {
        assert_eq!(Tool::Bridge.to_string(), "adb");
        assert_eq!(Tool::Mirror.to_string(), "scrcpy");
        assert_eq!(Tool::Arp.to_string(), "arp");
    }

    #[tokio::test]
    async fn test_run_missing_binary_is_not_found() {
        let executor = executor_with_bridge("orbit-definitely-missing-binary");
        let err = executor
            .run(Tool::Bridge, &["devices".to_string()], QUERY_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecError::NotFound {
                tool: "adb".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_not_found() {
        let executor = executor_with_bridge("orbit-definitely-missing-binary");
        let err = executor.spawn(Tool::Bridge, &[]).await.unwrap_err();
        assert!(matches!(err, ExecError::NotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_trims_stdout() {
        let executor = executor_with_bridge("echo");
        let out = executor
            .run(Tool::Bridge, &["  hello  ".to_string()], QUERY_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_non_zero_exit() {
        let executor = executor_with_bridge("false");
        let err = executor
            .run(Tool::Bridge, &[], QUERY_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecError::NonZeroExit { code: Some(1), .. }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let executor = executor_with_bridge("sleep");
        let err = executor
            .run(Tool::Bridge, &["5".to_string()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_process_kill() {
        let executor = executor_with_bridge("sleep");
        let mut process = executor
            .spawn(Tool::Bridge, &["5".to_string()])
            .await
            .unwrap();
        assert!(process.pid().is_some());
        assert!(!process.has_exited());

        process.kill();
        for _ in 0..50 {
            if process.has_exited() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(process.has_exited());
    }
}
