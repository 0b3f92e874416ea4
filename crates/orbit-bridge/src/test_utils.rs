//! Test utilities for code that drives external tools
//!
//! [`ScriptedExecutor`] stands in for [`ProcessExecutor`](crate::ProcessExecutor):
//! responses are scripted per tool and subcommand (the first argument), and
//! every invocation is recorded so tests can assert on the exact argument
//! vectors.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orbit_core::{Device, DeviceState, ExecError};
use tokio::sync::oneshot;

use crate::executor::{CommandExecutor, SpawnedProcess, Tool};

/// A recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub tool: Tool,
    pub args: Vec<String>,
    pub spawned: bool,
}

#[derive(Debug, Clone)]
enum Scripted {
    Ok(String),
    Err(ExecError),
}

#[derive(Debug, Default)]
struct Script {
    /// Queued responses; the last one repeats once the queue drains to it
    responses: VecDeque<Scripted>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<(Tool, String), Script>,
    spawn_failures: HashMap<Tool, ExecError>,
    spawned: Vec<Arc<AtomicBool>>,
    calls: Vec<RecordedCall>,
    next_pid: u32,
}

/// Scripted [`CommandExecutor`] for tests
///
/// Unscripted `run` calls fail with a non-zero exit. `spawn` succeeds unless a
/// failure was scripted with [`ScriptedExecutor::fail_spawn`]; the returned
/// handle flips to exited once killed.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().expect("script state poisoned")
    }

    fn push(&self, tool: Tool, subcommand: &str, response: Scripted) {
        self.state()
            .scripts
            .entry((tool, subcommand.to_string()))
            .or_default()
            .responses
            .push_back(response);
    }

    /// Queue a successful adb response for `subcommand`
    pub fn respond_ok(&self, subcommand: &str, stdout: &str) {
        self.respond_ok_for(Tool::Bridge, subcommand, stdout);
    }

    /// Queue a failed adb response for `subcommand`
    pub fn respond_err(&self, subcommand: &str, error: ExecError) {
        self.respond_err_for(Tool::Bridge, subcommand, error);
    }

    pub fn respond_ok_for(&self, tool: Tool, subcommand: &str, stdout: &str) {
        self.push(tool, subcommand, Scripted::Ok(stdout.to_string()));
    }

    pub fn respond_err_for(&self, tool: Tool, subcommand: &str, error: ExecError) {
        self.push(tool, subcommand, Scripted::Err(error));
    }

    /// Delay every adb `subcommand` response by `delay`
    pub fn delay(&self, subcommand: &str, delay: Duration) {
        self.delay_for(Tool::Bridge, subcommand, delay);
    }

    pub fn delay_for(&self, tool: Tool, subcommand: &str, delay: Duration) {
        self.state()
            .scripts
            .entry((tool, subcommand.to_string()))
            .or_default()
            .delay = Some(delay);
    }

    /// Make every `spawn` of `tool` fail with `error`
    pub fn fail_spawn(&self, tool: Tool, error: ExecError) {
        self.state().spawn_failures.insert(tool, error);
    }

    /// All invocations so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Invocations of `tool` whose first argument is `subcommand`
    pub fn calls_to(&self, tool: Tool, subcommand: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.tool == tool && c.args.first().map(String::as_str) == Some(subcommand))
            .cloned()
            .collect()
    }

    /// Mark every spawned process as exited, as if its window was closed
    pub fn exit_spawned(&self) {
        for exited in &self.state().spawned {
            exited.store(true, Ordering::Release);
        }
    }

    /// Number of spawned processes that have not been killed
    pub fn live_spawns(&self) -> usize {
        self.state()
            .spawned
            .iter()
            .filter(|exited| !exited.load(Ordering::Acquire))
            .count()
    }
}

impl CommandExecutor for ScriptedExecutor {
    async fn run(
        &self,
        tool: Tool,
        args: &[String],
        _timeout: Duration,
    ) -> std::result::Result<String, ExecError> {
        let subcommand = args.first().cloned().unwrap_or_default();

        let (response, delay) = {
            let mut state = self.state();
            state.calls.push(RecordedCall {
                tool,
                args: args.to_vec(),
                spawned: false,
            });

            match state.scripts.get_mut(&(tool, subcommand.clone())) {
                Some(script) => {
                    let response = if script.responses.len() > 1 {
                        script.responses.pop_front()
                    } else {
                        script.responses.front().cloned()
                    };
                    (response, script.delay)
                }
                None => (None, None),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match response {
            Some(Scripted::Ok(stdout)) => Ok(stdout),
            Some(Scripted::Err(e)) => Err(e),
            None => Err(ExecError::NonZeroExit {
                tool: tool.to_string(),
                code: Some(1),
                stderr: format!("unscripted call: {} {}", tool, args.join(" ")),
            }),
        }
    }

    async fn spawn(
        &self,
        tool: Tool,
        args: &[String],
    ) -> std::result::Result<SpawnedProcess, ExecError> {
        let mut state = self.state();
        state.calls.push(RecordedCall {
            tool,
            args: args.to_vec(),
            spawned: true,
        });

        if let Some(e) = state.spawn_failures.get(&tool) {
            return Err(e.clone());
        }

        state.next_pid += 1;
        let pid = 10_000 + state.next_pid;
        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        let flag = Arc::clone(&exited);
        tokio::spawn(async move {
            if kill_rx.await.is_ok() {
                flag.store(true, Ordering::Release);
            }
        });

        state.spawned.push(Arc::clone(&exited));
        Ok(SpawnedProcess::from_parts(Some(pid), Some(kill_tx), exited))
    }
}

/// Creates an online bridge device
pub fn online_device(serial: &str) -> Device {
    Device::bridge(serial, DeviceState::Online)
}

/// Creates an online bridge device with a model
pub fn online_device_with_model(serial: &str, model: &str) -> Device {
    Device::bridge(serial, DeviceState::Online).with_model(model)
}

/// Formats `adb devices -l` output for `(serial, state)` rows
pub fn devices_output(rows: &[(&str, &str)]) -> String {
    let mut output = String::from("List of devices attached\n");
    for (serial, state) in rows {
        output.push_str(&format!("{serial}\t{state}\n"));
    }
    output
}
