//! Test doubles shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::time::Instant;

use crate::channel::{
    ChannelError, CommandOutput, CommandRunner, RemoteChannel, RemoteHost, RemoteOutput,
};
use crate::gateway::{GatewayFuture, InstanceStatus, LaunchRequest, ProviderGateway};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ChannelError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ChannelError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Gateway operations that can be observed or made to fail.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GatewayOp {
    /// [`ProviderGateway::describe_status`].
    DescribeStatus,
    /// [`ProviderGateway::create`].
    Create,
    /// [`ProviderGateway::request_start`].
    Start,
    /// [`ProviderGateway::request_stop`].
    Stop,
    /// [`ProviderGateway::public_address`].
    PublicAddress,
    /// [`ProviderGateway::first_running_instance_id`].
    FirstRunning,
}

impl fmt::Display for GatewayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DescribeStatus => "describe-status",
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::PublicAddress => "public-address",
            Self::FirstRunning => "first-running",
        };
        f.write_str(label)
    }
}

/// A call recorded by [`ScriptedGateway`], stamped with the tokio clock.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GatewayCall {
    /// Operation invoked.
    pub op: GatewayOp,
    /// Instance the call targeted; empty for account-wide lookups.
    pub instance_id: String,
    /// Tokio clock reading when the call was made.
    pub at: Instant,
}

/// Error returned by [`ScriptedGateway`] for injected failures.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted {op} failure")]
pub struct ScriptedGatewayError {
    /// Operation that was made to fail.
    pub op: GatewayOp,
}

#[derive(Debug, Default)]
struct GatewayState {
    statuses: HashMap<String, VecDeque<InstanceStatus>>,
    created_ids: VecDeque<String>,
    launches: Vec<LaunchRequest>,
    addresses: HashMap<String, String>,
    first_running: String,
    failures: HashSet<GatewayOp>,
    calls: Vec<GatewayCall>,
}

/// Scripted [`ProviderGateway`] that replays status sequences and records
/// every call.
///
/// Each instance's status sequence is consumed one entry per
/// `describe_status` call; the last entry repeats forever. Instances without
/// a script are reported as [`InstanceStatus::Absent`].
#[derive(Clone, Debug, Default)]
pub struct ScriptedGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl ScriptedGateway {
    /// Creates a gateway with no instances.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("lock poisoned: scripted gateway: {err}"))
    }

    /// Scripts the statuses returned for `instance_id`.
    pub fn script_status(&self, instance_id: &str, statuses: &[InstanceStatus]) {
        self.lock()
            .statuses
            .insert(instance_id.to_owned(), statuses.iter().copied().collect());
    }

    /// Queues the identifier returned by the next `create` call.
    pub fn push_created_id(&self, instance_id: &str) {
        self.lock().created_ids.push_back(instance_id.to_owned());
    }

    /// Sets the public address reported for `instance_id`.
    pub fn set_public_address(&self, instance_id: &str, address: &str) {
        self.lock()
            .addresses
            .insert(instance_id.to_owned(), address.to_owned());
    }

    /// Sets the identifier returned by the first-running lookup.
    pub fn set_first_running(&self, instance_id: &str) {
        instance_id.clone_into(&mut self.lock().first_running);
    }

    /// Makes every call of `op` fail.
    pub fn fail(&self, op: GatewayOp) {
        self.lock().failures.insert(op);
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Returns the recorded calls of a single operation.
    #[must_use]
    pub fn calls_of(&self, op: GatewayOp) -> Vec<GatewayCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .cloned()
            .collect()
    }

    /// Returns how many times `op` was invoked.
    #[must_use]
    pub fn count(&self, op: GatewayOp) -> usize {
        self.calls_of(op).len()
    }

    /// Returns the launch requests passed to `create`.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.lock().launches.clone()
    }

    fn record(&self, op: GatewayOp, instance_id: &str) -> Result<(), ScriptedGatewayError> {
        let mut state = self.lock();
        state.calls.push(GatewayCall {
            op,
            instance_id: instance_id.to_owned(),
            at: Instant::now(),
        });
        if state.failures.contains(&op) {
            return Err(ScriptedGatewayError { op });
        }
        Ok(())
    }

    fn next_status(&self, instance_id: &str) -> InstanceStatus {
        let mut state = self.lock();
        let Some(queue) = state.statuses.get_mut(instance_id) else {
            return InstanceStatus::Absent;
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(InstanceStatus::Absent)
        } else {
            queue.front().copied().unwrap_or(InstanceStatus::Absent)
        }
    }
}

impl ProviderGateway for ScriptedGateway {
    type Error = ScriptedGatewayError;

    fn describe_status<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> GatewayFuture<'a, InstanceStatus, Self::Error> {
        Box::pin(async move {
            self.record(GatewayOp::DescribeStatus, instance_id)?;
            Ok(self.next_status(instance_id))
        })
    }

    fn create<'a>(&'a self, request: &'a LaunchRequest) -> GatewayFuture<'a, String, Self::Error> {
        Box::pin(async move {
            self.record(GatewayOp::Create, "")?;
            let mut state = self.lock();
            state.launches.push(request.clone());
            let next = state.launches.len();
            Ok(state
                .created_ids
                .pop_front()
                .unwrap_or_else(|| format!("i-scripted-{next}")))
        })
    }

    fn request_start<'a>(&'a self, instance_id: &'a str) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move { self.record(GatewayOp::Start, instance_id) })
    }

    fn request_stop<'a>(&'a self, instance_id: &'a str) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move { self.record(GatewayOp::Stop, instance_id) })
    }

    fn public_address<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> GatewayFuture<'a, String, Self::Error> {
        Box::pin(async move {
            self.record(GatewayOp::PublicAddress, instance_id)?;
            Ok(self
                .lock()
                .addresses
                .get(instance_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn first_running_instance_id(&self) -> GatewayFuture<'_, String, Self::Error> {
        Box::pin(async move {
            self.record(GatewayOp::FirstRunning, "")?;
            Ok(self.lock().first_running.clone())
        })
    }
}

/// A file recorded by [`ScriptedChannel::send_file`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SentFile {
    /// Host the file was sent to.
    pub host: RemoteHost,
    /// Local source path.
    pub local_path: Utf8PathBuf,
    /// Remote destination path.
    pub remote_path: String,
    /// File contents at the time of transfer.
    pub contents: String,
}

/// A command recorded by [`ScriptedChannel::run_command`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RanCommand {
    /// Host the command ran on.
    pub host: RemoteHost,
    /// Command line.
    pub command: String,
}

#[derive(Debug, Default)]
struct ChannelState {
    sent: Vec<SentFile>,
    commands: Vec<RanCommand>,
    outputs: VecDeque<Result<RemoteOutput, ChannelError>>,
    fail_transfers: bool,
}

/// Scripted [`RemoteChannel`] that captures transferred files and commands.
///
/// Commands return queued outputs in FIFO order, or an empty successful
/// output once the queue is drained.
#[derive(Clone, Debug, Default)]
pub struct ScriptedChannel {
    state: Rc<RefCell<ChannelState>>,
}

impl ScriptedChannel {
    /// Creates a channel with no queued outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every transfer fail.
    pub fn fail_transfers(&self) {
        self.state.borrow_mut().fail_transfers = true;
    }

    /// Queues the result of the next command.
    pub fn push_command_result(&self, result: Result<RemoteOutput, ChannelError>) {
        self.state.borrow_mut().outputs.push_back(result);
    }

    /// Returns the files sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentFile> {
        self.state.borrow().sent.clone()
    }

    /// Returns the commands run so far.
    #[must_use]
    pub fn commands(&self) -> Vec<RanCommand> {
        self.state.borrow().commands.clone()
    }
}

impl RemoteChannel for ScriptedChannel {
    fn send_file(
        &self,
        host: &RemoteHost,
        local_path: &Utf8Path,
        remote_path: &str,
    ) -> Result<(), ChannelError> {
        let mut state = self.state.borrow_mut();
        if state.fail_transfers {
            return Err(ChannelError::Transfer {
                local_path: local_path.to_path_buf(),
                remote_path: remote_path.to_owned(),
                message: String::from("scripted transfer failure"),
            });
        }
        let contents = std::fs::read_to_string(local_path).map_err(|err| {
            ChannelError::Transfer {
                local_path: local_path.to_path_buf(),
                remote_path: remote_path.to_owned(),
                message: err.to_string(),
            }
        })?;
        state.sent.push(SentFile {
            host: host.clone(),
            local_path: local_path.to_path_buf(),
            remote_path: remote_path.to_owned(),
            contents,
        });
        Ok(())
    }

    fn run_command(&self, host: &RemoteHost, command: &str) -> Result<RemoteOutput, ChannelError> {
        let mut state = self.state.borrow_mut();
        state.commands.push(RanCommand {
            host: host.clone(),
            command: command.to_owned(),
        });
        state.outputs.pop_front().unwrap_or_else(|| {
            Ok(RemoteOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        })
    }
}
