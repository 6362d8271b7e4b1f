//! Agent subprocess runner
//!
//! Spawns one external command in the project root, writes the prompt to its
//! stdin, streams stdout/stderr to the console and the agent's log file, and
//! enforces a timeout with SIGTERM → grace period → SIGKILL escalation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::agent_log::AgentLog;
use crate::error::{PipelineError, Result};

/// Time a process gets to exit after SIGTERM before it is killed.
pub const GRACE_PERIOD: Duration = Duration::from_secs(1);

/// How long output readers may keep running after the process is gone.
/// Grandchildren that inherited the pipes would otherwise hold them open.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type SharedLog = Arc<Mutex<AgentLog>>;

/// A fully resolved command line for one agent run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to execute
    pub command: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// When set, stdout (or stderr if stdout is blank) is written to this
    /// file after a successful run
    pub capture_output: Option<PathBuf>,
}

impl Invocation {
    /// An invocation without output capture.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            capture_output: None,
        }
    }

    /// The command line as shown in logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) || arg.is_empty() {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Per-run options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum wall-clock time; `None` waits forever
    pub timeout: Option<Duration>,
    /// Report a nonzero exit as success (with a warning)
    pub allow_non_zero_exit: bool,
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own with this code
    Exited(i32),
    /// Killed by a signal we did not send
    Signaled,
    /// Exceeded its timeout and was terminated
    TimedOut,
    /// Terminated because shutdown was requested
    Interrupted,
}

/// Result of a single subprocess invocation
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// How the process ended
    pub termination: Termination,
    /// Captured stdout (raw, control sequences intact)
    pub stdout: String,
    /// Captured stderr (raw, control sequences intact)
    pub stderr: String,
    /// Wall-clock time from spawn to exit
    pub elapsed: Duration,
}

impl ProcessOutcome {
    /// Exit code, if the process exited on its own.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ConsoleMirror {
    Off,
    Stdout,
    Stderr,
}

impl ConsoleMirror {
    fn write(self, text: &str) {
        match self {
            Self::Off => {}
            Self::Stdout => print!("{text}"),
            Self::Stderr => eprint!("{text}"),
        }
    }
}

/// Runs agent commands inside the project root
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    working_dir: PathBuf,
    log_dir: Option<PathBuf>,
    mirror_console: bool,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ProcessRunner {
    /// Create a runner that spawns every command in `working_dir`.
    ///
    /// No per-agent log files are written and output is not mirrored until
    /// configured with [`Self::with_log_dir`] and [`Self::with_console_mirror`].
    #[must_use]
    pub fn new<P: Into<PathBuf>>(working_dir: P) -> Self {
        Self {
            working_dir: working_dir.into(),
            log_dir: None,
            mirror_console: false,
            shutdown: None,
        }
    }

    /// Append every invocation to `<log_dir>/<agent>.log`.
    #[must_use]
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, log_dir: P) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    /// Echo child output to this process's stdout/stderr.
    #[must_use]
    pub const fn with_console_mirror(mut self, enabled: bool) -> Self {
        self.mirror_console = enabled;
        self
    }

    /// Observe a shutdown flag. Once it turns `true`, new runs are refused and
    /// a running child is terminated.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Directory commands are spawned in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// A handle on the shutdown flag, if one is observed.
    #[must_use]
    pub fn shutdown_receiver(&self) -> Option<watch::Receiver<bool>> {
        self.shutdown.clone()
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run an agent command to completion and classify the result.
    ///
    /// Exit code 0 (or any code with `allow_non_zero_exit`) resolves to the
    /// outcome. A timeout, a nonzero exit, termination by a foreign signal,
    /// a spawn failure or an interruption are errors. Log file problems are
    /// reported as warnings and never change the result.
    pub async fn run(
        &self,
        agent: &str,
        invocation: &Invocation,
        input: &str,
        options: &RunOptions,
    ) -> Result<ProcessOutcome> {
        let log = self.open_log(agent, invocation);

        let result = self
            .spawn_and_wait(agent, invocation, input, options, log.clone())
            .await
            .and_then(|outcome| classify(agent, invocation, options, outcome));

        if let Some(log) = &log {
            let failure = result.as_ref().err().map(ToString::to_string);
            if let Err(e) = lock_log(log).and_then(|mut l| l.write_footer(failure.as_deref())) {
                warn!(agent, err = %e, "failed to write log footer");
            }
        }

        if let (Ok(outcome), Some(path)) = (&result, &invocation.capture_output) {
            capture_to_file(agent, outcome, path);
        }

        result
    }

    fn open_log(&self, agent: &str, invocation: &Invocation) -> Option<SharedLog> {
        let log_dir = self.log_dir.as_ref()?;
        match AgentLog::open(log_dir, agent) {
            Ok(mut log) => {
                if let Err(e) = log.write_header(agent, &invocation.command_line()) {
                    warn!(agent, err = %e, "failed to write log header");
                }
                info!(agent, log = %log.path().display(), "logging agent output");
                Some(Arc::new(Mutex::new(log)))
            }
            Err(e) => {
                warn!(agent, err = %e, "agent log unavailable, continuing without it");
                None
            }
        }
    }

    async fn spawn_and_wait(
        &self,
        agent: &str,
        invocation: &Invocation,
        input: &str,
        options: &RunOptions,
        log: Option<SharedLog>,
    ) -> Result<ProcessOutcome> {
        if self.shutdown_requested() {
            return Err(PipelineError::Interrupted);
        }

        let mut cmd = Command::new(&invocation.command);
        cmd.args(&invocation.args)
            .current_dir(&self.working_dir)
            .stdin(if input.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so termination reaches whatever the agent spawned.
        #[cfg(unix)]
        cmd.process_group(0);

        if self.mirror_console {
            eprintln!("\n$ {}", invocation.command_line());
        }
        debug!(agent, command = %invocation.command_line(), "spawning agent process");

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| {
            error!(agent, command = %invocation.command, err = %source, "failed to spawn");
            PipelineError::Spawn {
                agent: agent.to_string(),
                command: invocation.command.clone(),
                source,
            }
        })?;
        let pid = child.id();

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = input.as_bytes().to_vec();
            let agent_id = agent.to_string();
            debug!(agent, chars = input.len(), "sending prompt");
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&prompt).await {
                    warn!(agent = %agent_id, err = %e, "failed to write prompt to stdin");
                }
                // Dropping stdin closes the pipe
            });
        }

        let (stdout_mirror, stderr_mirror) = if self.mirror_console {
            (ConsoleMirror::Stdout, ConsoleMirror::Stderr)
        } else {
            (ConsoleMirror::Off, ConsoleMirror::Off)
        };
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump(out, stdout_mirror, log.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump(err, stderr_mirror, log)));

        let timeout_elapsed = async {
            match options.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let termination = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| PipelineError::io("wait for agent process", e))?;
                status.code().map_or(Termination::Signaled, Termination::Exited)
            }
            () = timeout_elapsed => {
                warn!(agent, timeout_ms = options.timeout.unwrap_or_default().as_millis(), "agent timed out, terminating");
                terminate_process(&mut child, pid).await;
                Termination::TimedOut
            }
            () = wait_for_shutdown(self.shutdown.clone()) => {
                warn!(agent, "shutdown requested, terminating agent");
                terminate_process(&mut child, pid).await;
                Termination::Interrupted
            }
        };

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        let elapsed = start.elapsed();

        debug!(agent, ?termination, elapsed_ms = elapsed.as_millis(), "agent process finished");
        Ok(ProcessOutcome {
            termination,
            stdout,
            stderr,
            elapsed,
        })
    }
}

fn classify(
    agent: &str,
    invocation: &Invocation,
    options: &RunOptions,
    outcome: ProcessOutcome,
) -> Result<ProcessOutcome> {
    match outcome.termination {
        Termination::Exited(0) => Ok(outcome),
        Termination::Exited(code) if options.allow_non_zero_exit => {
            warn!(agent, command = %invocation.command, code, "nonzero exit tolerated");
            Ok(outcome)
        }
        Termination::Exited(code) => Err(PipelineError::NonZeroExit {
            agent: agent.to_string(),
            command: invocation.command.clone(),
            code,
        }),
        Termination::Signaled => Err(PipelineError::Killed {
            agent: agent.to_string(),
            command: invocation.command.clone(),
        }),
        Termination::TimedOut => Err(PipelineError::Timeout {
            agent: agent.to_string(),
            command: invocation.command.clone(),
            timeout: options.timeout.unwrap_or_default(),
        }),
        Termination::Interrupted => Err(PipelineError::Interrupted),
    }
}

fn lock_log(log: &SharedLog) -> anyhow::Result<std::sync::MutexGuard<'_, AgentLog>> {
    log.lock()
        .map_err(|_| anyhow::anyhow!("agent log lock poisoned"))
}

/// Copy command output into the artifact it stands in for.
fn capture_to_file(agent: &str, outcome: &ProcessOutcome, path: &Path) {
    let output = if outcome.stdout.trim().is_empty() {
        &outcome.stderr
    } else {
        &outcome.stdout
    };
    if output.trim().is_empty() {
        warn!(agent, path = %path.display(), "no output to capture");
        return;
    }
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(agent, err = %e, "failed to create capture directory");
            return;
        }
    }
    match std::fs::write(path, output) {
        Ok(()) => info!(agent, path = %path.display(), "captured output"),
        Err(e) => warn!(agent, path = %path.display(), err = %e, "failed to write captured output"),
    }
}

/// Forward a child stream line by line to the console and log, returning
/// everything that was read.
async fn pump<R>(reader: R, mirror: ConsoleMirror, log: Option<SharedLog>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(err = %e, "failed to read agent output");
                break;
            }
        }

        let text = String::from_utf8_lossy(&line);
        mirror.write(&text);
        if let Some(log) = &log {
            if let Err(e) = lock_log(log).and_then(|mut l| l.write_output(&text)) {
                warn!(err = %e, "failed to write agent output to log");
            }
        }
        captured.extend_from_slice(&line);
    }

    String::from_utf8_lossy(&captured).into_owned()
}

async fn drain(task: Option<JoinHandle<String>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    let abort = task.abort_handle();
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(err = %e, "output reader task failed");
            String::new()
        }
        Err(_) => {
            warn!("output stream still open after exit, abandoning reader");
            abort.abort();
            String::new()
        }
    }
}

/// Resolve once `shutdown` turns `true`. Never resolves without a receiver.
pub(crate) async fn wait_for_shutdown(shutdown: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = shutdown {
        if rx.wait_for(|requested| *requested).await.is_ok() {
            return;
        }
    }
    // No shutdown source, or its sender is gone: never fires
    std::future::pending::<()>().await;
}

/// SIGTERM the process group, give it `GRACE_PERIOD`, then SIGKILL.
///
/// The group is killed even when its leader exited during the grace period:
/// a descendant that ignores SIGTERM would otherwise outlive the run.
async fn terminate_process(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        signal_group(pid, libc::SIGTERM);
    }
    #[cfg(not(unix))]
    let _ = (child.start_kill(), pid);

    let leader_exited = tokio::time::timeout(GRACE_PERIOD, child.wait())
        .await
        .is_ok();
    if !leader_exited {
        warn!("grace period expired, sending SIGKILL");
    }

    #[cfg(unix)]
    if let Some(pid) = pid {
        signal_group(pid, libc::SIGKILL);
    }
    if !leader_exited {
        if let Err(e) = child.kill().await {
            debug!(err = %e, "kill after grace period");
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group the child leads.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(-pgid, signal) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the whole group is already gone
        if err.raw_os_error() != Some(libc::ESRCH) {
            debug!(pid, signal, err = %err, "failed to signal process group");
        }
    }
}
