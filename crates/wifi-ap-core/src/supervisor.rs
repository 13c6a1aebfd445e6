//! Access-point process supervisor.
//!
//! Owns at most one running instance of the access-point program. A waiter
//! task holds the [`Child`] for its whole life: it reaps the process, turns
//! control requests into signals, and publishes the running/stopped state.
//! The supervisor itself only keeps the waiter's handle, so a pid is never
//! signalled after it has been reaped.
//!
//! `start`, `stop`, and `restart` are serialized on one async lock. A
//! restart holds that lock across its stop and its start, so two concurrent
//! restarts always leave exactly one child alive. Stops and restarts run on
//! a spawned task, so a caller dropped mid-transition never strands a
//! half-stopped child.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a stopping process gets between SIGTERM and SIGKILL.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Whether a supervised process is currently alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Running,
}

/// Program and arguments of the supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Errors from the process supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Background process is already running")]
    AlreadyRunning,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("process waiter failed: {0}")]
    Waiter(String),
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Terminate,
    Kill,
}

struct ChildHandle {
    pid: Option<u32>,
    control_tx: mpsc::UnboundedSender<Control>,
    waiter: JoinHandle<Option<ExitStatus>>,
}

/// Supervises a single access-point process.
pub struct Supervisor {
    inner: Arc<Inner>,
}

/// State shared between the supervisor and its lifecycle tasks.
struct Inner {
    spec: ProcessSpec,
    grace_period: Duration,
    child: Mutex<Option<ChildHandle>>,
    state: Arc<watch::Sender<ProcessState>>,
}

impl Supervisor {
    pub fn new(spec: ProcessSpec) -> Self {
        Self::with_grace_period(spec, STOP_GRACE_PERIOD)
    }

    /// Supervisor whose stops wait `grace_period` before SIGKILL.
    pub fn with_grace_period(spec: ProcessSpec, grace_period: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                spec,
                grace_period,
                child: Mutex::new(None),
                state: Arc::new(watch::Sender::new(ProcessState::Stopped)),
            }),
        }
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.inner.spec
    }

    pub fn state(&self) -> ProcessState {
        self.inner.state()
    }

    /// Whether the process is alive. Never blocks on a running start/stop.
    pub fn running(&self) -> bool {
        self.inner.running()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.inner.state.subscribe()
    }

    /// Pid of the live child, if any.
    pub async fn pid(&self) -> Option<u32> {
        let child = self.inner.child.lock().await;
        if !self.running() {
            return None;
        }
        child.as_ref().and_then(|handle| handle.pid)
    }

    /// Launch the process. Fails if one is already running.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let mut child = self.inner.child.lock().await;
        self.inner.start_locked(&mut child)
    }

    /// Terminate the process, escalating to SIGKILL after the grace period.
    ///
    /// Stopping an already stopped supervisor succeeds. The stop runs on its
    /// own task and completes even if the returned future is dropped.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let inner = Arc::clone(&self.inner);
        join_lifecycle(tokio::spawn(async move {
            let mut child = inner.child.lock().await;
            inner.stop_locked(&mut child).await
        }))
        .await
    }

    /// Stop then start. The start is skipped if the stop fails.
    ///
    /// Like [`Supervisor::stop`], the restart finishes even if the returned
    /// future is dropped.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        let inner = Arc::clone(&self.inner);
        join_lifecycle(tokio::spawn(async move {
            let mut child = inner.child.lock().await;
            info!(program = %inner.spec.program.display(), "Restarting access point process");
            inner.stop_locked(&mut child).await?;
            inner.start_locked(&mut child)
        }))
        .await
    }
}

async fn join_lifecycle(
    task: JoinHandle<Result<(), SupervisorError>>,
) -> Result<(), SupervisorError> {
    task.await
        .map_err(|e| SupervisorError::Waiter(e.to_string()))?
}

impl Inner {
    fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    fn running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    fn start_locked(&self, slot: &mut Option<ChildHandle>) -> Result<(), SupervisorError> {
        if self.running() {
            return Err(SupervisorError::AlreadyRunning);
        }
        if let Some(exited) = slot.take() {
            debug!(pid = ?exited.pid, "Discarding handle of exited process");
        }

        let child = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: self.spec.program.clone(),
                source,
            })?;

        let pid = child.id();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.state.send_replace(ProcessState::Running);
        let waiter = tokio::spawn(wait_for_exit(child, control_rx, Arc::clone(&self.state)));

        info!(pid = ?pid, program = %self.spec.program.display(), "Access point process started");
        *slot = Some(ChildHandle {
            pid,
            control_tx,
            waiter,
        });
        Ok(())
    }

    async fn stop_locked(&self, slot: &mut Option<ChildHandle>) -> Result<(), SupervisorError> {
        let Some(handle) = slot.as_mut() else {
            debug!("Access point process already stopped");
            return Ok(());
        };

        info!(pid = ?handle.pid, "Stopping access point process");
        // Fails only when the waiter is already gone, i.e. the child exited.
        handle.control_tx.send(Control::Terminate).ok();

        let joined = match tokio::time::timeout(self.grace_period, &mut handle.waiter).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    pid = ?handle.pid,
                    grace_ms = self.grace_period.as_millis() as u64,
                    "Access point process ignored SIGTERM, killing"
                );
                handle.control_tx.send(Control::Kill).ok();
                (&mut handle.waiter).await
            }
        };
        let pid = handle.pid;
        // The waiter has been joined; only now is the handle safe to drop.
        *slot = None;
        self.state.send_replace(ProcessState::Stopped);

        match joined {
            Ok(status) => {
                info!(pid = ?pid, status = ?status, "Access point process stopped");
                Ok(())
            }
            Err(e) => Err(SupervisorError::Waiter(e.to_string())),
        }
    }
}

async fn wait_for_exit(
    mut child: Child,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    state: Arc<watch::Sender<ProcessState>>,
) -> Option<ExitStatus> {
    let exited = loop {
        tokio::select! {
            exited = child.wait() => break exited,
            Some(control) = control_rx.recv() => match control {
                Control::Terminate => terminate(&child),
                Control::Kill => {
                    if let Err(e) = child.start_kill() {
                        warn!(error = %e, "Failed to kill access point process");
                    }
                }
            },
        }
    };
    state.send_replace(ProcessState::Stopped);

    match exited {
        Ok(status) => {
            debug!(%status, "Access point process exited");
            Some(status)
        }
        Err(e) => {
            warn!(error = %e, "Failed to wait for access point process");
            None
        }
    }
}

fn terminate(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
        warn!(pid, error = %e, "Failed to send SIGTERM to access point process");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::time::{Instant, sleep};

    fn sleeper() -> ProcessSpec {
        ProcessSpec::new("sleep").with_args(["1000"])
    }

    fn shell(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh").with_args(["-c", script])
    }

    fn alive(pid: u32) -> bool {
        !matches!(
            signal::kill(Pid::from_raw(pid as i32), None),
            Err(Errno::ESRCH)
        )
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..250 {
            if check() {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        check()
    }

    fn pids_in(path: &Path) -> Vec<u32> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .collect()
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let supervisor = Supervisor::new(sleeper());
        assert!(!supervisor.running());

        supervisor.start().await.unwrap();
        assert!(supervisor.running());
        let pid = supervisor.pid().await.unwrap();
        assert!(alive(pid));

        supervisor.stop().await.unwrap();
        assert!(!supervisor.running());
        assert_eq!(supervisor.pid().await, None);
        assert!(!alive(pid));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let supervisor = Supervisor::new(sleeper());
        supervisor.start().await.unwrap();

        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyRunning));
        assert!(supervisor.running());

        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let supervisor = Supervisor::new(sleeper());
        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_replaces_process() {
        let supervisor = Supervisor::new(sleeper());
        supervisor.start().await.unwrap();
        let first = supervisor.pid().await.unwrap();

        supervisor.restart().await.unwrap();
        let second = supervisor.pid().await.unwrap();
        assert_ne!(first, second);
        assert!(!alive(first));
        assert!(alive(second));

        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_from_stopped_starts() {
        let supervisor = Supervisor::new(sleeper());
        supervisor.restart().await.unwrap();
        assert!(supervisor.running());
        supervisor.stop().await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_concurrent_restarts_leave_one_child() {
        let tmp = TempDir::new().unwrap();
        let pid_file = tmp.path().join("pids");
        let script = format!("echo $$ >> '{}'; exec sleep 1000", pid_file.display());
        let supervisor = Arc::new(Supervisor::new(shell(&script)));
        supervisor.start().await.unwrap();

        let (a, b) = tokio::join!(supervisor.restart(), supervisor.restart());
        a.unwrap();
        b.unwrap();
        assert!(supervisor.running());

        assert!(eventually(|| pids_in(&pid_file).len() == 3).await);
        let pids = pids_in(&pid_file);
        let live: Vec<u32> = pids.iter().copied().filter(|p| alive(*p)).collect();
        assert_eq!(live.len(), 1);
        assert_eq!(Some(live[0]), supervisor.pid().await);

        supervisor.stop().await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_stop_escalates_to_sigkill() {
        let tmp = TempDir::new().unwrap();
        let ready = tmp.path().join("ready");
        let script = format!("trap '' TERM; touch '{}'; exec sleep 1000", ready.display());
        let supervisor = Supervisor::with_grace_period(shell(&script), Duration::from_millis(200));
        supervisor.start().await.unwrap();
        assert!(eventually(|| ready.exists()).await);
        let pid = supervisor.pid().await.unwrap();

        let started = Instant::now();
        supervisor.stop().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(!supervisor.running());
        assert!(!alive(pid));
    }

    #[test_log::test(tokio::test)]
    async fn test_dropped_restart_still_completes() {
        let tmp = TempDir::new().unwrap();
        let pid_file = tmp.path().join("pids");
        let ready = tmp.path().join("ready");
        let script = format!(
            "echo $$ >> '{}'; trap '' TERM; touch '{}'; exec sleep 1000",
            pid_file.display(),
            ready.display()
        );
        let supervisor = Supervisor::with_grace_period(shell(&script), Duration::from_millis(500));
        supervisor.start().await.unwrap();
        assert!(eventually(|| ready.exists()).await);
        let first = supervisor.pid().await.unwrap();

        // Give up on the restart while it is still waiting out the grace period.
        let abandoned = tokio::time::timeout(Duration::from_millis(100), supervisor.restart()).await;
        assert!(abandoned.is_err());

        supervisor.restart().await.unwrap();
        assert!(supervisor.running());
        assert!(!alive(first));

        assert!(eventually(|| pids_in(&pid_file).len() == 3).await);
        let live: Vec<u32> = pids_in(&pid_file)
            .into_iter()
            .filter(|p| alive(*p))
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(Some(live[0]), supervisor.pid().await);

        supervisor.stop().await.unwrap();
        assert!(!supervisor.running());
        assert!(!alive(live[0]));
    }

    #[tokio::test]
    async fn test_natural_exit_allows_restart() {
        let supervisor = Supervisor::new(ProcessSpec::new("true"));
        supervisor.start().await.unwrap();
        assert!(eventually(|| !supervisor.running()).await);

        supervisor.start().await.unwrap();
        assert!(eventually(|| !supervisor.running()).await);
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_stopped() {
        let supervisor = Supervisor::new(ProcessSpec::new("/nonexistent/wifi-ap/ap.sh"));
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert!(!supervisor.running());
    }

    #[tokio::test]
    async fn test_state_changes_are_observable() {
        let supervisor = Supervisor::new(sleeper());
        let mut rx = supervisor.subscribe();

        supervisor.start().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ProcessState::Running);

        supervisor.stop().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ProcessState::Stopped);
    }
}
