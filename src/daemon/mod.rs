//! The background process that polls rooms and dispatches events.
//!
//! [`Daemon::run_foreground`] owns the pid file for as long as the poll loop
//! runs. [`Daemon::spawn_detached`] and [`Daemon::stop`] control that process
//! from a separate invocation of the binary.

pub mod pid_file;
pub mod poller;
pub mod state;

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::DaemonConfig;
use crate::error::{Error, Result};
use crate::session::Session;

pub use pid_file::{PidFile, is_process_alive, read_pid};
pub use poller::{Backoff, CycleReport, Poller, StopSignal};
pub use state::{DaemonState, Lifecycle};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);
const START_TIMEOUT: Duration = Duration::from_secs(10);
const WAIT_STEP: Duration = Duration::from_millis(100);

/// Controls one daemon, identified by its pid file.
#[derive(Debug)]
pub struct Daemon {
    pid_path: PathBuf,
    poll_interval: Duration,
    lifecycle: Lifecycle,
}

impl Daemon {
    /// A daemon using `pid_path` that polls every `poll_interval`.
    pub fn new(pid_path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            pid_path: pid_path.into(),
            poll_interval,
            lifecycle: Lifecycle::new(),
        }
    }

    /// A daemon with the configured pid file and poll interval.
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(config.pid_file_path(), config.poll_interval())
    }

    /// The pid file.
    pub fn pid_path(&self) -> &Path {
        &self.pid_path
    }

    /// Current lifecycle state of this controller.
    pub fn state(&self) -> DaemonState {
        self.lifecycle.state()
    }

    /// Pid of a live daemon, if one holds the pid file.
    pub fn running_pid(&self) -> Option<u32> {
        read_pid(&self.pid_path).filter(|pid| is_process_alive(*pid))
    }

    /// Poll every room of `session` until `stop` fires.
    ///
    /// The pid file is claimed before the first poll and removed only after
    /// the loop has returned.
    pub async fn run_foreground(&mut self, session: &mut Session, stop: &StopSignal) -> Result<()> {
        self.lifecycle.transition(DaemonState::Starting)?;
        let pid_file = match PidFile::acquire(&self.pid_path) {
            Ok(pid_file) => pid_file,
            Err(err) => {
                self.lifecycle.transition(DaemonState::Stopped)?;
                return Err(err);
            }
        };
        let targets = session.poll_targets();
        tracing::info!(
            pid = std::process::id(),
            rooms = targets.len(),
            interval_secs = self.poll_interval.as_secs_f64(),
            "daemon started"
        );
        let mut poller = Poller::new(targets, self.poll_interval);
        self.lifecycle.transition(DaemonState::Running)?;

        poller.run(session.dispatcher_mut(), stop).await;

        self.lifecycle.transition(DaemonState::Stopping)?;
        let released = pid_file.release();
        self.lifecycle.transition(DaemonState::Stopped)?;
        tracing::info!("daemon stopped");
        released
    }

    /// Re-run the current binary as `start --detach=false` in the background
    /// and wait until it has claimed the pid file.
    pub async fn spawn_detached(&self, config_path: &Path) -> Result<u32> {
        if let Some(pid) = self.running_pid() {
            return Err(Error::already_running(pid));
        }
        let exe = std::env::current_exe()?;
        let mut command = Command::new(exe);
        command
            .arg("--config")
            .arg(config_path)
            .arg("start")
            .arg("--detach=false")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn()?;
        let deadline = Instant::now() + START_TIMEOUT;
        loop {
            if let Some(pid) = self.running_pid() {
                if pid == child.id() {
                    return Ok(pid);
                }
            }
            if let Some(status) = child.try_wait()? {
                return Err(Error::not_running(format!(
                    "daemon exited during startup ({status}); see the daemon log"
                )));
            }
            if Instant::now() >= deadline {
                return Err(Error::timeout(
                    "daemon did not write its pid file",
                    Some(START_TIMEOUT.as_secs_f64()),
                ));
            }
            tokio::time::sleep(WAIT_STEP).await;
        }
    }

    /// Send SIGTERM to the running daemon and wait for it to remove its pid
    /// file.
    ///
    /// A pid file naming a dead process is removed and reported as
    /// [`Error::NotRunning`].
    pub async fn stop(&self) -> Result<u32> {
        let Some(pid) = read_pid(&self.pid_path) else {
            return Err(Error::not_running(format!(
                "no pid file at {}",
                self.pid_path.display()
            )));
        };
        if !is_process_alive(pid) {
            if let Err(err) = std::fs::remove_file(&self.pid_path) {
                tracing::warn!(path = %self.pid_path.display(), error = %err, "stale pid file not removed");
            }
            return Err(Error::not_running(format!("process {pid} is gone")));
        }
        terminate(pid)?;
        let deadline = Instant::now() + STOP_TIMEOUT;
        while self.pid_path.exists() {
            if Instant::now() >= deadline {
                return Err(Error::timeout(
                    format!("daemon {pid} did not exit"),
                    Some(STOP_TIMEOUT.as_secs_f64()),
                ));
            }
            tokio::time::sleep(WAIT_STEP).await;
        }
        Ok(pid)
    }
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<()> {
    let target = libc::pid_t::try_from(pid)
        .map_err(|_| Error::validation(format!("invalid pid {pid}"), None))?;
    // SAFETY: kill has no memory-safety preconditions.
    if unsafe { libc::kill(target, libc::SIGTERM) } != 0 {
        let err = std::io::Error::last_os_error();
        return Err(Error::io(format!("signalling {pid}: {err}"), err));
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(pid: u32) -> Result<()> {
    Err(Error::not_running(format!("cannot signal {pid} on this platform")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::event::Event;
    use crate::session::Account;
    use crate::testing::{MockApi, message};
    use crate::types::MessageType;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn session_with(api: &Arc<MockApi>) -> Session {
        let mut session = Session::new();
        session
            .add_account(Account::new("acme", true, api.clone()).with_room("watercooler", None))
            .unwrap();
        session
    }

    #[tokio::test]
    async fn pid_file_lives_exactly_as_long_as_the_loop() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("kindling.pid");
        let api = Arc::new(MockApi::new("acme"));
        api.push_poll("watercooler", Ok(Vec::new()));
        api.push_poll(
            "watercooler",
            Ok(vec![message(5, MessageType::TextMessage, "shutdown please")]),
        );

        let stop = StopSignal::new();
        let observed = Arc::new(Mutex::new(None));
        let mut session = session_with(&api);
        {
            let stop = stop.clone();
            let observed = Arc::clone(&observed);
            let pid_path = pid_path.clone();
            session
                .dispatcher_mut()
                .listen("stopper", move |event: &Event| -> Result<()> {
                    *observed.lock().unwrap() = Some((event.text().to_string(), pid_path.exists()));
                    stop.stop();
                    Ok(())
                });
        }

        let mut daemon = Daemon::new(&pid_path, Duration::from_millis(5));
        daemon.run_foreground(&mut session, &stop).await.unwrap();

        assert_eq!(
            *observed.lock().unwrap(),
            Some(("shutdown please".to_string(), true))
        );
        assert!(!pid_path.exists());
        assert_eq!(daemon.state(), DaemonState::Stopped);
    }

    #[tokio::test]
    async fn start_fails_on_live_pid_file() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("kindling.pid");
        std::fs::write(&pid_path, format!("{}\n", std::process::id())).unwrap();
        let api = Arc::new(MockApi::new("acme"));
        let mut session = session_with(&api);
        let mut daemon = Daemon::new(&pid_path, Duration::from_millis(5));
        let err = daemon
            .run_foreground(&mut session, &StopSignal::new())
            .await
            .unwrap_err();
        assert!(err.is_already_running());
        assert!(pid_path.exists());
        assert!(api.polls().is_empty());
        assert_eq!(daemon.state(), DaemonState::Stopped);
        assert_eq!(daemon.running_pid(), Some(std::process::id()));
    }

    #[tokio::test]
    async fn stop_without_daemon_is_not_running() {
        let dir = TempDir::new().unwrap();
        let daemon = Daemon::new(dir.path().join("kindling.pid"), Duration::from_secs(5));
        assert!(daemon.stop().await.unwrap_err().is_not_running());
        assert_eq!(daemon.running_pid(), None);
    }

    #[tokio::test]
    async fn stop_cleans_stale_pid_file() {
        let dir = TempDir::new().unwrap();
        let pid_path = dir.path().join("kindling.pid");
        std::fs::write(&pid_path, "999999999\n").unwrap();
        let daemon = Daemon::new(&pid_path, Duration::from_secs(5));
        assert!(daemon.stop().await.unwrap_err().is_not_running());
        assert!(!pid_path.exists());
    }

    #[test]
    fn from_config_uses_paths() {
        let config = DaemonConfig {
            pid_file: Some(PathBuf::from("/run/kindling/test.pid")),
            ..DaemonConfig::default()
        };
        let daemon = Daemon::from_config(&config);
        assert_eq!(daemon.pid_path(), Path::new("/run/kindling/test.pid"));
        assert_eq!(daemon.state(), DaemonState::Stopped);
    }
}
