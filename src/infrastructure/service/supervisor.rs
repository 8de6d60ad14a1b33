use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use sysinfo::{Pid, Signal, System};

/// Lifecycle of the external transcription service process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// No recorded process, or the recorded one is gone.
    Absent,
    /// Process exists but the health endpoint does not answer yet (the
    /// model is still loading).
    Starting { pid: u32 },
    /// Process exists and the health endpoint answers.
    Ready { pid: u32 },
    /// Termination has been requested and the process has not exited yet.
    Stopping { pid: u32 },
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Absent => f.write_str("absent"),
            ServiceState::Starting { pid } => write!(f, "starting (pid {})", pid),
            ServiceState::Ready { pid } => write!(f, "ready (pid {})", pid),
            ServiceState::Stopping { pid } => write!(f, "stopping (pid {})", pid),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("service already running with pid {0}")]
    AlreadyRunning(u32),
    #[error("failed to spawn service process: {0}")]
    SpawnFailed(String),
    #[error("service process {pid} not healthy after {}s", .timeout.as_secs())]
    StartTimedOut { pid: u32, timeout: Duration },
    #[error("service process {pid} did not exit within {}s", .timeout.as_secs())]
    StopTimedOut { pid: u32, timeout: Duration },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supervises the transcription service process through a PID file:
/// liveness by process lookup, readiness by health probe. A PID file whose
/// process is gone is treated as stale and removed.
pub struct ServiceSupervisor {
    pid_file: PathBuf,
    log_file: PathBuf,
    health_url: String,
    client: reqwest::Client,
}

impl ServiceSupervisor {
    pub fn new(state_dir: &Path, service_url: &str) -> Self {
        Self {
            pid_file: state_dir.join("callscribe-service.pid"),
            log_file: state_dir.join("callscribe-service.log"),
            health_url: format!("{}/health", service_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.pid_file)
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    fn process_alive(pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_processes();
        system.process(Pid::from_u32(pid)).is_some()
    }

    async fn healthy(&self) -> bool {
        self.client
            .get(&self.health_url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    pub async fn status(&self) -> Result<ServiceState, SupervisorError> {
        let Some(pid) = self.read_pid() else {
            return Ok(ServiceState::Absent);
        };
        if !Self::process_alive(pid) {
            tracing::warn!(pid, "Stale pid file, removing");
            let _ = std::fs::remove_file(&self.pid_file);
            return Ok(ServiceState::Absent);
        }
        if self.healthy().await {
            Ok(ServiceState::Ready { pid })
        } else {
            Ok(ServiceState::Starting { pid })
        }
    }

    /// Spawn the service detached, record its PID, and wait until the
    /// health endpoint answers. Output goes to the supervisor's log file.
    pub async fn start(
        &self,
        program: &Path,
        args: &[String],
        wait: Duration,
    ) -> Result<u32, SupervisorError> {
        match self.status().await? {
            ServiceState::Ready { pid } | ServiceState::Starting { pid } => {
                return Err(SupervisorError::AlreadyRunning(pid));
            }
            _ => {}
        }

        if let Some(parent) = self.pid_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;
        let pid = child.id();
        std::fs::write(&self.pid_file, pid.to_string())?;
        tracing::info!(
            pid,
            log = %self.log_file.display(),
            "Service process spawned, waiting for readiness"
        );

        let deadline = tokio::time::Instant::now() + wait;
        let mut delay = Duration::from_millis(500);
        while tokio::time::Instant::now() < deadline {
            if self.healthy().await {
                tracing::info!(pid, "Service is ready");
                return Ok(pid);
            }
            if !Self::process_alive(pid) {
                let _ = std::fs::remove_file(&self.pid_file);
                return Err(SupervisorError::SpawnFailed(format!(
                    "process exited during startup, see {}",
                    self.log_file.display()
                )));
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(5));
        }
        Err(SupervisorError::StartTimedOut { pid, timeout: wait })
    }

    /// Signal the recorded process and wait for it to exit.
    pub async fn stop(&self, wait: Duration) -> Result<ServiceState, SupervisorError> {
        let Some(pid) = self.read_pid() else {
            return Ok(ServiceState::Absent);
        };

        {
            let mut system = System::new();
            system.refresh_processes();
            let Some(process) = system.process(Pid::from_u32(pid)) else {
                let _ = std::fs::remove_file(&self.pid_file);
                return Ok(ServiceState::Absent);
            };
            tracing::info!(pid, "Stopping service process");
            if process.kill_with(Signal::Term).is_none() {
                // platform without SIGTERM support
                process.kill();
            }
        }

        let deadline = tokio::time::Instant::now() + wait;
        while tokio::time::Instant::now() < deadline {
            if !Self::process_alive(pid) {
                let _ = std::fs::remove_file(&self.pid_file);
                tracing::info!(pid, "Service stopped");
                return Ok(ServiceState::Absent);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Err(SupervisorError::StopTimedOut { pid, timeout: wait })
    }
}
