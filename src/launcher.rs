//! Local launcher for the receiver plus a public tunnel
//!
//! Starts the service, confirms it bound its port after a fixed delay, then
//! starts the tunnel tool. Both children are terminated when the launcher is
//! interrupted or either child exits: SIGTERM first, SIGKILL once the stop
//! timeout runs out.

use std::{
    env,
    future::Future,
    path::{Path, PathBuf},
    process::ExitStatus,
    time::Duration,
};

#[cfg(unix)]
use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    process::{Child, Command},
};
use tracing::{info, warn};

use crate::config::{non_empty_var, parse_port};

pub const DEFAULT_TUNNEL_COMMAND: &str = "ngrok";
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const SERVICE_BINARY: &str = "webhook-balancer";

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub port: u16,
    pub service_command: PathBuf,
    pub service_args: Vec<String>,
    pub tunnel_command: String,
    pub tunnel_args: Vec<String>,
    pub startup_delay: Duration,
    pub stop_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("{0} must be a whole number of seconds")]
    InvalidDelay(&'static str),
    #[error("cannot locate the launcher executable: {0}")]
    CurrentExe(std::io::Error),
    #[error("{0} is not installed or not on PATH")]
    MissingTool(String),
    #[error("port {0} is already in use")]
    PortInUse(u16),
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("service did not bind port {0} within the startup window")]
    StartupFailed(u16),
}

impl LaunchConfig {
    pub fn from_env() -> Result<Self, LaunchError> {
        dotenvy::dotenv().ok();

        let port = parse_port(non_empty_var("PORT")).map_err(|_| LaunchError::InvalidPort)?;
        let service_command = match non_empty_var("SERVICE_COMMAND") {
            Some(command) => PathBuf::from(command),
            None => default_service_command()?,
        };
        let service_args = split_args(non_empty_var("SERVICE_ARGS"));
        let tunnel_command =
            non_empty_var("TUNNEL_COMMAND").unwrap_or_else(|| DEFAULT_TUNNEL_COMMAND.to_string());
        let tunnel_args = match non_empty_var("TUNNEL_ARGS") {
            Some(args) => split_args(Some(args)),
            None => vec!["http".to_string(), port.to_string()],
        };
        let startup_delay = seconds_var("STARTUP_DELAY_SECS")?.unwrap_or(DEFAULT_STARTUP_DELAY);
        let stop_timeout = seconds_var("STOP_TIMEOUT_SECS")?.unwrap_or(DEFAULT_STOP_TIMEOUT);

        Ok(Self {
            port,
            service_command,
            service_args,
            tunnel_command,
            tunnel_args,
            startup_delay,
            stop_timeout,
        })
    }
}

fn seconds_var(name: &'static str) -> Result<Option<Duration>, LaunchError> {
    non_empty_var(name)
        .map(|value| {
            value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| LaunchError::InvalidDelay(name))
        })
        .transpose()
}

fn default_service_command() -> Result<PathBuf, LaunchError> {
    let current = env::current_exe().map_err(LaunchError::CurrentExe)?;
    Ok(current.with_file_name(format!("{SERVICE_BINARY}{}", env::consts::EXE_SUFFIX)))
}

fn split_args(value: Option<String>) -> Vec<String> {
    value
        .map(|args| args.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Resolves `command` the way a shell would: paths are checked directly,
/// bare names are searched for on `PATH`. Only executable files count.
pub fn find_executable(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(command))
        .find(|full| is_executable(full))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

pub async fn port_in_use(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}

pub struct Launcher {
    config: LaunchConfig,
}

impl Launcher {
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }

    pub async fn start(&self) -> Result<RunningProcesses, LaunchError> {
        let tunnel_path = find_executable(&self.config.tunnel_command)
            .ok_or_else(|| LaunchError::MissingTool(self.config.tunnel_command.clone()))?;

        if port_in_use(self.config.port).await {
            return Err(LaunchError::PortInUse(self.config.port));
        }

        let mut service = spawn(
            Command::new(&self.config.service_command)
                .args(&self.config.service_args)
                .env("PORT", self.config.port.to_string()),
            &self.config.service_command.display().to_string(),
        )?;
        info!(pid = service.id(), port = self.config.port, "service started");

        let stop_timeout = self.config.stop_timeout;
        tokio::time::sleep(self.config.startup_delay).await;
        if !port_in_use(self.config.port).await {
            terminate(&mut service, "service", stop_timeout).await;
            return Err(LaunchError::StartupFailed(self.config.port));
        }

        let tunnel = match spawn(
            Command::new(&tunnel_path).args(&self.config.tunnel_args),
            &self.config.tunnel_command,
        ) {
            Ok(tunnel) => tunnel,
            Err(err) => {
                terminate(&mut service, "service", stop_timeout).await;
                return Err(err);
            }
        };
        info!(pid = tunnel.id(), command = %self.config.tunnel_command, "tunnel started");

        Ok(RunningProcesses {
            service,
            tunnel,
            stop_timeout,
        })
    }
}

fn spawn(command: &mut Command, label: &str) -> Result<Child, LaunchError> {
    command
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            command: label.to_string(),
            source,
        })
}

/// Asks the child to stop with SIGTERM and waits up to `grace` before
/// falling back to SIGKILL.
async fn terminate(child: &mut Child, label: &str, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(_)) => return,
                Ok(Err(err)) => {
                    warn!(process = label, error = %err, "failed to wait for process");
                }
                Err(_) => {
                    warn!(process = label, grace_ms = grace.as_millis(), "process ignored SIGTERM");
                }
            },
            Err(err) => warn!(process = label, error = %err, "failed to send SIGTERM"),
        }
    }

    if let Err(err) = child.kill().await {
        warn!(process = label, error = %err, "failed to kill process");
    }
}

/// Why supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    Interrupted,
    ChildExited(&'static str),
}

pub struct RunningProcesses {
    service: Child,
    tunnel: Child,
    stop_timeout: Duration,
}

impl RunningProcesses {
    pub fn service_pid(&self) -> Option<u32> {
        self.service.id()
    }

    pub fn tunnel_pid(&self) -> Option<u32> {
        self.tunnel.id()
    }

    /// Blocks until `shutdown` resolves or a child exits, then stops both.
    pub async fn supervise(mut self, shutdown: impl Future<Output = ()>) -> SupervisorExit {
        let exit = tokio::select! {
            _ = shutdown => SupervisorExit::Interrupted,
            status = self.service.wait() => {
                log_exit("service", status);
                SupervisorExit::ChildExited("service")
            }
            status = self.tunnel.wait() => {
                log_exit("tunnel", status);
                SupervisorExit::ChildExited("tunnel")
            }
        };
        self.shutdown().await;
        exit
    }

    pub async fn shutdown(&mut self) {
        terminate(&mut self.service, "service", self.stop_timeout).await;
        terminate(&mut self.tunnel, "tunnel", self.stop_timeout).await;
        info!("service and tunnel stopped");
    }
}

fn log_exit(label: &str, status: std::io::Result<ExitStatus>) {
    match status {
        Ok(status) => warn!(process = label, %status, "process exited"),
        Err(err) => warn!(process = label, error = %err, "failed to wait for process"),
    }
}
