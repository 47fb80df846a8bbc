use std::process::ExitCode;

use tracing::{error, info};
use webhook_balancer::{
    launcher::{LaunchConfig, Launcher, SupervisorExit},
    logging,
    signals::shutdown_signal,
};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logging("info");

    let config = match LaunchConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid launcher configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        port = config.port,
        service = %config.service_command.display(),
        tunnel = %config.tunnel_command,
        "launching service and tunnel"
    );

    let running = match Launcher::new(config).start().await {
        Ok(running) => running,
        Err(err) => {
            error!(error = %err, "launch aborted");
            return ExitCode::FAILURE;
        }
    };

    info!("press Ctrl-C to stop the service and tunnel");
    match running.supervise(shutdown_signal()).await {
        SupervisorExit::Interrupted => ExitCode::SUCCESS,
        SupervisorExit::ChildExited(process) => {
            error!(process, "child exited on its own, launcher stopped");
            ExitCode::FAILURE
        }
    }
}
