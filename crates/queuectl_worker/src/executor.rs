use crate::lifecycle::Outcome;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs `command` through the platform shell and waits for it to exit.
///
/// Only an exit status of `0` counts as success. A non-zero status, death by
/// signal and a command that cannot even be started are all failures.
///
/// The child process is killed if the returned future is dropped, which is
/// what happens when a worker is aborted after its shutdown grace period.
pub async fn run_command(command: &str) -> Outcome {
    let output = shell(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            debug!(stdout = %String::from_utf8_lossy(&output.stdout).trim_end(), "Command succeeded");
            Outcome::Success
        }
        Ok(output) => {
            debug!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                "Command failed"
            );
            Outcome::Failure
        }
        Err(error) => {
            warn!(%error, "Failed to start command");
            Outcome::Failure
        }
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut shell = Command::new("sh");
    shell.arg("-c").arg(command);
    shell
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut shell = Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}
