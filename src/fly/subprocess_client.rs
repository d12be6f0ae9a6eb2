//! Fly CLI subprocess client

use crate::fly::{FlyError, OutputMode};
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Client for executing the fly CLI as a subprocess
#[derive(Debug, Clone)]
pub struct FlySubprocessClient {
    /// Path to fly executable
    binary: String,
}

impl FlySubprocessClient {
    /// Create a new subprocess client
    ///
    /// # Arguments
    /// * `binary` - Path to fly executable (e.g., "fly", "/usr/local/bin/fly")
    pub fn new(binary: String) -> Self {
        Self { binary }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run fly and wait for it to exit
    ///
    /// stdin and stderr are inherited so interactive `set-pipeline` prompts
    /// still reach the operator. No timeout is applied.
    ///
    /// # Errors
    /// Returns `FlyError::NotInstalled` when the executable cannot be found,
    /// and `FlyError::Io` for any other spawn failure. A non-zero exit is not
    /// an error here; the exit code is returned to the caller.
    pub async fn run(&self, args: &[String], output: OutputMode) -> Result<i32, FlyError> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let mut command = Command::new(&self.binary);
        command.args(args);
        if output == OutputMode::Quiet {
            command.stdout(Stdio::null());
        }

        let status = command.status().await.map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                FlyError::NotInstalled {
                    binary: self.binary.clone(),
                }
            } else {
                FlyError::Io {
                    binary: self.binary.clone(),
                    source,
                }
            }
        })?;

        // terminated by a signal
        let code = status.code().unwrap_or(-1);
        if code != 0 {
            warn!("{} {} exited with code {}", self.binary, args.first().map(String::as_str).unwrap_or(""), code);
        }
        Ok(code)
    }
}
