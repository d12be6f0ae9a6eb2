//! Fly client for talking to Concourse
//!
//! All orchestrator interaction goes through the `fly` CLI. The
//! [`FlyRunner`] trait is the seam tests replace with a recording double.

pub mod command;
pub mod subprocess_client;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

pub use command::{FlyCommand, OutputMode};
pub use subprocess_client::FlySubprocessClient;

/// Errors raised before fly could report an exit code
#[derive(Debug, Error)]
pub enum FlyError {
    #[error("Unable to execute fly command ({binary}). Is it installed?")]
    NotInstalled { binary: String },

    #[error("Failed to run {binary}: {source}")]
    Io {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact path {} is not valid UTF-8", path.display())]
    NonUtf8Path { path: PathBuf },
}

/// Trait for running fly - allows for different implementations
#[async_trait]
pub trait FlyRunner: Send + Sync {
    /// Run fly with the given arguments and return its exit code
    ///
    /// The call completes only when the process has exited.
    async fn run(&self, args: &[String], output: OutputMode) -> Result<i32, FlyError>;
}

/// Configuration for the fly client
#[derive(Debug, Clone, Default)]
pub struct FlyClientConfig {
    /// Path to the fly executable; defaults to "fly" on PATH
    pub binary: Option<String>,
}

impl FlyClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: String) -> Self {
        self.binary = Some(binary);
        self
    }
}

/// Fly client that calls the fly CLI as a subprocess
#[derive(Debug, Clone)]
pub struct FlyClient {
    subprocess_client: FlySubprocessClient,
}

impl FlyClient {
    pub fn new(config: FlyClientConfig) -> Self {
        let binary = config.binary.unwrap_or_else(|| "fly".to_string());
        Self {
            subprocess_client: FlySubprocessClient::new(binary),
        }
    }
}

#[async_trait]
impl FlyRunner for FlyClient {
    async fn run(&self, args: &[String], output: OutputMode) -> Result<i32, FlyError> {
        self.subprocess_client.run(args, output).await
    }
}
