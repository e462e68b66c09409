//! Lifecycle control for the services under test

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::client::TtsClient;
use crate::config::ServiceDefinition;
use crate::error::ServiceError;

/// Starts, stops and health-checks one service
#[allow(async_fn_in_trait)]
pub trait ServiceController {
    async fn start(&self, service: &ServiceDefinition) -> Result<(), ServiceError>;

    async fn stop(&self, service: &ServiceDefinition) -> Result<(), ServiceError>;

    async fn is_healthy(&self, service: &ServiceDefinition) -> bool;
}

/// Services deployed with `docker compose` from their working directory
#[derive(Clone)]
pub struct DockerComposeController {
    client: TtsClient,
    program: String,
}

impl DockerComposeController {
    pub fn new(client: TtsClient) -> Self {
        Self {
            client,
            program: "docker".to_string(),
        }
    }

    /// Use a different container CLI (`podman`, a wrapper script)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn compose(&self, service: &ServiceDefinition, args: &[&str]) -> Result<(), ServiceError> {
        if !service.directory.is_dir() {
            return Err(ServiceError::MissingDirectory {
                path: service.directory.display().to_string(),
            });
        }

        let command = format!("{} compose {}", self.program, args.join(" "));
        debug!(service = %service.id, dir = %service.directory.display(), "Running `{}`", command);

        let output = Command::new(&self.program)
            .arg("compose")
            .args(args)
            .current_dir(&service.directory)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ServiceError::CommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ServiceError::NonZeroExit {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

impl ServiceController for DockerComposeController {
    async fn start(&self, service: &ServiceDefinition) -> Result<(), ServiceError> {
        info!(service = %service.id, "Starting service containers");
        self.compose(service, &["up", "-d"]).await
    }

    async fn stop(&self, service: &ServiceDefinition) -> Result<(), ServiceError> {
        info!(service = %service.id, "Stopping service containers");
        self.compose(service, &["down"]).await
    }

    async fn is_healthy(&self, service: &ServiceDefinition) -> bool {
        self.client.is_healthy(service).await
    }
}

/// Services that are already running; lifecycle calls are no-ops
#[derive(Clone)]
pub struct ExternalController {
    client: TtsClient,
}

impl ExternalController {
    pub fn new(client: TtsClient) -> Self {
        Self { client }
    }
}

impl ServiceController for ExternalController {
    async fn start(&self, service: &ServiceDefinition) -> Result<(), ServiceError> {
        debug!(service = %service.id, "External service, skipping start");
        Ok(())
    }

    async fn stop(&self, service: &ServiceDefinition) -> Result<(), ServiceError> {
        debug!(service = %service.id, "External service, skipping stop");
        Ok(())
    }

    async fn is_healthy(&self, service: &ServiceDefinition) -> bool {
        self.client.is_healthy(service).await
    }
}

/// Either controller, chosen at runtime
#[derive(Clone)]
pub enum AnyController {
    Compose(DockerComposeController),
    External(ExternalController),
}

impl AnyController {
    pub fn for_mode(client: TtsClient, external: bool) -> Self {
        if external {
            AnyController::External(ExternalController::new(client))
        } else {
            AnyController::Compose(DockerComposeController::new(client))
        }
    }
}

impl ServiceController for AnyController {
    async fn start(&self, service: &ServiceDefinition) -> Result<(), ServiceError> {
        match self {
            AnyController::Compose(c) => c.start(service).await,
            AnyController::External(c) => c.start(service).await,
        }
    }

    async fn stop(&self, service: &ServiceDefinition) -> Result<(), ServiceError> {
        match self {
            AnyController::Compose(c) => c.stop(service).await,
            AnyController::External(c) => c.stop(service).await,
        }
    }

    async fn is_healthy(&self, service: &ServiceDefinition) -> bool {
        match self {
            AnyController::Compose(c) => c.is_healthy(service).await,
            AnyController::External(c) => c.is_healthy(service).await,
        }
    }
}

/// Whether `program args..` runs and exits successfully
pub async fn tool_available(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
