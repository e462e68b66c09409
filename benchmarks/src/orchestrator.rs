//! Runs the configured services one at a time and collects the comparison

use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::TtsClient;
use crate::config::{HarnessConfig, ServiceDefinition};
use crate::controller::ServiceController;
use crate::error::{HarnessError, Result, ServiceError};
use crate::monitoring::{HostInfo, ResourceSampler};
use crate::report::{ComparisonReport, ServiceEntry};
use crate::runner::ServiceTestRunner;

/// Lifecycle of one service within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Pending,
    Starting,
    FailedToStart,
    Running,
    Testing,
    Stopping,
    Completed,
}

impl ServiceState {
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, FailedToStart)
                | (Starting, Running)
                | (Running, Testing)
                | (Testing, Stopping)
                | (Stopping, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceState::FailedToStart | ServiceState::Completed)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Pending => "pending",
            ServiceState::Starting => "starting",
            ServiceState::FailedToStart => "failed_to_start",
            ServiceState::Running => "running",
            ServiceState::Testing => "testing",
            ServiceState::Stopping => "stopping",
            ServiceState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Tracks one service's state, rejecting illegal transitions
#[derive(Debug)]
pub struct Lifecycle {
    service: String,
    state: ServiceState,
}

impl Lifecycle {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            state: ServiceState::Pending,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn advance(&mut self, next: ServiceState) -> std::result::Result<(), ServiceError> {
        if !self.state.can_transition_to(next) {
            return Err(ServiceError::IllegalTransition {
                service: self.service.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}

pub struct ComparisonOrchestrator<C> {
    config: HarnessConfig,
    runner: ServiceTestRunner<C>,
    host: HostInfo,
}

impl<C: ServiceController> ComparisonOrchestrator<C> {
    /// Body captures go to `<output_dir>/captures`
    pub fn new(config: HarnessConfig, controller: C, client: TtsClient) -> Self {
        let capture_dir: PathBuf = config.report.output_dir.join("captures");
        let runner = ServiceTestRunner::new(controller, client, config.runner.clone(), capture_dir);

        Self {
            config,
            runner,
            host: HostInfo::detect(),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Process every service in order
    ///
    /// A service that fails to start is recorded and the run moves on. When
    /// `shutdown` fires the active service is torn down and the run ends with
    /// [`HarnessError::Interrupted`].
    pub async fn run(&self, shutdown: CancellationToken) -> Result<ComparisonReport> {
        let test_ids = self.config.tests.iter().map(|t| t.id.clone()).collect();
        let mut report = ComparisonReport::new(&self.config.report.title, self.host.clone(), test_ids);

        info!(
            services = self.config.services.len(),
            tests = self.config.tests.len(),
            "Starting comparison run"
        );

        for (index, service) in self.config.services.iter().enumerate() {
            if shutdown.is_cancelled() {
                return Err(HarnessError::Interrupted);
            }

            info!(
                service = %service.id,
                "[{}/{}] Processing {}",
                index + 1,
                self.config.services.len(),
                service.name
            );

            let mut sampler = ResourceSampler::new(&self.config.sampling).await;

            let outcome = tokio::select! {
                entry = self.run_service(service, &mut sampler) => Some(entry),
                _ = shutdown.cancelled() => None,
            };

            match outcome {
                Some(entry) => report.push(entry?),
                None => {
                    self.teardown_after_interrupt(service, &mut sampler).await;
                    return Err(HarnessError::Interrupted);
                }
            }
        }

        report.finalize();
        info!(
            completed = report.completed().count(),
            total = report.services.len(),
            "Comparison run finished"
        );

        Ok(report)
    }

    async fn run_service(&self, service: &ServiceDefinition, sampler: &mut ResourceSampler) -> Result<ServiceEntry> {
        let mut lifecycle = Lifecycle::new(&service.id);
        let started_at = Utc::now();

        lifecycle.advance(ServiceState::Starting)?;
        if let Err(e) = self.runner.start_service(service).await {
            error!(service = %service.id, "Service failed to start: {}", e);
            lifecycle.advance(ServiceState::FailedToStart)?;
            // containers may be half up
            self.runner.stop_service(service).await;
            return Ok(ServiceEntry::failed_to_start(service, e.to_string(), started_at));
        }
        lifecycle.advance(ServiceState::Running)?;

        sampler.start();
        info!(service = %service.id, gpu = sampler.gpu_available(), "Resource sampling started");
        lifecycle.advance(ServiceState::Testing)?;
        let run = self.runner.run_tests(service, &self.config.tests).await;
        let resources = sampler.stop().await;

        lifecycle.advance(ServiceState::Stopping)?;
        self.runner.stop_service(service).await;
        lifecycle.advance(ServiceState::Completed)?;

        let passed = run.results.iter().filter(|r| r.success).count();
        info!(
            service = %service.id,
            passed,
            total = run.results.len(),
            script_passed = ?run.test_script.available.then_some(run.test_script.success),
            samples = resources.sample_count,
            "Service completed"
        );

        Ok(ServiceEntry::completed(service, run, resources, started_at))
    }

    async fn teardown_after_interrupt(&self, service: &ServiceDefinition, sampler: &mut ResourceSampler) {
        warn!(service = %service.id, "Interrupted, tearing down active service");
        sampler.stop().await;
        if let Err(e) = self.runner.controller().stop(service).await {
            warn!(service = %service.id, "Teardown after interrupt failed: {}", e);
        }
    }
}
