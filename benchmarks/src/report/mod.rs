//! Aggregate comparison results and their rendering

pub mod artifacts;
pub mod charts;
pub mod renderer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ServiceDefinition;
use crate::monitoring::{HostInfo, SessionStats};
use crate::runner::{ServiceRun, TestResult};
use crate::script::ScriptOutcome;
use crate::utils::stats;

pub use artifacts::{copy_artifacts, plan_copies, PlannedCopy};
pub use renderer::{ReportPaths, ReportRenderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Completed,
    FailedToStart,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Completed => "completed",
            ServiceStatus::FailedToStart => "failed_to_start",
        }
    }
}

/// Everything recorded for one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub status: ServiceStatus,
    pub error: Option<String>,
    pub health: Option<serde_json::Value>,
    pub voices: Option<serde_json::Value>,
    pub results: Vec<TestResult>,
    /// Absent when the service never reached the battery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_script: Option<ScriptOutcome>,
    pub resources: SessionStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub id: String,
    pub name: String,
    pub status: ServiceStatus,
    pub total_tests: usize,
    pub successful_tests: usize,
    pub success_rate: f64,
    pub avg_synthesis_time: Option<f64>,
    pub min_synthesis_time: Option<f64>,
    pub max_synthesis_time: Option<f64>,
    pub p95_synthesis_time: Option<f64>,
}

/// One test case across every service that ran it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestTypeSummary {
    pub test_id: String,
    pub category: String,
    pub total_tests: usize,
    pub successful_tests: usize,
    pub success_rate: f64,
    pub avg_synthesis_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_services: usize,
    pub completed_services: usize,
    pub failed_services: usize,
    pub total_tests: usize,
    pub successful_tests: usize,
    pub success_rate: f64,
    pub services: Vec<ServiceSummary>,
    pub by_test_type: Vec<TestTypeSummary>,
}

/// Results of one comparison run, ordered by processing order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub host: HostInfo,
    pub test_ids: Vec<String>,
    pub services: Vec<ServiceEntry>,
    pub summary: Option<RunSummary>,
}

impl ServiceEntry {
    pub fn completed(
        service: &ServiceDefinition,
        run: ServiceRun,
        resources: SessionStats,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: service.id.clone(),
            name: service.name.clone(),
            base_url: service.base_url.clone(),
            status: ServiceStatus::Completed,
            error: None,
            health: run.health,
            voices: run.voices,
            results: run.results,
            test_script: Some(run.test_script),
            resources,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failed_to_start(service: &ServiceDefinition, error: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id: service.id.clone(),
            name: service.name.clone(),
            base_url: service.base_url.clone(),
            status: ServiceStatus::FailedToStart,
            error: Some(error),
            health: None,
            voices: None,
            results: Vec::new(),
            test_script: None,
            resources: SessionStats::default(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn successful_tests(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn summary(&self) -> ServiceSummary {
        let times: Vec<f64> = self
            .results
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.synthesis_time)
            .collect();
        let successful = self.successful_tests();

        ServiceSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            total_tests: self.results.len(),
            successful_tests: successful,
            success_rate: rate(successful, self.results.len()),
            avg_synthesis_time: stats::mean(&times),
            min_synthesis_time: stats::min(&times),
            max_synthesis_time: stats::max(&times),
            p95_synthesis_time: stats::percentile(&times, 95.0),
        }
    }
}

impl ComparisonReport {
    pub fn new(title: impl Into<String>, host: HostInfo, test_ids: Vec<String>) -> Self {
        Self {
            title: title.into(),
            started_at: Utc::now(),
            finished_at: None,
            host,
            test_ids,
            services: Vec::new(),
            summary: None,
        }
    }

    /// Record a service, replacing an earlier entry with the same id in place
    pub fn push(&mut self, entry: ServiceEntry) {
        match self.services.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.services.push(entry),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ServiceEntry> {
        self.services.iter().find(|e| e.id == id)
    }

    pub fn completed(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.services
            .iter()
            .filter(|e| e.status == ServiceStatus::Completed)
    }

    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Per test case totals in battery order; cases nobody ran are left out
    pub fn test_type_summaries(&self) -> Vec<TestTypeSummary> {
        self.test_ids
            .iter()
            .filter_map(|test_id| {
                let results: Vec<&TestResult> = self
                    .services
                    .iter()
                    .flat_map(|e| e.results.iter())
                    .filter(|r| &r.test_id == test_id)
                    .collect();
                let first = results.first()?;

                let successful: Vec<&TestResult> = results.iter().copied().filter(|r| r.success).collect();
                let times: Vec<f64> = successful.iter().filter_map(|r| r.synthesis_time).collect();

                Some(TestTypeSummary {
                    test_id: test_id.clone(),
                    category: first.category.clone(),
                    total_tests: results.len(),
                    successful_tests: successful.len(),
                    success_rate: rate(successful.len(), results.len()),
                    avg_synthesis_time: stats::mean(&times),
                })
            })
            .collect()
    }

    /// Stamp the end time and compute the summary
    pub fn finalize(&mut self) {
        let services: Vec<ServiceSummary> = self.services.iter().map(ServiceEntry::summary).collect();
        let total_tests = services.iter().map(|s| s.total_tests).sum();
        let successful_tests = services.iter().map(|s| s.successful_tests).sum();
        let completed_services = self.completed().count();

        self.summary = Some(RunSummary {
            total_services: self.services.len(),
            completed_services,
            failed_services: self.services.len() - completed_services,
            total_tests,
            successful_tests,
            success_rate: rate(successful_tests, total_tests),
            services,
            by_test_type: self.test_type_summaries(),
        });
        self.finished_at = Some(Utc::now());
    }
}

fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
