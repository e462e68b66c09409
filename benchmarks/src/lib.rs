//! TTS service comparison harness
//!
//! Starts containerized text-to-speech services one at a time, drives a fixed
//! battery of synthesis requests against each, samples host resources while
//! the battery runs, and renders the collected results as HTML and JSON:
//!
//! - [`monitoring::ResourceSampler`]: background CPU / memory / GPU sampling
//! - [`runner::ServiceTestRunner`]: start, health polling, tests, stop
//! - [`orchestrator::ComparisonOrchestrator`]: the sequential run over services
//! - [`report::ReportRenderer`]: report files, charts and audio artifact layout
//! - [`script`]: service-provided test scripts
//! - [`audio`]: level and silence statistics of captured WAV files

pub mod audio;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod monitoring;
pub mod orchestrator;
pub mod preflight;
pub mod report;
pub mod runner;
pub mod script;
pub mod utils;

pub use audio::AudioAnalysis;
pub use client::TtsClient;
pub use config::{HarnessConfig, ServiceDefinition, TestCase};
pub use controller::{AnyController, DockerComposeController, ExternalController, ServiceController};
pub use error::{ConfigError, HarnessError, Result, ServiceError};
pub use monitoring::{HostInfo, ResourceSampler, SessionStats};
pub use orchestrator::{ComparisonOrchestrator, ServiceState};
pub use report::{ComparisonReport, ReportRenderer, ServiceEntry, ServiceStatus};
pub use runner::{ServiceTestRunner, TestResult};
pub use script::ScriptOutcome;
