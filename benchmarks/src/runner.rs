//! Drives one service through start, health polling, the test battery and stop

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::{self, AudioAnalysis};
use crate::client::{SynthesisBody, SynthesisOutcome, SynthesisResponse, TtsClient};
use crate::config::{RunnerSettings, ServiceDefinition, TestCase};
use crate::controller::ServiceController;
use crate::error::{Result, ServiceError};
use crate::script::{self, ScriptOutcome};

/// How an artifact was tied to its request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    /// The response named the file
    Named,
    /// The response body was the audio
    Body,
    /// Newest recent file in the debug directory
    Recent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub capture: CaptureMethod,
    /// Name of the copy under the report's audio directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copied_file: Option<String>,
}

impl ArtifactRef {
    fn new(path: PathBuf, capture: CaptureMethod) -> Self {
        Self {
            path,
            capture,
            copied_file: None,
        }
    }
}

/// Outcome of one synthesis request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub service_id: String,
    pub test_id: String,
    pub request_id: String,
    pub success: bool,
    /// Seconds from request to fully read response; `None` when no response arrived
    pub synthesis_time: Option<f64>,
    pub error: Option<String>,
    pub artifact: Option<ArtifactRef>,
    pub text_length: usize,
    pub category: String,
    pub description: String,
    pub audio_duration: Option<f64>,
    pub sample_rate: Option<u32>,
    pub model: Option<String>,
    pub audio_analysis: Option<AudioAnalysis>,
    pub timestamp: DateTime<Utc>,
}

/// Everything collected from a healthy service
#[derive(Debug, Clone, Default)]
pub struct ServiceRun {
    pub health: Option<serde_json::Value>,
    pub voices: Option<serde_json::Value>,
    pub results: Vec<TestResult>,
    pub test_script: ScriptOutcome,
}

pub struct ServiceTestRunner<C> {
    controller: C,
    client: TtsClient,
    settings: RunnerSettings,
    capture_dir: PathBuf,
}

impl TestResult {
    fn pending(service: &ServiceDefinition, test: &TestCase, request_id: &Uuid) -> Self {
        Self {
            service_id: service.id.clone(),
            test_id: test.id.clone(),
            request_id: request_id.to_string(),
            success: false,
            synthesis_time: None,
            error: None,
            artifact: None,
            text_length: test.text.chars().count(),
            category: test.category.clone(),
            description: test.description.clone(),
            audio_duration: None,
            sample_rate: None,
            model: None,
            audio_analysis: None,
            timestamp: Utc::now(),
        }
    }
}

impl<C: ServiceController> ServiceTestRunner<C> {
    /// `capture_dir` receives audio returned directly in response bodies
    pub fn new(controller: C, client: TtsClient, settings: RunnerSettings, capture_dir: PathBuf) -> Self {
        Self {
            controller,
            client,
            settings,
            capture_dir,
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Start the service and wait until it reports healthy
    ///
    /// Health is polled every poll interval, the first check one interval
    /// after the start command returns, until the startup ceiling elapses.
    pub async fn start_service(&self, service: &ServiceDefinition) -> std::result::Result<(), ServiceError> {
        self.controller.start(service).await?;

        let poll = self.settings.health_poll_interval();
        let ceiling = self.settings.startup_timeout();
        let deadline = Instant::now() + ceiling;

        info!(service = %service.id, "Waiting for service to become healthy");
        loop {
            time::sleep(poll).await;

            if self.controller.is_healthy(service).await {
                info!(service = %service.id, "Service is healthy");
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(ServiceError::HealthTimeout {
                    service: service.id.clone(),
                    waited_secs: ceiling.as_secs(),
                });
            }
            debug!(service = %service.id, "Service not healthy yet");
        }
    }

    /// Capture the service documents, run the battery, then the service's own test script
    ///
    /// With parallel workers configured, results arrive in completion order.
    pub async fn run_tests(&self, service: &ServiceDefinition, tests: &[TestCase]) -> ServiceRun {
        let health = match self.client.health_document(service).await {
            Ok(document) => Some(document),
            Err(e) => {
                warn!(service = %service.id, "Could not fetch health document: {}", e);
                None
            }
        };
        let voices = self.client.voices_document(service).await;

        let results: Vec<TestResult> = match self.settings.parallel_workers {
            Some(workers) if workers > 1 && tests.len() > 1 => {
                debug!(service = %service.id, workers, "Running tests in parallel");
                stream::iter(tests)
                    .map(|test| self.run_test(service, test))
                    .buffer_unordered(workers)
                    .collect()
                    .await
            }
            _ => {
                let mut results = Vec::with_capacity(tests.len());
                for test in tests {
                    results.push(self.run_test(service, test).await);
                }
                results
            }
        };

        let test_script = script::run_test_script(service, &self.settings).await;

        ServiceRun {
            health,
            voices,
            results,
            test_script,
        }
    }

    /// One synthesis request; failures land in the result, never as errors
    pub async fn run_test(&self, service: &ServiceDefinition, test: &TestCase) -> TestResult {
        let request_id = Uuid::new_v4();
        let mut result = TestResult::pending(service, test, &request_id);

        info!(service = %service.id, test = %test.id, request_id = %request_id, "Running synthesis test");

        match self.client.synthesize(service, test, &request_id).await {
            Ok(outcome) => self.record_outcome(service, test, &request_id, outcome, &mut result).await,
            Err(e) => {
                warn!(service = %service.id, test = %test.id, category = e.category(), "Synthesis failed: {}", e);
                result.error = Some(e.to_string());
            }
        }

        if self.settings.analyze_audio && result.success {
            result.audio_analysis = analyze_artifact(service, test, result.artifact.as_ref()).await;
        }

        result
    }

    /// Ask the controller to stop the service, then wait out the grace period
    pub async fn stop_service(&self, service: &ServiceDefinition) {
        if let Err(e) = self.controller.stop(service).await {
            warn!(service = %service.id, "Failed to stop service: {}", e);
        }
        time::sleep(self.settings.teardown_grace()).await;
    }

    async fn record_outcome(
        &self,
        service: &ServiceDefinition,
        test: &TestCase,
        request_id: &Uuid,
        outcome: SynthesisOutcome,
        result: &mut TestResult,
    ) {
        let elapsed = outcome.elapsed.as_secs_f64();
        result.synthesis_time = Some(elapsed);

        match outcome.body {
            Err(e) => {
                warn!(service = %service.id, test = %test.id, category = e.category(), "Synthesis failed: {}", e);
                result.error = Some(e.to_string());
                return;
            }
            Ok(SynthesisBody::Json(response)) => {
                self.record_json(service, response, result).await;
            }
            Ok(SynthesisBody::Audio { bytes, content_type }) => {
                result.success = true;
                let ext = SynthesisBody::audio_extension(&content_type);
                match self.save_body(service, test, request_id, &bytes, ext).await {
                    Ok(path) => {
                        result.artifact = Some(ArtifactRef::new(path, CaptureMethod::Body))
                    }
                    Err(e) => warn!(service = %service.id, test = %test.id, "Could not save audio body: {}", e),
                }
            }
        }

        if result.success {
            info!(service = %service.id, test = %test.id, synthesis_time = elapsed, "Synthesis succeeded");
        } else {
            warn!(service = %service.id, test = %test.id, "Service reported synthesis failure");
        }
    }

    async fn record_json(&self, service: &ServiceDefinition, response: SynthesisResponse, result: &mut TestResult) {
        result.success = response.success;
        result.audio_duration = response.audio_duration;
        result.sample_rate = response.sample_rate;
        result.model = response.model;

        if !response.success {
            result.error = Some(
                response
                    .error
                    .unwrap_or_else(|| "service reported failure".to_string()),
            );
            return;
        }

        let debug_dir = service.debug_audio_path();
        let named = match response.debug_audio_file.as_deref() {
            Some(name) => named_artifact(&debug_dir, name).await,
            None => None,
        };

        result.artifact = match named {
            Some(path) => Some(ArtifactRef::new(path, CaptureMethod::Named)),
            None => newest_recent_wav(&debug_dir, self.settings.artifact_window())
                .await
                .map(|path| ArtifactRef::new(path, CaptureMethod::Recent)),
        };
    }

    async fn save_body(
        &self,
        service: &ServiceDefinition,
        test: &TestCase,
        request_id: &Uuid,
        bytes: &[u8],
        ext: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.capture_dir).await?;
        let path = self
            .capture_dir
            .join(format!("{}_{}_{}.{}", service.id, test.id, request_id, ext));
        fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// Measure a captured WAV artifact off the async runtime
async fn analyze_artifact(
    service: &ServiceDefinition,
    test: &TestCase,
    artifact: Option<&ArtifactRef>,
) -> Option<AudioAnalysis> {
    let path = artifact.map(|a| a.path.clone()).filter(|p| audio::is_wav(p))?;

    match tokio::task::spawn_blocking(move || AudioAnalysis::from_file(&path)).await {
        Ok(Ok(analysis)) => Some(analysis),
        Ok(Err(e)) => {
            warn!(service = %service.id, test = %test.id, "Audio analysis failed: {}", e);
            None
        }
        Err(e) => {
            warn!(service = %service.id, test = %test.id, "Audio analysis task failed: {}", e);
            None
        }
    }
}

/// Resolve a file named by the service against its debug directory
async fn named_artifact(debug_dir: &Path, name: &str) -> Option<PathBuf> {
    let named = Path::new(name);
    if named.is_absolute() && fs::metadata(named).await.is_ok() {
        return Some(named.to_path_buf());
    }

    let candidate = debug_dir.join(named.file_name()?);
    match fs::metadata(&candidate).await {
        Ok(meta) if meta.is_file() => Some(candidate),
        _ => {
            debug!(file = %candidate.display(), "Named artifact not found");
            None
        }
    }
}

/// Newest `*.wav` in `dir` modified within `window`
///
/// This is a weak correlation: with parallel workers or a shared debug
/// directory it can pick another request's file. Only the newest file is
/// kept since a result stands for exactly one request.
pub async fn newest_recent_wav(dir: &Path, window: Duration) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).await.ok()?;
    let now = SystemTime::now();
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !audio::is_wav(&path) {
            continue;
        }

        let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age >= window {
            continue;
        }

        if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
            newest = Some((modified, path));
        }
    }

    newest.map(|(_, path)| path)
}
