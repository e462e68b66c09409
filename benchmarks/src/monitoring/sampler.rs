//! Background resource sampling for one service session

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SamplingSettings;
use crate::monitoring::gpu::GpuQuery;
use crate::monitoring::stats::SessionStats;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One point-in-time host reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub gpu_util: f64,
    pub gpu_memory_mb: f64,
    pub gpu_temp_c: f64,
}

/// Samples CPU, memory and GPU on a fixed interval until stopped
///
/// The first sample is taken as soon as the loop starts and [`stop`] waits
/// for an in-flight reading, so every started session has at least one
/// sample.
///
/// [`stop`]: ResourceSampler::stop
pub struct ResourceSampler {
    interval: Duration,
    gpu: Arc<GpuQuery>,
    samples: Arc<RwLock<Vec<Sample>>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ResourceSampler {
    /// Build a sampler, checking for GPU tooling once
    pub async fn new(settings: &SamplingSettings) -> Self {
        let gpu = GpuQuery::detect(&settings.gpu_command).await;
        Self::with_gpu(settings.interval(), gpu)
    }

    pub fn with_gpu(interval: Duration, gpu: GpuQuery) -> Self {
        Self {
            interval,
            gpu: Arc::new(gpu),
            samples: Arc::new(RwLock::new(Vec::new())),
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn gpu_available(&self) -> bool {
        self.gpu.is_available()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Begin a new session, discarding samples from any previous one
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Resource sampler already running, ignoring start");
            return;
        }

        self.samples = Arc::new(RwLock::new(Vec::new()));
        self.cancel = CancellationToken::new();

        let handle = tokio::spawn(sampling_loop(
            self.interval,
            self.gpu.clone(),
            self.samples.clone(),
            self.cancel.clone(),
        ));
        self.handle = Some(handle);

        debug!(interval_ms = self.interval.as_millis() as u64, "Resource sampling started");
    }

    /// Snapshot of the samples collected so far
    pub async fn samples(&self) -> Vec<Sample> {
        self.samples.read().await.clone()
    }

    /// Stop sampling and aggregate the session
    ///
    /// Waits for an in-flight reading to finish so the result covers every
    /// sample the loop took. Calling this on an idle sampler returns the
    /// aggregate of the last session.
    pub async fn stop(&mut self) -> SessionStats {
        self.cancel.cancel();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Resource sampling task ended abnormally: {}", e);
            }
        }

        let samples = self.samples.read().await;
        debug!(samples = samples.len(), "Resource sampling stopped");
        SessionStats::from_samples(&samples, self.interval, self.gpu.is_available())
    }
}

impl Drop for ResourceSampler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn sampling_loop(
    interval: Duration,
    gpu: Arc<GpuQuery>,
    samples: Arc<RwLock<Vec<Sample>>>,
    cancel: CancellationToken,
) {
    let mut system = System::new();
    system.refresh_cpu();
    system.refresh_memory();
    // CPU usage is a delta between two refreshes
    time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;

    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let sample = read_sample(&mut system, &gpu).await;
        samples.write().await.push(sample);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
    }
}

async fn read_sample(system: &mut System, gpu: &GpuQuery) -> Sample {
    system.refresh_cpu();
    system.refresh_memory();

    let total = system.total_memory() as f64;
    let used = system.used_memory() as f64;
    let memory_percent = if total > 0.0 { used / total * 100.0 } else { 0.0 };

    let reading = gpu.read().await;

    Sample {
        timestamp: Utc::now(),
        cpu_percent: finite_or_zero(system.global_cpu_info().cpu_usage() as f64),
        memory_percent: finite_or_zero(memory_percent),
        memory_used_gb: used / BYTES_PER_GB,
        memory_total_gb: total / BYTES_PER_GB,
        gpu_util: finite_or_zero(reading.utilization_percent),
        gpu_memory_mb: finite_or_zero(reading.memory_used_mb),
        gpu_temp_c: finite_or_zero(reading.temperature_c),
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
