//! Aggregation of a sampling session

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::monitoring::sampler::Sample;
use crate::utils::stats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub peak_gb: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuSummary {
    pub available: bool,
    pub util_avg: f64,
    pub util_max: f64,
    pub memory_avg: f64,
    pub memory_max: f64,
    pub temp_max: f64,
}

/// Resource usage over one monitoring session
///
/// A session without samples is a valid value: `sample_count == 0` and every
/// metric is zero. Use [`SessionStats::has_data`] before presenting numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub duration_secs: f64,
    pub sample_count: usize,
    pub cpu: MetricSummary,
    pub memory: MemorySummary,
    pub gpu: GpuSummary,
}

impl MetricSummary {
    /// Non-finite values are ignored; `None` when nothing finite is left
    fn from_values(values: &[f64]) -> Option<Self> {
        let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let min = stats::min(&values)?;
        let max = stats::max(&values)?;
        // summation error must not push the mean outside the observed range
        let avg = stats::mean(&values)?.clamp(min, max);
        Some(Self { avg, min, max })
    }
}

impl SessionStats {
    pub fn no_data(gpu_available: bool) -> Self {
        Self {
            gpu: GpuSummary {
                available: gpu_available,
                ..GpuSummary::default()
            },
            ..Self::default()
        }
    }

    /// Aggregate a sample sequence taken every `interval`
    pub fn from_samples(samples: &[Sample], interval: Duration, gpu_available: bool) -> Self {
        if samples.is_empty() {
            return Self::no_data(gpu_available);
        }

        let column = |f: fn(&Sample) -> f64| samples.iter().map(f).collect::<Vec<f64>>();

        let cpu = MetricSummary::from_values(&column(|s| s.cpu_percent)).unwrap_or_default();
        let memory = MetricSummary::from_values(&column(|s| s.memory_percent)).unwrap_or_default();
        let gpu_util = MetricSummary::from_values(&column(|s| s.gpu_util)).unwrap_or_default();
        let gpu_memory = MetricSummary::from_values(&column(|s| s.gpu_memory_mb)).unwrap_or_default();
        let gpu_temp = MetricSummary::from_values(&column(|s| s.gpu_temp_c)).unwrap_or_default();
        let peak_gb = MetricSummary::from_values(&column(|s| s.memory_used_gb))
            .map(|m| m.max)
            .unwrap_or_default();

        Self {
            duration_secs: samples.len() as f64 * interval.as_secs_f64(),
            sample_count: samples.len(),
            cpu,
            memory: MemorySummary {
                avg: memory.avg,
                min: memory.min,
                max: memory.max,
                peak_gb,
            },
            gpu: GpuSummary {
                available: gpu_available,
                util_avg: gpu_util.avg,
                util_max: gpu_util.max,
                memory_avg: gpu_memory.avg,
                memory_max: gpu_memory.max,
                temp_max: gpu_temp.max,
            },
        }
    }

    pub fn has_data(&self) -> bool {
        self.sample_count > 0
    }
}
