//! Host resource monitoring while a service is under test

pub mod gpu;
pub mod host;
pub mod sampler;
pub mod stats;

pub use gpu::{GpuQuery, GpuReading};
pub use host::HostInfo;
pub use sampler::{ResourceSampler, Sample};
pub use stats::{GpuSummary, MemorySummary, MetricSummary, SessionStats};
