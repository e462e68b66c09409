//! GPU counters via `nvidia-smi`
//!
//! Availability is checked once when a sampler is built. A host without the tool, or
//! with a tool that fails, reads as zero on every metric.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time;
use tracing::debug;

const QUERY_ARGS: &[&str] = &[
    "--query-gpu=utilization.gpu,memory.used,temperature.gpu",
    "--format=csv,noheader,nounits",
];

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// One GPU reading; all zero when no GPU is present
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuReading {
    pub utilization_percent: f64,
    pub memory_used_mb: f64,
    pub temperature_c: f64,
}

#[derive(Debug, Clone)]
pub struct GpuQuery {
    command: String,
    available: bool,
}

impl GpuQuery {
    /// Run `command` once and remember whether it succeeded
    pub async fn detect(command: &str) -> Self {
        let available = match run(command, &[]).await {
            Some(_) => true,
            None => {
                debug!(command, "GPU query tool unavailable, GPU metrics will read as zero");
                false
            }
        };

        Self {
            command: command.to_string(),
            available,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            command: String::new(),
            available: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Query current counters, degrading to zero on any failure
    pub async fn read(&self) -> GpuReading {
        if !self.available {
            return GpuReading::default();
        }

        match run(&self.command, QUERY_ARGS).await {
            Some(stdout) => parse_query_output(&stdout).unwrap_or_else(|| {
                debug!(output = %stdout.trim(), "Unparsable GPU query output");
                GpuReading::default()
            }),
            None => GpuReading::default(),
        }
    }
}

/// Parse `utilization, memory, temperature` from the first GPU line
///
/// Non-numeric and non-finite fields (`[N/A]`, `nan`, `inf`) reject the line.
pub fn parse_query_output(output: &str) -> Option<GpuReading> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line
        .split(',')
        .map(|f| f.trim().parse::<f64>().ok().filter(|v| v.is_finite()));

    let utilization_percent = fields.next()??;
    let memory_used_mb = fields.next()??;
    let temperature_c = fields.next()??;

    Some(GpuReading {
        utilization_percent,
        memory_used_mb,
        temperature_c,
    })
}

async fn run(command: &str, args: &[&str]) -> Option<String> {
    let child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match time::timeout(COMMAND_TIMEOUT, child).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => {
            debug!(command, status = ?output.status, "GPU query exited unsuccessfully");
            None
        }
        Ok(Err(e)) => {
            debug!(command, error = %e, "GPU query could not be launched");
            None
        }
        Err(_) => {
            debug!(command, "GPU query timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_gpu() {
        let reading = parse_query_output("37, 4120, 61\n").unwrap();
        assert_eq!(reading.utilization_percent, 37.0);
        assert_eq!(reading.memory_used_mb, 4120.0);
        assert_eq!(reading.temperature_c, 61.0);
    }

    #[test]
    fn test_parse_uses_first_gpu() {
        let reading = parse_query_output("\n5, 100, 40\n90, 8000, 80\n").unwrap();
        assert_eq!(reading.utilization_percent, 5.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_query_output("").is_none());
        assert!(parse_query_output("[N/A], 100, 40").is_none());
        assert!(parse_query_output("10, 20").is_none());
        assert!(parse_query_output("nan, 100, 40").is_none());
        assert!(parse_query_output("10, inf, 40").is_none());
    }

    #[tokio::test]
    async fn test_missing_tool_reads_zero() {
        let gpu = GpuQuery::detect("ttsbench-no-such-gpu-tool").await;
        assert!(!gpu.is_available());
        assert_eq!(gpu.read().await, GpuReading::default());
    }
}
