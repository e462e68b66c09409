//! HTML and JSON output for a finalized comparison

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{info, warn};

use crate::audio::AudioAnalysis;
use crate::config::ReportSettings;
use crate::error::Result;
use crate::monitoring::SessionStats;
use crate::report::artifacts::{annotate_copies, copy_artifacts, plan_copies, relative_path, AUDIO_DIR};
use crate::report::charts::render_charts;
use crate::report::{ComparisonReport, ServiceEntry, ServiceStatus};
use crate::script::ScriptOutcome;
use crate::utils::format::seconds_or_na;

const REPORT_TEMPLATE: &str = include_str!("templates/report.hbs");
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Files written for one run
#[derive(Debug, Clone)]
pub struct ReportPaths {
    /// `None` when HTML output is turned off
    pub html: Option<PathBuf>,
    pub json: PathBuf,
    /// `None` when HTML output is off or nothing succeeded
    pub charts: Option<PathBuf>,
    pub audio_dir: PathBuf,
    pub audio_files: usize,
}

pub struct ReportRenderer {
    registry: Handlebars<'static>,
}

#[derive(Serialize)]
struct ReportView<'a> {
    title: &'a str,
    generated_at: String,
    duration: String,
    host: &'a crate::monitoring::HostInfo,
    host_memory: String,
    test_ids: String,
    total_services: usize,
    completed_services: usize,
    failed_services: usize,
    total_tests: usize,
    successful_tests: usize,
    success_rate: String,
    rows: Vec<SummaryRow>,
    test_types: Vec<TestTypeRow>,
    charts: Option<&'a str>,
    cards: Vec<ServiceCard>,
    resources: Vec<ResourceRow>,
}

#[derive(Serialize)]
struct SummaryRow {
    name: String,
    status: &'static str,
    ok: bool,
    tests: String,
    success_rate: String,
    avg_time: String,
    min_time: String,
    max_time: String,
    p95_time: String,
}

#[derive(Serialize)]
struct TestTypeRow {
    test_id: String,
    category: String,
    tests: String,
    success_rate: String,
    avg_time: String,
}

#[derive(Serialize)]
struct ServiceCard {
    name: String,
    id: String,
    base_url: String,
    status: &'static str,
    ok: bool,
    error: Option<String>,
    health: Option<String>,
    voices: Option<String>,
    script: Option<ScriptView>,
    tests: Vec<TestRow>,
}

#[derive(Serialize)]
struct ScriptView {
    ok: bool,
    exit_code: String,
    duration: String,
    error: Option<String>,
    stdout: Option<String>,
    stderr: Option<String>,
}

#[derive(Serialize)]
struct TestRow {
    test_id: String,
    description: String,
    success: bool,
    synthesis_time: String,
    audio_duration: String,
    text_length: usize,
    model: Option<String>,
    error: Option<String>,
    audio: Option<String>,
    analysis: Option<String>,
}

#[derive(Serialize)]
struct ResourceRow {
    name: String,
    has_data: bool,
    samples: usize,
    duration: String,
    cpu_avg: String,
    cpu_max: String,
    memory_avg: String,
    memory_peak_gb: String,
    gpu: bool,
    gpu_util_avg: String,
    gpu_util_max: String,
    gpu_memory_max: String,
    gpu_temp_max: String,
}

impl ReportRenderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_template_string("report", REPORT_TEMPLATE)?;
        Ok(Self { registry })
    }

    /// Render the HTML document with the charts inlined
    ///
    /// Audio players appear for artifacts whose `copied_file` is set.
    pub fn render_html(&self, report: &ComparisonReport) -> Result<String> {
        let charts = Self::charts(report);
        self.render_page(report, charts.as_deref())
    }

    pub fn render_json(&self, report: &ComparisonReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    /// Write the timestamped report files under `settings.output_dir`
    ///
    /// The JSON dump is always written. Audio copies follow
    /// `include_audio`, and the HTML page and chart SVG follow `write_html`.
    pub fn write_report(&self, report: &ComparisonReport, settings: &ReportSettings) -> Result<ReportPaths> {
        let output_dir = &settings.output_dir;
        fs::create_dir_all(output_dir)?;

        let timestamp = report
            .finished_at
            .unwrap_or_else(Utc::now)
            .format(TIMESTAMP_FORMAT)
            .to_string();

        let mut report = report.clone();
        let audio_dir = output_dir.join(AUDIO_DIR);
        let audio_files = if settings.include_audio {
            let copied = copy_artifacts(&plan_copies(&report), &audio_dir)?;
            annotate_copies(&mut report, &copied);
            copied.len()
        } else {
            0
        };

        let (html_path, charts_path) = if settings.write_html {
            let charts = Self::charts(&report);
            let charts_path = match &charts {
                Some(svg) => {
                    let path = output_dir.join(format!("tts_comparison_charts_{}.svg", timestamp));
                    fs::write(&path, svg)?;
                    Some(path)
                }
                None => None,
            };

            let path = output_dir.join(format!("tts_comparison_report_{}.html", timestamp));
            fs::write(&path, self.render_page(&report, charts.as_deref())?)?;
            (Some(path), charts_path)
        } else {
            (None, None)
        };

        let json_path = output_dir.join(format!("tts_comparison_data_{}.json", timestamp));
        fs::write(&json_path, self.render_json(&report)?)?;

        info!(
            html = ?html_path,
            json = %json_path.display(),
            audio_files,
            "Report written"
        );

        Ok(ReportPaths {
            html: html_path,
            json: json_path,
            charts: charts_path,
            audio_dir,
            audio_files,
        })
    }

    fn render_page(&self, report: &ComparisonReport, charts: Option<&str>) -> Result<String> {
        let view = ReportView::build(report, charts);
        Ok(self.registry.render("report", &view)?)
    }

    /// Charts are optional; a rendering failure leaves them out
    fn charts(report: &ComparisonReport) -> Option<String> {
        match render_charts(report) {
            Ok(svg) => svg,
            Err(e) => {
                warn!("Could not render charts: {}", e);
                None
            }
        }
    }
}

impl<'a> ReportView<'a> {
    fn build(report: &'a ComparisonReport, charts: Option<&'a str>) -> Self {
        let summaries = report
            .summary
            .as_ref()
            .map(|s| s.services.clone())
            .unwrap_or_else(|| report.services.iter().map(ServiceEntry::summary).collect());

        let rows = summaries
            .iter()
            .map(|s| SummaryRow {
                name: s.name.clone(),
                status: s.status.as_str(),
                ok: s.status == ServiceStatus::Completed,
                tests: format!("{}/{}", s.successful_tests, s.total_tests),
                success_rate: format!("{:.1}%", s.success_rate),
                avg_time: seconds_or_na(s.avg_synthesis_time, 3),
                min_time: seconds_or_na(s.min_synthesis_time, 3),
                max_time: seconds_or_na(s.max_synthesis_time, 3),
                p95_time: seconds_or_na(s.p95_synthesis_time, 3),
            })
            .collect();

        let test_types = report
            .summary
            .as_ref()
            .map(|s| s.by_test_type.clone())
            .unwrap_or_else(|| report.test_type_summaries())
            .into_iter()
            .map(|t| TestTypeRow {
                tests: format!("{}/{}", t.successful_tests, t.total_tests),
                success_rate: format!("{:.1}%", t.success_rate),
                avg_time: seconds_or_na(t.avg_synthesis_time, 3),
                test_id: t.test_id,
                category: t.category,
            })
            .collect();

        let cards = report
            .services
            .iter()
            .map(ServiceCard::build)
            .collect();

        let resources = report
            .completed()
            .map(|entry| ResourceRow::build(&entry.name, &entry.resources))
            .collect();

        let (total_tests, successful_tests, success_rate) = match &report.summary {
            Some(s) => (s.total_tests, s.successful_tests, s.success_rate),
            None => (0, 0, 0.0),
        };
        let completed_services = report.completed().count();

        let duration = report
            .finished_at
            .and_then(|end| (end - report.started_at).to_std().ok())
            .map(crate::utils::format::duration_human)
            .unwrap_or_else(|| "N/A".to_string());

        Self {
            title: &report.title,
            generated_at: report
                .finished_at
                .unwrap_or_else(Utc::now)
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string(),
            duration,
            host: &report.host,
            host_memory: format!("{:.1}", report.host.total_memory_gb),
            test_ids: report.test_ids.join(", "),
            total_services: report.services.len(),
            completed_services,
            failed_services: report.services.len() - completed_services,
            total_tests,
            successful_tests,
            success_rate: format!("{:.1}%", success_rate),
            rows,
            test_types,
            charts,
            cards,
            resources,
        }
    }
}

impl ServiceCard {
    fn build(entry: &ServiceEntry) -> Self {
        let pretty = |value: &Option<serde_json::Value>| {
            value
                .as_ref()
                .and_then(|v| serde_json::to_string_pretty(v).ok())
        };

        Self {
            name: entry.name.clone(),
            id: entry.id.clone(),
            base_url: entry.base_url.clone(),
            status: entry.status.as_str(),
            ok: entry.status == ServiceStatus::Completed,
            error: entry.error.clone(),
            health: pretty(&entry.health),
            voices: pretty(&entry.voices),
            script: entry
                .test_script
                .as_ref()
                .filter(|s| s.available)
                .map(ScriptView::build),
            tests: entry
                .results
                .iter()
                .map(|r| TestRow {
                    test_id: r.test_id.clone(),
                    description: r.description.clone(),
                    success: r.success,
                    synthesis_time: seconds_or_na(r.synthesis_time, 3),
                    audio_duration: seconds_or_na(r.audio_duration, 2),
                    text_length: r.text_length,
                    model: r.model.clone(),
                    error: r.error.clone(),
                    audio: r
                        .artifact
                        .as_ref()
                        .and_then(|a| a.copied_file.as_deref())
                        .map(relative_path),
                    analysis: r.audio_analysis.as_ref().map(describe_analysis),
                })
                .collect(),
        }
    }
}

impl ScriptView {
    fn build(outcome: &ScriptOutcome) -> Self {
        let non_empty = |text: &str| (!text.trim().is_empty()).then(|| text.to_string());
        Self {
            ok: outcome.success,
            exit_code: outcome
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            duration: seconds_or_na(outcome.duration_secs, 2),
            error: outcome.error.clone(),
            stdout: non_empty(&outcome.stdout),
            stderr: non_empty(&outcome.stderr),
        }
    }
}

fn describe_analysis(analysis: &AudioAnalysis) -> String {
    format!(
        "{:.2}s @ {} Hz, RMS {:.3}, peak {:.3}, {:.0}% silence",
        analysis.duration_secs,
        analysis.sample_rate,
        analysis.rms_level,
        analysis.peak_level,
        analysis.silence_ratio * 100.0
    )
}

impl ResourceRow {
    fn build(name: &str, stats: &SessionStats) -> Self {
        let pct = |v: f64| format!("{:.1}%", v);
        Self {
            name: name.to_string(),
            has_data: stats.has_data(),
            samples: stats.sample_count,
            duration: format!("{:.0}s", stats.duration_secs),
            cpu_avg: pct(stats.cpu.avg),
            cpu_max: pct(stats.cpu.max),
            memory_avg: pct(stats.memory.avg),
            memory_peak_gb: format!("{:.2} GB", stats.memory.peak_gb),
            gpu: stats.gpu.available,
            gpu_util_avg: pct(stats.gpu.util_avg),
            gpu_util_max: pct(stats.gpu.util_max),
            gpu_memory_max: format!("{:.0} MB", stats.gpu.memory_max),
            gpu_temp_max: format!("{:.0} °C", stats.gpu.temp_max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceDefinition;
    use crate::monitoring::HostInfo;
    use crate::report::tests::{completed_entry, result, with_artifact};
    use std::path::Path;

    fn sample_report() -> ComparisonReport {
        let mut report = ComparisonReport::new("TTS Comparison Report", HostInfo::default(), vec!["basic".into()]);
        report.push(completed_entry("kokoro", vec![result("kokoro", "basic", true, Some(1.25))]));
        let failed = ServiceDefinition::new("xtts", "XTTS-v2", "http://localhost:5001", "xtts");
        report.push(ServiceEntry::failed_to_start(&failed, "did not become healthy".into(), Utc::now()));
        report.finalize();
        report
    }

    fn settings(output_dir: &Path) -> ReportSettings {
        ReportSettings {
            output_dir: output_dir.to_path_buf(),
            ..ReportSettings::default()
        }
    }

    fn report_with_artifact(source: PathBuf) -> ComparisonReport {
        let mut report = ComparisonReport::new("Run", HostInfo::default(), vec!["basic".into()]);
        report.push(completed_entry(
            "kokoro",
            vec![with_artifact(result("kokoro", "basic", true, Some(1.0)), source)],
        ));
        report.finalize();
        report
    }

    #[test]
    fn test_render_html() {
        let renderer = ReportRenderer::new().unwrap();
        let html = renderer.render_html(&sample_report()).unwrap();

        assert!(html.contains("<title>TTS Comparison Report</title>"));
        assert!(html.contains("kokoro"));
        assert!(html.contains("XTTS-v2"));
        assert!(html.contains("failed_to_start"));
        assert!(html.contains("did not become healthy"));
        assert!(html.contains("1.250s"));
        assert!(html.contains("No resource samples"));
        assert!(html.contains("Results by test"));
        assert!(html.contains("<svg"));
        // no copies were made, so no players
        assert!(!html.contains("<audio"));
    }

    #[test]
    fn test_render_html_shows_script_and_analysis() {
        let mut report = sample_report();
        let entry = report.services.iter_mut().find(|e| e.id == "kokoro").unwrap();
        entry.test_script = Some(ScriptOutcome {
            available: true,
            success: false,
            exit_code: Some(2),
            duration_secs: Some(0.5),
            stdout: "checking voices".into(),
            stderr: "voice missing".into(),
            error: None,
        });
        entry.results[0].audio_analysis = Some(AudioAnalysis {
            duration_secs: 1.5,
            sample_rate: 24000,
            channels: 1,
            rms_level: 0.1,
            peak_level: 0.8,
            silence_ratio: 0.25,
            dynamic_range: 0.7,
            file_size: 72044,
        });

        let html = ReportRenderer::new().unwrap().render_html(&report).unwrap();
        assert!(html.contains("Test script"));
        assert!(html.contains("checking voices"));
        assert!(html.contains("voice missing"));
        assert!(html.contains("RMS 0.100, peak 0.800, 25% silence"));
    }

    #[test]
    fn test_render_json() {
        let renderer = ReportRenderer::new().unwrap();
        let json = renderer.render_json(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["services"][0]["status"], "completed");
        assert_eq!(value["services"][1]["status"], "failed_to_start");
        assert_eq!(value["summary"]["total_services"], 2);
        assert_eq!(value["summary"]["by_test_type"][0]["test_id"], "basic");
        assert_eq!(value["services"][0]["results"][0]["synthesis_time"], 1.25);
    }

    #[test]
    fn test_write_report_lays_out_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.wav");
        std::fs::write(&source, b"RIFF").unwrap();
        let report = report_with_artifact(source);

        let out = dir.path().join("reports");
        let paths = ReportRenderer::new().unwrap().write_report(&report, &settings(&out)).unwrap();

        let html_path = paths.html.as_ref().unwrap();
        assert!(html_path.is_file());
        assert!(paths.json.is_file());
        assert!(paths.charts.as_ref().unwrap().is_file());
        assert_eq!(paths.audio_files, 1);
        assert!(paths.audio_dir.join("01_kokoro_basic.wav").is_file());

        let name = html_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("tts_comparison_report_") && name.ends_with(".html"));

        let html = std::fs::read_to_string(html_path).unwrap();
        assert!(html.contains("audio/01_kokoro_basic.wav"));

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(
            json["services"][0]["results"][0]["artifact"]["copied_file"],
            "01_kokoro_basic.wav"
        );
        // the caller's report is left untouched
        assert!(report.services[0].results[0].artifact.as_ref().unwrap().copied_file.is_none());
    }

    #[test]
    fn test_write_report_without_audio_or_html() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.wav");
        std::fs::write(&source, b"RIFF").unwrap();
        let report = report_with_artifact(source);

        let out = dir.path().join("reports");
        let mut settings = settings(&out);
        settings.include_audio = false;
        settings.write_html = false;
        let paths = ReportRenderer::new().unwrap().write_report(&report, &settings).unwrap();

        assert!(paths.html.is_none());
        assert!(paths.charts.is_none());
        assert_eq!(paths.audio_files, 0);
        assert!(!paths.audio_dir.exists());
        assert!(paths.json.is_file());

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert!(json["services"][0]["results"][0]["artifact"].get("copied_file").is_none());

        let written: Vec<_> = std::fs::read_dir(&out).unwrap().collect();
        assert_eq!(written.len(), 1);
    }
}
