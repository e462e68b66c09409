//! End-to-end runs against stub TTS services

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tts_benchmarks::config::{HarnessConfig, SamplingSettings, ServiceDefinition, TestCase};
use tts_benchmarks::runner::CaptureMethod;
use tts_benchmarks::{
    ComparisonOrchestrator, ExternalController, HarnessError, ReportRenderer, ServiceStatus, TtsClient,
};
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn harness_config(services: Vec<ServiceDefinition>, tests: &[&str], output: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.services = services;
    config.tests = TestCase::catalog()
        .into_iter()
        .filter(|t| tests.contains(&t.id.as_str()))
        .collect();
    config.sampling.interval_ms = 10;
    config.sampling.gpu_command = "ttsbench-no-such-gpu-tool".to_string();
    config.runner.health_poll_interval_ms = 10;
    config.runner.startup_timeout_secs = 1;
    config.runner.health_timeout_secs = 1;
    config.runner.request_timeout_secs = 5;
    config.runner.teardown_grace_ms = 0;
    config.report.output_dir = output.to_path_buf();
    config
}

fn orchestrator(config: HarnessConfig) -> ComparisonOrchestrator<ExternalController> {
    let client = TtsClient::new(&config.runner).unwrap();
    ComparisonOrchestrator::new(config, ExternalController::new(client.clone()), client)
}

async fn healthy_service(synthesis: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesize_json"))
        .respond_with(synthesis)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_end_to_end_single_service() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesize_json"))
        .and(header_exists("X-Request-Id"))
        .and(body_partial_json(json!({"language": "es"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "audio_duration": 1.2}))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = ServiceDefinition::new("stub", "Stub TTS", &server.uri(), dir.path());
    let config = harness_config(vec![service], &["basic"], &dir.path().join("reports"));

    let report = tokio_test::assert_ok!(orchestrator(config).run(CancellationToken::new()).await);

    assert!(report.is_finalized());
    let entry = report.get("stub").unwrap();
    assert_eq!(entry.status, ServiceStatus::Completed);
    assert_eq!(entry.health, Some(json!({"status": "healthy"})));
    assert!(entry.voices.is_none());

    assert_eq!(entry.results.len(), 1);
    let result = &entry.results[0];
    assert!(result.success);
    assert_eq!(result.test_id, "basic");
    assert_eq!(result.audio_duration, Some(1.2));
    assert!(result.synthesis_time.unwrap() > 0.0);
    assert!(result.error.is_none());

    assert!(entry.resources.has_data());
    assert!(!entry.resources.gpu.available);
}

#[tokio::test]
async fn test_failed_start_does_not_abort_run() {
    let dir = tempfile::tempdir().unwrap();
    let server = healthy_service(ResponseTemplate::new(200).set_body_json(json!({"success": true}))).await;

    let services = vec![
        ServiceDefinition::new("a", "Service A", &server.uri(), dir.path()),
        ServiceDefinition::new("b", "Service B", "http://127.0.0.1:1", dir.path()),
        ServiceDefinition::new("c", "Service C", &server.uri(), dir.path()),
    ];
    let config = harness_config(services, &["basic"], &dir.path().join("reports"));

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();

    let ids: Vec<&str> = report.services.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let failed: Vec<_> = report
        .services
        .iter()
        .filter(|e| e.status == ServiceStatus::FailedToStart)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, "b");
    assert!(failed[0].results.is_empty());
    assert!(failed[0]
        .error
        .as_deref()
        .unwrap()
        .contains("did not become healthy"));

    assert_eq!(report.get("a").unwrap().status, ServiceStatus::Completed);
    assert_eq!(report.get("c").unwrap().status, ServiceStatus::Completed);

    let summary = report.summary.as_ref().unwrap();
    assert_eq!(summary.completed_services, 2);
    assert_eq!(summary.failed_services, 1);
}

#[tokio::test]
async fn test_request_failures_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let server = healthy_service(ResponseTemplate::new(500).set_body_string("model crashed")).await;

    let service = ServiceDefinition::new("broken", "Broken TTS", &server.uri(), dir.path());
    let config = harness_config(vec![service], &["basic", "long"], &dir.path().join("reports"));

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();
    let entry = report.get("broken").unwrap();

    assert_eq!(entry.status, ServiceStatus::Completed);
    assert_eq!(entry.results.len(), 2);
    for result in &entry.results {
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("HTTP 500: model crashed"));
    }
    assert_eq!(report.summary.as_ref().unwrap().success_rate, 0.0);
}

#[tokio::test]
async fn test_parallel_battery() {
    let dir = tempfile::tempdir().unwrap();
    let server = healthy_service(
        ResponseTemplate::new(200)
            .set_body_json(json!({"success": true, "model": "stub-v1"}))
            .set_delay(Duration::from_millis(20)),
    )
    .await;

    let service = ServiceDefinition::new("stub", "Stub TTS", &server.uri(), dir.path());
    let tests = ["basic", "long", "short", "medium", "technical", "numbers", "emotional"];
    let mut config = harness_config(vec![service], &tests, &dir.path().join("reports"));
    config.runner.parallel_workers = Some(4);

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();
    let entry = report.get("stub").unwrap();

    assert_eq!(entry.results.len(), tests.len());
    assert!(entry.results.iter().all(|r| r.success));
    assert!(entry.results.iter().all(|r| r.model.as_deref() == Some("stub-v1")));

    let mut seen: Vec<&str> = entry.results.iter().map(|r| r.test_id.as_str()).collect();
    seen.sort_unstable();
    let mut expected = tests.to_vec();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_binary_body_is_captured() {
    let dir = tempfile::tempdir().unwrap();
    let server = healthy_service(ResponseTemplate::new(200).set_body_raw(b"RIFF0000WAVE".to_vec(), "audio/wav")).await;

    let service = ServiceDefinition::new("raw", "Raw TTS", &server.uri(), dir.path());
    let output = dir.path().join("reports");
    let config = harness_config(vec![service], &["basic"], &output);

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();
    let result = &report.get("raw").unwrap().results[0];

    assert!(result.success);
    let artifact = result.artifact.as_ref().unwrap();
    assert_eq!(artifact.capture, CaptureMethod::Body);
    assert!(artifact.path.starts_with(output.join("captures")));
    assert!(artifact.path.to_string_lossy().contains(&result.request_id));
    assert_eq!(std::fs::read(&artifact.path).unwrap(), b"RIFF0000WAVE");
}

#[tokio::test]
async fn test_report_artifact_layout() {
    let dir = tempfile::tempdir().unwrap();

    let mut services = Vec::new();
    let mut servers = Vec::new();
    for id in ["ServiceA", "ServiceB"] {
        let service_dir = dir.path().join(id);
        std::fs::create_dir_all(service_dir.join("debug_audio")).unwrap();
        std::fs::write(service_dir.join("debug_audio").join("take.wav"), b"RIFF").unwrap();

        let server = healthy_service(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "debug_audio_file": "take.wav"})),
        )
        .await;
        services.push(ServiceDefinition::new(id, id, &server.uri(), service_dir));
        servers.push(server);
    }

    let output = dir.path().join("reports");
    let config = harness_config(services, &["basic"], &output);
    let orchestrator = orchestrator(config);
    let report = orchestrator.run(CancellationToken::new()).await.unwrap();

    for entry in &report.services {
        let artifact = entry.results[0].artifact.as_ref().unwrap();
        assert_eq!(artifact.capture, CaptureMethod::Named);
    }

    let paths = ReportRenderer::new()
        .unwrap()
        .write_report(&report, &orchestrator.config().report)
        .unwrap();
    assert_eq!(paths.audio_files, 2);
    assert!(output.join("audio").join("01_servicea_basic.wav").is_file());
    assert!(output.join("audio").join("02_serviceb_basic.wav").is_file());
    assert!(paths.html.as_ref().unwrap().is_file());

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(json["services"][1]["id"], "ServiceB");
    assert_eq!(
        json["services"][0]["results"][0]["artifact"]["copied_file"],
        "01_servicea_basic.wav"
    );
    assert_eq!(
        json["services"][1]["results"][0]["artifact"]["copied_file"],
        "02_serviceb_basic.wav"
    );
}

#[tokio::test]
async fn test_interrupt_stops_run() {
    let dir = tempfile::tempdir().unwrap();
    let service = ServiceDefinition::new("slow", "Slow TTS", "http://127.0.0.1:1", dir.path());
    let mut config = harness_config(vec![service], &["basic"], &dir.path().join("reports"));
    config.runner.startup_timeout_secs = 30;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = orchestrator(config).run(shutdown).await.unwrap_err();

    assert!(matches!(err, HarnessError::Interrupted));
    assert_eq!(err.exit_code(), 130);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!dir.path().join("reports").exists());
}

fn write_tone(path: &Path) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..8000 {
        writer.write_sample(if i % 2 == 0 { 8192i16 } else { -8192 }).unwrap();
    }
    writer.finalize().unwrap();
}

#[tokio::test]
async fn test_default_sampling_records_short_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let server = healthy_service(ResponseTemplate::new(200).set_body_json(json!({"success": true}))).await;

    let service = ServiceDefinition::new("quick", "Quick TTS", &server.uri(), dir.path());
    let mut config = harness_config(vec![service], &["basic"], &dir.path().join("reports"));
    config.sampling = SamplingSettings::default();

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();
    let entry = report.get("quick").unwrap();

    assert!(entry.results[0].success);
    // the battery is far shorter than the 2 s sampling interval
    assert!(entry.resources.has_data());
    assert!(entry.resources.sample_count >= 1);
}

#[tokio::test]
async fn test_plain_text_health_counts_as_healthy() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/synthesize_json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let service = ServiceDefinition::new("plain", "Plain TTS", &server.uri(), dir.path());
    let config = harness_config(vec![service], &["basic"], &dir.path().join("reports"));

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();
    let entry = report.get("plain").unwrap();

    assert_eq!(entry.status, ServiceStatus::Completed);
    assert!(entry.health.is_none());
    assert!(entry.results[0].success);
}

#[tokio::test]
async fn test_json_failure_reply_is_not_success() {
    let dir = tempfile::tempdir().unwrap();
    let server = healthy_service(
        ResponseTemplate::new(200).set_body_json(json!({"success": false, "error": "model not loaded"})),
    )
    .await;

    let service = ServiceDefinition::new("loading", "Loading TTS", &server.uri(), dir.path());
    let config = harness_config(vec![service], &["basic"], &dir.path().join("reports"));

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();
    let result = &report.get("loading").unwrap().results[0];

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("model not loaded"));
    assert!(result.artifact.is_none());
    assert!(result.synthesis_time.is_some());
}

#[tokio::test]
async fn test_json_failure_with_text_content_type() {
    let dir = tempfile::tempdir().unwrap();
    let server = healthy_service(ResponseTemplate::new(200).set_body_raw(
        br#"{"success": false, "error": "model not loaded"}"#.to_vec(),
        "text/plain",
    ))
    .await;

    let service = ServiceDefinition::new("mislabeled", "Mislabeled TTS", &server.uri(), dir.path());
    let output = dir.path().join("reports");
    let config = harness_config(vec![service], &["basic"], &output);

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();
    let result = &report.get("mislabeled").unwrap().results[0];

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("model not loaded"));
    assert!(result.artifact.is_none());
    assert!(!output.join("captures").exists());
}

#[tokio::test]
async fn test_status_failure_keeps_synthesis_time() {
    let dir = tempfile::tempdir().unwrap();
    let server = healthy_service(
        ResponseTemplate::new(503)
            .set_body_string("warming up")
            .set_delay(Duration::from_millis(50)),
    )
    .await;

    let service = ServiceDefinition::new("warming", "Warming TTS", &server.uri(), dir.path());
    let config = harness_config(vec![service], &["basic"], &dir.path().join("reports"));

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();
    let result = &report.get("warming").unwrap().results[0];

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("HTTP 503: warming up"));
    assert!(result.synthesis_time.unwrap() >= 0.05);
}

#[tokio::test]
async fn test_recent_file_fallback_is_analyzed() {
    let dir = tempfile::tempdir().unwrap();
    let service_dir = dir.path().join("recent");
    std::fs::create_dir_all(service_dir.join("debug_audio")).unwrap();
    write_tone(&service_dir.join("debug_audio").join("latest.wav"));

    let server = healthy_service(ResponseTemplate::new(200).set_body_json(json!({"success": true}))).await;
    let service = ServiceDefinition::new("recent", "Recent TTS", &server.uri(), &service_dir);
    let config = harness_config(vec![service], &["basic"], &dir.path().join("reports"));

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();
    let result = &report.get("recent").unwrap().results[0];

    assert!(result.success);
    let artifact = result.artifact.as_ref().unwrap();
    assert_eq!(artifact.capture, CaptureMethod::Recent);
    assert_eq!(artifact.path.file_name().unwrap(), "latest.wav");

    let analysis = result.audio_analysis.as_ref().unwrap();
    assert_eq!(analysis.sample_rate, 16000);
    assert!((analysis.duration_secs - 0.5).abs() < 1e-9);
    assert!((analysis.peak_level - 0.25).abs() < 1e-9);
    assert_eq!(analysis.silence_ratio, 0.0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_service_test_script_runs_after_battery() {
    let dir = tempfile::tempdir().unwrap();
    let service_dir = dir.path().join("scripted");
    std::fs::create_dir_all(&service_dir).unwrap();
    std::fs::write(service_dir.join("test_service.py"), "echo voices ok\n").unwrap();

    let server = healthy_service(ResponseTemplate::new(200).set_body_json(json!({"success": true}))).await;
    let services = vec![
        ServiceDefinition::new("scripted", "Scripted TTS", &server.uri(), &service_dir),
        ServiceDefinition::new("bare", "Bare TTS", &server.uri(), dir.path()),
    ];
    let mut config = harness_config(services, &["basic"], &dir.path().join("reports"));
    config.runner.script_interpreter = "sh".to_string();

    let report = orchestrator(config).run(CancellationToken::new()).await.unwrap();

    let script = report.get("scripted").unwrap().test_script.as_ref().unwrap();
    assert!(script.available);
    assert!(script.success);
    assert_eq!(script.stdout.trim(), "voices ok");

    let bare = report.get("bare").unwrap().test_script.as_ref().unwrap();
    assert!(!bare.available);
}
