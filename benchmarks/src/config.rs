//! Configuration management for the TTS comparison harness
//!
//! A [`HarnessConfig`] is built once (defaults, then an optional TOML file,
//! then environment overrides), validated, and handed to the orchestrator by
//! value. Command-line filtering produces a new configuration instead of
//! mutating the loaded one.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "ttsbench.toml";

/// Main harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Services under comparison, processed in this order
    pub services: Vec<ServiceDefinition>,

    /// Synthesis battery run against every service
    pub tests: Vec<TestCase>,

    /// Resource sampling configuration
    #[serde(default)]
    pub sampling: SamplingSettings,

    /// Service lifecycle and request configuration
    #[serde(default)]
    pub runner: RunnerSettings,

    /// Report output configuration
    #[serde(default)]
    pub report: ReportSettings,
}

/// One TTS backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDefinition {
    /// Short identifier used in filters, logs and artifact names
    pub id: String,

    /// Display name
    pub name: String,

    /// Base URL, e.g. `http://localhost:5002`
    pub base_url: String,

    /// Compose project directory
    pub directory: PathBuf,

    /// Where the service drops generated audio; defaults to `<directory>/debug_audio`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_audio_dir: Option<PathBuf>,

    /// Synthesis endpoint path
    #[serde(default = "default_synthesize_path")]
    pub synthesize_path: String,

    /// Voice sent when the test case does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// One synthesis request in the battery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    pub id: String,
    pub description: String,
    pub category: String,
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingSettings {
    /// Interval between two resource samples
    pub interval_ms: u64,

    /// GPU query tool; checked once per sampler
    pub gpu_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Delay between two health polls while a service starts
    pub health_poll_interval_ms: u64,

    /// Ceiling on the total health wait
    pub startup_timeout_secs: u64,

    /// Timeout of a single health request
    pub health_timeout_secs: u64,

    /// Timeout of a single synthesis request
    pub request_timeout_secs: u64,

    /// Pause after a service is stopped, before the next one starts
    pub teardown_grace_ms: u64,

    /// Recency window for the debug-directory artifact fallback
    pub artifact_window_secs: u64,

    /// Worker count for parallel test dispatch; sequential when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_workers: Option<usize>,

    /// Services are already running; skip `docker compose up/down`
    #[serde(default)]
    pub external_services: bool,

    /// Script run from each service directory after the battery, when present
    #[serde(default = "default_test_script")]
    pub test_script: String,

    /// Program the test script is handed to
    #[serde(default = "default_script_interpreter")]
    pub script_interpreter: String,

    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,

    /// Decode captured WAV artifacts for level and silence statistics
    #[serde(default = "default_true")]
    pub analyze_audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    pub output_dir: PathBuf,
    pub title: String,

    /// Copy artifacts into `audio/` and embed players in the HTML
    #[serde(default = "default_true")]
    pub include_audio: bool,

    /// Write the HTML report and charts; the JSON dump is always written
    #[serde(default = "default_true")]
    pub write_html: bool,
}

fn default_synthesize_path() -> String {
    "/synthesize_json".to_string()
}

fn default_language() -> String {
    "es".to_string()
}

fn default_test_script() -> String {
    "test_service.py".to_string()
}

fn default_script_interpreter() -> String {
    "python3".to_string()
}

fn default_script_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            gpu_command: "nvidia-smi".to_string(),
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            health_poll_interval_ms: 5000,
            startup_timeout_secs: 120,
            health_timeout_secs: 10,
            request_timeout_secs: 60,
            teardown_grace_ms: 5000,
            artifact_window_secs: 30,
            parallel_workers: None,
            external_services: false,
            test_script: default_test_script(),
            script_interpreter: default_script_interpreter(),
            script_timeout_secs: default_script_timeout_secs(),
            analyze_audio: true,
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("tts_comparison_reports"),
            title: "TTS Comparison Report".to_string(),
            include_audio: true,
            write_html: true,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            services: vec![
                ServiceDefinition::new("azure", "Azure TTS", "http://localhost:5004", "azure-tts-ms"),
                ServiceDefinition::new("f5", "F5-TTS", "http://localhost:5005", "f5-tts-ms"),
                ServiceDefinition::new("kokoro", "Kokoro TTS", "http://localhost:5002", "kokoro-tts-ms"),
                ServiceDefinition::new("xtts", "XTTS-v2", "http://localhost:5001", "xtts-v2-tts-ms"),
            ],
            tests: TestCase::default_battery(),
            sampling: SamplingSettings::default(),
            runner: RunnerSettings::default(),
            report: ReportSettings::default(),
        }
    }
}

impl ServiceDefinition {
    pub fn new(id: &str, name: &str, base_url: &str, directory: impl Into<PathBuf>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            base_url: base_url.to_string(),
            directory: directory.into(),
            debug_audio_dir: None,
            synthesize_path: default_synthesize_path(),
            voice: None,
        }
    }

    pub fn debug_audio_path(&self) -> PathBuf {
        self.debug_audio_dir
            .clone()
            .unwrap_or_else(|| self.directory.join("debug_audio"))
    }

    /// Join an endpoint path onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl TestCase {
    fn preset(id: &str, category: &str, text: &str, expected: f64) -> Self {
        Self {
            id: id.to_string(),
            description: format!("synthesis_{}", id),
            category: category.to_string(),
            text: text.to_string(),
            language: default_language(),
            voice: None,
            speed: None,
            expected_duration_secs: Some(expected),
        }
    }

    /// The battery run when the configuration does not override it
    pub fn default_battery() -> Vec<TestCase> {
        vec![
            Self::preset(
                "basic",
                "Basic",
                "Hola, esta es una prueba de síntesis de voz básica.",
                3.0,
            ),
            Self::preset(
                "long",
                "Long text",
                "Esta es una prueba más larga para evaluar el rendimiento con textos extensos. \
                 La síntesis de texto a voz es una tecnología fascinante.",
                8.0,
            ),
        ]
    }

    /// Every built-in test case, selectable by id from the command line
    pub fn catalog() -> Vec<TestCase> {
        let mut all = Self::default_battery();
        all.extend([
            Self::preset(
                "short",
                "Short text",
                "Hola, este es un texto corto para probar la síntesis de voz.",
                3.0,
            ),
            Self::preset(
                "medium",
                "Medium text",
                "Este es un texto de longitud media que incluye varias oraciones para evaluar \
                 la fluidez y naturalidad de la síntesis de texto a voz en español. Contiene \
                 palabras comunes y algunas con acentos.",
                8.0,
            ),
            Self::preset(
                "technical",
                "Technical text",
                "La inteligencia artificial y el procesamiento de lenguaje natural han \
                 revolucionado la síntesis de voz. Los algoritmos de deep learning, redes \
                 neuronales convolucionales y transformers permiten generar audio de alta calidad.",
                12.0,
            ),
            Self::preset(
                "numbers",
                "Numbers",
                "El año 2024 ha sido importante para la IA. Tenemos 365 días, 24 horas, 60 \
                 minutos y 3600 segundos. Los números del 1 al 100 son fundamentales en matemáticas.",
                10.0,
            ),
            Self::preset(
                "emotional",
                "Emotional text",
                "¡Qué maravilloso día! El sol brilla intensamente, los pájaros cantan alegremente \
                 y todo parece perfecto. ¿No es increíble cómo la naturaleza nos llena de felicidad?",
                9.0,
            ),
        ]);
        all
    }
}

impl SamplingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl RunnerSettings {
    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }

    pub fn artifact_window(&self) -> Duration {
        Duration::from_secs(self.artifact_window_secs)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.to_string_lossy().to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })
    }

    /// Load configuration with fallback order: defaults -> file -> env
    ///
    /// An explicit path must exist; without one, [`DEFAULT_CONFIG_FILE`] is
    /// used when present in the working directory.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let config = match config_path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TTSBENCH_*` overrides read through `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("TTSBENCH_OUTPUT_DIR") {
            self.report.output_dir = PathBuf::from(dir);
        }

        if let Some(interval) = lookup("TTSBENCH_SAMPLE_INTERVAL_MS") {
            self.sampling.interval_ms = parse_env("TTSBENCH_SAMPLE_INTERVAL_MS", interval)?;
        }

        if let Some(timeout) = lookup("TTSBENCH_REQUEST_TIMEOUT_SECS") {
            self.runner.request_timeout_secs = parse_env("TTSBENCH_REQUEST_TIMEOUT_SECS", timeout)?;
        }

        if let Some(workers) = lookup("TTSBENCH_PARALLEL_WORKERS") {
            self.runner.parallel_workers = Some(parse_env("TTSBENCH_PARALLEL_WORKERS", workers)?);
        }

        Ok(self)
    }

    /// Keep only the named services, in configuration order
    ///
    /// `all` (or an empty selection) keeps every service.
    pub fn with_service_filter(&self, selection: &[String]) -> ConfigResult<Self> {
        if selects_all(selection) {
            return Ok(self.clone());
        }

        for name in selection {
            if !self.services.iter().any(|s| &s.id == name) {
                return Err(ConfigError::UnknownSelection {
                    kind: "service",
                    name: name.clone(),
                });
            }
        }

        let mut filtered = self.clone();
        filtered.services.retain(|s| selection.contains(&s.id));
        Ok(filtered)
    }

    /// Select the test battery by id
    ///
    /// Ids are resolved against the configured tests first and then against
    /// the built-in catalog, so presets can be picked without editing the file.
    pub fn with_test_filter(&self, selection: &[String]) -> ConfigResult<Self> {
        if selects_all(selection) {
            return Ok(self.clone());
        }

        let catalog = TestCase::catalog();
        let mut tests = Vec::with_capacity(selection.len());
        for name in selection {
            let found = self
                .tests
                .iter()
                .chain(catalog.iter())
                .find(|t| &t.id == name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownSelection {
                    kind: "test",
                    name: name.clone(),
                })?;
            if !tests.iter().any(|t: &TestCase| t.id == found.id) {
                tests.push(found);
            }
        }

        let mut filtered = self.clone();
        filtered.tests = tests;
        Ok(filtered)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.services.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "at least one service must be configured".to_string(),
            });
        }

        if self.tests.is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "at least one test case must be configured".to_string(),
            });
        }

        let mut ids = HashSet::new();
        for service in &self.services {
            if !is_valid_id(&service.id) || !ids.insert(service.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "services.id".to_string(),
                    value: service.id.clone(),
                });
            }
            if !(service.base_url.starts_with("http://") || service.base_url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    field: format!("services.{}.base_url", service.id),
                    value: service.base_url.clone(),
                });
            }
        }

        let mut test_ids = HashSet::new();
        for test in &self.tests {
            if !is_valid_id(&test.id) || !test_ids.insert(test.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "tests.id".to_string(),
                    value: test.id.clone(),
                });
            }
            if test.text.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("tests.{}.text", test.id),
                    value: String::new(),
                });
            }
        }

        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sampling.interval_ms".to_string(),
                value: "0".to_string(),
            });
        }

        if self.runner.health_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runner.health_poll_interval_ms".to_string(),
                value: "0".to_string(),
            });
        }

        if self.runner.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runner.request_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }

        if self.runner.script_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runner.script_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }

        if self.runner.parallel_workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "runner.parallel_workers".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|_| ConfigError::ValidationFailed {
                    reason: format!("Unable to create config directory: {}", parent.display()),
                })?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationFailed {
            reason: e.to_string(),
        })?;

        fs::write(path, content).map_err(|e| ConfigError::ValidationFailed {
            reason: format!("Unable to write {}: {}", path.display(), e),
        })
    }
}

/// Ids end up in file names: ASCII letters, digits, `_` and `-` only
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn selects_all(selection: &[String]) -> bool {
    selection.is_empty() || selection.iter().any(|s| s == "all")
}

fn parse_env<T: std::str::FromStr>(field: &str, value: String) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value,
    })
}
