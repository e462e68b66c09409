//! HTTP client for the TTS services under test

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::config::{RunnerSettings, ServiceDefinition, TestCase};
use crate::error::{HarnessError, Result};
use crate::utils::Timer;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Endpoints tried in order for the voices document
const VOICES_ENDPOINTS: &[&str] = &["/voices", "/voices?language=es", "/languages"];

const ERROR_BODY_LIMIT: usize = 200;

#[derive(Clone)]
pub struct TtsClient {
    client: Client,
    request_timeout: Duration,
    health_timeout: Duration,
}

#[derive(Debug, Serialize)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

/// JSON answer of a synthesis endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    pub audio_duration: Option<f64>,
    pub sample_rate: Option<u32>,
    pub model: Option<String>,
    pub debug_audio_file: Option<String>,
    pub debug_audio_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum SynthesisBody {
    Json(SynthesisResponse),
    Audio { bytes: Vec<u8>, content_type: String },
}

/// A synthesis request that got an HTTP answer
///
/// `elapsed` covers the request and the full body read, also when the status
/// or the body turned out to be unusable.
#[derive(Debug)]
pub struct SynthesisOutcome {
    pub elapsed: Duration,
    pub body: Result<SynthesisBody>,
}

fn default_success() -> bool {
    true
}

impl TtsClient {
    pub fn new(settings: &RunnerSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ttsbench/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            request_timeout: settings.request_timeout(),
            health_timeout: settings.health_timeout(),
        })
    }

    async fn request_with_timeout<T>(
        &self,
        limit: Duration,
        future: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        timeout(limit, future).await.map_err(|_| HarnessError::Timeout {
            seconds: limit.as_secs(),
        })?
    }

    /// `GET /health` answered 200 within the health timeout
    ///
    /// Only the status counts; the body may be anything.
    pub async fn is_healthy(&self, service: &ServiceDefinition) -> bool {
        let url = service.url("/health");
        let check = self.request_with_timeout(self.health_timeout, async {
            Ok(self.client.get(&url).send().await?.status())
        });

        match check.await {
            Ok(status) if status == StatusCode::OK => true,
            Ok(status) => {
                debug!(service = %service.id, %status, "Health check answered non-200");
                false
            }
            Err(e) => {
                debug!(service = %service.id, "Health check failed: {}", e);
                false
            }
        }
    }

    pub async fn health_document(&self, service: &ServiceDefinition) -> Result<serde_json::Value> {
        self.get_json(&service.url("/health"), self.health_timeout).await
    }

    /// First voices-like document the service answers with
    pub async fn voices_document(&self, service: &ServiceDefinition) -> Option<serde_json::Value> {
        for endpoint in VOICES_ENDPOINTS {
            match self.get_json(&service.url(endpoint), self.health_timeout).await {
                Ok(document) => return Some(document),
                Err(e) => debug!(service = %service.id, endpoint, "Voices endpoint unavailable: {}", e),
            }
        }
        None
    }

    /// POST one test case
    ///
    /// Transport errors and timeouts are returned as `Err`. Any HTTP answer
    /// is an outcome, with status and body problems carried in its `body`.
    pub async fn synthesize(
        &self,
        service: &ServiceDefinition,
        test: &TestCase,
        request_id: &Uuid,
    ) -> Result<SynthesisOutcome> {
        let payload = SynthesisRequest {
            text: &test.text,
            language: &test.language,
            voice: test.voice.as_deref().or(service.voice.as_deref()),
            speed: test.speed,
        };
        let url = service.url(&service.synthesize_path);

        self.request_with_timeout(self.request_timeout, async {
            let timer = Timer::start();
            let response = self
                .client
                .post(&url)
                .header(REQUEST_ID_HEADER, request_id.to_string())
                .json(&payload)
                .send()
                .await?;

            let body = match Self::check_status(response).await {
                Ok(response) => Self::read_body(response).await,
                Err(e) => Err(e),
            };

            Ok(SynthesisOutcome {
                elapsed: timer.elapsed(),
                body,
            })
        })
        .await
    }

    async fn get_json(&self, url: &str, limit: Duration) -> Result<serde_json::Value> {
        self.request_with_timeout(limit, async {
            let response = self.client.get(url).send().await?;
            let response = Self::check_status(response).await?;
            Ok(response.json().await?)
        })
        .await
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > ERROR_BODY_LIMIT {
            let cut = (0..=ERROR_BODY_LIMIT)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }

        Err(HarnessError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn read_body(response: Response) -> Result<SynthesisBody> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let bytes = response.bytes().await?;
        SynthesisBody::classify(content_type, bytes.to_vec())
    }
}

impl SynthesisBody {
    /// Decide between a JSON answer and raw audio
    ///
    /// A JSON content type must parse. Any other content type is still read
    /// as JSON when the body is a JSON object, and as audio otherwise.
    pub fn classify(content_type: String, bytes: Vec<u8>) -> Result<Self> {
        if content_type.contains("json") {
            return Ok(SynthesisBody::Json(serde_json::from_slice(&bytes)?));
        }

        let looks_like_object = bytes
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .map_or(false, |b| *b == b'{');
        if looks_like_object {
            if let Ok(parsed) = serde_json::from_slice::<SynthesisResponse>(&bytes) {
                return Ok(SynthesisBody::Json(parsed));
            }
        }

        Ok(SynthesisBody::Audio { bytes, content_type })
    }

    /// File extension for a binary body, from its content type
    pub fn audio_extension(content_type: &str) -> &'static str {
        if content_type.contains("mpeg") || content_type.contains("mp3") {
            "mp3"
        } else if content_type.contains("ogg") {
            "ogg"
        } else {
            "wav"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_defaults_to_success() {
        let parsed: SynthesisResponse = serde_json::from_str(r#"{"audio_duration": 1.2}"#).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.audio_duration, Some(1.2));
        assert!(parsed.debug_audio_file.is_none());

        let parsed: SynthesisResponse =
            serde_json::from_str(r#"{"success": false, "error": "model not loaded"}"#).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error.as_deref(), Some("model not loaded"));
    }

    #[test]
    fn test_request_omits_unset_options() {
        let request = SynthesisRequest {
            text: "Hola",
            language: "es",
            voice: None,
            speed: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"text": "Hola", "language": "es"}));
    }

    #[test]
    fn test_classify_prefers_json_object() {
        let body = br#"{"success": false, "error": "model not loaded"}"#.to_vec();
        match SynthesisBody::classify("text/plain".to_string(), body).unwrap() {
            SynthesisBody::Json(response) => {
                assert!(!response.success);
                assert_eq!(response.error.as_deref(), Some("model not loaded"));
            }
            other => panic!("expected JSON, got {:?}", other),
        }

        let wav = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
        assert!(matches!(
            SynthesisBody::classify("audio/wav".to_string(), wav.clone()).unwrap(),
            SynthesisBody::Audio { .. }
        ));
        assert!(matches!(
            SynthesisBody::classify(String::new(), wav).unwrap(),
            SynthesisBody::Audio { .. }
        ));

        assert!(SynthesisBody::classify("application/json".to_string(), b"OK".to_vec()).is_err());
    }

    #[test]
    fn test_audio_extension() {
        assert_eq!(SynthesisBody::audio_extension("audio/mpeg"), "mp3");
        assert_eq!(SynthesisBody::audio_extension("audio/wav"), "wav");
        assert_eq!(SynthesisBody::audio_extension("application/octet-stream"), "wav");
    }
}
