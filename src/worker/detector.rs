use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::result::BoundingBox;
use crate::worker::shell::Scratch;

/// Black-box image analysis run inside the compute worker.
///
/// `detect` writes its outputs into `scratch`; leaving either output empty
/// means the job failed.
#[async_trait]
pub trait Detector: Send + 'static {
    /// Load the runtime and model. Called once before `Ready` is emitted.
    async fn load(&mut self) -> Result<(), DetectorError>;

    async fn detect(&mut self, image: &[u8], scratch: &mut Scratch) -> Result<(), DetectorError>;
}

const LOAD_ATTEMPTS: u32 = 30;
const LOAD_RETRY: Duration = Duration::from_secs(2);

/// Client for an external inference service.
///
/// Expects `GET {base}/health` to succeed once the model is loaded and
/// `POST {base}/detect` to answer with the processed image and detections.
pub struct HttpDetector {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct DetectRequest {
    image: String,
}

#[derive(Deserialize)]
struct DetectResponse {
    image: Option<String>,
    detections: Option<Vec<BoundingBox>>,
}

impl HttpDetector {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn load(&mut self) -> Result<(), DetectorError> {
        let url = format!("{}/health", self.base_url);

        for attempt in 1..=LOAD_ATTEMPTS {
            match self.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(url = %url, attempt, "Inference service ready");
                    return Ok(());
                }
                Ok(response) => {
                    tracing::debug!(status = %response.status(), attempt, "Inference service not ready");
                }
                Err(e) => {
                    tracing::debug!(error = %e, attempt, "Inference service unreachable");
                }
            }
            tokio::time::sleep(LOAD_RETRY).await;
        }

        Err(DetectorError::Load(format!(
            "{url} did not become ready after {LOAD_ATTEMPTS} attempts"
        )))
    }

    async fn detect(&mut self, image: &[u8], scratch: &mut Scratch) -> Result<(), DetectorError> {
        let engine = base64::engine::general_purpose::STANDARD;
        let request = DetectRequest {
            image: engine.encode(image),
        };

        let response: DetectResponse = self
            .http
            .post(format!("{}/detect", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(encoded) = response.image {
            scratch.image = Some(engine.decode(encoded)?);
        }
        scratch.detections = response.detections;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Processed image is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Detector failed to load: {0}")]
    Load(String),

    #[error("Detector failed: {0}")]
    Failed(String),
}
