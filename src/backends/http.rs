//! JSON-over-HTTP adapter for every pipeline collaborator.
//!
//! One service exposes five endpoints, all `POST` with JSON bodies:
//!
//! | Endpoint     | Request                    | Response                 |
//! |--------------|----------------------------|--------------------------|
//! | `/hotspots`  | `{keywords, count}`        | `{hotspots: [Hotspot]}`  |
//! | `/complete`  | `{prompt}`                 | `Completion`             |
//! | `/generate`  | `ShotSpec`                 | `{url}`                  |
//! | `/features`  | `{imageUrl}`               | `ImageFeatures`          |
//! | `/compose`   | `SynthesisRequest`         | `{videoPath}`            |

use std::time::Duration;

use async_trait::async_trait;
use clipforge_common::{
    BackendError, Completion, FeatureExtractor, FeatureOutcome, GeneratedImage,
    GenerationBackend, Hotspot, HotspotSource, ImageFeatures, ShotSpec, SynthesisRequest,
    Synthesizer, TextModel,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::clipforge_config::BackendSection;
use crate::util::truncate;

const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Deserialize)]
struct HotspotsResponse {
    hotspots: Vec<Hotspot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComposeResponse {
    video_path: String,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Transport {
                service: "backend".into(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build from `[backend]`, applying the URL override and reading the
    /// bearer token from the configured environment variable.
    pub fn from_config(section: &BackendSection) -> Result<Self, BackendError> {
        let api_key = section.api_key();
        if api_key.is_none() {
            tracing::debug!(env = %section.api_key_env, "no API key set, sending unauthenticated requests");
        }
        Self::new(
            &section.resolved_base_url(),
            api_key,
            Duration::from_secs(section.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, service: &str, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(service, url = %url, "backend request");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| BackendError::Transport {
            service: service.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(service, status = status.as_u16(), "backend returned error status");
            return Err(BackendError::Http {
                service: service.to_string(),
                status: status.as_u16(),
                message: truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        let bytes = response.bytes().await.map_err(|e| BackendError::Transport {
            service: service.to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| BackendError::InvalidResponse {
            service: service.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl HotspotSource for HttpBackend {
    async fn fetch(&self, keywords: &[String], count: usize) -> Result<Vec<Hotspot>, BackendError> {
        let response: HotspotsResponse = self
            .post(
                "hotspots",
                "/hotspots",
                &json!({ "keywords": keywords, "count": count }),
            )
            .await?;
        Ok(response.hotspots)
    }
}

#[async_trait]
impl TextModel for HttpBackend {
    async fn complete(&self, prompt: &str) -> Result<Completion, BackendError> {
        self.post("text_model", "/complete", &json!({ "prompt": prompt }))
            .await
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(&self, shot: &ShotSpec) -> Result<GeneratedImage, BackendError> {
        self.post("generation", "/generate", shot).await
    }
}

#[async_trait]
impl FeatureExtractor for HttpBackend {
    async fn extract(&self, image_url: &str) -> FeatureOutcome {
        let result: Result<ImageFeatures, BackendError> = self
            .post("features", "/features", &json!({ "imageUrl": image_url }))
            .await;
        match result {
            Ok(features) => FeatureOutcome::Extracted(features),
            Err(e) => {
                tracing::warn!(image_url, error = %e, "feature extraction unavailable");
                FeatureOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Synthesizer for HttpBackend {
    async fn compose(&self, request: &SynthesisRequest) -> Result<String, BackendError> {
        let response: ComposeResponse = self.post("synthesis", "/compose", request).await?;
        Ok(response.video_path)
    }
}
