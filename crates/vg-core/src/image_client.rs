use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, info};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use crate::config::ImageClientConfig;
use crate::error::{Error, Result};

/// Source of raster images for a prompt
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    steps: u32,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoadingResponse {
    estimated_time: Option<f64>,
}

enum Submission {
    Ready(GenerateResponse),
    WarmingUp { wait: Duration, body: String },
}

/// Client for an OpenAI-style `/images/generations` endpoint.
///
/// A 503 response means the model is still being loaded. The client waits
/// for the advertised time and retries once; everything else is surfaced as
/// [`Error::Upstream`].
pub struct RemoteImageClient {
    config: ImageClientConfig,
    http: reqwest::Client,
    retries: AtomicU32,
}

impl RemoteImageClient {
    pub fn new(config: ImageClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            config,
            http,
            retries: AtomicU32::new(0),
        })
    }

    /// Number of warm-up retries performed over the client's lifetime
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.config.api_base.trim_end_matches('/'))
    }

    async fn submit(&self, api_key: &str, body: &GenerateRequest<'_>) -> Result<Submission> {
        let response = self.http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(body)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            let header_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok());
            let text = response.text().await.unwrap_or_default();
            let body_secs = serde_json::from_str::<LoadingResponse>(&text)
                .ok()
                .and_then(|r| r.estimated_time);

            return Ok(Submission::WarmingUp {
                wait: self.warmup_delay(body_secs.or(header_secs)),
                body: text.trim().to_string(),
            });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::upstream(Some(status.as_u16()), text.trim()));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(Some(status.as_u16()), format!("Failed to parse response: {e}")))?;

        Ok(Submission::Ready(parsed))
    }

    fn warmup_delay(&self, advertised_secs: Option<f64>) -> Duration {
        advertised_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(|s| Duration::try_from_secs_f64(s).unwrap_or(self.config.max_warmup_wait))
            .unwrap_or(self.config.warmup_wait)
            .min(self.config.max_warmup_wait)
    }

    async fn extract_image(&self, response: GenerateResponse) -> Result<Vec<u8>> {
        let Some(first) = response.data.into_iter().next() else {
            return Err(Error::upstream(None, "The API response does not include an image"));
        };

        if let Some(encoded) = first.b64_json {
            return BASE64
                .decode(encoded.trim())
                .map_err(|e| Error::upstream(None, format!("Invalid inline image data: {e}")));
        }

        match first.url {
            Some(url) => self.download(&url).await,
            None => Err(Error::upstream(None, "The API response does not include an image URL")),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Downloading generated image from {}", url);

        let response = self.http
            .get(url)
            .timeout(self.config.download_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::upstream(Some(status.as_u16()), format!("Image download failed: {}", text.trim())));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::upstream(Some(status.as_u16()), "Downloaded image is empty"));
        }

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageGenerator for RemoteImageClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let api_key = self.config.api_key.as_deref().ok_or(Error::MissingCredential)?;

        let body = GenerateRequest {
            model: self.config.model.id(),
            prompt,
            steps: self.config.steps,
            n: 1,
        };

        let response = match self.submit(api_key, &body).await? {
            Submission::Ready(r) => r,
            Submission::WarmingUp { wait, .. } => {
                info!("Model {} is warming up, retrying in {:.1}s", self.config.model.id(), wait.as_secs_f64());
                self.retries.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(wait).await;

                match self.submit(api_key, &body).await? {
                    Submission::Ready(r) => r,
                    Submission::WarmingUp { body, .. } => {
                        return Err(Error::upstream(
                            Some(StatusCode::SERVICE_UNAVAILABLE.as_u16()),
                            format!("Model is still loading after retry: {body}"),
                        ));
                    }
                }
            }
        };

        self.extract_image(response).await
    }
}
