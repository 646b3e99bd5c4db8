//! HTTP client for the farm backend
//!
//! One client type serves both bases: the backend itself (guest usage and
//! analysis endpoints) and the local proxy (tasks, plantings and signed-in
//! analysis), which exposes the same `/api/...` paths.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use crate::analysis::{AnalysisResult, ImageUpload};
use crate::device::DeviceIdentity;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::{AnalysisCategory, NewPlanting, Planting};

/// Response from GET /api/guest/{deviceId}
///
/// Counters are per category; older backends send a single `attempts`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestUsageRecord {
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub disease_attempts: Option<u32>,
    #[serde(default)]
    pub variety_attempts: Option<u32>,
    #[serde(default)]
    pub limit_reached: bool,
    #[serde(default)]
    pub requires_signup: bool,
}

impl GuestUsageRecord {
    /// Attempts used for `category`
    pub fn attempts_for(&self, category: AnalysisCategory) -> u32 {
        let specific = match category {
            AnalysisCategory::Disease => self.disease_attempts,
            AnalysisCategory::Variety => self.variety_attempts,
        };
        specific.or(self.attempts).unwrap_or(0)
    }
}

/// HTTP client for the farm backend or the local proxy
#[derive(Debug, Clone)]
pub struct BackendClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client for `base_url` (trailing slashes are ignored)
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("base URL must not be empty".to_string()));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "base URL must start with http:// or https://: {}",
                base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("musa/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ============================================
    // Guest endpoints
    // ============================================

    /// Look up a guest device's usage.
    ///
    /// Returns `None` when the backend has never seen the device (404).
    pub async fn guest_usage(&self, device: &DeviceIdentity) -> Result<Option<GuestUsageRecord>> {
        let url = self.url(&format!(
            "/api/guest/{}",
            urlencoding::encode(device.as_str())
        ));

        let response = self.http_client.get(&url).send().await.map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        let record = response
            .json::<GuestUsageRecord>()
            .await
            .map_err(|e| Error::Decode(e.to_string()))?;
        Ok(Some(record))
    }

    /// Ask whether the device has hit its limit; the body is a bare boolean.
    pub async fn guest_limit_reached(
        &self,
        device: &DeviceIdentity,
        category: AnalysisCategory,
    ) -> Result<bool> {
        let url = self.url(&format!(
            "/api/guest/{}/limit/{}",
            category.as_str(),
            urlencoding::encode(device.as_str())
        ));

        let response = self.http_client.get(&url).send().await.map_err(transport)?;
        let response = ensure_success(response).await?;

        response
            .json::<bool>()
            .await
            .map_err(|e| Error::Decode(e.to_string()))
    }

    /// Analyze an image as a guest.
    ///
    /// HTTP 400 from this endpoint means the guest limit is reached and maps
    /// to [`Error::LimitReached`].
    pub async fn analyze_as_guest(
        &self,
        category: AnalysisCategory,
        image: &ImageUpload,
        device: &DeviceIdentity,
    ) -> Result<AnalysisResult> {
        let url = self.url(&format!("/api/{}/analyze", category.resource()));

        let form = Form::new()
            .part("imageFile", image_part(image)?)
            .text("deviceId", device.as_str().to_string());

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::BAD_REQUEST {
            tracing::info!(device_id = %device, %category, "Guest analysis rejected with 400, limit reached");
            return Err(Error::LimitReached);
        }

        let response = ensure_success(response).await?;
        let value = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| Error::Decode(e.to_string()))?;
        AnalysisResult::from_response(value)
    }

    // ============================================
    // Authenticated analysis endpoints
    // ============================================

    /// Create an analysis for the signed-in user. The response body is ignored.
    pub async fn create_analysis(
        &self,
        category: AnalysisCategory,
        image: &ImageUpload,
        session: &Session,
    ) -> Result<()> {
        let url = self.url(&format!("/api/{}/create", category.resource()));

        let form = Form::new()
            .part("imageFile", image_part(image)?)
            .text("userId", session.user_id.clone());

        let response = self
            .http_client
            .post(&url)
            .header(AUTHORIZATION, session.bearer())
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        ensure_success(response).await?;
        Ok(())
    }

    /// All analyses of the signed-in user, oldest first
    pub async fn user_results(
        &self,
        category: AnalysisCategory,
        session: &Session,
    ) -> Result<Vec<AnalysisResult>> {
        let url = self.url(&format!(
            "/api/{}/user/{}",
            category.resource(),
            urlencoding::encode(&session.user_id)
        ));

        let response = self
            .http_client
            .get(&url)
            .header(AUTHORIZATION, session.bearer())
            .send()
            .await
            .map_err(transport)?;
        let response = ensure_success(response).await?;

        let values = response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| Error::Decode(e.to_string()))?;

        values.into_iter().map(AnalysisResult::from_response).collect()
    }

    // ============================================
    // Tasks and plantings (through the proxy)
    // ============================================

    /// POST /api/tasks/{taskId}/complete with no body
    pub async fn complete_task(&self, task_id: i64, session: &Session) -> Result<()> {
        let url = self.url(&format!("/api/tasks/{}/complete", task_id));

        let response = self
            .http_client
            .post(&url)
            .header(AUTHORIZATION, session.bearer())
            .send()
            .await
            .map_err(transport)?;

        ensure_success(response).await?;
        Ok(())
    }

    /// Fetch one planting with its tasks
    pub async fn planting(&self, planting_id: i64, session: &Session) -> Result<Planting> {
        let url = self.url(&format!("/api/plantings/{}", planting_id));
        self.get_json(&url, session).await
    }

    /// List the user's plantings, optionally only the active ones
    pub async fn plantings(&self, session: &Session, active_only: bool) -> Result<Vec<Planting>> {
        let path = if active_only {
            "/api/plantings/active"
        } else {
            "/api/plantings"
        };
        self.get_json(&self.url(path), session).await
    }

    /// Create a planting
    pub async fn create_planting(
        &self,
        planting: &NewPlanting,
        session: &Session,
    ) -> Result<Planting> {
        let url = self.url("/api/plantings");

        let response = self
            .http_client
            .post(&url)
            .header(AUTHORIZATION, session.bearer())
            .json(planting)
            .send()
            .await
            .map_err(transport)?;
        let response = ensure_success(response).await?;

        response
            .json::<Planting>()
            .await
            .map_err(|e| Error::Decode(e.to_string()))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        session: &Session,
    ) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .header(AUTHORIZATION, session.bearer())
            .send()
            .await
            .map_err(transport)?;
        let response = ensure_success(response).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

fn image_part(image: &ImageUpload) -> Result<Part> {
    Part::bytes(image.bytes.clone())
        .file_name(image.file_name.clone())
        .mime_str(&image.mime_type)
        .map_err(|e| Error::Validation(format!("invalid image type {}: {}", image.mime_type, e)))
}

fn transport(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transport(format!("timeout: {}", e))
    } else {
        Error::Transport(e.to_string())
    }
}

/// Turn a non-success response into [`Error::Api`] carrying the raw body
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}
