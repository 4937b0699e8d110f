//! Collaborator gateway
//!
//! Implements every collaborator trait over a single JSON/HTTP gateway:
//! each call is a `POST <gateway>/<path>` with a JSON body. Binary payloads
//! travel base64-encoded.
//!
//! Failures are classified for the retry policy: connection errors,
//! timeouts, 408, 429 and 5xx are transient; any other status and any body
//! that cannot be decoded are terminal. A 404 on a record read means the
//! record does not exist.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use montage_core::domain::RecordStatus;
use montage_core::domain::image::{ImageGeneration, ImageParams};
use montage_core::domain::schedule::Schedule;
use montage_core::domain::user::User;
use montage_core::domain::video::{CaptionWord, RenderStatus, Video, VideoAssets};
use montage_engine::StepError;
use montage_engine::collaborators::*;

/// HTTP client for the collaborator gateway
#[derive(Debug, Clone)]
pub struct HttpGateway {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Deserialize)]
struct BinaryResponse {
    data: String,
}

#[derive(Deserialize)]
struct UrlResponse {
    url: String,
}

#[derive(Deserialize)]
struct WordsResponse {
    words: Vec<CaptionWord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderSubmitted {
    render_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessToken {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetsPatch<'a> {
    video_id: &'a str,
    #[serde(flatten)]
    assets: &'a VideoAssets,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build gateway HTTP client")?;

        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Wraps one shared gateway into the full collaborator set
    pub fn collaborators(self: Arc<Self>) -> Collaborators {
        Collaborators {
            store: self.clone(),
            text: self.clone(),
            voice: self.clone(),
            transcriber: self.clone(),
            images: self.clone(),
            storage: self.clone(),
            render: self.clone(),
            publisher: self.clone(),
            notifier: self,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, StepError> {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(path, &e))
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, StepError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(path, &e))?;

        if !status.is_success() {
            return Err(classify_status(path, status, &String::from_utf8_lossy(&body)));
        }

        serde_json::from_slice(&body).map_err(|e| {
            StepError::terminal(format!("gateway {path} returned an undecodable body: {e}"))
        })
    }

    async fn call<B, T>(&self, path: &str, body: &B) -> Result<T, StepError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(path, body).await?;
        Self::decode(path, response).await
    }

    /// Record read where 404 means "does not exist"
    async fn call_optional<B, T>(&self, path: &str, body: &B) -> Result<Option<T>, StepError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(path, body).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(path, response).await.map(Some)
    }

    /// Call whose response body is ignored
    async fn call_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), StepError> {
        let response = self.send(path, body).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(path, status, &body))
    }

    /// Like `call_empty`, except that a 404 means the record is already gone
    async fn call_delete<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), StepError> {
        let response = self.send(path, body).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(path, status, &body))
    }
}

/// Classifies a non-success status
pub fn classify_status(path: &str, status: StatusCode, body: &str) -> StepError {
    let message = format!("gateway {path} returned {status}: {}", body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        StepError::transient(message)
    } else {
        StepError::terminal(message)
    }
}

fn transport_error(path: &str, err: &reqwest::Error) -> StepError {
    if err.is_decode() {
        StepError::terminal(format!("gateway {path}: {err}"))
    } else {
        StepError::transient(format!("gateway {path}: {err}"))
    }
}

fn decode_base64(path: &str, data: &str) -> Result<Vec<u8>, StepError> {
    STANDARD
        .decode(data)
        .map_err(|e| StepError::terminal(format!("gateway {path} returned invalid base64: {e}")))
}

#[async_trait]
impl DomainStore for HttpGateway {
    async fn get_video(&self, video_id: &str) -> Result<Option<Video>, StepError> {
        self.call_optional("store/videos/get", &json!({ "videoId": video_id }))
            .await
    }

    async fn update_video_status(
        &self,
        video_id: &str,
        status: RecordStatus,
    ) -> Result<(), StepError> {
        self.call_empty(
            "store/videos/status",
            &json!({ "videoId": video_id, "status": status }),
        )
        .await
    }

    async fn save_video_assets(
        &self,
        video_id: &str,
        assets: &VideoAssets,
    ) -> Result<(), StepError> {
        self.call_empty("store/videos/assets", &AssetsPatch { video_id, assets })
            .await
    }

    async fn update_render_status(
        &self,
        video_id: &str,
        rendering: RenderStatus,
    ) -> Result<(), StepError> {
        self.call_empty(
            "store/videos/rendering",
            &json!({ "videoId": video_id, "rendering": rendering }),
        )
        .await
    }

    async fn save_video_url(&self, video_id: &str, video_url: &str) -> Result<(), StepError> {
        self.call_empty(
            "store/videos/url",
            &json!({ "videoId": video_id, "videoUrl": video_url }),
        )
        .await
    }

    async fn get_image_generation(
        &self,
        image_id: &str,
    ) -> Result<Option<ImageGeneration>, StepError> {
        self.call_optional("store/images/get", &json!({ "imageId": image_id }))
            .await
    }

    async fn update_image_generation(
        &self,
        image_id: &str,
        status: RecordStatus,
        image: Option<&str>,
    ) -> Result<(), StepError> {
        self.call_empty(
            "store/images/update",
            &json!({ "imageId": image_id, "status": status, "image": image }),
        )
        .await
    }

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>, StepError> {
        self.call_optional("store/schedules/get", &json!({ "scheduleId": schedule_id }))
            .await
    }

    async fn update_schedule_status(
        &self,
        schedule_id: &str,
        status: RecordStatus,
    ) -> Result<(), StepError> {
        self.call_empty(
            "store/schedules/status",
            &json!({ "scheduleId": schedule_id, "status": status }),
        )
        .await
    }

    async fn rearm_schedule(
        &self,
        schedule_id: &str,
        datetime: DateTime<Utc>,
    ) -> Result<(), StepError> {
        self.call_empty(
            "store/schedules/rearm",
            &json!({ "scheduleId": schedule_id, "datetime": datetime }),
        )
        .await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StepError> {
        self.call_optional("store/users/get", &json!({ "userId": user_id }))
            .await
    }

    async fn delete_video(&self, video_id: &str) -> Result<(), StepError> {
        self.call_delete("store/videos/delete", &json!({ "videoId": video_id }))
            .await
    }

    async fn delete_image_generation(&self, image_id: &str) -> Result<(), StepError> {
        self.call_delete("store/images/delete", &json!({ "imageId": image_id }))
            .await
    }

    async fn delete_schedule(&self, schedule_id: &str) -> Result<(), StepError> {
        self.call_delete("store/schedules/delete", &json!({ "scheduleId": schedule_id }))
            .await
    }
}

#[async_trait]
impl TextGenerator for HttpGateway {
    async fn generate(&self, prompt: &str) -> Result<String, StepError> {
        let response: TextResponse = self
            .call("text/generate", &json!({ "prompt": prompt }))
            .await?;
        Ok(response.text)
    }
}

#[async_trait]
impl VoiceSynthesizer for HttpGateway {
    async fn speak(&self, text: &str, voice: &str) -> Result<Vec<u8>, StepError> {
        let path = "voice/speak";
        let response: BinaryResponse = self
            .call(path, &json!({ "text": text, "voice": voice }))
            .await?;
        decode_base64(path, &response.data)
    }
}

#[async_trait]
impl Transcriber for HttpGateway {
    async fn transcribe(&self, audio_url: &str) -> Result<Vec<CaptionWord>, StepError> {
        let response: WordsResponse = self
            .call("transcribe", &json!({ "audioUrl": audio_url }))
            .await?;
        Ok(response.words)
    }
}

#[async_trait]
impl ImageGenerator for HttpGateway {
    async fn generate(
        &self,
        params: &ImageParams,
        reference_image: Option<&str>,
    ) -> Result<Vec<u8>, StepError> {
        let path = "images/generate";
        let response: BinaryResponse = self
            .call(
                path,
                &json!({ "params": params, "referenceImage": reference_image }),
            )
            .await?;
        decode_base64(path, &response.data)
    }
}

#[async_trait]
impl ObjectStorage for HttpGateway {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, StepError> {
        let response: UrlResponse = self
            .call(
                "storage/upload",
                &json!({ "fileName": file_name, "data": STANDARD.encode(bytes) }),
            )
            .await?;
        Ok(response.url)
    }
}

#[async_trait]
impl RenderFarm for HttpGateway {
    async fn submit(&self, request: &RenderRequest) -> Result<String, StepError> {
        let response: RenderSubmitted = self.call("render/submit", request).await?;
        Ok(response.render_id)
    }

    async fn poll(&self, render_id: &str) -> Result<RenderProgress, StepError> {
        self.call("render/poll", &json!({ "renderId": render_id }))
            .await
    }
}

#[async_trait]
impl PublishingPlatform for HttpGateway {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, StepError> {
        let response: AccessToken = self
            .call("publish/token", &json!({ "refreshToken": refresh_token }))
            .await?;
        Ok(response.access_token)
    }

    async fn publish(
        &self,
        access_token: &str,
        video_url: &str,
        metadata: &PublishMetadata,
    ) -> Result<PublishReceipt, StepError> {
        self.call(
            "publish/upload",
            &json!({
                "accessToken": access_token,
                "videoUrl": video_url,
                "metadata": metadata,
            }),
        )
        .await
    }
}

#[async_trait]
impl Notifier for HttpGateway {
    async fn send_email(&self, to: &str, notice: &PublishedNotice) -> Result<(), StepError> {
        self.call_empty("notify/email", &json!({ "to": to, "template": notice }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses_are_transient() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(classify_status("text/generate", status, "").is_transient(), "{status}");
        }
    }

    #[test]
    fn test_client_errors_are_terminal() {
        let err = classify_status("publish/token", StatusCode::BAD_REQUEST, "invalid_grant\n");
        assert!(!err.is_transient());
        assert!(err.message().contains("invalid_grant"));
        assert!(err.message().contains("publish/token"));

        assert!(!classify_status("images/generate", StatusCode::FORBIDDEN, "").is_transient());
    }

    #[test]
    fn test_invalid_base64_is_terminal() {
        assert_eq!(decode_base64("voice/speak", "UklGRg==").unwrap(), b"RIFF");
        assert!(!decode_base64("voice/speak", "not base64!").unwrap_err().is_transient());
    }

    #[test]
    fn test_assets_patch_is_flat() {
        let assets = VideoAssets {
            audio_url: "https://cdn/a.wav".to_string(),
            captions: Vec::new(),
            images: vec!["https://cdn/0.png".to_string()],
            title: "Deep".to_string(),
            status: RecordStatus::Completed,
        };
        let body = serde_json::to_value(AssetsPatch {
            video_id: "v1",
            assets: &assets,
        })
        .unwrap();

        assert_eq!(body["videoId"], "v1");
        assert_eq!(body["status"], "COMPLETED");
        assert!(body.get("assets").is_none());
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let gateway = HttpGateway::with_client("http://gateway:9090/", Client::new());
        assert_eq!(gateway.url("render/poll"), "http://gateway:9090/render/poll");
    }
}
