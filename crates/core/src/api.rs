use std::collections::HashMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info};

use crate::{
    error::ApiError,
    types::{AnalyzeResponse, Checkpoint, DeepDiveBatchResponse, UserProfile},
};

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    youtube_url: &'a str,
    user_profile: &'a UserProfile,
}

#[derive(Debug, Serialize)]
struct DeepDiveBatchRequest<'a> {
    user_profile: &'a UserProfile,
    checkpoints: &'a [Checkpoint],
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Client of the lesson backend.
#[derive(Debug, Clone)]
pub struct KaptionApi {
    client: reqwest::Client,
    api_base: String,
}

impl KaptionApi {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Finds the checkpoints of a YouTube video for this learner.
    pub async fn analyze(
        &self,
        youtube_url: &str,
        user_profile: &UserProfile,
    ) -> Result<AnalyzeResponse, ApiError> {
        let response: AnalyzeResponse = self
            .post(
                "/api/analyze",
                &AnalyzeRequest {
                    youtube_url,
                    user_profile,
                },
            )
            .await?;

        info!(
            analysis_id = response.analysis_id.as_deref().unwrap_or("-"),
            status = %response.status,
            checkpoints = response.checkpoints.len(),
            "video analyzed"
        );
        Ok(response)
    }

    /// Builds one lesson per checkpoint, in checkpoint order.
    pub async fn deep_dive_batch(
        &self,
        user_profile: &UserProfile,
        checkpoints: &[Checkpoint],
    ) -> Result<DeepDiveBatchResponse, ApiError> {
        self.post(
            "/api/deepdive/batch",
            &DeepDiveBatchRequest {
                user_profile,
                checkpoints,
            },
        )
        .await
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let endpoint = "/health";
        let response = self
            .client
            .get(format!("{}{endpoint}", self.api_base))
            .send()
            .await?;
        Self::decode(endpoint, response).await
    }

    async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(endpoint, "POST");
        let response = self
            .client
            .post(format!("{}{endpoint}", self.api_base))
            .json(body)
            .send()
            .await?;
        Self::decode(endpoint, response).await
    }

    async fn decode<T: DeserializeOwned>(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    use super::*;
    use crate::types::LanguageLevel;

    fn profile() -> UserProfile {
        UserProfile::new(2, LanguageLevel::Beginner, vec!["food".into()])
    }

    fn checkpoint_json() -> serde_json::Value {
        json!({
            "timestamp_seconds": 42.0,
            "timestamp_formatted": "00:42",
            "trigger_keyword": "눈치/nunchi",
            "segment_stt": "he read the room",
            "scene_description": "an office",
            "context_title": "Nunchi",
            "explanation": {"summary": "s", "main": "m", "tip": "t"}
        })
    }

    #[tokio::test]
    async fn analyze_posts_url_and_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .and(body_json(json!({
                "youtube_url": "https://youtu.be/abc",
                "user_profile": {"familiarity": 2, "language_level": "Beginner", "interests": ["food"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "video_info": {"title": "Vlog", "total_duration": 600.0},
                "checkpoints": [checkpoint_json()],
                "analysis_id": "a-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = KaptionApi::new(format!("{}/", server.uri()));
        let response = api.analyze("https://youtu.be/abc", &profile()).await.unwrap();

        assert_eq!(response.status, "success");
        assert_eq!(response.checkpoints.len(), 1);
        assert_eq!(response.checkpoints[0].trigger_keywords(), vec!["눈치", "nunchi"]);
    }

    #[tokio::test]
    async fn batch_decodes_lessons() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/deepdive/batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "recap": {"detailed": {"summary_main": "Nunchi is social awareness."}},
                    "tps": {"think": {"prompt": "When did you read the room?", "guiding_questions": ["Where?"]}},
                    "quizzes": [{"question": "q", "options": ["A", "B"], "correct_index": 1}]
                }]
            })))
            .mount(&server)
            .await;

        let api = KaptionApi::new(server.uri());
        let checkpoint: Checkpoint = serde_json::from_value(checkpoint_json()).unwrap();
        let batch = api.deep_dive_batch(&profile(), &[checkpoint]).await.unwrap();

        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].recap_summary(), "Nunchi is social awareness.");
        assert_eq!(batch.items[0].quizzes.len(), 1);
    }

    #[tokio::test]
    async fn error_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid url"))
            .mount(&server)
            .await;

        let api = KaptionApi::new(server.uri());
        let err = api.analyze("nope", &profile()).await.unwrap_err();

        assert!(matches!(
            err,
            ApiError::Status { status: 422, ref body, .. } if body == "invalid url"
        ));
    }

    #[tokio::test]
    async fn health_reports_degraded_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "degraded",
                "details": {"service": "healthy", "api_key": "missing"}
            })))
            .mount(&server)
            .await;

        let health = KaptionApi::new(server.uri()).health().await.unwrap();

        assert!(!health.is_healthy());
        assert_eq!(health.details["api_key"], "missing");
    }
}
