use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{error::VoiceChannelError, voice::VoiceStyle};

/// Body of the ephemeral credential request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionTokenRequest {
    pub model: String,
    pub voice: String,
    pub instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<Value>,
}

impl SessionTokenRequest {
    pub fn new(model: impl Into<String>, style: &VoiceStyle) -> Self {
        Self {
            model: model.into(),
            voice: style.voice.clone(),
            instructions: style.instructions.clone(),
            tools: style.tools.clone(),
            tool_choice: style.tool_choice.clone(),
            turn_detection: style.turn_detection.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

#[derive(Debug, Deserialize)]
struct SessionTokenResponse {
    client_secret: ClientSecret,
}

/// Out-of-band exchanges needed before the peer connection carries media.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Returns a short-lived bearer credential for one realtime session.
    async fn session_token(&self, request: &SessionTokenRequest) -> Result<String, VoiceChannelError>;

    /// Posts the local SDP offer and returns the remote SDP answer.
    async fn exchange_sdp(
        &self,
        model: &str,
        offer_sdp: &str,
        token: &str,
    ) -> Result<String, VoiceChannelError>;
}

/// Credential from the backend proxy, SDP straight to the realtime endpoint.
#[derive(Debug, Clone)]
pub struct HttpSignaling {
    client: reqwest::Client,
    api_base: String,
    realtime_url: String,
}

impl HttpSignaling {
    pub fn new(api_base: impl Into<String>, realtime_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_base, realtime_url)
    }

    pub fn with_client(
        client: reqwest::Client,
        api_base: impl Into<String>,
        realtime_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            realtime_url: realtime_url.into(),
        }
    }
}

fn credential_failed(reason: impl ToString) -> VoiceChannelError {
    VoiceChannelError::CredentialFetchFailed {
        reason: reason.to_string(),
    }
}

fn negotiation_failed(reason: impl ToString) -> VoiceChannelError {
    VoiceChannelError::NegotiationFailed {
        reason: reason.to_string(),
    }
}

#[async_trait]
impl Signaling for HttpSignaling {
    async fn session_token(&self, request: &SessionTokenRequest) -> Result<String, VoiceChannelError> {
        let url = format!("{}/api/tts/session-token", self.api_base);
        debug!(%url, model = %request.model, voice = %request.voice, "requesting session token");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(credential_failed)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(credential_failed(format!("{status}: {body}")));
        }

        let token: SessionTokenResponse = response.json().await.map_err(credential_failed)?;
        Ok(token.client_secret.value)
    }

    async fn exchange_sdp(
        &self,
        model: &str,
        offer_sdp: &str,
        token: &str,
    ) -> Result<String, VoiceChannelError> {
        let response = self
            .client
            .post(&self.realtime_url)
            .query(&[("model", model)])
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(negotiation_failed)?;

        let status = response.status();
        let body = response.text().await.map_err(negotiation_failed)?;
        if !status.is_success() {
            return Err(negotiation_failed(format!("{status}: {body}")));
        }

        debug!(answer_bytes = body.len(), "received SDP answer");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, body_string, header, method, path, query_param},
    };

    use super::*;

    #[tokio::test]
    async fn fetches_session_token_from_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tts/session-token"))
            .and(body_json(json!({
                "model": "gpt-4o-realtime-preview-2024-12-17",
                "voice": "sage",
                "instructions": crate::voice::style::DEFAULT_INSTRUCTIONS,
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"client_secret": {"value": "ek_123"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let signaling = HttpSignaling::new(server.uri(), format!("{}/v1/realtime", server.uri()));
        let request =
            SessionTokenRequest::new("gpt-4o-realtime-preview-2024-12-17", &VoiceStyle::default());

        assert_eq!(signaling.session_token(&request).await.unwrap(), "ek_123");
    }

    #[tokio::test]
    async fn token_error_status_is_a_credential_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tts/session-token"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let signaling = HttpSignaling::new(server.uri(), server.uri());
        let request = SessionTokenRequest::new("m", &VoiceStyle::default());

        let err = signaling.session_token(&request).await.unwrap_err();
        assert!(matches!(err, VoiceChannelError::CredentialFetchFailed { reason } if reason.contains("boom")));
    }

    #[tokio::test]
    async fn token_without_secret_is_a_credential_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sess"})))
            .mount(&server)
            .await;

        let signaling = HttpSignaling::new(server.uri(), server.uri());
        let request = SessionTokenRequest::new("m", &VoiceStyle::default());

        assert!(matches!(
            signaling.session_token(&request).await,
            Err(VoiceChannelError::CredentialFetchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn posts_offer_as_sdp_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/realtime"))
            .and(query_param("model", "rt-model"))
            .and(header("authorization", "Bearer ek_123"))
            .and(header("content-type", "application/sdp"))
            .and(body_string("v=0 offer"))
            .respond_with(ResponseTemplate::new(201).set_body_string("v=0 answer"))
            .expect(1)
            .mount(&server)
            .await;

        let signaling = HttpSignaling::new(server.uri(), format!("{}/v1/realtime", server.uri()));

        let answer = signaling.exchange_sdp("rt-model", "v=0 offer", "ek_123").await.unwrap();
        assert_eq!(answer, "v=0 answer");
    }

    #[tokio::test]
    async fn rejected_offer_is_a_negotiation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let signaling = HttpSignaling::new(server.uri(), format!("{}/v1/realtime", server.uri()));

        assert!(matches!(
            signaling.exchange_sdp("m", "offer", "t").await,
            Err(VoiceChannelError::NegotiationFailed { .. })
        ));
    }
}
