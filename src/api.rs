//! Backend client: one stateless call per REST operation.
//!
//! DESIGN
//! ======
//! [`AssistantApi`] is the seam between the state machine and the network.
//! [`HttpAssistantApi`] implements it over `reqwest`; tests substitute a
//! scripted mock. Nothing here retries or remembers anything between calls:
//! every failure comes back as an [`ApiError`] for the caller to interpret.
//!
//! All routes hang off `{apiServer}/api`. The acting user travels as the
//! `userId` query parameter.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AssistantConfig;
use crate::error::ApiError;
use crate::types::{AssistantMessage, ChassisId, Conversation, DeleteCounts, Liked, MessagePair, SearchKey};

// =============================================================================
// TRAIT
// =============================================================================

/// Backend operations the conversation state machine depends on.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// `GET /conversation?chassisId&userId`: find or create the conversation.
    async fn init_or_load_conversation(&self, chassis_id: &ChassisId, user_id: &str) -> Result<Conversation, ApiError>;

    /// `POST /conversation/{id}/message?userId`.
    async fn send_message(&self, conversation_id: &str, content: &str, user_id: &str) -> Result<MessagePair, ApiError>;

    /// `GET /conversation/{id}/message/{msgId}?userId`. May still be pending.
    async fn poll_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> Result<AssistantMessage, ApiError>;

    /// `PUT /conversation/{id}/message/{msgId}/feedback?userId`.
    async fn send_feedback(
        &self,
        conversation_id: &str,
        message_id: &str,
        liked: Liked,
        user_id: &str,
    ) -> Result<AssistantMessage, ApiError>;

    /// `GET /search/keys`, with ids assigned from response order.
    async fn search_keys(&self) -> Result<Vec<SearchKey>, ApiError>;

    /// `POST /conversation/{id}/search?userId`. Returns the whole updated
    /// conversation.
    async fn custom_search(
        &self,
        conversation_id: &str,
        search_keys: &[SearchKey],
        count_needed: Option<u32>,
        user_id: &str,
    ) -> Result<Conversation, ApiError>;

    /// `DELETE /conversation/{id}?userId`.
    async fn delete_conversation(&self, conversation_id: &str, user_id: &str) -> Result<DeleteCounts, ApiError>;

    /// `DELETE /user/conversations?userId`: every conversation of the user.
    async fn delete_user_conversations(&self, user_id: &str) -> Result<DeleteCounts, ApiError>;
}

// =============================================================================
// WIRE BODIES
// =============================================================================

#[derive(Serialize)]
struct MessageBody<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct FeedbackBody {
    liked: Liked,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    search_keys: &'a [SearchKey],
    #[serde(skip_serializing_if = "Option::is_none")]
    count_needed: Option<u32>,
}

/// `GET /version` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

/// Give each key a sequential string id in catalog order.
pub fn assign_sequential_ids(keys: &mut [SearchKey]) {
    for (idx, key) in keys.iter_mut().enumerate() {
        key.id = idx.to_string();
    }
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

#[derive(Clone)]
pub struct HttpAssistantApi {
    http: reqwest::Client,
    base: Url,
}

impl HttpAssistantApi {
    /// Build a client for the configured API server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidBaseUrl`] if the server URL cannot be a
    /// base, or [`ApiError::HttpClientBuild`] if reqwest fails to build.
    pub fn new(config: &AssistantConfig) -> Result<Self, ApiError> {
        let base = Url::parse(&config.api_base()).map_err(|e| ApiError::InvalidBaseUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(config.api_base()));
        }
        let timeouts = config.timeouts();
        let http = reqwest::Client::builder()
            .timeout(timeouts.request())
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base })
    }

    /// `GET /version`. Not part of the conversation flow.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, non-success status, or an
    /// unexpected body.
    pub async fn version(&self) -> Result<VersionInfo, ApiError> {
        self.execute(self.request(Method::GET, &["version"], None)).await
    }

    /// Absolute URL for `segments` under the API base. Segments are
    /// percent-encoded individually.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str], user_id: Option<&str>) -> RequestBuilder {
        let url = self.endpoint(segments);
        debug!(%method, %url, "api: request");
        let builder = self.http.request(method, url);
        match user_id {
            Some(user_id) => builder.query(&[("userId", user_id)]),
            None => builder,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await.map_err(|e| ApiError::Request(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), body: text });
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AssistantApi for HttpAssistantApi {
    async fn init_or_load_conversation(&self, chassis_id: &ChassisId, user_id: &str) -> Result<Conversation, ApiError> {
        let request = self
            .request(Method::GET, &["conversation"], None)
            .query(&[("chassisId", chassis_id.as_str()), ("userId", user_id)]);
        self.execute(request).await
    }

    async fn send_message(&self, conversation_id: &str, content: &str, user_id: &str) -> Result<MessagePair, ApiError> {
        let request = self
            .request(Method::POST, &["conversation", conversation_id, "message"], Some(user_id))
            .json(&MessageBody { content });
        self.execute(request).await
    }

    async fn poll_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> Result<AssistantMessage, ApiError> {
        let request =
            self.request(Method::GET, &["conversation", conversation_id, "message", message_id], Some(user_id));
        self.execute(request).await
    }

    async fn send_feedback(
        &self,
        conversation_id: &str,
        message_id: &str,
        liked: Liked,
        user_id: &str,
    ) -> Result<AssistantMessage, ApiError> {
        let request = self
            .request(
                Method::PUT,
                &["conversation", conversation_id, "message", message_id, "feedback"],
                Some(user_id),
            )
            .json(&FeedbackBody { liked });
        self.execute(request).await
    }

    async fn search_keys(&self) -> Result<Vec<SearchKey>, ApiError> {
        let mut keys: Vec<SearchKey> = self.execute(self.request(Method::GET, &["search", "keys"], None)).await?;
        assign_sequential_ids(&mut keys);
        Ok(keys)
    }

    async fn custom_search(
        &self,
        conversation_id: &str,
        search_keys: &[SearchKey],
        count_needed: Option<u32>,
        user_id: &str,
    ) -> Result<Conversation, ApiError> {
        let request = self
            .request(Method::POST, &["conversation", conversation_id, "search"], Some(user_id))
            .json(&SearchBody { search_keys, count_needed });
        self.execute(request).await
    }

    async fn delete_conversation(&self, conversation_id: &str, user_id: &str) -> Result<DeleteCounts, ApiError> {
        self.execute(self.request(Method::DELETE, &["conversation", conversation_id], Some(user_id)))
            .await
    }

    async fn delete_user_conversations(&self, user_id: &str) -> Result<DeleteCounts, ApiError> {
        self.execute(self.request(Method::DELETE, &["user", "conversations"], Some(user_id)))
            .await
    }
}
