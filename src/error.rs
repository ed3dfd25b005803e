//! Error taxonomy.
//!
//! DESIGN
//! ======
//! Two layers, mirroring the two layers that can fail:
//! - [`ApiError`]: any failed or rejected backend call (transport failure,
//!   non-success status, undecodable body).
//! - [`AssistantError`]: what a state machine operation reports to its caller.
//!   Network failures are wrapped, never flattened, so callers can still ask
//!   whether a retry makes sense.
//!
//! Absence of page context is a valid state, not a failure; it only appears
//! here so operations that need a chassis can say why they did nothing.

/// Errors produced by the backend client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The configured API server is not an absolute URL.
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    /// The request never produced a response (DNS, connect, timeout, ...).
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ApiError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidBaseUrl(_) => "E_INVALID_BASE_URL",
            Self::Request(_) => "E_REQUEST",
            Self::Status { .. } => "E_STATUS",
            Self::Decode(_) => "E_DECODE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

/// Errors reported by conversation operations.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("no chassis context on this page")]
    ContextUnavailable,

    #[error("no active conversation")]
    NoConversation,

    #[error("no search composition in progress")]
    NotComposing,

    #[error("invalid chassis id: {0}")]
    InvalidChassisId(String),

    #[error("config parse failed: {0}")]
    ConfigParse(String),

    #[error(transparent)]
    Network(#[from] ApiError),
}

impl AssistantError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ContextUnavailable => "E_CONTEXT_UNAVAILABLE",
            Self::NoConversation => "E_NO_CONVERSATION",
            Self::NotComposing => "E_NOT_COMPOSING",
            Self::InvalidChassisId(_) => "E_INVALID_CHASSIS_ID",
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::Network(e) => e.error_code(),
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(e) if e.retryable())
    }
}
