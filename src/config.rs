//! Widget configuration supplied by the host page at initialization.
//!
//! Fields are private; the host reads them back through accessors only.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::error::AssistantError;

pub const DEFAULT_MOUNT_ELEMENT_ID: &str = "paccar-assistant";
pub const DEFAULT_CHASSIS_ELEMENT_ID: &str = "buttonOpenREI";
pub const DEFAULT_USER_NAME_ELEMENT_ID: &str = "";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    mount_element_id: String,
    api_server: String,
    chassis_element_id: String,
    user_name_element_id: String,
    timeouts: HttpTimeouts,
}

impl AssistantConfig {
    /// Build a config for the given mount point and API server.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::ConfigParse`] if `api_server` is not an
    /// absolute `http(s)` URL.
    pub fn new(mount_element_id: &str, api_server: &str) -> Result<Self, AssistantError> {
        Ok(Self {
            mount_element_id: mount_element_id.to_owned(),
            api_server: normalize_api_server(api_server)?,
            chassis_element_id: DEFAULT_CHASSIS_ELEMENT_ID.to_owned(),
            user_name_element_id: DEFAULT_USER_NAME_ELEMENT_ID.to_owned(),
            timeouts: HttpTimeouts::default(),
        })
    }

    /// Build config from environment variables.
    ///
    /// Required:
    /// - `ASSISTANT_API_SERVER`
    ///
    /// Optional:
    /// - `ASSISTANT_MOUNT_ELEMENT_ID`: default `paccar-assistant`
    /// - `ASSISTANT_CHASSIS_ELEMENT_ID`: default `buttonOpenREI`
    /// - `ASSISTANT_USER_NAME_ELEMENT_ID`: default empty
    /// - `ASSISTANT_REQUEST_TIMEOUT_SECS`: default 30
    /// - `ASSISTANT_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::ConfigParse`] if the API server is missing or
    /// malformed.
    pub fn from_env() -> Result<Self, AssistantError> {
        let api_server = std::env::var("ASSISTANT_API_SERVER")
            .map_err(|_| AssistantError::ConfigParse("ASSISTANT_API_SERVER not set".into()))?;
        let mount_element_id =
            std::env::var("ASSISTANT_MOUNT_ELEMENT_ID").unwrap_or_else(|_| DEFAULT_MOUNT_ELEMENT_ID.to_owned());

        let mut config = Self::new(&mount_element_id, &api_server)?;
        if let Ok(id) = std::env::var("ASSISTANT_CHASSIS_ELEMENT_ID") {
            config.chassis_element_id = id;
        }
        if let Ok(id) = std::env::var("ASSISTANT_USER_NAME_ELEMENT_ID") {
            config.user_name_element_id = id;
        }
        config.timeouts = HttpTimeouts {
            request_secs: env_parse_u64("ASSISTANT_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("ASSISTANT_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(config)
    }

    #[must_use]
    pub fn with_chassis_element_id(mut self, id: &str) -> Self {
        id.clone_into(&mut self.chassis_element_id);
        self
    }

    #[must_use]
    pub fn with_user_name_element_id(mut self, id: &str) -> Self {
        id.clone_into(&mut self.user_name_element_id);
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn mount_element_id(&self) -> &str {
        &self.mount_element_id
    }

    /// Server origin without the `/api` suffix and without a trailing slash.
    #[must_use]
    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    /// Base URL every backend route hangs off.
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}/api", self.api_server)
    }

    /// Host-integration read-back only; context resolution goes through the
    /// [`ContextProvider`](crate::context::ContextProvider), not this id.
    #[must_use]
    pub fn chassis_element_id(&self) -> &str {
        &self.chassis_element_id
    }

    /// Host-integration read-back only, like [`Self::chassis_element_id`].
    #[must_use]
    pub fn user_name_element_id(&self) -> &str {
        &self.user_name_element_id
    }

    #[must_use]
    pub fn timeouts(&self) -> HttpTimeouts {
        self.timeouts
    }
}

fn normalize_api_server(raw: &str) -> Result<String, AssistantError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed)
        .map_err(|e| AssistantError::ConfigParse(format!("invalid API server '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AssistantError::ConfigParse(format!(
            "unsupported API server scheme '{}' (expected http or https)",
            url.scheme()
        )));
    }
    Ok(trimmed.to_owned())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
