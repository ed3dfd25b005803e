//! Widget: host-page integration surface and mount lifetime.
//!
//! DESIGN
//! ======
//! `init_assistant` is the single entry point a host calls: explicit
//! configuration in, a mounted [`AssistantWidget`] out. The widget owns the
//! context resolution loop; everything conversational is delegated to
//! [`AssistantSession`].
//!
//! Each navigation aborts the previous resolution loop and starts a new one
//! with a fresh retry counter. A loop resolves once, then retries on the
//! fixed schedule for as long as no chassis is found, giving up silently
//! after [`MAX_CONTEXT_RETRIES`].

#[cfg(test)]
#[path = "widget_test.rs"]
mod widget_test;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{AssistantApi, HttpAssistantApi};
use crate::config::AssistantConfig;
use crate::context::{ContextProvider, ContextRetry, MAX_CONTEXT_RETRIES};
use crate::error::AssistantError;
use crate::session::AssistantSession;

/// Delay before [`AssistantWidget::schedule_refresh`] re-resolves context.
pub const REFRESH_DELAY: Duration = Duration::from_millis(5000);

/// Mount the widget against the configured backend and start resolving
/// page context.
///
/// # Errors
///
/// Returns [`AssistantError::Network`] if the HTTP client cannot be built
/// for the configured API server.
pub fn init_assistant(
    config: AssistantConfig,
    provider: Arc<dyn ContextProvider>,
) -> Result<AssistantWidget, AssistantError> {
    let api = HttpAssistantApi::new(&config)?;
    info!(
        mount = config.mount_element_id(),
        api_server = config.api_server(),
        "widget: mounting assistant"
    );
    let widget = AssistantWidget::with_api(config, provider, Arc::new(api));
    widget.navigate();
    Ok(widget)
}

// =============================================================================
// WIDGET
// =============================================================================

#[derive(Clone)]
pub struct AssistantWidget {
    inner: Arc<WidgetInner>,
}

struct WidgetInner {
    config: AssistantConfig,
    provider: Arc<dyn ContextProvider>,
    session: AssistantSession,
    resolver: Mutex<Option<JoinHandle<()>>>,
}

impl AssistantWidget {
    /// Build a widget over any backend. Context resolution starts on the
    /// first [`Self::navigate`].
    #[must_use]
    pub fn with_api(config: AssistantConfig, provider: Arc<dyn ContextProvider>, api: Arc<dyn AssistantApi>) -> Self {
        Self {
            inner: Arc::new(WidgetInner {
                config,
                provider,
                session: AssistantSession::new(api),
                resolver: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AssistantConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn session(&self) -> &AssistantSession {
        &self.inner.session
    }

    /// The host route changed: re-resolve context with a fresh retry budget.
    pub fn navigate(&self) {
        if self.inner.session.snapshot().unmounted {
            return;
        }
        let provider = self.inner.provider.clone();
        let session = self.inner.session.clone();
        let handle = tokio::spawn(resolve_context(provider, session));
        if let Some(previous) = self.replace_resolver(Some(handle)) {
            previous.abort();
        }
    }

    /// Re-run context resolution after [`REFRESH_DELAY`], as if the host had
    /// navigated.
    pub fn schedule_refresh(&self) -> JoinHandle<()> {
        let widget = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(REFRESH_DELAY).await;
            debug!("widget: refreshing context");
            widget.navigate();
        })
    }

    /// Stop resolving context and drop every later result.
    pub fn unmount(&self) {
        if let Some(previous) = self.replace_resolver(None) {
            previous.abort();
        }
        self.inner.session.unmount();
    }

    fn replace_resolver(&self, handle: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        let mut slot = self.inner.resolver.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, handle)
    }
}

async fn resolve_context(provider: Arc<dyn ContextProvider>, session: AssistantSession) {
    let mut retry = ContextRetry::default();
    loop {
        let ctx = provider.resolve();
        let resolved = ctx.chassis_id.is_some();
        if let Some(chassis_id) = &ctx.chassis_id {
            debug!(%chassis_id, user = ?ctx.user_name, "widget: context resolved");
        }
        session.apply_context(ctx);
        if resolved {
            return;
        }
        let Some(delay) = retry.next_delay() else {
            info!(retries = MAX_CONTEXT_RETRIES, "widget: no chassis on page, assistant unavailable");
            return;
        };
        debug!(retry = retry.retries(), ?delay, "widget: chassis not found, retrying");
        tokio::time::sleep(delay).await;
    }
}
