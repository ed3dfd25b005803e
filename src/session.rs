//! Session: the conversation state machine wired to the backend.
//!
//! DESIGN
//! ======
//! `AssistantSession` owns the widget's [`AssistantState`] inside a tokio
//! `watch` channel. Every mutation goes through `send_modify`, so the
//! presentation layer sees each transition and never a half-applied one.
//!
//! Operations follow the same shape: apply the synchronous "before"
//! transition from [`crate::reducer`], release the state, await the backend,
//! then apply the "after" transition against the state as it is *now*. The
//! reducer's [`Scope`] check drops results that arrive for a conversation
//! which has since been discarded or unmounted.
//!
//! TIMERS
//! ======
//! - send → first poll: 1000 ms
//! - poll still pending → next poll: 1000 ms
//! - poll transport failure → retry: 2000 ms
//!
//! Polling has no attempt cap. A poll loop ends when nothing is pending or
//! its generation is no longer current.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::AssistantApi;
use crate::context::PageContext;
use crate::error::AssistantError;
use crate::reducer::{self, AssistantState, FacetFlag, LoadRequest, PollTarget, Scope};
use crate::types::{DeleteCounts, Liked, MessageState, SearchKey, now_timestamp};

pub const SEND_POLL_DELAY: Duration = Duration::from_millis(1000);
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const POLL_RETRY_DELAY: Duration = Duration::from_millis(2000);

// =============================================================================
// SESSION
// =============================================================================

/// Cheap to clone; clones share one state and one backend.
#[derive(Clone)]
pub struct AssistantSession {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn AssistantApi>,
    state: watch::Sender<AssistantState>,
}

impl AssistantSession {
    #[must_use]
    pub fn new(api: Arc<dyn AssistantApi>) -> Self {
        let (state, _) = watch::channel(AssistantState::default());
        Self { inner: Arc::new(Inner { api, state }) }
    }

    /// Receiver notified after every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AssistantState> {
        self.inner.state.subscribe()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> AssistantState {
        self.inner.state.borrow().clone()
    }

    fn update<R: Default>(&self, f: impl FnOnce(&mut AssistantState) -> R) -> R {
        let mut out = R::default();
        self.inner.state.send_modify(|state| out = f(state));
        out
    }

    fn read<R>(&self, f: impl FnOnce(&AssistantState) -> R) -> R {
        f(&*self.inner.state.borrow())
    }

    fn scope(&self) -> Result<Scope, AssistantError> {
        self.read(reducer::active_scope).ok_or(AssistantError::NoConversation)
    }

    // =========================================================================
    // VISIBILITY + LIFETIME
    // =========================================================================

    pub fn set_shown(&self, shown: bool) {
        self.update(|s| reducer::set_shown(s, shown));
    }

    /// Stop applying results and scheduling timers for this mount.
    pub fn unmount(&self) {
        info!("session: unmounted");
        self.update(reducer::unmount);
    }

    // =========================================================================
    // CONTEXT + LOAD
    // =========================================================================

    /// Record resolved page context and start a load in the background when
    /// both identifiers are known and nothing is held yet.
    pub fn apply_context(&self, ctx: PageContext) {
        let request = self.update(|s| {
            reducer::apply_context(s, ctx);
            reducer::begin_load(s)
        });
        if let Some(request) = request {
            let session = self.clone();
            tokio::spawn(async move {
                let _ = session.run_load(request).await;
            });
        }
    }

    /// Load (or create) the conversation for the context currently held.
    /// A no-op if a conversation is held, a load is in flight, or an
    /// identifier is missing.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Network`] if the backend call fails; the
    /// message is also stored in state for display.
    pub async fn load_conversation(&self) -> Result<(), AssistantError> {
        match self.update(reducer::begin_load) {
            Some(request) => self.run_load(request).await,
            None => Ok(()),
        }
    }

    async fn run_load(&self, request: LoadRequest) -> Result<(), AssistantError> {
        info!(chassis_id = %request.chassis_id, user = %request.user_name, "session: loading conversation");
        match self
            .inner
            .api
            .init_or_load_conversation(&request.chassis_id, &request.user_name)
            .await
        {
            Ok(conversation) => {
                let count = conversation.messages.len();
                if self.update(|s| reducer::load_succeeded(s, &request, conversation)) {
                    info!(chassis_id = %request.chassis_id, messages = count, "session: conversation ready");
                    if self.read(reducer::first_pending).is_some() {
                        self.schedule_poll(Duration::ZERO);
                    }
                } else {
                    debug!(chassis_id = %request.chassis_id, "session: stale load result dropped");
                }
                Ok(())
            }
            Err(e) => {
                error!(error = %e, chassis_id = %request.chassis_id, "session: load failed");
                self.update(|s| reducer::load_failed(s, &request, e.to_string()));
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // SEND + POLL
    // =========================================================================

    /// Append `content` optimistically, post it, then reconcile. On failure
    /// the placeholder is rolled back and the error is logged only.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::NoConversation`] if there is no conversation
    /// or user to send as, or [`AssistantError::Network`] if the post fails.
    pub async fn send_message(&self, content: &str) -> Result<(), AssistantError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(());
        }
        let pending = self
            .update(|s| reducer::optimistic_append(s, content, now_timestamp()))
            .ok_or(AssistantError::NoConversation)?;
        let scope = &pending.scope;

        match self.inner.api.send_message(&scope.conversation_id, content, &scope.user_name).await {
            Ok(pair) => {
                let assistant_id = pair.assistant_message.message_id.clone();
                if self.update(|s| reducer::send_succeeded(s, &pending, pair)) {
                    debug!(conversation_id = %scope.conversation_id, %assistant_id, "session: message sent");
                    self.schedule_poll(SEND_POLL_DELAY);
                }
                Ok(())
            }
            Err(e) => {
                error!(error = %e, conversation_id = %scope.conversation_id, "session: send failed");
                self.update(|s| reducer::send_failed(s, &pending));
                Err(e.into())
            }
        }
    }

    /// Start a background poll loop after `delay`.
    pub fn schedule_poll(&self, delay: Duration) {
        let session = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            session.poll_pending().await;
        });
    }

    /// Poll the first pending assistant message until none remain. Returns
    /// early if the conversation it started on is discarded.
    pub async fn poll_pending(&self) {
        let mut generation = None;
        loop {
            let Some(PollTarget { scope, message_id }) = self.read(reducer::first_pending) else {
                return;
            };
            if *generation.get_or_insert(scope.generation) != scope.generation {
                return;
            }

            let delay = match self
                .inner
                .api
                .poll_message(&scope.conversation_id, &message_id, &scope.user_name)
                .await
            {
                Ok(message) if message.state == MessageState::Pending => POLL_INTERVAL,
                Ok(message) => {
                    if self.update(|s| reducer::poll_resolved(s, &scope, message)) {
                        continue;
                    }
                    debug!(%message_id, "session: poll result dropped");
                    if !self.read(|s| reducer::is_current(s, &scope)) {
                        return;
                    }
                    POLL_INTERVAL
                }
                Err(e) => {
                    warn!(error = %e, %message_id, "session: poll failed, retrying");
                    POLL_RETRY_DELAY
                }
            };
            tokio::time::sleep(delay).await;
        }
    }

    // =========================================================================
    // FEEDBACK
    // =========================================================================

    /// Record `liked` for a message. Leaves state alone; returns whether the
    /// backend accepted it.
    pub async fn send_feedback(&self, message_id: &str, liked: Liked) -> bool {
        let Ok(scope) = self.scope() else {
            return false;
        };
        match self
            .inner
            .api
            .send_feedback(&scope.conversation_id, message_id, liked, &scope.user_name)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, %message_id, "session: feedback failed");
                false
            }
        }
    }

    /// Click handler for like/dislike: clicking the active value clears it.
    /// Updates state optimistically and restores the prior value on failure.
    pub async fn toggle_feedback(&self, message_id: &str, requested: Liked) -> bool {
        let Some((scope, previous, next)) = self.update(|s| {
            let scope = reducer::active_scope(s)?;
            let previous = reducer::current_liked(s, message_id)?;
            let next = previous.toggled(requested);
            reducer::set_liked(s, message_id, next);
            Some((scope, previous, next))
        }) else {
            return false;
        };

        let accepted = self.send_feedback(message_id, next).await;
        if !accepted {
            self.update(|s| {
                if reducer::is_current(s, &scope) {
                    reducer::set_liked(s, message_id, previous);
                }
            });
        }
        accepted
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    /// Delete the held conversation. If the backend removed it, the widget
    /// clears and immediately loads a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::NoConversation`] if nothing is held, or
    /// [`AssistantError::Network`] if the delete fails.
    pub async fn delete_conversation(&self) -> Result<DeleteCounts, AssistantError> {
        let scope = self.scope()?;
        let counts = self
            .inner
            .api
            .delete_conversation(&scope.conversation_id, &scope.user_name)
            .await
            .inspect_err(|e| error!(error = %e, conversation_id = %scope.conversation_id, "session: delete failed"))?;
        info!(
            conversation_id = %scope.conversation_id,
            conversations = counts.conversation,
            messages = counts.message,
            "session: conversation deleted"
        );
        self.reload_after_delete(&scope, &counts).await;
        Ok(counts)
    }

    /// Delete every conversation of the current user, then reload as for a
    /// single delete.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::ContextUnavailable`] without a user, or
    /// [`AssistantError::Network`] if the delete fails.
    pub async fn delete_all_conversations(&self) -> Result<DeleteCounts, AssistantError> {
        let (user_name, scope) = self.read(|s| (s.in_context_user_name.clone(), reducer::active_scope(s)));
        let user_name = user_name.ok_or(AssistantError::ContextUnavailable)?;
        let counts = self
            .inner
            .api
            .delete_user_conversations(&user_name)
            .await
            .inspect_err(|e| error!(error = %e, user = %user_name, "session: delete all failed"))?;
        info!(user = %user_name, conversations = counts.conversation, "session: user conversations deleted");
        if let Some(scope) = scope {
            self.reload_after_delete(&scope, &counts).await;
        }
        Ok(counts)
    }

    async fn reload_after_delete(&self, scope: &Scope, counts: &DeleteCounts) {
        if self.update(|s| reducer::conversation_deleted(s, scope, counts)) {
            // Failure is already stored for display.
            let _ = self.load_conversation().await;
        }
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Fetch the facet catalog and enter composition mode.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::NoConversation`] if nothing is held, or
    /// [`AssistantError::Network`] if the catalog cannot be fetched.
    pub async fn initiate_search(&self) -> Result<(), AssistantError> {
        let scope = self.scope()?;
        match self.inner.api.search_keys().await {
            Ok(keys) => {
                debug!(keys = keys.len(), "session: search composition opened");
                self.update(|s| reducer::search_initiated(s, &scope, keys));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "session: search keys fetch failed");
                self.update(|s| reducer::search_fetch_failed(s, &scope, e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Leave composition mode. The conversation is untouched.
    pub fn discard_search(&self) -> bool {
        self.update(reducer::search_discarded)
    }

    pub fn toggle_facet(&self, key_id: &str, flag: FacetFlag) -> Option<bool> {
        self.update(|s| reducer::toggle_facet(s, key_id, flag))
    }

    pub fn set_count_needed(&self, count: u32) -> Option<u32> {
        self.update(|s| reducer::set_count_needed(s, count))
    }

    /// Post `keys` and adopt the conversation the backend returns.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::NoConversation`] if nothing is held, or
    /// [`AssistantError::Network`] if the search fails; the error is also
    /// stored for display.
    pub async fn submit_search(&self, keys: Vec<SearchKey>, count_needed: Option<u32>) -> Result<(), AssistantError> {
        let pending = self
            .update(|s| reducer::search_submitting(s, &keys, now_timestamp()))
            .ok_or(AssistantError::NoConversation)?;
        let scope = &pending.scope;
        let selected = keys.iter().filter(|k| k.selected).count();
        info!(conversation_id = %scope.conversation_id, selected, ?count_needed, "session: submitting search");

        match self
            .inner
            .api
            .custom_search(&scope.conversation_id, &keys, count_needed, &scope.user_name)
            .await
        {
            Ok(conversation) => {
                if self.update(|s| reducer::search_succeeded(s, &pending, conversation))
                    && self.read(reducer::first_pending).is_some()
                {
                    self.schedule_poll(POLL_INTERVAL);
                }
                Ok(())
            }
            Err(e) => {
                error!(error = %e, conversation_id = %scope.conversation_id, "session: search failed");
                self.update(|s| reducer::search_failed(s, &pending, e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Submit the facets and count currently being composed.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::NotComposing`] outside composition mode, or
    /// anything [`Self::submit_search`] returns.
    pub async fn submit_composition(&self) -> Result<(), AssistantError> {
        let composition = self.read(|s| s.composition.clone()).ok_or(AssistantError::NotComposing)?;
        self.submit_search(composition.keys, Some(composition.count_needed)).await
    }
}
