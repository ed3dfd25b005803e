//! Assistant state and its transitions.
//!
//! DESIGN
//! ======
//! Every state machine operation is split into synchronous transitions that
//! run before and after its network round-trip. Each transition is a plain
//! function over `&mut AssistantState`, so ordering and patch discipline can
//! be tested without a runtime.
//!
//! PATCH DISCIPLINE
//! ================
//! Continuations apply their result to the state as it is when they resolve,
//! never to a snapshot taken when they started:
//! - a poll replaces exactly one message, matched by id;
//! - a send swaps its own placeholder for the acknowledged pair;
//! - only load and search submission replace the conversation wholesale.
//!
//! LIVENESS
//! ========
//! `generation` is bumped whenever the held conversation is discarded
//! (context lost or changed, delete, unmount). Continuations carry the
//! generation they started under in a [`Scope`] and drop their result if it
//! no longer matches.

#[cfg(test)]
#[path = "reducer_test.rs"]
mod reducer_test;

use crate::context::PageContext;
use crate::types::{
    AssistantMessage, ChassisId, Conversation, DeleteCounts, Liked, Message, MessagePair, SearchKey,
    SearchRequestMessage, Timestamp, UserMessage,
};

pub const DEFAULT_COUNT_NEEDED: u32 = 10;
pub const MIN_COUNT_NEEDED: u32 = 1;
pub const MAX_COUNT_NEEDED: u32 = 25;

// =============================================================================
// STATE
// =============================================================================

/// Conversation lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Error,
}

/// Facet selection being edited before a search is submitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchComposition {
    pub keys: Vec<SearchKey>,
    pub count_needed: u32,
}

/// Which flag of a facet a toggle applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacetFlag {
    Selected,
    Mandatory,
}

/// Everything the presentation layer renders, for the lifetime of one mount.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssistantState {
    /// `None` means the page has no chassis; the widget is unavailable.
    pub in_context_chassis_id: Option<ChassisId>,
    pub in_context_user_name: Option<String>,
    pub shown: bool,
    pub status: Status,
    pub conversation: Option<Conversation>,
    pub composition: Option<SearchComposition>,
    pub error: Option<String>,
    pub generation: u64,
    /// Source of placeholder sequence numbers for optimistic sends.
    pub next_local_seq: u64,
    pub unmounted: bool,
}

impl AssistantState {
    /// A conversation session exists.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.conversation.is_some()
    }

    #[must_use]
    pub fn is_composing(&self) -> bool {
        self.composition.is_some()
    }
}

/// Identity a continuation must still match to apply its result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    pub generation: u64,
    pub conversation_id: String,
    pub user_name: String,
}

/// Scope of the held conversation, if there is one and a user to act as.
#[must_use]
pub fn active_scope(state: &AssistantState) -> Option<Scope> {
    if state.unmounted {
        return None;
    }
    let conversation = state.conversation.as_ref()?;
    let user_name = state.in_context_user_name.clone()?;
    Some(Scope {
        generation: state.generation,
        conversation_id: conversation.conversation_id.clone(),
        user_name,
    })
}

#[must_use]
pub fn is_current(state: &AssistantState, scope: &Scope) -> bool {
    !state.unmounted
        && state.generation == scope.generation
        && state
            .conversation
            .as_ref()
            .is_some_and(|c| c.conversation_id == scope.conversation_id)
}

fn messages_mut(state: &mut AssistantState) -> Option<&mut Vec<Message>> {
    state.conversation.as_mut().map(|c| &mut c.messages)
}

/// Drop the held conversation and invalidate every in-flight continuation.
fn discard_conversation(state: &mut AssistantState) {
    state.conversation = None;
    state.composition = None;
    state.status = Status::Uninitialized;
    state.error = None;
    state.generation += 1;
}

pub fn set_shown(state: &mut AssistantState, shown: bool) {
    state.shown = shown;
}

pub fn unmount(state: &mut AssistantState) {
    state.unmounted = true;
    state.generation += 1;
}

// =============================================================================
// CONTEXT + LOAD
// =============================================================================

/// Arguments of a conversation load, tagged with its generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub generation: u64,
    pub chassis_id: ChassisId,
    pub user_name: String,
}

/// Record freshly resolved page context. Returns the load to start, if the
/// identifiers are complete and nothing is held or loading for them.
pub fn apply_context(state: &mut AssistantState, ctx: PageContext) -> Option<LoadRequest> {
    let scope_changed =
        ctx.chassis_id != state.in_context_chassis_id || ctx.user_name != state.in_context_user_name;
    state.in_context_chassis_id = ctx.chassis_id;
    state.in_context_user_name = ctx.user_name;

    let held_elsewhere = match (&state.conversation, &state.in_context_chassis_id) {
        (Some(conv), Some(chassis)) => {
            conv.chassis_id != *chassis
                || state.in_context_user_name.as_deref().is_some_and(|u| u != conv.user_id)
        }
        (Some(_), None) => true,
        (None, _) => false,
    };
    let stale_load = scope_changed && state.status == Status::Loading;
    let lost_context = state.in_context_chassis_id.is_none() && state.status != Status::Uninitialized;

    if held_elsewhere || stale_load || lost_context {
        discard_conversation(state);
    }
    needs_load(state)
}

/// Load that should run now: both ids known, no conversation held, none in
/// flight.
#[must_use]
pub fn needs_load(state: &AssistantState) -> Option<LoadRequest> {
    if state.unmounted || state.conversation.is_some() || state.status == Status::Loading {
        return None;
    }
    Some(LoadRequest {
        generation: state.generation,
        chassis_id: state.in_context_chassis_id.clone()?,
        user_name: state.in_context_user_name.clone()?,
    })
}

/// `uninitialized|error -> loading`, returning the request to issue.
pub fn begin_load(state: &mut AssistantState) -> Option<LoadRequest> {
    let request = needs_load(state)?;
    state.status = Status::Loading;
    Some(request)
}

/// `loading -> ready`. Ignored if the request is stale.
pub fn load_succeeded(state: &mut AssistantState, request: &LoadRequest, conversation: Conversation) -> bool {
    if state.unmounted || state.generation != request.generation || state.status != Status::Loading {
        return false;
    }
    state.conversation = Some(conversation);
    state.status = Status::Ready;
    state.error = None;
    true
}

/// `loading -> error`. Ignored if the request is stale.
pub fn load_failed(state: &mut AssistantState, request: &LoadRequest, message: String) -> bool {
    if state.unmounted || state.generation != request.generation || state.status != Status::Loading {
        return false;
    }
    state.conversation = None;
    state.status = Status::Error;
    state.error = Some(message);
    true
}

// =============================================================================
// SEND
// =============================================================================

/// An optimistic user message awaiting acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSend {
    pub scope: Scope,
    pub local_seq: u64,
}

impl PendingSend {
    fn is_placeholder(&self, message: &Message) -> bool {
        matches!(
            message,
            Message::User(m) if m.message_id.is_empty() && m.local_seq == Some(self.local_seq)
        )
    }
}

/// Append a provisional user message (empty id) ahead of the network call.
pub fn optimistic_append(state: &mut AssistantState, content: &str, now: Timestamp) -> Option<PendingSend> {
    let scope = active_scope(state)?;
    let local_seq = state.next_local_seq;
    let placeholder = Message::User(UserMessage {
        conversation_id: scope.conversation_id.clone(),
        message_id: String::new(),
        content: content.to_owned(),
        timestamp: now,
        local_seq: Some(local_seq),
    });
    messages_mut(state)?.push(placeholder);
    state.next_local_seq += 1;
    Some(PendingSend { scope, local_seq })
}

/// Replace the placeholder with the acknowledged user message followed by the
/// (pending) assistant reply.
pub fn send_succeeded(state: &mut AssistantState, pending: &PendingSend, pair: MessagePair) -> bool {
    if !is_current(state, &pending.scope) {
        return false;
    }
    let Some(messages) = messages_mut(state) else {
        return false;
    };
    let user = Message::User(pair.user_message);
    let assistant = Message::Assistant(pair.assistant_message);
    match messages.iter().position(|m| pending.is_placeholder(m)) {
        Some(idx) => {
            messages[idx] = user;
            messages.insert(idx + 1, assistant);
        }
        None => messages.extend([user, assistant]),
    }
    true
}

/// Roll the placeholder back out.
pub fn send_failed(state: &mut AssistantState, pending: &PendingSend) -> bool {
    if !is_current(state, &pending.scope) {
        return false;
    }
    let Some(messages) = messages_mut(state) else {
        return false;
    };
    match messages.iter().position(|m| pending.is_placeholder(m)) {
        Some(idx) => {
            messages.remove(idx);
            true
        }
        None => false,
    }
}

// =============================================================================
// POLL
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollTarget {
    pub scope: Scope,
    pub message_id: String,
}

/// The first assistant message still pending, if any.
#[must_use]
pub fn first_pending(state: &AssistantState) -> Option<PollTarget> {
    let scope = active_scope(state)?;
    let message = state.conversation.as_ref()?.messages.iter().find(|m| m.is_pending())?;
    Some(PollTarget { scope, message_id: message.message_id().to_owned() })
}

/// Replace the message with the same id in place; siblings are untouched.
pub fn poll_resolved(state: &mut AssistantState, scope: &Scope, message: AssistantMessage) -> bool {
    if !is_current(state, scope) {
        return false;
    }
    let Some(messages) = messages_mut(state) else {
        return false;
    };
    match messages.iter_mut().find(|m| m.message_id() == message.message_id) {
        Some(slot) => {
            *slot = Message::Assistant(message);
            true
        }
        None => false,
    }
}

// =============================================================================
// FEEDBACK
// =============================================================================

#[must_use]
pub fn current_liked(state: &AssistantState, message_id: &str) -> Option<Liked> {
    state.conversation.as_ref()?.messages.iter().find_map(|m| match m {
        Message::Assistant(a) if a.message_id == message_id => Some(a.liked),
        _ => None,
    })
}

/// Overwrite an assistant message's `liked`, returning the previous value.
pub fn set_liked(state: &mut AssistantState, message_id: &str, liked: Liked) -> Option<Liked> {
    messages_mut(state)?.iter_mut().find_map(|m| match m {
        Message::Assistant(a) if a.message_id == message_id => Some(std::mem::replace(&mut a.liked, liked)),
        _ => None,
    })
}

// =============================================================================
// DELETE
// =============================================================================

/// Clear the conversation if the backend removed at least one conversation
/// record. Returns whether a reload should follow.
pub fn conversation_deleted(state: &mut AssistantState, scope: &Scope, counts: &DeleteCounts) -> bool {
    if counts.conversation == 0 || state.unmounted || state.generation != scope.generation {
        return false;
    }
    discard_conversation(state);
    true
}

// =============================================================================
// SEARCH
// =============================================================================

/// Enter composition mode with a freshly fetched facet catalog.
pub fn search_initiated(state: &mut AssistantState, scope: &Scope, keys: Vec<SearchKey>) -> bool {
    if !is_current(state, scope) {
        return false;
    }
    state.composition = Some(SearchComposition { keys, count_needed: DEFAULT_COUNT_NEEDED });
    true
}

/// The facet catalog could not be fetched.
pub fn search_fetch_failed(state: &mut AssistantState, scope: &Scope, message: String) -> bool {
    if !is_current(state, scope) {
        return false;
    }
    state.composition = None;
    state.error = Some(message);
    true
}

/// Leave composition mode, dropping the fetched facets.
pub fn search_discarded(state: &mut AssistantState) -> bool {
    state.composition.take().is_some()
}

/// Flip one flag of the facet with `key_id`. Returns the new value.
pub fn toggle_facet(state: &mut AssistantState, key_id: &str, flag: FacetFlag) -> Option<bool> {
    let key = state.composition.as_mut()?.keys.iter_mut().find(|k| k.id == key_id)?;
    let slot = match flag {
        FacetFlag::Selected => &mut key.selected,
        FacetFlag::Mandatory => &mut key.mandatory,
    };
    *slot = !*slot;
    Some(*slot)
}

/// Set how many results to request, clamped to the accepted range.
pub fn set_count_needed(state: &mut AssistantState, count: u32) -> Option<u32> {
    let composition = state.composition.as_mut()?;
    composition.count_needed = count.clamp(MIN_COUNT_NEEDED, MAX_COUNT_NEEDED);
    Some(composition.count_needed)
}

/// A submitted search awaiting the backend's canonical conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSearch {
    pub scope: Scope,
    pub timestamp: Timestamp,
}

impl PendingSearch {
    fn is_provisional(&self, message: &Message) -> bool {
        matches!(message, Message::SearchRequest(m) if !m.is_acknowledged() && m.timestamp == self.timestamp)
    }
}

/// Leave composition mode and show the submitted facets as an
/// unacknowledged search request.
pub fn search_submitting(state: &mut AssistantState, keys: &[SearchKey], now: Timestamp) -> Option<PendingSearch> {
    let scope = active_scope(state)?;
    state.composition = None;
    let provisional = Message::SearchRequest(SearchRequestMessage {
        conversation_id: scope.conversation_id.clone(),
        message_id: String::new(),
        content: String::new(),
        timestamp: now,
        query: keys.to_vec(),
    });
    messages_mut(state)?.push(provisional);
    Some(PendingSearch { scope, timestamp: now })
}

/// Adopt the backend's conversation wholesale; no client-side merge.
pub fn search_succeeded(state: &mut AssistantState, pending: &PendingSearch, conversation: Conversation) -> bool {
    if !is_current(state, &pending.scope) {
        return false;
    }
    state.conversation = Some(conversation);
    state.status = Status::Ready;
    state.error = None;
    true
}

/// Remove the provisional request and surface the error. The conversation is
/// otherwise left as it was.
pub fn search_failed(state: &mut AssistantState, pending: &PendingSearch, message: String) -> bool {
    if !is_current(state, &pending.scope) {
        return false;
    }
    if let Some(messages) = messages_mut(state) {
        if let Some(idx) = messages.iter().rposition(|m| pending.is_provisional(m)) {
            messages.remove(idx);
        }
    }
    state.composition = None;
    state.status = Status::Error;
    state.error = Some(message);
    true
}
