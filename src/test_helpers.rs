//! Fixtures and a scripted backend shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::api::AssistantApi;
use crate::context::{ContextProvider, PageContext};
use crate::error::ApiError;
use crate::types::{
    AssistantMessage, ChassisId, Conversation, DeleteCounts, Liked, Message, MessagePair, MessageState, SearchKey,
    SearchKeyKind, UserMessage,
};

pub const CHASSIS: &str = "C751875_P2024";
pub const USER: &str = "Jane Doe";
pub const CONVERSATION: &str = "conv-1";

// =========================================================================
// Fixtures
// =========================================================================

#[must_use]
pub fn chassis() -> ChassisId {
    ChassisId::parse(CHASSIS).expect("fixture chassis id is valid")
}

#[must_use]
pub fn context() -> PageContext {
    PageContext { chassis_id: Some(chassis()), user_name: Some(USER.to_owned()) }
}

#[must_use]
pub fn user_message(id: &str, content: &str) -> Message {
    Message::User(UserMessage {
        conversation_id: CONVERSATION.to_owned(),
        message_id: id.to_owned(),
        content: content.to_owned(),
        timestamp: 100,
        local_seq: None,
    })
}

#[must_use]
pub fn assistant(id: &str, state: MessageState, content: &str) -> AssistantMessage {
    AssistantMessage {
        conversation_id: CONVERSATION.to_owned(),
        message_id: id.to_owned(),
        content: content.to_owned(),
        timestamp: 101,
        references: Vec::new(),
        followup_prompts: Vec::new(),
        actions: Vec::new(),
        liked: Liked::Neutral,
        state,
        in_response_to: None,
    }
}

#[must_use]
pub fn assistant_message(id: &str, state: MessageState, content: &str) -> Message {
    Message::Assistant(assistant(id, state, content))
}

#[must_use]
pub fn conversation(messages: Vec<Message>) -> Conversation {
    Conversation {
        conversation_id: CONVERSATION.to_owned(),
        user_id: USER.to_owned(),
        chassis_id: chassis(),
        timestamp: 99,
        messages,
    }
}

#[must_use]
pub fn pair(user_id: &str, content: &str, assistant_id: &str) -> MessagePair {
    let Message::User(user_message) = user_message(user_id, content) else {
        unreachable!("fixture builds a user message");
    };
    MessagePair { user_message, assistant_message: assistant(assistant_id, MessageState::Pending, "") }
}

#[must_use]
pub fn search_key(id: &str, name: &str, selected: bool) -> SearchKey {
    SearchKey { id: id.to_owned(), name: name.to_owned(), kind: SearchKeyKind::Top, mandatory: false, selected }
}

#[must_use]
pub fn network_error() -> ApiError {
    ApiError::Request("connection refused".into())
}

// =========================================================================
// StaticContext
// =========================================================================

/// Provider returning a fixed context and counting how often it was asked.
pub struct StaticContext {
    pub context: Mutex<PageContext>,
    pub calls: Mutex<usize>,
}

impl StaticContext {
    #[must_use]
    pub fn new(context: PageContext) -> Self {
        Self { context: Mutex::new(context), calls: Mutex::new(0) }
    }

    pub fn set(&self, context: PageContext) {
        *self.context.lock().unwrap() = context;
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ContextProvider for StaticContext {
    fn resolve(&self) -> PageContext {
        *self.calls.lock().unwrap() += 1;
        self.context.lock().unwrap().clone()
    }
}

// =========================================================================
// MockApi
// =========================================================================

/// A backend call as observed by [`MockApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load { chassis_id: String, user_id: String },
    Send { conversation_id: String, content: String },
    Poll { message_id: String },
    Feedback { message_id: String, liked: Liked },
    SearchKeys,
    Search { keys: Vec<SearchKey>, count_needed: Option<u32> },
    Delete { conversation_id: String },
    DeleteAll { user_id: String },
}

/// Scripted backend. Each operation pops its next reply; an empty script
/// answers with a network error.
#[derive(Default)]
pub struct MockApi {
    pub loads: Mutex<VecDeque<Result<Conversation, ApiError>>>,
    pub sends: Mutex<VecDeque<Result<MessagePair, ApiError>>>,
    pub polls: Mutex<VecDeque<Result<AssistantMessage, ApiError>>>,
    pub feedback: Mutex<VecDeque<Result<AssistantMessage, ApiError>>>,
    pub keys: Mutex<VecDeque<Result<Vec<SearchKey>, ApiError>>>,
    pub searches: Mutex<VecDeque<Result<Conversation, ApiError>>>,
    pub deletes: Mutex<VecDeque<Result<DeleteCounts, ApiError>>>,
    /// When set, the next `send_message` waits for this signal first.
    pub send_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub calls: Mutex<Vec<Call>>,
}

fn pop<T>(queue: &Mutex<VecDeque<Result<T, ApiError>>>) -> Result<T, ApiError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(ApiError::Request("no scripted reply".into())))
}

impl MockApi {
    pub fn push_load(&self, reply: Result<Conversation, ApiError>) {
        self.loads.lock().unwrap().push_back(reply);
    }

    pub fn push_send(&self, reply: Result<MessagePair, ApiError>) {
        self.sends.lock().unwrap().push_back(reply);
    }

    pub fn push_poll(&self, reply: Result<AssistantMessage, ApiError>) {
        self.polls.lock().unwrap().push_back(reply);
    }

    pub fn push_feedback(&self, reply: Result<AssistantMessage, ApiError>) {
        self.feedback.lock().unwrap().push_back(reply);
    }

    pub fn push_keys(&self, reply: Result<Vec<SearchKey>, ApiError>) {
        self.keys.lock().unwrap().push_back(reply);
    }

    pub fn push_search(&self, reply: Result<Conversation, ApiError>) {
        self.searches.lock().unwrap().push_back(reply);
    }

    pub fn push_delete(&self, reply: Result<DeleteCounts, ApiError>) {
        self.deletes.lock().unwrap().push_back(reply);
    }

    /// Hold the next send until the returned sender fires (or is dropped).
    pub fn gate_next_send(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.send_gate.lock().unwrap() = Some(rx);
        tx
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AssistantApi for MockApi {
    async fn init_or_load_conversation(&self, chassis_id: &ChassisId, user_id: &str) -> Result<Conversation, ApiError> {
        self.record(Call::Load { chassis_id: chassis_id.to_string(), user_id: user_id.to_owned() });
        pop(&self.loads)
    }

    async fn send_message(&self, conversation_id: &str, content: &str, _user_id: &str) -> Result<MessagePair, ApiError> {
        self.record(Call::Send { conversation_id: conversation_id.to_owned(), content: content.to_owned() });
        let gate = self.send_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        pop(&self.sends)
    }

    async fn poll_message(
        &self,
        _conversation_id: &str,
        message_id: &str,
        _user_id: &str,
    ) -> Result<AssistantMessage, ApiError> {
        self.record(Call::Poll { message_id: message_id.to_owned() });
        pop(&self.polls)
    }

    async fn send_feedback(
        &self,
        _conversation_id: &str,
        message_id: &str,
        liked: Liked,
        _user_id: &str,
    ) -> Result<AssistantMessage, ApiError> {
        self.record(Call::Feedback { message_id: message_id.to_owned(), liked });
        pop(&self.feedback)
    }

    async fn search_keys(&self) -> Result<Vec<SearchKey>, ApiError> {
        self.record(Call::SearchKeys);
        pop(&self.keys)
    }

    async fn custom_search(
        &self,
        _conversation_id: &str,
        search_keys: &[SearchKey],
        count_needed: Option<u32>,
        _user_id: &str,
    ) -> Result<Conversation, ApiError> {
        self.record(Call::Search { keys: search_keys.to_vec(), count_needed });
        pop(&self.searches)
    }

    async fn delete_conversation(&self, conversation_id: &str, _user_id: &str) -> Result<DeleteCounts, ApiError> {
        self.record(Call::Delete { conversation_id: conversation_id.to_owned() });
        pop(&self.deletes)
    }

    async fn delete_user_conversations(&self, user_id: &str) -> Result<DeleteCounts, ApiError> {
        self.record(Call::DeleteAll { user_id: user_id.to_owned() });
        pop(&self.deletes)
    }
}
