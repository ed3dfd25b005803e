use super::*;
use crate::error::ApiError;
use crate::reducer::Status;
use crate::test_helpers::{
    CHASSIS, CONVERSATION, Call, MockApi, USER, assistant, assistant_message, context, conversation, network_error,
    pair, search_key, user_message,
};
use crate::types::{Conversation, Message, SearchResultsMessage};

fn session_with(api: &Arc<MockApi>) -> AssistantSession {
    AssistantSession::new(api.clone())
}

async fn ready_session(api: &Arc<MockApi>, messages: Vec<Message>) -> AssistantSession {
    api.push_load(Ok(conversation(messages)));
    let session = session_with(api);
    session.apply_context(context());
    session.subscribe().wait_for(|s| s.status == Status::Ready).await.unwrap();
    session
}

fn messages(session: &AssistantSession) -> Vec<Message> {
    session.snapshot().conversation.map(|c| c.messages).unwrap_or_default()
}

fn polls(api: &MockApi) -> usize {
    api.count(|c| matches!(c, Call::Poll { .. }))
}

fn loads(api: &MockApi) -> usize {
    api.count(|c| matches!(c, Call::Load { .. }))
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =============================================================================
// Load
// =============================================================================

#[tokio::test(start_paused = true)]
async fn context_triggers_single_load() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![]).await;

    session.apply_context(context());
    tokio::task::yield_now().await;

    assert_eq!(api.calls(), vec![Call::Load { chassis_id: CHASSIS.into(), user_id: USER.into() }]);
    let state = session.snapshot();
    assert!(state.is_active());
    assert_eq!(state.error, None);
}

#[tokio::test(start_paused = true)]
async fn load_failure_surfaces_error() {
    let api = Arc::new(MockApi::default());
    api.push_load(Err(ApiError::Status { status: 500, body: "boom".into() }));
    let session = session_with(&api);
    session.apply_context(context());
    session.subscribe().wait_for(|s| s.status == Status::Error).await.unwrap();

    let state = session.snapshot();
    assert!(state.conversation.is_none());
    assert!(state.error.as_deref().is_some_and(|e| e.contains("500")));
}

#[tokio::test(start_paused = true)]
async fn load_without_user_does_nothing() {
    let api = Arc::new(MockApi::default());
    let session = session_with(&api);
    session.apply_context(PageContext { chassis_id: context().chassis_id, user_name: None });
    assert!(session.load_conversation().await.is_ok());
    assert_eq!(loads(&api), 0);
    assert_eq!(session.snapshot().status, Status::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn load_resumes_polling_for_pending_reply() {
    let api = Arc::new(MockApi::default());
    api.push_poll(Ok(assistant("a-1", MessageState::Completed, "done")));
    let session = ready_session(&api, vec![assistant_message("a-1", MessageState::Pending, "")]).await;

    advance(10).await;
    assert_eq!(polls(&api), 1);
    assert_eq!(messages(&session)[0].content(), "done");
}

// =============================================================================
// Send + poll
// =============================================================================

#[tokio::test(start_paused = true)]
async fn optimistic_message_visible_while_send_in_flight() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-1", "earlier")]).await;
    let release = api.gate_next_send();
    api.push_send(Ok(pair("u-2", "hi", "a-2")));

    let sender = session.clone();
    let task = tokio::spawn(async move { sender.send_message("hi").await });
    session.subscribe().wait_for(|s| s.conversation.as_ref().is_some_and(|c| c.messages.len() == 2)).await.unwrap();

    let list = messages(&session);
    assert_eq!(list[1].content(), "hi");
    assert!(list[1].message_id().is_empty());

    release.send(()).unwrap();
    task.await.unwrap().unwrap();

    let ids: Vec<String> = messages(&session).iter().map(|m| m.message_id().to_owned()).collect();
    assert_eq!(ids, vec!["m-1", "u-2", "a-2"]);
}

#[tokio::test(start_paused = true)]
async fn send_failure_rolls_back_without_surfacing_error() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-1", "earlier")]).await;
    api.push_send(Err(network_error()));

    let err = session.send_message("hi").await.unwrap_err();
    assert!(matches!(err, AssistantError::Network(ApiError::Request(_))));

    let state = session.snapshot();
    assert_eq!(state.conversation.unwrap().messages, vec![user_message("m-1", "earlier")]);
    assert_eq!(state.error, None);
    assert_eq!(state.status, Status::Ready);
}

#[tokio::test(start_paused = true)]
async fn send_without_conversation_is_rejected() {
    let api = Arc::new(MockApi::default());
    let session = session_with(&api);
    let err = session.send_message("hi").await.unwrap_err();
    assert!(matches!(err, AssistantError::NoConversation));
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn first_poll_fires_one_second_after_send() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![]).await;
    api.push_send(Ok(pair("u-1", "hi", "a-1")));
    api.push_poll(Ok(assistant("a-1", MessageState::Completed, "answer")));

    session.send_message("hi").await.unwrap();
    advance(999).await;
    assert_eq!(polls(&api), 0);

    advance(2).await;
    assert_eq!(polls(&api), 1);
    assert_eq!(messages(&session)[1].content(), "answer");
    assert!(!messages(&session)[1].is_pending());
}

#[tokio::test(start_paused = true)]
async fn pending_poll_keeps_position_and_reschedules() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-0", "first")]).await;
    api.push_send(Ok(pair("u-1", "hi", "a-1")));
    api.push_poll(Ok(assistant("a-1", MessageState::Pending, "")));
    api.push_poll(Ok(assistant("a-1", MessageState::Completed, "answer")));

    session.send_message("hi").await.unwrap();
    advance(1500).await;
    assert_eq!(polls(&api), 1);
    let list = messages(&session);
    assert_eq!(list[2].message_id(), "a-1");
    assert!(list[2].is_pending());

    advance(600).await;
    assert_eq!(polls(&api), 2);
    let list = messages(&session);
    assert_eq!(list[0], user_message("m-0", "first"));
    assert_eq!(list[2].content(), "answer");
}

#[tokio::test(start_paused = true)]
async fn poll_failure_retries_after_two_seconds() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![]).await;
    api.push_send(Ok(pair("u-1", "hi", "a-1")));
    api.push_poll(Err(network_error()));
    api.push_poll(Ok(assistant("a-1", MessageState::Completed, "answer")));

    session.send_message("hi").await.unwrap();
    advance(2500).await;
    assert_eq!(polls(&api), 1);

    advance(600).await;
    assert_eq!(polls(&api), 2);
    assert_eq!(messages(&session)[1].content(), "answer");
}

#[tokio::test(start_paused = true)]
async fn poll_keeps_retrying_failures() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![assistant_message("a-1", MessageState::Pending, "")]).await;

    // No scripted replies: every poll fails.
    advance(20_001).await;
    assert_eq!(polls(&api), 11);
    assert!(messages(&session)[0].is_pending());
}

#[tokio::test(start_paused = true)]
async fn unmount_stops_scheduled_polls() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![]).await;
    api.push_send(Ok(pair("u-1", "hi", "a-1")));

    session.send_message("hi").await.unwrap();
    session.unmount();
    advance(10_000).await;
    assert_eq!(polls(&api), 0);
}

// =============================================================================
// Feedback
// =============================================================================

fn liked_reply() -> Message {
    let mut message = assistant("a-1", MessageState::Completed, "answer");
    message.liked = Liked::Liked;
    Message::Assistant(message)
}

fn liked_of(session: &AssistantSession) -> Liked {
    reducer::current_liked(&session.snapshot(), "a-1").unwrap()
}

#[tokio::test(start_paused = true)]
async fn clicking_active_like_sends_neutral() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![liked_reply()]).await;
    api.push_feedback(Ok(assistant("a-1", MessageState::Completed, "answer")));

    assert!(session.toggle_feedback("a-1", Liked::Liked).await);
    assert_eq!(api.calls().last(), Some(&Call::Feedback { message_id: "a-1".into(), liked: Liked::Neutral }));
    assert_eq!(liked_of(&session), Liked::Neutral);
}

#[tokio::test(start_paused = true)]
async fn feedback_failure_restores_previous_value() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![liked_reply()]).await;
    api.push_feedback(Err(network_error()));

    assert!(!session.toggle_feedback("a-1", Liked::Disliked).await);
    assert_eq!(api.calls().last(), Some(&Call::Feedback { message_id: "a-1".into(), liked: Liked::Disliked }));
    assert_eq!(liked_of(&session), Liked::Liked);
    assert_eq!(session.snapshot().error, None);
}

#[tokio::test(start_paused = true)]
async fn send_feedback_leaves_state_alone() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![liked_reply()]).await;
    let mut server = assistant("a-1", MessageState::Completed, "answer");
    server.liked = Liked::Disliked;
    api.push_feedback(Ok(server));

    assert!(session.send_feedback("a-1", Liked::Disliked).await);
    assert_eq!(liked_of(&session), Liked::Liked);
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test(start_paused = true)]
async fn delete_clears_and_reloads_once() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-1", "old")]).await;
    api.push_delete(Ok(DeleteCounts { status: "ok".into(), conversation: 1, message: 1 }));
    api.push_load(Ok(conversation(vec![])));

    let counts = session.delete_conversation().await.unwrap();
    assert_eq!(counts.conversation, 1);

    let load_calls: Vec<Call> = api.calls().into_iter().filter(|c| matches!(c, Call::Load { .. })).collect();
    assert_eq!(load_calls.len(), 2);
    assert_eq!(load_calls[0], load_calls[1]);
    assert_eq!(session.snapshot().status, Status::Ready);
    assert!(messages(&session).is_empty());
}

#[tokio::test(start_paused = true)]
async fn delete_of_nothing_keeps_conversation() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-1", "old")]).await;
    api.push_delete(Ok(DeleteCounts { status: "ok".into(), conversation: 0, message: 0 }));

    session.delete_conversation().await.unwrap();
    assert_eq!(loads(&api), 1);
    assert_eq!(messages(&session).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn delete_failure_is_reported_and_state_kept() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-1", "old")]).await;

    assert!(session.delete_conversation().await.is_err());
    assert_eq!(messages(&session).len(), 1);
    assert_eq!(session.snapshot().error, None);
}

#[tokio::test(start_paused = true)]
async fn delete_all_uses_user_and_reloads() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-1", "old")]).await;
    api.push_delete(Ok(DeleteCounts { status: "ok".into(), conversation: 3, message: 9 }));
    api.push_load(Ok(conversation(vec![])));

    session.delete_all_conversations().await.unwrap();
    assert!(api.calls().contains(&Call::DeleteAll { user_id: USER.into() }));
    assert_eq!(loads(&api), 2);
}

// =============================================================================
// Search
// =============================================================================

fn search_outcome() -> Conversation {
    conversation(vec![
        user_message("m-1", "q"),
        Message::SearchResults(SearchResultsMessage {
            conversation_id: CONVERSATION.into(),
            message_id: "s-1".into(),
            content: String::new(),
            timestamp: 200,
            results: Vec::new(),
            query: String::new(),
            base_chassis: None,
        }),
    ])
}

#[tokio::test(start_paused = true)]
async fn search_compose_and_submit_adopts_server_conversation() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-1", "q")]).await;
    api.push_keys(Ok(vec![search_key("0", "dealer", false), search_key("1", "sleeper", false)]));
    api.push_search(Ok(search_outcome()));

    session.initiate_search().await.unwrap();
    assert!(session.snapshot().is_composing());
    assert_eq!(session.toggle_facet("0", FacetFlag::Selected), Some(true));
    assert_eq!(session.set_count_needed(40), Some(25));

    session.submit_composition().await.unwrap();
    let expected_keys = vec![search_key("0", "dealer", true), search_key("1", "sleeper", false)];
    assert_eq!(api.calls().last(), Some(&Call::Search { keys: expected_keys, count_needed: Some(25) }));

    let state = session.snapshot();
    assert!(!state.is_composing());
    assert_eq!(state.conversation, Some(search_outcome()));
}

#[tokio::test(start_paused = true)]
async fn search_failure_keeps_conversation_and_allows_sending() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-1", "q")]).await;
    api.push_search(Err(ApiError::Status { status: 502, body: "bad gateway".into() }));

    assert!(session.submit_search(vec![search_key("0", "dealer", true)], Some(10)).await.is_err());
    let state = session.snapshot();
    assert_eq!(state.status, Status::Error);
    assert!(state.error.is_some());
    assert_eq!(state.conversation.unwrap().messages, vec![user_message("m-1", "q")]);

    api.push_send(Ok(pair("u-2", "hi", "a-2")));
    session.send_message("hi").await.unwrap();
    assert_eq!(messages(&session).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn keys_fetch_failure_leaves_composition_closed() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![]).await;

    assert!(session.initiate_search().await.is_err());
    let state = session.snapshot();
    assert!(!state.is_composing());
    assert!(state.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn discard_leaves_conversation_untouched() {
    let api = Arc::new(MockApi::default());
    let session = ready_session(&api, vec![user_message("m-1", "q")]).await;
    api.push_keys(Ok(vec![search_key("0", "dealer", false)]));
    session.initiate_search().await.unwrap();

    assert!(session.discard_search());
    assert!(!session.snapshot().is_composing());
    assert_eq!(messages(&session), vec![user_message("m-1", "q")]);
    assert!(matches!(session.submit_composition().await, Err(AssistantError::NotComposing)));
}
