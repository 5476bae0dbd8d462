mod helpers;

use std::sync::Arc;

use cairn::chat::FALLBACK_REPLY;
use cairn::error::ApiError;
use cairn::profile;
use cairn::session;
use cairn::store::memory::MemoryStore;
use helpers::{modelless_engine, seed_session, seed_user, test_engine};

#[tokio::test]
async fn plain_turn_appends_exactly_two_messages() {
    let store = Arc::new(MemoryStore::new());
    let user_id = seed_user(store.as_ref(), "Marcus", "+15550001111", "blue horizon");
    let session_id = seed_session(store.as_ref(), &user_id);
    let engine = test_engine(store.clone(), "One day at a time.");

    let reply = engine.handle_turn(&session_id, "rough morning").await.unwrap();
    assert_eq!(reply.reply, "One day at a time.");

    let sess = session::load_session(store.as_ref(), &session_id)
        .unwrap()
        .unwrap();
    assert_eq!(sess.history.len(), 2);
    assert_eq!(sess.history[0].content, "rough morning");
    assert_eq!(sess.history[1].content, "One day at a time.");
}

#[tokio::test]
async fn history_is_capped_at_fifty_messages() {
    let store = Arc::new(MemoryStore::new());
    let user_id = seed_user(store.as_ref(), "Marcus", "+15550001111", "blue horizon");
    let session_id = seed_session(store.as_ref(), &user_id);
    let engine = test_engine(store.clone(), "ok");

    for i in 0..40 {
        engine
            .handle_turn(&session_id, &format!("message {i}"))
            .await
            .unwrap();
    }

    let sess = session::load_session(store.as_ref(), &session_id)
        .unwrap()
        .unwrap();
    assert_eq!(sess.history.len(), 50);
    // Oldest messages were evicted; the newest turn is intact at the end.
    assert_eq!(sess.history[49].content, "ok");
    assert_eq!(sess.history[48].content, "message 39");
}

#[tokio::test]
async fn unknown_session_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let engine = test_engine(store, "ok");

    let err = engine.handle_turn("no-such-session", "hello").await.unwrap_err();
    assert!(matches!(err, ApiError::BadSession));
}

#[tokio::test]
async fn missing_model_falls_back_but_completes_the_turn() {
    let store = Arc::new(MemoryStore::new());
    let user_id = seed_user(store.as_ref(), "Marcus", "+15550001111", "blue horizon");
    let session_id = seed_session(store.as_ref(), &user_id);
    let engine = modelless_engine(store.clone());

    let reply = engine.handle_turn(&session_id, "hello?").await.unwrap();
    assert_eq!(reply.reply, FALLBACK_REPLY);

    // Bookkeeping still ran: history appended, contact recorded.
    let sess = session::load_session(store.as_ref(), &session_id)
        .unwrap()
        .unwrap();
    assert_eq!(sess.history.len(), 2);
    let memory = profile::load_memory(store.as_ref(), &user_id).unwrap();
    assert_eq!(memory.last_topics.as_deref(), Some("hello?"));
}

#[tokio::test]
async fn turn_records_last_topics_for_known_users() {
    let store = Arc::new(MemoryStore::new());
    let user_id = seed_user(store.as_ref(), "Marcus", "+15550001111", "blue horizon");
    let session_id = seed_session(store.as_ref(), &user_id);
    let engine = test_engine(store.clone(), "ok");

    let reply = engine
        .handle_turn(&session_id, "thinking about my amends list")
        .await
        .unwrap();
    assert_eq!(
        reply.memory_delta.last_topics.as_deref(),
        Some("thinking about my amends list")
    );
    let memory = profile::load_memory(store.as_ref(), &user_id).unwrap();
    assert!(memory.last_contact.is_some());
}
