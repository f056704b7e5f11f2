use super::*;
use crate::test_support::{me, other, page, room};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::error::ErrorCode;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Deserialize)]
struct RecordedQuery {
    limit: u32,
    before: Option<i64>,
}

#[derive(Clone, Default)]
struct ServerState {
    queries: Arc<Mutex<Vec<(String, RecordedQuery)>>>,
    receipts: Arc<Mutex<Vec<i64>>>,
}

async fn list_messages(
    State(state): State<ServerState>,
    Path(chat_room_id): Path<String>,
    Query(query): Query<RecordedQuery>,
) -> Json<Vec<MessagePayload>> {
    let from = query.before.map_or(50, |before| before - 1);
    let count = i64::from(query.limit).min(from);
    state.queries.lock().await.push((chat_room_id, query));
    Json(page(room(1), from, count, other()))
}

async fn mark_read(
    State(state): State<ServerState>,
    Path(message_id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    if message_id == 403 {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiError::new(ErrorCode::Forbidden, "not a participant")),
        ));
    }
    state.receipts.lock().await.push(message_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn chat_room(Path(_chat_room_id): Path<String>) -> Json<ChatRoom> {
    Json(ChatRoom {
        id: room(1),
        participants: [me(), other()].into_iter().collect(),
    })
}

async fn spawn_server() -> (Url, ServerState) {
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/chat_rooms/:chat_room_id/messages", get(list_messages))
        .route("/api/chat_rooms/:chat_room_id", get(chat_room))
        .route("/api/messages/:message_id/read", post(mark_read))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    let base = Url::parse(&format!("http://{addr}/api/")).expect("url");
    (base, state)
}

#[tokio::test]
async fn fetches_history_with_limit_and_cursor() {
    let (base, state) = spawn_server().await;
    let backend = RestChatBackend::new(base);

    let first = backend
        .fetch_older_messages(room(1), None, 10)
        .await
        .expect("first page");
    let second = backend
        .fetch_older_messages(room(1), Some(MessageId(41)), 10)
        .await
        .expect("second page");

    assert_eq!(first.messages.len(), 10);
    assert_eq!(first.messages[0].id, Some(MessageId(50)));
    assert_eq!(second.messages[0].id, Some(MessageId(40)));
    assert!(!second.end_of_history);

    let queries = state.queries.lock().await;
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].0, room(1).to_string());
    assert_eq!(queries[0].1.limit, 10);
    assert_eq!(queries[0].1.before, None);
    assert_eq!(queries[1].1.before, Some(41));
}

#[tokio::test]
async fn submits_read_receipts() {
    let (base, state) = spawn_server().await;
    let backend = RestChatBackend::new(base);

    backend
        .submit_read_receipt(MessageId(12))
        .await
        .expect("receipt");

    assert_eq!(*state.receipts.lock().await, vec![12]);
}

#[tokio::test]
async fn surfaces_api_error_body() {
    let (base, _state) = spawn_server().await;
    let backend = RestChatBackend::new(base);

    let err = backend
        .submit_read_receipt(MessageId(403))
        .await
        .expect_err("forbidden");

    let api_error = err.downcast_ref::<ApiError>().expect("api error");
    assert!(matches!(api_error.code, ErrorCode::Forbidden));
    assert!(!api_error.is_retryable());
    assert!(err.to_string().contains("403"));
}

#[tokio::test]
async fn fetches_chat_room_participants() {
    let (base, _state) = spawn_server().await;
    let backend = RestChatBackend::new(base);

    let chat_room = backend.fetch_chat_room(room(1)).await.expect("room");

    assert!(chat_room.is_direct());
    assert_eq!(chat_room.counterparties(me()).collect::<Vec<_>>(), vec![other()]);
}

#[tokio::test]
async fn unreachable_backend_fails_fetch() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let backend =
        RestChatBackend::new(Url::parse(&format!("http://{addr}/")).expect("url"));

    assert!(backend
        .fetch_older_messages(room(1), None, 5)
        .await
        .is_err());
}
