//! `GET /sse` + `POST /messages/?session_id=` transport.
//!
//! `GET /sse` opens a Server-Sent-Events stream whose first event carries a
//! freshly minted session id. The client then POSTs JSON-RPC requests to
//! `/messages/?session_id=<id>`; the POST itself is acknowledged
//! immediately, and the actual JSON-RPC response is delivered as a
//! subsequent SSE event on that session's open stream.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use tokio::sync::{mpsc, RwLock};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::dispatcher::ToolDispatcher;
use crate::protocol::RpcRequest;
use crate::transport::handle_request;

type SessionSender = mpsc::UnboundedSender<Event>;

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<ToolDispatcher>,
    sessions: Arc<RwLock<HashMap<String, SessionSender>>>,
}

/// Serve the `sse` transport until the process is asked to shut down.
pub async fn serve(
    dispatcher: Arc<ToolDispatcher>,
    bind_address: SocketAddr,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let state = AppState {
        dispatcher,
        sessions: Arc::new(RwLock::new(HashMap::new())),
    };

    let router = Router::new()
        .route("/sse", get(open_session))
        .route("/messages/", post(post_message))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(address = %bind_address, "sse transport listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn open_session(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = format!("{:032x}", uuid::Uuid::new_v4().as_u128());
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    let greeting = Event::default().event("session").data(session_id.clone());
    let _ = tx.send(greeting);

    state.sessions.write().await.insert(session_id.clone(), tx);
    info!(session_id = %session_id, "sse session opened");

    let stream = SessionStream {
        rx,
        session_id,
        sessions: Arc::clone(&state.sessions),
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Wraps the per-session receiver so the session is deregistered as soon
/// as the client disconnects (stream dropped), rather than leaking an
/// entry in the session map for the process lifetime.
struct SessionStream {
    rx: mpsc::UnboundedReceiver<Event>,
    session_id: String,
    sessions: Arc<RwLock<HashMap<String, SessionSender>>>,
}

impl Stream for SessionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|opt| opt.map(Ok))
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        let sessions = Arc::clone(&self.sessions);
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            sessions.write().await.remove(&session_id);
            info!(session_id = %session_id, "sse session closed");
        });
    }
}

#[derive(Debug, serde::Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Json(request): Json<RpcRequest>,
) -> impl IntoResponse {
    let sender = {
        let sessions = state.sessions.read().await;
        sessions.get(&query.session_id).cloned()
    };

    let Some(sender) = sender else {
        warn!(session_id = %query.session_id, "post to unknown or closed session");
        return (StatusCode::NOT_FOUND, "unknown session_id").into_response();
    };

    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move {
        let response = handle_request(&dispatcher, request).await;
        match serde_json::to_string(&response) {
            Ok(body) => {
                let _ = sender.send(Event::default().event("message").data(body));
            }
            Err(err) => warn!(error = %err, "failed to serialize rpc response"),
        }
    });

    StatusCode::ACCEPTED.into_response()
}
