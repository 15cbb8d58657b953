//! Session endpoints for a presentation layer
//!
//! Screens read snapshots and post the events their buttons produce. The
//! WebSocket streams every snapshot the driver publishes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::Error;
use crate::card::{DeckStats, Ease};
use crate::session::{Event, Snapshot};

/// Build session router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/session", get(snapshot))
        .route("/session/events", post(post_event))
        .route("/session/ws", get(ws_upgrade))
        .route("/decks", get(list_decks))
        .route("/decks/switch", post(switch_deck))
        .route("/decks/{name}/stats", get(deck_stats))
        .with_state(state)
}

/// Events a presentation layer can post
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRequest {
    Start,
    Stop,
    Backgrounded,
    Grade { ease: u8 },
    ReadAnswer,
    Undo,
    /// Text the presentation layer recognized itself
    Utterance { text: String },
    /// The platform moved the audio route
    RouteChanged,
}

async fn snapshot(State(state): State<Arc<ApiState>>) -> Json<Snapshot> {
    Json(state.session.snapshot())
}

/// Apply an event; the response is the snapshot as of acceptance
async fn post_event(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<EventRequest>,
) -> Result<(StatusCode, Json<Snapshot>), SessionError> {
    let session = &state.session;

    match request {
        EventRequest::Start => session.send(Event::Start).await,
        EventRequest::Stop => session.send(Event::Stop).await,
        EventRequest::Backgrounded => session.send(Event::Backgrounded).await,
        EventRequest::Grade { ease } => {
            let ease = Ease::try_from(ease).map_err(SessionError::from)?;
            session.send(Event::GradeButton(ease)).await
        }
        EventRequest::ReadAnswer => session.send(Event::ReadAnswer).await,
        EventRequest::Undo => session.send(Event::Undo).await,
        EventRequest::Utterance { text } => {
            if text.trim().is_empty() {
                return Err(SessionError::BadRequest("empty utterance".to_string()));
            }
            session.hear(text).await
        }
        EventRequest::RouteChanged => session.route_changed().await,
    }?;

    Ok((StatusCode::ACCEPTED, Json(session.snapshot())))
}

async fn ws_upgrade(State(state): State<Arc<ApiState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_snapshots(socket, state))
}

/// Push the current snapshot, then every change, until either side closes
async fn stream_snapshots(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut snapshots = state.session.subscribe();

    tracing::debug!("snapshot stream connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let text = {
                let current = snapshots.borrow_and_update();
                match serde_json::to_string(&*current) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize snapshot");
                        break;
                    }
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!("snapshot stream disconnected");
}

/// Deck listing response
#[derive(Debug, Serialize)]
pub struct DecksResponse {
    pub decks: Vec<String>,
}

async fn list_decks(State(state): State<Arc<ApiState>>) -> Result<Json<DecksResponse>, SessionError> {
    let decks = state.cards.list_decks().await?;
    Ok(Json(DecksResponse { decks }))
}

/// Deck switch request
#[derive(Debug, Deserialize)]
pub struct SwitchDeckRequest {
    pub name: String,
}

async fn switch_deck(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SwitchDeckRequest>,
) -> Result<StatusCode, SessionError> {
    state.cards.switch_deck(&request.name).await?;
    tracing::info!(deck = %request.name, "switched deck");
    Ok(StatusCode::NO_CONTENT)
}

async fn deck_stats(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<DeckStats>, SessionError> {
    Ok(Json(state.cards.deck_stats(&name).await?))
}

/// Session API errors
#[derive(Debug)]
pub enum SessionError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Upstream(String),
}

impl From<Error> for SessionError {
    fn from(error: Error) -> Self {
        match error {
            Error::InvalidEase(_) => Self::BadRequest(error.to_string()),
            Error::NotFound(message) => Self::NotFound(message),
            Error::SessionClosed | Error::ReviewerNotReady(_) => Self::Unavailable(error.to_string()),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_failed", msg),
        };

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
