/// API request handlers
use crate::api::models::*;
use crate::config::AppConfig;
use crate::events::{CreationEvent, EventBus};
use crate::persistence::Persistence;
use crate::resolver::{Resolvers, Viewer};
use crate::types::Message;
use async_stream::stream;
use axum::{
    async_trait,
    extract::{FromRequestParts, Json, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub resolvers: Resolvers<Persistence>,
    pub persistence: Persistence,
    pub bus: EventBus,
    pub config: AppConfig,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(persistence: Persistence, bus: EventBus, config: AppConfig) -> Self {
        let resolvers = Resolvers::new(
            std::sync::Arc::new(persistence.clone()),
            config.pagination.clone(),
        );
        Self {
            resolvers,
            persistence,
            bus,
            config,
            start_time: Instant::now(),
        }
    }
}

/// The bearer token is taken as the already-authenticated user id. A
/// missing or malformed header yields an anonymous viewer, never a
/// rejection.
#[async_trait]
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header =
            <Option<TypedHeader<Authorization<Bearer>>>>::from_request_parts(parts, state).await?;
        Ok(match header {
            Some(TypedHeader(Authorization(bearer))) if !bearer.token().trim().is_empty() => {
                Viewer::authenticated(bearer.token().trim())
            }
            _ => Viewer::anonymous(),
        })
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        subscribers: state.bus.subscriber_count(),
    })
}

/// Conversations the viewer takes part in, each with its newest messages.
pub async fn viewer_feed(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(args): Query<PageArgs>,
) -> Response {
    let request = match args.to_request() {
        Ok(request) => request,
        Err(e) => return bad_request(e),
    };
    respond(
        state
            .resolvers
            .feed_with_messages(&viewer, &request, args.messages_first)
            .await,
    )
}

pub async fn viewer_mates(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(args): Query<PageArgs>,
) -> Response {
    let request = match args.to_request() {
        Ok(request) => request,
        Err(e) => return bad_request(e),
    };
    respond(state.resolvers.mates(&viewer, &request).await)
}

pub async fn viewer_message_count(State(state): State<AppState>, viewer: Viewer) -> Response {
    respond(state.resolvers.message_count(&viewer).await)
}

pub async fn conversation_messages(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(conversation_id): Path<String>,
    Query(args): Query<PageArgs>,
) -> Response {
    let request = match args.to_request() {
        Ok(request) => request,
        Err(e) => return bad_request(e),
    };
    respond(
        state
            .resolvers
            .messages(&viewer, &conversation_id, &request)
            .await,
    )
}

/// Create a conversation. The viewer is always a recipient.
pub async fn create_conversation(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(request): Json<CreateConversationRequest>,
) -> Response {
    let Some(user_id) = viewer.user_id().map(str::to_string) else {
        return unauthorized();
    };

    let mut recipients = vec![user_id];
    recipients.extend(request.recipients);
    let persistence = state.persistence.clone();
    let title = request.title;
    let created = tokio::task::spawn_blocking(move || {
        persistence.create_conversation(&recipients, title.as_deref())
    })
    .await;

    match flatten(created) {
        Ok(conversation) => {
            let audience = conversation.recipients.clone();
            state
                .bus
                .publish(audience, CreationEvent::conversation_created(conversation.clone()));
            (StatusCode::CREATED, Json(DataResponse::new(Some(conversation)))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// Post a message to a conversation the viewer belongs to.
pub async fn create_message(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(conversation_id): Path<String>,
    Json(request): Json<CreateMessageRequest>,
) -> Response {
    let Some(user_id) = viewer.user_id().map(str::to_string) else {
        return unauthorized();
    };
    if request.content.trim().is_empty() {
        return bad_request("message content must not be empty");
    }

    let persistence = state.persistence.clone();
    let created = tokio::task::spawn_blocking(move || {
        let Some(conversation) = persistence.get_conversation(&conversation_id)? else {
            return Ok(None);
        };
        if !conversation.recipients.contains(&user_id) {
            return Ok(None);
        }
        let message = persistence.create_message(&conversation.id, &user_id, &request.content)?;
        Ok::<Option<(Vec<String>, Message)>, anyhow::Error>(Some((conversation.recipients, message)))
    })
    .await;

    match flatten(created) {
        Ok(Some((audience, message))) => {
            state
                .bus
                .publish(audience, CreationEvent::message_created(message.clone()));
            (StatusCode::CREATED, Json(DataResponse::new(Some(message)))).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "not_found",
                "conversation not found or viewer is not a recipient",
            )),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// Server-sent stream of creation events addressed to the viewer.
pub async fn subscriptions(State(state): State<AppState>, viewer: Viewer) -> Response {
    let Some(user_id) = viewer.user_id().map(str::to_string) else {
        return unauthorized();
    };
    Sse::new(event_stream(state.bus.clone(), user_id))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn event_stream(
    bus: EventBus,
    user_id: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let mut rx = bus.subscribe();
    stream! {
        debug!(user_id = %user_id, "subscription opened");
        loop {
            match rx.recv().await {
                Ok(published) => {
                    if !published.is_visible_to(&user_id) {
                        continue;
                    }
                    match Event::default().event("recordCreated").json_data(&published.event) {
                        Ok(event) => yield Ok(event),
                        Err(e) => error!("failed to encode creation event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = %user_id, skipped, "subscriber lagged; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(user_id = %user_id, "subscription closed");
    }
}

fn respond<T: Serialize>(result: anyhow::Result<Option<T>>) -> Response {
    match result {
        Ok(data) => Json(DataResponse::new(data)).into_response(),
        Err(e) => internal_error(e),
    }
}

fn flatten<T>(joined: Result<anyhow::Result<T>, tokio::task::JoinError>) -> anyhow::Result<T> {
    joined.map_err(|e| anyhow::anyhow!("database task failed: {}", e))?
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new("unauthorized", "a viewer is required")),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("invalid_request", message)),
    )
        .into_response()
}

fn internal_error(e: anyhow::Error) -> Response {
    error!("request failed: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal_error", e.to_string())),
    )
        .into_response()
}
