//! SSE endpoint streaming item status updates to one user.
//!
//! Each connection holds a StreamHub subscription. When the client goes
//! away axum drops the stream, and dropping the subscription unregisters it.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::common::UserId;
use crate::domains::items::ItemUpdateHub;

pub const ITEM_UPDATE_EVENT: &str = "item-update";
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Shared state for the SSE routes.
#[derive(Clone)]
pub struct SseState {
    pub stream_hub: ItemUpdateHub,
}

/// Build the axum router for SSE endpoints.
pub fn router(state: SseState) -> Router {
    Router::new()
        .route("/api/users/:user_id/items/stream", get(stream_handler))
        .with_state(state)
}

/// Subscribes the caller to their item updates.
///
/// The first frame is a `connected` comment so clients know the
/// subscription is live before any transition happens.
async fn stream_handler(
    State(state): State<SseState>,
    Path(user_id): Path<UserId>,
) -> impl IntoResponse {
    let subscription = state.stream_hub.subscribe(user_id);
    debug!(user_id = %user_id, subscription_id = %subscription.id(), "SSE client connected");

    let connected = stream::once(async { Ok::<_, axum::Error>(Event::default().comment("connected")) });
    let updates = subscription.map(|update| {
        Event::default()
            .event(ITEM_UPDATE_EVENT)
            .json_data(&update)
    });

    Sse::new(connected.chain(updates)).keep_alive(
        KeepAlive::new()
            .interval(KEEPALIVE_INTERVAL)
            .text("keepalive"),
    )
}
