use std::{convert::Infallible, time::Duration};

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use futures_util::{stream, Stream, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::notifications::{event_stream, NotificationEvent};
use crate::state::AppState;

/// Clients wait this long before reconnecting a dropped stream.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(5_000);

#[derive(Deserialize)]
pub struct StreamQuery {
    /// `EventSource` cannot send headers, so the token may come as a query parameter.
    pub token: Option<String>,
}

fn to_sse_event(event: &NotificationEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|err| {
        warn!(kind = event.kind(), error = %err, "failed to encode notification");
        Event::default().comment("unencodable notification")
    })
}

pub async fn stream_notifications(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<StreamQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let token = bearer
        .as_ref()
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
        .or(query.token)
        .ok_or_else(AppError::unauthorized)?;
    let claims = state
        .jwt
        .verify_token(&token)
        .map_err(|_| AppError::unauthorized())?;

    let receiver = state.notifier.subscribe(claims.sub).await;
    let heartbeat = Duration::from_secs(state.config.notification_heartbeat_secs.max(1));
    info!(user_id = %claims.sub, "notification stream opened");

    let hint = stream::once(async { Ok::<_, Infallible>(Event::default().retry(RECONNECT_DELAY)) });
    let events = event_stream(receiver, heartbeat).map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
    Ok(Sse::new(hint.chain(events)))
}
