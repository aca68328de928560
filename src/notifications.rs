//! Best-effort push notifications, fanned out per user over broadcast channels.
//!
//! Nothing is stored: events published while a user has no open stream are
//! dropped, and clients re-fetch state after reconnecting.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures_util::{stream, Stream};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, Mutex},
    time::{self, Instant},
};
use tracing::{debug, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NotificationEvent {
    Match {
        match_id: Uuid,
        status: String,
        other_user: Uuid,
    },
    Message {
        conversation_id: Uuid,
        message: Value,
    },
    Heartbeat,
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::Match { .. } => "match",
            NotificationEvent::Message { .. } => "message",
            NotificationEvent::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Clone, Default)]
pub struct Notifier {
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<NotificationEvent>>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<NotificationEvent> {
        let mut channels = self.channels.lock().await;
        prune(&mut channels);
        channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Delivers to every open stream of `user_id` and returns how many got it.
    pub async fn publish(&self, user_id: Uuid, event: NotificationEvent) -> usize {
        let mut channels = self.channels.lock().await;
        let Some(sender) = channels.get(&user_id) else {
            debug!(%user_id, kind = event.kind(), "no open stream; notification dropped");
            return 0;
        };

        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                channels.remove(&user_id);
                0
            }
        }
    }

    pub async fn connected_users(&self) -> usize {
        let mut channels = self.channels.lock().await;
        prune(&mut channels);
        channels.len()
    }
}

/// Drops channels whose streams have all closed.
fn prune(channels: &mut HashMap<Uuid, broadcast::Sender<NotificationEvent>>) {
    let before = channels.len();
    channels.retain(|_, sender| sender.receiver_count() > 0);
    let pruned = before - channels.len();
    if pruned > 0 {
        debug!(pruned, "closed notification channels pruned");
    }
}

/// Events for one subscriber, interleaved with a heartbeat every `heartbeat`.
/// Ends when the channel closes. Lagging subscribers skip what they missed.
pub fn event_stream(
    receiver: broadcast::Receiver<NotificationEvent>,
    heartbeat: Duration,
) -> impl Stream<Item = NotificationEvent> + Send + 'static {
    let ticker = time::interval_at(Instant::now() + heartbeat, heartbeat);

    stream::unfold((receiver, ticker), |(mut receiver, mut ticker)| async move {
        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Ok(event) => return Some((event, (receiver, ticker))),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notification subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                },
                _ = ticker.tick() => {
                    return Some((NotificationEvent::Heartbeat, (receiver, ticker)));
                }
            }
        }
    })
}
