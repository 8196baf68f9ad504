use std::time::Duration;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use tracing::{debug, info, warn};

use plant_storage::{Credential, StorageResult};
use plant_types::events::{FeedScope, LiveCommand, LiveEvent};
use plant_types::models::Photo;

use crate::error::ApiError;
use crate::feed::{GalleryView, ProfileView};
use crate::photos::identity_from_query;
use crate::state::AppState;

/// Server sends a Ping every 15 seconds. Two missed Pongs (~30s) drop the
/// connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

#[derive(Debug, Deserialize)]
pub struct LiveParams {
    pub token: Option<String>,
}

/// GET /api/photos/live: gallery feed. `?token=` is optional and only
/// forwarded to the document store.
pub async fn gallery_live(
    State(state): State<AppState>,
    Query(params): Query<LiveParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let credential = params
        .token
        .filter(|t| !t.is_empty())
        .map(Credential::bearer);

    ws.on_upgrade(move |socket| async move {
        let view = GalleryView::open(state.documents.clone(), credential);
        run_feed(socket, LiveView::Gallery(view)).await;
    })
}

/// GET /api/profile/live?token=<jwt>: the token's own photos. The token is
/// checked before the upgrade so a bad one gets a plain 401.
pub async fn profile_live(
    State(state): State<AppState>,
    Query(params): Query<LiveParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = identity_from_query(params.token.as_deref())?;

    Ok(ws.on_upgrade(move |socket| async move {
        let view = ProfileView::open(state.documents.clone(), state.objects.clone(), identity);
        run_feed(socket, LiveView::Profile(view)).await;
    }))
}

enum LiveView {
    Gallery(GalleryView),
    Profile(ProfileView),
}

impl LiveView {
    fn scope(&self) -> FeedScope {
        match self {
            Self::Gallery(_) => FeedScope::Gallery,
            Self::Profile(_) => FeedScope::Profile,
        }
    }

    async fn next_snapshot(&mut self) -> StorageResult<Vec<Photo>> {
        match self {
            Self::Gallery(view) => view.next_snapshot().await.map(<[Photo]>::to_vec),
            Self::Profile(view) => view.next_snapshot().await.map(<[Photo]>::to_vec),
        }
    }

    async fn handle(&mut self, cmd: LiveCommand) -> Vec<LiveEvent> {
        match (self, cmd) {
            (Self::Profile(view), LiveCommand::Delete { id }) => match view.delete(&id).await {
                Ok(()) => vec![
                    LiveEvent::Deleted { id },
                    LiveEvent::Snapshot {
                        photos: view.photos().to_vec(),
                    },
                ],
                Err(e) => {
                    warn!("{} live delete of {} failed: {}", view.identity().uid, id, e);
                    vec![LiveEvent::Error {
                        message: e.to_string(),
                    }]
                }
            },
            (Self::Gallery(_), LiveCommand::Delete { .. }) => vec![LiveEvent::Error {
                message: "Deletes are only accepted on the profile feed".into(),
            }],
        }
    }
}

enum Step {
    Snapshot(StorageResult<Vec<Photo>>),
    Incoming(Option<Result<Message, axum::Error>>),
    Heartbeat,
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &LiveEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}

async fn run_feed(socket: WebSocket, mut view: LiveView) {
    let (mut sender, mut receiver) = socket.split();
    let scope = view.scope();

    info!("Live {:?} feed connected", scope);

    if send_event(&mut sender, &LiveEvent::Ready { scope }).await.is_err() {
        return;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut pong_received = true;
    let mut missed_pongs: u8 = 0;

    loop {
        let step = tokio::select! {
            snapshot = view.next_snapshot() => Step::Snapshot(snapshot),
            msg = receiver.next() => Step::Incoming(msg),
            _ = heartbeat.tick() => Step::Heartbeat,
        };

        match step {
            Step::Snapshot(Ok(photos)) => {
                if send_event(&mut sender, &LiveEvent::Snapshot { photos }).await.is_err() {
                    break;
                }
            }
            Step::Snapshot(Err(e)) => {
                warn!("Live {:?} subscription ended: {}", scope, e);
                break;
            }
            Step::Incoming(Some(Ok(Message::Text(text)))) => {
                let cmd = match serde_json::from_str::<LiveCommand>(text.as_str()) {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        let raw: String = text.as_str().chars().take(200).collect();
                        warn!("Bad live command: {} -- raw: {}", e, raw);
                        continue;
                    }
                };
                for event in view.handle(cmd).await {
                    if send_event(&mut sender, &event).await.is_err() {
                        return;
                    }
                }
            }
            Step::Incoming(Some(Ok(Message::Pong(_)))) => pong_received = true,
            Step::Incoming(Some(Ok(Message::Close(_)))) | Step::Incoming(None) => break,
            Step::Incoming(Some(Err(e))) => {
                debug!("Live {:?} socket error: {}", scope, e);
                break;
            }
            Step::Incoming(Some(Ok(_))) => {}
            Step::Heartbeat => {
                if pong_received {
                    missed_pongs = 0;
                } else {
                    missed_pongs += 1;
                    if missed_pongs >= MAX_MISSED_PONGS {
                        warn!("Heartbeat timeout (missed {} pongs), dropping live feed", missed_pongs);
                        break;
                    }
                }
                pong_received = false;
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("Live {:?} feed disconnected", scope);
}
