//! Live subscriptions over the photo collection.
//!
//! A [`Subscription`] owns a background task that re-runs one query whenever
//! its store reports a change and publishes the full, ordered result into a
//! `watch` channel. Readers always see a complete snapshot, never a delta.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use plant_types::models::{Photo, PhotoQuery};

use crate::credential::Credential;
use crate::error::{StorageError, StorageResult};
use crate::traits::DocumentStore;

/// A materialized query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Newest first.
    pub photos: Vec<Photo>,
    /// False until the first query result has arrived.
    pub loaded: bool,
}

/// How a store tells subscribers that the collection may have changed.
pub enum ChangeFeed {
    /// The store pushes a notification on every write or delete.
    Notify(broadcast::Receiver<()>),
    /// The store cannot push; re-query on a fixed period.
    Poll(Interval),
}

impl ChangeFeed {
    pub fn notify(rx: broadcast::Receiver<()>) -> Self {
        Self::Notify(rx)
    }

    /// Poll every `period`, first tick one period from now. Must be called
    /// inside a Tokio runtime.
    pub fn poll(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self::Poll(interval)
    }

    /// Wait for the next possible change. Returns false once the store is gone.
    pub async fn next(&mut self) -> bool {
        match self {
            Self::Notify(rx) => match rx.recv().await {
                Ok(()) => true,
                // Missed notifications still mean "something changed".
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Change feed lagged by {} notifications", n);
                    true
                }
                Err(broadcast::error::RecvError::Closed) => false,
            },
            Self::Poll(interval) => {
                interval.tick().await;
                true
            }
        }
    }
}

/// A standing query. Dropping it stops the background task.
pub struct Subscription {
    rx: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Open a subscription to `query` on `store`. Must be called inside a
    /// Tokio runtime.
    pub fn open(
        store: Arc<dyn DocumentStore>,
        query: PhotoQuery,
        credential: Option<Credential>,
    ) -> Self {
        let (tx, rx) = watch::channel(Snapshot::default());
        let task = tokio::spawn(run_subscription(store, query, credential, tx));
        Self { rx, task }
    }

    /// The latest snapshot, without marking it seen.
    pub fn current(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// The latest snapshot if one arrived since the last call to
    /// [`Subscription::take_changed`] or [`Subscription::changed`].
    pub fn take_changed(&mut self) -> Option<Snapshot> {
        match self.rx.has_changed() {
            Ok(true) => Some(self.rx.borrow_and_update().clone()),
            _ => None,
        }
    }

    /// Wait for the next snapshot.
    pub async fn changed(&mut self) -> StorageResult<Snapshot> {
        self.rx
            .changed()
            .await
            .map_err(|_| StorageError::SubscriptionClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_subscription(
    store: Arc<dyn DocumentStore>,
    query: PhotoQuery,
    credential: Option<Credential>,
    tx: watch::Sender<Snapshot>,
) {
    // Register for changes before the first read so nothing slips between.
    let mut feed = store.changes();

    loop {
        match store.query(&query, credential.as_ref()).await {
            Ok(photos) => {
                tx.send_if_modified(|snap| {
                    if snap.loaded && snap.photos == photos {
                        return false;
                    }
                    snap.photos = photos;
                    snap.loaded = true;
                    true
                });
            }
            Err(e) => warn!("Feed query {:?} failed: {}", query, e),
        }

        if tx.is_closed() || !feed.next().await {
            break;
        }
    }

    debug!("Subscription to {:?} closed", query);
}
