//! Remote store adapter: the shared backend and per-client sessions.
//!
//! [`RemoteBackend`] plays the role of the shared real-time database: a
//! named-dataset store that fans every write out to all subscribers of
//! that dataset, the writer included. The backend is a cheaply cloneable
//! handle; clients holding clones of the same backend see each other's
//! writes. The watermark comparison downstream is what keeps
//! self-notification harmless.
//!
//! Fault injection switches let tests and drills exercise the failure
//! paths without a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use crema_engine::{Dataset, Envelope, Timestamp};

use crate::config::RemoteConfig;
use crate::error::SyncError;

/// Sender half for remote change notifications.
pub type EventSender = mpsc::UnboundedSender<RemoteEvent>;

/// Receiver half handed out by [`RemoteSession::subscribe`].
pub type EventReceiver = mpsc::UnboundedReceiver<RemoteEvent>;

/// A change notification delivered to subscribers.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    /// Dataset the write targeted
    pub dataset: Dataset,
    /// The full replacement payload
    pub data: Value,
    /// Writer's timestamp
    pub last_updated: Timestamp,
}

/// A registered subscriber for one dataset.
#[derive(Debug)]
struct Subscriber {
    id: String,
    sender: EventSender,
}

/// Handle returned by subscribe; pass back to unsubscribe on teardown.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    key: String,
    id: String,
}

/// The shared multi-client store.
///
/// Cloning is cheap and every clone refers to the same store.
#[derive(Debug, Clone, Default)]
pub struct RemoteBackend {
    inner: Arc<BackendInner>,
}

#[derive(Debug, Default)]
struct BackendInner {
    /// Stored envelopes, keyed by `namespace/dataset`
    datasets: DashMap<String, Envelope>,
    /// Subscribers per dataset key
    subscribers: DashMap<String, Vec<Subscriber>>,
    /// Fault injection: reject connection attempts
    refuse_connections: AtomicBool,
    /// Fault injection: reject writes
    fail_writes: AtomicBool,
}

impl RemoteBackend {
    /// Create a new backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for a client.
    ///
    /// Fails when the configuration is incomplete or the backend refuses
    /// the connection. Idempotency for repeated configuration with the
    /// same credentials is the coordinator's concern.
    pub fn connect(&self, config: &RemoteConfig) -> Result<RemoteSession, SyncError> {
        if !config.is_complete() {
            return Err(SyncError::Connection(
                "endpoint, api key and project id are all required".into(),
            ));
        }
        if self.inner.refuse_connections.load(Ordering::SeqCst) {
            return Err(SyncError::Connection(format!(
                "{}: connection refused",
                config.database_url
            )));
        }

        tracing::info!(project = %config.project_id, "connected to remote store");

        Ok(RemoteSession {
            backend: self.clone(),
            namespace: config.project_id.clone(),
        })
    }

    /// Make subsequent connection attempts fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of registered subscribers across all datasets.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    /// Number of stored dataset envelopes.
    pub fn dataset_count(&self) -> usize {
        self.inner.datasets.len()
    }
}

/// A client's connection to the backend, scoped to its namespace.
#[derive(Debug, Clone)]
pub struct RemoteSession {
    backend: RemoteBackend,
    namespace: String,
}

impl RemoteSession {
    fn key(&self, dataset: Dataset) -> String {
        format!("{}/{}", self.namespace, dataset.wire_name())
    }

    /// Whether the backend holds an envelope for this dataset.
    pub fn has_dataset(&self, dataset: Dataset) -> bool {
        self.backend.inner.datasets.contains_key(&self.key(dataset))
    }

    /// The currently stored envelope for this dataset, if any.
    pub fn current(&self, dataset: Dataset) -> Option<Envelope> {
        self.backend
            .inner
            .datasets
            .get(&self.key(dataset))
            .map(|entry| entry.value().clone())
    }

    /// Replace the dataset's stored envelope and notify every subscriber,
    /// the writer included.
    pub async fn write(
        &self,
        dataset: Dataset,
        data: Value,
        timestamp: Timestamp,
    ) -> Result<(), SyncError> {
        if self.backend.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Write(format!(
                "{}: write rejected",
                dataset.wire_name()
            )));
        }

        let key = self.key(dataset);
        self.backend.inner.datasets.insert(
            key.clone(),
            Envelope {
                data: data.clone(),
                last_updated: timestamp,
            },
        );

        // Fan out; dropped receivers are pruned as we go
        let mut notified = 0;
        if let Some(mut subs) = self.backend.inner.subscribers.get_mut(&key) {
            subs.retain(|sub| {
                let delivered = sub
                    .sender
                    .send(RemoteEvent {
                        dataset,
                        data: data.clone(),
                        last_updated: timestamp,
                    })
                    .is_ok();
                notified += usize::from(delivered);
                delivered
            });
        }

        tracing::debug!(
            dataset = dataset.wire_name(),
            timestamp,
            recipients = notified,
            "wrote dataset"
        );

        Ok(())
    }

    /// Subscribe to a dataset.
    ///
    /// The current envelope, if present, is delivered immediately as the
    /// first event; every subsequent write from any client follows.
    pub fn subscribe(&self, dataset: Dataset) -> (SubscriptionHandle, EventReceiver) {
        let key = self.key(dataset);
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(envelope) = self.backend.inner.datasets.get(&key) {
            let _ = tx.send(RemoteEvent {
                dataset,
                data: envelope.data.clone(),
                last_updated: envelope.last_updated,
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.backend
            .inner
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(Subscriber {
                id: id.clone(),
                sender: tx,
            });

        tracing::debug!(dataset = dataset.wire_name(), subscription = %id, "subscribed");

        (SubscriptionHandle { key, id }, rx)
    }

    /// Stop delivery for a subscription. Safe to call during teardown and
    /// for handles that were already removed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Some(mut subs) = self.backend.inner.subscribers.get_mut(&handle.key) {
            subs.retain(|sub| sub.id != handle.id);
        }
    }
}
