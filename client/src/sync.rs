//! Sync coordinator: keeps the catalog, the local store and the remote
//! store reconciled.
//!
//! [`SyncedCatalog`] owns the application state. Every mutation applies to
//! the in-memory catalog first, is persisted locally in the same call, and
//! is then mirrored to the remote store best-effort. Incoming remote
//! notifications are buffered by the subscriptions and applied by
//! [`SyncedCatalog::pump_remote`], where the engine's watermark comparison
//! decides acceptance.
//!
//! Remote failures never corrupt local state. The single compensating
//! action is the delete path: a product delete whose remote write fails is
//! rolled back to the pre-delete snapshot.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crema_engine::{
    reconcile, Catalog, CategoryFilter, Dataset, Envelope, Outcome, PriceDirection, ProductId,
    RemoteData, Timestamp, Watermark,
};

use crate::config::RemoteConfig;
use crate::error::{Result, SyncError};
use crate::local::LocalStore;
use crate::remote::{EventReceiver, RemoteBackend, RemoteSession, SubscriptionHandle};

/// How long a transient status stays visible before reverting to idle.
pub const STATUS_RESET: Duration = Duration::from_secs(3);

/// Keys used in the local store.
mod keys {
    pub const PRODUCTS: &str = "products";
    pub const CATEGORIES: &str = "categories";
    pub const REMOTE_CONFIG: &str = "remote-config";
    pub const WATERMARK: &str = "watermark";
}

/// UI-visible sync indicator. Transient values revert to `Idle` after
/// [`STATUS_RESET`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
    Success,
}

impl SyncStatus {
    fn encode(self) -> u8 {
        match self {
            SyncStatus::Idle => 0,
            SyncStatus::Syncing => 1,
            SyncStatus::Error => 2,
            SyncStatus::Success => 3,
        }
    }

    fn decode(value: u8) -> Self {
        match value {
            1 => SyncStatus::Syncing,
            2 => SyncStatus::Error,
            3 => SyncStatus::Success,
            _ => SyncStatus::Idle,
        }
    }
}

/// Connection lifecycle of the coordinator.
///
/// `Error` is transient: it reverts to the state the failure interrupted
/// (`Disconnected` for a failed configure, `ConnectedIdle` for a failed
/// write) after [`STATUS_RESET`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ConnectedIdle,
    Syncing,
    Error,
}

impl ConnectionState {
    fn encode(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::ConnectedIdle => 2,
            ConnectionState::Syncing => 3,
            ConnectionState::Error => 4,
        }
    }

    fn decode(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::ConnectedIdle,
            3 => ConnectionState::Syncing,
            4 => ConnectionState::Error,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Shared status storage, readable from the revert timers.
///
/// The generation counter invalidates pending timers: any status or state
/// change bumps it, so a stale timer never clobbers a newer value.
#[derive(Debug, Default)]
struct StatusCell {
    status: AtomicU8,
    state: AtomicU8,
    generation: AtomicU64,
}

impl StatusCell {
    fn status(&self) -> SyncStatus {
        SyncStatus::decode(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: SyncStatus) {
        self.status.store(status.encode(), Ordering::SeqCst);
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::decode(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.encode(), Ordering::SeqCst);
    }

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// An active dataset subscription.
struct Subscription {
    handle: SubscriptionHandle,
    receiver: EventReceiver,
}

/// The coordinating object owning catalog, persistence and sync state.
pub struct SyncedCatalog {
    catalog: Catalog,
    store: LocalStore,
    watermark: Watermark,
    /// Stamp of the most recent local write, kept strictly increasing
    last_stamp: Timestamp,
    remote_config: Option<RemoteConfig>,
    session: Option<RemoteSession>,
    subscriptions: Vec<Subscription>,
    cell: Arc<StatusCell>,
}

impl SyncedCatalog {
    /// Load the application state from the local store.
    ///
    /// Missing or unreadable records fall back to the default stock, an
    /// empty watermark, and no remote configuration.
    pub fn open(store: LocalStore) -> Self {
        let products = store
            .load(keys::PRODUCTS)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(Catalog::default_stock);
        let categories = store
            .load(keys::CATEGORIES)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(Catalog::default_categories);
        let watermark: Watermark = store
            .load(keys::WATERMARK)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let remote_config = store
            .load(keys::REMOTE_CONFIG)
            .and_then(|v| serde_json::from_value(v).ok());

        Self {
            catalog: Catalog::from_parts(products, categories),
            store,
            // Local stamps must move past the last incorporated remote
            // state, or our next write would look stale to every peer
            last_stamp: watermark.last_update(),
            watermark,
            remote_config,
            session: None,
            subscriptions: Vec::new(),
            cell: Arc::new(StatusCell::default()),
        }
    }

    /// The current catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The current staleness watermark.
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// The persisted remote credentials, if any.
    pub fn remote_config(&self) -> Option<&RemoteConfig> {
        self.remote_config.as_ref()
    }

    /// The UI-visible sync indicator.
    pub fn status(&self) -> SyncStatus {
        self.cell.status()
    }

    /// The connection lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.cell.state()
    }

    /// Establish (or re-establish) the remote mirror.
    ///
    /// Re-invoking with unchanged credentials while connected is a no-op.
    /// On success the coordinator subscribes to both datasets and, when
    /// the namespace has never been written, seeds it with the current
    /// local state. On failure local state is untouched and the error
    /// status auto-clears.
    pub async fn configure_remote(
        &mut self,
        backend: &RemoteBackend,
        config: RemoteConfig,
    ) -> Result<()> {
        if self.session.is_some() {
            if self.remote_config.as_ref() == Some(&config) {
                tracing::debug!("remote already configured with these credentials");
                return Ok(());
            }
            self.disconnect();
        }

        self.set_state(ConnectionState::Connecting);
        let session = match backend.connect(&config) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "remote configuration failed");
                self.flash_error(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let fresh_namespace = !session.has_dataset(Dataset::Products);
        for dataset in [Dataset::Products, Dataset::Categories] {
            let (handle, receiver) = session.subscribe(dataset);
            self.subscriptions.push(Subscription { handle, receiver });
        }
        self.session = Some(session);

        self.store
            .save(keys::REMOTE_CONFIG, &serde_json::to_value(&config)?)?;
        self.remote_config = Some(config);
        self.set_state(ConnectionState::ConnectedIdle);

        if fresh_namespace {
            // A namespace nobody has written yet adopts our state
            let stamp = self.next_stamp();
            self.push_dataset(Dataset::Products, stamp).await;
            let stamp = self.next_stamp();
            self.push_dataset(Dataset::Categories, stamp).await;
        }

        self.flash_status(SyncStatus::Success);
        Ok(())
    }

    /// Tear down the remote mirror. Must be called before dropping a
    /// connected coordinator so the backend stops delivering to it.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            for sub in self.subscriptions.drain(..) {
                session.unsubscribe(&sub.handle);
            }
            tracing::info!("disconnected from remote store");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Add a product. Validation failures leave all state untouched.
    pub async fn add_product(
        &mut self,
        name: &str,
        raw_price: &str,
        category: &str,
    ) -> Result<ProductId> {
        let now = self.next_stamp();
        let categories_before = self.catalog.categories().len();
        let id = self.catalog.add_product(name, raw_price, category, now)?;
        self.persist_products()?;

        let category_added = self.catalog.categories().len() != categories_before;
        if category_added {
            self.persist_categories()?;
        }

        self.push_dataset(Dataset::Products, now).await;
        if category_added {
            let stamp = self.next_stamp();
            self.push_dataset(Dataset::Categories, stamp).await;
        }

        Ok(id)
    }

    /// Delete a product, optimistically.
    ///
    /// The delete applies locally first; if the remote write then fails,
    /// both the catalog and the local store are restored to the pre-delete
    /// snapshot. Returns whether the delete stuck.
    pub async fn delete_product(&mut self, id: ProductId) -> Result<bool> {
        let preimage = self.catalog.products().to_vec();
        if self.catalog.delete_product(id).is_none() {
            return Ok(false);
        }
        self.persist_products()?;

        let stamp = self.next_stamp();
        if !self.push_dataset(Dataset::Products, stamp).await {
            tracing::warn!(id, "rolling back delete after failed remote write");
            self.catalog.set_products(preimage);
            self.persist_products()?;
            return Ok(false);
        }

        Ok(true)
    }

    /// Set a product's price from raw input. Returns false for an absent
    /// product.
    pub async fn set_price(&mut self, id: ProductId, raw_value: &str) -> Result<bool> {
        let now = self.next_stamp();
        if !self.catalog.set_price(id, raw_value, now) {
            return Ok(false);
        }
        self.persist_products()?;
        self.push_dataset(Dataset::Products, now).await;
        Ok(true)
    }

    /// Adjust matching products' prices by a percentage. Returns the
    /// number of products touched.
    pub async fn bulk_update(
        &mut self,
        filter: &CategoryFilter,
        percent: f64,
        direction: PriceDirection,
    ) -> Result<usize> {
        let now = self.next_stamp();
        let touched = self.catalog.bulk_update(filter, percent, direction, now);
        if touched == 0 {
            return Ok(0);
        }
        self.persist_products()?;
        self.push_dataset(Dataset::Products, now).await;
        Ok(touched)
    }

    /// Add a category. Blank or duplicate names are silently ignored.
    pub async fn add_category(&mut self, name: &str) -> Result<bool> {
        if !self.catalog.add_category(name) {
            return Ok(false);
        }
        self.persist_categories()?;
        let stamp = self.next_stamp();
        self.push_dataset(Dataset::Categories, stamp).await;
        Ok(true)
    }

    /// Delete a category, reassigning its products per the catalog rules.
    pub async fn delete_category(&mut self, name: &str) -> Result<bool> {
        let now = self.next_stamp();
        if !self.catalog.delete_category(name, now) {
            return Ok(false);
        }
        self.persist_products()?;
        self.persist_categories()?;

        self.push_dataset(Dataset::Products, now).await;
        let stamp = self.next_stamp();
        self.push_dataset(Dataset::Categories, stamp).await;
        Ok(true)
    }

    /// Empty the product collection and its persisted record. Categories
    /// are kept.
    pub async fn clear_products(&mut self) -> Result<()> {
        self.catalog.clear_products();
        self.store.clear(keys::PRODUCTS)?;
        let stamp = self.next_stamp();
        self.push_dataset(Dataset::Products, stamp).await;
        Ok(())
    }

    /// Push the current local state to the remote store on demand.
    pub async fn sync_now(&mut self) -> Result<()> {
        if self.session.is_none() {
            self.flash_error(ConnectionState::Disconnected);
            return Err(SyncError::NotConnected);
        }
        let stamp = self.next_stamp();
        self.push_dataset(Dataset::Products, stamp).await;
        let stamp = self.next_stamp();
        self.push_dataset(Dataset::Categories, stamp).await;
        Ok(())
    }

    /// Apply buffered remote notifications. Returns how many were
    /// accepted.
    ///
    /// Notifications are applied oldest-first across both datasets so one
    /// dataset's newer stamp cannot shadow the other's pending update.
    /// Stale notifications and echoes of our own writes are dropped
    /// silently; malformed payloads are logged and skipped.
    pub fn pump_remote(&mut self) -> Result<usize> {
        let mut events = Vec::new();
        for sub in &mut self.subscriptions {
            while let Ok(event) = sub.receiver.try_recv() {
                events.push(event);
            }
        }
        events.sort_by_key(|event| event.last_updated);

        let mut applied = 0;
        for event in events {
            let envelope = Envelope {
                data: event.data,
                last_updated: event.last_updated,
            };
            match reconcile(event.dataset, &envelope, &mut self.watermark) {
                Ok(Outcome::Applied(RemoteData::Products(products))) => {
                    tracing::info!(
                        timestamp = envelope.last_updated,
                        count = products.len(),
                        "accepted remote products"
                    );
                    self.catalog.set_products(products);
                    self.persist_products()?;
                    self.persist_watermark();
                    applied += 1;
                }
                Ok(Outcome::Applied(RemoteData::Categories(categories))) => {
                    tracing::info!(
                        timestamp = envelope.last_updated,
                        count = categories.len(),
                        "accepted remote categories"
                    );
                    self.catalog.set_categories(categories);
                    self.persist_categories()?;
                    self.persist_watermark();
                    applied += 1;
                }
                Ok(Outcome::Stale) => {
                    tracing::trace!(
                        dataset = event.dataset.wire_name(),
                        timestamp = envelope.last_updated,
                        "ignored stale notification"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        dataset = event.dataset.wire_name(),
                        error = %e,
                        "rejected malformed remote payload"
                    );
                }
            }
        }

        Ok(applied)
    }

    /// Serialize the current product collection for download.
    pub fn export_json(&self) -> Result<String> {
        Ok(self.catalog.export_json()?)
    }

    /// Mirror one dataset to the remote store, best effort.
    ///
    /// Returns false only when a connected write failed; the caller has
    /// already applied the change locally.
    async fn push_dataset(&mut self, dataset: Dataset, stamp: Timestamp) -> bool {
        let Some(session) = self.session.clone() else {
            return true;
        };

        let data = match dataset {
            Dataset::Products => serde_json::to_value(self.catalog.products()),
            Dataset::Categories => serde_json::to_value(self.catalog.categories()),
        };
        let data = match data {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(dataset = dataset.wire_name(), error = %e, "failed to encode payload");
                return false;
            }
        };

        self.set_state(ConnectionState::Syncing);
        self.set_status(SyncStatus::Syncing);

        match session.write(dataset, data, stamp).await {
            Ok(()) => {
                // Advance past our own stamp so the echo reads as stale
                self.watermark.advance(stamp);
                self.persist_watermark();
                self.set_state(ConnectionState::ConnectedIdle);
                self.flash_status(SyncStatus::Success);
                true
            }
            Err(e) => {
                tracing::warn!(
                    dataset = dataset.wire_name(),
                    error = %e,
                    "remote write failed; local change kept"
                );
                self.flash_error(ConnectionState::ConnectedIdle);
                false
            }
        }
    }

    /// Wall-clock stamp, nudged forward so successive local writes never
    /// share a millisecond.
    fn next_stamp(&mut self) -> Timestamp {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }

    fn persist_products(&self) -> Result<()> {
        let value = serde_json::to_value(self.catalog.products())?;
        self.store.save(keys::PRODUCTS, &value)?;
        Ok(())
    }

    fn persist_categories(&self) -> Result<()> {
        let value = serde_json::to_value(self.catalog.categories())?;
        self.store.save(keys::CATEGORIES, &value)?;
        Ok(())
    }

    /// The watermark is a cache of the persisted collections' recency; a
    /// failed save only costs a re-application on the next start.
    fn persist_watermark(&self) {
        if let Ok(value) = serde_json::to_value(self.watermark) {
            if let Err(e) = self.store.save(keys::WATERMARK, &value) {
                tracing::warn!(error = %e, "failed to persist watermark");
            }
        }
    }

    fn set_status(&self, status: SyncStatus) {
        self.cell.bump();
        self.cell.set_status(status);
    }

    fn set_state(&self, state: ConnectionState) {
        self.cell.bump();
        self.cell.set_state(state);
    }

    /// Show a transient status, reverting to idle unless something newer
    /// replaced it first.
    fn flash_status(&self, status: SyncStatus) {
        let token = self.cell.bump();
        self.cell.set_status(status);

        let cell = Arc::clone(&self.cell);
        tokio::spawn(async move {
            tokio::time::sleep(STATUS_RESET).await;
            if cell.generation() == token {
                cell.set_status(SyncStatus::Idle);
            }
        });
    }

    /// Enter the transient error state, recovering to `recover_to` unless
    /// something newer replaced it first.
    fn flash_error(&self, recover_to: ConnectionState) {
        let token = self.cell.bump();
        self.cell.set_status(SyncStatus::Error);
        self.cell.set_state(ConnectionState::Error);

        let cell = Arc::clone(&self.cell);
        tokio::spawn(async move {
            tokio::time::sleep(STATUS_RESET).await;
            if cell.generation() == token {
                cell.set_status(SyncStatus::Idle);
                cell.set_state(recover_to);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_roundtrip() {
        for status in [
            SyncStatus::Idle,
            SyncStatus::Syncing,
            SyncStatus::Error,
            SyncStatus::Success,
        ] {
            assert_eq!(SyncStatus::decode(status.encode()), status);
        }
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::ConnectedIdle,
            ConnectionState::Syncing,
            ConnectionState::Error,
        ] {
            assert_eq!(ConnectionState::decode(state.encode()), state);
        }
    }

    #[test]
    fn fresh_store_seeds_default_stock() {
        let dir = tempfile::tempdir().unwrap();
        let app = SyncedCatalog::open(LocalStore::open(dir.path()).unwrap());

        assert_eq!(app.catalog().products().len(), 5);
        assert_eq!(
            app.catalog().categories(),
            &["Arabica".to_string(), "Robusta".to_string()]
        );
        assert_eq!(app.status(), SyncStatus::Idle);
        assert_eq!(app.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn stamps_are_strictly_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = SyncedCatalog::open(LocalStore::open(dir.path()).unwrap());

        let mut previous = 0;
        for _ in 0..100 {
            let stamp = app.next_stamp();
            assert!(stamp > previous);
            previous = stamp;
        }
    }

    #[test]
    fn stamps_start_past_the_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let far_future = chrono::Utc::now().timestamp_millis() + 60_000;
        store
            .save(
                "watermark",
                &serde_json::to_value(Watermark::at(far_future)).unwrap(),
            )
            .unwrap();

        let mut app = SyncedCatalog::open(store);
        assert!(app.next_stamp() > far_future);
    }
}
