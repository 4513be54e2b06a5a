//! # Crema Engine
//!
//! The deterministic core of a synced retail price list.
//!
//! This crate holds the product and category collections, the mutation
//! operations that change them, and the watermark logic that decides whether
//! remote data supersedes local state. Everything here is pure: timestamps
//! are inputs, persistence and networking live in `crema-client`.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of files, network, or clocks
//! - **Deterministic**: Same inputs always produce same outputs
//! - **Testable**: Pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Catalog
//!
//! The [`Catalog`] owns the product list and the category list and applies
//! all mutations: add/delete products, price edits, bulk percentage
//! adjustments, and category management. Product IDs are assigned as
//! `max(existing) + 1` and every product always references a category that
//! exists in the category list.
//!
//! ### Watermark
//!
//! The [`Watermark`] records the most recent remote state this client has
//! incorporated. A remote envelope is accepted only when its timestamp
//! strictly exceeds the watermark, which also suppresses echoes of the
//! client's own writes.
//!
//! ### Reconciliation
//!
//! [`reconcile`] is the single accept-or-ignore decision, shared by both
//! datasets so the staleness rule cannot drift between them. Accepted
//! payloads are normalized (the backend may deliver products as a sequence
//! or as a mapping) and replace local state wholesale.
//!
//! ## Quick Start
//!
//! ```rust
//! use crema_engine::{Catalog, CategoryFilter, PriceDirection};
//!
//! // 1. Start from the default stock (or load a persisted snapshot)
//! let mut catalog = Catalog::with_default_stock();
//!
//! // 2. Add a product; IDs are assigned by the catalog
//! let id = catalog
//!     .add_product("House Blend", "9.50", "Arabica", 1706745600000)
//!     .unwrap();
//! assert_eq!(id, 6);
//!
//! // 3. Bulk-adjust prices for one category
//! let touched = catalog.bulk_update(
//!     &CategoryFilter::Named("Robusta".into()),
//!     10.0,
//!     PriceDirection::Increase,
//!     1706745601000,
//! );
//! assert_eq!(touched, 2);
//! ```
//!
//! ## Reconciling Remote Data
//!
//! ```rust
//! use crema_engine::{reconcile, Dataset, Envelope, Outcome, Watermark};
//! use serde_json::json;
//!
//! let mut watermark = Watermark::new();
//! let envelope = Envelope {
//!     data: json!(["Arabica", "Robusta"]),
//!     last_updated: 42,
//! };
//!
//! match reconcile(Dataset::Categories, &envelope, &mut watermark).unwrap() {
//!     Outcome::Applied(data) => {
//!         assert_eq!(data.into_categories().unwrap(), vec!["Arabica", "Robusta"]);
//!     }
//!     Outcome::Stale => unreachable!(),
//! }
//! assert_eq!(watermark.last_update(), 42);
//! ```

pub mod catalog;
pub mod error;
pub mod product;
pub mod reconcile;
pub mod watermark;

// Re-export main types at crate root
pub use catalog::{Catalog, CategoryFilter, PriceDirection, UNCATEGORIZED};
pub use error::Error;
pub use product::Product;
pub use reconcile::{
    normalize_categories, normalize_products, reconcile, Dataset, Envelope, Outcome, RemoteData,
};
pub use watermark::Watermark;

/// Type aliases for clarity
pub type ProductId = u64;
pub type CategoryName = String;
pub type Timestamp = i64;
