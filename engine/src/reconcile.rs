//! Reconciliation logic for syncing local and remote state.
//!
//! The remote store delivers whole-payload envelopes stamped with the
//! writer's timestamp. A single watermark comparison decides what happens
//! to each envelope: strictly newer data replaces local state wholesale,
//! everything else (stale data and echoes of this client's own writes) is
//! ignored.
//!
//! # Algorithm
//!
//! 1. Compare the envelope timestamp against the watermark
//! 2. Stale or equal: discard, watermark unchanged
//! 3. Newer: normalize the payload for its dataset
//! 4. Advance the watermark to the envelope timestamp
//!
//! Normalization happens before the watermark moves, so a malformed
//! envelope never consumes a timestamp.

use crate::{error::Result, Error, Product, Timestamp, Watermark};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical datasets mirrored to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Products,
    Categories,
}

impl Dataset {
    /// Stable name keying this dataset in the remote store.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Dataset::Products => "products",
            Dataset::Categories => "categories",
        }
    }
}

/// Whole-payload envelope as stored remotely, one per dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Dataset payload; shape depends on the dataset
    pub data: Value,
    /// Writer's timestamp (milliseconds since epoch)
    pub last_updated: Timestamp,
}

/// A normalized remote payload ready to overwrite local state.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteData {
    Products(Vec<Product>),
    Categories(Vec<String>),
}

impl RemoteData {
    /// The products, if this is a products payload.
    pub fn into_products(self) -> Option<Vec<Product>> {
        match self {
            RemoteData::Products(products) => Some(products),
            RemoteData::Categories(_) => None,
        }
    }

    /// The categories, if this is a categories payload.
    pub fn into_categories(self) -> Option<Vec<String>> {
        match self {
            RemoteData::Categories(categories) => Some(categories),
            RemoteData::Products(_) => None,
        }
    }
}

/// Result of an accept-or-ignore decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The envelope was strictly newer; the watermark has advanced to its
    /// timestamp and local state should be replaced with the payload.
    Applied(RemoteData),
    /// The envelope was stale or an echo of this client's own write.
    Stale,
}

/// Decide whether a remote envelope supersedes local state.
///
/// One function serves both datasets so the staleness rule cannot drift
/// between the two listeners.
pub fn reconcile(
    dataset: Dataset,
    envelope: &Envelope,
    watermark: &mut Watermark,
) -> Result<Outcome> {
    if !watermark.accepts(envelope.last_updated) {
        return Ok(Outcome::Stale);
    }

    let data = match dataset {
        Dataset::Products => RemoteData::Products(normalize_products(&envelope.data)?),
        Dataset::Categories => RemoteData::Categories(normalize_categories(&envelope.data)?),
    };

    watermark.advance(envelope.last_updated);
    Ok(Outcome::Applied(data))
}

/// Normalize a products payload to a sequence ordered by ascending ID.
///
/// The backend may deliver products either as an ordered sequence or as a
/// mapping from arbitrary keys to products; both are accepted.
pub fn normalize_products(data: &Value) -> Result<Vec<Product>> {
    let mut products: Vec<Product> = match data {
        Value::Array(items) => items.iter().map(parse_entry).collect::<Result<_>>()?,
        Value::Object(map) => map.values().map(parse_entry).collect::<Result<_>>()?,
        _ => {
            return Err(Error::MalformedPayload(
                "expected a products sequence or mapping".into(),
            ))
        }
    };

    products.sort_by_key(|p| p.id);
    Ok(products)
}

/// Normalize a categories payload to a sequence of names.
pub fn normalize_categories(data: &Value) -> Result<Vec<String>> {
    match data {
        Value::Array(items) => items.iter().map(parse_entry).collect(),
        Value::Object(map) => map.values().map(parse_entry).collect(),
        _ => Err(Error::MalformedPayload(
            "expected a categories sequence or mapping".into(),
        )),
    }
}

fn parse_entry<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| Error::MalformedPayload(e.to_string()))
}
