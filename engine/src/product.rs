//! Product records in the retail catalog.

use crate::{ProductId, Timestamp};
use serde::{Deserialize, Serialize};

/// A single priced product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Unique identifier, assigned by the catalog
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Unit price in the shop currency
    pub price: f64,
    /// Category this product belongs to
    pub category: String,
    /// When the product was last changed (milliseconds since epoch).
    /// Absent in payloads written by older clients, so it defaults to 0.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Product {
    /// Create a new product.
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        price: f64,
        category: impl Into<String>,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            category: category.into(),
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_product() {
        let product = Product::new(1, "Ethiopian Yirgacheffe", 14.99, "Arabica", 1000);

        assert_eq!(product.id, 1);
        assert_eq!(product.name, "Ethiopian Yirgacheffe");
        assert_eq!(product.price, 14.99);
        assert_eq!(product.category, "Arabica");
        assert_eq!(product.updated_at, 1000);
    }

    #[test]
    fn serialization_roundtrip() {
        let product = Product::new(3, "Brazilian Santos", 10.50, "Arabica", 2000);

        let json = serde_json::to_string(&product).unwrap();
        let parsed: Product = serde_json::from_str(&json).unwrap();

        assert_eq!(product, parsed);
    }

    #[test]
    fn serialization_format() {
        let product = Product::new(1, "Test", 1.0, "Arabica", 1000);
        let json = serde_json::to_string(&product).unwrap();
        assert!(json.contains("updatedAt")); // camelCase
    }

    #[test]
    fn missing_updated_at_defaults_to_zero() {
        let json = r#"{"id": 4, "name": "Vietnamese Robusta", "price": 8.75, "category": "Robusta"}"#;
        let parsed: Product = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.updated_at, 0);
    }
}
