//! Catalog - the in-memory state container.
//!
//! The catalog owns the product and category collections and applies all
//! mutation operations. Persistence and remote mirroring are the caller's
//! concern; the catalog only produces new state.

use crate::{error::Result, Error, Product, ProductId, Timestamp};
use serde::{Deserialize, Serialize};

/// Category products fall back to when their own category is deleted and no
/// other category remains.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Filter selecting which products an operation touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    /// Every product, regardless of category
    All,
    /// Only products in the named category
    Named(String),
}

impl CategoryFilter {
    /// Whether a product in `category` is selected by this filter.
    pub fn matches(&self, category: &str) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Named(name) => name == category,
        }
    }
}

/// Direction of a bulk price adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceDirection {
    Increase,
    Decrease,
}

/// The product and category collections.
///
/// Categories keep their insertion order; products keep the order they were
/// added in, with IDs assigned as `max(existing) + 1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    products: Vec<Product>,
    categories: Vec<String>,
}

/// Round to two decimal places, half away from zero at the cent boundary.
fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse a user-supplied price string into a finite number.
fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog from already-loaded collections.
    pub fn from_parts(products: Vec<Product>, categories: Vec<String>) -> Self {
        Self {
            products,
            categories,
        }
    }

    /// The stock a fresh install starts with.
    pub fn default_stock() -> Vec<Product> {
        vec![
            Product::new(1, "Ethiopian Yirgacheffe", 14.99, "Arabica", 0),
            Product::new(2, "Colombian Supremo", 12.99, "Arabica", 0),
            Product::new(3, "Brazilian Santos", 10.50, "Arabica", 0),
            Product::new(4, "Vietnamese Robusta", 8.75, "Robusta", 0),
            Product::new(5, "Indian Robusta", 7.99, "Robusta", 0),
        ]
    }

    /// The categories a fresh install starts with.
    pub fn default_categories() -> Vec<String> {
        vec!["Arabica".to_string(), "Robusta".to_string()]
    }

    /// Create a catalog seeded with the default stock.
    pub fn with_default_stock() -> Self {
        Self::from_parts(Self::default_stock(), Self::default_categories())
    }

    /// All products, in insertion order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// All categories, in insertion order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Get a product by ID.
    pub fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// The ID the next added product will receive.
    pub fn next_id(&self) -> ProductId {
        self.products.iter().map(|p| p.id).max().unwrap_or(0) + 1
    }

    /// Add a product and return its assigned ID.
    ///
    /// The name must be non-blank and the raw price must parse as a finite
    /// non-negative number. A category not yet in the category list is
    /// appended to it, so products never reference a missing category.
    pub fn add_product(
        &mut self,
        name: &str,
        raw_price: &str,
        category: &str,
        now: Timestamp,
    ) -> Result<ProductId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        let price = parse_price(raw_price)
            .filter(|p| *p >= 0.0)
            .ok_or_else(|| Error::InvalidPrice(raw_price.to_string()))?;

        if !self.categories.iter().any(|c| c == category) {
            self.categories.push(category.to_string());
        }

        let id = self.next_id();
        self.products
            .push(Product::new(id, name, price, category, now));

        Ok(id)
    }

    /// Remove a product, returning it for the caller's rollback path.
    ///
    /// An absent ID is a no-op, not an error.
    pub fn delete_product(&mut self, id: ProductId) -> Option<Product> {
        let index = self.products.iter().position(|p| p.id == id)?;
        Some(self.products.remove(index))
    }

    /// Set a product's price from a raw user-supplied string.
    ///
    /// Unparseable input coerces the price to zero rather than failing.
    /// Returns false when the product does not exist.
    pub fn set_price(&mut self, id: ProductId, raw_value: &str, now: Timestamp) -> bool {
        let price = parse_price(raw_value).unwrap_or(0.0);
        match self.products.iter_mut().find(|p| p.id == id) {
            Some(product) => {
                product.price = price;
                product.updated_at = now;
                true
            }
            None => false,
        }
    }

    /// Adjust every matching product's price by a percentage.
    ///
    /// Prices are rounded to the cent after the adjustment. Returns the
    /// number of products touched.
    pub fn bulk_update(
        &mut self,
        filter: &CategoryFilter,
        percent: f64,
        direction: PriceDirection,
        now: Timestamp,
    ) -> usize {
        let modifier = match direction {
            PriceDirection::Increase => 1.0 + percent / 100.0,
            PriceDirection::Decrease => 1.0 - percent / 100.0,
        };

        let mut touched = 0;
        for product in self
            .products
            .iter_mut()
            .filter(|p| filter.matches(&p.category))
        {
            product.price = round_cents(product.price * modifier);
            product.updated_at = now;
            touched += 1;
        }

        touched
    }

    /// Add a category. Blank or duplicate names are silently ignored.
    pub fn add_category(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.categories.iter().any(|c| c == name) {
            return false;
        }
        self.categories.push(name.to_string());
        true
    }

    /// Delete a category, reassigning its products to the first remaining
    /// category, or to [`UNCATEGORIZED`] when none remain.
    ///
    /// The sentinel is appended to the category list when it is used, so
    /// every product still references an existing category afterwards.
    /// Returns false when the category does not exist.
    pub fn delete_category(&mut self, name: &str, now: Timestamp) -> bool {
        if !self.categories.iter().any(|c| c == name) {
            return false;
        }

        let fallback = self
            .categories
            .iter()
            .find(|c| c.as_str() != name)
            .cloned()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        let mut reassigned = false;
        for product in self.products.iter_mut().filter(|p| p.category == name) {
            product.category = fallback.clone();
            product.updated_at = now;
            reassigned = true;
        }

        self.categories.retain(|c| c != name);

        if reassigned
            && fallback == UNCATEGORIZED
            && !self.categories.iter().any(|c| c == UNCATEGORIZED)
        {
            self.categories.push(UNCATEGORIZED.to_string());
        }

        true
    }

    /// Empty the product collection. Categories are kept.
    pub fn clear_products(&mut self) {
        self.products.clear();
    }

    /// Replace the product collection wholesale with an accepted remote
    /// payload.
    pub fn set_products(&mut self, products: Vec<Product>) {
        self.products = products;
    }

    /// Replace the category collection wholesale with an accepted remote
    /// payload.
    pub fn set_categories(&mut self, categories: Vec<String>) {
        self.categories = categories;
    }

    /// Products whose name contains `search` (case-insensitive) and whose
    /// category matches the filter.
    pub fn products_matching(&self, search: &str, filter: &CategoryFilter) -> Vec<&Product> {
        let needle = search.to_lowercase();
        self.products
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&needle) && filter.matches(&p.category))
            .collect()
    }

    /// Serialize the product collection to a standalone JSON document.
    ///
    /// This is a snapshot for download, not a live link.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.products).map_err(|e| Error::Serialization(e.to_string()))
    }
}
