//! # Item Catalog
//!
//! Purchasable items and the lookup seam the cart resolves against.
//! The TOML-backed catalog is loaded from `config/catalog.toml`.

use serde::{Deserialize, Serialize};

/// A purchasable item in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Unique item identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Whether this item is available for purchase
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Lookup seam for the catalog collaborator
pub trait Catalog: Send + Sync {
    /// Resolve an item by id, whether active or not
    fn lookup(&self, id: &str) -> Option<CatalogItem>;
}

/// Item catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemCatalog {
    pub items: Vec<CatalogItem>,
}

impl ItemCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Add an item to the catalog
    pub fn add(&mut self, item: CatalogItem) {
        self.items.push(item);
    }

    /// Get all active items
    pub fn active_items(&self) -> impl Iterator<Item = &CatalogItem> {
        self.items.iter().filter(|i| i.active)
    }

    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

impl Catalog for ItemCatalog {
    fn lookup(&self, id: &str) -> Option<CatalogItem> {
        self.items.iter().find(|i| i.id == id).cloned()
    }
}
