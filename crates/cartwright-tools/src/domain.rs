//! Commerce domain seam.
//!
//! The executor depends only on this capability trait; concrete catalog,
//! cart, and checkout implementations are injected, so tests substitute
//! in-process fakes without network or database dependencies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cartwright_core::types::CartContextEntry;

/// A catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
}

/// Payload for registering a new catalog item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
}

/// Catalog search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
    pub max_price: Option<f64>,
    pub category: Option<String>,
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub item_id: String,
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub total: f64,
}

impl Cart {
    /// Advisory snapshot for prompt injection.
    pub fn to_context(&self) -> Vec<CartContextEntry> {
        self.items
            .iter()
            .map(|i| CartContextEntry {
                item_id: i.item_id.clone(),
                item_name: i.item_name.clone(),
                quantity: i.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category: String,
    pub quantity: u32,
    pub subtotal: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartAnalytics {
    pub item_count: usize,
    pub total_quantity: u32,
    pub total: f64,
    pub by_category: Vec<CategoryBreakdown>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: String,
    pub items: Vec<CartItem>,
    pub total: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Classified domain failure, mapped into a tool outcome by the executor.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    LimitExceeded(String),
}

/// Capability set the tool executor dispatches to. One method per tool.
#[async_trait]
pub trait CommerceServices: Send + Sync {
    async fn search_items(&self, query: &SearchQuery) -> Result<Vec<Item>, DomainError>;

    async fn create_item(&self, item: &NewItem) -> Result<Item, DomainError>;

    async fn add_to_cart(
        &self,
        user_id: &str,
        item_id: &str,
        quantity: u32,
    ) -> Result<Cart, DomainError>;

    async fn update_cart_quantity(
        &self,
        user_id: &str,
        item_id: &str,
        quantity: u32,
    ) -> Result<Cart, DomainError>;

    async fn remove_from_cart(&self, user_id: &str, item_id: &str) -> Result<Cart, DomainError>;

    async fn get_cart(&self, user_id: &str) -> Result<Cart, DomainError>;

    async fn cart_analytics(&self, user_id: &str) -> Result<CartAnalytics, DomainError>;

    async fn checkout(&self, user_id: &str) -> Result<PurchaseRequest, DomainError>;
}
