//! Tool layer for the Cartwright agent: the registry of capabilities the
//! model may invoke, schema validation, and the executor that dispatches
//! validated calls to the commerce domain services.

pub mod domain;
pub mod executor;
pub mod registry;

pub use domain::{
    Cart, CartAnalytics, CartItem, CommerceServices, DomainError, Item, NewItem, PurchaseRequest,
    SearchQuery,
};
pub use executor::{ToolExecutor, ToolUser};
pub use registry::{ParamKind, ParamSpec, ToolHandler, ToolKind, ToolRegistry, ToolSpec};
