//! Tool executor — validates a model-issued tool call and dispatches it to
//! the commerce services, normalizing every failure into a [`ToolOutcome`].
//!
//! The executor is stateless; its only side effects are those of the domain
//! service it invokes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, warn};

use cartwright_core::types::{ToolCall, ToolFailureKind, ToolOutcome};

use crate::domain::{CommerceServices, DomainError, NewItem, SearchQuery};
use crate::registry::{ToolHandler, ToolKind, ToolRegistry};

const DEFAULT_SEARCH_RESULTS: usize = 10;

/// The caller identity a tool call runs under.
#[derive(Debug, Clone)]
pub struct ToolUser {
    pub id: String,
    pub authenticated: bool,
}

pub struct ToolExecutor {
    services: Arc<dyn CommerceServices>,
    tool_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(services: Arc<dyn CommerceServices>, tool_timeout: Duration) -> Self {
        Self {
            services,
            tool_timeout,
        }
    }

    /// Execute one tool call. Never returns a raw error: every failure mode
    /// is classified into a `ToolOutcome::Failure`.
    pub async fn execute(
        &self,
        registry: &ToolRegistry,
        call: &ToolCall,
        user: &ToolUser,
    ) -> ToolOutcome {
        let Some(spec) = registry.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested by model");
            return ToolOutcome::failure(
                ToolFailureKind::UnknownTool,
                format!("unknown tool '{}'", call.name),
            );
        };

        if let Err(reason) = spec.validate_arguments(&call.arguments) {
            return ToolOutcome::failure(ToolFailureKind::InvalidArguments, reason);
        }

        if spec.kind == ToolKind::Mutating && !user.authenticated {
            return ToolOutcome::failure(
                ToolFailureKind::AuthenticationRequired,
                "sign in to modify the cart or place orders",
            );
        }

        info!(tool = %call.name, "Executing tool");
        let dispatched = self.dispatch(spec.handler, &call.arguments, &user.id);
        match tokio::time::timeout(self.tool_timeout, dispatched).await {
            Err(_) => {
                warn!(tool = %call.name, timeout_secs = self.tool_timeout.as_secs(), "Tool timed out");
                ToolOutcome::failure(
                    ToolFailureKind::Timeout,
                    format!("'{}' did not complete in time", call.name),
                )
            }
            Ok(Ok(payload)) => ToolOutcome::Success { payload },
            Ok(Err(e)) => classify_domain_error(e),
        }
    }

    async fn dispatch(
        &self,
        handler: ToolHandler,
        args: &Value,
        user_id: &str,
    ) -> Result<Value, DomainError> {
        match handler {
            ToolHandler::SearchCatalog => {
                let query = SearchQuery {
                    keyword: str_arg(args, "keyword"),
                    max_price: args.get("max_price").and_then(Value::as_f64),
                    category: opt_str_arg(args, "category"),
                    max_results: args
                        .get("max_results")
                        .and_then(Value::as_u64)
                        .map_or(DEFAULT_SEARCH_RESULTS, |n| n as usize),
                };
                let items = self.services.search_items(&query).await?;
                Ok(json!({ "items": items }))
            }
            ToolHandler::RegisterItem => {
                let item = NewItem {
                    name: str_arg(args, "name"),
                    description: opt_str_arg(args, "description").unwrap_or_default(),
                    price: args.get("price").and_then(Value::as_f64).unwrap_or(0.0),
                    category: opt_str_arg(args, "category").unwrap_or_else(|| "general".into()),
                };
                let created = self.services.create_item(&item).await?;
                Ok(json!({ "item": created }))
            }
            ToolHandler::AddToCart => {
                let cart = self
                    .services
                    .add_to_cart(user_id, &str_arg(args, "item_id"), int_arg(args, "quantity"))
                    .await?;
                Ok(json!({ "cart": cart }))
            }
            ToolHandler::UpdateCartQuantity => {
                let cart = self
                    .services
                    .update_cart_quantity(
                        user_id,
                        &str_arg(args, "item_id"),
                        int_arg(args, "quantity"),
                    )
                    .await?;
                Ok(json!({ "cart": cart }))
            }
            ToolHandler::RemoveFromCart => {
                let cart = self
                    .services
                    .remove_from_cart(user_id, &str_arg(args, "item_id"))
                    .await?;
                Ok(json!({ "cart": cart }))
            }
            ToolHandler::ViewCart => {
                let cart = self.services.get_cart(user_id).await?;
                Ok(json!({ "cart": cart }))
            }
            ToolHandler::CartAnalytics => {
                let analytics = self.services.cart_analytics(user_id).await?;
                Ok(json!({ "analytics": analytics }))
            }
            ToolHandler::Checkout => {
                let purchase_request = self.services.checkout(user_id).await?;
                Ok(json!({ "purchase_request": purchase_request }))
            }
        }
    }
}

fn classify_domain_error(error: DomainError) -> ToolOutcome {
    let kind = match &error {
        DomainError::Validation(_) => ToolFailureKind::Validation,
        DomainError::NotFound(_) => ToolFailureKind::NotFound,
        DomainError::LimitExceeded(_) => ToolFailureKind::LimitExceeded,
    };
    ToolOutcome::failure(kind, error.to_string())
}

// Argument accessors run after schema validation, so a missing required
// value can only mean a registry/spec mismatch; fall back to defaults.
fn str_arg(args: &Value, name: &str) -> String {
    args.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_str_arg(args: &Value, name: &str) -> Option<String> {
    args.get(name).and_then(Value::as_str).map(str::to_string)
}

fn int_arg(args: &Value, name: &str) -> u32 {
    args.get(name).and_then(Value::as_u64).unwrap_or(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::domain::{Cart, CartAnalytics, CartItem, Item, PurchaseRequest};

    #[derive(Default)]
    struct FakeCommerce {
        domain_calls: Mutex<u32>,
        fail_with: Option<DomainError>,
        slow: bool,
    }

    impl FakeCommerce {
        fn calls(&self) -> u32 {
            *self.domain_calls.lock().unwrap()
        }

        fn track(&self) {
            *self.domain_calls.lock().unwrap() += 1;
        }

        async fn result<T>(&self, value: T) -> Result<T, DomainError> {
            self.track();
            if self.slow {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(value),
            }
        }

        fn sample_cart() -> Cart {
            Cart {
                items: vec![CartItem {
                    item_id: "i1".into(),
                    item_name: "Laptop".into(),
                    quantity: 2,
                    unit_price: 899.0,
                }],
                total: 1798.0,
            }
        }
    }

    #[async_trait]
    impl CommerceServices for FakeCommerce {
        async fn search_items(&self, query: &SearchQuery) -> Result<Vec<Item>, DomainError> {
            self.result(vec![Item {
                id: "i1".into(),
                name: format!("{} result", query.keyword),
                description: String::new(),
                price: 899.0,
                category: "electronics".into(),
            }])
            .await
        }

        async fn create_item(&self, item: &NewItem) -> Result<Item, DomainError> {
            self.result(Item {
                id: "new".into(),
                name: item.name.clone(),
                description: item.description.clone(),
                price: item.price,
                category: item.category.clone(),
            })
            .await
        }

        async fn add_to_cart(
            &self,
            _user_id: &str,
            _item_id: &str,
            _quantity: u32,
        ) -> Result<Cart, DomainError> {
            self.result(Self::sample_cart()).await
        }

        async fn update_cart_quantity(
            &self,
            _user_id: &str,
            _item_id: &str,
            _quantity: u32,
        ) -> Result<Cart, DomainError> {
            self.result(Self::sample_cart()).await
        }

        async fn remove_from_cart(
            &self,
            _user_id: &str,
            _item_id: &str,
        ) -> Result<Cart, DomainError> {
            self.result(Self::sample_cart()).await
        }

        async fn get_cart(&self, _user_id: &str) -> Result<Cart, DomainError> {
            self.result(Self::sample_cart()).await
        }

        async fn cart_analytics(&self, _user_id: &str) -> Result<CartAnalytics, DomainError> {
            self.result(CartAnalytics {
                item_count: 1,
                total_quantity: 2,
                total: 1798.0,
                by_category: vec![],
            })
            .await
        }

        async fn checkout(&self, _user_id: &str) -> Result<PurchaseRequest, DomainError> {
            self.result(PurchaseRequest {
                id: "pr1".into(),
                items: Self::sample_cart().items,
                total: 1798.0,
                status: "pending".into(),
                created_at: chrono::Utc::now(),
            })
            .await
        }
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    fn authed() -> ToolUser {
        ToolUser {
            id: "alice".into(),
            authenticated: true,
        }
    }

    fn guest() -> ToolUser {
        ToolUser {
            id: "guest-1".into(),
            authenticated: false,
        }
    }

    fn executor(services: Arc<FakeCommerce>) -> ToolExecutor {
        ToolExecutor::new(services, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_unknown_tool_never_reaches_services() {
        let services = Arc::new(FakeCommerce::default());
        let exec = executor(services.clone());
        let registry = ToolRegistry::builtin();

        let outcome = exec
            .execute(&registry, &call("teleport_cart", json!({})), &authed())
            .await;
        assert!(matches!(
            outcome,
            ToolOutcome::Failure {
                kind: ToolFailureKind::UnknownTool,
                ..
            }
        ));
        assert_eq!(services.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_services() {
        let services = Arc::new(FakeCommerce::default());
        let exec = executor(services.clone());
        let registry = ToolRegistry::builtin();

        for args in [
            json!({"item_id": "i1", "quantity": 0}),
            json!({"item_id": "i1", "quantity": 10000}),
            json!({"quantity": 3}),
        ] {
            let outcome = exec.execute(&registry, &call("add_to_cart", args), &authed()).await;
            assert!(matches!(
                outcome,
                ToolOutcome::Failure {
                    kind: ToolFailureKind::InvalidArguments,
                    ..
                }
            ));
        }
        assert_eq!(services.calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_mutation_rejected() {
        let services = Arc::new(FakeCommerce::default());
        let exec = executor(services.clone());
        let registry = ToolRegistry::builtin();

        for (name, args) in [
            ("add_to_cart", json!({"item_id": "i1", "quantity": 2})),
            ("checkout", json!({})),
        ] {
            let outcome = exec.execute(&registry, &call(name, args), &guest()).await;
            assert!(matches!(
                outcome,
                ToolOutcome::Failure {
                    kind: ToolFailureKind::AuthenticationRequired,
                    ..
                }
            ));
        }
        assert_eq!(services.calls(), 0);
    }

    #[tokio::test]
    async fn test_read_tools_allowed_for_guests() {
        let services = Arc::new(FakeCommerce::default());
        let exec = executor(services.clone());
        let registry = ToolRegistry::builtin();

        let outcome = exec
            .execute(
                &registry,
                &call("search_catalog", json!({"keyword": "laptop"})),
                &guest(),
            )
            .await;
        assert!(matches!(outcome, ToolOutcome::Success { .. }));
        assert_eq!(services.calls(), 1);
    }

    #[tokio::test]
    async fn test_success_payload_verbatim() {
        let services = Arc::new(FakeCommerce::default());
        let exec = executor(services);
        let registry = ToolRegistry::builtin();

        let outcome = exec.execute(&registry, &call("view_cart", json!({})), &authed()).await;
        let ToolOutcome::Success { payload } = outcome else {
            panic!("expected success");
        };
        assert_eq!(payload["cart"]["total"], 1798.0);
        assert_eq!(payload["cart"]["items"][0]["item_name"], "Laptop");
    }

    #[tokio::test]
    async fn test_repeated_reads_return_identical_payloads() {
        let services = Arc::new(FakeCommerce::default());
        let exec = executor(services);
        let registry = ToolRegistry::builtin();

        for (name, args) in [
            ("view_cart", json!({})),
            ("search_catalog", json!({"keyword": "laptop"})),
            ("cart_analytics", json!({})),
        ] {
            let first = exec.execute(&registry, &call(name, args.clone()), &authed()).await;
            let second = exec.execute(&registry, &call(name, args), &authed()).await;
            let (ToolOutcome::Success { payload: a }, ToolOutcome::Success { payload: b }) =
                (first, second)
            else {
                panic!("expected both reads to succeed for {name}");
            };
            assert_eq!(a, b, "repeated {name} reads diverged");
        }
    }

    #[tokio::test]
    async fn test_domain_errors_classified() {
        let cases = [
            (
                DomainError::NotFound("item i9 not found".into()),
                ToolFailureKind::NotFound,
            ),
            (
                DomainError::Validation("quantity exceeds stock".into()),
                ToolFailureKind::Validation,
            ),
            (
                DomainError::LimitExceeded("cart is full".into()),
                ToolFailureKind::LimitExceeded,
            ),
        ];
        for (error, expected) in cases {
            let services = Arc::new(FakeCommerce {
                fail_with: Some(error),
                ..Default::default()
            });
            let exec = executor(services);
            let registry = ToolRegistry::builtin();
            let outcome = exec
                .execute(
                    &registry,
                    &call("add_to_cart", json!({"item_id": "i9", "quantity": 2})),
                    &authed(),
                )
                .await;
            let ToolOutcome::Failure { kind, .. } = outcome else {
                panic!("expected failure");
            };
            assert_eq!(kind, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tool_times_out() {
        let services = Arc::new(FakeCommerce {
            slow: true,
            ..Default::default()
        });
        let exec = ToolExecutor::new(services, Duration::from_secs(5));
        let registry = ToolRegistry::builtin();

        let outcome = exec.execute(&registry, &call("view_cart", json!({})), &authed()).await;
        assert!(matches!(
            outcome,
            ToolOutcome::Failure {
                kind: ToolFailureKind::Timeout,
                ..
            }
        ));
    }
}
