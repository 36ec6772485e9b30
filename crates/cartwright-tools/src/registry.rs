//! Fixed catalog of tools exposed to the model.
//!
//! Each tool carries a typed parameter schema that is checked at
//! registration time, so adding a tool cannot silently omit validation. The
//! handler is a tagged variant, not a string-keyed callback, so dispatch is
//! exhaustive at compile time.

use serde_json::{json, Map, Value};

use cartwright_core::error::{CartwrightError, Result};

/// Parameter type plus bounds.
#[derive(Debug, Clone)]
pub enum ParamKind {
    String,
    Integer { min: Option<i64>, max: Option<i64> },
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

/// Whether a tool only reads state or mutates it. Mutating tools require an
/// authenticated caller and get a conversational confirmation reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Read,
    Mutating,
}

/// Typed handler mapping — one variant per domain-service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolHandler {
    SearchCatalog,
    RegisterItem,
    AddToCart,
    UpdateCartQuantity,
    RemoveFromCart,
    ViewCart,
    CartAnalytics,
    Checkout,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ToolKind,
    pub params: Vec<ParamSpec>,
    pub handler: ToolHandler,
}

impl ToolSpec {
    /// JSON Schema for the tool's parameters, in the shape providers expect.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let mut prop = Map::new();
            prop.insert("description".into(), json!(param.description));
            match &param.kind {
                ParamKind::String => {
                    prop.insert("type".into(), json!("string"));
                }
                ParamKind::Integer { min, max } => {
                    prop.insert("type".into(), json!("integer"));
                    if let Some(min) = min {
                        prop.insert("minimum".into(), json!(min));
                    }
                    if let Some(max) = max {
                        prop.insert("maximum".into(), json!(max));
                    }
                }
                ParamKind::Number { min, max } => {
                    prop.insert("type".into(), json!("number"));
                    if let Some(min) = min {
                        prop.insert("minimum".into(), json!(min));
                    }
                    if let Some(max) = max {
                        prop.insert("maximum".into(), json!(max));
                    }
                }
                ParamKind::Boolean => {
                    prop.insert("type".into(), json!("boolean"));
                }
            }
            properties.insert(param.name.into(), Value::Object(prop));
            if param.required {
                required.push(param.name);
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check an argument bag against the schema. Returns the first violation
    /// as a human-readable reason. Unknown extra keys are ignored.
    pub fn validate_arguments(&self, args: &Value) -> std::result::Result<(), String> {
        let Some(object) = args.as_object() else {
            return Err("arguments must be a JSON object".into());
        };
        for param in &self.params {
            let value = match object.get(param.name) {
                Some(Value::Null) | None => {
                    if param.required {
                        return Err(format!("missing required argument '{}'", param.name));
                    }
                    continue;
                }
                Some(value) => value,
            };
            match &param.kind {
                ParamKind::String => {
                    if !value.is_string() {
                        return Err(format!("argument '{}' must be a string", param.name));
                    }
                }
                ParamKind::Integer { min, max } => {
                    let Some(n) = value.as_i64() else {
                        return Err(format!("argument '{}' must be an integer", param.name));
                    };
                    if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
                        return Err(format!(
                            "argument '{}' = {n} is out of range [{}, {}]",
                            param.name,
                            min.map_or("-inf".into(), |m| m.to_string()),
                            max.map_or("inf".into(), |m| m.to_string()),
                        ));
                    }
                }
                ParamKind::Number { min, max } => {
                    let Some(n) = value.as_f64() else {
                        return Err(format!("argument '{}' must be a number", param.name));
                    };
                    if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
                        return Err(format!("argument '{}' = {n} is out of bounds", param.name));
                    }
                }
                ParamKind::Boolean => {
                    if !value.is_boolean() {
                        return Err(format!("argument '{}' must be a boolean", param.name));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Registry of available tools, validated at registration time.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) -> Result<()> {
        if spec.name.is_empty() || spec.description.is_empty() {
            return Err(CartwrightError::Tool(
                "tool name and description must be non-empty".into(),
            ));
        }
        if self.tools.iter().any(|t| t.name == spec.name) {
            return Err(CartwrightError::Tool(format!(
                "duplicate tool name '{}'",
                spec.name
            )));
        }
        for (i, a) in spec.params.iter().enumerate() {
            if spec.params[..i].iter().any(|b| b.name == a.name) {
                return Err(CartwrightError::Tool(format!(
                    "tool '{}' declares parameter '{}' twice",
                    spec.name, a.name
                )));
            }
        }
        self.tools.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// The full procurement tool set.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let quantity = |required| ParamSpec {
            name: "quantity",
            description: "Desired quantity, between 1 and 999",
            kind: ParamKind::Integer {
                min: Some(1),
                max: Some(999),
            },
            required,
        };
        let item_id = ParamSpec {
            name: "item_id",
            description: "Identifier of the catalog item",
            kind: ParamKind::String,
            required: true,
        };

        let specs = vec![
            ToolSpec {
                name: "search_catalog",
                description: "Search the catalog by keyword, with optional price and category filters",
                kind: ToolKind::Read,
                params: vec![
                    ParamSpec {
                        name: "keyword",
                        description: "Search keyword, e.g. 'laptop'",
                        kind: ParamKind::String,
                        required: true,
                    },
                    ParamSpec {
                        name: "max_price",
                        description: "Only return items at or under this price",
                        kind: ParamKind::Number {
                            min: Some(0.0),
                            max: None,
                        },
                        required: false,
                    },
                    ParamSpec {
                        name: "category",
                        description: "Restrict results to a category",
                        kind: ParamKind::String,
                        required: false,
                    },
                    ParamSpec {
                        name: "max_results",
                        description: "Result cap, between 1 and 50 (default 10)",
                        kind: ParamKind::Integer {
                            min: Some(1),
                            max: Some(50),
                        },
                        required: false,
                    },
                ],
                handler: ToolHandler::SearchCatalog,
            },
            ToolSpec {
                name: "register_item",
                description: "Register a new item in the catalog",
                kind: ToolKind::Mutating,
                params: vec![
                    ParamSpec {
                        name: "name",
                        description: "Item name",
                        kind: ParamKind::String,
                        required: true,
                    },
                    ParamSpec {
                        name: "description",
                        description: "Item description",
                        kind: ParamKind::String,
                        required: false,
                    },
                    ParamSpec {
                        name: "price",
                        description: "Unit price, non-negative",
                        kind: ParamKind::Number {
                            min: Some(0.0),
                            max: None,
                        },
                        required: true,
                    },
                    ParamSpec {
                        name: "category",
                        description: "Item category",
                        kind: ParamKind::String,
                        required: false,
                    },
                ],
                handler: ToolHandler::RegisterItem,
            },
            ToolSpec {
                name: "add_to_cart",
                description: "Add an item that is not yet in the cart",
                kind: ToolKind::Mutating,
                params: vec![item_id.clone(), quantity(true)],
                handler: ToolHandler::AddToCart,
            },
            ToolSpec {
                name: "update_cart_quantity",
                description: "Set the quantity of an item already in the cart",
                kind: ToolKind::Mutating,
                params: vec![item_id.clone(), quantity(true)],
                handler: ToolHandler::UpdateCartQuantity,
            },
            ToolSpec {
                name: "remove_from_cart",
                description: "Remove an item from the cart",
                kind: ToolKind::Mutating,
                params: vec![item_id],
                handler: ToolHandler::RemoveFromCart,
            },
            ToolSpec {
                name: "view_cart",
                description: "Show the current cart contents",
                kind: ToolKind::Read,
                params: vec![],
                handler: ToolHandler::ViewCart,
            },
            ToolSpec {
                name: "cart_analytics",
                description: "Summarize the cart: totals and category breakdown",
                kind: ToolKind::Read,
                params: vec![],
                handler: ToolHandler::CartAnalytics,
            },
            ToolSpec {
                name: "checkout",
                description: "Submit the cart as a purchase request",
                kind: ToolKind::Mutating,
                params: vec![],
                handler: ToolHandler::Checkout,
            },
        ];

        for spec in specs {
            registry
                .register(spec)
                .expect("builtin tool table is statically valid");
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_has_all_tools() {
        let registry = ToolRegistry::builtin();
        for name in [
            "search_catalog",
            "register_item",
            "add_to_cart",
            "update_cart_quantity",
            "remove_from_cart",
            "view_cart",
            "cart_analytics",
            "checkout",
        ] {
            assert!(registry.get(name).is_some(), "missing tool {name}");
        }
        assert_eq!(registry.specs().len(), 8);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        let spec = ToolSpec {
            name: "view_cart",
            description: "Show the cart",
            kind: ToolKind::Read,
            params: vec![],
            handler: ToolHandler::ViewCart,
        };
        registry.register(spec.clone()).unwrap();
        assert!(registry.register(spec).is_err());
    }

    #[test]
    fn test_duplicate_param_rejected() {
        let mut registry = ToolRegistry::new();
        let param = ParamSpec {
            name: "item_id",
            description: "id",
            kind: ParamKind::String,
            required: true,
        };
        let spec = ToolSpec {
            name: "remove_from_cart",
            description: "Remove an item",
            kind: ToolKind::Mutating,
            params: vec![param.clone(), param],
            handler: ToolHandler::RemoveFromCart,
        };
        assert!(registry.register(spec).is_err());
    }

    #[test]
    fn test_schema_shape() {
        let registry = ToolRegistry::builtin();
        let schema = registry.get("add_to_cart").unwrap().parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["quantity"]["type"], "integer");
        assert_eq!(schema["properties"]["quantity"]["minimum"], 1);
        assert_eq!(schema["properties"]["quantity"]["maximum"], 999);
        let required: Vec<_> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(required.contains(&"item_id"));
        assert!(required.contains(&"quantity"));
    }

    #[test]
    fn test_validate_missing_required() {
        let registry = ToolRegistry::builtin();
        let spec = registry.get("add_to_cart").unwrap();
        let err = spec
            .validate_arguments(&json!({"quantity": 2}))
            .unwrap_err();
        assert!(err.contains("item_id"));
    }

    #[test]
    fn test_validate_quantity_bounds() {
        let registry = ToolRegistry::builtin();
        let spec = registry.get("add_to_cart").unwrap();
        assert!(spec
            .validate_arguments(&json!({"item_id": "i1", "quantity": 0}))
            .is_err());
        assert!(spec
            .validate_arguments(&json!({"item_id": "i1", "quantity": 10000}))
            .is_err());
        assert!(spec
            .validate_arguments(&json!({"item_id": "i1", "quantity": 999}))
            .is_ok());
    }

    #[test]
    fn test_validate_type_mismatch() {
        let registry = ToolRegistry::builtin();
        let spec = registry.get("search_catalog").unwrap();
        assert!(spec.validate_arguments(&json!({"keyword": 42})).is_err());
        assert!(spec
            .validate_arguments(&json!({"keyword": "laptop", "max_price": "cheap"}))
            .is_err());
        assert!(spec
            .validate_arguments(&json!({"keyword": "laptop", "max_price": 1000}))
            .is_ok());
    }

    #[test]
    fn test_validate_ignores_unknown_keys() {
        let registry = ToolRegistry::builtin();
        let spec = registry.get("view_cart").unwrap();
        assert!(spec.validate_arguments(&json!({"verbose": true})).is_ok());
    }

    #[test]
    fn test_validate_non_object_rejected() {
        let registry = ToolRegistry::builtin();
        let spec = registry.get("view_cart").unwrap();
        assert!(spec.validate_arguments(&json!("not an object")).is_err());
    }
}
