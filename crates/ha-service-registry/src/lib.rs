//! Service registry with async handlers
//!
//! Integrations register services (e.g. `lyric.set_hold_time`) with an async
//! handler and an optional JSON schema for the service data. Calls are routed
//! by `domain.service` key and validated against the schema before the
//! handler runs.

use dashmap::DashMap;
use ha_core::{Context, ServiceCall, SupportsResponse};
use jsonschema::JSONSchema;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("service does not support responses")]
    ResponseNotSupported,
}

/// Information about a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    /// Domain the service belongs to
    pub domain: String,
    /// Service name
    pub service: String,
    /// Human-readable name
    pub name: Option<String>,
    /// Description of what the service does
    pub description: Option<String>,
    /// JSON schema for service data
    pub schema: Option<serde_json::Value>,
    /// Whether this service supports returning a response
    pub supports_response: SupportsResponse,
}

impl ServiceDescription {
    /// Create a bare description for `domain.service`
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            name: None,
            description: None,
            schema: None,
            supports_response: SupportsResponse::None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

struct RegisteredService {
    handler: ServiceHandler,
    validator: Option<Arc<JSONSchema>>,
    description: ServiceDescription,
}

/// The service registry manages all registered services
pub struct ServiceRegistry {
    /// Services indexed by "domain.service" key
    services: DashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    /// Create a new empty service registry
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a service without a description or schema
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        self.register_with_description(ServiceDescription::new(domain, service), handler);
    }

    /// Register a service with full description
    ///
    /// A schema that fails to compile is dropped with a warning; the service
    /// is still registered without validation.
    #[instrument(skip(self, description, handler), fields(domain = %description.domain, service = %description.service))]
    pub fn register_with_description<F, Fut>(&self, description: ServiceDescription, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let key = format!("{}.{}", description.domain, description.service);

        let validator = description.schema.as_ref().and_then(|schema| {
            match JSONSchema::compile(schema) {
                Ok(compiled) => Some(Arc::new(compiled)),
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid service schema");
                    None
                }
            }
        });

        debug!("Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services.insert(
            key,
            RegisteredService {
                handler,
                validator,
                description,
            },
        );
    }

    /// Call a service
    ///
    /// Service data is validated against the registered schema first.
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
        return_response: bool,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let registered = self.services.get(&key).ok_or_else(|| {
            warn!("Service not found");
            ServiceError::NotFound {
                domain: domain.to_string(),
                service: service.to_string(),
            }
        })?;

        if return_response && registered.description.supports_response == SupportsResponse::None {
            return Err(ServiceError::ResponseNotSupported);
        }

        if let Some(validator) = &registered.validator {
            if let Err(errors) = validator.validate(&service_data) {
                let message = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                return Err(ServiceError::InvalidData(message));
            }
        }

        let handler = registered.handler.clone();
        // Release the map shard before awaiting the handler
        drop(registered);

        debug!("Calling service");
        let result = handler(ServiceCall::new(domain, service, service_data, context)).await?;

        if return_response {
            Ok(result)
        } else {
            Ok(None)
        }
    }

    /// Check if a service exists
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    /// Get service description
    pub fn get_service(&self, domain: &str, service: &str) -> Option<ServiceDescription> {
        self.services
            .get(&format!("{}.{}", domain, service))
            .map(|s| s.description.clone())
    }

    /// Get all services for a domain
    pub fn domain_services(&self, domain: &str) -> Vec<ServiceDescription> {
        self.services
            .iter()
            .filter(|s| s.description.domain == domain)
            .map(|s| s.description.clone())
            .collect()
    }

    /// Unregister a service, returning whether it existed
    #[instrument(skip(self))]
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let removed = self
            .services
            .remove(&format!("{}.{}", domain, service))
            .is_some();

        if removed {
            debug!("Unregistered service");
        }

        removed
    }

    /// Get total number of registered services
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for ServiceRegistry
pub type SharedServiceRegistry = Arc<ServiceRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hold_time_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["time_period"],
            "properties": {
                "time_period": {"type": "string"}
            }
        })
    }

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = ServiceRegistry::new();

        registry.register_with_description(
            ServiceDescription {
                supports_response: SupportsResponse::Optional,
                ..ServiceDescription::new("test", "echo")
            },
            |call: ServiceCall| async move { Ok(Some(call.service_data)) },
        );

        let result = registry
            .call("test", "echo", json!({"msg": "hello"}), Context::new(), true)
            .await
            .unwrap();

        assert_eq!(result, Some(json!({"msg": "hello"})));
    }

    #[tokio::test]
    async fn test_service_not_found() {
        let registry = ServiceRegistry::new();

        let result = registry
            .call("lyric", "set_hold_time", json!({}), Context::new(), false)
            .await;

        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_response_not_supported() {
        let registry = ServiceRegistry::new();
        registry.register("lyric", "set_hold_time", |_: ServiceCall| async { Ok(None) });

        let result = registry
            .call("lyric", "set_hold_time", json!({}), Context::new(), true)
            .await;
        assert!(matches!(result, Err(ServiceError::ResponseNotSupported)));
    }

    #[tokio::test]
    async fn test_schema_rejects_invalid_data() {
        let registry = ServiceRegistry::new();
        registry.register_with_description(
            ServiceDescription::new("lyric", "set_hold_time").with_schema(hold_time_schema()),
            |_: ServiceCall| async { Ok(None) },
        );

        let missing = registry
            .call("lyric", "set_hold_time", json!({}), Context::new(), false)
            .await;
        assert!(matches!(missing, Err(ServiceError::InvalidData(_))));

        let wrong_type = registry
            .call(
                "lyric",
                "set_hold_time",
                json!({"time_period": 90}),
                Context::new(),
                false,
            )
            .await;
        assert!(matches!(wrong_type, Err(ServiceError::InvalidData(_))));

        let ok = registry
            .call(
                "lyric",
                "set_hold_time",
                json!({"time_period": "01:30:00"}),
                Context::new(),
                false,
            )
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let registry = ServiceRegistry::new();
        registry.register("test", "fail", |_: ServiceCall| async move {
            Err(ServiceError::CallFailed("intentional failure".to_string()))
        });

        let result = registry
            .call("test", "fail", json!({}), Context::new(), false)
            .await;

        assert!(matches!(result, Err(ServiceError::CallFailed(_))));
    }

    #[test]
    fn test_unregister() {
        let registry = ServiceRegistry::new();
        registry.register("lyric", "set_hold_time", |_: ServiceCall| async { Ok(None) });

        assert!(registry.has_service("lyric", "set_hold_time"));
        assert!(registry.unregister("lyric", "set_hold_time"));
        assert!(!registry.has_service("lyric", "set_hold_time"));
        assert!(!registry.unregister("lyric", "set_hold_time"));
    }

    #[test]
    fn test_domain_services() {
        let registry = ServiceRegistry::new();
        registry.register("lyric", "set_hold_time", |_: ServiceCall| async { Ok(None) });
        registry.register("climate", "set_temperature", |_: ServiceCall| async { Ok(None) });

        assert_eq!(registry.domain_services("lyric").len(), 1);
        assert_eq!(registry.service_count(), 2);
        assert!(registry.get_service("climate", "set_temperature").is_some());
    }
}
