//! Plugin-based provider registry
//!
//! The registry maps the `provider` configuration value to a factory, so the
//! daemon never hard-codes backend selection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use greydns_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! greydns_provider_cloudflare::register(&registry);
//!
//! let provider = registry.connect("cloudflare", &credentials)?;
//! ```

use crate::error::{Error, Result};
use crate::traits::{Credentials, DnsProvider, DnsProviderFactory};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Provider registry for plugin-based DNS provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under `name`
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        self.write().insert(name.into(), factory);
    }

    /// Connect the provider registered under `name`
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Connected provider instance
    /// - `Err(Error::Config)`: Unknown provider name or missing credentials
    pub fn connect(&self, name: &str, credentials: &Credentials) -> Result<Box<dyn DnsProvider>> {
        let providers = self.read();
        let factory = providers
            .get(name)
            .ok_or_else(|| Error::config(format!("unsupported provider: {}", name)))?;

        factory.connect(credentials)
    }

    /// List all registered provider names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider name is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Box<dyn DnsProviderFactory>>> {
        self.providers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Box<dyn DnsProviderFactory>>> {
        self.providers.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProviderFactory;

    impl DnsProviderFactory for MockProviderFactory {
        fn connect(&self, credentials: &Credentials) -> Result<Box<dyn DnsProvider>> {
            if credentials.contains_key("mock") {
                Err(Error::Other("Mock provider not implemented".to_string()))
            } else {
                Err(Error::config("mock credential not found"))
            }
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();

        // Initially empty
        assert!(!registry.has_provider("mock"));

        // Register
        registry.register_provider("mock", Box::new(MockProviderFactory));

        // Now present
        assert!(registry.has_provider("mock"));
        assert_eq!(registry.list_providers(), vec!["mock".to_string()]);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let registry = ProviderRegistry::new();
        let result = registry.connect("route53", &Credentials::new());
        assert!(matches!(result, Err(Error::Config(ref m)) if m.contains("route53")));
    }

    #[test]
    fn test_connect_delegates_to_factory() {
        let registry = ProviderRegistry::new();
        registry.register_provider("mock", Box::new(MockProviderFactory));

        let result = registry.connect("mock", &Credentials::new());
        assert!(matches!(result, Err(Error::Config(_))));

        let creds = Credentials::from([("mock".to_string(), "x".to_string())]);
        assert!(matches!(registry.connect("mock", &creds), Err(Error::Other(_))));
    }
}
