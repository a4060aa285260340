//! Adapter registry: backend-type factories plus a connection-scoped cache.
//!
//! The cache is the single piece of shared mutable state in the core. It is
//! a sharded concurrent map keyed by the full [`ConnectionDescriptor`]
//! value, so concurrent resolves for different descriptors do not contend
//! on one global lock, while two concurrent resolves of the same unseen
//! descriptor still construct exactly one adapter (the shard entry lock is
//! held across the insert-if-absent). There is no eviction: adapters live
//! until process shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{ConnectionDescriptor, QueryAdapter};
use crate::error::GatewayError;

/// Constructs an adapter for a backend family. Registered under the
/// backend-type name a [`ConnectionDescriptor`] carries.
pub trait AdapterFactory: Send + Sync {
    /// Build an adapter for the descriptor. Called at most once per
    /// distinct descriptor for the process lifetime.
    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryAdapter>, GatewayError>;
}

impl<F> AdapterFactory for F
where
    F: Fn(&ConnectionDescriptor) -> Result<Arc<dyn QueryAdapter>, GatewayError> + Send + Sync,
{
    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryAdapter>, GatewayError> {
        self(descriptor)
    }
}

/// Builds an [`AdapterRegistry`]. Building with zero factories is a
/// configuration error: a gateway that can reach no backend is misdeployed.
#[derive(Default)]
pub struct AdapterRegistryBuilder {
    factories: HashMap<String, Box<dyn AdapterFactory>>,
}

impl AdapterRegistryBuilder {
    pub fn register(
        mut self,
        backend_type: impl Into<String>,
        factory: impl AdapterFactory + 'static,
    ) -> Self {
        self.factories.insert(backend_type.into(), Box::new(factory));
        self
    }

    pub fn build(self) -> Result<AdapterRegistry, GatewayError> {
        if self.factories.is_empty() {
            return Err(GatewayError::config(
                "at least one adapter factory must be registered",
            ));
        }
        Ok(AdapterRegistry {
            factories: self.factories,
            cache: DashMap::new(),
        })
    }
}

/// Maps backend-type names to factories and caches one adapter per
/// distinct connection descriptor.
pub struct AdapterRegistry {
    factories: HashMap<String, Box<dyn AdapterFactory>>,
    cache: DashMap<ConnectionDescriptor, Arc<dyn QueryAdapter>>,
}

impl AdapterRegistry {
    pub fn builder() -> AdapterRegistryBuilder {
        AdapterRegistryBuilder::default()
    }

    /// Get or create the adapter for a descriptor.
    ///
    /// Unregistered backend types fail with
    /// [`GatewayError::UnsupportedDatastore`] rather than silently falling
    /// back to a default.
    pub fn resolve(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryAdapter>, GatewayError> {
        if let Some(adapter) = self.cache.get(descriptor) {
            return Ok(Arc::clone(&adapter));
        }

        let factory = self.factories.get(&descriptor.backend_type).ok_or_else(|| {
            GatewayError::UnsupportedDatastore {
                datastore: descriptor.backend_type.clone(),
            }
        })?;

        match self.cache.entry(descriptor.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(slot) => {
                debug!(
                    backend_type = %descriptor.backend_type,
                    host = %descriptor.host,
                    "constructing adapter"
                );
                let adapter = factory.create(descriptor)?;
                slot.insert(adapter.clone());
                Ok(adapter)
            }
        }
    }

    /// The registered backend-type names, for diagnostics.
    pub fn backend_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::NullAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn null_factory(
        counter: Arc<AtomicUsize>,
    ) -> impl Fn(&ConnectionDescriptor) -> Result<Arc<dyn QueryAdapter>, GatewayError> {
        move |_: &ConnectionDescriptor| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullAdapter::default()) as Arc<dyn QueryAdapter>)
        }
    }

    #[test]
    fn test_build_requires_a_factory() {
        assert!(AdapterRegistry::builder().build().is_err());
    }

    #[test]
    fn test_resolve_caches_by_descriptor_value() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = AdapterRegistry::builder()
            .register("null", null_factory(counter.clone()))
            .build()
            .unwrap();

        let descriptor = ConnectionDescriptor::new("null", "localhost");
        let first = registry.resolve(&descriptor).unwrap();
        let second = registry.resolve(&descriptor).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_host_different_type_resolves_independently() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = AdapterRegistry::builder()
            .register("null", null_factory(counter.clone()))
            .register("other", null_factory(counter.clone()))
            .build()
            .unwrap();

        let a = registry
            .resolve(&ConnectionDescriptor::new("null", "localhost"))
            .unwrap();
        let b = registry
            .resolve(&ConnectionDescriptor::new("other", "localhost"))
            .unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_backend_type_is_an_error() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = AdapterRegistry::builder()
            .register("null", null_factory(counter))
            .build()
            .unwrap();

        let result = registry.resolve(&ConnectionDescriptor::new("warehouse", "localhost"));
        assert!(matches!(
            result,
            Err(GatewayError::UnsupportedDatastore { datastore }) if datastore == "warehouse"
        ));
    }

    #[test]
    fn test_concurrent_resolve_constructs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(
            AdapterRegistry::builder()
                .register("null", null_factory(counter.clone()))
                .build()
                .unwrap(),
        );

        let descriptor = ConnectionDescriptor::new("null", "localhost");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let descriptor = descriptor.clone();
                std::thread::spawn(move || registry.resolve(&descriptor).unwrap())
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
