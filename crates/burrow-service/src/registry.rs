//! Service registry (spec.md §4.2): name -> [`Service`] lookup with
//! unique-registration enforcement, safe under concurrent callers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use burrow_core::traits::{Service, ServiceError};

#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, failing if the name is already taken.
    pub fn register(&self, service: Arc<dyn Service>) -> Result<(), ServiceError> {
        let name = service.name().to_string();
        let mut services = self.services.write().expect("service registry lock poisoned");
        if services.contains_key(&name) {
            return Err(ServiceError::Other(format!(
                "service already registered: {name}"
            )));
        }
        services.insert(name, service);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Service>, ServiceError> {
        let services = self.services.read().expect("service registry lock poisoned");
        services
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }

    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let services = self.services.read().expect("service registry lock poisoned");
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }
}
