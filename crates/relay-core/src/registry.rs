//! Endpoint registry — the table of known engines.
//!
//! Reads clone an `Arc` to the current table and never hold the lock across
//! an await point. Registration swaps in a new table (copy-on-write), which is
//! fine for a table that changes a handful of times per process lifetime.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::RegistryError;
use crate::models::Endpoint;

#[derive(Debug, Default)]
struct EndpointTable {
    by_name: HashMap<String, usize>,
    entries: Vec<Arc<Endpoint>>,
}

/// In-memory registry of engine endpoints, keyed by name.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    table: RwLock<Arc<EndpointTable>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of endpoints, rejecting duplicate names.
    pub fn from_endpoints(endpoints: &[Endpoint]) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for ep in endpoints {
            registry.register(ep.clone())?;
        }
        Ok(registry)
    }

    pub fn register(&self, endpoint: Endpoint) -> Result<Arc<Endpoint>, RegistryError> {
        let mut guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if guard.by_name.contains_key(&endpoint.name) {
            return Err(RegistryError::Duplicate(endpoint.name));
        }

        let endpoint = Arc::new(endpoint);
        let mut entries = guard.entries.clone();
        let mut by_name = guard.by_name.clone();
        by_name.insert(endpoint.name.clone(), entries.len());
        entries.push(endpoint.clone());
        *guard = Arc::new(EndpointTable { by_name, entries });

        tracing::info!(
            "[Registry] Registered endpoint {} → {} (critical: {})",
            endpoint.name,
            endpoint.base_url(),
            endpoint.critical
        );
        Ok(endpoint)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Endpoint>, RegistryError> {
        let table = self.snapshot();
        table
            .by_name
            .get(name)
            .and_then(|&idx| table.entries.get(idx))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// All endpoints in registration order.
    pub fn all(&self) -> Vec<Arc<Endpoint>> {
        self.snapshot().entries.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.snapshot().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<EndpointTable> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
