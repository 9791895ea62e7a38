// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The filter registry: an immutable-after-build map from filter name to
//! implementation, built once per `Environment` and shared via `Arc` across
//! concurrent renders.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::RenderContext;
use crate::error::Error;
use crate::value::Value;

/// A filter implementation: receives the piped-in value, its positional and
/// named arguments, and a mutable render context (for filters that need
/// it, e.g. none of the built-ins currently do, but custom filters may).
pub type Filter = dyn Fn(&mut RenderContext, Value, &[Value], &[(String, Value)]) -> Result<Value, Error>
    + Send
    + Sync;

#[derive(Clone)]
pub struct FilterRegistry {
    filters: Arc<HashMap<String, Arc<Filter>>>,
}

impl FilterRegistry {
    pub fn get(&self, name: &str) -> Option<Arc<Filter>> {
        self.filters.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.filters.keys().cloned().collect()
    }
}

#[derive(Default)]
pub struct FilterRegistryBuilder {
    filters: HashMap<String, Arc<Filter>>,
}

impl FilterRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut RenderContext, Value, &[Value], &[(String, Value)]) -> Result<Value, Error>
            + Send
            + Sync
            + 'static,
    {
        self.filters.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn merge(&mut self, other: FilterRegistry) -> &mut Self {
        for (name, f) in other.filters.iter() {
            self.filters.insert(name.clone(), f.clone());
        }
        self
    }

    pub fn build(self) -> FilterRegistry {
        FilterRegistry {
            filters: Arc::new(self.filters),
        }
    }
}
