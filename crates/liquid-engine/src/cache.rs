// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The loader contract and the thread-safe template cache sitting in front
//! of it.
//!
//! The cache is the one mutable resource the environment shares across
//! concurrent renders (`spec.md` §5), so it is guarded by a `Mutex` rather
//! than exposed as `&mut`. A configured capacity `<= 0` selects `NoOpCache`,
//! which always misses and so forces reparsing on every lookup.

use std::sync::{Arc, Mutex};

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::ast::Ast;
use crate::error::Error;

/// A record returned by a loader for one named template.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub text: String,
    pub origin: String,
    pub matter: Option<crate::value::Mapping>,
}

/// External collaborator that resolves a template name to its source.
/// Implementations may be "context aware" (keying on the calling
/// template's namespace) and composable (a choice loader tries each child
/// loader in order, treating `TemplateNotFound` as "try next").
pub trait Loader: Send + Sync {
    fn get_source(&self, name: &str) -> Result<SourceRecord, Error>;

    /// Whether a previously loaded copy is still current; the cache calls
    /// this before trusting a cached parse. Default: always up to date
    /// (suitable for static in-memory sources).
    fn up_to_date(&self, _name: &str) -> bool {
        true
    }

    /// An optional namespace folded into cache keys to prevent cross-tenant
    /// leakage when the same name means different things per caller.
    fn namespace(&self) -> Option<&str> {
        None
    }
}

/// Cache key: template name plus the loader's declared namespace, if any.
fn cache_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}\u{0}{name}"),
        None => name.to_string(),
    }
}

/// Minimal cache interface so the environment can swap a real LRU cache
/// for a no-op bypass without changing call sites.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<Ast>>;
    fn set(&self, key: &str, ast: Arc<Ast>);
    fn remove(&self, key: &str);
    fn clear(&self);
    fn contains_key(&self, key: &str) -> bool;
}

/// An `Arc<Mutex<lru::LruCache>>`-backed cache with a configurable
/// capacity.
pub struct MemoryCache {
    inner: Mutex<LruCache<String, Arc<Ast>>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Arc<Ast>> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, ast: Arc<Ast>) {
        self.inner.lock().unwrap().put(key.to_string(), ast);
    }

    fn remove(&self, key: &str) {
        self.inner.lock().unwrap().pop(key);
    }

    fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().unwrap().contains(key)
    }
}

/// Always-miss cache used when configured capacity is `<= 0`.
#[derive(Default)]
pub struct NoOpCache;

impl Cache for NoOpCache {
    fn get(&self, _key: &str) -> Option<Arc<Ast>> {
        None
    }

    fn set(&self, _key: &str, _ast: Arc<Ast>) {}

    fn remove(&self, _key: &str) {}

    fn clear(&self) {}

    fn contains_key(&self, _key: &str) -> bool {
        false
    }
}

/// Builds the cache implementation matching the spec's "capacity <= 0
/// disables caching" rule.
pub fn build_cache(capacity: i64) -> Box<dyn Cache> {
    if capacity <= 0 {
        Box::new(NoOpCache)
    } else {
        Box::new(MemoryCache::new(capacity as usize))
    }
}

/// Looks up `name` in `cache`, falling back to `loader` + `parse` on a miss
/// or on staleness, and populating the cache with the fresh parse.
pub fn load_cached(
    cache: &dyn Cache,
    loader: &dyn Loader,
    name: &str,
    parse: impl FnOnce(&str, &str) -> Result<Ast, Error>,
) -> Result<Arc<Ast>, Error> {
    let key = cache_key(loader.namespace(), name);
    if cache.contains_key(&key) && loader.up_to_date(name) {
        if let Some(ast) = cache.get(&key) {
            return Ok(ast);
        }
    }
    let record = loader.get_source(name)?;
    let ast = parse(name, &record.text)?;
    let ast = Arc::new(ast);
    cache.set(&key, ast.clone());
    Ok(ast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Block;

    fn ast(name: &str) -> Ast {
        Ast::new(name, Block::default())
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = build_cache(0);
        cache.set("a", Arc::new(ast("a")));
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn memory_cache_evicts_least_recently_used() {
        let cache = MemoryCache::new(1);
        cache.set("a", Arc::new(ast("a")));
        cache.set("b", Arc::new(ast("b")));
        assert!(!cache.contains_key("a"));
        assert!(cache.contains_key("b"));
    }
}
