use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use complyd_core::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::facade::RedisCache;

/// Derives the default memoization key: a hash of the operation label
/// plus the textual rendering of its argument.
pub(crate) fn default_key<A: Serialize>(label: &str, args: &A) -> String {
    let rendered = serde_json::to_string(args).unwrap_or_else(|_| "<unrenderable>".to_string());
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update(rendered.as_bytes());
    format!("{}:{}", label, hex::encode(hasher.finalize()))
}

/// Generic get-or-compute-and-store wrapper around an async operation.
///
/// Layered on [`RedisCache::get_or_set`]; not specific to database
/// queries. The key comes from a caller-supplied strategy or, by
/// default, from [`default_key`].
pub struct CachedOperation<A, T, F> {
    cache: Arc<RedisCache>,
    label: String,
    category: String,
    ttl: Option<u64>,
    key_fn: Option<Arc<dyn Fn(&A) -> String + Send + Sync>>,
    op: F,
    _marker: PhantomData<fn(A) -> T>,
}

impl<A, T, F, Fut> CachedOperation<A, T, F>
where
    A: Serialize,
    T: Serialize + DeserializeOwned,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    pub fn new(
        cache: Arc<RedisCache>,
        label: impl Into<String>,
        category: impl Into<String>,
        ttl: Option<u64>,
        op: F,
    ) -> Self {
        Self {
            cache,
            label: label.into(),
            category: category.into(),
            ttl,
            key_fn: None,
            op,
            _marker: PhantomData,
        }
    }

    /// Replaces the default key derivation.
    pub fn with_key_fn(mut self, key_fn: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    /// Runs the wrapped operation through the cache. The operation only
    /// executes on a miss; its error propagates uncached.
    pub async fn invoke(&self, args: A) -> Result<T> {
        let key = match &self.key_fn {
            Some(key_fn) => key_fn(&args),
            None => default_key(&self.label, &args),
        };
        self.cache
            .get_or_set(&key, &self.category, self.ttl, || (self.op)(args))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_key_is_deterministic() {
        let a = default_key("lookup_screening", &("acme", 7));
        let b = default_key("lookup_screening", &("acme", 7));
        assert_eq!(a, b);
    }

    #[test]
    fn default_key_varies_by_args() {
        let a = default_key("lookup_screening", &("acme", 7));
        let b = default_key("lookup_screening", &("acme", 8));
        assert_ne!(a, b);
    }

    #[test]
    fn default_key_varies_by_label() {
        let a = default_key("lookup_screening", &("acme", 7));
        let b = default_key("lookup_watchlist", &("acme", 7));
        assert_ne!(a, b);
    }

    #[test]
    fn default_key_is_prefixed_with_label() {
        let key = default_key("lookup_screening", &"acme");
        assert!(key.starts_with("lookup_screening:"));
    }
}
