use std::collections::HashMap;
use std::str::FromStr;

use complyd_core::DataAccessError;
use serde::{Deserialize, Serialize};

/// Value encoding for a cache category: structured text (JSON) or an
/// opaque binary frame. The set is closed; an unrecognized format name
/// is a configuration defect and is raised, never silently mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SerializationFormat {
    Json,
    Binary,
}

impl FromStr for SerializationFormat {
    type Err = DataAccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" | "structured-text" => Ok(SerializationFormat::Json),
            "binary" | "opaque-binary" => Ok(SerializationFormat::Binary),
            other => Err(DataAccessError::Serialization(format!(
                "unsupported serialization format: {}",
                other
            ))),
        }
    }
}

/// Intended eviction posture for a category. Informational only: actual
/// eviction is delegated to the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionIntent {
    Lru,
    Lfu,
    Ttl,
}

/// Per-category cache behavior. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Entry lifetime. Always positive; a set re-establishes it.
    pub ttl_seconds: u64,

    /// Soft size cap, surfaced through category metadata.
    pub max_size_mb: u64,

    pub compression_enabled: bool,

    pub format: SerializationFormat,

    pub eviction_intent: EvictionIntent,

    /// Application identifier prefixed onto every key in this category.
    pub namespace: String,
}

impl CategoryConfig {
    fn new(
        namespace: &str,
        ttl_seconds: u64,
        max_size_mb: u64,
        compression_enabled: bool,
        format: SerializationFormat,
        eviction_intent: EvictionIntent,
    ) -> Self {
        debug_assert!(ttl_seconds > 0);
        Self {
            ttl_seconds,
            max_size_mb,
            compression_enabled,
            format,
            eviction_intent,
            namespace: namespace.to_string(),
        }
    }
}

/// Built-in category names.
pub const EXTERNAL_API_RESPONSE: &str = "external-api-response";
pub const DATABASE_QUERY: &str = "database-query";
pub const ENTITY_SCREENING: &str = "entity-screening";
pub const SESSION: &str = "session";
pub const FEATURE_FLAG: &str = "feature-flag";
pub const TEMPLATE: &str = "template";
pub const DEFAULT_CATEGORY: &str = "default";

/// Looks up category configuration by name, falling back to the
/// `default` category for unknown names.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: HashMap<String, CategoryConfig>,
    default: CategoryConfig,
}

impl CategoryRegistry {
    /// Builds the registry of built-in categories under the given
    /// application namespace.
    ///
    /// `database-query` and the other row-shaped categories stay on the
    /// structured-text codec: their payloads carry `serde_json::Value`,
    /// which the binary codec cannot round-trip.
    pub fn with_namespace(namespace: &str) -> Self {
        let mut categories = HashMap::new();
        categories.insert(
            EXTERNAL_API_RESPONSE.to_string(),
            CategoryConfig::new(
                namespace,
                600,
                50,
                true,
                SerializationFormat::Json,
                EvictionIntent::Lru,
            ),
        );
        categories.insert(
            DATABASE_QUERY.to_string(),
            CategoryConfig::new(
                namespace,
                300,
                100,
                true,
                SerializationFormat::Json,
                EvictionIntent::Ttl,
            ),
        );
        categories.insert(
            ENTITY_SCREENING.to_string(),
            CategoryConfig::new(
                namespace,
                3600,
                200,
                true,
                SerializationFormat::Json,
                EvictionIntent::Lru,
            ),
        );
        categories.insert(
            SESSION.to_string(),
            CategoryConfig::new(
                namespace,
                1800,
                20,
                false,
                SerializationFormat::Binary,
                EvictionIntent::Lru,
            ),
        );
        categories.insert(
            FEATURE_FLAG.to_string(),
            CategoryConfig::new(
                namespace,
                60,
                5,
                false,
                SerializationFormat::Json,
                EvictionIntent::Ttl,
            ),
        );
        categories.insert(
            TEMPLATE.to_string(),
            CategoryConfig::new(
                namespace,
                7200,
                50,
                true,
                SerializationFormat::Binary,
                EvictionIntent::Lfu,
            ),
        );

        Self {
            categories,
            default: CategoryConfig::new(
                namespace,
                300,
                50,
                false,
                SerializationFormat::Json,
                EvictionIntent::Lru,
            ),
        }
    }

    /// Registers or replaces a category.
    pub fn insert(&mut self, name: impl Into<String>, config: CategoryConfig) {
        self.categories.insert(name.into(), config);
    }

    /// Resolves a category name to its configuration. Unknown names
    /// resolve to the `default` category, and the returned name reflects
    /// that fallback so keys stay within known namespaces.
    pub fn resolve<'a>(&'a self, name: &'a str) -> (&'a str, &'a CategoryConfig) {
        match self.categories.get(name) {
            Some(config) => (name, config),
            None => (DEFAULT_CATEGORY, &self.default),
        }
    }

    /// All category names, the default included.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.categories.keys().cloned().collect();
        names.push(DEFAULT_CATEGORY.to_string());
        names.sort();
        names
    }
}
