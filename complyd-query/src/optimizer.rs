use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use complyd_cache::{RedisCache, DATABASE_QUERY};
use complyd_core::{OptimizerSettings, Result};
use complyd_pool::{FetchMode, QueryExecutor, QueryOutcome, QueryParam};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::metrics::{CachePerformance, PatternAnalysis, QueryMetrics, QueryMetricsRegistry};
use crate::rules::RuleSet;

/// Statements beginning with one of these never enter the cache.
const MUTATING_VERBS: [&str; 6] = ["insert", "update", "delete", "create", "drop", "alter"];

static VOLATILE_TIME_FN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(now\s*\(|current_timestamp|current_date|current_time)")
        .expect("static pattern")
});

/// TTL tiers for the table-name heuristic, first match wins.
const TTL_REFERENCE: u64 = 1800;
const TTL_USER: u64 = 600;
const TTL_TRANSACTIONAL: u64 = 300;
const TTL_METRIC: u64 = 60;

const TTL_TABLE_TIERS: &[(&[&str], u64)] = &[
    (
        &["jurisdictions", "countries", "regulations", "sanction_lists", "roles"],
        TTL_REFERENCE,
    ),
    (&["users", "organizations", "sessions"], TTL_USER),
    (
        &["notifications", "compliance_tasks", "screenings", "cases"],
        TTL_TRANSACTIONAL,
    ),
    (&["metrics", "audit_events", "usage_stats"], TTL_METRIC),
];

/// Read/write seam onto the cache facade for query results. The
/// optimizer stores everything under the `database-query` category.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get_result(&self, key: &str) -> Option<QueryOutcome>;
    async fn store_result(&self, key: &str, outcome: &QueryOutcome, ttl_seconds: u64) -> bool;
}

#[async_trait]
impl ResultCache for RedisCache {
    async fn get_result(&self, key: &str) -> Option<QueryOutcome> {
        self.get::<QueryOutcome>(key, DATABASE_QUERY).await
    }

    async fn store_result(&self, key: &str, outcome: &QueryOutcome, ttl_seconds: u64) -> bool {
        self.set(key, outcome, DATABASE_QUERY, Some(ttl_seconds)).await
    }
}

/// Rewrites, caches, dispatches, and measures read queries.
///
/// Collaborators arrive at construction time; the optimizer owns no
/// connections itself. Writes never pass through the cache path, and
/// concurrent identical misses are deliberately not deduplicated: both
/// execute and both write back, last write wins.
pub struct QueryOptimizer {
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<dyn ResultCache>,
    rules: RuleSet,
    metrics: QueryMetricsRegistry,
    slow_query_threshold: Duration,
    default_ttl: u64,
}

impl QueryOptimizer {
    pub fn new(executor: Arc<dyn QueryExecutor>, cache: Arc<dyn ResultCache>) -> Self {
        Self {
            executor,
            cache,
            rules: RuleSet::standard(),
            metrics: QueryMetricsRegistry::new(),
            slow_query_threshold: Duration::from_secs(1),
            default_ttl: 300,
        }
    }

    pub fn from_settings(
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<dyn ResultCache>,
        settings: &OptimizerSettings,
    ) -> Self {
        let mut optimizer = Self::new(executor, cache);
        optimizer.slow_query_threshold = Duration::from_millis(settings.slow_query_threshold_ms);
        optimizer.default_ttl = settings.cache_ttl_default_secs;
        optimizer
    }

    /// Toggles a rewrite rule by name.
    pub fn set_rule_enabled(&mut self, name: &str, enabled: bool) -> bool {
        self.rules.set_enabled(name, enabled)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Stable hash over the normalized query shape plus its parameters.
    pub fn query_hash(&self, query: &str, params: &[QueryParam]) -> String {
        let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        for param in params {
            hasher.update(b"|");
            hasher.update(param.to_string().as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }

    /// Conservative cacheability allow-list: only `SELECT`-prefixed
    /// statements without volatile time functions qualify. A read-only
    /// statement behind a non-SELECT leading token (a CTE prefix, say)
    /// is treated as non-cacheable, which is the safe bias.
    pub fn should_cache(&self, query: &str) -> bool {
        let normalized = query.trim_start().to_lowercase();
        if MUTATING_VERBS.iter().any(|verb| normalized.starts_with(verb)) {
            return false;
        }
        if VOLATILE_TIME_FN.is_match(&normalized) {
            return false;
        }
        normalized.starts_with("select")
    }

    /// Table-name-driven TTL heuristic over the (rewritten) query text.
    /// First matching tier wins; unmatched queries get the configured
    /// default.
    pub fn ttl_for(&self, query: &str) -> u64 {
        let lowered = query.to_lowercase();
        for (tables, ttl) in TTL_TABLE_TIERS {
            if tables.iter().any(|table| lowered.contains(table)) {
                return *ttl;
            }
        }
        self.default_ttl
    }

    /// The hot path: rewrite, consult the cache, execute on a miss,
    /// write back, and record per-shape metrics. Execution errors are
    /// recorded and re-raised.
    pub async fn execute_optimized(
        &self,
        query: &str,
        params: &[QueryParam],
        mode: FetchMode,
        force_refresh: bool,
    ) -> Result<QueryOutcome> {
        let hash = self.query_hash(query, params);
        let rewrite = self.rules.apply(query);
        let optimized = !rewrite.applied.is_empty();
        let rewritten = rewrite.rewritten;

        let cacheable = self.should_cache(&rewritten);
        if cacheable && !force_refresh {
            if let Some(outcome) = self.cache.get_result(&hash).await {
                self.metrics.record_cache_hit(&hash, &rewritten, optimized);
                tracing::debug!(query_hash = %hash, "query served from cache");
                return Ok(outcome);
            }
            self.metrics.record_cache_miss(&hash, &rewritten);
        }

        let started = Instant::now();
        match self.executor.run(&rewritten, params, mode).await {
            Ok(outcome) => {
                let elapsed = started.elapsed();
                if cacheable {
                    let ttl = self.ttl_for(&rewritten);
                    self.cache.store_result(&hash, &outcome, ttl).await;
                }
                let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
                self.metrics
                    .record_execution(&hash, &rewritten, elapsed_ms, optimized);
                if elapsed > self.slow_query_threshold {
                    tracing::warn!(
                        query_hash = %hash,
                        elapsed_ms,
                        query = %rewritten,
                        "slow query"
                    );
                }
                Ok(outcome)
            }
            Err(err) => {
                self.metrics.record_error(&hash, &rewritten);
                Err(err)
            }
        }
    }

    /// Per-shape metrics, slowest average first.
    pub fn get_query_metrics(&self) -> Vec<QueryMetrics> {
        self.metrics.all()
    }

    /// Shapes past the slow-query threshold.
    pub fn get_slow_queries(&self) -> Vec<QueryMetrics> {
        self.metrics
            .slow(self.slow_query_threshold.as_secs_f64() * 1000.0)
    }

    /// Aggregate hit ratio across every tracked shape.
    pub fn get_cache_performance(&self) -> CachePerformance {
        self.metrics.cache_performance()
    }

    /// Improvement candidates; nothing acts on these automatically.
    pub fn analyze_query_patterns(&self) -> PatternAnalysis {
        self.metrics
            .analyze(self.slow_query_threshold.as_secs_f64() * 1000.0)
    }

    pub fn clear_metrics(&self) {
        self.metrics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct NoopExecutor;

    #[async_trait]
    impl QueryExecutor for NoopExecutor {
        async fn run(
            &self,
            _query: &str,
            _params: &[QueryParam],
            _mode: FetchMode,
        ) -> Result<QueryOutcome> {
            Ok(QueryOutcome::Rows(Vec::new()))
        }
    }

    struct NoopCache;

    #[async_trait]
    impl ResultCache for NoopCache {
        async fn get_result(&self, _key: &str) -> Option<QueryOutcome> {
            None
        }

        async fn store_result(
            &self,
            _key: &str,
            _outcome: &QueryOutcome,
            _ttl_seconds: u64,
        ) -> bool {
            true
        }
    }

    fn optimizer() -> QueryOptimizer {
        QueryOptimizer::new(Arc::new(NoopExecutor), Arc::new(NoopCache))
    }

    #[rstest]
    #[case("SELECT * FROM users LIMIT 1", true)]
    #[case("  select id from cases", true)]
    #[case("INSERT INTO users (id) VALUES (1)", false)]
    #[case("UPDATE users SET name = 'x' WHERE id = 1", false)]
    #[case("DELETE FROM sessions", false)]
    #[case("CREATE TABLE t (id int)", false)]
    #[case("DROP TABLE t", false)]
    #[case("ALTER TABLE t ADD COLUMN c int", false)]
    #[case("SELECT NOW()", false)]
    #[case("SELECT * FROM events WHERE at > CURRENT_TIMESTAMP - interval '1 day'", false)]
    #[case("SELECT CURRENT_DATE", false)]
    #[case("WITH t AS (SELECT 1) SELECT * FROM t", false)]
    fn cacheability_allow_list(#[case] query: &str, #[case] expected: bool) {
        assert_eq!(optimizer().should_cache(query), expected, "{}", query);
    }

    #[rstest]
    #[case("SELECT * FROM jurisdictions", TTL_REFERENCE)]
    #[case("SELECT * FROM users WHERE id = 1", TTL_USER)]
    #[case("SELECT * FROM notifications WHERE tenant_id = 'abc'", TTL_TRANSACTIONAL)]
    #[case("SELECT * FROM metrics WHERE day = '2026-08-01'", TTL_METRIC)]
    #[case("SELECT * FROM obscure_table", 300)]
    fn ttl_heuristic_tiers(#[case] query: &str, #[case] expected: u64) {
        assert_eq!(optimizer().ttl_for(query), expected, "{}", query);
    }

    #[test]
    fn ttl_heuristic_is_deterministic() {
        let optimizer = optimizer();
        let query = "SELECT * FROM screenings WHERE status = 'open'";
        let first = optimizer.ttl_for(query);
        for _ in 0..5 {
            assert_eq!(optimizer.ttl_for(query), first);
        }
    }

    #[test]
    fn hash_normalizes_whitespace_and_case() {
        let optimizer = optimizer();
        let a = optimizer.query_hash("SELECT *   FROM users", &[]);
        let b = optimizer.query_hash("select * from users", &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_varies_with_params() {
        let optimizer = optimizer();
        let a = optimizer.query_hash(
            "SELECT * FROM users WHERE id = $1",
            &[QueryParam::Int(1)],
        );
        let b = optimizer.query_hash(
            "SELECT * FROM users WHERE id = $1",
            &[QueryParam::Int(2)],
        );
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_compact_hex() {
        let optimizer = optimizer();
        let hash = optimizer.query_hash("SELECT 1", &[]);
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn execution_records_metrics() {
        let optimizer = optimizer();
        optimizer
            .execute_optimized("SELECT * FROM users LIMIT 1", &[], FetchMode::All, false)
            .await
            .unwrap();
        let metrics = optimizer.get_query_metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].execution_count, 1);
        assert_eq!(metrics[0].cache_misses, 1);
    }

    #[tokio::test]
    async fn rule_toggle_reaches_pipeline() {
        let mut optimizer = optimizer();
        assert!(optimizer.set_rule_enabled("bounded-select", false));
        let outcome = optimizer.rules().apply("SELECT * FROM users");
        assert_eq!(outcome.rewritten, "SELECT * FROM users");
    }
}
