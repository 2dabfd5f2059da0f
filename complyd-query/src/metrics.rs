use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Reporting text is truncated to keep metric entries bounded.
const QUERY_TEXT_LIMIT: usize = 256;

/// Per-query-shape performance record, keyed by the shape hash.
///
/// Created on first observation of a shape; removed only by
/// [`QueryMetricsRegistry::clear`]. `avg_time_ms` equals
/// `total_time_ms / execution_count` after every update.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMetrics {
    pub query_hash: String,
    pub query_text: String,
    pub execution_count: u64,
    pub total_time_ms: f64,
    pub avg_time_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
    pub last_executed: DateTime<Utc>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub errors: u64,
    pub was_optimized: bool,
}

impl QueryMetrics {
    fn new(query_hash: &str, query_text: &str) -> Self {
        let text: String = query_text.chars().take(QUERY_TEXT_LIMIT).collect();
        Self {
            query_hash: query_hash.to_string(),
            query_text: text,
            execution_count: 0,
            total_time_ms: 0.0,
            avg_time_ms: 0.0,
            min_time_ms: 0.0,
            max_time_ms: 0.0,
            last_executed: Utc::now(),
            cache_hits: 0,
            cache_misses: 0,
            errors: 0,
            was_optimized: false,
        }
    }

    /// Cache observations for this shape (hits plus misses).
    pub fn observations(&self) -> u64 {
        self.cache_hits + self.cache_misses
    }

    /// Hit ratio over cache observations; 0 when never observed.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.observations();
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// A flagged improvement candidate. Advisory only; nothing acts on
/// these automatically.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationOpportunity {
    pub query_hash: String,
    pub query_text: String,
    pub detail: String,
}

/// Candidates split by what made them interesting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatternAnalysis {
    /// Slow shapes that no rewrite rule ever touched.
    pub unoptimized_slow: Vec<OptimizationOpportunity>,
    /// Shapes with a hit ratio below 50% after at least 10 observations.
    pub low_hit_ratio: Vec<OptimizationOpportunity>,
}

/// Aggregate cache effectiveness across all tracked shapes.
#[derive(Debug, Clone, Serialize)]
pub struct CachePerformance {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
    pub queries_tracked: usize,
}

/// Concurrent registry of per-shape metrics.
pub struct QueryMetricsRegistry {
    entries: DashMap<String, QueryMetrics>,
}

impl QueryMetricsRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn with_entry(&self, hash: &str, text: &str, update: impl FnOnce(&mut QueryMetrics)) {
        let mut entry = self
            .entries
            .entry(hash.to_string())
            .or_insert_with(|| QueryMetrics::new(hash, text));
        update(entry.value_mut());
    }

    pub fn record_execution(&self, hash: &str, text: &str, elapsed_ms: f64, optimized: bool) {
        self.with_entry(hash, text, |metrics| {
            metrics.execution_count += 1;
            metrics.total_time_ms += elapsed_ms;
            metrics.avg_time_ms = metrics.total_time_ms / metrics.execution_count as f64;
            if metrics.execution_count == 1 {
                metrics.min_time_ms = elapsed_ms;
                metrics.max_time_ms = elapsed_ms;
            } else {
                metrics.min_time_ms = metrics.min_time_ms.min(elapsed_ms);
                metrics.max_time_ms = metrics.max_time_ms.max(elapsed_ms);
            }
            metrics.last_executed = Utc::now();
            metrics.was_optimized = metrics.was_optimized || optimized;
        });
    }

    pub fn record_cache_hit(&self, hash: &str, text: &str, optimized: bool) {
        self.with_entry(hash, text, |metrics| {
            metrics.cache_hits += 1;
            metrics.was_optimized = metrics.was_optimized || optimized;
        });
    }

    pub fn record_cache_miss(&self, hash: &str, text: &str) {
        self.with_entry(hash, text, |metrics| {
            metrics.cache_misses += 1;
        });
    }

    pub fn record_error(&self, hash: &str, text: &str) {
        self.with_entry(hash, text, |metrics| {
            metrics.errors += 1;
        });
    }

    /// All tracked shapes, slowest average first.
    pub fn all(&self) -> Vec<QueryMetrics> {
        let mut metrics: Vec<QueryMetrics> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        metrics.sort_by(|a, b| {
            b.avg_time_ms
                .partial_cmp(&a.avg_time_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        metrics
    }

    /// Shapes whose average latency is at or past the threshold.
    pub fn slow(&self, threshold_ms: f64) -> Vec<QueryMetrics> {
        self.all()
            .into_iter()
            .filter(|metrics| metrics.avg_time_ms >= threshold_ms)
            .collect()
    }

    pub fn cache_performance(&self) -> CachePerformance {
        let mut hits = 0u64;
        let mut misses = 0u64;
        for entry in self.entries.iter() {
            hits += entry.value().cache_hits;
            misses += entry.value().cache_misses;
        }
        let total = hits + misses;
        CachePerformance {
            cache_hits: hits,
            cache_misses: misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            queries_tracked: self.entries.len(),
        }
    }

    /// Flags improvement candidates: slow shapes no rule touched, and
    /// shapes caching poorly after enough observations.
    pub fn analyze(&self, slow_threshold_ms: f64) -> PatternAnalysis {
        let mut analysis = PatternAnalysis::default();
        for entry in self.entries.iter() {
            let metrics = entry.value();
            if metrics.avg_time_ms >= slow_threshold_ms && !metrics.was_optimized {
                analysis.unoptimized_slow.push(OptimizationOpportunity {
                    query_hash: metrics.query_hash.clone(),
                    query_text: metrics.query_text.clone(),
                    detail: format!(
                        "avg {:.1}ms over {} executions with no rewrite rule applied",
                        metrics.avg_time_ms, metrics.execution_count
                    ),
                });
            }
            if metrics.observations() >= 10 && metrics.hit_ratio() < 0.5 {
                analysis.low_hit_ratio.push(OptimizationOpportunity {
                    query_hash: metrics.query_hash.clone(),
                    query_text: metrics.query_text.clone(),
                    detail: format!(
                        "hit ratio {:.0}% over {} observations",
                        metrics.hit_ratio() * 100.0,
                        metrics.observations()
                    ),
                });
            }
        }
        analysis
    }

    /// Drops every tracked shape.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for QueryMetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
