//! Query optimization and dispatch.
//!
//! The optimizer sits between callers and the pool: it rewrites query
//! text through an ordered rule set, decides cacheability and TTL,
//! consults the cache facade before touching a connection, and records
//! per-query-shape performance metrics. The pool manager and cache
//! facade never depend on it and remain directly usable.

pub mod layer;
pub mod metrics;
pub mod optimizer;
pub mod rules;

pub use layer::{DataAccessLayer, LayerHealth};
pub use metrics::{
    CachePerformance, OptimizationOpportunity, PatternAnalysis, QueryMetrics,
    QueryMetricsRegistry,
};
pub use optimizer::{QueryOptimizer, ResultCache};
pub use rules::{RewriteOutcome, RewriteRule, RuleSet};
