//! Dual-mode connection pooling against the relational store.
//!
//! One manager owns two independently sized pools: a non-blocking pool
//! for high-fan-out concurrent callers and a traditional blocking pool
//! for callers that cannot participate in the async model. Acquisition
//! is scoped (release on every exit path), timed into a rolling latency
//! window, and tracked in a non-owning diagnostics registry. A
//! background monitor probes liveness on an interval and is joined on
//! shutdown.

pub mod config;
pub mod manager;
pub mod metrics;
pub mod statement;

pub use config::{KeepaliveConfig, PoolConfig, PoolConfigBuilder};
pub use manager::{
    AsyncSessionGuard, ConnectionPoolManager, HeldConnection, PoolFlavor, PoolHealthReport,
    PoolSizingAdvice, QueryExecutor, SyncSessionGuard,
};
pub use metrics::{PoolMetrics, SharedPoolMetrics};
pub use statement::{FetchMode, QueryOutcome, QueryParam};
