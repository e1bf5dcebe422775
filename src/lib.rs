//! Adaptive decomposition of dimensional analytics queries.
//!
//! A query over data items, organisation units and periods is expanded,
//! scored, split into sub-queries that stay under the server's limits,
//! executed with retries and reassembled into one result.

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod query;

// Re-export commonly used types
pub use config::DecompositionConfig;
pub use error::{Error, Result};
pub use query::{
    DecompositionEngine, Dimension, DimensionSpec, EngineBuilder, ExecutionPlan, HierarchyRef,
    HierarchyResolver, Query, QueryExecutor, QueryResult, TransportError,
};
