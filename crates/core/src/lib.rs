//! Domain models, shared types, error definitions, and the configuration store.
//!
//! Foundation crate -- no async dependencies.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConfigStore, ConfigUpdate, Network, NodeConfig, RetryPolicy};
pub use error::{BitlensResult, ErrorKind, QueryError};
pub use types::{
    BlockSample, HeightRange, HistoricalSeries, InputSummary, OutputSummary, Param, Payload,
    QueryRequest, QueryResult, ScriptClass, SeriesPoint, SizeClass, TransactionSummary, Window,
};
