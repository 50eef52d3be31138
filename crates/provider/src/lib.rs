//! Node access for bitlens: CLI executor, response cache and query helpers.

pub mod cache;
pub mod discovery;
pub mod executor;
pub mod fanout;
pub mod queries;
pub mod response;

use async_trait::async_trait;
use bitlens_core::{QueryRequest, QueryResult};
use std::sync::Arc;

pub use cache::{CachePolicy, CachedClient, ResponseCache};
pub use executor::CliExecutor;
pub use fanout::fan_out;

/// Abstraction over anything that can answer a node query.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn execute(&self, request: &QueryRequest) -> QueryResult;
}

#[async_trait]
impl<T: NodeClient + ?Sized> NodeClient for Arc<T> {
    async fn execute(&self, request: &QueryRequest) -> QueryResult {
        (**self).execute(request).await
    }
}
