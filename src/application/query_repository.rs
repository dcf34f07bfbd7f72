// Repository trait for batch query access
use crate::domain::series::QueryResult;
use crate::infrastructure::config::QueryConfig;
use async_trait::async_trait;

#[async_trait]
pub trait QueryRepository: Send + Sync {
    /// Run one named batch query. Grouped queries return one table per
    /// value of the grouping tag; an empty result is not an error.
    async fn run_query(&self, query: &QueryConfig) -> anyhow::Result<QueryResult>;
}
