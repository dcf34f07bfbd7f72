// Refresh service - the slow timer that re-runs every batch query
use crate::application::query_repository::QueryRepository;
use crate::application::snapshot_store::{QuerySnapshot, QuerySnapshotStore};
use crate::infrastructure::config::QueriesConfig;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct RefreshService {
    repository: Arc<dyn QueryRepository>,
    queries: QueriesConfig,
    store: QuerySnapshotStore,
    period: Duration,
    jitter: f64,
}

impl RefreshService {
    pub fn new(
        repository: Arc<dyn QueryRepository>,
        queries: QueriesConfig,
        store: QuerySnapshotStore,
        period: Duration,
        jitter: f64,
    ) -> Self {
        Self {
            repository,
            queries,
            store,
            period,
            jitter: jitter.clamp(0.0, 0.99),
        }
    }

    /// Run all queries back to back so every dashboard sees one consistent
    /// state, then publish the new snapshot in a single swap. A failed query
    /// keeps its previous result, and a batch where nothing succeeded keeps
    /// the previous refresh time. Returns the number of queries that ran.
    pub async fn refresh_once(&self) -> usize {
        let started = Instant::now();
        let previous = self.store.load();
        let mut results = HashMap::with_capacity(self.queries.queries.len());
        let mut succeeded = 0;

        for query in &self.queries.queries {
            match self.repository.run_query(query).await {
                Ok(result) => {
                    tracing::debug!(
                        "Query {} returned {} group(s)",
                        query.name,
                        result.groups.len()
                    );
                    results.insert(query.name.clone(), Arc::new(result));
                    succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!("Query {} failed, keeping previous result: {:#}", query.name, e);
                    if let Some(stale) = previous.results.get(&query.name) {
                        results.insert(query.name.clone(), stale.clone());
                    }
                }
            }
        }

        let refreshed_at = if succeeded > 0 {
            Utc::now()
        } else {
            previous.refreshed_at
        };
        self.store.replace(QuerySnapshot::new(refreshed_at, results));
        tracing::info!(
            "{}/{} queries complete in {} ms",
            succeeded,
            self.queries.queries.len(),
            started.elapsed().as_millis()
        );
        succeeded
    }

    /// Delay before the next refresh, spread by up to ±jitter of the period
    pub fn next_delay(&self) -> Duration {
        let factor = if self.jitter > 0.0 {
            1.0 + rand::rng().random_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };
        self.period.mul_f64(factor)
    }

    pub async fn run(self) {
        loop {
            tokio::time::sleep(self.next_delay()).await;
            self.refresh_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::{QueryResult, QueryTable};
    use crate::infrastructure::config::QueryConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers from a fixed map; queries listed in `failing` error out
    struct FakeRepository {
        results: HashMap<String, QueryResult>,
        failing: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryRepository for FakeRepository {
        async fn run_query(&self, query: &QueryConfig) -> anyhow::Result<QueryResult> {
            if self.failing.lock().unwrap().contains(&query.name) {
                anyhow::bail!("connection refused");
            }
            Ok(self.results.get(&query.name).cloned().unwrap_or_default())
        }
    }

    fn query(name: &str) -> QueryConfig {
        QueryConfig {
            name: name.to_string(),
            query: "SELECT 1".to_string(),
            range_hours: 1,
            group_by: None,
            rename: HashMap::new(),
        }
    }

    fn service(repo: Arc<FakeRepository>, store: QuerySnapshotStore, jitter: f64) -> RefreshService {
        let queries = QueriesConfig {
            queries: vec![query("q_wrs"), query("q_mounttemp")],
        };
        RefreshService::new(repo, queries, store, Duration::from_secs(60), jitter)
    }

    #[tokio::test]
    async fn test_refresh_replaces_the_snapshot() {
        let mut table = QueryTable::default();
        table.time.push(crate::domain::timestamp::RawTimestamp::EpochMillis(0.0));
        let repo = Arc::new(FakeRepository {
            results: HashMap::from([("q_wrs".to_string(), QueryResult::ungrouped(table))]),
            failing: Mutex::new(Vec::new()),
        });
        let store = QuerySnapshotStore::new();

        assert_eq!(service(repo, store.clone(), 0.1).refresh_once().await, 2);

        let snapshot = store.load();
        assert_eq!(snapshot.get("q_wrs").unwrap().table(None).unwrap().len(), 1);
        assert!(snapshot.get("q_mounttemp").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_query_keeps_previous_result() {
        let repo = Arc::new(FakeRepository {
            results: HashMap::new(),
            failing: Mutex::new(Vec::new()),
        });
        let store = QuerySnapshotStore::new();
        let refresh = service(repo.clone(), store.clone(), 0.0);

        refresh.refresh_once().await;
        let first = store.load();

        repo.failing.lock().unwrap().push("q_wrs".to_string());
        assert_eq!(refresh.refresh_once().await, 1);

        let second = store.load();
        assert!(second.refreshed_at >= first.refreshed_at);
        assert!(Arc::ptr_eq(
            &first.results["q_wrs"],
            &second.results["q_wrs"]
        ));
        assert!(!Arc::ptr_eq(
            &first.results["q_mounttemp"],
            &second.results["q_mounttemp"]
        ));
    }

    #[tokio::test]
    async fn test_all_failed_batch_keeps_refresh_time() {
        let repo = Arc::new(FakeRepository {
            results: HashMap::new(),
            failing: Mutex::new(Vec::new()),
        });
        let store = QuerySnapshotStore::new();
        let refresh = service(repo.clone(), store.clone(), 0.0);

        refresh.refresh_once().await;
        let first = store.load();

        repo.failing
            .lock()
            .unwrap()
            .extend(["q_wrs".to_string(), "q_mounttemp".to_string()]);
        assert_eq!(refresh.refresh_once().await, 0);

        let second = store.load();
        assert_eq!(second.refreshed_at, first.refreshed_at);
        assert!(Arc::ptr_eq(&first.results["q_wrs"], &second.results["q_wrs"]));
    }

    #[test]
    fn test_jittered_delay_stays_in_bounds() {
        let repo = Arc::new(FakeRepository {
            results: HashMap::new(),
            failing: Mutex::new(Vec::new()),
        });
        let refresh = service(repo.clone(), QuerySnapshotStore::new(), 0.1);
        for _ in 0..100 {
            let delay = refresh.next_delay();
            assert!(delay >= Duration::from_millis(53_999) && delay <= Duration::from_millis(66_001));
        }

        let steady = service(repo, QuerySnapshotStore::new(), 0.0);
        assert_eq!(steady.next_delay(), Duration::from_secs(60));
    }
}
