// Query snapshot store - single writer, many readers, whole-object swaps
use crate::domain::series::QueryResult;
use arc_swap::ArcSwap;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Results of one complete batch refresh, keyed by query name
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    pub refreshed_at: DateTime<Utc>,
    pub results: HashMap<String, Arc<QueryResult>>,
}

impl QuerySnapshot {
    pub fn new(refreshed_at: DateTime<Utc>, results: HashMap<String, Arc<QueryResult>>) -> Self {
        Self {
            refreshed_at,
            results,
        }
    }

    pub fn empty() -> Self {
        Self::new(DateTime::<Utc>::MIN_UTC, HashMap::new())
    }

    pub fn get(&self, query: &str) -> Option<&QueryResult> {
        self.results.get(query).map(Arc::as_ref)
    }

    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.refreshed_at
    }
}

/// Readers always observe either the previous or the next snapshot in
/// full; a refresh is published by replacing the whole mapping at once.
#[derive(Clone)]
pub struct QuerySnapshotStore {
    current: Arc<ArcSwap<QuerySnapshot>>,
}

impl QuerySnapshotStore {
    pub fn new() -> Self {
        Self::with_snapshot(QuerySnapshot::empty())
    }

    pub fn with_snapshot(snapshot: QuerySnapshot) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    pub fn load(&self) -> Arc<QuerySnapshot> {
        self.current.load_full()
    }

    pub fn replace(&self, snapshot: QuerySnapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

impl Default for QuerySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
