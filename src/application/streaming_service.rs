// Streaming dashboard service - one ticking session per open stream
use crate::application::pipeline::DashboardPipeline;
use crate::application::session::DashboardSession;
use crate::application::snapshot_store::QuerySnapshotStore;
use crate::domain::error::TelemetryError;
use crate::infrastructure::config::DashboardsConfig;
use crate::infrastructure::stream_message::{
    append_message, skeleton_message, snapshot_message, StreamMessage,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum OpenStreamError {
    #[error("unknown dashboard {0}")]
    UnknownDashboard(String),
    #[error(transparent)]
    Session(#[from] TelemetryError),
}

#[derive(Clone)]
pub struct StreamingDashboardService {
    store: QuerySnapshotStore,
    pipelines: BTreeMap<String, Arc<DashboardPipeline>>,
    tick_period: Duration,
}

impl StreamingDashboardService {
    pub fn new(store: QuerySnapshotStore, dashboards: &DashboardsConfig, tick_period: Duration) -> Self {
        let pipelines = dashboards
            .dashboards
            .iter()
            .map(|d| (d.id.clone(), Arc::new(DashboardPipeline::new(d.clone()))))
            .collect();
        Self {
            store,
            pipelines,
            tick_period,
        }
    }

    /// (id, title) of every configured dashboard
    pub fn dashboards(&self) -> Vec<(String, String)> {
        self.pipelines
            .values()
            .map(|p| (p.config().id.clone(), p.config().title.clone()))
            .collect()
    }

    /// Open a session and start ticking it. The first two messages are the
    /// skeleton and the initial buffer; each later one is a tick's rows.
    /// The session closes when the receiver is dropped.
    pub fn open_stream(&self, dashboard_id: &str) -> Result<mpsc::Receiver<StreamMessage>, OpenStreamError> {
        let pipeline = self
            .pipelines
            .get(dashboard_id)
            .cloned()
            .ok_or_else(|| OpenStreamError::UnknownDashboard(dashboard_id.to_string()))?;

        let session = DashboardSession::open(pipeline, &self.store.load())?;

        let buffer = session.buffer();
        let skeleton = skeleton_message(
            session.pipeline().config(),
            buffer.column_names().map(str::to_string),
            session.y_range(),
        );
        let initial = snapshot_message(buffer.to_batch());

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(run_session(
            session,
            self.store.clone(),
            tx,
            self.tick_period,
            [skeleton, initial],
        ));

        Ok(rx)
    }
}

/// Ticks run inside this one task, so they never overlap for a session
async fn run_session(
    mut session: DashboardSession,
    store: QuerySnapshotStore,
    tx: mpsc::Sender<StreamMessage>,
    period: Duration,
    first: [StreamMessage; 2],
) {
    for msg in first {
        if tx.send(msg).await.is_err() {
            session.close();
            return;
        }
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tx.closed() => break,
        }

        let snapshot = store.load();
        if let Some(batch) = session.tick(&snapshot) {
            if tx.send(append_message(batch)).await.is_err() {
                break;
            }
        }
    }

    session.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::tests::{snapshot, table, weather_config};
    use assert_matches::assert_matches;

    fn service(store: QuerySnapshotStore) -> StreamingDashboardService {
        let config = DashboardsConfig {
            dashboards: vec![weather_config(100)],
            summaries: Vec::new(),
        };
        StreamingDashboardService::new(store, &config, Duration::from_millis(10))
    }

    async fn next(rx: &mut mpsc::Receiver<StreamMessage>) -> StreamMessage {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
    }

    #[tokio::test]
    async fn test_stream_sends_skeleton_snapshot_then_appends() {
        let store = QuerySnapshotStore::with_snapshot(snapshot(vec![
            ("q_weather", table("AirTemp", &[(100, 32.0), (200, 50.0)])),
            ("q_mount", table("MountTemp", &[(100, 5.0)])),
        ]));
        let service = service(store.clone());
        let mut rx = service.open_stream("weather").unwrap();

        assert_matches!(next(&mut rx).await, StreamMessage::Skeleton(s) if s.columns.len() == 2);
        assert_matches!(next(&mut rx).await, StreamMessage::Snapshot(rows) if rows.index.len() == 2);

        store.replace(snapshot(vec![
            ("q_weather", table("AirTemp", &[(300, 68.0)])),
            ("q_mount", table("MountTemp", &[(300, 6.0)])),
        ]));

        let StreamMessage::Append(rows) = next(&mut rx).await else {
            panic!("expected an append");
        };
        assert_eq!(rows.index, vec![300_000]);
        assert_eq!(rows.patch_xs, vec![[200_000, 300_000, 300_000, 200_000]]);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_dashboards_fail_to_open() {
        let store = QuerySnapshotStore::new();
        let service = service(store);

        assert_matches!(
            service.open_stream("nope"),
            Err(OpenStreamError::UnknownDashboard(_))
        );
        assert_matches!(
            service.open_stream("weather"),
            Err(OpenStreamError::Session(TelemetryError::MissingQuery { .. }))
        );
    }

    #[test]
    fn test_lists_dashboards() {
        let service = service(QuerySnapshotStore::new());
        assert_eq!(
            service.dashboards(),
            vec![("weather".to_string(), "Weather".to_string())]
        );
    }
}
