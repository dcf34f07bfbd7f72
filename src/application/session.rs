// Dashboard session - one live view and the buffer behind it
use crate::application::pipeline::DashboardPipeline;
use crate::application::snapshot_store::QuerySnapshot;
use crate::domain::buffer::{RowBatch, StreamingBuffer};
use crate::domain::error::{TelemetryError, TelemetryResult};
use crate::domain::patch::YRange;
use chrono::Utc;
use std::sync::Arc;

/// A session only exists once its first load succeeded, so there is no
/// uninitialized value to observe and no way back to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Populated,
    Streaming,
    Closed,
}

#[derive(Debug)]
pub struct DashboardSession {
    pipeline: Arc<DashboardPipeline>,
    buffer: StreamingBuffer,
    y_range: YRange,
    state: SessionState,
}

impl DashboardSession {
    /// Populate a new buffer from the current snapshot. Failures here are
    /// fatal to the session and never retried.
    pub fn open(pipeline: Arc<DashboardPipeline>, snapshot: &QuerySnapshot) -> TelemetryResult<Self> {
        let load = pipeline.initial_load(snapshot)?;
        let config = pipeline.config();
        let mut buffer = StreamingBuffer::new(config.max_rows, load.batch.columns.keys().cloned());
        buffer.append(load.batch)?;

        tracing::info!(
            "Session for {} populated with {} row(s), y-range [{}, {}]",
            config.id,
            buffer.len(),
            load.y_range.low,
            load.y_range.high
        );

        Ok(Self {
            pipeline,
            buffer,
            y_range: load.y_range,
            state: SessionState::Populated,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn buffer(&self) -> &StreamingBuffer {
        &self.buffer
    }

    pub fn y_range(&self) -> YRange {
        self.y_range
    }

    pub fn pipeline(&self) -> &DashboardPipeline {
        &self.pipeline
    }

    /// One update: filter, assemble, patch and append whatever is new.
    /// Errors are logged and swallowed; the buffer is then left as it was.
    /// Returns the appended rows, if any.
    pub fn tick(&mut self, snapshot: &QuerySnapshot) -> Option<RowBatch> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.state = SessionState::Streaming;

        let pipeline = self.pipeline.clone();
        let id = &pipeline.config().id;
        tracing::debug!(
            "Tick for {}: data are {} s old",
            id,
            snapshot.age(Utc::now()).num_seconds()
        );

        match self.try_tick(snapshot) {
            Ok(Some(batch)) => {
                tracing::debug!("Tick for {}: {} new row(s)", id, batch.len());
                Some(batch)
            }
            Ok(None) => {
                tracing::debug!("Tick for {}: no new data", id);
                None
            }
            Err(e @ TelemetryError::ColumnLengthMismatch { .. }) => {
                tracing::warn!("Tick for {} skipped, buffer untouched: {}", id, e);
                None
            }
            Err(e) => {
                tracing::warn!("Tick for {} skipped: {}", id, e);
                None
            }
        }
    }

    fn try_tick(&mut self, snapshot: &QuerySnapshot) -> TelemetryResult<Option<RowBatch>> {
        let Some(batch) = self.pipeline.next_batch(snapshot, &self.buffer, self.y_range)? else {
            return Ok(None);
        };
        self.buffer.append(batch.clone())?;
        Ok(Some(batch))
    }

    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            tracing::info!(
                "Session for {} closed after {} buffered row(s)",
                self.pipeline.config().id,
                self.buffer.len()
            );
        }
        self.state = SessionState::Closed;
    }
}
