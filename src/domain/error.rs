// Domain errors for the incremental merge pipeline
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    /// A timestamp could not be normalized to UTC
    #[error("unparseable timestamp {input}: {reason}")]
    TimestampFormat { input: String, reason: String },

    /// Fewer than two timestamps were given where an interval is needed
    #[error("need at least 2 timestamps to form an interval, got {got}")]
    InsufficientSamples { got: usize },

    /// Columns handed to a buffer append disagree in length
    #[error("column lengths differ: {}", format_lengths(.lengths))]
    ColumnLengthMismatch { lengths: Vec<(String, usize)> },

    /// A query required at session start returned no rows
    #[error("query {query} returned no rows")]
    EmptyDataset { query: String },

    #[error("query {query} is not present in the snapshot")]
    MissingQuery { query: String },

    /// Two inputs disagree about one column at one timestamp
    #[error("conflicting values for column {column} at {time}")]
    ConflictingSample { column: String, time: DateTime<Utc> },

    #[error("timestamps in {context} are not strictly increasing at {time}")]
    NonMonotonic { context: String, time: DateTime<Utc> },

    #[error("unknown column {column}")]
    UnknownColumn { column: String },
}

fn format_lengths(lengths: &[(String, usize)]) -> String {
    lengths
        .iter()
        .map(|(name, len)| format!("{}={}", name, len))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
