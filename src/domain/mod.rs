// Domain layer - models and pure operations of the incremental merge
pub mod assemble;
pub mod buffer;
pub mod error;
pub mod filter;
pub mod patch;
pub mod series;
pub mod summary;
pub mod timestamp;
pub mod transform;
