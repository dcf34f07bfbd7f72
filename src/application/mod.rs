pub mod pipeline;
pub mod query_repository;
pub mod refresh_service;
pub mod session;
pub mod snapshot_store;
pub mod streaming_service;
pub mod summary_service;
