pub mod api;
pub mod backfill;
pub mod enrich;
pub mod error;
pub mod freshness;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod processor;
pub mod store;
pub mod utils;
