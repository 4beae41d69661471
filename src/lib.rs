pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod runner;
pub mod shipper;
pub mod shutdown;
pub mod storage;
