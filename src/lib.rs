//! Deterministic load testing for OGC WMS/WMTS map services.
//!
//! This crate provides tools to:
//! - Generate seeded, reproducible GetMap/GetTile request streams that
//!   defeat request-level caching
//! - Discover layers, extents and tile matrices from GetCapabilities
//! - Execute load tests with controlled concurrency
//! - Collect latency and cache statistics
//! - Output results in multiple formats (console, JSON, CSV)

pub mod bbox;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod metrics;
pub mod report;
pub mod request;
pub mod rng;
pub mod runner;
pub mod session;
pub mod tiles;

pub use bbox::{BboxSampler, Extent, SubBbox};
pub use config::{ServiceMode, TestConfig};
pub use error::{LoadTestError, LoadTestResult};
pub use metrics::{MetricsCollector, TestResults};
pub use report::ResultsReport;
pub use runner::{LoadRunner, RequestResult};
pub use session::{ServiceCapabilities, Session};
pub use tiles::{TileCoord, TileSampler};
