//! Prometheus exporter for Zyxel GS1200 switches.
//!
//! Every request to the metrics endpoint logs in to the switch's web
//! interface, reads its status pages and renders them as Prometheus metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  GS1200 web UI  │<────│ ScrapeCollector │<────│   HTTP Server   │
//! │  (*.js pages)   │     │ (one at a time) │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! gs1200-exporter --address 192.168.1.3 --password secret
//! gs1200-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod http;
pub mod mapping;

pub use collector::{ScrapeCollector, SharedCollector};
pub use config::ExporterConfig;
pub use http::HttpServer;
