//! # NoteMate Analytics
//!
//! In-process request analytics for the NoteMate backend: an event recorder
//! that keeps a running aggregate with periodic JSON checkpoints, and an
//! insight reporter that turns the aggregate into admin dashboards.
//!
//! ## Usage
//!
//! ```bash
//! notemate-analytics serve [--port 5000] [--data-file data/analytics.json]
//! notemate-analytics report dashboard
//! ```
//!
//! ## Modules
//!
//! - `analytics` - Event recording, snapshot persistence, reports and the HTTP API
//! - `config` - Layered configuration (defaults, TOML file, environment)
//! - `error` - Crate error type
pub mod analytics;
pub mod config;
pub mod error;
