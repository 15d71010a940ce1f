//! Tapedeck: an HTTP mock and record/replay server.
//!
//! Intercepted requests are matched against recorded chapters by attractor
//! rules. A unique match is replayed; a miss is recorded into the best
//! writable tape, or into a new tape when none claims the request.

// ===== Matching and storage =====
pub mod attractor;
pub mod catalog;
pub mod tape;

// ===== Network surfaces =====
pub mod admin_api;
pub mod executor;
pub mod server;

// ===== Ambient =====
pub mod config;
pub mod logging;
pub mod metrics;
