//! Admin REST API for tape and mock management.
//!
//! This module provides a JSON API for:
//! - Listing, inspecting, creating, saving and removing tapes
//! - Removing chapters
//! - Creating or updating mocks through `mock*` request headers (`PUT /mock`)
//! - Reloading the catalog from disk
//! - Health and metrics endpoints
//!
//! The API listens on a configurable port (default: 2525).

mod directives;
mod handlers;
mod router;
mod server;
pub(crate) mod types;

pub use directives::parse_mock_directives;
pub use server::AdminApiServer;
