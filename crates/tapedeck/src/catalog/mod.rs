//! The tape catalog and request resolution.
//!
//! This module provides:
//! - `Catalog`: the registry of tapes and the `resolve` entry point
//! - `Resolution`: the tagged outcome of resolving one request
//! - `MockDirectives`: parsed input for creating or updating mocks
//!
//! Resolution runs in three tiers:
//! 1. replay the best selectable chapter across all tapes;
//! 2. record a new chapter into the best writable tape by default attractors;
//! 3. create a new tape and record into it.
//!
//! A tie at any tier is reported as a conflict and ends resolution.
//!
//! ## Module Structure
//!
//! - `types`: outcomes, options and errors
//! - `core`: the registry, lifecycle and tiers
//! - `mock`: mock upsert

mod core;
mod mock;
mod types;


pub use self::core::{load_tapes, Catalog};
pub use mock::{MockDirectives, MockOutcome, MockUse};
pub use types::{CatalogError, CatalogOptions, IncomingRequest, Resolution, ResolveStatus, Tier};
