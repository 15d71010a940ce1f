//! Admin API request handlers.

pub mod mock;
pub mod system;
pub mod tapes;
