//! HTTP request handlers.

pub mod artifacts;
pub mod common;
pub mod events;

pub use artifacts::*;
pub use events::*;
