//! Shared types for the sightline dashboard client and any Rust peer that
//! speaks to the vision backend.

pub mod error;
pub mod events;
pub mod protocol;

pub use error::*;
pub use events::*;
pub use protocol::*;
