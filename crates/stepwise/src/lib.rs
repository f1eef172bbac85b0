//! Prompting patterns on top of a hosted chat model.
//!
//! The crate wires presets, built-in tools and the employee database into a
//! [`Session`], and ships a CLI for using it in the terminal. It can also be
//! used as a library to bring the agents into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod presets;
mod session;
pub mod store;
pub mod tools;

pub use presets::Preset;
pub use session::{Session, SessionBuilder, SessionError};

/// Re-exports of [`stepwise_core`] crate.
pub mod core {
    pub use stepwise_core::*;
}
