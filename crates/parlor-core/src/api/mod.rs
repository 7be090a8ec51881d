//! API implementation submodules.
//!
//! Each submodule contains `impl Assistant` blocks that extend the public API
//! with domain-specific methods. The struct definition remains in `lib.rs`.

mod builder;
mod chat;
mod engine;
mod models;
mod state;
mod worker;

pub use builder::AssistantBuilder;
pub(crate) use state::AssistantState;
