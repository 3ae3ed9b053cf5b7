//! # gigboard-core
//!
//! Core types, traits, and abstractions for the gigboard client runtime.
//!
//! This crate provides the domain models, error taxonomy, channel wire
//! events and service traits that the other gigboard crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorCategory, Result};
pub use events::{
    ChannelCommand, ChannelFrame, EventBus, EventEnvelope, InboundEvent, StoreEvent,
};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{correlation_id, new_v7};
