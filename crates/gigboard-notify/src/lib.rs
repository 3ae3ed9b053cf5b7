//! # gigboard-notify
//!
//! Notification delivery for the gigboard client runtime.
//!
//! This crate provides:
//! - The notification store: list, unread count, pagination, optimistic
//!   read/delete actions with rollback where a snapshot exists
//! - The real-time channel manager: one live connection per identity,
//!   reconnect with bounded backoff, unread-count sync on connect
//! - The sound engine: synthesized chime gated by a persisted preference

pub mod channel;
pub mod sound;
pub mod store;

pub use channel::{
    backoff_delay, ChannelConfig, ChannelConnection, ChannelConnector, ChannelHandle,
    ChannelManager, WsConnector,
};
pub use sound::{synthesize_chime, AudioSink, LogSink, PreferenceStore, SoundEngine};
pub use store::{NotificationState, NotificationStore};
