//! # gigboard-assess
//!
//! Timed assessment attempts for the gigboard client runtime.
//!
//! - [`timer`]: deadline-derived countdown with urgency phases and a
//!   one-shot time-up signal
//! - [`session`]: the attempt's message exchange, with serialized sends and
//!   server-owned terminal states

pub mod session;
pub mod timer;

pub use session::{Progress, SessionFlow};
pub use timer::{
    format_clock, remaining_seconds, SessionTimer, TimeUpGuard, TimerPhase, TimerSnapshot,
};
