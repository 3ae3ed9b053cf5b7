//! Centralized default constants for the gigboard client runtime.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// HTTP
// =============================================================================

/// REST request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Header carrying the per-request correlation ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

// =============================================================================
// REAL-TIME CHANNEL
// =============================================================================

/// Channel connect (handshake) timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum consecutive failed connection attempts before giving up.
pub const RECONNECT_ATTEMPTS: u32 = 5;

/// Initial reconnect delay in milliseconds.
pub const RECONNECT_BASE_MS: u64 = 1_000;

/// Ceiling on the reconnect delay in milliseconds.
pub const RECONNECT_MAX_MS: u64 = 5_000;

/// How long to wait for an ack-style reply, in milliseconds.
pub const ACK_TIMEOUT_MS: u64 = 5_000;

/// Capacity of the outbound command queue per channel.
pub const CHANNEL_COMMAND_CAPACITY: usize = 64;

/// Socket path appended to the server origin when no socket URL is configured.
pub const SOCKET_PATH: &str = "/ws";

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Page size for notification list requests.
pub const NOTIFICATION_PAGE_LIMIT: u32 = 20;

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// SOUND
// =============================================================================

/// Local preference key for the notification chime.
pub const SOUND_PREFERENCE_KEY: &str = "notificationSoundEnabled";

/// Preference file name under the state directory.
pub const PREFERENCES_FILE: &str = "preferences.json";

/// Sample rate used when synthesizing the chime.
pub const CHIME_SAMPLE_RATE: u32 = 44_100;

// =============================================================================
// ASSESSMENT TIMER
// =============================================================================

/// Tick interval of the assessment timer in milliseconds.
pub const TIMER_TICK_MS: u64 = 1_000;

/// Remaining seconds at or below which the timer shows a warning.
pub const TIMER_WARNING_SECS: u64 = 5 * 60;

/// Remaining seconds at or below which the timer is critical.
pub const TIMER_CRITICAL_SECS: u64 = 60;

/// Remaining seconds at or below which the critical display pulses.
pub const TIMER_PULSE_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_bounds_are_ordered() {
        assert!(RECONNECT_BASE_MS <= RECONNECT_MAX_MS);
        assert!(RECONNECT_ATTEMPTS > 0);
    }

    #[test]
    fn test_timer_thresholds_are_ordered() {
        assert!(TIMER_PULSE_SECS < TIMER_CRITICAL_SECS);
        assert!(TIMER_CRITICAL_SECS < TIMER_WARNING_SECS);
    }
}
