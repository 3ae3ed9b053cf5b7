//! Structured logging schema and field name constants for gigboard.
//!
//! All crates use these constants for consistent structured logging fields,
//! so a log pipeline can filter by the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Boot failures, invariants that should never break |
//! | WARN  | Recoverable issue: failed action, reconnect, rollback applied |
//! | INFO  | Lifecycle events (connect, disconnect, logout, session end) |
//! | DEBUG | Decision points, request/response summaries |
//! | TRACE | Per-frame and per-tick detail |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID attached to every REST request (`X-Request-Id`).
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "http", "channel", "store", "sound", "timer", "session", "cli"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "api_client", "token_refresh", "ws_connector"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "mark_read", "mark_all_read", "delete", "send_message"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Authenticated user ID.
pub const USER_ID: &str = "user_id";

/// Notification ID being operated on.
pub const NOTIFICATION_ID: &str = "notification_id";

/// Assessment session ID.
pub const SESSION_ID: &str = "session_id";

/// Invitation token (logged truncated).
pub const INVITATION: &str = "invitation";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// HTTP status code of a response.
pub const STATUS: &str = "status";

/// Reconnect attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

/// Backoff delay before the next attempt, in milliseconds.
pub const DELAY_MS: &str = "delay_ms";

/// Unread count after an update.
pub const UNREAD_COUNT: &str = "unread_count";

/// Remaining seconds on an assessment timer.
pub const REMAINING_SECS: &str = "remaining_secs";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Whether an optimistic update was rolled back.
pub const ROLLED_BACK: &str = "rolled_back";
