//! UUID v7 utilities for time-ordered identifiers.
//!
//! Request correlation IDs and event IDs are UUIDv7 so that log lines and
//! events sort by creation time.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use gigboard_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// assert_eq!(id.get_version_num(), 7);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Correlation ID for an outgoing request, as sent in `X-Request-Id`.
pub fn correlation_id() -> String {
    new_v7().to_string()
}
