//! Core traits for gigboard abstractions.
//!
//! These traits define the seams between the runtime pieces: REST services,
//! the live channel, and credentials. Concrete implementations live in
//! `gigboard-client` and `gigboard-notify`; tests substitute in-memory ones.

use async_trait::async_trait;

use crate::error::Result;
use crate::events::ChannelCommand;
use crate::models::*;

// =============================================================================
// CREDENTIALS
// =============================================================================

/// Source of bearer tokens for REST calls and the channel handshake.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token, if the user is signed in.
    async fn access_token(&self) -> Result<Option<String>>;

    /// Obtain a fresh access token after the current one was rejected.
    async fn refresh(&self) -> Result<String>;
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// REST operations on the notification mailbox.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Fetch one page (1-based) of notifications, newest first.
    async fn list(&self, page: u32, limit: u32) -> Result<NotificationPage>;

    /// Unread count across the whole mailbox.
    async fn unread_count(&self) -> Result<u64>;

    async fn mark_read(&self, id: &str) -> Result<()>;

    async fn mark_all_read(&self) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// The live bidirectional channel, as seen by the notification store.
#[async_trait]
pub trait LiveChannel: Send + Sync {
    /// Whether a connection is currently established.
    fn is_connected(&self) -> bool;

    /// Fire-and-forget emit.
    async fn emit(&self, command: ChannelCommand) -> Result<()>;

    /// Ack-style unread count request.
    async fn request_unread_count(&self) -> Result<u64>;
}

// =============================================================================
// ASSESSMENTS
// =============================================================================

/// Assessment authoring and invitation management.
#[async_trait]
pub trait AssessmentApi: Send + Sync {
    async fn list_assessments(&self) -> Result<Vec<Assessment>>;

    async fn get_assessment(&self, id: &str) -> Result<Assessment>;

    async fn create_assessment(&self, req: &CreateAssessmentRequest) -> Result<Assessment>;

    async fn update_assessment(
        &self,
        id: &str,
        req: &UpdateAssessmentRequest,
    ) -> Result<Assessment>;

    async fn delete_assessment(&self, id: &str) -> Result<()>;

    async fn send_invitation(
        &self,
        assessment_id: &str,
        req: &SendInvitationRequest,
    ) -> Result<Invitation>;

    async fn invitation_by_token(&self, token: &str) -> Result<Invitation>;

    async fn decline_invitation(&self, token: &str) -> Result<Invitation>;
}

/// Operations driving a single assessment attempt.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Accept an invitation and start a new session.
    async fn accept_invitation(&self, token: &str) -> Result<AssessmentSession>;

    async fn get_session(&self, id: &str) -> Result<AssessmentSession>;

    /// Post a user answer; the server returns the updated session.
    async fn post_message(&self, id: &str, content: &str) -> Result<AssessmentSession>;
}
