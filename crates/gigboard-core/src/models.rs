//! Domain models shared by the gigboard crates.
//!
//! Wire representation follows the backend's JSON API: camelCase field
//! names, string identifiers (`_id` accepted as an alias), RFC 3339
//! timestamps.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Kind of a notification. Unknown kinds from newer servers map to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ApplicationReceived,
    ApplicationAccepted,
    ApplicationRejected,
    ApplicationWithdrawn,
    JobPosted,
    JobUpdated,
    JobClosed,
    ContractCreated,
    ContractCompleted,
    MilestoneSubmitted,
    MilestoneApproved,
    PaymentReceived,
    PaymentReleased,
    MessageReceived,
    ReviewReceived,
    AssessmentInvitation,
    AssessmentCompleted,
    AssessmentExpired,
    ProfileViewed,
    SystemAnnouncement,
    #[serde(other)]
    Unknown,
}

impl NotificationType {
    /// Short label used by terminal front ends.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ApplicationReceived => "application",
            Self::ApplicationAccepted => "accepted",
            Self::ApplicationRejected => "rejected",
            Self::ApplicationWithdrawn => "withdrawn",
            Self::JobPosted => "job",
            Self::JobUpdated => "job updated",
            Self::JobClosed => "job closed",
            Self::ContractCreated => "contract",
            Self::ContractCompleted => "contract done",
            Self::MilestoneSubmitted => "milestone",
            Self::MilestoneApproved => "milestone ok",
            Self::PaymentReceived => "payment",
            Self::PaymentReleased => "payout",
            Self::MessageReceived => "message",
            Self::ReviewReceived => "review",
            Self::AssessmentInvitation => "assessment",
            Self::AssessmentCompleted => "assessment done",
            Self::AssessmentExpired => "assessment expired",
            Self::ProfileViewed => "profile view",
            Self::SystemAnnouncement => "announcement",
            Self::Unknown => "notice",
        }
    }
}

/// A notification addressed to the signed-in user.
///
/// Created server-side only; the client mutates it solely through
/// read/delete actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: String,
    pub recipient: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Flip the read flag and stamp the read time. Returns true if the
    /// notification was unread before the call.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(at);
        true
    }
}

/// One page of the notification mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub page: u32,
    pub total_pages: u32,
}

impl NotificationPage {
    /// Whether pages after this one exist.
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Unread count payload (REST response and channel event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

// =============================================================================
// ASSESSMENTS
// =============================================================================

/// An AI-scored skills assessment authored by an employer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub time_limit_minutes: u32,
    pub total_questions: u32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating an assessment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssessmentRequest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub skills: Vec<String>,
    pub time_limit_minutes: u32,
    pub total_questions: u32,
}

/// Partial update for an assessment. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssessmentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<u32>,
}

// =============================================================================
// SESSIONS
// =============================================================================

/// Status of an assessment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    TimedOut,
    Abandoned,
}

impl SessionStatus {
    /// Terminal sessions are immutable.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Legal status transitions. Terminal states never move again.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        match (self, next) {
            (Self::InProgress, _) => true,
            (from, to) => *from == to,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Ai,
    User,
}

/// One entry in the session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub role: MessageRole,
    pub content: String,
    pub position: u32,
}

/// One attempt at an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSession {
    #[serde(alias = "_id")]
    pub id: String,
    pub assessment: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default)]
    pub current_question_index: u32,
    pub total_questions: u32,
    pub started_at: DateTime<Utc>,
    pub time_limit_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_scores: Option<BTreeMap<String, f64>>,
}

impl AssessmentSession {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock deadline of the attempt.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + Duration::minutes(i64::from(self.time_limit_minutes))
    }

    /// Most recent message written by the scorer.
    pub fn latest_ai_message(&self) -> Option<&SessionMessage> {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::Ai)
            .max_by_key(|m| m.position)
    }

    /// Messages sorted by transcript position.
    pub fn ordered_messages(&self) -> Vec<&SessionMessage> {
        let mut messages: Vec<&SessionMessage> = self.messages.iter().collect();
        messages.sort_by_key(|m| m.position);
        messages
    }
}

/// Body of `POST /sessions/{id}/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct PostMessageRequest {
    pub content: String,
}

// =============================================================================
// INVITATIONS
// =============================================================================

/// Status of an assessment invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Completed,
    Expired,
    Declined,
}

impl InvitationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Declined)
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Completed => write!(f, "completed"),
            Self::Expired => write!(f, "expired"),
            Self::Declined => write!(f, "declined"),
        }
    }
}

/// Invitation for a freelancer to take an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    #[serde(alias = "_id")]
    pub id: String,
    pub assessment: String,
    pub inviter: String,
    pub invitee: String,
    pub status: InvitationStatus,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    /// Status as it should be displayed at `now`: a pending invitation past
    /// its expiry is expired even before the server sweeps it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvitationStatus {
        if self.status == InvitationStatus::Pending && now >= self.expires_at {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }

    /// Whether the invitation can still be accepted.
    pub fn is_acceptable(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == InvitationStatus::Pending
    }
}

/// Body of `POST /assessments/{id}/invitations`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendInvitationRequest {
    pub invitee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// =============================================================================
// IDENTITY
// =============================================================================

/// The authenticated user, as asserted by a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }
}
