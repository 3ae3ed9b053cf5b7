//! Client side of one assessment attempt.
//!
//! The backend owns the session state machine and its scoring. The client
//! drives it by posting answers one at a time and adopting whatever session
//! the server returns:
//!
//! ```text
//! in_progress ──answer──► in_progress ──last answer──► completed
//!      │
//!      └──time up──► refetch ──► timed_out (set by the server)
//! ```
//!
//! The client never marks a session terminal on its own, and a terminal
//! session is never replaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use gigboard_core::{AssessmentSession, Error, Result, SessionApi, SessionMessage, SessionStatus};

use crate::timer::SessionTimer;

/// Question progress of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: u32,
    pub total: u32,
}

impl Progress {
    /// Completed share in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (f64::from(self.current) / f64::from(self.total)).min(1.0)
    }
}

/// Clears the in-flight flag when a send finishes, however it finishes.
struct SendSlot<'a>(&'a AtomicBool);

impl Drop for SendSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One attempt, with sends serialized.
pub struct SessionFlow {
    api: Arc<dyn SessionApi>,
    session: RwLock<AssessmentSession>,
    sending: AtomicBool,
}

impl SessionFlow {
    pub fn new(api: Arc<dyn SessionApi>, session: AssessmentSession) -> Self {
        Self {
            api,
            session: RwLock::new(session),
            sending: AtomicBool::new(false),
        }
    }

    /// Accept an invitation and begin a new attempt.
    pub async fn start(api: Arc<dyn SessionApi>, invitation_token: &str) -> Result<Self> {
        if invitation_token.trim().is_empty() {
            return Err(Error::InvalidInput("invitation token is empty".to_string()));
        }
        let session = api.accept_invitation(invitation_token).await?;
        info!(
            session_id = %session.id,
            total_questions = session.total_questions,
            time_limit_minutes = session.time_limit_minutes,
            "Assessment session started"
        );
        Ok(Self::new(api, session))
    }

    /// Pick up an existing attempt.
    pub async fn resume(api: Arc<dyn SessionApi>, session_id: &str) -> Result<Self> {
        let session = api.get_session(session_id).await?;
        info!(session_id = %session.id, status = %session.status, "Assessment session resumed");
        Ok(Self::new(api, session))
    }

    pub async fn session(&self) -> AssessmentSession {
        self.session.read().await.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.read().await.status
    }

    pub async fn is_terminal(&self) -> bool {
        self.session.read().await.is_terminal()
    }

    /// Whether an answer is waiting for the server.
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }

    pub async fn latest_ai_message(&self) -> Option<SessionMessage> {
        self.session.read().await.latest_ai_message().cloned()
    }

    pub async fn progress(&self) -> Progress {
        let session = self.session.read().await;
        Progress {
            current: session.current_question_index,
            total: session.total_questions,
        }
    }

    /// Post an answer and adopt the session the server returns.
    ///
    /// Fails with `InvalidInput` for blank content, `SessionClosed` once the
    /// session is terminal, and `SendInFlight` while an earlier answer is
    /// still outstanding.
    pub async fn send_message(&self, content: &str) -> Result<AssessmentSession> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::InvalidInput("answer is empty".to_string()));
        }

        let session_id = {
            let session = self.session.read().await;
            if session.is_terminal() {
                return Err(Error::SessionClosed(session.status.to_string()));
            }
            session.id.clone()
        };

        if self
            .sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(session_id = %session_id, "Answer rejected, send in flight");
            return Err(Error::SendInFlight);
        }
        let _slot = SendSlot(&self.sending);

        let updated = self.api.post_message(&session_id, content).await?;
        Ok(self.adopt(updated).await)
    }

    /// React to the countdown reaching zero.
    ///
    /// Re-fetches the session so the server's verdict (normally `timed_out`)
    /// is shown; the local status is not changed otherwise.
    pub async fn handle_time_up(&self) -> Result<AssessmentSession> {
        let session_id = {
            let session = self.session.read().await;
            if session.is_terminal() {
                return Ok(session.clone());
            }
            session.id.clone()
        };
        info!(subsystem = "session", session_id = %session_id, "Time is up, refreshing session");
        self.refresh_by_id(&session_id).await
    }

    /// Re-fetch the session from the server.
    pub async fn refresh(&self) -> Result<AssessmentSession> {
        let session_id = self.session.read().await.id.clone();
        self.refresh_by_id(&session_id).await
    }

    async fn refresh_by_id(&self, session_id: &str) -> Result<AssessmentSession> {
        let fetched = self.api.get_session(session_id).await?;
        Ok(self.adopt(fetched).await)
    }

    /// Replace local state with a server copy unless the local copy is
    /// already terminal.
    async fn adopt(&self, next: AssessmentSession) -> AssessmentSession {
        let mut session = self.session.write().await;
        if next.id != session.id {
            warn!(
                session_id = %session.id,
                other = %next.id,
                "Ignoring response for another session"
            );
            return session.clone();
        }
        if !session.status.can_transition_to(next.status) {
            debug!(
                session_id = %session.id,
                status = %session.status,
                "Session is terminal, keeping local copy"
            );
            return session.clone();
        }
        if next.is_terminal() {
            info!(
                session_id = %next.id,
                status = %next.status,
                score = ?next.score,
                "Assessment session finished"
            );
        }
        *session = next;
        session.clone()
    }

    /// Start the countdown for this attempt and re-fetch the session when it
    /// runs out. Returns `None` for a terminal session.
    pub async fn spawn_timer(self: &Arc<Self>) -> Option<SessionTimer> {
        let (started_at, limit) = {
            let session = self.session.read().await;
            if session.is_terminal() {
                return None;
            }
            (session.started_at, session.time_limit_minutes)
        };

        let mut timer = SessionTimer::start(started_at, limit);
        if let Some(time_up) = timer.take_time_up() {
            let flow = Arc::clone(self);
            tokio::spawn(async move {
                // Err means the timer was dropped before running out.
                if time_up.await.is_ok() {
                    if let Err(e) = flow.handle_time_up().await {
                        warn!(
                            subsystem = "session",
                            error = %e,
                            "Session refresh after time-up failed"
                        );
                    }
                }
            });
        }
        Some(timer)
    }
}
