//! REST services for assessments, invitations and sessions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use gigboard_core::{
    Assessment, AssessmentApi, AssessmentSession, CreateAssessmentRequest, Error, Invitation,
    PostMessageRequest, Result, SendInvitationRequest, SessionApi, UpdateAssessmentRequest,
};

use crate::http::ApiClient;

/// `AssessmentApi` and `SessionApi` backed by the shared [`ApiClient`].
pub struct AssessmentService {
    client: Arc<ApiClient>,
}

impl AssessmentService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(Error::from)
}

#[async_trait]
impl AssessmentApi for AssessmentService {
    async fn list_assessments(&self) -> Result<Vec<Assessment>> {
        self.client.get_json("/assessments", &[]).await
    }

    async fn get_assessment(&self, id: &str) -> Result<Assessment> {
        self.client
            .get_json(&format!("/assessments/{}", id), &[])
            .await
    }

    async fn create_assessment(&self, req: &CreateAssessmentRequest) -> Result<Assessment> {
        if req.title.trim().is_empty() {
            return Err(Error::InvalidInput("title cannot be empty".to_string()));
        }
        if req.time_limit_minutes == 0 || req.total_questions == 0 {
            return Err(Error::InvalidInput(
                "time limit and question count must be positive".to_string(),
            ));
        }
        self.client.post_json("/assessments", to_body(req)?).await
    }

    async fn update_assessment(
        &self,
        id: &str,
        req: &UpdateAssessmentRequest,
    ) -> Result<Assessment> {
        self.client
            .put_json(&format!("/assessments/{}", id), to_body(req)?)
            .await
    }

    async fn delete_assessment(&self, id: &str) -> Result<()> {
        self.client.delete(&format!("/assessments/{}", id)).await
    }

    async fn send_invitation(
        &self,
        assessment_id: &str,
        req: &SendInvitationRequest,
    ) -> Result<Invitation> {
        self.client
            .post_json(
                &format!("/assessments/{}/invitations", assessment_id),
                to_body(req)?,
            )
            .await
    }

    async fn invitation_by_token(&self, token: &str) -> Result<Invitation> {
        self.client
            .get_json(&format!("/invitations/token/{}", token), &[])
            .await
    }

    async fn decline_invitation(&self, token: &str) -> Result<Invitation> {
        self.client
            .post_json(&format!("/invitations/token/{}/decline", token), json!({}))
            .await
    }
}

#[async_trait]
impl SessionApi for AssessmentService {
    async fn accept_invitation(&self, token: &str) -> Result<AssessmentSession> {
        self.client
            .post_json(&format!("/invitations/token/{}/accept", token), json!({}))
            .await
    }

    async fn get_session(&self, id: &str) -> Result<AssessmentSession> {
        self.client.get_json(&format!("/sessions/{}", id), &[]).await
    }

    async fn post_message(&self, id: &str, content: &str) -> Result<AssessmentSession> {
        let body = to_body(&PostMessageRequest {
            content: content.to_string(),
        })?;
        self.client
            .post_json(&format!("/sessions/{}/messages", id), body)
            .await
    }
}
