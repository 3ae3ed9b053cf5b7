//! Integration tests for the REST client against a mock backend.
//!
//! Covers correlation headers, the single-flight refresh-and-retry policy,
//! error mapping, and the service route shapes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gigboard_client::{ApiClient, AssessmentService, NotificationService, RefreshTokenProvider};
use gigboard_core::{
    Error, ErrorCategory, NotificationApi, Result, SessionApi, SessionStatus, TokenProvider,
};
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Token provider that hands out `stale` first and `fresh` after a refresh.
struct CountingProvider {
    refreshes: AtomicUsize,
    fail_refresh: bool,
}

impl CountingProvider {
    fn new(fail_refresh: bool) -> Arc<Self> {
        Arc::new(Self {
            refreshes: AtomicUsize::new(0),
            fail_refresh,
        })
    }
}

#[async_trait]
impl TokenProvider for CountingProvider {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(Some("stale".to_string()))
    }

    async fn refresh(&self) -> Result<String> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        // Hold the refresh open long enough for the other requests to queue.
        tokio::time::sleep(Duration::from_millis(100)).await;
        if self.fail_refresh {
            Err(Error::Unauthorized("refresh token revoked".to_string()))
        } else {
            Ok("fresh".to_string())
        }
    }
}

fn client_for(server: &MockServer, provider: Arc<dyn TokenProvider>) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(server.uri(), provider, Duration::from_secs(5)).unwrap())
}

async fn mount_unread_count_with_rotation(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/notifications/unread-count"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "message": "jwt expired"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notifications/unread-count"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 7})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_every_request_carries_correlation_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notifications/unread-count"))
        .and(header_exists("X-Request-Id"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"count": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let service = NotificationService::new(client_for(&server, CountingProvider::new(false)));
    assert_eq!(service.unread_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_list_sends_page_and_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .and(query_param("page", "2"))
        .and(query_param("limit", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "notifications": [{
                "_id": "n1",
                "recipient": "u1",
                "type": "job_posted",
                "title": "New job",
                "message": "Rust backend contract",
                "isRead": false,
                "createdAt": "2026-10-01T12:00:00Z"
            }],
            "page": 2,
            "totalPages": 4
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = NotificationService::new(client_for(&server, CountingProvider::new(false)));
    let page = service.list(2, 20).await.unwrap();
    assert_eq!(page.notifications.len(), 1);
    assert!(page.has_more());
}

#[tokio::test]
async fn test_unauthorized_refreshes_once_and_retries() {
    let server = MockServer::start().await;
    mount_unread_count_with_rotation(&server).await;

    let provider = CountingProvider::new(false);
    let service = NotificationService::new(client_for(&server, provider.clone()));

    assert_eq!(service.unread_count().await.unwrap(), 7);
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);

    // The refreshed token is reused without another refresh.
    assert_eq!(service.unread_count().await.unwrap(), 7);
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start().await;
    mount_unread_count_with_rotation(&server).await;

    let provider = CountingProvider::new(false);
    let service = Arc::new(NotificationService::new(client_for(
        &server,
        provider.clone(),
    )));

    let calls = (0..5).map(|_| {
        let service = service.clone();
        async move { service.unread_count().await }
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), 7);
    }
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_refresh_rejects_all_queued_requests() {
    let server = MockServer::start().await;
    mount_unread_count_with_rotation(&server).await;

    let provider = CountingProvider::new(true);
    let service = Arc::new(NotificationService::new(client_for(
        &server,
        provider.clone(),
    )));

    let calls = (0..4).map(|_| {
        let service = service.clone();
        async move { service.unread_count().await }
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authorization);
    }
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
}

/// Refresh fails once with a transport error, then succeeds.
struct FlakyRefresh {
    refreshes: AtomicUsize,
}

#[async_trait]
impl TokenProvider for FlakyRefresh {
    async fn access_token(&self) -> Result<Option<String>> {
        Ok(Some("stale".to_string()))
    }

    async fn refresh(&self) -> Result<String> {
        if self.refreshes.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(Error::Network("connection reset".to_string()))
        } else {
            Ok("fresh".to_string())
        }
    }
}

#[tokio::test]
async fn test_later_request_refreshes_again_after_failed_refresh() {
    let server = MockServer::start().await;
    mount_unread_count_with_rotation(&server).await;

    let provider = Arc::new(FlakyRefresh {
        refreshes: AtomicUsize::new(0),
    });
    let service = NotificationService::new(client_for(&server, provider.clone()));

    let err = service.unread_count().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);

    // A request issued after the failure gets its own refresh.
    assert_eq!(service.unread_count().await.unwrap(), 7);
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_second_unauthorized_after_refresh_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/read-all"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let provider = CountingProvider::new(false);
    let service = NotificationService::new(client_for(&server, provider.clone()));

    let err = service.mark_all_read().await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_validation_error_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/notifications/n1"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "message": "Notification already deleted"
        })))
        .mount(&server)
        .await;

    let service = NotificationService::new(client_for(&server, CountingProvider::new(false)));
    let err = service.delete("n1").await.unwrap_err();
    assert!(matches!(err, Error::Validation { status: 409, .. }));
    assert_eq!(err.user_message(), "Notification already deleted");
}

#[tokio::test]
async fn test_server_error_is_network_category() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/n1/read"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let service = NotificationService::new(client_for(&server, CountingProvider::new(false)));
    let err = service.mark_read("n1").await.unwrap_err();
    assert!(matches!(err, Error::Server { status: 503, .. }));
    assert_eq!(err.category(), ErrorCategory::Network);
}

#[tokio::test]
async fn test_post_message_sends_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/s1/messages"))
        .and(body_json(serde_json::json!({"content": "Use an Arc<Mutex<_>>"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "_id": "s1",
            "assessment": "a1",
            "status": "completed",
            "messages": [
                {"role": "ai", "content": "How do you share state?", "position": 0},
                {"role": "user", "content": "Use an Arc<Mutex<_>>", "position": 1}
            ],
            "currentQuestionIndex": 1,
            "totalQuestions": 1,
            "startedAt": "2026-10-01T12:00:00Z",
            "timeLimitMinutes": 30,
            "score": 82.5,
            "categoryScores": {"concurrency": 85.0, "communication": 80.0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = AssessmentService::new(client_for(&server, CountingProvider::new(false)));
    let session = service
        .post_message("s1", "Use an Arc<Mutex<_>>")
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.score, Some(82.5));
    assert_eq!(session.category_scores.unwrap().len(), 2);
}

#[tokio::test]
async fn test_refresh_token_provider_exchanges_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(serde_json::json!({"refreshToken": "rt-1"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"accessToken": "at-2"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = RefreshTokenProvider::new(server.uri(), "rt-1", None).unwrap();
    // No cached access token: the first lookup refreshes.
    assert_eq!(
        provider.access_token().await.unwrap(),
        Some("at-2".to_string())
    );
    // Cached afterwards.
    assert_eq!(
        provider.access_token().await.unwrap(),
        Some("at-2".to_string())
    );
}

#[tokio::test]
async fn test_refresh_token_provider_rejection_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = RefreshTokenProvider::new(server.uri(), "rt-1", Some("at-1".into())).unwrap();
    assert!(matches!(
        provider.refresh().await,
        Err(Error::Unauthorized(_))
    ));
}
