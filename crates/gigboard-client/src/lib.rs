//! # gigboard-client
//!
//! REST access to the gigboard backend.
//!
//! This crate provides:
//! - Boot configuration from the environment ([`config::ClientConfig`])
//! - A shared HTTP client with request correlation IDs and single-flight
//!   token refresh ([`http::ApiClient`])
//! - Token providers and access-token verification ([`auth`])
//! - Typed services for notifications, assessments, invitations and sessions
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gigboard_client::{ApiClient, NotificationService, StaticToken};
//! use gigboard_core::NotificationApi;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ApiClient::with_defaults(
//!         "http://localhost:5000/api",
//!         Arc::new(StaticToken::new("token")),
//!     )
//!     .unwrap();
//!     let notifications = NotificationService::new(Arc::new(client));
//!     let page = notifications.list(1, 20).await.unwrap();
//!     println!("{} notifications", page.notifications.len());
//! }
//! ```

pub mod assessments;
pub mod auth;
pub mod config;
pub mod http;
pub mod notifications;

pub use assessments::AssessmentService;
pub use auth::{IdentityVerifier, RefreshTokenProvider, StaticToken};
pub use config::{ChannelSettings, ClientConfig, ConfigError};
pub use http::ApiClient;
pub use notifications::NotificationService;
