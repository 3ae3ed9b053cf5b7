//! Service wiring shared by every subcommand.

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use gigboard_client::{
    ApiClient, AssessmentService, ClientConfig, IdentityVerifier, NotificationService,
    RefreshTokenProvider, StaticToken,
};
use gigboard_core::{Identity, TokenProvider};
use gigboard_notify::{
    ChannelConfig, ChannelManager, LogSink, NotificationStore, PreferenceStore, SoundEngine,
};

/// Credentials supplied on the command line or through the environment.
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

pub struct Runtime {
    pub config: ClientConfig,
    pub tokens: Arc<dyn TokenProvider>,
    pub notifications: Arc<NotificationService>,
    pub assessments: Arc<AssessmentService>,
    pub sound: Arc<SoundEngine>,
    verifier: IdentityVerifier,
}

impl Runtime {
    pub fn build(config: ClientConfig, credentials: &Credentials) -> anyhow::Result<Self> {
        let tokens: Arc<dyn TokenProvider> = match (
            credentials.refresh_token.as_deref(),
            credentials.access_token.as_deref(),
        ) {
            (Some(refresh), access) => Arc::new(
                RefreshTokenProvider::new(&config.api_url, refresh, access.map(str::to_string))
                    .context("failed to create token provider")?,
            ),
            (None, Some(access)) => Arc::new(StaticToken::new(access)),
            (None, None) => {
                bail!("no credentials: set GIGBOARD_ACCESS_TOKEN or GIGBOARD_REFRESH_TOKEN")
            }
        };

        let client = Arc::new(
            ApiClient::new(&config.api_url, tokens.clone(), config.request_timeout)
                .context("failed to create API client")?,
        );
        let verifier = IdentityVerifier::from_rsa_pem(&config.idp_public_key)
            .context("failed to load identity provider key")?;
        let sound = Arc::new(SoundEngine::new(
            PreferenceStore::in_dir(&config.state_dir),
            Arc::new(LogSink),
        ));

        info!(api_url = %config.api_url, "Client runtime ready");
        Ok(Self {
            notifications: Arc::new(NotificationService::new(client.clone())),
            assessments: Arc::new(AssessmentService::new(client)),
            tokens,
            sound,
            verifier,
            config,
        })
    }

    /// Identity asserted by the current access token, refreshing once if no
    /// token is held yet.
    pub async fn identity(&self) -> anyhow::Result<Identity> {
        let token = match self.tokens.access_token().await? {
            Some(token) => token,
            None => self.tokens.refresh().await?,
        };
        Ok(self.verifier.verify(&token)?)
    }

    pub fn notification_store(&self) -> Arc<NotificationStore> {
        Arc::new(NotificationStore::new(
            self.notifications.clone(),
            self.sound.clone(),
        ))
    }

    pub fn channel_manager(&self, store: Arc<NotificationStore>) -> ChannelManager {
        let settings = &self.config.channel;
        let config = ChannelConfig::new(&self.config.socket_url)
            .with_connect_timeout(settings.connect_timeout)
            .with_reconnect(
                settings.reconnect_attempts,
                settings.reconnect_base,
                settings.reconnect_max,
            )
            .with_ack_timeout(settings.ack_timeout);
        ChannelManager::websocket(config, self.tokens.clone(), store)
    }
}
