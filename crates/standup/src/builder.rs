//! `StandupService` builder.

use std::sync::Arc;

use standup_credential::{EmailSealer, ServerSecret, TokenService};
use standup_ratelimit::{MemoryRateLimitStore, RateLimitStore, RateLimiter};
use standup_store::KeyValueStore;
use tracing::info;

use crate::{Mailer, StandupConfig, StandupError, StandupService};

/// Builder for configuring a [`StandupService`].
///
/// The server secret is the only required setting. It keys token
/// signatures and email sealing, so every instance serving the same users
/// must share it.
///
/// # Example
///
/// ```rust,ignore
/// let service = StandupBuilder::new()
///     .config(config)
///     .secret(ServerSecret::new(secret_bytes)?)
///     .build(MemoryStore::new(), LogMailer)?;
/// ```
#[derive(Debug, Default)]
pub struct StandupBuilder {
    config: StandupConfig,
    secret: Option<ServerSecret>,
}

impl StandupBuilder {
    /// Creates a builder with the default configuration and no secret.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: StandupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn secret(mut self, secret: ServerSecret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Builds the service with an in-process rate limiter.
    ///
    /// # Errors
    /// [`StandupError::Internal`] if the configuration is out of range or
    /// the secret is missing or unusable.
    pub fn build<S, M>(
        self,
        store: S,
        mailer: M,
    ) -> Result<StandupService<S, M, MemoryRateLimitStore>, StandupError>
    where
        S: KeyValueStore,
        M: Mailer,
    {
        self.build_with_rate_limit_store(store, mailer, MemoryRateLimitStore::new())
    }

    /// Builds the service with a caller-supplied rate-limit store, e.g. one
    /// shared by several instances.
    pub fn build_with_rate_limit_store<S, M, L>(
        self,
        store: S,
        mailer: M,
        rate_limit_store: L,
    ) -> Result<StandupService<S, M, L>, StandupError>
    where
        S: KeyValueStore,
        M: Mailer,
        L: RateLimitStore,
    {
        self.config.validate()?;
        let secret = self
            .secret
            .ok_or_else(|| StandupError::Internal("server secret not configured".into()))?;
        let tokens = TokenService::new(&secret, self.config.tokens.clone())?;
        let sealer = EmailSealer::new(&secret);
        let limiter = RateLimiter::new(rate_limit_store, self.config.rate_limit.clone());

        info!(
            expiry_policy = ?self.config.store.expiry_policy,
            max_participants = self.config.session.max_participants,
            "standup service configured"
        );
        Ok(StandupService::from_parts(
            self.config,
            Arc::new(store),
            limiter,
            tokens,
            sealer,
            mailer,
        ))
    }
}
