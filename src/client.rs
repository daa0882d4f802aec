// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Client
//!
//! Binds a validated [`Config`] to the factory registered for its provider.
//! Every publisher or subscriber created from a client opens its own
//! connection; nothing is pooled or shared between them.

use crate::{
    config::Config,
    errors::MessagingError,
    publisher::Publisher,
    registry::{self, ProviderFactory, ProviderRegistry},
    subscriber::Subscriber,
};
use opentelemetry::Context;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point for creating publishers and subscribers.
#[derive(Clone)]
pub struct Client {
    config: Arc<Config>,
    factory: Arc<dyn ProviderFactory>,
}

impl Client {
    /// Validates `config` and resolves its provider from the process-wide registry.
    pub fn new(config: Config) -> Result<Client, MessagingError> {
        Client::with_registry(config, registry::global())
    }

    /// Validates `config` and resolves its provider from `registry`.
    ///
    /// # Returns
    /// A client, `InvalidConfig` if validation fails or `UnsupportedProvider`
    /// if no factory is registered
    pub fn with_registry(
        config: Config,
        registry: &ProviderRegistry,
    ) -> Result<Client, MessagingError> {
        config.validate()?;

        let factory = registry.resolve(&config.provider)?;

        if config.is_ambiguous() {
            warn!(
                provider = %config.provider,
                "both queue and topic are configured, the queue will be used"
            );
        }

        debug!(provider = %config.provider, "client created");

        Ok(Client {
            config: Arc::new(config),
            factory,
        })
    }

    /// Loads the configuration from `AMQPKIT_*` variables and builds a client
    /// against the process-wide registry.
    pub fn from_env() -> Result<Client, MessagingError> {
        Client::new(Config::from_env()?)
    }

    /// Creates a publisher with a fresh connection.
    pub async fn new_publisher(&self, ctx: &Context) -> Result<Box<dyn Publisher>, MessagingError> {
        self.factory.new_publisher(ctx, &self.config).await
    }

    /// Creates a subscriber with a fresh connection.
    pub async fn new_subscriber(
        &self,
        ctx: &Context,
    ) -> Result<Box<dyn Subscriber>, MessagingError> {
        self.factory.new_subscriber(ctx, &self.config).await
    }

    /// Returns the validated configuration this client was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
