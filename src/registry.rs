// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Provider Registry
//!
//! Maps provider identifiers to the factories that build publishers and
//! subscribers for them. A registry can be created and injected explicitly;
//! a process-wide instance is also available for bootstrap code that prefers
//! to register once at startup.
//!
//! Registration overwrites: the last factory registered under an identifier
//! wins. Entries are never removed.

use crate::{
    config::{Config, Provider},
    errors::MessagingError,
    publisher::Publisher,
    subscriber::Subscriber,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use opentelemetry::Context;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Creates publishers and subscribers for one provider.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Opens a new connection, session and sender link for `cfg`.
    async fn new_publisher(
        &self,
        ctx: &Context,
        cfg: &Config,
    ) -> Result<Box<dyn Publisher>, MessagingError>;

    /// Opens a new connection, session and receiver link for `cfg`.
    async fn new_subscriber(
        &self,
        ctx: &Context,
        cfg: &Config,
    ) -> Result<Box<dyn Subscriber>, MessagingError>;
}

/// Thread-safe map from provider identifier to factory.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<Provider, Arc<dyn ProviderFactory>>>,
}

impl ProviderRegistry {
    /// Creates a registry with no providers.
    pub fn new() -> Self {
        ProviderRegistry::default()
    }

    /// Registers `factory` under `provider`, replacing any previous entry.
    pub fn register(&self, provider: impl Into<Provider>, factory: Arc<dyn ProviderFactory>) {
        let provider = provider.into();
        debug!(provider = %provider, "registering provider");
        self.factories.write().insert(provider, factory);
    }

    /// Looks up the factory for `provider`.
    ///
    /// # Returns
    /// The factory, or `MessagingError::UnsupportedProvider` if none is registered
    pub fn resolve(&self, provider: &Provider) -> Result<Arc<dyn ProviderFactory>, MessagingError> {
        self.factories
            .read()
            .get(provider)
            .cloned()
            .ok_or_else(|| MessagingError::UnsupportedProvider(provider.to_string()))
    }

    /// Registered identifiers, in no particular order.
    pub fn providers(&self) -> Vec<Provider> {
        self.factories.read().keys().cloned().collect()
    }
}

static GLOBAL: Lazy<ProviderRegistry> = Lazy::new(ProviderRegistry::new);

/// The process-wide registry used by [`crate::client::Client::new`].
pub fn global() -> &'static ProviderRegistry {
    &GLOBAL
}

/// Registers `factory` in the process-wide registry.
pub fn register_provider(provider: impl Into<Provider>, factory: Arc<dyn ProviderFactory>) {
    global().register(provider, factory)
}
