// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Built-in Providers
//!
//! Each broker names topics and subscriptions differently on the wire. An
//! [`AddressScheme`] captures that naming convention; [`AmqpProviderFactory`]
//! combines a scheme with a transport to open publishers and subscribers.
//!
//! The set of built-in providers is enumerated in [`register_defaults`].

use crate::{
    config::{Config, Provider},
    errors::MessagingError,
    publisher::{AmqpPublisher, Publisher},
    registry::{ProviderFactory, ProviderRegistry},
    subscriber::{AmqpSubscriber, Subscriber},
    topology::LinkTopology,
    transport::Transport,
};
use async_trait::async_trait;
use opentelemetry::Context;
use std::{marker::PhantomData, sync::Arc};
use tracing::debug;

pub mod amazon_mq;
pub mod service_bus;

pub use amazon_mq::AmazonMq;
pub use service_bus::ServiceBus;

/// Broker-specific translation of queue/topic/subscription into wire addresses.
pub trait AddressScheme: Send + Sync + 'static {
    /// Identifier the scheme registers under.
    fn provider() -> Provider;

    /// Node a sender publishes to.
    fn destination(cfg: &Config) -> String;

    /// Node a receiver reads from.
    fn source(cfg: &Config) -> String;
}

/// Factory opening one connection per publisher or subscriber over `transport`.
pub struct AmqpProviderFactory<S> {
    transport: Arc<dyn Transport>,
    scheme: PhantomData<fn() -> S>,
}

impl<S: AddressScheme> AmqpProviderFactory<S> {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        AmqpProviderFactory {
            transport,
            scheme: PhantomData,
        }
    }
}

#[async_trait]
impl<S: AddressScheme> ProviderFactory for AmqpProviderFactory<S> {
    async fn new_publisher(
        &self,
        _ctx: &Context,
        cfg: &Config,
    ) -> Result<Box<dyn Publisher>, MessagingError> {
        let destination = S::destination(cfg);
        debug!(provider = %S::provider(), destination, "creating publisher");

        let topology = LinkTopology::open_sender(
            self.transport.as_ref(),
            &cfg.build_connection_string(),
            &destination,
        )
        .await?;

        Ok(Box::new(AmqpPublisher::new(destination, topology)))
    }

    async fn new_subscriber(
        &self,
        _ctx: &Context,
        cfg: &Config,
    ) -> Result<Box<dyn Subscriber>, MessagingError> {
        let source = S::source(cfg);
        debug!(provider = %S::provider(), source, "creating subscriber");

        let topology = LinkTopology::open_receiver(
            self.transport.as_ref(),
            &cfg.build_connection_string(),
            &source,
        )
        .await?;

        Ok(Box::new(AmqpSubscriber::new(S::provider(), source, topology)))
    }
}

/// Registers every built-in provider on `registry`, all sharing `transport`.
pub fn register_defaults(registry: &ProviderRegistry, transport: Arc<dyn Transport>) {
    registry.register(
        ServiceBus::provider(),
        Arc::new(AmqpProviderFactory::<ServiceBus>::new(transport.clone())),
    );
    registry.register(
        AmazonMq::provider(),
        Arc::new(AmqpProviderFactory::<AmazonMq>::new(transport)),
    );
}
