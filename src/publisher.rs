// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! This module provides the provider-neutral [`Publisher`] contract and the
//! AMQP 1.0 implementation shared by every built-in provider. The caller's
//! OpenTelemetry context is propagated in the message application properties.

use crate::{
    errors::MessagingError,
    message::Envelope,
    otel,
    topology::LinkTopology,
    transport::{Sender, WireMessage},
};
use async_trait::async_trait;
use opentelemetry::Context;
use tracing::{debug, error};

/// Sends envelopes to the destination chosen by the provider.
///
/// A publisher is meant for sequential use from one task.
#[async_trait]
pub trait Publisher: Send {
    /// Sends a message to the configured destination.
    ///
    /// Exactly one send attempt is made; failures are `PublishFailed`.
    async fn publish(&mut self, ctx: &Context, envelope: &Envelope) -> Result<(), MessagingError>;

    /// Closes the link, the session and the connection.
    async fn close(&mut self, ctx: &Context) -> Result<(), MessagingError>;
}

/// AMQP 1.0 implementation of the Publisher trait.
pub struct AmqpPublisher {
    destination: String,
    topology: Option<LinkTopology<Box<dyn Sender>>>,
}

impl AmqpPublisher {
    pub(crate) fn new(destination: String, topology: LinkTopology<Box<dyn Sender>>) -> Self {
        AmqpPublisher {
            destination,
            topology: Some(topology),
        }
    }

    /// Wire address this publisher sends to.
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&mut self, ctx: &Context, envelope: &Envelope) -> Result<(), MessagingError> {
        let topology = self.topology.as_mut().ok_or(MessagingError::Closed(None))?;

        let message = to_wire(ctx, envelope);

        match topology.link.send(message).await {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    destination = %self.destination,
                    "error publishing message"
                );
                Err(MessagingError::PublishFailed(err))
            }
            _ => {
                debug!(destination = %self.destination, "message published");
                Ok(())
            }
        }
    }

    async fn close(&mut self, _ctx: &Context) -> Result<(), MessagingError> {
        match self.topology.take() {
            Some(topology) => topology.close().await,
            None => Ok(()),
        }
    }
}

/// Builds the wire message: identifier when non-empty, application properties
/// plus the injected trace context.
fn to_wire(ctx: &Context, envelope: &Envelope) -> WireMessage {
    let mut application_properties = envelope.properties.clone();
    otel::inject(ctx, &mut application_properties);

    WireMessage {
        message_id: Some(envelope.id.clone()).filter(|id| !id.is_empty()),
        body: envelope.body.clone(),
        application_properties,
    }
}
