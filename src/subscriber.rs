// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Subscriber
//!
//! This module provides the provider-neutral [`Subscriber`] contract and its
//! AMQP 1.0 implementation. Received envelopes carry a [`RawDelivery`] token
//! bound to the subscriber instance that produced them; `ack` and `nack`
//! refuse tokens that are missing or that belong to another provider or
//! subscriber.
//!
//! Settling the same envelope twice is left to the transport. Both built-in
//! transports reject it, which surfaces as `AckFailed`.

use crate::{
    config::Provider,
    errors::MessagingError,
    message::{Envelope, RawDelivery},
    topology::LinkTopology,
    transport::{Delivery, Receiver},
};
use async_trait::async_trait;
use opentelemetry::Context;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Receives and settles envelopes from the source chosen by the provider.
///
/// A subscriber is meant for sequential use from one receive loop.
#[async_trait]
pub trait Subscriber: Send {
    /// Waits until a message arrives or the transport fails.
    ///
    /// Dropping the returned future cancels the wait.
    async fn receive(&mut self, ctx: &Context) -> Result<Envelope, MessagingError>;

    /// Accepts the message; the broker will not redeliver it.
    async fn ack(&mut self, ctx: &Context, envelope: &Envelope) -> Result<(), MessagingError>;

    /// Releases the message back to the broker for redelivery.
    async fn nack(&mut self, ctx: &Context, envelope: &Envelope) -> Result<(), MessagingError>;

    /// Closes the link, the session and the connection.
    async fn close(&mut self, ctx: &Context) -> Result<(), MessagingError>;
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Accept,
    Release,
}

/// AMQP 1.0 implementation of the Subscriber trait.
pub struct AmqpSubscriber {
    id: Uuid,
    provider: Provider,
    source: String,
    topology: Option<LinkTopology<Box<dyn Receiver>>>,
}

impl AmqpSubscriber {
    pub(crate) fn new(
        provider: Provider,
        source: String,
        topology: LinkTopology<Box<dyn Receiver>>,
    ) -> Self {
        AmqpSubscriber {
            id: Uuid::new_v4(),
            provider,
            source,
            topology: Some(topology),
        }
    }

    /// Wire address this subscriber reads from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Recovers the delivery from the envelope's token, checking it was
    /// produced by this subscriber.
    fn delivery<'e>(&self, envelope: &'e Envelope) -> Result<&'e Delivery, MessagingError> {
        let Some(raw) = envelope.raw() else {
            warn!("envelope carries no acknowledgment token");
            return Err(MessagingError::AckFailed(
                "envelope carries no acknowledgment token".into(),
            ));
        };

        if raw.provider != self.provider {
            warn!(
                expected = %self.provider,
                found = %raw.provider,
                "acknowledgment token from another provider"
            );
            return Err(MessagingError::AckFailed(
                format!("acknowledgment token belongs to provider `{}`", raw.provider).into(),
            ));
        }

        if raw.subscriber != self.id {
            warn!("acknowledgment token from another subscriber");
            return Err(MessagingError::AckFailed(
                "acknowledgment token belongs to another subscriber".into(),
            ));
        }

        Ok(&raw.delivery)
    }

    async fn settle(&mut self, envelope: &Envelope, how: Settlement) -> Result<(), MessagingError> {
        let delivery = self.delivery(envelope)?;
        let topology = self.topology.as_mut().ok_or(MessagingError::Closed(None))?;

        let result = match how {
            Settlement::Accept => topology.link.accept(delivery).await,
            Settlement::Release => topology.link.release(delivery).await,
        };

        match result {
            Err(err) => {
                error!(error = err.to_string(), settlement = ?how, "error settling message");
                Err(MessagingError::AckFailed(err))
            }
            _ => {
                debug!(settlement = ?how, "message settled");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Subscriber for AmqpSubscriber {
    async fn receive(&mut self, _ctx: &Context) -> Result<Envelope, MessagingError> {
        let topology = self.topology.as_mut().ok_or(MessagingError::Closed(None))?;

        let delivery = match topology.link.receive().await {
            Ok(d) => d,
            Err(err) => {
                error!(error = err.to_string(), source = %self.source, "error receiving message");
                return Err(MessagingError::ReceiveFailed(err));
            }
        };

        debug!(source = %self.source, "received message");

        let id = delivery.message.message_id.clone().unwrap_or_default();
        let body = delivery.message.body.clone();
        let properties = delivery
            .message
            .application_properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Envelope::received(
            id,
            body,
            properties,
            RawDelivery {
                provider: self.provider.clone(),
                subscriber: self.id,
                delivery,
            },
        ))
    }

    async fn ack(&mut self, _ctx: &Context, envelope: &Envelope) -> Result<(), MessagingError> {
        self.settle(envelope, Settlement::Accept).await
    }

    async fn nack(&mut self, _ctx: &Context, envelope: &Envelope) -> Result<(), MessagingError> {
        self.settle(envelope, Settlement::Release).await
    }

    async fn close(&mut self, _ctx: &Context) -> Result<(), MessagingError> {
        match self.topology.take() {
            Some(topology) => topology.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::ErrorKind,
        message::PropertyValue,
        transport::{
            DeliveryId, MockConnection, MockReceiver, MockSession, MockTransport, WireMessage,
        },
    };
    use std::collections::HashMap;

    async fn subscriber_with(provider: Provider, receiver: MockReceiver) -> AmqpSubscriber {
        let mut session = MockSession::new();
        session
            .expect_new_receiver()
            .return_once(move |_| Ok(Box::new(receiver)));
        session.expect_close().returning(|| Ok(()));

        let mut connection = MockConnection::new();
        connection
            .expect_new_session()
            .return_once(move || Ok(Box::new(session)));
        connection.expect_close().returning(|| Ok(()));

        let mut transport = MockTransport::new();
        transport
            .expect_dial()
            .return_once(move |_| Ok(Box::new(connection)));

        let topology = LinkTopology::open_receiver(&transport, "amqp://local", "q")
            .await
            .ok()
            .unwrap();

        AmqpSubscriber::new(provider, "q".to_owned(), topology)
    }

    fn delivery() -> Delivery {
        Delivery {
            id: DeliveryId(7),
            message: WireMessage {
                message_id: Some("id1".to_owned()),
                body: b"payload".to_vec(),
                application_properties: HashMap::from([(
                    "k".to_owned(),
                    PropertyValue::from("v"),
                )]),
            },
        }
    }

    #[tokio::test]
    async fn receive_builds_envelope_and_ack_accepts() {
        let mut receiver = MockReceiver::new();
        receiver.expect_receive().times(1).returning(|| Ok(delivery()));
        receiver
            .expect_accept()
            .withf(|d| d.id == DeliveryId(7))
            .times(1)
            .returning(|_| Ok(()));

        let mut subscriber = subscriber_with(Provider::AZURE, receiver).await;
        let ctx = Context::new();

        let envelope = subscriber.receive(&ctx).await.unwrap();

        assert_eq!(envelope.id, "id1");
        assert_eq!(envelope.body, b"payload");
        assert_eq!(envelope.properties.get("k"), Some(&PropertyValue::from("v")));
        assert_eq!(envelope.raw().map(|r| r.provider().clone()), Some(Provider::AZURE));

        subscriber.ack(&ctx, &envelope).await.unwrap();
    }

    #[tokio::test]
    async fn nack_releases() {
        let mut receiver = MockReceiver::new();
        receiver.expect_receive().returning(|| Ok(delivery()));
        receiver.expect_release().times(1).returning(|_| Ok(()));

        let mut subscriber = subscriber_with(Provider::AMAZON_MQ, receiver).await;
        let ctx = Context::new();

        let envelope = subscriber.receive(&ctx).await.unwrap();
        subscriber.nack(&ctx, &envelope).await.unwrap();
    }

    #[tokio::test]
    async fn receive_failure_is_receive_failed() {
        let mut receiver = MockReceiver::new();
        receiver
            .expect_receive()
            .returning(|| Err("link detached".into()));

        let mut subscriber = subscriber_with(Provider::AZURE, receiver).await;

        let err = subscriber.receive(&Context::new()).await.unwrap_err();
        assert!(err.is(ErrorKind::ReceiveFailed));
    }

    #[tokio::test]
    async fn ack_without_token_fails() {
        let mut subscriber = subscriber_with(Provider::AZURE, MockReceiver::new()).await;

        let err = subscriber
            .ack(&Context::new(), &Envelope::new(b"x".to_vec()))
            .await
            .unwrap_err();

        assert!(err.is(ErrorKind::AckFailed));
    }

    #[tokio::test]
    async fn foreign_tokens_are_rejected() {
        let mut receiver = MockReceiver::new();
        receiver.expect_receive().returning(|| Ok(delivery()));
        receiver.expect_accept().never();

        let mut azure = subscriber_with(Provider::AZURE, receiver).await;
        let mut other_azure = subscriber_with(Provider::AZURE, MockReceiver::new()).await;
        let mut amazon = subscriber_with(Provider::AMAZON_MQ, MockReceiver::new()).await;
        let ctx = Context::new();

        let envelope = azure.receive(&ctx).await.unwrap();

        let err = amazon.ack(&ctx, &envelope).await.unwrap_err();
        assert!(err.is(ErrorKind::AckFailed));

        let err = other_azure.nack(&ctx, &envelope).await.unwrap_err();
        assert!(err.is(ErrorKind::AckFailed));
    }

    #[tokio::test]
    async fn settle_failure_is_ack_failed() {
        let mut receiver = MockReceiver::new();
        receiver.expect_receive().returning(|| Ok(delivery()));
        receiver
            .expect_accept()
            .returning(|_| Err("delivery already settled".into()));

        let mut subscriber = subscriber_with(Provider::AZURE, receiver).await;
        let ctx = Context::new();

        let envelope = subscriber.receive(&ctx).await.unwrap();
        let err = subscriber.ack(&ctx, &envelope).await.unwrap_err();

        assert!(err.is(ErrorKind::AckFailed));
    }

    #[tokio::test]
    async fn operations_after_close_are_closed() {
        let mut receiver = MockReceiver::new();
        receiver.expect_close().times(1).returning(|| Ok(()));

        let mut subscriber = subscriber_with(Provider::AZURE, receiver).await;
        let ctx = Context::new();

        subscriber.close(&ctx).await.unwrap();

        let err = subscriber.receive(&ctx).await.unwrap_err();
        assert!(err.is(ErrorKind::Closed));
    }
}
