// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP 1.0 Transport Seam
//!
//! The wire protocol is not implemented here. These traits describe the
//! operations this crate needs from an AMQP 1.0 client: dial a connection,
//! begin a session, attach sender and receiver links, and settle deliveries.
//!
//! Two implementations ship with the crate:
//! - [`memory::MemoryTransport`]: an in-process broker, always available
//! - `fe2o3::Fe2o3Transport`: backed by the `fe2o3-amqp` client (feature `fe2o3`)

use crate::{errors::BoxError, message::PropertyValue};
use async_trait::async_trait;
use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;

pub mod memory;

#[cfg(feature = "fe2o3")]
pub mod fe2o3;

/// Cause reported by a transport operation.
pub type TransportError = BoxError;

/// A message as it travels over a link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireMessage {
    pub message_id: Option<String>,
    pub body: Vec<u8>,
    pub application_properties: HashMap<String, PropertyValue>,
}

/// Receiver-scoped identifier of an unsettled delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeliveryId(pub u64);

/// A message handed out by a [`Receiver`] that has not been settled yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: DeliveryId,
    pub message: WireMessage,
}

/// Entry point of a transport: opens connections to a broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial(&self, address: &str) -> Result<Box<dyn Connection>, TransportError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connection: Send {
    async fn new_session(&mut self) -> Result<Box<dyn Session>, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Session: Send {
    async fn new_sender(&mut self, address: &str) -> Result<Box<dyn Sender>, TransportError>;

    async fn new_receiver(&mut self, address: &str) -> Result<Box<dyn Receiver>, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Sender: Send {
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Receiver: Send {
    /// Waits for the next message on the link.
    async fn receive(&mut self) -> Result<Delivery, TransportError>;

    /// Settles the delivery as accepted.
    async fn accept(&mut self, delivery: &Delivery) -> Result<(), TransportError>;

    /// Settles the delivery as released so the broker can redeliver it.
    async fn release(&mut self, delivery: &Delivery) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}
