// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # fe2o3-amqp Transport
//!
//! Adapts the [`fe2o3_amqp`] AMQP 1.0 client to the transport traits.
//! Bodies are sent as a single `Data` section; on receive, `Data` sections are
//! concatenated and binary or string `AmqpValue` bodies are taken as bytes.

use super::{
    Connection, Delivery, DeliveryId, Receiver, Sender, Session, Transport, TransportError,
    WireMessage,
};
use crate::message::PropertyValue;
use async_trait::async_trait;
use fe2o3_amqp::{
    connection::ConnectionHandle,
    link::delivery::Delivery as AmqpDelivery,
    session::SessionHandle,
    types::{
        messaging::{
            AmqpValue, ApplicationProperties, Body, Data, Message, MessageId, Outcome, Properties,
        },
        primitives::{Binary, SimpleValue, Value},
    },
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Transport backed by `fe2o3-amqp`.
#[derive(Debug, Clone)]
pub struct Fe2o3Transport {
    container_id: String,
}

impl Fe2o3Transport {
    /// Creates a transport whose connections announce a random container id.
    pub fn new() -> Self {
        Fe2o3Transport {
            container_id: format!("amqpkit-{}", Uuid::new_v4()),
        }
    }

    pub fn with_container_id(container_id: impl Into<String>) -> Self {
        Fe2o3Transport {
            container_id: container_id.into(),
        }
    }
}

impl Default for Fe2o3Transport {
    fn default() -> Self {
        Fe2o3Transport::new()
    }
}

#[async_trait]
impl Transport for Fe2o3Transport {
    async fn dial(&self, address: &str) -> Result<Box<dyn Connection>, TransportError> {
        debug!(container_id = %self.container_id, "opening amqp connection");
        let handle =
            fe2o3_amqp::Connection::open(self.container_id.clone(), address).await?;

        Ok(Box::new(Fe2o3Connection { handle }))
    }
}

struct Fe2o3Connection {
    handle: ConnectionHandle<()>,
}

#[async_trait]
impl Connection for Fe2o3Connection {
    async fn new_session(&mut self) -> Result<Box<dyn Session>, TransportError> {
        let handle = fe2o3_amqp::Session::begin(&mut self.handle).await?;
        Ok(Box::new(Fe2o3Session { handle }))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.handle.close().await?;
        Ok(())
    }
}

struct Fe2o3Session {
    handle: SessionHandle<()>,
}

#[async_trait]
impl Session for Fe2o3Session {
    async fn new_sender(&mut self, address: &str) -> Result<Box<dyn Sender>, TransportError> {
        let name = format!("amqpkit-sender-{}", Uuid::new_v4());
        let sender = fe2o3_amqp::Sender::attach(&mut self.handle, name, address.to_owned()).await?;

        Ok(Box::new(Fe2o3Sender {
            sender: Some(sender),
        }))
    }

    async fn new_receiver(&mut self, address: &str) -> Result<Box<dyn Receiver>, TransportError> {
        let name = format!("amqpkit-receiver-{}", Uuid::new_v4());
        let receiver =
            fe2o3_amqp::Receiver::attach(&mut self.handle, name, address.to_owned()).await?;

        Ok(Box::new(Fe2o3Receiver {
            receiver: Some(receiver),
            next_id: 0,
            unsettled: HashMap::new(),
        }))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.handle.end().await?;
        Ok(())
    }
}

struct Fe2o3Sender {
    sender: Option<fe2o3_amqp::Sender>,
}

#[async_trait]
impl Sender for Fe2o3Sender {
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        let sender = self.sender.as_mut().ok_or("sender link is closed")?;

        match sender.send(to_amqp(message)).await? {
            Outcome::Accepted(_) => Ok(()),
            outcome => Err(format!("message not accepted: {:?}", outcome).into()),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sender.take() {
            Some(sender) => Ok(sender.close().await?),
            None => Ok(()),
        }
    }
}

struct Fe2o3Receiver {
    receiver: Option<fe2o3_amqp::Receiver>,
    next_id: u64,
    unsettled: HashMap<DeliveryId, AmqpDelivery<Body<Value>>>,
}

impl Fe2o3Receiver {
    fn take_unsettled(
        &mut self,
        delivery: &Delivery,
    ) -> Result<AmqpDelivery<Body<Value>>, TransportError> {
        self.unsettled
            .remove(&delivery.id)
            .ok_or_else(|| format!("delivery {} is not outstanding", delivery.id.0).into())
    }
}

#[async_trait]
impl Receiver for Fe2o3Receiver {
    async fn receive(&mut self) -> Result<Delivery, TransportError> {
        let receiver = self.receiver.as_mut().ok_or("receiver link is closed")?;

        let delivery: AmqpDelivery<Body<Value>> = receiver.recv().await?;
        let message = from_amqp(&delivery);

        let id = DeliveryId(self.next_id);
        self.next_id += 1;
        self.unsettled.insert(id, delivery);

        Ok(Delivery { id, message })
    }

    async fn accept(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        let unsettled = self.take_unsettled(delivery)?;
        let receiver = self.receiver.as_mut().ok_or("receiver link is closed")?;
        receiver.accept(&unsettled).await?;
        Ok(())
    }

    async fn release(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        let unsettled = self.take_unsettled(delivery)?;
        let receiver = self.receiver.as_mut().ok_or("receiver link is closed")?;
        receiver.release(&unsettled).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.unsettled.clear();
        match self.receiver.take() {
            Some(receiver) => Ok(receiver.close().await?),
            None => Ok(()),
        }
    }
}

fn to_amqp(message: WireMessage) -> Message<Data> {
    let properties = message
        .message_id
        .map(|id| Properties::builder().message_id(id).build());

    let application_properties = if message.application_properties.is_empty() {
        None
    } else {
        let mut builder = ApplicationProperties::builder();
        for (key, value) in message.application_properties {
            builder = builder.insert(key, to_simple(value));
        }
        Some(builder.build())
    };

    let mut amqp = Message::builder().data(Binary::from(message.body)).build();
    amqp.properties = properties;
    amqp.application_properties = application_properties;
    amqp
}

fn from_amqp(delivery: &AmqpDelivery<Body<Value>>) -> WireMessage {
    let amqp = delivery.message();

    let message_id = amqp
        .properties
        .as_ref()
        .and_then(|p| p.message_id.as_ref())
        .map(|id| match id {
            MessageId::String(v) => v.clone(),
            other => format!("{:?}", other),
        });

    let application_properties = amqp
        .application_properties
        .as_ref()
        .map(|props| {
            props
                .0
                .iter()
                .map(|(k, v)| (k.clone(), from_simple(v)))
                .collect()
        })
        .unwrap_or_default();

    let body = match &amqp.body {
        Body::Data(batch) => batch.iter().flat_map(|data| data.0.iter().copied()).collect(),
        Body::Value(AmqpValue(Value::Binary(bin))) => bin.to_vec(),
        Body::Value(AmqpValue(Value::String(s))) => s.clone().into_bytes(),
        _ => Vec::new(),
    };

    WireMessage {
        message_id,
        body,
        application_properties,
    }
}

fn to_simple(value: PropertyValue) -> SimpleValue {
    match value {
        PropertyValue::Null => SimpleValue::Null,
        PropertyValue::Bool(v) => SimpleValue::Bool(v),
        PropertyValue::Int(v) => SimpleValue::Long(v),
        PropertyValue::UInt(v) => SimpleValue::Ulong(v),
        PropertyValue::Double(v) => SimpleValue::Double(v.into()),
        PropertyValue::String(v) => SimpleValue::String(v),
        PropertyValue::Binary(v) => SimpleValue::Binary(Binary::from(v)),
    }
}

fn from_simple(value: &SimpleValue) -> PropertyValue {
    match value {
        SimpleValue::Null => PropertyValue::Null,
        SimpleValue::Bool(v) => PropertyValue::Bool(*v),
        SimpleValue::Byte(v) => PropertyValue::Int((*v).into()),
        SimpleValue::Short(v) => PropertyValue::Int((*v).into()),
        SimpleValue::Int(v) => PropertyValue::Int((*v).into()),
        SimpleValue::Long(v) => PropertyValue::Int(*v),
        SimpleValue::Ubyte(v) => PropertyValue::UInt((*v).into()),
        SimpleValue::Ushort(v) => PropertyValue::UInt((*v).into()),
        SimpleValue::Uint(v) => PropertyValue::UInt((*v).into()),
        SimpleValue::Ulong(v) => PropertyValue::UInt(*v),
        SimpleValue::Float(v) => PropertyValue::Double(f64::from(v.into_inner())),
        SimpleValue::Double(v) => PropertyValue::Double(v.into_inner()),
        SimpleValue::String(v) => PropertyValue::String(v.clone()),
        SimpleValue::Symbol(v) => PropertyValue::String(v.0.clone()),
        SimpleValue::Binary(v) => PropertyValue::Binary(v.to_vec()),
        other => PropertyValue::String(format!("{:?}", other)),
    }
}
