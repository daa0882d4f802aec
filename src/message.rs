// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Envelope
//!
//! Provider-neutral representation of a message. Envelopes built by callers
//! for publishing carry no acknowledgment state; envelopes produced by a
//! subscriber carry a [`RawDelivery`] that must be handed back to the same
//! subscriber to settle the message.

use crate::{config::Provider, otel::AmqpTracePropagator, transport::Delivery};
use opentelemetry::{global, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Application property value.
///
/// Covers the AMQP 1.0 simple types an application property may hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value.into())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::UInt(value.into())
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::UInt(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(value: Vec<u8>) -> Self {
        PropertyValue::Binary(value)
    }
}

/// Acknowledgment token attached to received envelopes.
///
/// Tagged with the provider and the subscriber instance that produced it, so a
/// token presented to the wrong subscriber is rejected instead of settling an
/// unrelated delivery.
#[derive(Debug, Clone)]
pub struct RawDelivery {
    pub(crate) provider: Provider,
    pub(crate) subscriber: Uuid,
    pub(crate) delivery: Delivery,
}

impl RawDelivery {
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// The wire-level delivery as received from the transport.
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }
}

/// A message with provider-agnostic fields.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Message identifier; empty when the broker did not supply one.
    pub id: String,
    pub body: Vec<u8>,
    pub properties: HashMap<String, PropertyValue>,
    raw: Option<RawDelivery>,
}

impl Envelope {
    /// Creates an envelope for publishing with the given body.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Envelope {
            body: body.into(),
            ..Envelope::default()
        }
    }

    /// Sets the message id; an empty id is not sent.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Adds an application property, replacing any value under the same key.
    ///
    /// # Parameters
    /// * `key` - Property name
    /// * `value` - Property value
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Acknowledgment token, present only on envelopes returned by a subscriber.
    pub fn raw(&self) -> Option<&RawDelivery> {
        self.raw.as_ref()
    }

    pub(crate) fn received(
        id: String,
        body: Vec<u8>,
        properties: HashMap<String, PropertyValue>,
        raw: RawDelivery,
    ) -> Self {
        Envelope {
            id,
            body,
            properties,
            raw: Some(raw),
        }
    }

    /// Extracts the OpenTelemetry context propagated in the message properties.
    ///
    /// Returns an empty context when no propagator is installed or the
    /// publisher did not inject one.
    pub fn trace_context(&self) -> Context {
        let mut props = self.properties.clone();
        global::get_text_map_propagator(|propagator| {
            propagator.extract(&AmqpTracePropagator::new(&mut props))
        })
    }
}
