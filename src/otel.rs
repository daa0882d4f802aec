// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration
//!
//! Propagates trace context through AMQP application properties so a consumer
//! can continue the trace started by the publisher.

use crate::message::PropertyValue;
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use std::collections::HashMap;

/// An adapter for injecting and extracting OpenTelemetry context from
/// application properties.
pub(crate) struct AmqpTracePropagator<'a> {
    properties: &'a mut HashMap<String, PropertyValue>,
}

impl<'a> AmqpTracePropagator<'a> {
    pub(crate) fn new(properties: &'a mut HashMap<String, PropertyValue>) -> Self {
        Self { properties }
    }
}

impl Injector for AmqpTracePropagator<'_> {
    /// Sets a trace context entry as a string property with a lower-cased key.
    fn set(&mut self, key: &str, value: String) {
        self.properties
            .insert(key.to_lowercase(), PropertyValue::String(value));
    }
}

impl Extractor for AmqpTracePropagator<'_> {
    /// Gets a trace context entry; non-string properties are ignored.
    fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(PropertyValue::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.properties.keys().map(String::as_str).collect()
    }
}

/// Injects `ctx` into `properties` using the globally installed propagator.
pub(crate) fn inject(ctx: &Context, properties: &mut HashMap<String, PropertyValue>) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut AmqpTracePropagator::new(properties))
    });
}
