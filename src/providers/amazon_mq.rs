// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Amazon MQ (ActiveMQ) Addressing
//!
//! ActiveMQ bridges AMQP onto JMS destinations:
//! - queue: `<queue>`
//! - topic: `topic://<topic>`
//! - durable subscription: `Consumer.<subscription>.VirtualTopic.<topic>`
//!
//! Without a subscription name a receiver attaches to the topic itself and
//! only sees messages published while it is attached.

use super::AddressScheme;
use crate::config::{filled, Config, Provider};

/// Prefix ActiveMQ uses to address a JMS topic over AMQP
pub const TOPIC_PREFIX: &str = "topic://";

/// Address scheme for Amazon MQ with the ActiveMQ engine.
pub struct AmazonMq;

impl AddressScheme for AmazonMq {
    fn provider() -> Provider {
        Provider::AMAZON_MQ
    }

    fn destination(cfg: &Config) -> String {
        match filled(&cfg.queue) {
            Some(queue) => queue.to_owned(),
            None => format!("{}{}", TOPIC_PREFIX, cfg.topic.as_deref().unwrap_or_default()),
        }
    }

    fn source(cfg: &Config) -> String {
        if let Some(queue) = filled(&cfg.queue) {
            return queue.to_owned();
        }

        let topic = cfg.topic.as_deref().unwrap_or_default();
        match filled(&cfg.subscription) {
            Some(subscription) => format!("Consumer.{}.VirtualTopic.{}", subscription, topic),
            None => format!("{}{}", TOPIC_PREFIX, topic),
        }
    }
}
