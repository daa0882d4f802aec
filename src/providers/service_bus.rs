// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Azure Service Bus Addressing
//!
//! Service Bus routes by entity path inside the namespace:
//! - queue: `<queue>`
//! - topic: `<topic>`
//! - subscription: `<topic>/Subscriptions/<subscription>`
//!
//! Connection strings take the form
//! `amqps://<policy-name>:<access-key>@<namespace>.servicebus.windows.net`.

use super::AddressScheme;
use crate::config::{filled, Config, Provider};

/// Address scheme for Azure Service Bus.
pub struct ServiceBus;

impl AddressScheme for ServiceBus {
    fn provider() -> Provider {
        Provider::AZURE
    }

    fn destination(cfg: &Config) -> String {
        match filled(&cfg.queue) {
            Some(queue) => queue.to_owned(),
            None => cfg.topic.clone().unwrap_or_default(),
        }
    }

    fn source(cfg: &Config) -> String {
        if let Some(queue) = filled(&cfg.queue) {
            return queue.to_owned();
        }

        format!(
            "{}/Subscriptions/{}",
            cfg.topic.as_deref().unwrap_or_default(),
            cfg.subscription.as_deref().unwrap_or_default()
        )
    }
}
