// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # In-Memory Transport
//!
//! A broker simulated entirely within the process. Every node address is a
//! FIFO queue; a sender appends to the queue named by its address and a
//! receiver takes from the queue named by its address. Addresses match only
//! when their strings are equal, so no topic fan-out is modelled.
//!
//! Received messages stay unsettled on the receiver until accepted or
//! released. Releasing puts the message back at the head of its queue.
//! Settling an unknown or already settled delivery fails.

use super::{
    Connection, Delivery, DeliveryId, Receiver, Sender, Session, Transport, TransportError,
    WireMessage,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct Broker {
    queues: Mutex<HashMap<String, VecDeque<WireMessage>>>,
    dialed: Mutex<Vec<String>>,
    notify: Notify,
}

impl Broker {
    fn push_back(&self, address: &str, message: WireMessage) {
        self.queues
            .lock()
            .entry(address.to_owned())
            .or_default()
            .push_back(message);
        self.notify.notify_waiters();
    }

    fn push_front(&self, address: &str, message: WireMessage) {
        self.queues
            .lock()
            .entry(address.to_owned())
            .or_default()
            .push_front(message);
        self.notify.notify_waiters();
    }

    fn pop(&self, address: &str) -> Option<WireMessage> {
        self.queues.lock().get_mut(address).and_then(VecDeque::pop_front)
    }
}

/// In-process transport. Clones share the same broker.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    broker: Arc<Broker>,
}

impl MemoryTransport {
    /// Creates a transport backed by its own empty broker.
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    /// Number of messages waiting on `address`, excluding unsettled ones.
    pub fn pending(&self, address: &str) -> usize {
        self.broker
            .queues
            .lock()
            .get(address)
            .map(VecDeque::len)
            .unwrap_or_default()
    }

    /// Connection strings passed to `dial`, oldest first.
    pub fn dialed(&self) -> Vec<String> {
        self.broker.dialed.lock().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn dial(&self, address: &str) -> Result<Box<dyn Connection>, TransportError> {
        debug!("memory transport dialed");
        self.broker.dialed.lock().push(address.to_owned());

        Ok(Box::new(MemoryConnection {
            broker: self.broker.clone(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    broker: Arc<Broker>,
    closed: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn new_session(&mut self) -> Result<Box<dyn Session>, TransportError> {
        if self.closed {
            return Err("connection is closed".into());
        }

        Ok(Box::new(MemorySession {
            broker: self.broker.clone(),
            closed: false,
        }))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

struct MemorySession {
    broker: Arc<Broker>,
    closed: bool,
}

#[async_trait]
impl Session for MemorySession {
    async fn new_sender(&mut self, address: &str) -> Result<Box<dyn Sender>, TransportError> {
        if self.closed {
            return Err("session is closed".into());
        }

        Ok(Box::new(MemorySender {
            broker: self.broker.clone(),
            address: address.to_owned(),
            closed: false,
        }))
    }

    async fn new_receiver(&mut self, address: &str) -> Result<Box<dyn Receiver>, TransportError> {
        if self.closed {
            return Err("session is closed".into());
        }

        Ok(Box::new(MemoryReceiver {
            broker: self.broker.clone(),
            address: address.to_owned(),
            next_id: 0,
            unsettled: HashMap::new(),
            closed: false,
        }))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

struct MemorySender {
    broker: Arc<Broker>,
    address: String,
    closed: bool,
}

#[async_trait]
impl Sender for MemorySender {
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        if self.closed {
            return Err("sender link is closed".into());
        }

        self.broker.push_back(&self.address, message);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

struct MemoryReceiver {
    broker: Arc<Broker>,
    address: String,
    next_id: u64,
    unsettled: HashMap<DeliveryId, WireMessage>,
    closed: bool,
}

impl MemoryReceiver {
    fn settle(&mut self, delivery: &Delivery) -> Result<WireMessage, TransportError> {
        if self.closed {
            return Err("receiver link is closed".into());
        }

        self.unsettled
            .remove(&delivery.id)
            .ok_or_else(|| format!("delivery {} is not outstanding", delivery.id.0).into())
    }
}

#[async_trait]
impl Receiver for MemoryReceiver {
    async fn receive(&mut self) -> Result<Delivery, TransportError> {
        loop {
            if self.closed {
                return Err("receiver link is closed".into());
            }

            // Registered before the queue is checked so a concurrent send cannot be missed.
            let notified = self.broker.notify.notified();

            if let Some(message) = self.broker.pop(&self.address) {
                let id = DeliveryId(self.next_id);
                self.next_id += 1;
                self.unsettled.insert(id, message.clone());

                return Ok(Delivery { id, message });
            }

            notified.await;
        }
    }

    async fn accept(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        self.settle(delivery).map(|_| ())
    }

    async fn release(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        let message = self.settle(delivery)?;
        self.broker.push_front(&self.address, message);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Anything still unsettled goes back to the broker, oldest at the head.
        let mut unsettled: Vec<_> = self.unsettled.drain().collect();
        unsettled.sort_by_key(|(id, _)| std::cmp::Reverse(*id));
        for (_, message) in unsettled {
            self.broker.push_front(&self.address, message);
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    async fn link_pair(
        transport: &MemoryTransport,
        address: &str,
    ) -> (Box<dyn Sender>, Box<dyn Receiver>) {
        let mut conn = transport.dial("amqp://local").await.unwrap();
        let mut session = conn.new_session().await.unwrap();
        let sender = session.new_sender(address).await.unwrap();
        let receiver = session.new_receiver(address).await.unwrap();
        (sender, receiver)
    }

    fn message(body: &[u8]) -> WireMessage {
        WireMessage {
            body: body.to_vec(),
            ..WireMessage::default()
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_settles_once() {
        let transport = MemoryTransport::new();
        let (mut sender, mut receiver) = link_pair(&transport, "jobs").await;

        sender.send(message(b"one")).await.unwrap();
        sender.send(message(b"two")).await.unwrap();

        let first = receiver.receive().await.unwrap();
        let second = receiver.receive().await.unwrap();
        assert_eq!(first.message.body, b"one");
        assert_eq!(second.message.body, b"two");
        assert_ne!(first.id, second.id);

        receiver.accept(&first).await.unwrap();
        assert!(receiver.accept(&first).await.is_err());
        assert_eq!(transport.dialed(), vec!["amqp://local".to_owned()]);
    }

    #[tokio::test]
    async fn release_requeues_at_head() {
        let transport = MemoryTransport::new();
        let (mut sender, mut receiver) = link_pair(&transport, "jobs").await;

        sender.send(message(b"one")).await.unwrap();
        sender.send(message(b"two")).await.unwrap();

        let first = receiver.receive().await.unwrap();
        receiver.release(&first).await.unwrap();
        assert_eq!(transport.pending("jobs"), 2);

        let again = receiver.receive().await.unwrap();
        assert_eq!(again.message.body, b"one");
    }

    #[tokio::test]
    async fn close_requeues_unsettled_in_delivery_order() {
        let transport = MemoryTransport::new();
        let (mut sender, mut receiver) = link_pair(&transport, "jobs").await;

        for body in [&b"one"[..], b"two", b"three", b"four"] {
            sender.send(message(body)).await.unwrap();
        }
        for _ in 0..4 {
            receiver.receive().await.unwrap();
        }
        receiver.close().await.unwrap();
        assert_eq!(transport.pending("jobs"), 4);

        let (_, mut next) = link_pair(&transport, "jobs").await;
        let mut bodies = Vec::new();
        for _ in 0..4 {
            bodies.push(next.receive().await.unwrap().message.body);
        }
        assert_eq!(bodies, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec(), b"four".to_vec()]);
    }

    #[tokio::test]
    async fn receive_waits_for_a_send() {
        let transport = MemoryTransport::new();
        let (mut sender, mut receiver) = link_pair(&transport, "jobs").await;

        let waiter = tokio::spawn(async move { receiver.receive().await.map(|d| d.message.body) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        sender.send(message(b"late")).await.unwrap();

        let body = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("timed out waiting for message")
            .unwrap()
            .unwrap();
        assert_eq!(body, b"late");
    }

    #[tokio::test]
    async fn closed_links_reject_operations() {
        let transport = MemoryTransport::new();
        let (mut sender, mut receiver) = link_pair(&transport, "jobs").await;

        sender.close().await.unwrap();
        receiver.close().await.unwrap();

        assert!(sender.send(message(b"x")).await.is_err());
        assert!(receiver.receive().await.is_err());
    }
}
