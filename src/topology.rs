// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Topology
//!
//! Every publisher and subscriber owns exactly one connection, one session on
//! that connection and one link on that session. This module opens the three
//! in order and tears them down in reverse.
//!
//! Opening is all-or-nothing: if a later step fails, everything opened before
//! it is closed before the error is returned.

use crate::{
    errors::MessagingError,
    transport::{Connection, Receiver, Sender, Session, Transport, TransportError},
};
use tracing::{debug, error, warn};

/// A connection, its session and one link attached to that session.
pub(crate) struct LinkTopology<L> {
    connection: Box<dyn Connection>,
    session: Box<dyn Session>,
    pub(crate) link: L,
}

impl LinkTopology<Box<dyn Sender>> {
    /// Dials `conn_str`, begins a session and attaches a sender to `address`.
    pub(crate) async fn open_sender(
        transport: &dyn Transport,
        conn_str: &str,
        address: &str,
    ) -> Result<Self, MessagingError> {
        let (connection, mut session) = open_session(transport, conn_str).await?;

        debug!(address, "attaching sender link...");
        match session.new_sender(address).await {
            Ok(link) => {
                debug!(address, "sender link attached");
                Ok(LinkTopology {
                    connection,
                    session,
                    link,
                })
            }
            Err(err) => {
                error!(error = err.to_string(), address, "failure to attach sender link");
                rollback(connection, Some(session)).await;
                Err(MessagingError::ConnectionFailed(err))
            }
        }
    }

    /// Closes the sender, then the session, then the connection.
    pub(crate) async fn close(mut self) -> Result<(), MessagingError> {
        let link = self.link.close().await;
        self.shutdown(link).await
    }
}

impl LinkTopology<Box<dyn Receiver>> {
    /// Dials `conn_str`, begins a session and attaches a receiver to `address`.
    pub(crate) async fn open_receiver(
        transport: &dyn Transport,
        conn_str: &str,
        address: &str,
    ) -> Result<Self, MessagingError> {
        let (connection, mut session) = open_session(transport, conn_str).await?;

        debug!(address, "attaching receiver link...");
        match session.new_receiver(address).await {
            Ok(link) => {
                debug!(address, "receiver link attached");
                Ok(LinkTopology {
                    connection,
                    session,
                    link,
                })
            }
            Err(err) => {
                error!(error = err.to_string(), address, "failure to attach receiver link");
                rollback(connection, Some(session)).await;
                Err(MessagingError::ConnectionFailed(err))
            }
        }
    }

    /// Closes the receiver, then the session, then the connection.
    pub(crate) async fn close(mut self) -> Result<(), MessagingError> {
        let link = self.link.close().await;
        self.shutdown(link).await
    }
}

impl<L> LinkTopology<L> {
    /// Closes the session and the connection after the link was closed.
    ///
    /// Every close is attempted; the first failure, in link, session,
    /// connection order, is returned.
    async fn shutdown(mut self, link: Result<(), TransportError>) -> Result<(), MessagingError> {
        let session = self.session.close().await;
        let connection = self.connection.close().await;

        let mut first = None;
        for (name, result) in [("link", link), ("session", session), ("connection", connection)] {
            if let Err(err) = result {
                error!(error = err.to_string(), "failure to close {}", name);
                first.get_or_insert(err);
            }
        }

        match first {
            Some(err) => Err(MessagingError::ConnectionFailed(err)),
            None => {
                debug!("link, session and connection closed");
                Ok(())
            }
        }
    }
}

async fn open_session(
    transport: &dyn Transport,
    conn_str: &str,
) -> Result<(Box<dyn Connection>, Box<dyn Session>), MessagingError> {
    debug!("creating amqp connection...");
    let mut connection = match transport.dial(conn_str).await {
        Ok(c) => c,
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            return Err(MessagingError::ConnectionFailed(err));
        }
    };
    debug!("amqp connected");

    debug!("creating amqp session...");
    match connection.new_session().await {
        Ok(session) => {
            debug!("session created");
            Ok((connection, session))
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to create the session");
            rollback(connection, None).await;
            Err(MessagingError::ConnectionFailed(err))
        }
    }
}

/// Closes whatever was opened before a setup step failed.
async fn rollback(mut connection: Box<dyn Connection>, session: Option<Box<dyn Session>>) {
    if let Some(mut session) = session {
        if let Err(err) = session.close().await {
            warn!(error = err.to_string(), "failure to close session during rollback");
        }
    }

    if let Err(err) = connection.close().await {
        warn!(error = err.to_string(), "failure to close connection during rollback");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::transport::{
        MockConnection, MockReceiver, MockSender, MockSession, MockTransport,
    };
    use mockall::Sequence;

    fn transport_with(connection: MockConnection) -> MockTransport {
        let mut transport = MockTransport::new();
        transport
            .expect_dial()
            .withf(|addr| addr == "amqps://u:p@host:5671")
            .return_once(move |_| Ok(Box::new(connection)));
        transport
    }

    #[tokio::test]
    async fn receiver_failure_closes_session_and_connection() {
        let mut seq = Sequence::new();

        let mut session = MockSession::new();
        session
            .expect_new_receiver()
            .times(1)
            .returning(|_| Err("link refused".into()));
        session
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut connection = MockConnection::new();
        connection
            .expect_new_session()
            .return_once(move || Ok(Box::new(session)));
        connection
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let transport = transport_with(connection);

        let err = LinkTopology::open_receiver(&transport, "amqps://u:p@host:5671", "q")
            .await
            .err()
            .unwrap();

        assert!(err.is(ErrorKind::ConnectionFailed));
        assert_eq!(
            std::error::Error::source(&err).map(|s| s.to_string()),
            Some("link refused".to_owned())
        );
    }

    #[tokio::test]
    async fn sender_failure_closes_session_and_connection() {
        let mut session = MockSession::new();
        session
            .expect_new_sender()
            .times(1)
            .returning(|_| Err("not found".into()));
        session.expect_close().times(1).returning(|| Ok(()));

        let mut connection = MockConnection::new();
        connection
            .expect_new_session()
            .return_once(move || Ok(Box::new(session)));
        connection.expect_close().times(1).returning(|| Ok(()));

        let transport = transport_with(connection);

        let err = LinkTopology::open_sender(&transport, "amqps://u:p@host:5671", "topic://orders")
            .await
            .err()
            .unwrap();

        assert!(err.is(ErrorKind::ConnectionFailed));
    }

    #[tokio::test]
    async fn session_failure_closes_connection() {
        let mut connection = MockConnection::new();
        connection
            .expect_new_session()
            .returning(|| Err("no channel".into()));
        connection.expect_close().times(1).returning(|| Ok(()));

        let transport = transport_with(connection);

        let err = LinkTopology::open_sender(&transport, "amqps://u:p@host:5671", "q")
            .await
            .err()
            .unwrap();

        assert!(err.is(ErrorKind::ConnectionFailed));
    }

    #[tokio::test]
    async fn dial_failure_is_connection_failed() {
        let mut transport = MockTransport::new();
        transport
            .expect_dial()
            .returning(|_| Err("connection refused".into()));

        let err = LinkTopology::open_receiver(&transport, "amqp://nowhere", "q")
            .await
            .err()
            .unwrap();

        assert!(err.is(ErrorKind::ConnectionFailed));
    }

    #[tokio::test]
    async fn close_attempts_every_step_and_keeps_first_error() {
        let mut seq = Sequence::new();

        let mut sender = MockSender::new();
        sender
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err("detach timed out".into()));

        let mut session = MockSession::new();
        session
            .expect_new_sender()
            .return_once(move |_| Ok(Box::new(sender)));
        session
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err("end refused".into()));

        let mut connection = MockConnection::new();
        connection
            .expect_new_session()
            .return_once(move || Ok(Box::new(session)));
        connection
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let transport = transport_with(connection);

        let topology = LinkTopology::open_sender(&transport, "amqps://u:p@host:5671", "q")
            .await
            .ok()
            .unwrap();

        let err = topology.close().await.unwrap_err();
        assert!(err.is(ErrorKind::ConnectionFailed));
        assert_eq!(
            std::error::Error::source(&err).map(|s| s.to_string()),
            Some("detach timed out".to_owned())
        );
    }

    #[tokio::test]
    async fn receiver_close_order() {
        let mut seq = Sequence::new();

        let mut receiver = MockReceiver::new();
        receiver
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut session = MockSession::new();
        session
            .expect_new_receiver()
            .return_once(move |_| Ok(Box::new(receiver)));
        session
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut connection = MockConnection::new();
        connection
            .expect_new_session()
            .return_once(move || Ok(Box::new(session)));
        connection
            .expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let transport = transport_with(connection);

        let topology = LinkTopology::open_receiver(&transport, "amqps://u:p@host:5671", "q")
            .await
            .ok()
            .unwrap();

        assert!(topology.close().await.is_ok());
    }
}
