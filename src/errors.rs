// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Provider Layer
//!
//! Every failure this crate reports is classified into exactly one [`ErrorKind`].
//! Transport failures keep their original cause, reachable through
//! [`std::error::Error::source`], so callers can log the broker's own message
//! while branching on the kind. The cause is never repeated in the variant's
//! own message; reporters walking the source chain print it once.

use thiserror::Error;

/// Boxed cause carried by the transport-facing error variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of a [`MessagingError`].
///
/// Compare kinds instead of inspecting error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionFailed,
    PublishFailed,
    ReceiveFailed,
    AckFailed,
    Closed,
    UnsupportedProvider,
    InvalidConfig,
}

/// Represents errors that can occur while talking to an AMQP 1.0 broker.
#[derive(Error, Debug)]
pub enum MessagingError {
    /// Caller supplied configuration failed validation
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// No factory is registered for the requested provider
    #[error("unsupported provider `{0}`")]
    UnsupportedProvider(String),

    /// Dialing, opening a session or attaching a link failed
    #[error("failure to connect")]
    ConnectionFailed(#[source] BoxError),

    /// A single send attempt failed
    #[error("failure to publish")]
    PublishFailed(#[source] BoxError),

    /// Receiving the next message failed
    #[error("failure to receive")]
    ReceiveFailed(#[source] BoxError),

    /// Settling a message failed or its acknowledgment token was unusable
    #[error("failure to settle message")]
    AckFailed(#[source] BoxError),

    /// The publisher or subscriber was already closed, or the broker closed
    /// the connection underneath it
    #[error("connection closed")]
    Closed(#[source] Option<BoxError>),
}

impl MessagingError {
    /// Composes an error of the given kind around `cause`.
    ///
    /// Kinds that carry a message rather than a cause keep the cause's text.
    ///
    /// # Parameters
    /// * `kind` - Classification of the new error
    /// * `cause` - Underlying failure, kept as the error source
    ///
    /// # Returns
    /// An error for which `is(kind)` holds
    pub fn wrap(kind: ErrorKind, cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        match kind {
            ErrorKind::ConnectionFailed => MessagingError::ConnectionFailed(cause),
            ErrorKind::PublishFailed => MessagingError::PublishFailed(cause),
            ErrorKind::ReceiveFailed => MessagingError::ReceiveFailed(cause),
            ErrorKind::AckFailed => MessagingError::AckFailed(cause),
            ErrorKind::Closed => MessagingError::Closed(Some(cause)),
            ErrorKind::UnsupportedProvider => {
                MessagingError::UnsupportedProvider(cause.to_string())
            }
            ErrorKind::InvalidConfig => MessagingError::InvalidConfig(cause.to_string()),
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MessagingError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            MessagingError::UnsupportedProvider(_) => ErrorKind::UnsupportedProvider,
            MessagingError::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            MessagingError::PublishFailed(_) => ErrorKind::PublishFailed,
            MessagingError::ReceiveFailed(_) => ErrorKind::ReceiveFailed,
            MessagingError::AckFailed(_) => ErrorKind::AckFailed,
            MessagingError::Closed(_) => ErrorKind::Closed,
        }
    }

    /// Returns true when this error belongs to `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

/// Wraps an optional cause; an absent cause yields no error.
pub fn wrap_error<E>(kind: ErrorKind, cause: Option<E>) -> Option<MessagingError>
where
    E: Into<BoxError>,
{
    cause.map(|cause| MessagingError::wrap(kind, cause))
}
