//! Mail error types.

use thiserror::Error;

/// Result type for mail operations.
pub type Result<T> = std::result::Result<T, MailError>;

/// Mail errors.
///
/// Variants fall into three kinds: validation (rejected before any network
/// I/O), template (parse or strict-render failure), and transport (a failure
/// somewhere in the connect/secure/authenticate/send sequence, carrying the
/// underlying protocol cause).
#[derive(Debug, Error)]
pub enum MailError {
    /// No recipients were given.
    #[error("no recipients")]
    NoRecipients,

    /// Both the text and HTML bodies are empty or absent.
    #[error("empty body")]
    EmptyBody,

    /// A recipient or sender address is not `localpart@domain` shaped.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Template parse or render error.
    #[error("template error: {0}")]
    Template(String),

    /// Attachment could not be loaded.
    #[error("attachment error: {0}")]
    Attachment(String),

    /// Connecting to the SMTP server failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// TLS negotiation failed.
    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    /// The server rejected authentication.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server rejected the message during the send exchange.
    #[error("send rejected: {0}")]
    Send(String),

    /// The MIME message could not be assembled.
    #[error("message assembly failed: {0}")]
    Message(#[from] lettre::error::Error),

    /// The delivery was cancelled by the caller.
    #[error("delivery cancelled")]
    Cancelled,
}

impl MailError {
    /// True for errors raised by composition, before any network I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NoRecipients | Self::EmptyBody | Self::InvalidAddress(_)
        )
    }

    /// True for template parse/render errors.
    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template(_))
    }

    /// True for errors raised while talking to the SMTP server.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect(_)
                | Self::Tls(_)
                | Self::Auth(_)
                | Self::Send(_)
                | Self::Message(_)
                | Self::Cancelled
        )
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::Send(err.to_string())
    }
}
