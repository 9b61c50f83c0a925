//! Email transport implementations.
//!
//! [`Transport`] is the seam between composition and the wire; the real
//! implementation is [`SmtpTransport`], which walks one fresh connection per
//! delivery through connect, TLS negotiation, authentication, send and
//! disconnect. Each boundary observes the caller's cancellation token, and
//! every exit path releases the connection.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Email, MailError, Result};

/// Port conventionally served with implicit TLS.
const SMTPS_PORT: u16 = 465;

/// Email transport trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a composed message. Exactly one attempt, no retry.
    async fn send(&self, email: &Email, ct: &CancellationToken) -> Result<()>;
}

/// SMTP authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// No authentication (local/dev SMTP servers).
    None,
    /// Username and password.
    #[default]
    Basic,
    /// Username and OAuth2 access token (XOAUTH2).
    OAuth2,
}

/// SMTP server settings.
///
/// Constructed once, never mutated afterwards; safe to share read-only across
/// concurrent deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// SMTP server hostname or IP address.
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether to upgrade the connection with STARTTLS. When false, security
    /// follows whatever the server offers.
    #[serde(default = "default_true")]
    pub use_start_tls: bool,
    /// Authentication mode.
    #[serde(default)]
    pub auth_mode: AuthMode,
    /// Username for Basic or OAuth2 authentication.
    #[serde(default)]
    pub username: String,
    /// Password for Basic authentication.
    #[serde(default)]
    pub password: String,
    /// Access token for OAuth2 authentication.
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

impl SmtpSettings {
    /// Create settings for a host with the submission defaults (port 587,
    /// STARTTLS, no credentials).
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            use_start_tls: true,
            auth_mode: AuthMode::None,
            username: String::new(),
            password: String::new(),
            access_token: None,
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Require a STARTTLS upgrade.
    pub fn starttls(mut self) -> Self {
        self.use_start_tls = true;
        self
    }

    /// Negotiate security automatically per server capability.
    pub fn auto_tls(mut self) -> Self {
        self.use_start_tls = false;
        self
    }

    /// Authenticate with username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_mode = AuthMode::Basic;
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Authenticate with an OAuth2 access token (XOAUTH2).
    pub fn oauth2(mut self, username: impl Into<String>, access_token: impl Into<String>) -> Self {
        self.auth_mode = AuthMode::OAuth2;
        self.username = username.into();
        self.access_token = Some(access_token.into());
        self
    }

    /// Create settings for Gmail.
    pub fn gmail(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new("smtp.gmail.com").credentials(username, password)
    }

    /// Create settings for Outlook/Office365.
    pub fn outlook(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new("smtp.office365.com").credentials(username, password)
    }
}

/// How the connection gets secured, derived from the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Security {
    /// Mandatory STARTTLS upgrade.
    StartTls,
    /// Upgrade iff the server advertises STARTTLS.
    Opportunistic,
    /// Implicit TLS from the first byte (SMTPS port).
    Wrapper,
}

fn security_mode(settings: &SmtpSettings) -> Security {
    if settings.use_start_tls {
        Security::StartTls
    } else if settings.port == SMTPS_PORT {
        Security::Wrapper
    } else {
        Security::Opportunistic
    }
}

/// Pick the authentication exchange for the configured mode, if any.
///
/// `Basic` with an empty username and `OAuth2` without both username and
/// token silently skip authentication (unauthenticated send).
fn auth_exchange(settings: &SmtpSettings) -> Option<(Vec<Mechanism>, Credentials)> {
    match settings.auth_mode {
        AuthMode::None => None,
        AuthMode::Basic => {
            if settings.username.trim().is_empty() {
                None
            } else {
                Some((
                    vec![Mechanism::Plain, Mechanism::Login],
                    Credentials::new(settings.username.clone(), settings.password.clone()),
                ))
            }
        }
        AuthMode::OAuth2 => match settings.access_token.as_deref() {
            Some(token) if !settings.username.trim().is_empty() && !token.trim().is_empty() => {
                Some((
                    vec![Mechanism::Xoauth2],
                    Credentials::new(settings.username.clone(), token.to_string()),
                ))
            }
            _ => None,
        },
    }
}

/// Run one protocol stage, racing it against cancellation.
async fn stage<T, F>(
    ct: &CancellationToken,
    fut: F,
    wrap: fn(String) -> MailError,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, lettre::transport::smtp::Error>>,
{
    tokio::select! {
        biased;
        _ = ct.cancelled() => Err(MailError::Cancelled),
        result = fut => result.map_err(|e| wrap(e.to_string())),
    }
}

/// SMTP transport.
pub struct SmtpTransport {
    settings: SmtpSettings,
    tls: TlsParameters,
    hello_name: ClientId,
}

impl SmtpTransport {
    /// Create a new SMTP transport.
    pub fn new(settings: SmtpSettings) -> Result<Self> {
        let tls =
            TlsParameters::new(settings.host.clone()).map_err(|e| MailError::Tls(e.to_string()))?;

        debug!(
            host = %settings.host,
            port = settings.port,
            auth_mode = ?settings.auth_mode,
            "SMTP transport initialized"
        );

        Ok(Self {
            settings,
            tls,
            hello_name: ClientId::default(),
        })
    }

    /// Get the settings.
    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    async fn connect(&self, ct: &CancellationToken) -> Result<AsyncSmtpConnection> {
        // Implicit TLS is negotiated during connect; STARTTLS comes later.
        let wrapper_tls = match security_mode(&self.settings) {
            Security::Wrapper => Some(self.tls.clone()),
            _ => None,
        };

        stage(
            ct,
            AsyncSmtpConnection::connect_tokio1(
                (self.settings.host.as_str(), self.settings.port),
                None,
                &self.hello_name,
                wrapper_tls,
                None,
            ),
            MailError::Connect,
        )
        .await
    }

    async fn transact(
        &self,
        conn: &mut AsyncSmtpConnection,
        envelope: &lettre::address::Envelope,
        raw: &[u8],
        ct: &CancellationToken,
    ) -> Result<()> {
        // Securing
        match security_mode(&self.settings) {
            Security::StartTls => {
                stage(
                    ct,
                    conn.starttls(self.tls.clone(), &self.hello_name),
                    MailError::Tls,
                )
                .await?;
            }
            Security::Opportunistic if conn.can_starttls() => {
                stage(
                    ct,
                    conn.starttls(self.tls.clone(), &self.hello_name),
                    MailError::Tls,
                )
                .await?;
            }
            _ => {
                if ct.is_cancelled() {
                    return Err(MailError::Cancelled);
                }
            }
        }

        // Authenticating
        match auth_exchange(&self.settings) {
            Some((mechanisms, credentials)) => {
                stage(ct, conn.auth(&mechanisms, &credentials), MailError::Auth).await?;
            }
            None => {
                if ct.is_cancelled() {
                    return Err(MailError::Cancelled);
                }
            }
        }

        // Sending
        let response = stage(ct, conn.send(envelope, raw), MailError::Send).await?;
        debug!(code = %response.code(), "message accepted");
        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, email: &Email, ct: &CancellationToken) -> Result<()> {
        let envelope = email.envelope()?;
        let raw = email.to_lettre()?.formatted();

        if ct.is_cancelled() {
            return Err(MailError::Cancelled);
        }

        debug!(
            host = %self.settings.host,
            to = ?email.to.iter().map(|a| a.email.as_str()).collect::<Vec<_>>(),
            subject = %email.subject,
            "delivering via SMTP"
        );

        // Connecting
        let mut conn = self.connect(ct).await?;

        match self.transact(&mut conn, &envelope, &raw, ct).await {
            Ok(()) => {
                // Disconnecting. The message is already accepted; a failed
                // QUIT gets the socket torn down but not a delivery error.
                if let Err(e) = conn.quit().await {
                    warn!(error = %e, "graceful quit failed after send");
                    conn.abort().await;
                }
                Ok(())
            }
            Err(e) => {
                conn.abort().await;
                Err(e)
            }
        }
    }
}

/// Recording transport for tests.
///
/// Captures every message handed to it instead of touching the network, and
/// can be primed to fail the next delivery.
#[derive(Default)]
pub struct MockTransport {
    sent: std::sync::Mutex<Vec<Email>>,
    fail_next: std::sync::Mutex<Option<MailError>>,
}

impl MockTransport {
    /// Create a new recording transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next delivery fail with the given error.
    pub fn fail_next(&self, error: MailError) {
        *self.fail_next.lock().expect("mock transport poisoned") = Some(error);
    }

    /// All messages delivered so far, in order.
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().expect("mock transport poisoned").clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, email: &Email, ct: &CancellationToken) -> Result<()> {
        if ct.is_cancelled() {
            return Err(MailError::Cancelled);
        }
        if let Some(error) = self.fail_next.lock().expect("mock transport poisoned").take() {
            return Err(error);
        }
        self.sent
            .lock()
            .expect("mock transport poisoned")
            .push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SendRequest;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn test_settings_builder() {
        let settings = SmtpSettings::new("smtp.example.com")
            .port(2525)
            .credentials("user", "pass");

        assert_eq!(settings.host, "smtp.example.com");
        assert_eq!(settings.port, 2525);
        assert_eq!(settings.auth_mode, AuthMode::Basic);
        assert!(settings.use_start_tls);
    }

    #[test]
    fn test_settings_deserialize_defaults() {
        let settings: SmtpSettings =
            serde_json::from_str(r#"{"host": "mail.example.com"}"#).unwrap();
        assert_eq!(settings.port, 587);
        assert!(settings.use_start_tls);
        assert_eq!(settings.auth_mode, AuthMode::Basic);
        assert!(settings.username.is_empty());
    }

    #[test]
    fn test_security_mode() {
        let starttls = SmtpSettings::new("h");
        assert_eq!(security_mode(&starttls), Security::StartTls);

        let auto = SmtpSettings::new("h").auto_tls();
        assert_eq!(security_mode(&auto), Security::Opportunistic);

        let smtps = SmtpSettings::new("h").auto_tls().port(465);
        assert_eq!(security_mode(&smtps), Security::Wrapper);
    }

    #[test]
    fn test_auth_none_performs_no_exchange() {
        let settings = SmtpSettings::new("h");
        assert!(auth_exchange(&settings).is_none());
    }

    #[test]
    fn test_auth_basic_empty_username_skips() {
        let mut settings = SmtpSettings::new("h");
        settings.auth_mode = AuthMode::Basic;
        assert!(auth_exchange(&settings).is_none());

        let settings = SmtpSettings::new("h").credentials("user", "pass");
        let (mechanisms, _) = auth_exchange(&settings).unwrap();
        assert_eq!(mechanisms, vec![Mechanism::Plain, Mechanism::Login]);
    }

    #[test]
    fn test_auth_oauth2_single_xoauth2_exchange() {
        let settings = SmtpSettings::new("h").oauth2("user@example.com", "token");
        let (mechanisms, _) = auth_exchange(&settings).unwrap();
        assert_eq!(mechanisms, vec![Mechanism::Xoauth2]);

        // Missing token: silently unauthenticated.
        let mut settings = SmtpSettings::new("h");
        settings.auth_mode = AuthMode::OAuth2;
        settings.username = "user@example.com".into();
        assert!(auth_exchange(&settings).is_none());

        // Missing username: same.
        let mut settings = SmtpSettings::new("h");
        settings.auth_mode = AuthMode::OAuth2;
        settings.access_token = Some("token".into());
        assert!(auth_exchange(&settings).is_none());
    }

    fn test_email() -> Email {
        SendRequest::new("Alice", "alice@x.com")
            .to("bob@y.com")
            .subject("Hi")
            .text("hello")
            .compose()
            .unwrap()
    }

    /// Transport settings for a scripted plaintext server: security follows
    /// the EHLO capabilities, and the scripts never advertise STARTTLS.
    fn local_settings(addr: std::net::SocketAddr) -> SmtpSettings {
        SmtpSettings::new(addr.ip().to_string())
            .port(addr.port())
            .auto_tls()
    }

    #[tokio::test]
    async fn test_delivery_walks_full_dialogue() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut verbs = Vec::new();

            write.write_all(b"220 test ESMTP\r\n").await.unwrap();
            loop {
                let line = match lines.next_line().await.unwrap() {
                    Some(line) => line,
                    None => break,
                };
                let verb = line.split_whitespace().next().unwrap_or("").to_string();
                let verb = verb.split(':').next().unwrap_or("").to_string();
                verbs.push(verb.clone());
                match verb.as_str() {
                    "EHLO" => write.write_all(b"250 test\r\n").await.unwrap(),
                    "MAIL" | "RCPT" => write.write_all(b"250 OK\r\n").await.unwrap(),
                    "DATA" => {
                        write.write_all(b"354 go ahead\r\n").await.unwrap();
                        while lines.next_line().await.unwrap().as_deref() != Some(".") {}
                        write.write_all(b"250 queued\r\n").await.unwrap();
                    }
                    "QUIT" => {
                        write.write_all(b"221 bye\r\n").await.unwrap();
                        break;
                    }
                    other => panic!("unexpected command: {other}"),
                }
            }
            verbs
        });

        let transport = SmtpTransport::new(local_settings(addr)).unwrap();
        let ct = CancellationToken::new();
        transport.send(&test_email(), &ct).await.unwrap();

        let verbs = server.await.unwrap();
        assert_eq!(verbs, ["EHLO", "MAIL", "RCPT", "DATA", "QUIT"]);
    }

    #[tokio::test]
    async fn test_rejected_send_surfaces_error_and_releases_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();

            write.write_all(b"220 test ESMTP\r\n").await.unwrap();
            let ehlo = lines.next_line().await.unwrap().unwrap();
            assert!(ehlo.starts_with("EHLO"));
            write.write_all(b"250 test\r\n").await.unwrap();

            let mail = lines.next_line().await.unwrap().unwrap();
            assert!(mail.starts_with("MAIL"));
            write.write_all(b"554 5.7.1 rejected\r\n").await.unwrap();

            // Answer the teardown QUIT and drain to EOF; reaching EOF means
            // the connection was released.
            while let Ok(Some(line)) = lines.next_line().await {
                if line.starts_with("QUIT") {
                    let _ = write.write_all(b"221 bye\r\n").await;
                }
            }
        });

        let transport = SmtpTransport::new(local_settings(addr)).unwrap();
        let ct = CancellationToken::new();
        let err = transport.send(&test_email(), &ct).await.unwrap_err();
        assert!(matches!(err, MailError::Send(_)));

        // The server task only finishes once the client socket hits EOF.
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_stage_observes_cancellation() {
        let ct = CancellationToken::new();
        ct.cancel();

        let result = stage(
            &ct,
            std::future::pending::<std::result::Result<(), lettre::transport::smtp::Error>>(),
            MailError::Send,
        )
        .await;
        assert!(matches!(result, Err(MailError::Cancelled)));
    }
}
