//! High-level mailer interface.
//!
//! Every public send shape funnels into the same pipeline: build a
//! [`SendRequest`], compose it into a validated message, hand it to the
//! transport. One attempt per call; retry policy belongs to the caller.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    Attachment, MailError, Result, SendRequest, SmtpSettings, SmtpTransport, TemplateEngine,
    Transport,
};

/// High-level mailer for composing and sending emails.
pub struct Mailer {
    transport: Arc<dyn Transport>,
    templates: Option<Arc<TemplateEngine>>,
}

impl Mailer {
    /// Create a mailer delivering over SMTP.
    pub fn smtp(settings: SmtpSettings) -> Result<Self> {
        Ok(Self::new(SmtpTransport::new(settings)?))
    }

    /// Create a mailer with a custom transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            templates: None,
        }
    }

    /// Attach a template engine for [`Mailer::send_template`].
    pub fn with_templates(mut self, engine: Arc<TemplateEngine>) -> Self {
        self.templates = Some(engine);
        self
    }

    /// Compose and deliver a request. The one general operation every other
    /// send shape wraps.
    pub async fn send(&self, request: SendRequest, ct: &CancellationToken) -> Result<()> {
        let email = request.compose()?;

        debug!(
            from = %email.from,
            to = email.to.len(),
            cc = email.cc.len(),
            bcc = email.bcc.len(),
            attachments = email.attachments.len(),
            "sending email"
        );

        self.transport.send(&email, ct).await
    }

    /// Send a plain text email.
    pub async fn send_text(
        &self,
        from_name: &str,
        from_address: &str,
        to: &[&str],
        subject: &str,
        text_body: &str,
        ct: &CancellationToken,
    ) -> Result<()> {
        let request = SendRequest::new(from_name, from_address)
            .to_many(to.iter().copied())
            .subject(subject)
            .text(text_body);
        self.send(request, ct).await
    }

    /// Send an HTML email. The text part is derived from the HTML.
    pub async fn send_html(
        &self,
        from_name: &str,
        from_address: &str,
        to: &[&str],
        subject: &str,
        html_body: &str,
        ct: &CancellationToken,
    ) -> Result<()> {
        let request = SendRequest::new(from_name, from_address)
            .to_many(to.iter().copied())
            .subject(subject)
            .html(html_body);
        self.send(request, ct).await
    }

    /// Send an email carrying text and/or HTML bodies.
    pub async fn send_multipart(
        &self,
        from_name: &str,
        from_address: &str,
        to: &[&str],
        subject: &str,
        html_body: Option<&str>,
        text_body: Option<&str>,
        ct: &CancellationToken,
    ) -> Result<()> {
        let mut request = SendRequest::new(from_name, from_address)
            .to_many(to.iter().copied())
            .subject(subject);
        if let Some(html) = html_body {
            request = request.html(html);
        }
        if let Some(text) = text_body {
            request = request.text(text);
        }
        self.send(request, ct).await
    }

    /// Send an email with CC and BCC recipients.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_with_cc_bcc(
        &self,
        from_name: &str,
        from_address: &str,
        to: &[&str],
        subject: &str,
        html_body: Option<&str>,
        text_body: Option<&str>,
        cc: &[&str],
        bcc: &[&str],
        ct: &CancellationToken,
    ) -> Result<()> {
        self.send_full(
            from_name,
            from_address,
            to,
            subject,
            html_body,
            text_body,
            None,
            cc,
            bcc,
            Vec::new(),
            ct,
        )
        .await
    }

    /// Send an email with attachments.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_with_attachments(
        &self,
        from_name: &str,
        from_address: &str,
        to: &[&str],
        subject: &str,
        html_body: Option<&str>,
        text_body: Option<&str>,
        attachments: Vec<Attachment>,
        cc: &[&str],
        bcc: &[&str],
        ct: &CancellationToken,
    ) -> Result<()> {
        self.send_full(
            from_name,
            from_address,
            to,
            subject,
            html_body,
            text_body,
            None,
            cc,
            bcc,
            attachments,
            ct,
        )
        .await
    }

    /// Send an email with full control: reply-to, CC, BCC and attachments.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_full(
        &self,
        from_name: &str,
        from_address: &str,
        to: &[&str],
        subject: &str,
        html_body: Option<&str>,
        text_body: Option<&str>,
        reply_to: Option<&str>,
        cc: &[&str],
        bcc: &[&str],
        attachments: Vec<Attachment>,
        ct: &CancellationToken,
    ) -> Result<()> {
        let mut request = SendRequest::new(from_name, from_address)
            .to_many(to.iter().copied())
            .subject(subject)
            .attachments(attachments);
        for addr in cc {
            request = request.cc(*addr);
        }
        for addr in bcc {
            request = request.bcc(*addr);
        }
        if let Some(html) = html_body {
            request = request.html(html);
        }
        if let Some(text) = text_body {
            request = request.text(text);
        }
        if let Some(reply_to) = reply_to {
            request = request.reply_to(reply_to);
        }
        self.send(request, ct).await
    }

    /// Render a template source against a model and send the result as the
    /// HTML body of the request.
    ///
    /// Requires a template engine attached via [`Mailer::with_templates`].
    pub async fn send_template(
        &self,
        request: SendRequest,
        source: &str,
        model: &serde_json::Value,
        ct: &CancellationToken,
    ) -> Result<()> {
        let engine = self
            .templates
            .as_ref()
            .ok_or_else(|| MailError::Template("no template engine configured".to_string()))?;

        let html = engine.render(source, model)?;
        self.send(request.html(html), ct).await
    }
}
