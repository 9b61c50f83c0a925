//! Email message composition.
//!
//! [`SendRequest`] is the single request-value type every send shape funnels
//! into; [`SendRequest::compose`] validates it and produces the immutable
//! [`Email`] that delivery consumes.

use serde::{Deserialize, Serialize};

use crate::html::html_to_text;
use crate::{Address, Attachment, MailError, Result};

/// Everything a send may carry. Only the sender, recipients, subject and one
/// body are required; the rest is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendRequest {
    /// Sender display name.
    pub from_name: String,
    /// Sender address.
    pub from_address: String,
    /// To recipients.
    pub to: Vec<String>,
    /// CC recipients.
    pub cc: Vec<String>,
    /// BCC recipients.
    pub bcc: Vec<String>,
    /// Reply-To address.
    pub reply_to: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Attachments.
    pub attachments: Vec<Attachment>,
}

impl SendRequest {
    /// Create a request with the sender filled in.
    pub fn new(from_name: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            from_name: from_name.into(),
            from_address: from_address.into(),
            ..Self::default()
        }
    }

    /// Add a To recipient.
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to.push(to.into());
        self
    }

    /// Add multiple To recipients.
    pub fn to_many<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to.extend(recipients.into_iter().map(Into::into));
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        self.cc.push(cc.into());
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, bcc: impl Into<String>) -> Self {
        self.bcc.push(bcc.into());
        self
    }

    /// Set the Reply-To address.
    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Set the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the HTML body.
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Add an attachment.
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Add multiple attachments.
    pub fn attachments<I>(mut self, attachments: I) -> Self
    where
        I: IntoIterator<Item = Attachment>,
    {
        self.attachments.extend(attachments);
        self
    }

    /// Validate the request and build the message.
    ///
    /// Fails before any network I/O: missing recipients, missing body, or a
    /// malformed address reject the whole request. When only an HTML body was
    /// given, the text part is derived from it so text-only clients still get
    /// readable content.
    pub fn compose(self) -> Result<Email> {
        let to = parse_addresses(self.to)?;
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        let text = non_blank(self.text);
        let html = non_blank(self.html);
        if text.is_none() && html.is_none() {
            return Err(MailError::EmptyBody);
        }

        let from = if self.from_name.trim().is_empty() {
            Address::new(self.from_address)?
        } else {
            Address::with_name(self.from_address, self.from_name)?
        };

        let cc = parse_addresses(self.cc)?;
        let bcc = parse_addresses(self.bcc)?;

        let reply_to = match self.reply_to.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(addr) => Some(Address::parse(addr)?),
        };

        // Always carry a text part; derive it when only HTML was supplied.
        let text = match (text, &html) {
            (Some(text), _) => Some(text),
            (None, Some(html)) => Some(html_to_text(html)),
            (None, None) => unreachable!(),
        };

        // Zero-length attachments are dropped here, never stored.
        let attachments: Vec<Attachment> = self
            .attachments
            .into_iter()
            .filter(|a| !a.is_empty())
            .collect();

        Ok(Email {
            from,
            reply_to,
            to,
            cc,
            bcc,
            subject: self.subject,
            text,
            html,
            attachments,
        })
    }
}

/// Parse a recipient list, skipping blank entries.
///
/// A malformed entry fails the whole list; there is no partial message.
fn parse_addresses(raw: Vec<String>) -> Result<Vec<Address>> {
    raw.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(Address::parse)
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// A validated, immutable email message.
///
/// Created once per send by [`SendRequest::compose`]; consumed by the
/// transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    /// Sender address.
    pub from: Address,
    /// Reply-to address.
    pub reply_to: Option<Address>,
    /// To recipients.
    pub to: Vec<Address>,
    /// CC recipients.
    pub cc: Vec<Address>,
    /// BCC recipients.
    pub bcc: Vec<Address>,
    /// Subject line.
    pub subject: String,
    /// Plain text body. Always present after composition.
    pub text: Option<String>,
    /// HTML body.
    pub html: Option<String>,
    /// Attachments, all with non-empty content.
    pub attachments: Vec<Attachment>,
}

impl Email {
    /// Build the SMTP envelope: sender plus the union of To, CC and BCC.
    pub(crate) fn envelope(&self) -> Result<lettre::address::Envelope> {
        let from = self.from.to_lettre()?;
        let rcpts = self
            .to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(Address::to_lettre)
            .collect::<Result<Vec<_>>>()?;

        Ok(lettre::address::Envelope::new(Some(from), rcpts)?)
    }

    /// Render the message to its wire form.
    pub(crate) fn to_lettre(&self) -> Result<lettre::Message> {
        use lettre::message::{Attachment as MimeAttachment, MultiPart, SinglePart};

        let mut builder = lettre::Message::builder()
            .from(self.from.to_mailbox()?)
            .subject(&self.subject);

        for addr in &self.to {
            builder = builder.to(addr.to_mailbox()?);
        }
        for addr in &self.cc {
            builder = builder.cc(addr.to_mailbox()?);
        }
        for addr in &self.bcc {
            builder = builder.bcc(addr.to_mailbox()?);
        }
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.to_mailbox()?);
        }

        let text = self.text.clone().unwrap_or_default();

        // multipart/alternative when both bodies exist, wrapped in
        // multipart/mixed when attachments ride along.
        let message = match (&self.html, self.attachments.is_empty()) {
            (None, true) => builder.singlepart(SinglePart::plain(text))?,
            (Some(html), true) => builder.multipart(MultiPart::alternative_plain_html(
                text,
                html.clone(),
            ))?,
            (html, false) => {
                let mut mixed = match html {
                    Some(html) => MultiPart::mixed()
                        .multipart(MultiPart::alternative_plain_html(text, html.clone())),
                    None => MultiPart::mixed().singlepart(SinglePart::plain(text)),
                };

                for attachment in &self.attachments {
                    // The declared MIME type is part of the message; a bogus
                    // one fails the send rather than mislabel the part.
                    let content_type: lettre::message::header::ContentType =
                        attachment.content_type.parse().map_err(|_| {
                            MailError::Attachment(format!(
                                "invalid content type '{}' for {}",
                                attachment.content_type, attachment.filename
                            ))
                        })?;
                    mixed = mixed.singlepart(
                        MimeAttachment::new(attachment.filename.clone())
                            .body(attachment.data.clone(), content_type),
                    );
                }

                builder.multipart(mixed)?
            }
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> SendRequest {
        SendRequest::new("Alice", "alice@x.com").to("bob@y.com").subject("Hi")
    }

    #[test]
    fn test_text_only() {
        let email = base_request().text("hello").compose().unwrap();
        assert_eq!(email.from.to_string(), "Alice <alice@x.com>");
        assert_eq!(email.to.len(), 1);
        assert_eq!(email.to[0].email, "bob@y.com");
        assert_eq!(email.subject, "Hi");
        assert_eq!(email.text.as_deref(), Some("hello"));
        assert!(email.html.is_none());
    }

    #[test]
    fn test_html_only_derives_text() {
        let email = base_request()
            .html("<p>Hello</p><p>World</p>")
            .compose()
            .unwrap();
        assert_eq!(email.html.as_deref(), Some("<p>Hello</p><p>World</p>"));
        assert_eq!(email.text.as_deref(), Some("Hello\nWorld"));
    }

    #[test]
    fn test_both_bodies_stored_verbatim() {
        let email = base_request()
            .text("plain")
            .html("<b>rich</b>")
            .compose()
            .unwrap();
        assert_eq!(email.text.as_deref(), Some("plain"));
        assert_eq!(email.html.as_deref(), Some("<b>rich</b>"));
    }

    #[test]
    fn test_no_recipients() {
        let err = SendRequest::new("Alice", "alice@x.com")
            .subject("Hi")
            .text("hello")
            .compose()
            .unwrap_err();
        assert!(matches!(err, MailError::NoRecipients));

        // Blank-only recipient lists count as empty too.
        let err = SendRequest::new("Alice", "alice@x.com")
            .to("  ")
            .subject("Hi")
            .text("hello")
            .compose()
            .unwrap_err();
        assert!(matches!(err, MailError::NoRecipients));
    }

    #[test]
    fn test_empty_body() {
        let err = base_request().compose().unwrap_err();
        assert!(matches!(err, MailError::EmptyBody));

        let err = base_request().text("   ").html("").compose().unwrap_err();
        assert!(matches!(err, MailError::EmptyBody));
    }

    #[test]
    fn test_malformed_address_fails_whole_composition() {
        let err = base_request()
            .to("not-an-address")
            .text("hello")
            .compose()
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid address: not-an-address");

        let err = base_request()
            .cc("broken@")
            .text("hello")
            .compose()
            .unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress(_)));
    }

    #[test]
    fn test_misordered_brackets_rejected_not_panicked() {
        let result = base_request()
            .to("Bob> <bob@y.com")
            .text("hello")
            .compose();
        assert!(matches!(result, Err(MailError::InvalidAddress(_))));
    }

    #[test]
    fn test_bad_attachment_content_type_fails_wire_form() {
        let email = base_request()
            .text("hello")
            .attach(Attachment::new("x.bin", "not a mime type", vec![1]))
            .compose()
            .unwrap();
        let err = email.to_lettre().unwrap_err();
        assert!(matches!(err, MailError::Attachment(_)));
    }

    #[test]
    fn test_empty_attachments_dropped_in_order() {
        let email = base_request()
            .text("hello")
            .attach(Attachment::pdf("first.pdf", vec![1]))
            .attach(Attachment::new("empty.bin", "application/octet-stream", Vec::new()))
            .attach(Attachment::png("last.png", vec![2]))
            .compose()
            .unwrap();

        let names: Vec<&str> = email.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["first.pdf", "last.png"]);
    }

    #[test]
    fn test_cc_bcc_reply_to() {
        let email = base_request()
            .text("hello")
            .cc("carol@z.com")
            .bcc("dave@z.com")
            .reply_to("replies@x.com")
            .compose()
            .unwrap();
        assert_eq!(email.cc[0].email, "carol@z.com");
        assert_eq!(email.bcc[0].email, "dave@z.com");
        assert_eq!(email.reply_to.as_ref().unwrap().email, "replies@x.com");
    }

    #[test]
    fn test_envelope_unions_recipients() {
        let email = base_request()
            .text("hello")
            .cc("carol@z.com")
            .bcc("dave@z.com")
            .compose()
            .unwrap();
        let envelope = email.envelope().unwrap();
        assert_eq!(envelope.to().len(), 3);
        assert_eq!(envelope.from().unwrap().to_string(), "alice@x.com");
    }

    #[test]
    fn test_wire_form_builds() {
        let email = base_request()
            .text("plain")
            .html("<b>rich</b>")
            .attach(Attachment::pdf("doc.pdf", vec![1, 2, 3]))
            .compose()
            .unwrap();
        let message = email.to_lettre().unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("doc.pdf"));
    }
}
