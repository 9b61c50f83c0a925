//! # Courier
//!
//! Email composition and SMTP delivery with cached template rendering.
//!
//! ## Features
//!
//! - **Composition**: validated messages with text/HTML bodies, CC/BCC,
//!   reply-to and attachments, plus an automatic plain-text fallback derived
//!   from HTML
//! - **SMTP delivery**: one fresh connection per send, STARTTLS or implicit
//!   TLS, Basic or OAuth2 (XOAUTH2) authentication, caller cancellation
//! - **Templates**: Handlebars rendering with a concurrent compile cache
//!   keyed by source text
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::{Mailer, SendRequest, SmtpSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SmtpSettings::new("smtp.example.com")
//!         .credentials("user@example.com", "password");
//!     let mailer = Mailer::smtp(settings)?;
//!
//!     let request = SendRequest::new("Alice", "alice@example.com")
//!         .to("bob@example.com")
//!         .subject("Hello")
//!         .html("<h1>Hello!</h1><p>This is a test email.</p>");
//!
//!     mailer.send(request, &CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## With Templates
//!
//! ```rust,ignore
//! use courier::TemplateEngine;
//! use serde_json::json;
//!
//! let engine = TemplateEngine::new();
//! let body = engine.render(
//!     "<p>Hi {{name}}, your order {{order_id}} shipped.</p>",
//!     &json!({"name": "Bob", "order_id": 8231}),
//! )?;
//! ```

mod address;
mod attachment;
mod email;
mod error;
mod html;
mod mailer;
mod template;
mod transport;

pub use address::{Address, IntoAddress};
pub use attachment::Attachment;
pub use email::{Email, SendRequest};
pub use error::{MailError, Result};
pub use html::html_to_text;
pub use mailer::Mailer;
pub use template::TemplateEngine;
pub use transport::{AuthMode, MockTransport, SmtpSettings, SmtpTransport, Transport};

/// Prelude for common imports.
///
/// ```
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use crate::address::{Address, IntoAddress};
    pub use crate::attachment::Attachment;
    pub use crate::email::{Email, SendRequest};
    pub use crate::error::{MailError, Result};
    pub use crate::mailer::Mailer;
    pub use crate::template::TemplateEngine;
    pub use crate::transport::{AuthMode, SmtpSettings, SmtpTransport, Transport};
    pub use tokio_util::sync::CancellationToken;
}
