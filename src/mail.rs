//! Outgoing mail
//!
//! Account flows hand a [`MailMessage`] to the [`Mailer`], which delivers it on
//! a background task and returns immediately. Nothing flows back into the
//! request: a failed delivery is logged and dropped, never retried here.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::db::users::UserRow;

/// A rendered message ready for a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

/// Which account mail to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    ConfirmUser,
    ResetPassword,
    ChangeEmail,
}

impl Template {
    pub fn name(self) -> &'static str {
        match self {
            Template::ConfirmUser => "confirm_user",
            Template::ResetPassword => "reset_password",
            Template::ChangeEmail => "change_email",
        }
    }

    fn action(self, user: &UserRow) -> (String, &'static str) {
        match self {
            Template::ConfirmUser => (
                "/auth/confirm".to_string(),
                "Welcome! Please confirm your account",
            ),
            Template::ResetPassword => (
                format!("/auth/reset-password?name={}", user.name),
                "To reset your password",
            ),
            Template::ChangeEmail => (
                "/auth/confirm".to_string(),
                "To confirm your new email address",
            ),
        }
    }
}

/// Render `template` for `user` with the token embedded
pub fn render(sender: &str, user: &UserRow, recipient: &str, template: Template, token: &str) -> MailMessage {
    let (path, lead) = template.action(user);

    let text_body = format!(
        "Dear {name},\n\n{lead}, submit this token to {path}:\n\n{token}\n\n\
         The token expires after a limited time.\n\nSincerely,\nThe Weblog Team\n",
        name = user.name,
        lead = lead,
        path = path,
        token = token,
    );
    let html_body = format!(
        "<p>Dear {name},</p>\n<p>{lead}, submit this token to <code>{path}</code>:</p>\n\
         <pre>{token}</pre>\n<p>The token expires after a limited time.</p>\n\
         <p>Sincerely,<br>The Weblog Team</p>\n",
        name = user.name,
        lead = lead,
        path = path,
        token = token,
    );

    MailMessage {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        subject: format!("To: {}", user.name),
        text_body,
        html_body,
    }
}

/// Delivery backend
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: &MailMessage) -> Result<(), String>;
}

/// Logs each message instead of sending it
#[derive(Debug, Default, Clone)]
pub struct TracingTransport;

#[async_trait::async_trait]
impl MailTransport for TracingTransport {
    async fn deliver(&self, message: &MailMessage) -> Result<(), String> {
        info!(
            recipient = %message.recipient,
            subject = %message.subject,
            bytes = message.text_body.len() + message.html_body.len(),
            "Mail delivered (tracing transport)"
        );
        Ok(())
    }
}

/// Fire-and-forget front of a [`MailTransport`]
#[derive(Clone)]
pub struct Mailer {
    sender: String,
    transport: Arc<dyn MailTransport>,
}

impl Mailer {
    pub fn new(sender: impl Into<String>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            sender: sender.into(),
            transport,
        }
    }

    /// Mailer that only logs
    pub fn tracing(sender: impl Into<String>) -> Self {
        Self::new(sender, Arc::new(TracingTransport))
    }

    /// Render and queue an account mail
    pub fn send_template(
        &self,
        user: &UserRow,
        recipient: &str,
        template: Template,
        token: &str,
    ) -> Option<JoinHandle<()>> {
        let message = render(&self.sender, user, recipient, template, token);
        info!(user_id = user.id, template = template.name(), "Queueing account mail");
        self.send(message)
    }

    /// Queue a message on a background task.
    ///
    /// Returns the task handle, or None when called outside a Tokio runtime
    /// (the message is dropped with a warning).
    pub fn send(&self, message: MailMessage) -> Option<JoinHandle<()>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(recipient = %message.recipient, "No async runtime; mail dropped");
                return None;
            }
        };

        let transport = Arc::clone(&self.transport);
        Some(handle.spawn(async move {
            if let Err(e) = transport.deliver(&message).await {
                warn!(recipient = %message.recipient, error = %e, "Mail delivery failed");
            }
        }))
    }
}
