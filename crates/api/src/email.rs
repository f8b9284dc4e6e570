//! Outbound email
//!
//! Delivery goes through the Resend HTTP API when `RESEND_API_KEY` is set.
//! Without it, messages are only logged (recipient and kind, never the code).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailTemplate {
    ActivateAccount,
}

impl EmailTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailTemplate::ActivateAccount => "activate_account",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub recipient_name: String,
    pub template: EmailTemplate,
    pub action_url: String,
    pub code: String,
    pub subject: String,
}

impl EmailMessage {
    /// Plain-text body; the only place a code is written out
    pub fn text_body(&self) -> String {
        match self.template {
            EmailTemplate::ActivateAccount => format!(
                "Hello {},\n\n\
                 Your account activation code is: {}\n\n\
                 Enter it at {} within 15 minutes to activate your account.\n",
                self.recipient_name, self.code, self.action_url
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Email transport error: {0}")]
    Transport(String),
    #[error("Email provider rejected message with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

pub type SharedEmailSender = Arc<dyn EmailSender>;

#[derive(Clone)]
pub struct ResendEmailSender {
    client: Client,
    api_key: String,
    from: String,
}

impl ResendEmailSender {
    pub fn new(client: Client, api_key: String, from: String) -> Self {
        Self {
            client,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let payload = json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "text": message.text_body(),
            "tags": [{ "name": "template", "value": message.template.as_str() }],
        });

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                template = message.template.as_str(),
                "Resend rejected email"
            );
            return Err(EmailError::Rejected(status.as_u16()));
        }

        tracing::info!(
            to = %message.to,
            template = message.template.as_str(),
            "Email sent"
        );
        Ok(())
    }
}

/// Stand-in used when no provider is configured
#[derive(Debug, Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        tracing::warn!(
            to = %message.to,
            template = message.template.as_str(),
            "Email delivery not configured, message dropped"
        );
        Ok(())
    }
}

pub fn sender_from_config(
    api_key: Option<&str>,
    from: &str,
    client: Client,
) -> SharedEmailSender {
    match api_key {
        Some(key) => {
            tracing::info!("Email delivery enabled via Resend");
            Arc::new(ResendEmailSender::new(
                client,
                key.to_string(),
                from.to_string(),
            ))
        }
        None => {
            tracing::warn!("Email delivery not configured (missing RESEND_API_KEY)");
            Arc::new(LogEmailSender)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "alice@example.com".to_string(),
            recipient_name: "Alice Liddell".to_string(),
            template: EmailTemplate::ActivateAccount,
            action_url: "http://localhost:4200/activate-account".to_string(),
            code: "123456".to_string(),
            subject: "Account activation".to_string(),
        }
    }

    #[test]
    fn test_text_body_carries_code_and_link() {
        let body = message().text_body();
        assert!(body.contains("Alice Liddell"));
        assert!(body.contains("123456"));
        assert!(body.contains("http://localhost:4200/activate-account"));
    }

    #[test]
    fn test_template_serializes_as_enum_name() {
        let value = serde_json::to_value(EmailTemplate::ActivateAccount).unwrap();
        assert_eq!(value, json!("ACTIVATE_ACCOUNT"));
    }

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        assert!(LogEmailSender.send(&message()).await.is_ok());
    }
}
