use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use artiverse_core::notification::{EmailMessage, Mailer};
use artiverse_core::{CoreError, CoreResult};
use artiverse_shared::Masked;

const USER_AGENT: &str = concat!("artiverse/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

/// Delivers mail through a JSON send endpoint authenticated with a bearer key
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: &str, from: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> CoreResult<()> {
        let body = SendRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.text,
            html: &message.html,
            reply_to: message.reply_to.as_deref(),
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Internal(format!("mail provider unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!("Mail provider rejected message to {}: {} {}", Masked(message.to.as_str()), status, detail);
            return Err(CoreError::Internal(format!("mail provider returned {}", status)));
        }

        info!("Email sent to {}: {}", Masked(message.to.as_str()), message.subject);
        Ok(())
    }
}
