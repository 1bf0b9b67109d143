use anyhow::Context;
use async_trait::async_trait;

use super::Notifier;

/// Sends notifications as SMS through the Twilio Messages API.
pub struct TwilioSmsNotifier {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioSmsNotifier {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        )
    }
}

#[async_trait]
impl Notifier for TwilioSmsNotifier {
    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn notify(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", &self.from_number), ("Body", body)])
            .send()
            .await
            .with_context(|| format!("failed to send SMS to {to}"))?
            .error_for_status()
            .context("Twilio API returned error")?;

        Ok(())
    }
}
