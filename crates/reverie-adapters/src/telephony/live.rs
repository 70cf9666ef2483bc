//! Live telephony provider client (REST over HTTPS)

use std::time::Duration;

use async_trait::async_trait;
use reverie_core::{PhoneNumber, ProviderCallSid};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{with_retries, AdapterError, Result};

use super::{InstructionSet, Telephony};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// REST client for the telephony provider's call API.
///
/// `place_call` is synchronous at the provider: the SID comes back in the
/// HTTP response before the provider begins ringing the callee, so webhooks
/// can always resolve a persisted row.
pub struct HttpTelephony {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

impl HttpTelephony {
    pub fn new(
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.api_base, self.account_sid
        )
    }

    fn call_url(&self, sid: &ProviderCallSid) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.api_base, self.account_sid, sid
        )
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AdapterError::from_status(status.as_u16(), "telephony"));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Telephony for HttpTelephony {
    async fn place_call(
        &self,
        to: &PhoneNumber,
        from: &PhoneNumber,
        answer_url: &str,
        status_url: &str,
    ) -> Result<ProviderCallSid> {
        let url = self.calls_url();
        let url = url.as_str();
        let resource: CallResource = with_retries(RETRY_ATTEMPTS, RETRY_BASE_DELAY, || async move {
            let resp = self
                .post_form(
                    url,
                    &[
                        ("To", to.as_str()),
                        ("From", from.as_str()),
                        ("Url", answer_url),
                        ("StatusCallback", status_url),
                        ("StatusCallbackMethod", "POST"),
                    ],
                )
                .await?;
            resp.json().await.map_err(AdapterError::from)
        })
        .await?;

        info!("📞 Placed call {} to {}", resource.sid, to);
        Ok(ProviderCallSid(resource.sid))
    }

    async fn end_call(&self, sid: &ProviderCallSid) -> Result<()> {
        let url = self.call_url(sid);
        let url = url.as_str();
        let result = with_retries(RETRY_ATTEMPTS, RETRY_BASE_DELAY, || async move {
            self.post_form(url, &[("Status", "completed")]).await?;
            Ok(())
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            // The call may already be gone; ending it twice is a no-op.
            Err(AdapterError::Permanent(msg)) if msg.contains("404") => {
                debug!("end_call on already-ended {sid}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn send_instructions(
        &self,
        sid: &ProviderCallSid,
        instructions: InstructionSet,
    ) -> Result<()> {
        let document = instructions.to_xml()?;
        let url = self.call_url(sid);
        let url = url.as_str();
        let document = document.as_str();

        with_retries(RETRY_ATTEMPTS, RETRY_BASE_DELAY, || async move {
            self.post_form(url, &[("Twiml", document)]).await?;
            Ok(())
        })
        .await?;

        debug!("Pushed {} actions into call {sid}", instructions.actions.len());
        Ok(())
    }
}
