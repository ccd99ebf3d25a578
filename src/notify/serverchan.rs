// src/notify/serverchan.rs

use std::future::Future;
use std::pin::Pin;

use anyhow::anyhow;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::errors::Result;
use crate::scheduler::RunReport;

use super::{Notifier, build_content, build_title};

/// Push notifications through ServerChan.
///
/// An empty send key disables the notifier: `send` logs and succeeds.
#[derive(Debug, Clone)]
pub struct ServerChanNotifier {
    send_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl ServerChanNotifier {
    pub fn new(send_key: impl Into<String>) -> Self {
        Self {
            send_key: send_key.into().trim().to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.send_key.is_empty()
    }

    /// Endpoint for this key. `sctp<N>t...` keys use the per-user host.
    pub fn endpoint(&self) -> String {
        endpoint_for(&self.send_key)
    }

    async fn send_inner(&self, report: &RunReport) -> Result<()> {
        if !self.is_enabled() {
            info!("serverchan send key not configured; skipping notification");
            return Ok(());
        }

        let title = build_title(report);
        let body = json!({
            "title": title,
            "desp": build_content(report),
        });

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let reply: SendResponse = response.json().await?;
        if reply.code != 0 {
            error!(code = reply.code, message = %reply.message, "serverchan rejected notification");
            return Err(anyhow!("serverchan error {}: {}", reply.code, reply.message).into());
        }

        info!(%title, "serverchan notification sent");
        Ok(())
    }
}

fn endpoint_for(key: &str) -> String {
    if let Some(rest) = key.strip_prefix("sctp") {
        let num: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if !num.is_empty() {
            return format!("https://{num}.push.ft07.com/send/{key}.send");
        }
    }
    format!("https://sctapi.ftqq.com/{key}.send")
}

impl Notifier for ServerChanNotifier {
    fn send<'a>(
        &'a self,
        report: &'a RunReport,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.send_inner(report))
    }
}
