use crate::cli::globals::GlobalArgs;
use crate::session::APP_USER_AGENT;
use anyhow::{anyhow, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::{
    future::Future,
    pin::Pin,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

/// Clock-skew allowance when comparing message delivery times against the
/// not-before boundary.
const SKEW_TOLERANCE: Duration = Duration::from_secs(10);

/// Inbox poll spacing.
const POLL_INTERVAL: Duration = Duration::from_secs(3);

static STRONG_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<strong\b[^>]*>(.*?)</strong>").unwrap());
static SIX_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{6})\b").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[^>]+>").unwrap());

/// Where freshly issued verification codes come from.
///
/// Implementations must only return codes whose message was delivered after
/// `not_before` (minus a small skew tolerance) and must give up once
/// `timeout` elapses.
pub trait OtpSource: Send + Sync {
    fn fetch_code(
        &self,
        not_before: SystemTime,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

#[derive(Debug, Deserialize)]
struct RelayMessage {
    /// epoch ms when the message reached the inbox
    received_at_ms: u64,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body_b64url: Option<String>,
}

impl RelayMessage {
    fn code(&self) -> Option<String> {
        let mut text = String::new();

        if let Some(subject) = &self.subject {
            text.push_str(subject);
            text.push('\n');
        }

        if let Some(body) = &self.body_b64url {
            match Base64UrlUnpadded::decode_vec(body) {
                Ok(bytes) => text.push_str(&String::from_utf8_lossy(&bytes)),
                Err(e) => debug!("undecodable message body: {e}"),
            }
        }

        extract_code(&text)
    }
}

/// Polls an inbox relay that exposes recent verification-code emails.
#[derive(Debug)]
pub struct RelayOtpSource {
    client: Client,
    url: String,
}

impl RelayOtpSource {
    pub fn new(globals: &GlobalArgs) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: globals.inbox_relay_url.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn poll(&self, not_before: SystemTime, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let not_before_ms = not_before
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_millis() as u64);

        while Instant::now() < deadline {
            match self.fetch_messages().await {
                Ok(messages) => {
                    for message in messages {
                        if !fresh_enough(message.received_at_ms, not_before_ms) {
                            continue;
                        }

                        if let Some(code) = message.code() {
                            debug!("verification code found");
                            return Ok(code);
                        }
                    }
                }
                Err(e) => warn!("inbox relay error: {e}"),
            }

            sleep(POLL_INTERVAL).await;
        }

        Err(anyhow!("timed out waiting for a verification code"))
    }

    async fn fetch_messages(&self) -> Result<Vec<RelayMessage>> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("inbox relay returned {}", response.status()));
        }

        Ok(response.json().await?)
    }
}

impl OtpSource for RelayOtpSource {
    fn fetch_code(
        &self,
        not_before: SystemTime,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(self.poll(not_before, timeout))
    }
}

/// A message is eligible when it arrived after the boundary, allowing a
/// small skew window.
const fn fresh_enough(received_at_ms: u64, not_before_ms: u64) -> bool {
    received_at_ms + SKEW_TOLERANCE.as_millis() as u64 > not_before_ms
}

/// Extract the six-digit code from an email, preferring the second
/// `<strong>` run where the portal's template puts it.
pub(crate) fn extract_code(input: &str) -> Option<String> {
    let strongs: Vec<String> = STRONG_RUN
        .captures_iter(input)
        .map(|capture| html_decode(&capture[1]))
        .collect();

    if strongs.len() >= 2 {
        if let Some(code) = six_digits(&strongs[1]) {
            return Some(code);
        }
    }

    for run in &strongs {
        if let Some(code) = six_digits(run) {
            return Some(code);
        }
    }

    six_digits(&HTML_TAG.replace_all(&html_decode(input), ""))
}

fn six_digits(input: &str) -> Option<String> {
    SIX_DIGITS
        .captures(input)
        .map(|capture| capture[1].to_string())
}

fn html_decode(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
