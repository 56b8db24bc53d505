pub mod backoff;
pub mod captcha;
pub mod holder;
pub mod otp;

use crate::cli::globals::GlobalArgs;
use anyhow::{anyhow, Result};
use backoff::Backoff;
use captcha::ChallengeProvider;
use once_cell::sync::Lazy;
use otp::OtpSource;
use regex::Regex;
use reqwest::{
    header::{HeaderMap, ORIGIN, REFERER, SET_COOKIE},
    Client,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

pub(crate) static APP_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Name of the cookie the portal uses to carry the session credential.
pub const SESSION_COOKIE: &str = "connect.sid";

/// Fixed delay before retrying after a rejected verification code.
const OTP_RETRY_DELAY: Duration = Duration::from_secs(2);

static UNMATCHED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)unmatched\s*verification\s*code").unwrap());

/// The session credential and when it was obtained. Opaque: the value is
/// echoed back verbatim on every portal request and never interpreted.
#[derive(Debug, Clone)]
pub struct SessionToken {
    value: SecretString,
    acquired_at: SystemTime,
}

impl SessionToken {
    fn new(value: String) -> Self {
        Self {
            value: SecretString::from(value),
            acquired_at: SystemTime::now(),
        }
    }

    #[must_use]
    pub const fn value(&self) -> &SecretString {
        &self.value
    }

    #[must_use]
    pub const fn acquired_at(&self) -> SystemTime {
        self.acquired_at
    }
}

/// Tagged interpretation of one login submission body.
///
/// The session credential itself travels in the response headers, so
/// `Accepted` only says the body reports success; cookie extraction is a
/// separate step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReply {
    /// explicit "no error" and no second-factor marker
    Accepted,
    /// the portal rejected the challenge token
    ChallengeRejected,
    /// the portal mailed a verification code and wants it echoed back
    OtpRequired,
    /// the submitted verification code did not match
    OtpRejected,
    /// anything else; never retried
    Unrecognized,
}

/// Single place that inspects the upstream body shape. Everything else
/// consumes the tag.
#[must_use]
pub fn classify(body: &Value) -> LoginReply {
    let msg = match &body["msg"] {
        Value::String(msg) => msg.to_lowercase(),
        Value::Null => String::new(),
        other => other.to_string().to_lowercase(),
    };

    if body["err"] == -2 || msg.contains("recaptcha") {
        return LoginReply::ChallengeRejected;
    }

    let code = body["data"]["code"].as_str();

    if code == Some("REQUIRED_MFA_CODE") || body["data"]["description"]["codeSent"] == true {
        return LoginReply::OtpRequired;
    }

    let data_message = body["data"]["message"].as_str().unwrap_or_default();
    if code == Some("UNMATCHED_VERIFICATION_CODE") || UNMATCHED_CODE.is_match(data_message) {
        return LoginReply::OtpRejected;
    }

    if body["err"] == 0 && code.is_none() {
        return LoginReply::Accepted;
    }

    LoginReply::Unrecognized
}

/// Build `scheme://host:port{endpoint}` from a base URL.
#[instrument]
pub(crate) fn endpoint_url(base: &str, endpoint: &str) -> Result<String> {
    let url = Url::parse(base)?;

    let scheme = url.scheme();

    let host = url
        .host()
        .ok_or_else(|| anyhow!("Error parsing URL: no host specified"))?
        .to_owned();

    let port = match url.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => return Err(anyhow!("Error parsing URL: unsupported scheme {}", scheme)),
        },
    };

    Ok(format!("{scheme}://{host}:{port}{endpoint}"))
}

/// Pull the session credential out of the Set-Cookie response headers.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(SET_COOKIE) {
        let Ok(line) = header.to_str() else { continue };

        let Some(first) = line.split(';').next() else {
            continue;
        };

        let Some((name, value)) = first.split_once('=') else {
            continue;
        };

        if name.trim() == SESSION_COOKIE && !value.trim().is_empty() {
            return Some(value.trim().to_string());
        }
    }

    None
}

/// One form submission against the login endpoint. Returns the parsed body
/// together with the raw response headers; the credential only ever shows
/// up in the latter.
async fn submit(
    client: &Client,
    globals: &GlobalArgs,
    login_url: &str,
    challenge: &str,
    otp_code: &str,
) -> Result<(Value, HeaderMap)> {
    let base = globals.portal_url.trim_end_matches('/');

    let form = [
        ("id", globals.login_id.as_str()),
        ("pwd", globals.login_pwd.expose_secret()),
        ("recaptcha_res", challenge),
        ("mfacode", otp_code),
        ("os", "Windows"),
        ("os_ver", "10"),
        ("method_type", ""),
    ];

    let response = client
        .post(login_url)
        .header(ORIGIN, base)
        .header(REFERER, format!("{base}/login"))
        .form(&form)
        .send()
        .await?;

    let headers = response.headers().clone();
    let raw = response.text().await?;

    let body: Value =
        serde_json::from_str(&raw).map_err(|_| anyhow!("malformed login response body: {raw}"))?;

    Ok((body, headers))
}

/// Run the login sequence until the portal hands over a session credential.
///
/// Challenge rejections and unmatched verification codes are transient and
/// retried indefinitely; an unrecognized body, a missing credential on an
/// apparent success, or a verification-code timeout fails the whole run.
#[instrument(skip_all)]
pub async fn acquire_session(
    globals: &GlobalArgs,
    captcha: &ChallengeProvider,
    otp: &dyn OtpSource,
) -> Result<SessionToken> {
    let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
    let login_url = endpoint_url(&globals.portal_url, "/login_submit")?;

    // Step 1: credentials + challenge token, no verification code yet.
    let mut backoff = Backoff::new(100, 5_000);
    let (body, headers) = loop {
        let challenge = captcha.obtain().await;
        let (body, headers) = submit(&client, globals, &login_url, challenge.value(), "").await?;

        if classify(&body) == LoginReply::ChallengeRejected {
            let delay = backoff.next_delay();
            warn!(
                "challenge rejected (attempt {}); retrying in {}ms",
                backoff.attempt(),
                delay.as_millis()
            );
            sleep(delay).await;
            continue;
        }

        break (body, headers);
    };

    match classify(&body) {
        LoginReply::Accepted => session_cookie(&headers)
            .map(SessionToken::new)
            .ok_or_else(|| anyhow!("login accepted but no {SESSION_COOKIE} cookie in response")),
        LoginReply::OtpRequired => {
            debug!("verification code requested");
            let mfa_requested_at = SystemTime::now();
            second_factor(&client, globals, &login_url, captcha, otp, mfa_requested_at).await
        }
        _ => Err(anyhow!("unexpected login response: {body}")),
    }
}

/// Step 2: the portal mailed a verification code; fetch it and echo it back.
///
/// The not-before boundary is fixed at the time the portal requested the
/// code. Retries re-query the inbox with that same boundary, so codes
/// issued between attempts stay eligible.
async fn second_factor(
    client: &Client,
    globals: &GlobalArgs,
    login_url: &str,
    captcha: &ChallengeProvider,
    otp: &dyn OtpSource,
    mfa_requested_at: SystemTime,
) -> Result<SessionToken> {
    let timeout = Duration::from_secs(globals.otp_timeout);
    let mut backoff = Backoff::new(100, 5_000);

    loop {
        let code = otp.fetch_code(mfa_requested_at, timeout).await?;
        let challenge = captcha.obtain().await;
        let (body, headers) = submit(client, globals, login_url, challenge.value(), &code).await?;

        match classify(&body) {
            LoginReply::ChallengeRejected => {
                let delay = backoff.next_delay();
                warn!(
                    "challenge rejected on code submission (attempt {}); retrying in {}ms",
                    backoff.attempt(),
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            LoginReply::OtpRejected => {
                warn!("verification code unmatched; waiting for a newer one");
                sleep(OTP_RETRY_DELAY).await;
            }
            _ => {
                return session_cookie(&headers).map(SessionToken::new).ok_or_else(|| {
                    anyhow!("no {SESSION_COOKIE} cookie in login response: {body}")
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_classify_challenge_rejected() {
        assert_eq!(
            classify(&json!({"err": -2, "msg": "please check recaptcha"})),
            LoginReply::ChallengeRejected
        );
        assert_eq!(
            classify(&json!({"err": 1, "msg": "Please Check reCAPTCHA"})),
            LoginReply::ChallengeRejected
        );
        assert_eq!(classify(&json!({"err": -2})), LoginReply::ChallengeRejected);
    }

    #[test]
    fn test_classify_accepted() {
        assert_eq!(classify(&json!({"err": 0})), LoginReply::Accepted);
        assert_eq!(
            classify(&json!({"err": 0, "msg": "welcome"})),
            LoginReply::Accepted
        );
    }

    #[test]
    fn test_classify_otp_required() {
        assert_eq!(
            classify(&json!({"data": {"code": "REQUIRED_MFA_CODE"}})),
            LoginReply::OtpRequired
        );
        assert_eq!(
            classify(&json!({"err": 0, "data": {"description": {"codeSent": true}}})),
            LoginReply::OtpRequired
        );
    }

    #[test]
    fn test_classify_otp_rejected() {
        assert_eq!(
            classify(&json!({"data": {"code": "UNMATCHED_VERIFICATION_CODE"}})),
            LoginReply::OtpRejected
        );
        assert_eq!(
            classify(&json!({"data": {"message": "Unmatched  Verification Code"}})),
            LoginReply::OtpRejected
        );
    }

    #[test]
    fn test_classify_unrecognized() {
        assert_eq!(classify(&json!({"err": 7})), LoginReply::Unrecognized);
        assert_eq!(classify(&json!({})), LoginReply::Unrecognized);
        assert_eq!(
            classify(&json!({"err": 0, "data": {"code": "SOMETHING_ELSE"}})),
            LoginReply::Unrecognized
        );
    }

    #[test]
    fn test_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("theme=dark; Path=/"),
        );
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("connect.sid=s%3AXYZ.abc; Path=/; HttpOnly"),
        );

        assert_eq!(session_cookie(&headers), Some("s%3AXYZ.abc".to_string()));
    }

    #[test]
    fn test_session_cookie_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_cookie(&headers), None);

        headers.append(SET_COOKIE, HeaderValue::from_static("connect.sid=; Path=/"));
        assert_eq!(session_cookie(&headers), None);
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("https://union.portal.tld", "/login_submit").unwrap(),
            "https://union.portal.tld:443/login_submit"
        );
        assert_eq!(
            endpoint_url("http://127.0.0.1:3000", "/login_submit").unwrap(),
            "http://127.0.0.1:3000/login_submit"
        );
        assert!(endpoint_url("ftp://union.portal.tld", "/login_submit").is_err());
    }
}
