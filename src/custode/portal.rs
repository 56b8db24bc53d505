use crate::cli::globals::GlobalArgs;
use crate::session::{endpoint_url, SessionToken, APP_USER_AGENT, SESSION_COOKIE};
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{
    header::{COOKIE, ORIGIN, REFERER},
    Client,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use utoipa::ToSchema;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[^>]+>").unwrap());

/// Per-club win/loss limits as the portal reports them.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClubLimit {
    #[serde(default)]
    pub img: String,
    #[serde(default)]
    pub nm: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub master: String,
    #[serde(default)]
    pub win: String,
    #[serde(default)]
    pub loss: String,
    /// the portal answers with either a bool or a string here
    #[serde(default)]
    #[schema(value_type = Object)]
    pub include: Value,
}

/// Ring and tournament P&L for one club, read off the club roster listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClubPnl {
    pub public_id: String,
    pub ring_pnl: f64,
    pub tourney_pnl: f64,
}

/// Normalized result of a credit transfer call.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreditOutcome {
    pub ok: bool,
    pub message: Option<String>,
    pub success_clubs: Vec<String>,
    pub balance: Option<i64>,
}

/// Thin client for the portal operations that only need the session cookie.
#[derive(Debug)]
pub struct PortalClient {
    client: Client,
    base_url: String,
}

impl PortalClient {
    pub fn new(globals: &GlobalArgs) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            base_url: globals.portal_url.trim_end_matches('/').to_string(),
        })
    }

    #[instrument(skip(self, token, form))]
    async fn post_form(
        &self,
        token: &SessionToken,
        endpoint: &str,
        form: &[(&str, &str)],
    ) -> Result<Value> {
        let url = endpoint_url(&self.base_url, endpoint)?;

        let response = self
            .client
            .post(&url)
            .header(ORIGIN, &self.base_url)
            .header(REFERER, format!("{}{}", self.base_url, endpoint))
            .header(
                COOKIE,
                format!("{SESSION_COOKIE}={}", token.value().expose_secret()),
            )
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("{} - {}", url, response.status()));
        }

        let body: Value = response.json().await?;
        debug!("portal response: {body}");

        Ok(body)
    }

    /// Current win/loss limit for one club.
    pub async fn club_limit_view(&self, token: &SessionToken, club: &str) -> Result<ClubLimit> {
        let body = self
            .post_form(token, "/clublimit", &[("iam", "view"), ("cno", club)])
            .await?;

        let info = body
            .get("INFO")
            .ok_or_else(|| anyhow!("unexpected clublimit response: {body}"))?;

        Ok(serde_json::from_value(info.clone())?)
    }

    /// Set a club's win cap and stop-loss.
    pub async fn club_limit_edit(
        &self,
        token: &SessionToken,
        club: &str,
        win: i64,
        loss: i64,
        include: bool,
    ) -> Result<()> {
        let win = win.to_string();
        let loss = loss.to_string();
        let include = if include { "1" } else { "0" };

        let body = self
            .post_form(
                token,
                "/clublimit",
                &[
                    ("iam", "edit"),
                    ("cno", club),
                    ("win", &win),
                    ("loss", &loss),
                    ("include", include),
                ],
            )
            .await?;

        match body.get("err").and_then(Value::as_i64) {
            None | Some(0) => Ok(()),
            Some(err) => Err(anyhow!("clublimit edit failed ({err}): {body}")),
        }
    }

    /// Send credit from the union balance out to a club counter.
    pub async fn credit_send(
        &self,
        token: &SessionToken,
        club: &str,
        amount: i64,
        note: &str,
    ) -> Result<CreditOutcome> {
        let clubstr = format!("{club},{amount}");

        let body = self
            .post_form(
                token,
                "/counteru",
                &[("iam", "sendout"), ("clubstr", &clubstr), ("note", note)],
            )
            .await?;

        Ok(credit_outcome(club, &body))
    }

    /// Ring and tournament P&L for one club. The roster listing is
    /// paginated; pages are scanned in order until the club shows up.
    pub async fn club_pnl(&self, token: &SessionToken, club: &str) -> Result<Option<ClubPnl>> {
        let first = self.list_page(token, 1).await?;

        if let Some(pnl) = find_club(club, &first) {
            return Ok(Some(pnl));
        }

        let total_pages = match &first["PAGE"]["tot_pages"] {
            Value::Number(pages) => pages.as_u64().unwrap_or(1),
            Value::String(pages) => pages.parse().unwrap_or(1),
            _ => 1,
        };

        for page in 2..=total_pages {
            let body = self.list_page(token, page).await?;
            if let Some(pnl) = find_club(club, &body) {
                return Ok(Some(pnl));
            }
        }

        Ok(None)
    }

    async fn list_page(&self, token: &SessionToken, page: u64) -> Result<Value> {
        let page = page.to_string();

        self.post_form(
            token,
            "/clublist",
            &[
                ("iam", "list"),
                ("clubnm", ""),
                ("cur_page", &page),
                ("clubmn", "clubnm"),
                ("acs", "1"),
            ],
        )
        .await
    }

    /// Claim credit back from a club counter.
    pub async fn credit_claim(
        &self,
        token: &SessionToken,
        club: &str,
        amount: i64,
    ) -> Result<CreditOutcome> {
        let clubstr = format!("{club},{amount}");

        let body = self
            .post_form(
                token,
                "/counteru",
                &[("iam", "claimback"), ("clubstr", &clubstr)],
            )
            .await?;

        Ok(credit_outcome(club, &body))
    }
}

/// Normalize the counter response: `msg` may be a string or an array of
/// HTML fragments, and success is signalled either by `err == 0` or by the
/// club showing up in `success_list`.
fn credit_outcome(club: &str, body: &Value) -> CreditOutcome {
    let message = match &body["msg"] {
        Value::String(msg) => Some(msg.clone()),
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => None,
    }
    .map(|msg| HTML_TAG.replace_all(&msg, "").to_string());

    let success_clubs: Vec<String> = body["success_list"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let ok = body["err"] == 0 || success_clubs.iter().any(|success| success == club);

    CreditOutcome {
        ok,
        message,
        success_clubs,
        balance: body["data"]["balance"].as_i64(),
    }
}

/// One roster row: `cno` is the backend club id, `f1` the public id, `f4`
/// ring P&L and `f5` tournament P&L as comma-grouped numbers.
fn find_club(club: &str, body: &Value) -> Option<ClubPnl> {
    body["DATA"].as_array()?.iter().find_map(|row| {
        (row["cno"] == club).then(|| ClubPnl {
            public_id: row["f1"].as_str().unwrap_or_default().to_string(),
            ring_pnl: grouped_number(&row["f4"]),
            tourney_pnl: grouped_number(&row["f5"]),
        })
    })
}

/// "1,234.5" → 1234.5; anything unparseable counts as zero.
fn grouped_number(value: &Value) -> f64 {
    match value {
        Value::String(text) => text.replace(',', "").trim().parse().unwrap_or(0.0),
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credit_outcome_err_zero() {
        let body = json!({"err": 0, "msg": "done", "data": {"balance": 420}});
        let outcome = credit_outcome("123", &body);

        assert!(outcome.ok);
        assert_eq!(outcome.message.as_deref(), Some("done"));
        assert_eq!(outcome.balance, Some(420));
        assert!(outcome.success_clubs.is_empty());
    }

    #[test]
    fn test_credit_outcome_success_list() {
        let body = json!({
            "err": 1,
            "msg": ["<b>sent</b>", "to club"],
            "success_list": ["123", "456"],
        });
        let outcome = credit_outcome("123", &body);

        assert!(outcome.ok);
        assert_eq!(outcome.message.as_deref(), Some("sent to club"));
        assert_eq!(outcome.success_clubs, vec!["123", "456"]);
        assert_eq!(outcome.balance, None);
    }

    #[test]
    fn test_credit_outcome_failure() {
        let body = json!({"err": 3, "msg": "<span>not enough balance</span>"});
        let outcome = credit_outcome("123", &body);

        assert!(!outcome.ok);
        assert_eq!(outcome.message.as_deref(), Some("not enough balance"));
    }

    #[test]
    fn test_grouped_number() {
        assert_eq!(grouped_number(&json!("1,250")), 1_250.0);
        assert_eq!(grouped_number(&json!(" -1,234.5 ")), -1_234.5);
        assert_eq!(grouped_number(&json!(42)), 42.0);
        assert_eq!(grouped_number(&json!("N/A")), 0.0);
        assert_eq!(grouped_number(&json!(null)), 0.0);
    }

    #[test]
    fn test_find_club() {
        let body = json!({
            "PAGE": {"tot_pages": 2},
            "DATA": [
                {"cno": "999", "f1": "111111", "f4": "10", "f5": "20"},
                {"cno": "123", "f1": "250793", "f4": "1,250", "f5": "-300"},
            ],
        });

        let pnl = find_club("123", &body).unwrap();
        assert_eq!(pnl.public_id, "250793");
        assert_eq!(pnl.ring_pnl, 1_250.0);
        assert_eq!(pnl.tourney_pnl, -300.0);

        assert!(find_club("777", &body).is_none());
        assert!(find_club("123", &json!({"err": 0})).is_none());
    }

    #[test]
    fn test_club_limit_shape() {
        let info = json!({
            "img": "club.png",
            "nm": "High Rollers",
            "id": "123",
            "master": "boss",
            "win": "5000",
            "loss": "3000",
            "include": true,
        });

        let limit: ClubLimit = serde_json::from_value(info).unwrap();
        assert_eq!(limit.nm, "High Rollers");
        assert_eq!(limit.win, "5000");
        assert_eq!(limit.include, json!(true));
    }
}
