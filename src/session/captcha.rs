use crate::cli::globals::GlobalArgs;
use crate::session::{backoff::Backoff, APP_USER_AGENT};
use anyhow::Result;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// How long an issued token stays trustworthy before it is discarded.
const TOKEN_VALIDITY: Duration = Duration::from_secs(110);

/// Solver poll schedule: 30 polls at 3s spacing, ~90s before giving up on
/// one solve request.
const SOLVER_POLLS: u32 = 30;
const SOLVER_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Every Nth consecutive queue miss the paid solver is tried once as a
/// supplement.
const SOLVER_SUPPLEMENT_EVERY: u64 = 4;

const PAGE_ACTION: &str = "submit";

/// Single-use proof-of-humanity token.
#[derive(Debug)]
pub struct ChallengeToken {
    value: String,
    issued_at: SystemTime,
}

impl ChallengeToken {
    fn new(value: String) -> Self {
        Self {
            value,
            issued_at: SystemTime::now(),
        }
    }

    const fn issued(value: String, issued_at: SystemTime) -> Self {
        Self { value, issued_at }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.issued_at
            .elapsed()
            .is_ok_and(|age| age > TOKEN_VALIDITY)
    }
}

#[derive(Debug, Deserialize)]
struct QueueToken {
    token: Option<String>,
    /// epoch ms when the queue produced the token
    ts: Option<u64>,
}

#[derive(Debug, Clone)]
struct SolverConfig {
    url: String,
    api_key: SecretString,
    site_key: String,
    page_url: String,
}

/// Produces challenge tokens from a shared queue and/or a paid solving
/// service. `obtain` never gives up; exhaustion of one source only means
/// backing off and trying again.
#[derive(Debug)]
pub struct ChallengeProvider {
    client: Client,
    queue_url: Option<String>,
    solver: Option<SolverConfig>,
}

impl ChallengeProvider {
    pub fn new(globals: &GlobalArgs) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()?;

        let solver = globals.solver_api_key.as_ref().map(|key| SolverConfig {
            url: globals.solver_url.trim_end_matches('/').to_string(),
            api_key: key.clone(),
            site_key: globals.solver_site_key.clone(),
            page_url: format!("{}/", globals.portal_url.trim_end_matches('/')),
        });

        Ok(Self {
            client,
            queue_url: globals.token_queue_url.clone(),
            solver,
        })
    }

    /// Obtain a fresh challenge token, retrying until one is produced.
    ///
    /// The shared queue is preferred on every attempt; every Nth consecutive
    /// miss the solver is tried once as a supplement before backing off and
    /// polling the queue again.
    #[instrument(skip(self))]
    pub async fn obtain(&self) -> ChallengeToken {
        let mut backoff = Backoff::with_jitter(300, 5_000, 250);

        loop {
            if let Some(token) = self.pull_from_queue().await {
                return token;
            }

            let misses = backoff.attempt() + 1;
            if self.queue_url.is_none() || misses % SOLVER_SUPPLEMENT_EVERY == 0 {
                if let Some(token) = self.solve_on_demand().await {
                    return token;
                }
            }

            sleep(backoff.next_delay()).await;
        }
    }

    /// One queue pop. `None` covers both "nothing queued yet" (404) and
    /// transport trouble; the caller backs off either way.
    async fn pull_from_queue(&self) -> Option<ChallengeToken> {
        let url = self.queue_url.as_deref()?;

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("token queue error: {e}");
                return None;
            }
        };

        if response.status() == StatusCode::NOT_FOUND {
            debug!("token queue empty");
            return None;
        }

        if !response.status().is_success() {
            warn!("token queue returned {}", response.status());
            return None;
        }

        let body: QueueToken = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("token queue body error: {e}");
                return None;
            }
        };

        let value = body.token?;
        if value.len() < 10 {
            return None;
        }

        let issued_at = body
            .ts
            .map_or_else(SystemTime::now, |ms| UNIX_EPOCH + Duration::from_millis(ms));

        let token = ChallengeToken::issued(value, issued_at);
        if token.is_stale() {
            warn!("discarding stale challenge token");
            return None;
        }

        Some(token)
    }

    /// Submit one solve request and poll it to completion.
    async fn solve_on_demand(&self) -> Option<ChallengeToken> {
        let solver = self.solver.as_ref()?;

        let payload = json!({
            "clientKey": solver.api_key.expose_secret(),
            "task": {
                "type": "ReCaptchaV3EnterpriseTaskProxyLess",
                "websiteURL": solver.page_url,
                "websiteKey": solver.site_key,
                "pageAction": PAGE_ACTION,
            },
        });

        let create: Value = match self
            .client
            .post(format!("{}/createTask", solver.url))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response.json().await.ok()?,
            Err(e) => {
                warn!("solver createTask error: {e}");
                return None;
            }
        };

        let task_id = create["taskId"].clone();
        if task_id.is_null() {
            warn!("solver did not assign a task: {create}");
            return None;
        }

        let poll = json!({
            "clientKey": solver.api_key.expose_secret(),
            "taskId": task_id,
        });

        for _ in 0..SOLVER_POLLS {
            sleep(SOLVER_POLL_INTERVAL).await;

            let result: Value = match self
                .client
                .post(format!("{}/getTaskResult", solver.url))
                .json(&poll)
                .send()
                .await
            {
                Ok(response) => response.json().await.ok()?,
                Err(e) => {
                    warn!("solver getTaskResult error: {e}");
                    return None;
                }
            };

            if result["status"] == "ready" {
                return result["solution"]["gRecaptchaResponse"]
                    .as_str()
                    .map(|solution| ChallengeToken::new(solution.to_string()));
            }
        }

        debug!("solver task did not complete in time");
        None
    }
}
