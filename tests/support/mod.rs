#![allow(dead_code)]

use axum::{
    extract::{Form, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use custode::cli::globals::GlobalArgs;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::net::TcpListener;

/// Scripted upstream standing in for the portal, the token queue, the
/// solver, and the inbox relay, all on one ephemeral port.
#[derive(Default)]
pub struct Upstream {
    /// login_submit replies served in order; the last one repeats
    pub logins: Mutex<VecDeque<(Value, Option<String>)>>,
    pub login_count: AtomicUsize,
    /// mfacode field of every login submission, in order
    pub mfacodes: Mutex<Vec<String>>,
    /// Cookie headers presented on portal operation calls
    pub op_cookies: Mutex<Vec<String>>,
    /// 404s the queue serves before handing out tokens
    pub queue_404s: AtomicUsize,
    pub queue_gets: AtomicUsize,
    /// messages the inbox relay returns
    pub relay: Mutex<Vec<Value>>,
    /// artificial delay on login_submit, ms
    pub login_hold_ms: u64,
    /// "processing" polls before the solver reports ready
    pub solver_pending: AtomicUsize,
}

impl Upstream {
    pub fn new(logins: Vec<(Value, Option<&str>)>) -> Self {
        Self {
            logins: Mutex::new(
                logins
                    .into_iter()
                    .map(|(body, cookie)| (body, cookie.map(str::to_string)))
                    .collect(),
            ),
            ..Self::default()
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

pub fn globals_for(base: &str) -> GlobalArgs {
    let mut globals = GlobalArgs::new(base.to_string());
    globals.set_credentials("operator".to_string(), SecretString::from("hunter2"));
    globals.token_queue_url = Some(format!("{base}/token/next"));
    globals.inbox_relay_url = format!("{base}/messages");
    globals.otp_timeout = 5;
    globals
}

pub async fn spawn(upstream: Arc<Upstream>) -> String {
    let app = Router::new()
        .route("/login_submit", post(login_submit))
        .route("/token/next", get(token_next))
        .route("/messages", get(messages))
        .route("/createTask", post(create_task))
        .route("/getTaskResult", post(task_result))
        .route("/clublimit", post(clublimit))
        .route("/clublist", post(clublist))
        .route("/counteru", post(counteru))
        .with_state(upstream);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    format!("http://{addr}")
}

async fn login_submit(
    State(upstream): State<Arc<Upstream>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    upstream.login_count.fetch_add(1, Ordering::SeqCst);
    upstream
        .mfacodes
        .lock()
        .unwrap()
        .push(form.get("mfacode").cloned().unwrap_or_default());

    if upstream.login_hold_ms > 0 {
        tokio::time::sleep(Duration::from_millis(upstream.login_hold_ms)).await;
    }

    let (body, cookie) = {
        let mut logins = upstream.logins.lock().unwrap();
        if logins.len() > 1 {
            logins.pop_front().unwrap()
        } else {
            logins.front().cloned().unwrap()
        }
    };

    let mut headers = HeaderMap::new();
    if let Some(cookie) = cookie {
        headers.insert(
            SET_COOKIE,
            format!("connect.sid={cookie}; Path=/; HttpOnly")
                .parse()
                .unwrap(),
        );
    }

    (headers, Json(body))
}

async fn token_next(State(upstream): State<Arc<Upstream>>) -> Response {
    upstream.queue_gets.fetch_add(1, Ordering::SeqCst);

    let remaining = upstream.queue_404s.load(Ordering::SeqCst);
    if remaining > 0 {
        upstream.queue_404s.fetch_sub(1, Ordering::SeqCst);
        return StatusCode::NOT_FOUND.into_response();
    }

    Json(json!({"token": "queue-token-0123456789", "ts": now_ms()})).into_response()
}

async fn messages(State(upstream): State<Arc<Upstream>>) -> Json<Value> {
    Json(Value::Array(upstream.relay.lock().unwrap().clone()))
}

async fn create_task() -> Json<Value> {
    Json(json!({"errorId": 0, "taskId": "task-1"}))
}

async fn task_result(State(upstream): State<Arc<Upstream>>) -> Json<Value> {
    let remaining = upstream.solver_pending.load(Ordering::SeqCst);
    if remaining > 0 {
        upstream.solver_pending.fetch_sub(1, Ordering::SeqCst);
        return Json(json!({"status": "processing"}));
    }

    Json(json!({
        "status": "ready",
        "solution": {"gRecaptchaResponse": "solver-token-0123456789"},
    }))
}

async fn clublimit(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    record_cookie(&upstream, &headers);

    if form.get("iam").map(String::as_str) == Some("view") {
        Json(json!({
            "INFO": {
                "img": "club.png",
                "nm": "High Rollers",
                "id": form.get("cno").cloned().unwrap_or_default(),
                "master": "boss",
                "win": "5000",
                "loss": "3000",
                "include": true,
            }
        }))
    } else {
        Json(json!({"err": 0}))
    }
}

async fn clublist(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    record_cookie(&upstream, &headers);

    // two-page roster; club 123 only shows up on the second page
    if form.get("cur_page").map(String::as_str) == Some("1") {
        Json(json!({
            "PAGE": {"tot_pages": 2},
            "DATA": [{"cno": "999", "f1": "111111", "f4": "10", "f5": "20"}],
        }))
    } else {
        Json(json!({
            "PAGE": {"tot_pages": 2},
            "DATA": [{"cno": "123", "f1": "250793", "f4": "1,250", "f5": "-300"}],
        }))
    }
}

async fn counteru(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    record_cookie(&upstream, &headers);

    let club = form
        .get("clubstr")
        .and_then(|clubstr| clubstr.split(',').next())
        .unwrap_or_default()
        .to_string();

    Json(json!({
        "err": 0,
        "msg": "ok",
        "success_list": [club],
        "data": {"balance": 100},
    }))
}

fn record_cookie(upstream: &Upstream, headers: &HeaderMap) {
    if let Some(cookie) = headers.get(COOKIE).and_then(|value| value.to_str().ok()) {
        upstream.op_cookies.lock().unwrap().push(cookie.to_string());
    }
}
