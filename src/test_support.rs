use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use sqlx::PgPool;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, state::AppState, time::primitive_now_utc};
use crate::db::models::Message;
use crate::services::analyzer::{Analysis, SolutionAnalyzer};
use crate::services::checker::{CheckVerdict, SolutionChecker};
use crate::services::external_tasks::ExternalTask;
use crate::store::memory::MemoryStore;
use crate::store::GradingStore;

pub(crate) const TEST_API_TOKEN: &str = "test-api-token";
const TEST_DATABASE_URL_VAR: &str = "DTA_TEST_DATABASE_URL";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) app: Router,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<AsyncMutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(AsyncMutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("DTA_ENV", "test");
    std::env::set_var("DTA_STRICT_CONFIG", "0");
    std::env::set_var("API_TOKEN", TEST_API_TOKEN);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::set_var("CHECKER_URL", "http://127.0.0.1:9/check");
    for key in [
        "API_V1_STR",
        "READONLY",
        "ANALYZER_URL",
        "CHECKER_TIMEOUT_SECONDS",
        "DISPATCHER_POLL_INTERVAL_SECONDS",
        "DISPATCHER_DRAIN_POLICY",
        "DISABLE_BACKGROUND_WORKER",
        "FINAL_TASKS",
        "FINAL_VARIANTS",
    ] {
        std::env::remove_var(key);
    }
}

/// Router over an in-memory store with one group, `IKBO-01-23`.
pub(crate) async fn setup_test_context() -> TestContext {
    setup_test_context_with(|| {}).await
}

/// Like [`setup_test_context`], applying `configure` to the environment first.
pub(crate) async fn setup_test_context_with(configure: impl FnOnce()) -> TestContext {
    let guard = env_lock().await;
    set_test_env();
    configure();

    let settings = Settings::load().expect("settings");
    let store = Arc::new(MemoryStore::new());
    store.create_groups(&["IKBO-01-23".to_string()]).await.expect("seed group");

    let state = AppState::new(settings, store.clone());
    let app = api::router::router(state.clone());

    TestContext { state, store, app, _guard: guard }
}

/// Pool for Postgres-backed tests, or `None` (with a notice) when
/// `DTA_TEST_DATABASE_URL` is unset or unreachable.
pub(crate) async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var(TEST_DATABASE_URL_VAR) else {
        eprintln!("skipping: {TEST_DATABASE_URL_VAR} is not set");
        return None;
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&url)
        .await
    {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("skipping: test database unreachable: {err}");
            return None;
        }
    };

    crate::db::run_migrations(&pool).await.expect("migrations");
    Some(pool)
}

pub(crate) fn message(id: i64, task: i32, variant: i32, group: i32, code: &str) -> Message {
    Message {
        id,
        task_id: task,
        variant_id: variant,
        group_id: group,
        time: primitive_now_utc(),
        code: code.to_string(),
        ip: "127.0.0.1".to_string(),
        student_id: None,
        session_id: None,
        processed: false,
    }
}

/// Passes every solution unless told otherwise.
#[derive(Default)]
pub(crate) struct FakeChecker {
    verdicts: Mutex<HashMap<String, CheckVerdict>>,
    calls: Mutex<Vec<ExternalTask>>,
    codes: Mutex<Vec<String>>,
    failures: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl FakeChecker {
    pub(crate) fn respond(&self, code: &str, verdict: CheckVerdict) {
        self.verdicts.lock().expect("verdicts").insert(code.to_string(), verdict);
    }

    pub(crate) fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay") = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.codes.lock().expect("codes").clone()
    }

    pub(crate) fn tasks(&self) -> Vec<ExternalTask> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl SolutionChecker for FakeChecker {
    async fn check(&self, task: &ExternalTask, code: &str) -> Result<CheckVerdict> {
        let delay = *self.delay.lock().expect("delay");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
        {
            return Err(anyhow!("checker crashed"));
        }

        self.calls.lock().expect("calls").push(task.clone());
        self.codes.lock().expect("codes").push(code.to_string());
        Ok(self
            .verdicts
            .lock()
            .expect("verdicts")
            .get(code)
            .cloned()
            .unwrap_or_else(CheckVerdict::passed))
    }
}

pub(crate) struct FakeAnalyzer {
    result: Option<Analysis>,
    calls: AtomicUsize,
}

impl FakeAnalyzer {
    pub(crate) fn always(achievement: i32) -> Self {
        Self {
            result: Some(Analysis { matched: true, achievement: Some(achievement) }),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self { result: None, calls: AtomicUsize::new(0) }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SolutionAnalyzer for FakeAnalyzer {
    async fn analyze(&self, _task_id: i32, _code: &str) -> Result<Analysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.ok_or_else(|| anyhow!("analyzer unavailable"))
    }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header("token", token);
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
