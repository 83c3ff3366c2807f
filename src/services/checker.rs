use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::Settings;
use crate::services::external_tasks::ExternalTask;

/// Result of running a solution against the reference checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CheckVerdict {
    pub(crate) ok: bool,
    pub(crate) output: Option<String>,
}

#[cfg(test)]
impl CheckVerdict {
    pub(crate) fn passed() -> Self {
        Self { ok: true, output: None }
    }

    pub(crate) fn failed(output: impl Into<String>) -> Self {
        Self { ok: false, output: Some(output.into()) }
    }
}

/// An `Err` means the check did not complete and must be retried later.
#[async_trait]
pub(crate) trait SolutionChecker: Send + Sync {
    async fn check(&self, task: &ExternalTask, code: &str) -> Result<CheckVerdict>;
}

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    group: &'a str,
    task: i32,
    variant: i32,
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct HttpChecker {
    client: Client,
    url: String,
}

impl HttpChecker {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(30));
        if let Some(timeout) = settings.checker().checker_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build checker HTTP client")?;

        Ok(Self { client, url: settings.checker().checker_url.trim().to_string() })
    }
}

#[async_trait]
impl SolutionChecker for HttpChecker {
    async fn check(&self, task: &ExternalTask, code: &str) -> Result<CheckVerdict> {
        if self.url.is_empty() {
            bail!("CHECKER_URL is not configured");
        }

        let payload = CheckRequest {
            group: &task.group_title,
            task: task.task,
            variant: task.variant,
            code,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("Failed to call checker")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Checker returned {status}: {body}");
        }

        let body: CheckResponse =
            response.json().await.context("Failed to decode checker response")?;

        Ok(CheckVerdict {
            ok: body.ok,
            output: if body.ok { None } else { body.error },
        })
    }
}
