use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub(crate) struct Analysis {
    pub(crate) matched: bool,
    #[serde(default)]
    pub(crate) achievement: Option<i32>,
}

impl Analysis {
    /// The achievement to record, if the analysis earned one.
    pub(crate) fn earned(&self) -> Option<i32> {
        self.achievement.filter(|_| self.matched)
    }
}

#[async_trait]
pub(crate) trait SolutionAnalyzer: Send + Sync {
    async fn analyze(&self, task_id: i32, code: &str) -> Result<Analysis>;
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    task: i32,
    code: &'a str,
}

#[derive(Debug, Clone)]
pub(crate) struct HttpAnalyzer {
    client: Client,
    url: String,
}

impl HttpAnalyzer {
    /// `None` when no analyzer is configured.
    pub(crate) fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let Some(url) = settings.checker().analyzer_url.as_deref() else {
            return Ok(None);
        };

        let mut builder = Client::builder().connect_timeout(Duration::from_secs(30));
        if settings.checker().analyzer_timeout_seconds > 0 {
            builder = builder.timeout(Duration::from_secs(settings.checker().analyzer_timeout_seconds));
        }
        let client = builder.build().context("Failed to build analyzer HTTP client")?;

        Ok(Some(Self { client, url: url.trim().to_string() }))
    }
}

#[async_trait]
impl SolutionAnalyzer for HttpAnalyzer {
    async fn analyze(&self, task_id: i32, code: &str) -> Result<Analysis> {
        let response = self
            .client
            .post(&self.url)
            .json(&AnalyzeRequest { task: task_id, code })
            .send()
            .await
            .context("Failed to call analyzer")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Analyzer returned {status}");
        }

        response.json().await.context("Failed to decode analyzer response")
    }
}
