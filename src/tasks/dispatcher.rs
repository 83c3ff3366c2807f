//! One polling cycle of the checker dispatcher.
//!
//! A message is marked processed only inside the same transaction that
//! stores its check result. Any failure before that leaves it pending for
//! the next cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::core::state::AppState;
use crate::db::models::Message;
use crate::db::types::TaskKey;
use crate::services::analyzer::{HttpAnalyzer, SolutionAnalyzer};
use crate::services::checker::{CheckVerdict, HttpChecker, SolutionChecker};
use crate::services::external_tasks::{ExternalTask, SeededTaskRemapper, TaskRemapper};
use crate::services::pending_queue::DrainPolicy;
use crate::store::{retry_on_conflict, CompletedCheck, GradingStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CycleReport {
    pub(crate) pending: usize,
    pub(crate) processed: usize,
    pub(crate) failed: usize,
}

pub(crate) struct Dispatcher {
    store: Arc<dyn GradingStore>,
    checker: Arc<dyn SolutionChecker>,
    analyzer: Option<Arc<dyn SolutionAnalyzer>>,
    remapper: Arc<dyn TaskRemapper>,
    drain_policy: DrainPolicy,
    checker_timeout: Option<Duration>,
}

impl Dispatcher {
    pub(crate) fn new(
        store: Arc<dyn GradingStore>,
        checker: Arc<dyn SolutionChecker>,
        remapper: Arc<dyn TaskRemapper>,
    ) -> Self {
        Self {
            store,
            checker,
            analyzer: None,
            remapper,
            drain_policy: DrainPolicy::default(),
            checker_timeout: None,
        }
    }

    pub(crate) fn from_state(state: &AppState) -> Result<Self> {
        let settings = state.settings();
        let checker = HttpChecker::from_settings(settings)?;
        let analyzer = HttpAnalyzer::from_settings(settings)?;
        let remapper = SeededTaskRemapper::from_settings(settings);

        let mut dispatcher =
            Self::new(state.shared_store(), Arc::new(checker), Arc::new(remapper))
                .with_drain_policy(settings.dispatcher().drain_policy)
                .with_checker_timeout(settings.checker().checker_timeout());
        if let Some(analyzer) = analyzer {
            dispatcher = dispatcher.with_analyzer(Arc::new(analyzer));
        }
        Ok(dispatcher)
    }

    pub(crate) fn with_analyzer(mut self, analyzer: Arc<dyn SolutionAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub(crate) fn with_drain_policy(mut self, drain_policy: DrainPolicy) -> Self {
        self.drain_policy = drain_policy;
        self
    }

    pub(crate) fn with_checker_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.checker_timeout = timeout;
        self
    }

    pub(crate) fn drain_policy(&self) -> DrainPolicy {
        self.drain_policy
    }

    /// Drains the pending queue once, in submission order.
    pub(crate) async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();

        let pending =
            self.store.pending_messages().await.context("Failed to load pending messages")?;
        let (batch, mut superseded) = match self.drain_policy {
            DrainPolicy::Full => (pending, HashMap::new()),
            DrainPolicy::UniquePerKey => {
                let latest = self
                    .store
                    .pending_messages_unique()
                    .await
                    .context("Failed to load latest pending messages")?;
                let superseded = superseded_by_key(pending, &latest);
                (latest, superseded)
            }
        };

        let mut report = CycleReport { pending: batch.len(), ..CycleReport::default() };
        if !batch.is_empty() {
            tracing::info!(
                pending = batch.len(),
                policy = self.drain_policy.as_str(),
                "Processing pending messages"
            );
        }

        for message in &batch {
            match self.process_message(message).await {
                Ok(completed) => {
                    report.processed += 1;
                    let outcome = if completed.check.status.shows_output() {
                        "failed_check"
                    } else {
                        "checked"
                    };
                    metrics::counter!("dispatcher_messages_total", "outcome" => outcome)
                        .increment(1);

                    if let Some(older) = superseded.remove(&message.key()) {
                        self.retire_superseded(&older).await;
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    metrics::counter!("dispatcher_messages_total", "outcome" => "error")
                        .increment(1);
                    tracing::warn!(
                        message_id = message.id,
                        task = message.task_id,
                        variant = message.variant_id,
                        group = message.group_id,
                        error = %format!("{err:#}"),
                        "Message left pending"
                    );
                }
            }
        }

        metrics::histogram!("dispatcher_cycle_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        Ok(report)
    }

    /// Checks one message and persists the outcome. On `Err` the message is
    /// still pending.
    pub(crate) async fn process_message(&self, message: &Message) -> Result<CompletedCheck> {
        let key = message.key();
        let group = self
            .store
            .group(key.group)
            .await
            .context("Failed to load group")?
            .with_context(|| format!("Group {} does not exist", key.group))?;
        let seed = self.store.final_seed(group.id).await.context("Failed to load final seed")?;
        let external = self.remapper.resolve(&group, key.variant, key.task, seed.as_ref());

        tracing::debug!(
            message_id = message.id,
            %key,
            external_group = %external.group_title,
            external_task = external.task,
            external_variant = external.variant,
            "Checking submission"
        );

        let verdict = self.run_checker(&external, &message.code).await?;

        let store = self.store.as_ref();
        let output = verdict.output.as_deref();
        let completed = retry_on_conflict(move || store.complete_check(message, verdict.ok, output))
            .await
            .context("Failed to store check result")?;

        tracing::info!(
            message_id = message.id,
            %key,
            ok = verdict.ok,
            status = %completed.status.status,
            "Submission checked"
        );

        if verdict.ok {
            self.record_analysis(message, &external, &completed).await;
        }

        Ok(completed)
    }

    async fn run_checker(&self, external: &ExternalTask, code: &str) -> Result<CheckVerdict> {
        let check = self.checker.check(external, code);
        let verdict = match self.checker_timeout {
            Some(limit) => tokio::time::timeout(limit, check)
                .await
                .with_context(|| format!("Checker timed out after {}ms", limit.as_millis()))?,
            None => check.await,
        };
        verdict.context("Checker did not return a verdict")
    }

    /// Best effort: the message is already processed, so failures are only logged.
    async fn record_analysis(
        &self,
        message: &Message,
        external: &ExternalTask,
        completed: &CompletedCheck,
    ) {
        let Some(analyzer) = &self.analyzer else {
            return;
        };

        let analysis = match analyzer.analyze(external.task, &message.code).await {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::warn!(
                    message_id = message.id,
                    error = %format!("{err:#}"),
                    "Solution analysis failed"
                );
                return;
            }
        };
        let Some(achievement) = analysis.earned() else {
            return;
        };

        if let Err(err) = self.store.record_check_achievement(completed.check.id, achievement).await
        {
            tracing::warn!(
                message_id = message.id,
                check_id = completed.check.id,
                error = %err,
                "Failed to attach achievement to check"
            );
            return;
        }

        match self.store.record_achievement(message.key(), achievement).await {
            Ok(Some(_)) => {
                metrics::counter!("dispatcher_achievements_total").increment(1);
                tracing::info!(message_id = message.id, achievement, "Achievement recorded");
            }
            Ok(None) => {
                tracing::debug!(message_id = message.id, "No task status to attach achievement to");
            }
            Err(err) => {
                tracing::warn!(
                    message_id = message.id,
                    error = %err,
                    "Failed to record achievement"
                );
            }
        }
    }

    /// Older pending messages of a key whose latest submission was just graded.
    async fn retire_superseded(&self, messages: &[i64]) {
        for &message_id in messages {
            match self.store.mark_as_processed(message_id).await {
                Ok(_) => {
                    tracing::debug!(message_id, "Superseded message marked processed");
                }
                Err(err) => {
                    tracing::warn!(message_id, error = %err, "Failed to retire superseded message");
                }
            }
        }
    }
}

/// Ids of pending messages outside `latest`, grouped by key. `pending` must be
/// read before `latest`, so a message that arrives in between is never retired.
fn superseded_by_key(pending: Vec<Message>, latest: &[Message]) -> HashMap<TaskKey, Vec<i64>> {
    let kept: HashSet<i64> = latest.iter().map(|message| message.id).collect();

    let mut superseded: HashMap<TaskKey, Vec<i64>> = HashMap::new();
    for message in pending.into_iter().filter(|message| !kept.contains(&message.id)) {
        superseded.entry(message.key()).or_default().push(message.id);
    }

    superseded
}
