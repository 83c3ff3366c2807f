use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{
    FinalSeed, Group, GroupRating, Message, MessageCheck, SubmissionCheck, TaskStatus,
};
use crate::db::types::TaskKey;
use crate::services::achievements::merge_achievement;
use crate::services::status_transitions;
use crate::store::{
    CompletedCheck, GradingStore, NewSubmission, StoreError, StoreResult, SubmitOutcome,
};

#[derive(Default)]
struct Tables {
    groups: Vec<Group>,
    messages: Vec<Message>,
    statuses: BTreeMap<TaskKey, TaskStatus>,
    checks: Vec<MessageCheck>,
    seeds: BTreeMap<i32, FinalSeed>,
}

/// Store kept in process memory. One mutex stands in for row locks.
#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: Mutex<Tables>,
    conflicts: AtomicUsize,
    pending_failures: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The next `count` writes to a task status fail with `Conflict`.
    pub(crate) fn inject_conflicts(&self, count: usize) {
        self.conflicts.store(count, Ordering::SeqCst);
    }

    /// The next `count` pending-queue reads fail.
    pub(crate) fn fail_pending_reads(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub(crate) fn checks(&self) -> Vec<MessageCheck> {
        self.lock().checks.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_injected(counter: &AtomicUsize) -> bool {
        counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }

    fn database_error() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl GradingStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_groups(&self, titles: &[String]) -> StoreResult<Vec<Group>> {
        let mut tables = self.lock();
        let mut created = Vec::new();
        for title in titles {
            if tables.groups.iter().any(|group| &group.title == title) {
                continue;
            }
            let id = tables.groups.iter().map(|group| group.id).max().unwrap_or(0) + 1;
            let group = Group { id, title: title.clone(), external: None };
            tables.groups.push(group.clone());
            created.push(group);
        }
        Ok(created)
    }

    async fn group(&self, id: i32) -> StoreResult<Option<Group>> {
        Ok(self.lock().groups.iter().find(|group| group.id == id).cloned())
    }

    async fn submit_task(&self, submission: NewSubmission<'_>) -> StoreResult<SubmitOutcome> {
        if Self::take_injected(&self.conflicts) {
            return Err(StoreError::Conflict);
        }

        let now = primitive_now_utc();
        let mut tables = self.lock();
        if !tables.groups.iter().any(|group| group.id == submission.key.group) {
            return Err(StoreError::NotFound("group"));
        }

        let message = Message {
            id: tables.messages.len() as i64 + 1,
            task_id: submission.key.task,
            variant_id: submission.key.variant,
            group_id: submission.key.group,
            time: now,
            code: submission.code.to_string(),
            ip: submission.ip.to_string(),
            student_id: submission.student_id,
            session_id: submission.session_id.map(str::to_string),
            processed: false,
        };
        tables.messages.push(message.clone());

        let current = tables.statuses.remove(&submission.key);
        let write =
            status_transitions::on_submit(current.as_ref(), submission.code, submission.ip, now);
        let status = status_transitions::apply(current, submission.key, write);
        tables.statuses.insert(submission.key, status.clone());

        Ok(SubmitOutcome { message, status })
    }

    async fn check(
        &self,
        key: TaskKey,
        code: &str,
        ok: bool,
        output: Option<&str>,
        ip: &str,
    ) -> StoreResult<TaskStatus> {
        let mut tables = self.lock();
        let current = tables.statuses.remove(&key);
        let write =
            status_transitions::on_check(current.as_ref(), code, ok, output, ip, primitive_now_utc());
        let status = status_transitions::apply(current, key, write);
        tables.statuses.insert(key, status.clone());
        Ok(status)
    }

    async fn task_status(&self, key: TaskKey) -> StoreResult<Option<TaskStatus>> {
        Ok(self.lock().statuses.get(&key).cloned())
    }

    async fn statuses_by_group(&self, group_id: i32) -> StoreResult<Vec<TaskStatus>> {
        Ok(self.lock().statuses.values().filter(|row| row.group_id == group_id).cloned().collect())
    }

    async fn delete_group_statuses(&self, group_id: i32) -> StoreResult<u64> {
        let mut tables = self.lock();
        let before = tables.statuses.len();
        tables.statuses.retain(|key, _| key.group != group_id);
        Ok((before - tables.statuses.len()) as u64)
    }

    async fn group_rating(&self) -> StoreResult<Vec<GroupRating>> {
        let tables = self.lock();
        let mut rating: Vec<GroupRating> = tables
            .groups
            .iter()
            .map(|group| GroupRating {
                group_id: group.id,
                title: group.title.clone(),
                score: tables
                    .statuses
                    .values()
                    .filter(|row| row.group_id == group.id && row.status.is_ever_accepted())
                    .count() as i64,
            })
            .collect();
        rating.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.title.cmp(&b.title)));
        Ok(rating)
    }

    async fn pending_messages(&self) -> StoreResult<Vec<Message>> {
        if Self::take_injected(&self.pending_failures) {
            return Err(Self::database_error());
        }
        Ok(self.lock().messages.iter().filter(|message| !message.processed).cloned().collect())
    }

    async fn mark_as_processed(&self, message_id: i64) -> StoreResult<bool> {
        let mut tables = self.lock();
        match tables.messages.iter_mut().find(|message| message.id == message_id) {
            Some(message) if !message.processed => {
                message.processed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_check(
        &self,
        message: &Message,
        ok: bool,
        output: Option<&str>,
    ) -> StoreResult<CompletedCheck> {
        if Self::take_injected(&self.conflicts) {
            return Err(StoreError::Conflict);
        }

        let now = primitive_now_utc();
        let key = message.key();
        let mut tables = self.lock();

        let pending = tables
            .messages
            .iter()
            .position(|stored| stored.id == message.id && !stored.processed)
            .ok_or(StoreError::NotFound("pending message"))?;

        let current = tables.statuses.remove(&key);
        let write =
            status_transitions::on_check(current.as_ref(), &message.code, ok, output, &message.ip, now);
        let status = status_transitions::apply(current, key, write);
        tables.statuses.insert(key, status.clone());

        let check = MessageCheck {
            id: tables.checks.len() as i64 + 1,
            message_id: message.id,
            time: now,
            status: status.status,
            output: output.map(str::to_string),
            achievement: None,
        };
        tables.checks.push(check.clone());
        tables.messages[pending].processed = true;

        Ok(CompletedCheck { status, check })
    }

    async fn record_achievement(
        &self,
        key: TaskKey,
        achievement: i32,
    ) -> StoreResult<Option<Vec<i32>>> {
        let mut tables = self.lock();
        let Some(row) = tables.statuses.get_mut(&key) else {
            return Ok(None);
        };
        let merged = merge_achievement(row.achievements(), achievement);
        row.achievements = Some(merged.clone());
        Ok(Some(merged))
    }

    async fn record_check_achievement(
        &self,
        check_id: i64,
        achievement: i32,
    ) -> StoreResult<bool> {
        let mut tables = self.lock();
        match tables.checks.iter_mut().find(|check| check.id == check_id) {
            Some(check) => {
                check.achievement = Some(achievement);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_achievements(&self) -> StoreResult<u64> {
        let mut tables = self.lock();
        let mut cleared = 0;
        for row in tables.statuses.values_mut() {
            if row.achievements.take().is_some() {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn checks_for_task(
        &self,
        key: TaskKey,
        skip: i64,
        take: i64,
    ) -> StoreResult<Vec<SubmissionCheck>> {
        let tables = self.lock();
        let skip = usize::try_from(skip).unwrap_or(0);
        let take = usize::try_from(take).unwrap_or(0);
        Ok(tables
            .checks
            .iter()
            .rev()
            .filter_map(|check| {
                tables
                    .messages
                    .iter()
                    .find(|message| message.id == check.message_id && message.key() == key)
                    .map(|message| SubmissionCheck { check: check.clone(), message: message.clone() })
            })
            .skip(skip)
            .take(take)
            .collect())
    }

    async fn final_seed(&self, group_id: i32) -> StoreResult<Option<FinalSeed>> {
        Ok(self.lock().seeds.get(&group_id).cloned())
    }

    async fn begin_final_test(&self, group_id: i32) -> StoreResult<FinalSeed> {
        let mut tables = self.lock();
        if !tables.groups.iter().any(|group| group.id == group_id) {
            return Err(StoreError::NotFound("group"));
        }
        if tables.seeds.contains_key(&group_id) {
            return Err(StoreError::Conflict);
        }
        let seed = FinalSeed { group_id, seed: Uuid::new_v4().to_string(), active: true };
        tables.seeds.insert(group_id, seed.clone());
        Ok(seed)
    }

    async fn set_final_test_active(&self, group_id: i32, active: bool) -> StoreResult<FinalSeed> {
        let mut tables = self.lock();
        let seed = tables.seeds.get_mut(&group_id).ok_or(StoreError::NotFound("final seed"))?;
        seed.active = active;
        Ok(seed.clone())
    }

    async fn delete_final_seed(&self, group_id: i32) -> StoreResult<bool> {
        Ok(self.lock().seeds.remove(&group_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::Status;

    async fn store_with_group() -> (MemoryStore, i32) {
        let store = MemoryStore::new();
        let groups = store.create_groups(&["IKBO-01-23".to_string()]).await.expect("group");
        (store, groups[0].id)
    }

    fn submission(key: TaskKey, code: &str) -> NewSubmission<'_> {
        NewSubmission { key, code, ip: "1.1.1.1", student_id: None, session_id: None }
    }

    #[tokio::test]
    async fn scenarios_a_to_c_through_the_store() {
        let (store, group) = store_with_group().await;
        let key = TaskKey::new(1, 0, group);

        let outcome = store.submit_task(submission(key, "x")).await.expect("submit");
        assert_eq!(outcome.status.status, Status::Submitted);

        let row = store.check(key, "x", false, Some("syntax error"), "1.1.1.1").await.expect("check");
        assert_eq!((row.status, row.output.as_deref()), (Status::Failed, Some("syntax error")));

        let row = store.check(key, "x", true, None, "1.1.1.1").await.expect("check");
        assert_eq!((row.status, row.output), (Status::Checked, None));

        let outcome = store.submit_task(submission(key, "y")).await.expect("submit");
        assert_eq!(outcome.status.status, Status::CheckedSubmitted);

        let row =
            store.check(key, "y", false, Some("runtime error"), "1.1.1.1").await.expect("check");
        assert_eq!((row.status, row.output.as_deref()), (Status::CheckedFailed, Some("runtime error")));
    }

    #[tokio::test]
    async fn pending_never_returns_processed_messages() {
        let (store, group) = store_with_group().await;
        let key = TaskKey::new(1, 0, group);
        let first = store.submit_task(submission(key, "first")).await.expect("submit").message;
        let second = store.submit_task(submission(key, "second")).await.expect("submit").message;

        assert!(store.mark_as_processed(first.id).await.expect("mark"));
        assert!(!store.mark_as_processed(first.id).await.expect("mark again"));

        for _ in 0..2 {
            let pending = store.pending_messages().await.expect("pending");
            assert!(pending.iter().all(|message| !message.processed));
            assert_eq!(pending.iter().map(|message| message.id).collect::<Vec<_>>(), vec![second.id]);
        }
    }

    #[tokio::test]
    async fn unique_pending_keeps_latest_per_key() {
        let (store, group) = store_with_group().await;
        let key = TaskKey::new(1, 0, group);
        let other = TaskKey::new(2, 0, group);
        store.submit_task(submission(key, "old")).await.expect("submit");
        store.submit_task(submission(other, "other")).await.expect("submit");
        store.submit_task(submission(key, "new")).await.expect("submit");

        let unique = store.pending_messages_unique().await.expect("unique");
        let codes: Vec<&str> = unique.iter().map(|message| message.code.as_str()).collect();
        assert_eq!(codes, vec!["other", "new"]);
    }

    #[tokio::test]
    async fn scenario_d_achievement_is_recorded_once() {
        let (store, group) = store_with_group().await;
        let key = TaskKey::new(3, 1, group);

        assert_eq!(store.record_achievement(key, 7).await.expect("missing"), None);

        store.submit_task(submission(key, "code")).await.expect("submit");
        store.record_achievement(key, 7).await.expect("first");
        let achievements = store.record_achievement(key, 7).await.expect("second");
        assert_eq!(achievements, Some(vec![7]));

        assert_eq!(store.clear_achievements().await.expect("clear"), 1);
        let row = store.task_status(key).await.expect("status").expect("row");
        assert!(row.achievements().is_empty());
    }
}
