use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{Status, TaskKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub(crate) struct Group {
    pub(crate) id: i32,
    pub(crate) title: String,
    pub(crate) external: Option<String>,
}

/// One submission attempt. Rows are only ever appended; `processed` is the
/// single mutable column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub(crate) struct Message {
    pub(crate) id: i64,
    pub(crate) task_id: i32,
    pub(crate) variant_id: i32,
    pub(crate) group_id: i32,
    pub(crate) time: PrimitiveDateTime,
    pub(crate) code: String,
    pub(crate) ip: String,
    pub(crate) student_id: Option<i32>,
    pub(crate) session_id: Option<String>,
    pub(crate) processed: bool,
}

impl Message {
    pub(crate) fn key(&self) -> TaskKey {
        TaskKey::new(self.task_id, self.variant_id, self.group_id)
    }
}

/// Latest grading state of a task key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub(crate) struct TaskStatus {
    pub(crate) task_id: i32,
    pub(crate) variant_id: i32,
    pub(crate) group_id: i32,
    pub(crate) time: PrimitiveDateTime,
    pub(crate) code: String,
    pub(crate) ip: String,
    pub(crate) output: Option<String>,
    pub(crate) status: Status,
    pub(crate) achievements: Option<Vec<i32>>,
}

impl TaskStatus {
    pub(crate) fn key(&self) -> TaskKey {
        TaskKey::new(self.task_id, self.variant_id, self.group_id)
    }

    pub(crate) fn achievements(&self) -> &[i32] {
        self.achievements.as_deref().unwrap_or_default()
    }
}

/// Audit row written once per completed grading attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub(crate) struct MessageCheck {
    pub(crate) id: i64,
    pub(crate) message_id: i64,
    pub(crate) time: PrimitiveDateTime,
    pub(crate) status: Status,
    pub(crate) output: Option<String>,
    pub(crate) achievement: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub(crate) struct FinalSeed {
    pub(crate) group_id: i32,
    pub(crate) seed: String,
    pub(crate) active: bool,
}

/// A check joined with the submission it graded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubmissionCheck {
    pub(crate) check: MessageCheck,
    pub(crate) message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub(crate) struct GroupRating {
    pub(crate) group_id: i32,
    pub(crate) title: String,
    pub(crate) score: i64,
}
