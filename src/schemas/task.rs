use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{SubmissionCheck, TaskStatus};
use crate::db::types::{Status, TaskKey};

/// Code must be strictly longer than 10 and strictly shorter than 10000 chars.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitTaskRequest {
    #[validate(length(min = 11, max = 9999, message = "Code length is invalid"))]
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) student_id: Option<i32>,
    #[serde(default)]
    pub(crate) session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TaskStatusResponse {
    pub(crate) task: i32,
    pub(crate) variant: i32,
    pub(crate) group: i32,
    pub(crate) status: Status,
    pub(crate) status_name: &'static str,
    pub(crate) error_message: Option<String>,
    pub(crate) achievements: Vec<i32>,
    pub(crate) submitted_at: Option<String>,
}

impl TaskStatusResponse {
    pub(crate) fn not_submitted(key: TaskKey) -> Self {
        Self {
            task: key.task,
            variant: key.variant,
            group: key.group,
            status: Status::NotSubmitted,
            status_name: Status::NotSubmitted.as_str(),
            error_message: None,
            achievements: Vec::new(),
            submitted_at: None,
        }
    }

    pub(crate) fn from_row(key: TaskKey, row: Option<TaskStatus>) -> Self {
        let Some(row) = row else {
            return Self::not_submitted(key);
        };

        Self {
            task: row.task_id,
            variant: row.variant_id,
            group: row.group_id,
            status: row.status,
            status_name: row.status.as_str(),
            error_message: if row.status.shows_output() { row.output.clone() } else { None },
            achievements: row.achievements().to_vec(),
            submitted_at: Some(format_primitive(row.time)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChecksQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_take")]
    pub(crate) take: i64,
}

const fn default_take() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionCheckResponse {
    pub(crate) check_id: i64,
    pub(crate) message_id: i64,
    pub(crate) submitted_at: String,
    pub(crate) checked_at: String,
    pub(crate) status: Status,
    pub(crate) status_name: &'static str,
    pub(crate) output: Option<String>,
    pub(crate) achievement: Option<i32>,
    pub(crate) code: String,
    pub(crate) ip: String,
}

impl From<SubmissionCheck> for SubmissionCheckResponse {
    fn from(item: SubmissionCheck) -> Self {
        Self {
            check_id: item.check.id,
            message_id: item.message.id,
            submitted_at: format_primitive(item.message.time),
            checked_at: format_primitive(item.check.time),
            status: item.check.status,
            status_name: item.check.status.as_str(),
            output: item.check.output,
            achievement: item.check.achievement,
            code: item.message.code,
            ip: item.message.ip,
        }
    }
}
