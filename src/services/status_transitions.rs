//! Pure rules for moving a task key between grading states.
//!
//! The only memory of a past acceptance is the current status itself: once a
//! key is in one of [`EVER_ACCEPTED`](crate::db::types::EVER_ACCEPTED), every
//! later submit or failed check keeps it inside that set.

use time::PrimitiveDateTime;

use crate::db::models::TaskStatus;
use crate::db::types::{Status, TaskKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GradingEvent {
    Submit,
    Check { ok: bool },
}

/// Column values to persist for a key after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusWrite {
    pub(crate) status: Status,
    pub(crate) code: String,
    pub(crate) output: Option<String>,
    pub(crate) ip: String,
    pub(crate) time: PrimitiveDateTime,
}

pub(crate) fn next_status(current: Option<Status>, event: GradingEvent) -> Status {
    let ever_accepted = current.is_some_and(Status::is_ever_accepted);

    match event {
        GradingEvent::Submit if ever_accepted => Status::CheckedSubmitted,
        GradingEvent::Submit => Status::Submitted,
        GradingEvent::Check { ok: true } => Status::Checked,
        GradingEvent::Check { ok: false } if ever_accepted => Status::CheckedFailed,
        GradingEvent::Check { ok: false } => Status::Failed,
    }
}

/// A new submission always clears the previous diagnostic.
pub(crate) fn on_submit(
    current: Option<&TaskStatus>,
    code: &str,
    ip: &str,
    now: PrimitiveDateTime,
) -> StatusWrite {
    StatusWrite {
        status: next_status(current.map(|row| row.status), GradingEvent::Submit),
        code: code.to_string(),
        output: None,
        ip: ip.to_string(),
        time: now,
    }
}

pub(crate) fn on_check(
    current: Option<&TaskStatus>,
    code: &str,
    ok: bool,
    output: Option<&str>,
    ip: &str,
    now: PrimitiveDateTime,
) -> StatusWrite {
    StatusWrite {
        status: next_status(current.map(|row| row.status), GradingEvent::Check { ok }),
        code: code.to_string(),
        output: output.map(str::to_string),
        ip: ip.to_string(),
        time: now,
    }
}

/// Builds the row that results from `write`, keeping the achievement set of
/// the existing row untouched.
pub(crate) fn apply(current: Option<TaskStatus>, key: TaskKey, write: StatusWrite) -> TaskStatus {
    let achievements = current.and_then(|row| row.achievements);
    TaskStatus {
        task_id: key.task,
        variant_id: key.variant,
        group_id: key.group,
        time: write.time,
        code: write.code,
        ip: write.ip,
        output: write.output,
        status: write.status,
        achievements,
    }
}
