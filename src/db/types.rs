use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

/// Grading state of one task key.
///
/// The integer values are persisted and exposed over the API, so they are
/// fixed. `1` was a transient "checking" state in older deployments and is
/// intentionally unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub(crate) enum Status {
    Submitted = 0,
    Checked = 2,
    Failed = 3,
    /// Returned when no row exists for a key. Never written by a transition.
    NotSubmitted = 4,
    CheckedSubmitted = 5,
    CheckedFailed = 6,
}

/// States that prove the key has been accepted at least once.
pub(crate) const EVER_ACCEPTED: [Status; 3] =
    [Status::Checked, Status::CheckedFailed, Status::CheckedSubmitted];

impl Status {
    pub(crate) const ALL: [Status; 6] = [
        Status::Submitted,
        Status::Checked,
        Status::Failed,
        Status::NotSubmitted,
        Status::CheckedSubmitted,
        Status::CheckedFailed,
    ];

    pub(crate) fn is_ever_accepted(self) -> bool {
        EVER_ACCEPTED.contains(&self)
    }

    /// Whether a diagnostic from the last check is meaningful for this state.
    pub(crate) fn shows_output(self) -> bool {
        matches!(self, Status::Failed | Status::CheckedFailed)
    }

    pub(crate) fn code(self) -> i32 {
        self as i32
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Status::Submitted => "submitted",
            Status::Checked => "checked",
            Status::Failed => "failed",
            Status::NotSubmitted => "not_submitted",
            Status::CheckedSubmitted => "checked_submitted",
            Status::CheckedFailed => "checked_failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown task status code {0}")]
pub(crate) struct UnknownStatus(pub(crate) i32);

impl From<Status> for i32 {
    fn from(value: Status) -> Self {
        value.code()
    }
}

impl TryFrom<i32> for Status {
    type Error = UnknownStatus;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Status::ALL.into_iter().find(|status| status.code() == value).ok_or(UnknownStatus(value))
    }
}

/// Identity of one gradable slot: exactly one task status row exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct TaskKey {
    pub(crate) task: i32,
    pub(crate) variant: i32,
    pub(crate) group: i32,
}

impl TaskKey {
    pub(crate) fn new(task: i32, variant: i32, group: i32) -> Self {
        Self { task, variant, group }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g-{}/v-{}/t-{}", self.group, self.variant, self.task)
    }
}
