use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of outcomes a store operation can report.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Success,
    Unknown,
    MissingEntry,
    DuplicateEntry,
    CommandTimeout,
    VersionMismatch,
    ForeignKeyConstraintFails,
    DeadlockFound,
    DataTooLong,
}

impl Status {
    /// Transient-but-uncertain failures that must escalate to the
    /// caller's retry policy instead of being absorbed.
    pub fn is_fatal(self) -> bool {
        matches!(self, Status::CommandTimeout | Status::DeadlockFound)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "success",
            Status::Unknown => "unknown failure",
            Status::MissingEntry => "missing entry",
            Status::DuplicateEntry => "duplicate entry",
            Status::CommandTimeout => "command timeout",
            Status::VersionMismatch => "version mismatch",
            Status::ForeignKeyConstraintFails => "foreign key constraint fails",
            Status::DeadlockFound => "deadlock found",
            Status::DataTooLong => "data too long",
        };
        f.write_str(name)
    }
}

/// A status paired with the operation's value. The value is only
/// meaningful when the status is `Success`; on failure it is a
/// caller-ignorable default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OpResult<T> {
    pub status: Status,
    pub value: T,
}

impl<T> OpResult<T> {
    pub fn new(status: Status, value: T) -> Self {
        Self { status, value }
    }

    pub fn success(value: T) -> Self {
        Self {
            status: Status::Success,
            value,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_failure(&self) -> bool {
        self.status != Status::Success
    }

    pub fn is_fatal(&self) -> bool {
        self.status.is_fatal()
    }

    pub fn into_result(self) -> Result<T, Status> {
        if self.is_success() {
            Ok(self.value)
        } else {
            Err(self.status)
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OpResult<U> {
        OpResult {
            status: self.status,
            value: f(self.value),
        }
    }
}

impl<T: Default> OpResult<T> {
    pub fn failure(status: Status) -> Self {
        Self {
            status,
            value: T::default(),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for OpResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}: {:?}}}", self.status, self.value)
    }
}

/// First fatal status in the batch, else the first failure, else
/// `Success`.
pub fn first_failed_status<T>(results: &[OpResult<T>]) -> Status {
    if let Some(fatal) = results.iter().find(|r| r.is_fatal()) {
        return fatal.status;
    }
    if let Some(failed) = results.iter().find(|r| r.is_failure()) {
        return failed.status;
    }
    Status::Success
}
