//! Maps backend-native error signatures onto the stable `Status`
//! vocabulary. Native error messages are the only portable signal
//! across drivers; prefix matching tolerates the contextual detail
//! drivers append after the diagnostic text.

use thiserror::Error;

use tabula_core::Status;

/// Where a native error originated. Internal errors are raised by the
/// store itself (version mismatch, missing entry); driver errors come
/// from the backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    Internal,
    Driver,
}

/// A classifiable error in normalized form.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct NativeError {
    pub category: ErrorCategory,
    pub message: String,
}

impl NativeError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Internal,
            message: message.into(),
        }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Driver,
            message: message.into(),
        }
    }

    /// Adapts a sea-orm error, stripping the sqlx wrapping so the
    /// message starts with the bare driver diagnostic.
    pub fn from_db_err(err: &sea_orm::DbErr) -> Self {
        Self::driver(normalize_driver_message(&err.to_string()))
    }
}

/// Peels "Query Error: error returned from database: …" style
/// wrappers, the SQLite "(code: NNNN) " prefix, and the MySQL
/// "NNNN (SQLSTATE): " prefix.
fn normalize_driver_message(message: &str) -> String {
    let mut msg = message;
    if let Some((_, rest)) = msg.rsplit_once("error returned from database: ") {
        msg = rest;
    }
    if let Some(rest) = msg.strip_prefix("(code: ") {
        if let Some((_, tail)) = rest.split_once(") ") {
            msg = tail;
        }
    } else if let Some((head, tail)) = msg.split_once("): ") {
        // "1062 (23000): Duplicate entry …"
        let numeric = head.starts_with(|c: char| c.is_ascii_digit())
            && head
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '(');
        if numeric && head.contains('(') {
            msg = tail;
        }
    }
    msg.to_string()
}

struct ClassifyRule {
    category: ErrorCategory,
    prefix: &'static str,
    status: Status,
}

const fn rule(category: ErrorCategory, prefix: &'static str, status: Status) -> ClassifyRule {
    ClassifyRule {
        category,
        prefix,
        status,
    }
}

/// Ordered rule table plus the engine's deadlock signature. Rules are
/// checked in registration order; first match wins.
pub struct Classifier {
    rules: Vec<ClassifyRule>,
    deadlock_prefix: Option<&'static str>,
}

/// Rules for errors the store raises itself, shared by every engine.
fn internal_rules() -> Vec<ClassifyRule> {
    use ErrorCategory::Internal;
    vec![
        rule(Internal, "Missing entry", Status::MissingEntry),
        rule(Internal, "Duplicate entry", Status::DuplicateEntry),
        rule(Internal, "The Command Timeout expired", Status::CommandTimeout),
        rule(Internal, "Version mismatch", Status::VersionMismatch),
        rule(
            Internal,
            "Cannot add or update a child row: a foreign key constraint fails",
            Status::ForeignKeyConstraintFails,
        ),
        rule(Internal, "Deadlock found", Status::DeadlockFound),
    ]
}

impl Classifier {
    pub fn mysql() -> Self {
        use ErrorCategory::Driver;
        let mut rules = internal_rules();
        rules.extend([
            rule(Driver, "Duplicate entry", Status::DuplicateEntry),
            rule(Driver, "The Command Timeout expired", Status::CommandTimeout),
            rule(Driver, "Version mismatch", Status::VersionMismatch),
            rule(
                Driver,
                "Cannot add or update a child row: a foreign key constraint fails",
                Status::ForeignKeyConstraintFails,
            ),
            rule(Driver, "Deadlock found", Status::DeadlockFound),
            rule(Driver, "Data too long for column", Status::DataTooLong),
        ]);
        Self {
            rules,
            deadlock_prefix: Some("Deadlock found"),
        }
    }

    pub fn sqlite() -> Self {
        use ErrorCategory::Driver;
        let mut rules = internal_rules();
        rules.extend([
            rule(Driver, "UNIQUE constraint failed", Status::DuplicateEntry),
            rule(Driver, "locked", Status::CommandTimeout),
            rule(Driver, "Version mismatch", Status::VersionMismatch),
            rule(
                Driver,
                "FOREIGN KEY constraint failed",
                Status::ForeignKeyConstraintFails,
            ),
        ]);
        Self {
            rules,
            deadlock_prefix: None,
        }
    }

    /// Engines without a registered rule table only classify internal
    /// errors.
    pub fn internal_only() -> Self {
        Self {
            rules: internal_rules(),
            deadlock_prefix: None,
        }
    }

    /// First-match-wins classification; unmatched errors are
    /// `(Unknown, false)`.
    pub fn classify(&self, err: &NativeError) -> (Status, bool) {
        for rule in &self.rules {
            if rule.category == err.category && starts_with_ignore_case(&err.message, rule.prefix) {
                return (rule.status, true);
            }
        }
        (Status::Unknown, false)
    }

    /// Deadlock detection is independent of the rule table: a deadlock
    /// escalates no matter which rule would otherwise match.
    pub fn is_deadlock(&self, err: &NativeError) -> bool {
        match self.deadlock_prefix {
            Some(prefix) => {
                err.category == ErrorCategory::Driver
                    && starts_with_ignore_case(&err.message, prefix)
            }
            None => false,
        }
    }

    /// Reconstructs a representative error from the first rule whose
    /// status matches, for diagnostic re-raising.
    pub fn status_to_error(&self, status: Status) -> NativeError {
        for rule in &self.rules {
            if rule.status == status {
                return NativeError {
                    category: ErrorCategory::Internal,
                    message: rule.prefix.to_string(),
                };
            }
        }
        NativeError::internal("Unknown error")
    }
}

// Byte-wise so a prefix boundary falling inside a multibyte character
// cannot panic; the registered prefixes are all ASCII.
fn starts_with_ignore_case(message: &str, prefix: &str) -> bool {
    message.len() >= prefix.len()
        && message.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
