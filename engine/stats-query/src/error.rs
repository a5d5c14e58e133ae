//! Error types for store access

use thiserror::Error;

/// Postgres SQLSTATE for `undefined_column`
pub const UNDEFINED_COLUMN: &str = "42703";

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors reported by a [`crate::StatsStore`]
#[derive(Error, Debug)]
pub enum StoreError {
    /// A referenced column does not exist in the current store schema
    #[error("Undefined column: {message}")]
    UndefinedColumn { message: String },

    /// Database errors other than schema drift
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Could not reach the store at all
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Transport errors from the REST client
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// The REST endpoint answered with a non-success status
    #[error("Store rejected request ({status}): {message}")]
    Rejected { status: u16, code: Option<String>, message: String },

    /// Table, view or function unknown to the store
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Response rows could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Store misconfiguration
    #[error("Store configuration error: {0}")]
    Config(String),

    /// A full scan would read more rows than allowed
    #[error("Scan of {table} exceeded {max_rows} rows")]
    ScanLimit { table: String, max_rows: usize },
}

impl StoreError {
    /// Whether this failure is a missing column rather than a real fault.
    ///
    /// The ordering resolver recovers from these by trying the next candidate.
    pub fn is_schema_drift(&self) -> bool {
        match self {
            StoreError::UndefinedColumn { .. } => true,
            StoreError::Rejected { code, message, .. } => {
                code.as_deref() == Some(UNDEFINED_COLUMN) || is_undefined_column_message(message)
            }
            _ => false,
        }
    }

    /// Name of the missing column, when the store message says which one
    pub fn missing_column(&self) -> Option<String> {
        if !self.is_schema_drift() {
            return None;
        }
        match self {
            StoreError::UndefinedColumn { message } | StoreError::Rejected { message, .. } => {
                column_in_message(message)
            }
            _ => None,
        }
    }

    /// Create a new decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_COLUMN) => {
                StoreError::UndefinedColumn { message: db.message().to_string() }
            }
            _ => StoreError::Database(err),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        // request URLs carry filter values; keep them out of client-facing text
        StoreError::Http(err.without_url())
    }
}

/// Matches the `column ... does not exist` family of messages
pub fn is_undefined_column_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    match (lower.find("column "), lower.rfind("does not exist")) {
        (Some(start), Some(end)) => start < end,
        _ => false,
    }
}

/// `column t."team_abbr" does not exist` -> `team_abbr`
fn column_in_message(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    let start = lower.find("column ")? + "column ".len();
    let end = lower.rfind("does not exist")?;
    let qualified = message.get(start..end)?.trim();
    let column = qualified.rsplit('.').next()?.trim_matches('"').trim();
    (!column.is_empty()).then(|| column.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_column_message() {
        assert!(is_undefined_column_message("column player_stats.updated_at does not exist"));
        assert!(is_undefined_column_message("ERROR: Column \"per_game\" Does Not Exist"));
        assert!(!is_undefined_column_message("relation \"injuries\" does not exist"));
        assert!(!is_undefined_column_message("permission denied for table injuries"));
    }

    #[test]
    fn test_schema_drift_classification() {
        assert!(StoreError::UndefinedColumn { message: "x".into() }.is_schema_drift());

        let by_code = StoreError::Rejected {
            status: 400,
            code: Some("42703".into()),
            message: "failed to parse order".into(),
        };
        assert!(by_code.is_schema_drift());

        let by_message = StoreError::Rejected {
            status: 400,
            code: None,
            message: "column events.created_at does not exist".into(),
        };
        assert!(by_message.is_schema_drift());

        let permission = StoreError::Rejected {
            status: 401,
            code: Some("42501".into()),
            message: "permission denied for view v_situational_leaderboard".into(),
        };
        assert!(!permission.is_schema_drift());
        assert!(!StoreError::UnknownSource("events".into()).is_schema_drift());
        assert!(!StoreError::decode("bad row").is_schema_drift());
    }

    #[test]
    fn test_missing_column_name() {
        let err = StoreError::UndefinedColumn {
            message: "column v_situational_leaderboard.team_abbr does not exist".into(),
        };
        assert_eq!(err.missing_column().as_deref(), Some("team_abbr"));

        let err = StoreError::UndefinedColumn {
            message: "column t.\"Per_Game\" does not exist".into(),
        };
        assert_eq!(err.missing_column().as_deref(), Some("Per_Game"));

        let err = StoreError::Rejected {
            status: 400,
            code: Some("42703".into()),
            message: "bad order".into(),
        };
        assert!(err.is_schema_drift());
        assert_eq!(err.missing_column(), None);

        let err = StoreError::ScanLimit { table: "v_situational_leaderboard".into(), max_rows: 10 };
        assert!(!err.is_schema_drift());
        assert_eq!(err.missing_column(), None);
    }
}
