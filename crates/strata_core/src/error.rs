use thiserror::Error;

use crate::ObjectId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {message}")]
    Connection { message: String },
    #[error("query error: {message}")]
    Query { message: String },
    #[error("unknown index '{index}': {message}")]
    UnknownIndex { index: String, message: String },
    #[error("the id '{id}' has already been assigned")]
    DuplicateId { id: ObjectId },
    #[error("invariant violated: {message}")]
    Invariant { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("transaction error: {message}")]
    Transaction { message: String },
}

const CONNECTION_MARKERS: &[&str] = &[
    "no connection to the server",
    "connection refused",
    "connection reset",
    "connection closed",
    "server closed the connection",
    "terminating connection",
    "broken pipe",
    "pool timed out",
    "pool closed",
];

const MISSING_TABLE_MARKERS: &[&str] = &["no such table", "relation", "undefined_table"];

impl StoreError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn unknown_index(index: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnknownIndex {
            index: index.into(),
            message: message.into(),
        }
    }

    pub fn duplicate_id(id: ObjectId) -> Self {
        Self::DuplicateId { id }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Transient failures the connection pool may recover from by reconnecting.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Rewrites a query error raised against a missing table into `UnknownIndex`.
    pub fn for_index(self, index: &str) -> Self {
        match self {
            Self::Query { message } if names_missing_table(&message) => Self::UnknownIndex {
                index: index.to_string(),
                message,
            },
            other => other,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

fn names_connection_loss(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    CONNECTION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn names_missing_table(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    MISSING_TABLE_MARKERS.iter().any(|marker| {
        lowered.contains(marker) && (*marker != "relation" || lowered.contains("does not exist"))
    })
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(value: sea_orm::DbErr) -> Self {
        match value {
            sea_orm::DbErr::Conn(err) => StoreError::connection(err.to_string()),
            sea_orm::DbErr::ConnectionAcquire(err) => StoreError::connection(err.to_string()),
            other => {
                let message = other.to_string();
                if names_connection_loss(&message) {
                    StoreError::connection(message)
                } else {
                    StoreError::query(message)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StoreError;
    use crate::ObjectId;

    #[test]
    fn helper_constructors_set_variants() {
        let err = StoreError::connection("down");
        assert!(matches!(err, StoreError::Connection { .. }));
        assert!(err.is_connection());
        let err = StoreError::query("syntax");
        assert!(matches!(err, StoreError::Query { .. }));
        assert!(!err.is_connection());
        let err = StoreError::duplicate_id(ObjectId(7));
        assert!(matches!(err, StoreError::DuplicateId { id: ObjectId(7) }));
        let err = StoreError::invariant("origin");
        assert!(matches!(err, StoreError::Invariant { .. }));
        let err = StoreError::invalid("bad");
        assert!(matches!(err, StoreError::Validation { .. }));
        let err = StoreError::storage("disk");
        assert!(matches!(err, StoreError::Storage { .. }));
        let err = StoreError::transaction("escaped");
        assert!(matches!(err, StoreError::Transaction { .. }));
    }

    #[test]
    fn missing_tables_become_unknown_index() {
        let sqlite = StoreError::query("error returned from database: no such table: idx");
        assert!(matches!(
            sqlite.for_index("idx"),
            StoreError::UnknownIndex { ref index, .. } if index == "idx"
        ));
        let postgres = StoreError::query("relation \"idx\" does not exist");
        assert!(matches!(
            postgres.for_index("idx"),
            StoreError::UnknownIndex { .. }
        ));
        let other = StoreError::query("syntax error at or near \"FROM\"");
        assert!(matches!(other.for_index("idx"), StoreError::Query { .. }));
        let conn = StoreError::connection("no such table");
        assert!(conn.for_index("idx").is_connection());
    }

    #[test]
    fn db_errors_are_classified() {
        let err: StoreError =
            sea_orm::DbErr::Custom("no connection to the server".to_string()).into();
        assert!(err.is_connection());
        let err: StoreError = sea_orm::DbErr::Custom("type mismatch".to_string()).into();
        assert!(matches!(err, StoreError::Query { .. }));
    }

    #[test]
    fn duplicate_id_message_names_the_id() {
        let err = StoreError::duplicate_id(ObjectId(25));
        assert_eq!(err.to_string(), "the id '25' has already been assigned");
    }
}
