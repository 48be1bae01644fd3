//! Error types for the application

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias using our EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Machine-checkable error category
///
/// Callers branch on the kind, never on the reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input, rejected before any external call
    BadParam,
    /// Input is well formed but the operation cannot proceed
    FailedPrecondition,
    NotFound,
    AlreadyExists,
    /// Unsupported venue/instrument combination or strategy
    Unimplemented,
    Unauthenticated,
    /// An external collaborator failed or timed out
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadParam => "bad_param",
            ErrorKind::FailedPrecondition => "failed_precondition",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }

    /// Fixed user-facing text for this kind.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::BadParam => "The request was missing information or was malformed.",
            ErrorKind::FailedPrecondition => {
                "The trade could not be placed with the current account or trade settings."
            }
            ErrorKind::NotFound => "The requested trade could not be found.",
            ErrorKind::AlreadyExists => "You are already participating in this trade.",
            ErrorKind::Unimplemented => "This venue or instrument is not supported yet.",
            ErrorKind::Unauthenticated => "You are not allowed to perform this action.",
            ErrorKind::Unavailable => "The venue could not be reached; please try again shortly.",
            ErrorKind::Internal => "Something went wrong on our side.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for engine operations
///
/// `reason` is a dotted code such as `dca.entry_equals_stop_loss`; `context`
/// carries structured key/value pairs (ticker, venue, strategy id) for logs.
#[derive(Error, Debug)]
#[error("{kind}: {reason}{}", render_context(.context))]
pub struct EngineError {
    kind: ErrorKind,
    reason: String,
    context: BTreeMap<String, String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

fn render_context(context: &BTreeMap<String, String>) -> String {
    if context.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = context.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!(" [{}]", pairs.join(", "))
}

impl EngineError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    pub fn bad_param(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadParam, reason)
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedPrecondition, reason)
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, reason)
    }

    pub fn already_exists(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, reason)
    }

    pub fn unimplemented(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unimplemented, reason)
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, reason)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, reason)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, reason)
    }

    /// Attach a key/value pair of context
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Prefix the reason with the operation that observed the failure,
    /// keeping kind and context intact.
    pub fn augment(mut self, operation: &str) -> Self {
        self.reason = format!("{}.{}", operation, self.reason);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Text safe to show to a participant.
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "http.timeout"
        } else if err.is_decode() {
            "http.invalid_response"
        } else {
            "http.request_failed"
        };
        EngineError::unavailable(reason).with_source(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::internal("json.parse_failed").with_source(err)
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => EngineError::not_found("store.row_not_found").with_source(err),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                EngineError::already_exists("store.unique_violation").with_source(err)
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                EngineError::unavailable("store.connection_failed").with_source(err)
            }
            _ => EngineError::internal("store.query_failed").with_source(err),
        }
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::bad_param("config.invalid").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = EngineError::precondition("dca.entry_equals_stop_loss")
            .with("ticker", "BTC")
            .with("venue", "binance");

        assert_eq!(
            err.to_string(),
            "failed_precondition: dca.entry_equals_stop_loss [ticker=BTC, venue=binance]"
        );
    }

    #[test]
    fn test_augment_keeps_kind_and_context() {
        let err = EngineError::not_found("trade_strategy")
            .with("trade_strategy_id", "abc")
            .augment("execute_trade_strategy");

        assert!(err.is(ErrorKind::NotFound));
        assert_eq!(err.reason(), "execute_trade_strategy.trade_strategy");
        assert_eq!(err.context().get("trade_strategy_id").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_user_message_never_leaks_reason() {
        let err = EngineError::unavailable("binance.-2019 Margin is insufficient");
        assert!(!err.user_message().contains("Margin"));
    }
}
