//! Application hooks for the server side.

use std::fmt;

use crate::packstream::{Value, ValueMap};

/// The application-supplied callback a Bolt server session delegates to.
///
/// One session maps to one connection. The session drives the wire
/// protocol and calls these methods when the corresponding requests
/// arrive; query execution itself lives entirely behind this trait.
#[async_trait::async_trait]
pub trait BoltService: Send + Sync + 'static {
    /// Decide whether the INIT auth token grants access.
    ///
    /// The default accepts everything.
    async fn verify_auth_token(&self, auth_token: &ValueMap) -> bool {
        let _ = auth_token;
        true
    }

    /// Metadata for the INIT SUCCESS response.
    ///
    /// Should carry at least a `server` entry naming the implementation
    /// and version.
    fn server_metadata(&self) -> ValueMap {
        ValueMap::from([("server", "AsyncBolt/1.0")])
    }

    /// Execute a statement.
    ///
    /// Returns the result rows and summary to stream back on PULL_ALL,
    /// or a domain error that the session translates into a FAILURE
    /// message.
    async fn run(
        &self,
        statement: &str,
        parameters: &ValueMap,
    ) -> Result<QueryResult, ServiceError>;
}

/// Result of one statement: field names, rows, and summary metadata.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column names reported in the RUN summary
    pub fields: Vec<String>,
    /// Result rows, emitted as RECORD messages on PULL_ALL
    pub records: Vec<Vec<Value>>,
    /// Metadata for the terminal SUCCESS of the stream
    pub summary: ValueMap,
}

impl QueryResult {
    /// Result with the given column names and nothing else.
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            records: Vec::new(),
            summary: ValueMap::new(),
        }
    }

    /// Append a row.
    pub fn with_record(mut self, record: Vec<Value>) -> Self {
        self.records.push(record);
        self
    }

    /// Set the summary metadata.
    pub fn with_summary(mut self, summary: ValueMap) -> Self {
        self.summary = summary;
        self
    }
}

/// A domain error raised by the service, carried to the client as a
/// FAILURE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// Failure code, e.g. `Neo.ClientError.Statement.SyntaxError`
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ServiceError {
    /// Create a service error with an explicit code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Statement could not be parsed.
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new(crate::error::FailureCode::SYNTAX_ERROR, message)
    }

    /// Catch-all server-side error.
    pub fn general(message: impl Into<String>) -> Self {
        Self::new(crate::error::FailureCode::GENERAL_ERROR, message)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_result_builder() {
        let result = QueryResult::new(vec!["n".to_string()])
            .with_record(vec![Value::Integer(1)])
            .with_record(vec![Value::Integer(2)])
            .with_summary(ValueMap::from([("type", "r")]));

        assert_eq!(result.fields, vec!["n"]);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.summary.get_str("type"), Some("r"));
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::syntax_error("Unexpected token");
        assert_eq!(
            err.to_string(),
            "Neo.ClientError.Statement.SyntaxError: Unexpected token"
        );
    }

    #[tokio::test]
    async fn test_default_auth_accepts_all() {
        struct Noop;

        #[async_trait::async_trait]
        impl BoltService for Noop {
            async fn run(
                &self,
                _statement: &str,
                _parameters: &ValueMap,
            ) -> Result<QueryResult, ServiceError> {
                Ok(QueryResult::default())
            }
        }

        assert!(Noop.verify_auth_token(&ValueMap::new()).await);
        assert_eq!(Noop.server_metadata().get_str("server"), Some("AsyncBolt/1.0"));
    }
}
