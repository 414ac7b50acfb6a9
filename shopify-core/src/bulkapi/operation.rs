//! Bulk operation state as reported by the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of a bulk operation, e.g. `gid://shopify/BulkOperation/1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Created,
    Running,
    Canceling,
    Completed,
    Failed,
    Canceled,
    Expired,
    /// Any state this client does not recognise. Treated as terminal.
    #[serde(other)]
    Unknown,
}

impl Status {
    /// True while the service may still change the operation's state.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Status::Created | Status::Running | Status::Canceling)
    }

    /// True once the state is final.
    pub fn is_terminal(self) -> bool {
        !self.is_in_flight()
    }

    /// True if a cancel request would be accepted.
    pub fn is_cancelable(self) -> bool {
        matches!(self, Status::Created | Status::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Created => "CREATED",
            Status::Running => "RUNNING",
            Status::Canceling => "CANCELING",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
            Status::Canceled => "CANCELED",
            Status::Expired => "EXPIRED",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Snapshot of a bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperation {
    pub id: OperationId,
    pub status: Status,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of objects written to the result file.
    #[serde(default, deserialize_with = "u64_from_string_or_number")]
    pub object_count: u64,
    /// Size of the result file in bytes.
    #[serde(default, deserialize_with = "optional_u64_from_string_or_number")]
    pub file_size: Option<u64>,
    /// Result file location, present once the operation completed with output.
    #[serde(default)]
    pub url: Option<String>,
    /// Location of the partial result of a failed operation.
    #[serde(default)]
    pub partial_data_url: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

impl BulkOperation {
    /// Returns the error code, ignoring empty strings.
    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref().filter(|code| !code.is_empty())
    }
}

/// A validation error returned by a bulk mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserError {
    /// Path to the offending input field.
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) if !field.is_empty() => write!(f, "{}: {}", field.join("."), self.message),
            _ => f.write_str(&self.message),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(u64),
}

impl StringOrNumber {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            StringOrNumber::Number(n) => Ok(n),
            StringOrNumber::String(s) => s
                .parse()
                .map_err(|_| E::custom(format!("invalid unsigned integer `{s}`"))),
        }
    }
}

fn u64_from_string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(optional_u64_from_string_or_number(deserializer)?.unwrap_or_default())
}

fn optional_u64_from_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Option::<StringOrNumber>::deserialize(deserializer)?
        .map(StringOrNumber::into_u64)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        for status in [Status::Created, Status::Running, Status::Canceling] {
            assert!(status.is_in_flight());
            assert!(!status.is_terminal());
        }
        for status in [
            Status::Completed,
            Status::Failed,
            Status::Canceled,
            Status::Expired,
            Status::Unknown,
        ] {
            assert!(status.is_terminal());
        }
        assert!(Status::Running.is_cancelable());
        assert!(!Status::Canceling.is_cancelable());
    }

    #[test]
    fn test_unknown_status_decodes() {
        let status: Status = serde_json::from_str(r#""ARCHIVED""#).unwrap();
        assert_eq!(status, Status::Unknown);
        let status: Status = serde_json::from_str(r#""CANCELING""#).unwrap();
        assert_eq!(status, Status::Canceling);
    }

    #[test]
    fn test_operation_decodes_string_counts() {
        let operation: BulkOperation = serde_json::from_str(
            r#"{
                "id": "gid://shopify/BulkOperation/720918",
                "status": "COMPLETED",
                "errorCode": null,
                "createdAt": "2022-07-01T10:00:00Z",
                "completedAt": "2022-07-01T10:05:00Z",
                "objectCount": "12345",
                "fileSize": "987654",
                "url": "https://storage.example.com/bulk.jsonl",
                "partialDataUrl": null,
                "query": "{ products { edges { node { id } } } }"
            }"#,
        )
        .unwrap();

        assert_eq!(operation.id.as_str(), "gid://shopify/BulkOperation/720918");
        assert_eq!(operation.object_count, 12345);
        assert_eq!(operation.file_size, Some(987654));
        assert!(operation.completed_at.unwrap() > operation.created_at.unwrap());
    }

    #[test]
    fn test_operation_decodes_numeric_and_missing_counts() {
        let operation: BulkOperation = serde_json::from_str(
            r#"{"id":"gid://shopify/BulkOperation/1","status":"RUNNING","objectCount":7}"#,
        )
        .unwrap();
        assert_eq!(operation.object_count, 7);
        assert_eq!(operation.file_size, None);

        let operation: BulkOperation = serde_json::from_str(
            r#"{"id":"gid://shopify/BulkOperation/1","status":"CREATED","objectCount":null}"#,
        )
        .unwrap();
        assert_eq!(operation.object_count, 0);
    }

    #[test]
    fn test_invalid_count_is_rejected() {
        let result = serde_json::from_str::<BulkOperation>(
            r#"{"id":"gid://shopify/BulkOperation/1","status":"RUNNING","objectCount":"lots"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_error_code_is_ignored() {
        let operation: BulkOperation = serde_json::from_str(
            r#"{"id":"gid://shopify/BulkOperation/1","status":"COMPLETED","errorCode":""}"#,
        )
        .unwrap();
        assert_eq!(operation.error_code(), None);
    }

    #[test]
    fn test_user_error_display() {
        let error = UserError {
            field: Some(vec!["query".to_string()]),
            message: "Invalid bulk query".to_string(),
        };
        assert_eq!(error.to_string(), "query: Invalid bulk query");
        let error = UserError {
            field: None,
            message: "A bulk query operation is already in progress".to_string(),
        };
        assert_eq!(error.to_string(), "A bulk query operation is already in progress");
    }
}
